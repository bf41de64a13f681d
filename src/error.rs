//! Error types surfaced by the scanner.
//!
//! Only conditions the caller can act on are surfaced. A line without a
//! pattern, a rejected candidate, an uncorrectable block or a malformed
//! payload all end up as "no result" and never reach this type.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`crate::scan`] and the image constructors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScanError {
    /// The scan deadline expired. Partial results are discarded.
    #[error("scan timed out after {elapsed:?}")]
    Timeout {
        /// Time spent before the deadline check fired
        elapsed: Duration,
    },
    /// The raster handed to the scanner is unusable.
    #[error("invalid image: {reason}")]
    InvalidImage {
        /// What was wrong with the raster
        reason: String,
    },
    /// Scan options that cannot produce any result.
    #[error("invalid scan options: {reason}")]
    InvalidOptions {
        /// What was wrong with the options
        reason: String,
    },
}

impl ScanError {
    pub(crate) fn invalid_image(reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_options(reason: impl Into<String>) -> Self {
        Self::InvalidOptions {
            reason: reason.into(),
        }
    }

    /// True for the deadline error, so callers can tell "not found" from "ran out of time"
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
