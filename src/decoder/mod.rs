//! Symbol decoders.
//!
//! Each family turns a located symbol (a scan line for linear codes, a region
//! for stacked and matrix codes) into codewords, corrects them and decodes
//! the payload grammar:
//! - Code39 family (table lookup of nine-element characters)
//! - GS1 DataBar family (combinatorial characters, pair assembly)
//! - PDF417 (row indicators, codeword grid, compaction modes)
//! - QR Code and Micro QR (format, zig-zag codewords, segments)

pub mod code39;
pub mod config;
pub mod databar;
pub mod eci;
pub mod gs1;
pub mod pdf417;
pub mod qr;
pub mod recovery;
pub mod reed_solomon;

use crate::models::BarcodeType;
use thiserror::Error;

/// A linear symbol read on a single scan line
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRead {
    pub symbology: BarcodeType,
    pub text: String,
    /// First dark pixel of the start character along the line
    pub start: usize,
    /// One past the last dark pixel of the stop character
    pub end: usize,
    /// True when the symbol reads against the line direction
    pub reversed: bool,
    /// Narrow module width in pixels
    pub module_len: f32,
    pub confidence: f32,
}

/// Reasons a corrected codeword stream does not yield a payload.
///
/// These never reach the caller; the candidate is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("unknown mode indicator {0:#x}")]
    UnknownMode(u32),
    #[error("stream ends inside a segment")]
    Truncated,
    #[error("invalid value {0} in compacted data")]
    BadValue(u32),
    #[error("declared length {declared} does not fit {available} codewords")]
    BadLength { declared: usize, available: usize },
}
