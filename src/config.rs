//! Per-call scan options.
//!
//! [`ScanOptions`] is immutable once built; use [`ScanOptions::builder`] for
//! ergonomic construction. Process-wide tuning lives in
//! [`crate::decoder::config`] and is read from the environment.

use crate::error::ScanError;
use crate::models::{BarcodeType, BarcodeTypes, Rect};
use std::time::Duration;

/// Character set used for byte payloads that do not declare one
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// UTF-8, falling back to ISO-8859-1 for invalid sequences
    #[default]
    Utf8,
    /// ISO-8859-1
    Latin1,
}

impl TextEncoding {
    /// Render bytes as text under this encoding
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => match std::str::from_utf8(bytes) {
                Ok(s) => s.to_string(),
                Err(_) => latin1(bytes),
            },
            TextEncoding::Latin1 => latin1(bytes),
        }
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Check-character policy for Code39 symbols
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Code39Checksum {
    /// Report every character as data
    #[default]
    None,
    /// Require and strip a trailing modulo-43 check character
    Mod43,
}

/// Options for one call to [`crate::scan`].
///
/// # Example
/// ```
/// use rust_barcode::{BarcodeType, BarcodeTypes, ScanOptions};
/// use std::time::Duration;
///
/// let options = ScanOptions::builder()
///     .symbologies(BarcodeTypes::only(BarcodeType::QrCode))
///     .timeout(Duration::from_millis(500))
///     .build();
/// assert!(options.allow_mirror);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ScanOptions {
    /// Symbologies to look for (default: all)
    pub symbologies: BarcodeTypes,
    /// Stop once this many results are accepted
    pub expected_count: Option<usize>,
    /// Deadline for the whole scan
    pub timeout: Option<Duration>,
    /// Interpretation of byte payloads without a charset designator
    pub encoding: TextEncoding,
    /// Retry a mirrored image and accept mirrored matrix codes (default: true)
    pub allow_mirror: bool,
    /// Fixed binarization threshold for gray input (default: Otsu)
    pub threshold: Option<u8>,
    /// Restrict scanning to this rectangle
    pub clip: Option<Rect>,
    /// Pixel spacing between scan lines for linear and stacked codes (0 = automatic)
    pub line_step: usize,
    /// Check-character policy for Code39 and Code39 Full ASCII
    pub code39_checksum: Code39Checksum,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            symbologies: BarcodeTypes::ALL,
            expected_count: None,
            timeout: None,
            encoding: TextEncoding::Utf8,
            allow_mirror: true,
            threshold: None,
            clip: None,
            line_step: 0,
            code39_checksum: Code39Checksum::None,
        }
    }
}

impl ScanOptions {
    /// Create a new builder
    pub fn builder() -> ScanOptionsBuilder {
        ScanOptionsBuilder::default()
    }

    /// Options that scan for a single symbology
    pub fn only(kind: BarcodeType) -> Self {
        Self {
            symbologies: BarcodeTypes::only(kind),
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ScanError> {
        if self.symbologies.is_empty() {
            return Err(ScanError::invalid_options("no symbology selected"));
        }
        if self.expected_count == Some(0) {
            return Err(ScanError::invalid_options("expected count must be positive"));
        }
        Ok(())
    }

    /// Scan-line spacing for an image of the given height
    pub(crate) fn effective_line_step(&self, extent: usize) -> usize {
        if self.line_step > 0 {
            return self.line_step;
        }
        (extent / 128).clamp(1, 8)
    }
}

/// Builder for [`ScanOptions`].
#[derive(Default)]
pub struct ScanOptionsBuilder {
    symbologies: Option<BarcodeTypes>,
    expected_count: Option<usize>,
    timeout: Option<Duration>,
    encoding: Option<TextEncoding>,
    allow_mirror: Option<bool>,
    threshold: Option<u8>,
    clip: Option<Rect>,
    line_step: Option<usize>,
    code39_checksum: Option<Code39Checksum>,
}

impl ScanOptionsBuilder {
    /// Symbologies to look for.
    #[must_use]
    pub fn symbologies(mut self, set: BarcodeTypes) -> Self {
        self.symbologies = Some(set);
        self
    }

    /// Stop after this many results.
    #[must_use]
    pub fn expected_count(mut self, count: usize) -> Self {
        self.expected_count = Some(count);
        self
    }

    /// Deadline for the whole scan.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Byte-payload encoding hint.
    #[must_use]
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Enable or disable mirror detection.
    #[must_use]
    pub fn allow_mirror(mut self, allow: bool) -> Self {
        self.allow_mirror = Some(allow);
        self
    }

    /// Fixed binarization threshold.
    #[must_use]
    pub fn threshold(mut self, threshold: u8) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Restrict scanning to a rectangle.
    #[must_use]
    pub fn clip(mut self, clip: Rect) -> Self {
        self.clip = Some(clip);
        self
    }

    /// Scan-line spacing in pixels.
    #[must_use]
    pub fn line_step(mut self, step: usize) -> Self {
        self.line_step = Some(step);
        self
    }

    /// Code39 check-character policy.
    #[must_use]
    pub fn code39_checksum(mut self, policy: Code39Checksum) -> Self {
        self.code39_checksum = Some(policy);
        self
    }

    /// Build the options.
    #[must_use]
    pub fn build(self) -> ScanOptions {
        let d = ScanOptions::default();
        ScanOptions {
            symbologies: self.symbologies.unwrap_or(d.symbologies),
            expected_count: self.expected_count.or(d.expected_count),
            timeout: self.timeout.or(d.timeout),
            encoding: self.encoding.unwrap_or(d.encoding),
            allow_mirror: self.allow_mirror.unwrap_or(d.allow_mirror),
            threshold: self.threshold.or(d.threshold),
            clip: self.clip.or(d.clip),
            line_step: self.line_step.unwrap_or(d.line_step),
            code39_checksum: self.code39_checksum.unwrap_or(d.code39_checksum),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let options = ScanOptions::builder().build();
        assert_eq!(options, ScanOptions::default());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let empty = ScanOptions::builder()
            .symbologies(BarcodeTypes::NONE)
            .build();
        assert!(matches!(
            empty.validate(),
            Err(ScanError::InvalidOptions { .. })
        ));
        let zero = ScanOptions::builder().expected_count(0).build();
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_encoding_fallback() {
        assert_eq!(TextEncoding::Utf8.decode("é".as_bytes()), "é");
        assert_eq!(TextEncoding::Utf8.decode(&[0xE9]), "é");
        assert_eq!(TextEncoding::Latin1.decode(&[0x41, 0xE9]), "Aé");
    }

    #[test]
    fn test_line_step() {
        let options = ScanOptions::default();
        assert_eq!(options.effective_line_step(100), 1);
        assert_eq!(options.effective_line_step(4096), 8);
        let fixed = ScanOptions::builder().line_step(3).build();
        assert_eq!(fixed.effective_line_step(4096), 3);
    }
}
