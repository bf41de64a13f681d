//! rust_barcode - multi-symbology barcode recognition
//!
//! Reads Code39 (standard, Full ASCII, PZN), GS1 DataBar (omnidirectional,
//! stacked, expanded), PDF417 and QR Code / Micro QR from binarized or
//! grayscale rasters. The caller supplies pixels; the library does no I/O.
//!
//! ```no_run
//! use rust_barcode::{scan_gray, BarcodeType, ScanOptions};
//!
//! # fn pixels() -> (Vec<u8>, usize, usize) { (vec![255; 64], 8, 8) }
//! let (gray, width, height) = pixels();
//! let options = ScanOptions::only(BarcodeType::QrCode);
//! for found in scan_gray(&gray, width, height, &options)? {
//!     println!("{}: {}", found.symbology, found.text);
//! }
//! # Ok::<(), rust_barcode::ScanError>(())
//! ```

/// Per-call scan options
pub mod config;
/// Symbol decoders (codewords, error correction, payload grammars)
pub mod decoder;
/// Symbol location (pattern matching, finders, sampling grids)
pub mod detector;
/// Errors surfaced to the caller
pub mod error;
/// Core data structures (BitImage, BitMatrix, Point, results)
pub mod models;
mod pipeline;
#[doc(hidden)]
pub mod test_utils;
/// Raster and geometry helpers
pub mod utils;

pub use config::{Code39Checksum, ScanOptions, ScanOptionsBuilder, TextEncoding};
pub use error::ScanError;
pub use models::{BarcodeType, BarcodeTypes, BitImage, BitMatrix, FoundBarcode, Point, Rect, StructuredAppend};

/// Scan a binarized image
pub fn scan(image: &BitImage, options: &ScanOptions) -> Result<Vec<FoundBarcode>, ScanError> {
    pipeline::run(image, options)
}

/// Scan 8-bit grayscale samples, row-major, `width * height` long.
///
/// The raster is binarized with `options.threshold`, or Otsu's threshold
/// when unset.
pub fn scan_gray(
    gray: &[u8],
    width: usize,
    height: usize,
    options: &ScanOptions,
) -> Result<Vec<FoundBarcode>, ScanError> {
    let image = BitImage::from_gray(gray, width, height, options.threshold)?;
    pipeline::run(&image, options)
}

/// Scan an `image` crate luma buffer
pub fn scan_luma(image: &image::GrayImage, options: &ScanOptions) -> Result<Vec<FoundBarcode>, ScanError> {
    let image = BitImage::from_luma(image, options.threshold)?;
    pipeline::run(&image, options)
}

/// Scanner holding a fixed set of options
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    options: ScanOptions,
}

impl Scanner {
    /// Create a scanner with the given options
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Options used by every scan
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan a binarized image
    pub fn scan(&self, image: &BitImage) -> Result<Vec<FoundBarcode>, ScanError> {
        scan(image, &self.options)
    }

    /// Scan grayscale samples
    pub fn scan_gray(&self, gray: &[u8], width: usize, height: usize) -> Result<Vec<FoundBarcode>, ScanError> {
        scan_gray(gray, width, height, &self.options)
    }

    /// First symbol found, if any
    pub fn scan_single(&self, image: &BitImage) -> Result<Option<FoundBarcode>, ScanError> {
        let options = ScanOptions {
            expected_count: Some(1),
            ..self.options.clone()
        };
        Ok(scan(image, &options)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ECLevel, MaskPattern};
    use crate::test_utils::canvas;
    use crate::test_utils::qr::{qr_modules, Segment};

    fn qr_gray(text: &str) -> (Vec<u8>, usize, usize) {
        let modules = qr_modules(2, ECLevel::L, MaskPattern::Pattern3, &[Segment::Byte(text.as_bytes().to_vec())])
            .expect("fits");
        let pixels = canvas::render(&modules, 4, 4);
        (canvas::to_gray(&pixels), pixels.width(), pixels.height())
    }

    #[test]
    fn test_scan_empty_image() {
        let gray = vec![255u8; 100];
        let results = scan_gray(&gray, 10, 10, &ScanOptions::default()).expect("scan");
        assert!(results.is_empty());
    }

    #[test]
    fn test_scan_gray_rejects_short_buffer() {
        let err = scan_gray(&[0u8; 10], 4, 4, &ScanOptions::default()).expect_err("length mismatch");
        assert!(matches!(err, ScanError::InvalidImage { .. }));
    }

    #[test]
    fn test_empty_selection_is_invalid() {
        let options = ScanOptions::builder().symbologies(BarcodeTypes::NONE).build();
        let err = scan_gray(&[255u8; 16], 4, 4, &options).expect_err("no symbology");
        assert!(matches!(err, ScanError::InvalidOptions { .. }));
    }

    #[test]
    fn test_scan_gray_qr() {
        let (gray, w, h) = qr_gray("scan me");
        let results = scan_gray(&gray, w, h, &ScanOptions::default()).expect("scan");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].symbology, BarcodeType::QrCode);
        assert_eq!(results[0].text, "scan me");
        assert_eq!(results[0].bytes, b"scan me");
    }

    #[test]
    fn test_scanner_single() {
        let (gray, w, h) = qr_gray("single");
        let image = BitImage::from_gray(&gray, w, h, None).expect("image");
        let scanner = Scanner::new(ScanOptions::only(BarcodeType::QrCode));
        let found = scanner.scan_single(&image).expect("scan").expect("found");
        assert_eq!(found.text, "single");
        assert!(found.confidence > 0.9);
    }
}
