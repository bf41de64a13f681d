use super::{Point, Rect};
use std::fmt;

/// Symbology of a decoded result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BarcodeType {
    /// QR Code Model 2
    QrCode,
    /// Micro QR (M1-M4)
    MicroQr,
    /// PDF417 and Macro PDF417
    Pdf417,
    /// GS1 DataBar Omnidirectional / Truncated / Stacked
    DataBar,
    /// GS1 DataBar Expanded and Expanded Stacked
    DataBarExpanded,
    /// Code 39
    Code39,
    /// Code 39 Full ASCII
    Code39Extended,
    /// Pharmazentralnummer (Code 39 with mod-11 check)
    Pzn,
}

impl BarcodeType {
    /// Every supported symbology, in result order
    pub const ALL: [BarcodeType; 8] = [
        BarcodeType::QrCode,
        BarcodeType::MicroQr,
        BarcodeType::Pdf417,
        BarcodeType::DataBar,
        BarcodeType::DataBarExpanded,
        BarcodeType::Code39,
        BarcodeType::Code39Extended,
        BarcodeType::Pzn,
    ];

    fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// Human readable name
    pub fn name(self) -> &'static str {
        match self {
            BarcodeType::QrCode => "QR Code",
            BarcodeType::MicroQr => "Micro QR",
            BarcodeType::Pdf417 => "PDF417",
            BarcodeType::DataBar => "GS1 DataBar",
            BarcodeType::DataBarExpanded => "GS1 DataBar Expanded",
            BarcodeType::Code39 => "Code 39",
            BarcodeType::Code39Extended => "Code 39 Extended",
            BarcodeType::Pzn => "PZN",
        }
    }
}

impl fmt::Display for BarcodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of symbologies a scan should look for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BarcodeTypes(u16);

impl BarcodeTypes {
    /// No symbology
    pub const NONE: BarcodeTypes = BarcodeTypes(0);
    /// Every symbology
    pub const ALL: BarcodeTypes = BarcodeTypes(0xFF);
    /// QR Code and Micro QR
    pub const QR_FAMILY: BarcodeTypes = BarcodeTypes(0b11);
    /// Code 39 and its variants
    pub const CODE39_FAMILY: BarcodeTypes = BarcodeTypes(0b1110_0000);

    /// Set holding a single symbology
    pub fn only(kind: BarcodeType) -> Self {
        BarcodeTypes(kind.bit())
    }

    /// Add a symbology
    pub fn with(self, kind: BarcodeType) -> Self {
        BarcodeTypes(self.0 | kind.bit())
    }

    /// Remove a symbology
    pub fn without(self, kind: BarcodeType) -> Self {
        BarcodeTypes(self.0 & !kind.bit())
    }

    /// True if `kind` is selected
    pub fn contains(self, kind: BarcodeType) -> bool {
        self.0 & kind.bit() != 0
    }

    /// True if any of `other` is selected
    pub fn intersects(self, other: BarcodeTypes) -> bool {
        self.0 & other.0 != 0
    }

    /// True when nothing is selected
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Selected symbologies in result order
    pub fn iter(self) -> impl Iterator<Item = BarcodeType> {
        BarcodeType::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl Default for BarcodeTypes {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromIterator<BarcodeType> for BarcodeTypes {
    fn from_iter<I: IntoIterator<Item = BarcodeType>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, |acc, kind| acc.with(kind))
    }
}

/// Position of one symbol within a multi-symbol message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuredAppend {
    /// Zero-based position in the sequence
    pub index: usize,
    /// Total number of symbols, when the symbol declares it
    pub count: Option<usize>,
    /// Sequence identifier (QR parity byte or Macro PDF417 file id)
    pub id: String,
}

/// A decoded symbol
#[derive(Debug, Clone, PartialEq)]
pub struct FoundBarcode {
    /// Symbology
    pub symbology: BarcodeType,
    /// Payload rendered as text
    pub text: String,
    /// Payload bytes as carried by the symbol
    pub bytes: Vec<u8>,
    /// Corners in image coordinates: top-left, top-right, bottom-right, bottom-left
    pub polygon: [Point; 4],
    /// Axis-aligned bounds of the polygon
    pub bounds: Rect,
    /// Fraction of error-correction capacity left unused, in [0, 1]
    pub confidence: f32,
    /// Sequence information for split messages
    pub structured_append: Option<StructuredAppend>,
}

impl FoundBarcode {
    /// Build a result, deriving bounds from the polygon
    pub fn new(
        symbology: BarcodeType,
        text: String,
        bytes: Vec<u8>,
        polygon: [Point; 4],
        confidence: f32,
    ) -> Self {
        Self {
            symbology,
            text,
            bytes,
            bounds: Rect::bounding(&polygon),
            polygon,
            confidence: confidence.clamp(0.0, 1.0),
            structured_append: None,
        }
    }

    /// Attach structured-append information
    pub fn with_structured_append(mut self, sa: Option<StructuredAppend>) -> Self {
        self.structured_append = sa;
        self
    }
}
