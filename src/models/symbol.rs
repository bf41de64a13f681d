use super::BitMatrix;

/// Matrix-code version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// QR Code Model 2 (versions 1-40)
    Model2(u8),
    /// Micro QR code (versions M1-M4)
    Micro(u8),
}

impl Version {
    /// Get the version number
    pub fn number(&self) -> u8 {
        match self {
            Version::Model2(v) | Version::Micro(v) => *v,
        }
    }

    /// Get the size in modules (width = height)
    pub fn size(&self) -> usize {
        match self {
            Version::Model2(v) => 4 * (*v as usize) + 17,
            Version::Micro(v) => 2 * (*v as usize) + 9,
        }
    }

    /// Check if this is a Micro QR code
    pub fn is_micro(&self) -> bool {
        matches!(self, Version::Micro(_))
    }

    /// Version for a symbol dimension, if one exists
    pub fn from_dimension(dimension: usize, micro: bool) -> Option<Self> {
        if micro {
            if (11..=17).contains(&dimension) && dimension % 2 == 1 {
                return Some(Version::Micro(((dimension - 9) / 2) as u8));
            }
            return None;
        }
        if dimension < 21 || (dimension - 17) % 4 != 0 {
            return None;
        }
        let v = (dimension - 17) / 4;
        (1..=40).contains(&v).then_some(Version::Model2(v as u8))
    }
}

/// Error correction level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ECLevel {
    /// Low (~7% recovery capacity)
    L,
    /// Medium (~15% recovery capacity)
    M,
    /// Quartile (~25% recovery capacity)
    Q,
    /// High (~30% recovery capacity)
    H,
}

impl ECLevel {
    /// Level from the two format-information bits (01=L, 00=M, 11=Q, 10=H)
    pub fn from_format_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b01 => ECLevel::L,
            0b00 => ECLevel::M,
            0b11 => ECLevel::Q,
            _ => ECLevel::H,
        }
    }

    /// Inverse of [`ECLevel::from_format_bits`]
    pub fn format_bits(self) -> u8 {
        match self {
            ECLevel::L => 0b01,
            ECLevel::M => 0b00,
            ECLevel::Q => 0b11,
            ECLevel::H => 0b10,
        }
    }

    /// Row index into the block tables (L, M, Q, H)
    pub fn ordinal(self) -> usize {
        match self {
            ECLevel::L => 0,
            ECLevel::M => 1,
            ECLevel::Q => 2,
            ECLevel::H => 3,
        }
    }
}

/// Mask pattern (0-7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskPattern {
    /// (i + j) % 2 == 0
    Pattern0 = 0,
    /// i % 2 == 0
    Pattern1 = 1,
    /// j % 3 == 0
    Pattern2 = 2,
    /// (i + j) % 3 == 0
    Pattern3 = 3,
    /// (i/2 + j/3) % 2 == 0
    Pattern4 = 4,
    /// (i*j)%2 + (i*j)%3 == 0
    Pattern5 = 5,
    /// ((i*j)%2 + (i*j)%3) % 2 == 0
    Pattern6 = 6,
    /// ((i+j)%2 + (i*j)%3) % 2 == 0
    Pattern7 = 7,
}

impl MaskPattern {
    /// Get mask pattern from bits
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => MaskPattern::Pattern0,
            1 => MaskPattern::Pattern1,
            2 => MaskPattern::Pattern2,
            3 => MaskPattern::Pattern3,
            4 => MaskPattern::Pattern4,
            5 => MaskPattern::Pattern5,
            6 => MaskPattern::Pattern6,
            _ => MaskPattern::Pattern7,
        }
    }

    /// Micro QR uses a subset of four masks addressed by two bits
    pub fn from_micro_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => MaskPattern::Pattern1,
            1 => MaskPattern::Pattern4,
            2 => MaskPattern::Pattern6,
            _ => MaskPattern::Pattern7,
        }
    }

    /// Check if module at row `i`, column `j` should be masked
    pub fn is_masked(&self, i: usize, j: usize) -> bool {
        match self {
            MaskPattern::Pattern0 => (i + j) % 2 == 0,
            MaskPattern::Pattern1 => i % 2 == 0,
            MaskPattern::Pattern2 => j % 3 == 0,
            MaskPattern::Pattern3 => (i + j) % 3 == 0,
            MaskPattern::Pattern4 => (i / 2 + j / 3) % 2 == 0,
            MaskPattern::Pattern5 => ((i * j) % 2 + (i * j) % 3) == 0,
            MaskPattern::Pattern6 => (((i * j) % 2) + ((i * j) % 3)) % 2 == 0,
            MaskPattern::Pattern7 => (((i + j) % 2) + ((i * j) % 3)) % 2 == 0,
        }
    }
}

/// Sampled module grid of a matrix code plus the metadata read from it.
///
/// `modules` is mutated in place while unmasking; `mirrored` records that the
/// grid was transposed after the format check preferred the mirrored reading.
#[derive(Debug, Clone)]
pub struct SymbolMatrix {
    /// Module values, `true` = dark
    pub modules: BitMatrix,
    /// Version (and therefore dimension)
    pub version: Version,
    /// Error correction level from the format information
    pub ec_level: ECLevel,
    /// Mask from the format information
    pub mask: MaskPattern,
    /// Hamming distance of the accepted format word
    pub format_distance: u32,
    /// Set once the module grid has been transposed to undo a mirror image
    pub mirrored: bool,
}

impl SymbolMatrix {
    /// Modules per side
    pub fn dimension(&self) -> usize {
        self.modules.width()
    }
}
