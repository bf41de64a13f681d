//! Format information: error-correction level and mask.
//!
//! Five data bits protected by a BCH(15,5) code and XOR-masked. Both copies
//! are read and the valid codeword with the smallest Hamming distance wins.
//! Reading the same modules from the transposed matrix gives the mirrored
//! candidate, which the caller compares against the forward one.

use super::tables;
use crate::models::{BitMatrix, ECLevel, MaskPattern, Version};
use std::sync::OnceLock;

const GENERATOR: u32 = 0x537;
const QR_MASK: u32 = 0x5412;
const MICRO_MASK: u32 = 0x4445;

/// Largest accepted Hamming distance to a valid format word
pub const MAX_FORMAT_DISTANCE: u32 = 3;

/// Five data bits followed by ten BCH bits
pub fn bch_format(data: u32) -> u32 {
    let mut rem = data;
    for _ in 0..10 {
        rem = (rem << 1) ^ ((rem >> 9) * GENERATOR);
    }
    (data << 10) | (rem & 0x3FF)
}

fn table(mask: u32) -> [u32; 32] {
    std::array::from_fn(|d| bch_format(d as u32) ^ mask)
}

fn qr_table() -> &'static [u32; 32] {
    static TABLE: OnceLock<[u32; 32]> = OnceLock::new();
    TABLE.get_or_init(|| table(QR_MASK))
}

fn micro_table() -> &'static [u32; 32] {
    static TABLE: OnceLock<[u32; 32]> = OnceLock::new();
    TABLE.get_or_init(|| table(MICRO_MASK))
}

/// Nearest valid word among `words` for any of the readings: (data, distance)
fn nearest(words: &[u32; 32], readings: &[u32]) -> (u32, u32) {
    let mut best = (0u32, u32::MAX);
    for &reading in readings {
        for (data, &word) in words.iter().enumerate() {
            let distance = (reading ^ word).count_ones();
            if distance < best.1 {
                best = (data as u32, distance);
            }
        }
    }
    best
}

/// Decoded format information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub version: Option<Version>,
    pub ec_level: ECLevel,
    pub mask: MaskPattern,
    /// Hamming distance of the reading to the accepted word
    pub distance: u32,
}

impl FormatInfo {
    pub fn is_valid(&self) -> bool {
        self.distance <= MAX_FORMAT_DISTANCE
    }
}

/// Encoded 15-bit word for a Model 2 symbol
pub fn qr_format_word(level: ECLevel, mask: MaskPattern) -> u32 {
    qr_table()[((level.format_bits() as usize) << 3) | mask as usize]
}

/// Encoded 15-bit word for a Micro QR symbol number and micro mask index
pub fn micro_format_word(symbol_number: u8, mask_index: u8) -> u32 {
    micro_table()[(((symbol_number & 7) as usize) << 2) | (mask_index & 3) as usize]
}

/// Module positions (column, row) of both Model 2 copies, most significant
/// bit first
pub fn qr_positions(dimension: usize) -> [[(usize, usize); 15]; 2] {
    let mut first = [(0, 0); 15];
    let mut k = 0;
    for x in 0..6 {
        first[k] = (x, 8);
        k += 1;
    }
    for p in [(7, 8), (8, 8), (8, 7)] {
        first[k] = p;
        k += 1;
    }
    for y in (0..6).rev() {
        first[k] = (8, y);
        k += 1;
    }
    let mut second = [(0, 0); 15];
    k = 0;
    for y in (dimension - 7..dimension).rev() {
        second[k] = (8, y);
        k += 1;
    }
    for x in dimension - 8..dimension {
        second[k] = (x, 8);
        k += 1;
    }
    [first, second]
}

/// Module positions of the single Micro QR copy, most significant bit first
pub fn micro_positions() -> [(usize, usize); 15] {
    let mut out = [(0, 0); 15];
    for (k, x) in (1..9).enumerate() {
        out[k] = (x, 8);
    }
    for (k, y) in (1..8).rev().enumerate() {
        out[8 + k] = (8, y);
    }
    out
}

fn read_word(modules: &BitMatrix, positions: &[(usize, usize)]) -> u32 {
    positions
        .iter()
        .fold(0u32, |acc, &(x, y)| (acc << 1) | modules.get(x, y) as u32)
}

/// Format information of a Model 2 module matrix
pub fn read_qr(modules: &BitMatrix) -> FormatInfo {
    let [first, second] = qr_positions(modules.width());
    let readings = [read_word(modules, &first), read_word(modules, &second)];
    let (data, distance) = nearest(qr_table(), &readings);
    FormatInfo {
        version: None,
        ec_level: ECLevel::from_format_bits((data >> 3) as u8),
        mask: MaskPattern::from_bits((data & 7) as u8),
        distance,
    }
}

/// Format information of a Micro QR module matrix; the symbol number fixes
/// the version and level
pub fn read_micro(modules: &BitMatrix) -> Option<FormatInfo> {
    let reading = read_word(modules, &micro_positions());
    let (data, distance) = nearest(micro_table(), &[reading]);
    let (version, ec_level) = tables::micro_symbol((data >> 2) as u8)?;
    Some(FormatInfo {
        version: Some(version),
        ec_level,
        mask: MaskPattern::from_micro_bits((data & 3) as u8),
        distance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_format_words() {
        assert_eq!(qr_format_word(ECLevel::M, MaskPattern::Pattern0), 0x5412);
        assert_eq!(qr_format_word(ECLevel::L, MaskPattern::Pattern0), 0x77C4);
        assert_eq!(bch_format(0b00001), 0b00001_0100110111);
    }

    #[test]
    fn test_nearest_tolerates_three_errors() {
        let word = qr_format_word(ECLevel::H, MaskPattern::Pattern5);
        let (data, distance) = nearest(qr_table(), &[word ^ 0b100_0000_0100_0001]);
        assert_eq!(data, (0b10 << 3) | 5);
        assert_eq!(distance, 3);
    }

    #[test]
    fn test_read_qr_from_second_copy() {
        let mut modules = BitMatrix::new(21, 21);
        let word = qr_format_word(ECLevel::Q, MaskPattern::Pattern3);
        let [_, second] = qr_positions(21);
        for (k, &(x, y)) in second.iter().enumerate() {
            modules.set(x, y, (word >> (14 - k)) & 1 == 1);
        }
        let info = read_qr(&modules);
        assert_eq!(info.ec_level, ECLevel::Q);
        assert_eq!(info.mask, MaskPattern::Pattern3);
        assert_eq!(info.distance, 0);
    }

    #[test]
    fn test_read_micro() {
        let mut modules = BitMatrix::new(13, 13);
        let word = micro_format_word(2, 1);
        for (k, &(x, y)) in micro_positions().iter().enumerate() {
            modules.set(x, y, (word >> (14 - k)) & 1 == 1);
        }
        let info = read_micro(&modules).unwrap();
        assert_eq!(info.version, Some(Version::Micro(2)));
        assert_eq!(info.ec_level, ECLevel::M);
        assert_eq!(info.mask, MaskPattern::Pattern4);
        assert!(info.is_valid());
    }
}
