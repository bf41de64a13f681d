//! Codeword capacity and block structure per version and level.

use crate::models::{ECLevel, Version};

// [level L, M, Q, H][version]
const ECC_PER_BLOCK: [[u8; 41]; 4] = [
    [
        0, 7, 10, 15, 20, 26, 18, 20, 24, 30, 18, 20, 24, 26, 30, 22, 24, 28, 30, 28, 28, 28, 28,
        30, 30, 26, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ],
    [
        0, 10, 16, 26, 18, 24, 16, 18, 22, 22, 26, 30, 22, 22, 24, 24, 28, 28, 26, 26, 26, 26, 28,
        28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28,
    ],
    [
        0, 13, 22, 18, 26, 18, 24, 18, 22, 20, 24, 28, 26, 24, 20, 30, 24, 28, 28, 26, 30, 28, 30,
        30, 30, 30, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ],
    [
        0, 17, 28, 22, 16, 22, 28, 26, 26, 24, 28, 24, 28, 22, 24, 24, 30, 28, 28, 26, 28, 30, 24,
        30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ],
];

const BLOCK_COUNT: [[u8; 41]; 4] = [
    [
        0, 1, 1, 1, 1, 1, 2, 2, 2, 2, 4, 4, 4, 4, 4, 6, 6, 6, 6, 7, 8, 8, 9, 9, 10, 12, 12, 12,
        13, 14, 15, 16, 17, 18, 19, 19, 20, 21, 22, 24, 25,
    ],
    [
        0, 1, 1, 1, 2, 2, 4, 4, 4, 5, 5, 5, 8, 9, 9, 10, 10, 11, 13, 14, 16, 17, 17, 18, 20, 21,
        23, 25, 26, 28, 29, 31, 33, 35, 37, 38, 40, 43, 45, 47, 49,
    ],
    [
        0, 1, 1, 2, 2, 4, 4, 6, 6, 8, 8, 8, 10, 12, 16, 12, 17, 16, 18, 21, 20, 23, 23, 25, 27,
        29, 34, 34, 35, 38, 40, 43, 45, 48, 51, 53, 56, 59, 62, 65, 68,
    ],
    [
        0, 1, 1, 2, 4, 4, 4, 5, 6, 8, 8, 11, 11, 16, 16, 18, 16, 19, 21, 25, 25, 25, 34, 30, 32,
        35, 37, 40, 42, 45, 48, 51, 54, 57, 60, 63, 66, 70, 74, 77, 81,
    ],
];

/// Micro QR (version, level, data codewords, ec codewords, data bits)
const MICRO: [(u8, ECLevel, usize, usize, usize); 8] = [
    (1, ECLevel::L, 3, 2, 20),
    (2, ECLevel::L, 5, 5, 40),
    (2, ECLevel::M, 4, 6, 32),
    (3, ECLevel::L, 11, 6, 84),
    (3, ECLevel::M, 9, 8, 68),
    (4, ECLevel::L, 16, 8, 128),
    (4, ECLevel::M, 14, 10, 112),
    (4, ECLevel::Q, 10, 14, 80),
];

/// Micro QR version and level for a format symbol number (0..=7)
pub fn micro_symbol(number: u8) -> Option<(Version, ECLevel)> {
    MICRO
        .get(number as usize)
        .map(|&(v, level, ..)| (Version::Micro(v), level))
}

/// Format symbol number of a Micro QR version and level
pub fn micro_symbol_number(version: u8, level: ECLevel) -> Option<u8> {
    MICRO
        .iter()
        .position(|&(v, l, ..)| v == version && l == level)
        .map(|p| p as u8)
}

/// Modules available for codewords in a Model 2 symbol
pub fn raw_data_modules(version: u8) -> usize {
    let v = version as usize;
    let mut modules = (16 * v + 128) * v + 64;
    if v >= 2 {
        let align = v / 7 + 2;
        modules -= (25 * align - 10) * align - 55;
        if v >= 7 {
            modules -= 36;
        }
    }
    modules
}

/// Error-correction block structure of a symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    /// Data codewords of each block, short blocks first
    pub data: Vec<usize>,
    /// Error-correction codewords per block
    pub ec_per_block: usize,
    /// Data bits the symbol carries (less than `8 * data` for M1 and M3)
    pub data_bits: usize,
}

impl BlockLayout {
    pub fn for_symbol(version: Version, level: ECLevel) -> Option<Self> {
        match version {
            Version::Model2(v) => Self::model2(v, level),
            Version::Micro(v) => Self::micro(v, level),
        }
    }

    fn model2(version: u8, level: ECLevel) -> Option<Self> {
        if !(1..=40).contains(&version) {
            return None;
        }
        let ec = ECC_PER_BLOCK[level.ordinal()][version as usize] as usize;
        let blocks = BLOCK_COUNT[level.ordinal()][version as usize] as usize;
        let total = raw_data_modules(version) / 8;
        let data_total = total.checked_sub(ec * blocks)?;
        let short = total / blocks - ec;
        let long_blocks = total % blocks;
        let data = (0..blocks)
            .map(|b| if b < blocks - long_blocks { short } else { short + 1 })
            .collect::<Vec<_>>();
        debug_assert_eq!(data.iter().sum::<usize>(), data_total);
        Some(Self {
            data,
            ec_per_block: ec,
            data_bits: data_total * 8,
        })
    }

    fn micro(version: u8, level: ECLevel) -> Option<Self> {
        let &(_, _, data, ec, bits) = MICRO.iter().find(|&&(v, l, ..)| v == version && l == level)?;
        Some(Self {
            data: vec![data],
            ec_per_block: ec,
            data_bits: bits,
        })
    }

    pub fn data_codewords(&self) -> usize {
        self.data.iter().sum()
    }

    pub fn total_codewords(&self) -> usize {
        self.data_codewords() + self.ec_per_block * self.data.len()
    }

    /// Index of a 4-bit data codeword (last data codeword of M1 and M3)
    pub fn half_codeword(&self) -> Option<usize> {
        let count = self.data_codewords();
        (self.data_bits < count * 8).then(|| count - 1)
    }
}
