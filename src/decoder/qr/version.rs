//! Version information for Model 2 symbols of version 7 and up.
//!
//! Six version bits plus a twelve-bit BCH remainder, stored twice: a 3x6
//! block left of the top-right finder and its transpose above the
//! bottom-left finder.

use crate::models::BitMatrix;
use std::sync::OnceLock;

const GENERATOR: u32 = 0x1F25;
/// BCH(18,6) corrects three bit errors
const MAX_VERSION_DISTANCE: u32 = 3;

/// 18-bit version word
pub fn version_word(version: u8) -> u32 {
    let data = version as u32;
    let mut rem = data;
    for _ in 0..12 {
        rem = (rem << 1) ^ ((rem >> 11) * GENERATOR);
    }
    (data << 12) | (rem & 0xFFF)
}

fn words() -> &'static [u32; 34] {
    static WORDS: OnceLock<[u32; 34]> = OnceLock::new();
    WORDS.get_or_init(|| std::array::from_fn(|i| version_word(i as u8 + 7)))
}

/// Module (column, row) of version bit `i` (least significant first) in the
/// top-right block; the bottom-left block is its transpose
pub fn version_position(dimension: usize, i: usize) -> (usize, usize) {
    (dimension - 11 + i % 3, i / 3)
}

fn read_block(modules: &BitMatrix, transposed: bool) -> u32 {
    let dimension = modules.width();
    (0..18).fold(0u32, |acc, i| {
        let (x, y) = version_position(dimension, i);
        let (x, y) = if transposed { (y, x) } else { (x, y) };
        acc | ((modules.get(x, y) as u32) << i)
    })
}

/// Version encoded in the matrix, if either block is within correction range
pub fn read_version(modules: &BitMatrix) -> Option<u8> {
    if modules.width() < 45 {
        return None;
    }
    let readings = [read_block(modules, false), read_block(modules, true)];
    let (index, distance) = readings
        .iter()
        .flat_map(|&r| words().iter().enumerate().map(move |(i, &w)| (i, (r ^ w).count_ones())))
        .min_by_key(|&(_, d)| d)?;
    (distance <= MAX_VERSION_DISTANCE).then_some(index as u8 + 7)
}
