//! QR Code and Micro QR fixture matrices.

use crate::decoder::qr::codewords::zigzag;
use crate::decoder::qr::format::{micro_format_word, micro_positions, qr_format_word, qr_positions};
use crate::decoder::qr::function_mask::{alignment_centres, FunctionMask};
use crate::decoder::qr::tables::{micro_symbol_number, BlockLayout};
use crate::decoder::qr::version::{version_position, version_word};
use crate::decoder::reed_solomon::ReedSolomon;
use crate::models::{BitMatrix, ECLevel, MaskPattern, Version};

const ALPHANUMERIC: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

/// One data segment
#[derive(Debug, Clone)]
pub enum Segment {
    Numeric(String),
    Alphanumeric(String),
    Byte(Vec<u8>),
    Eci(u32),
    Fnc1First,
    StructuredAppend { index: u8, count: u8, parity: u8 },
}

#[derive(Default)]
struct Bits(Vec<bool>);

impl Bits {
    fn put(&mut self, value: u32, width: usize) {
        for i in (0..width).rev() {
            self.0.push((value >> i) & 1 == 1);
        }
    }
}

fn count_bits(version: Version, mode: usize) -> usize {
    match version {
        Version::Micro(m) => {
            let m = m as usize;
            [m + 2, m + 1, m + 1, m][mode]
        }
        Version::Model2(v) => {
            let class = match v {
                0..=9 => 0,
                10..=26 => 1,
                _ => 2,
            };
            [[10, 12, 14], [9, 11, 13], [8, 16, 16]][mode][class]
        }
    }
}

fn mode_indicator(bits: &mut Bits, version: Version, mode: usize) {
    match version {
        Version::Micro(m) => bits.put(mode as u32, m as usize - 1),
        Version::Model2(_) => bits.put([0b0001, 0b0010, 0b0100][mode], 4),
    }
}

fn segment_bits(bits: &mut Bits, version: Version, segment: &Segment) {
    match segment {
        Segment::Numeric(digits) => {
            mode_indicator(bits, version, 0);
            bits.put(digits.len() as u32, count_bits(version, 0));
            for chunk in digits.as_bytes().chunks(3) {
                let value = chunk.iter().fold(0u32, |acc, &d| acc * 10 + (d - b'0') as u32);
                bits.put(value, [0, 4, 7, 10][chunk.len()]);
            }
        }
        Segment::Alphanumeric(text) => {
            mode_indicator(bits, version, 1);
            bits.put(text.len() as u32, count_bits(version, 1));
            let values: Vec<u32> = text
                .bytes()
                .map(|c| ALPHANUMERIC.iter().position(|&a| a == c).unwrap_or(0) as u32)
                .collect();
            for pair in values.chunks(2) {
                match pair {
                    [a, b] => bits.put(a * 45 + b, 11),
                    [a] => bits.put(*a, 6),
                    _ => {}
                }
            }
        }
        Segment::Byte(data) => {
            mode_indicator(bits, version, 2);
            bits.put(data.len() as u32, count_bits(version, 2));
            for &b in data {
                bits.put(b as u32, 8);
            }
        }
        Segment::Eci(value) => {
            bits.put(0b0111, 4);
            match *value {
                v if v < 128 => bits.put(v, 8),
                v if v < 16384 => bits.put(0x8000 | v, 16),
                v => bits.put(0xC0_0000 | v, 24),
            }
        }
        Segment::Fnc1First => bits.put(0b0101, 4),
        Segment::StructuredAppend { index, count, parity } => {
            bits.put(0b0011, 4);
            bits.put(*index as u32, 4);
            bits.put(*count as u32 - 1, 4);
            bits.put(*parity as u32, 8);
        }
    }
}

/// Data codewords: segments, terminator, bit padding and pad codewords.
/// A trailing 4-bit codeword sits in the high nibble.
fn data_codewords(version: Version, layout: &BlockLayout, segments: &[Segment]) -> Option<Vec<u32>> {
    let mut bits = Bits::default();
    for segment in segments {
        segment_bits(&mut bits, version, segment);
    }
    let capacity = layout.data_bits;
    if bits.0.len() > capacity {
        return None;
    }
    let terminator = match version {
        Version::Micro(m) => 2 * m as usize + 1,
        Version::Model2(_) => 4,
    };
    let room = capacity - bits.0.len();
    bits.put(0, terminator.min(room));
    let boundary = bits.0.len().div_ceil(8) * 8;
    bits.put(0, boundary.min(capacity) - bits.0.len());
    let mut pad = [0xECu32, 0x11].into_iter().cycle();
    while capacity - bits.0.len() >= 8 {
        bits.put(pad.next().unwrap_or(0), 8);
    }
    let remaining = capacity - bits.0.len();
    bits.put(0, remaining);
    let codewords = bits
        .0
        .chunks(8)
        .map(|c| c.iter().fold(0u32, |acc, &b| (acc << 1) | b as u32) << (8 - c.len()))
        .collect();
    Some(codewords)
}

/// Parity per block, then interleaved: data column-wise, then parity
fn final_codewords(layout: &BlockLayout, data: &[u32]) -> Vec<u32> {
    let rs = ReedSolomon::qr(layout.ec_per_block);
    let mut blocks = Vec::new();
    let mut at = 0;
    for &len in &layout.data {
        blocks.push(rs.encode(&data[at..at + len]));
        at += len;
    }
    let longest = layout.data.iter().copied().max().unwrap_or(0);
    let mut out = Vec::with_capacity(layout.total_codewords());
    for i in 0..longest {
        for (b, block) in blocks.iter().enumerate() {
            if i < layout.data[b] {
                out.push(block[i]);
            }
        }
    }
    for i in 0..layout.ec_per_block {
        for (b, block) in blocks.iter().enumerate() {
            out.push(block[layout.data[b] + i]);
        }
    }
    out
}

fn draw_finder(m: &mut BitMatrix, x0: usize, y0: usize) {
    for dy in 0..7 {
        for dx in 0..7 {
            let chebyshev = (dx as i32 - 3).abs().max((dy as i32 - 3).abs());
            m.set(x0 + dx, y0 + dy, chebyshev != 2);
        }
    }
}

fn place_data(m: &mut BitMatrix, version: Version, layout: &BlockLayout, codewords: &[u32], func: &FunctionMask) {
    let half = layout.half_codeword();
    let mut stream = Vec::new();
    for (index, &cw) in codewords.iter().enumerate() {
        let width = if Some(index) == half { 4 } else { 8 };
        for k in 0..width {
            stream.push((cw >> (7 - k)) & 1 == 1);
        }
    }
    for (i, (x, y)) in zigzag(version, func).into_iter().enumerate() {
        m.set(x, y, stream.get(i).copied().unwrap_or(false));
    }
}

fn apply_mask(m: &mut BitMatrix, mask: MaskPattern, func: &FunctionMask) {
    for y in 0..func.size() {
        for x in 0..func.size() {
            if !func.is_function(x, y) && mask.is_masked(y, x) {
                m.toggle(x, y);
            }
        }
    }
}

/// Model 2 symbol of `version` with the given level and mask, if the
/// segments fit
pub fn qr_modules(version: u8, level: ECLevel, mask: MaskPattern, segments: &[Segment]) -> Option<BitMatrix> {
    let v = Version::Model2(version);
    let size = v.size();
    let layout = BlockLayout::for_symbol(v, level)?;
    let codewords = final_codewords(&layout, &data_codewords(v, &layout, segments)?);
    let func = FunctionMask::new(v);
    let mut m = BitMatrix::new(size, size);

    draw_finder(&mut m, 0, 0);
    draw_finder(&mut m, size - 7, 0);
    draw_finder(&mut m, 0, size - 7);
    for i in 8..size - 8 {
        m.set(i, 6, i % 2 == 0);
        m.set(6, i, i % 2 == 0);
    }
    for (cx, cy) in alignment_centres(version) {
        for dy in 0..5 {
            for dx in 0..5 {
                let chebyshev = (dx as i32 - 2).abs().max((dy as i32 - 2).abs());
                m.set(cx - 2 + dx, cy - 2 + dy, chebyshev != 1);
            }
        }
    }
    m.set(8, size - 8, true);

    place_data(&mut m, v, &layout, &codewords, &func);
    apply_mask(&mut m, mask, &func);

    let word = qr_format_word(level, mask);
    for copy in qr_positions(size) {
        for (k, &(x, y)) in copy.iter().enumerate() {
            m.set(x, y, (word >> (14 - k)) & 1 == 1);
        }
    }
    if version >= 7 {
        let word = version_word(version);
        for i in 0..18 {
            let (x, y) = version_position(size, i);
            let bit = (word >> i) & 1 == 1;
            m.set(x, y, bit);
            m.set(y, x, bit);
        }
    }
    Some(m)
}

/// Micro QR symbol M`version`; `mask_index` selects one of the four micro masks
pub fn micro_modules(version: u8, level: ECLevel, mask_index: u8, segments: &[Segment]) -> Option<BitMatrix> {
    let v = Version::Micro(version);
    let size = v.size();
    let layout = BlockLayout::for_symbol(v, level)?;
    let codewords = final_codewords(&layout, &data_codewords(v, &layout, segments)?);
    let func = FunctionMask::new(v);
    let mut m = BitMatrix::new(size, size);

    draw_finder(&mut m, 0, 0);
    for i in 8..size {
        m.set(i, 0, i % 2 == 0);
        m.set(0, i, i % 2 == 0);
    }
    place_data(&mut m, v, &layout, &codewords, &func);
    apply_mask(&mut m, MaskPattern::from_micro_bits(mask_index), &func);

    let number = micro_symbol_number(version, level)?;
    let word = micro_format_word(number, mask_index);
    for (k, &(x, y)) in micro_positions().iter().enumerate() {
        m.set(x, y, (word >> (14 - k)) & 1 == 1);
    }
    Some(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_world_codewords() {
        let v = Version::Model2(1);
        let layout = BlockLayout::for_symbol(v, ECLevel::M).expect("layout");
        let data = data_codewords(v, &layout, &[Segment::Alphanumeric("HELLO WORLD".into())]).expect("fits");
        assert_eq!(&data[..4], &[0x20, 0x5B, 0x0B, 0x78]);
        assert_eq!(&data[13..], &[0x11, 0xEC, 0x11]);
    }

    #[test]
    fn test_finder_drawn() {
        let m = micro_modules(1, ECLevel::L, 0, &[Segment::Numeric("12345".into())]).expect("fits");
        assert!(m.get(3, 3));
        assert!(!m.get(1, 3));
        assert!(m.get(0, 6));
        assert!(m.get(10, 0));
    }
}
