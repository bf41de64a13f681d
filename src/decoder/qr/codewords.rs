//! Codeword placement: unmasking, the zig-zag module walk and block
//! de-interleaving with Reed-Solomon correction.

use super::function_mask::FunctionMask;
use super::tables::BlockLayout;
use crate::decoder::reed_solomon::{CodewordBlock, ReedSolomon};
use crate::models::{BitMatrix, MaskPattern, Version};
use tracing::trace;

/// XOR the mask pattern into every data module
pub fn unmask(modules: &mut BitMatrix, mask: MaskPattern, func: &FunctionMask) {
    let size = func.size();
    for y in 0..size {
        for x in 0..size {
            if !func.is_function(x, y) && mask.is_masked(y, x) {
                modules.toggle(x, y);
            }
        }
    }
}

/// Data module positions (column, row) in placement order: column pairs
/// from the right, alternating upward and downward, skipping the vertical
/// timing column of Model 2 symbols
pub fn zigzag(version: Version, func: &FunctionMask) -> Vec<(usize, usize)> {
    let size = func.size();
    let mut out = Vec::with_capacity(func.data_modules());
    let mut upward = true;
    let mut right = size as isize - 1;
    while right > 0 {
        if !version.is_micro() && right == 6 {
            right -= 1;
        }
        for k in 0..size {
            let y = if upward { size - 1 - k } else { k };
            for dx in 0..2 {
                let Some(x) = right.checked_sub(dx).filter(|&x| x >= 0) else {
                    continue;
                };
                let x = x as usize;
                if !func.is_function(x, y) {
                    out.push((x, y));
                }
            }
        }
        upward = !upward;
        right -= 2;
    }
    out
}

/// Raw codewords in placement order; a 4-bit codeword is returned in the
/// high nibble
pub fn read_codewords(modules: &BitMatrix, positions: &[(usize, usize)], layout: &BlockLayout) -> Vec<u8> {
    let total = layout.total_codewords();
    let half = layout.half_codeword();
    let mut out = Vec::with_capacity(total);
    let mut bits = positions.iter().map(|&(x, y)| modules.get(x, y));
    for index in 0..total {
        let width = if Some(index) == half { 4 } else { 8 };
        let mut value = 0u8;
        for _ in 0..width {
            value = (value << 1) | bits.next().unwrap_or(false) as u8;
        }
        out.push(value << (8 - width));
    }
    out
}

/// Split interleaved codewords into blocks, correct each and return the
/// concatenated data codewords with the lowest block confidence
pub fn correct_blocks(raw: &[u8], layout: &BlockLayout) -> Option<(Vec<u8>, f32)> {
    let blocks = layout.data.len();
    let ec = layout.ec_per_block;
    if raw.len() < layout.total_codewords() || blocks == 0 {
        return None;
    }
    let longest = layout.data.iter().copied().max().unwrap_or(0);
    let mut split: Vec<Vec<u32>> = layout.data.iter().map(|&d| Vec::with_capacity(d + ec)).collect();
    let mut it = raw.iter().map(|&b| b as u32);
    for i in 0..longest {
        for (b, block) in split.iter_mut().enumerate() {
            if i < layout.data[b] {
                block.push(it.next()?);
            }
        }
    }
    for _ in 0..ec {
        for block in split.iter_mut() {
            block.push(it.next()?);
        }
    }

    let rs = ReedSolomon::qr(ec);
    let mut data = Vec::with_capacity(layout.data_codewords());
    let mut confidence = 1.0f32;
    for (b, codewords) in split.into_iter().enumerate() {
        let mut block = CodewordBlock::new(codewords);
        match rs.decode(&mut block) {
            Ok(c) => confidence = confidence.min(c.confidence),
            Err(e) => {
                trace!(block = b, error = %e, "qr block uncorrectable");
                return None;
            }
        }
        data.extend(block.codewords[..layout.data[b]].iter().map(|&c| c as u8));
    }
    Some((data, confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ECLevel;

    #[test]
    fn test_zigzag_covers_every_data_module() {
        for version in [Version::Model2(1), Version::Model2(7), Version::Micro(3)] {
            let func = FunctionMask::new(version);
            let walk = zigzag(version, &func);
            assert_eq!(walk.len(), func.data_modules());
            let mut seen = BitMatrix::new(func.size(), func.size());
            for &(x, y) in &walk {
                assert!(!seen.get(x, y));
                seen.set(x, y, true);
            }
        }
    }

    #[test]
    fn test_zigzag_starts_bottom_right_upward() {
        let func = FunctionMask::new(Version::Model2(1));
        let walk = zigzag(Version::Model2(1), &func);
        assert_eq!(&walk[..4], &[(20, 20), (19, 20), (20, 19), (19, 19)]);
    }

    #[test]
    fn test_unmask_skips_function_modules() {
        let func = FunctionMask::new(Version::Model2(1));
        let mut modules = BitMatrix::new(21, 21);
        unmask(&mut modules, MaskPattern::Pattern0, &func);
        assert!(!modules.get(0, 0));
        assert!(modules.get(10, 10));
        assert!(!modules.get(11, 10));
    }

    #[test]
    fn test_half_codeword_read_as_high_nibble() {
        let layout = BlockLayout::for_symbol(Version::Micro(1), ECLevel::L).unwrap();
        let mut modules = BitMatrix::new(36, 1);
        // codewords 0xFF, 0x00, 0xA (half), then 0x81, 0x7E
        let bits = ["11111111", "00000000", "1010", "10000001", "01111110"].concat();
        for (x, c) in bits.chars().enumerate() {
            modules.set(x, 0, c == '1');
        }
        let positions: Vec<(usize, usize)> = (0..36).map(|x| (x, 0)).collect();
        assert_eq!(read_codewords(&modules, &positions, &layout), vec![0xFF, 0x00, 0xA0, 0x81, 0x7E]);
    }

    #[test]
    fn test_correct_blocks_deinterleaves() {
        let layout = BlockLayout::for_symbol(Version::Model2(5), ECLevel::Q).unwrap();
        let rs = ReedSolomon::qr(layout.ec_per_block);
        let blocks: Vec<Vec<u32>> = layout
            .data
            .iter()
            .enumerate()
            .map(|(b, &len)| rs.encode(&(0..len as u32).map(|i| (i * 7 + b as u32) % 256).collect::<Vec<_>>()))
            .collect();
        let mut raw = Vec::new();
        for i in 0..16 {
            for (b, block) in blocks.iter().enumerate() {
                if i < layout.data[b] {
                    raw.push(block[i] as u8);
                }
            }
        }
        for i in 0..layout.ec_per_block {
            for (b, block) in blocks.iter().enumerate() {
                raw.push(block[layout.data[b] + i] as u8);
            }
        }
        raw[3] ^= 0x55;
        raw[100] ^= 0x01;
        let (data, confidence) = correct_blocks(&raw, &layout).expect("corrected");
        assert_eq!(data.len(), 62);
        assert_eq!(data[0], 0);
        assert_eq!(data[14], 98);
        assert_eq!(data[15], 1);
        assert!(confidence < 1.0);
    }
}
