//! Function-pattern exclusion masks: modules that never carry codeword bits.

use crate::models::{BitMatrix, Version};

/// `true` marks a function module (finder, separator, timing, alignment,
/// format or version information)
#[derive(Debug, Clone)]
pub struct FunctionMask {
    mask: BitMatrix,
}

impl FunctionMask {
    pub fn new(version: Version) -> Self {
        match version {
            Version::Model2(v) => Self::model2(v),
            Version::Micro(v) => Self::micro(v),
        }
    }

    fn model2(version: u8) -> Self {
        let size = Version::Model2(version).size();
        let mut mask = BitMatrix::new(size, size);

        // finders with their separators
        mask.set_region(0, 0, 9, 9);
        mask.set_region(size - 8, 0, 8, 9);
        mask.set_region(0, size - 8, 9, 8);

        for i in 0..size {
            mask.set(6, i, true);
            mask.set(i, 6, true);
        }

        for (cx, cy) in alignment_centres(version) {
            mask.set_region(cx - 2, cy - 2, 5, 5);
        }

        if version >= 7 {
            mask.set_region(size - 11, 0, 3, 6);
            mask.set_region(0, size - 11, 6, 3);
        }
        Self { mask }
    }

    fn micro(version: u8) -> Self {
        let size = Version::Micro(version).size();
        let mut mask = BitMatrix::new(size, size);
        // finder, separator and format information
        mask.set_region(0, 0, 9, 9);
        for i in 0..size {
            mask.set(i, 0, true);
            mask.set(0, i, true);
        }
        Self { mask }
    }

    pub fn size(&self) -> usize {
        self.mask.width()
    }

    pub fn is_function(&self, x: usize, y: usize) -> bool {
        self.mask.get(x, y)
    }

    pub fn data_modules(&self) -> usize {
        self.size() * self.size() - self.mask.count_ones()
    }
}

/// Row/column coordinates of alignment pattern centres
pub fn alignment_positions(version: u8) -> Vec<usize> {
    if version < 2 {
        return Vec::new();
    }
    let count = version as usize / 7 + 2;
    let size = Version::Model2(version).size();
    let step = if version == 32 {
        26
    } else {
        (version as usize * 4 + count * 2 + 1) / (2 * count - 2) * 2
    };
    let mut positions = vec![6usize; count];
    for (k, slot) in positions.iter_mut().skip(1).rev().enumerate() {
        *slot = size - 7 - k * step;
    }
    positions
}

/// Centres (column, row) of the alignment patterns actually drawn: the
/// position grid minus the three finder corners
pub fn alignment_centres(version: u8) -> Vec<(usize, usize)> {
    let positions = alignment_positions(version);
    let (Some(&first), Some(&last)) = (positions.first(), positions.last()) else {
        return Vec::new();
    };
    let mut centres = Vec::new();
    for &cy in &positions {
        for &cx in &positions {
            let finder = (cx == first && cy == first) || (cx == last && cy == first) || (cx == first && cy == last);
            if !finder {
                centres.push((cx, cy));
            }
        }
    }
    centres
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::qr::tables::raw_data_modules;

    #[test]
    fn test_alignment_positions() {
        assert!(alignment_positions(1).is_empty());
        assert_eq!(alignment_positions(2), vec![6, 18]);
        assert_eq!(alignment_positions(7), vec![6, 22, 38]);
        assert_eq!(alignment_positions(32), vec![6, 34, 60, 86, 112, 138]);
        assert_eq!(alignment_positions(40), vec![6, 30, 58, 86, 114, 142, 170]);
        assert_eq!(alignment_centres(7).len(), 6);
    }

    #[test]
    fn test_data_module_counts_match_capacity() {
        for v in [1u8, 2, 6, 7, 14, 21, 32, 40] {
            assert_eq!(FunctionMask::new(Version::Model2(v)).data_modules(), raw_data_modules(v), "version {v}");
        }
    }

    #[test]
    fn test_micro_mask() {
        let mask = FunctionMask::new(Version::Micro(1));
        assert_eq!(mask.size(), 11);
        // 121 modules minus finder block, row 0 and column 0 beyond it
        assert_eq!(mask.data_modules(), 121 - 81 - 2 * 2);
        assert!(mask.is_function(10, 0));
        assert!(!mask.is_function(10, 10));
    }
}
