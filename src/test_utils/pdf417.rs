//! PDF417 fixture symbols.

use crate::decoder::pdf417::codewords::{self, START_PATTERN, STOP_PATTERN};
use crate::decoder::pdf417::payload::{M_LATCH_BYTE, M_LATCH_BYTE_M6};
use crate::decoder::pdf417::Pdf417Header;
use crate::decoder::reed_solomon::ReedSolomon;
use crate::models::BitMatrix;

/// Module rows per symbol row
pub const ROW_HEIGHT: usize = 3;

/// Byte compaction codewords for `bytes`, latch included
pub fn byte_data(bytes: &[u8]) -> Vec<u32> {
    let latch = if bytes.len() % 6 == 0 {
        M_LATCH_BYTE_M6
    } else {
        M_LATCH_BYTE
    };
    let mut out = vec![latch];
    for chunk in bytes.chunks(6) {
        if chunk.len() < 6 {
            out.extend(chunk.iter().map(|&b| b as u32));
            continue;
        }
        let mut value = chunk.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        let mut group = [0u32; 5];
        for slot in group.iter_mut().rev() {
            *slot = (value % 900) as u32;
            value /= 900;
        }
        out.extend(group);
    }
    out
}

/// A complete symbol: header plus every codeword, row-major
#[derive(Debug, Clone)]
pub struct Pdf417Symbol {
    pub header: Pdf417Header,
    pub codewords: Vec<u32>,
}

impl Pdf417Symbol {
    /// Lay out `data` (without length descriptor) with padding and parity
    pub fn new(data: &[u32], ec_level: u8, columns: usize) -> Option<Self> {
        let parity = 2usize << ec_level;
        let rows = (data.len() + 1 + parity).div_ceil(columns.max(1)).max(3);
        let header = Pdf417Header::new(rows, columns, ec_level)?;
        let data_len = header.codeword_count() - parity;
        let mut body = Vec::with_capacity(data_len);
        body.push(data_len as u32);
        body.extend_from_slice(data);
        body.resize(data_len, 900);
        let codewords = ReedSolomon::pdf417(parity).encode(&body);
        Some(Self { header, codewords })
    }

    /// Left and right row indicator values of `row`
    pub fn indicators(&self, row: usize) -> (u32, u32) {
        let h = &self.header;
        let group = 30 * (row / 3) as u32;
        let rows_hi = ((h.rows - 1) / 3) as u32;
        let ec_rows = h.ec_level as u32 * 3 + ((h.rows - 1) % 3) as u32;
        let cols = (h.columns - 1) as u32;
        let (l, r) = match row % 3 {
            0 => (rows_hi, cols),
            1 => (ec_rows, rows_hi),
            _ => (cols, ec_rows),
        };
        (group + l, group + r)
    }

    /// Module matrix, each symbol row `ROW_HEIGHT` modules tall
    pub fn modules(&self) -> BitMatrix {
        let h = self.header;
        let mut out = BitMatrix::new(h.module_width(), h.rows * ROW_HEIGHT);
        for row in 0..h.rows {
            let cluster = Pdf417Header::cluster(row);
            let (left, right) = self.indicators(row);
            let mut values = vec![left];
            values.extend_from_slice(&self.codewords[row * h.columns..(row + 1) * h.columns]);
            values.push(right);

            let mut widths: Vec<u32> = START_PATTERN.iter().map(|&w| w as u32).collect();
            for value in values {
                if let Some(p) = codewords::pattern(cluster, value as u16) {
                    widths.extend_from_slice(&p);
                }
            }
            widths.extend(STOP_PATTERN.iter().map(|&w| w as u32));

            let mut x = 0usize;
            for (i, &w) in widths.iter().enumerate() {
                if i % 2 == 0 {
                    out.set_region(x, row * ROW_HEIGHT, w as usize, ROW_HEIGHT);
                }
                x += w as usize;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_layout() {
        let symbol = Pdf417Symbol::new(&byte_data(b"abc"), 1, 2).expect("symbol");
        // 1 + 4 data + 4 parity = 9 -> 5 rows of 2
        assert_eq!(symbol.header.rows, 5);
        assert_eq!(symbol.codewords.len(), 10);
        assert_eq!(symbol.codewords[0], 6);
        let m = symbol.modules();
        assert_eq!(m.width(), 17 * 2 + 69);
        assert_eq!(m.height(), 15);
    }

    #[test]
    fn test_byte_data_groups() {
        assert_eq!(byte_data(b"ab"), vec![M_LATCH_BYTE, 97, 98]);
        let six = byte_data(b"abcdef");
        assert_eq!(six[0], M_LATCH_BYTE_M6);
        assert_eq!(six.len(), 6);
    }
}
