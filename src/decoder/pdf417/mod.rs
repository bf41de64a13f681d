//! PDF417 decoding.
//!
//! A located region is read in five steps: row-indicator header vote,
//! codeword grid extraction (up to four strategies, first success wins),
//! Reed-Solomon correction over GF(929), and high-level payload decoding.

pub mod codewords;
pub mod extract;
pub mod frame;
pub mod header;
pub mod locate;
pub mod payload;

pub use extract::{CodewordGrid, Strategy};
pub use header::Pdf417Header;
pub use locate::Pdf417Locator;
pub use payload::{MacroBlock, Pdf417Payload};

use crate::config::TextEncoding;
use crate::decoder::reed_solomon::ReedSolomon;
use crate::detector::region::BarCodeRegion;
use crate::models::BitImage;
use extract::Extractor;
use frame::SymbolFrame;
use header::ClusterCaches;
use tracing::trace;

/// A decoded PDF417 symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Pdf417Read {
    pub payload: Pdf417Payload,
    pub region: BarCodeRegion,
    pub header: Pdf417Header,
    /// Strategy whose codewords decoded
    pub strategy: Strategy,
    pub confidence: f32,
}

/// Correct a codeword grid; returns the data codewords (length descriptor
/// first) and the correction confidence
pub fn correct(grid: &CodewordGrid) -> Option<(Vec<u32>, f32)> {
    let header = grid.header();
    let parity = header.ec_codewords();
    let mut block = grid.to_block();
    let correction = match ReedSolomon::pdf417(parity).decode(&mut block) {
        Ok(c) => c,
        Err(e) => {
            trace!(error = %e, missing = grid.missing(), "pdf417 codewords uncorrectable");
            return None;
        }
    };
    let data_len = header.codeword_count() - parity;
    let declared = *block.codewords.first()? as usize;
    if declared == 0 || declared > data_len {
        trace!(declared, data_len, "pdf417 length descriptor out of range");
        return None;
    }
    block.codewords.truncate(data_len);
    Some((block.codewords, correction.confidence))
}

/// Region decoder; owns the per-worker recovery caches
#[derive(Default)]
pub struct Pdf417Decoder {
    caches: ClusterCaches,
}

impl Pdf417Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode_region(
        &mut self,
        image: &BitImage,
        region: &BarCodeRegion,
        encoding: TextEncoding,
    ) -> Option<Pdf417Read> {
        let frame = SymbolFrame::new(*region);
        let reading = header::read_header(image, &frame, &mut self.caches)?;
        let extractor = Extractor::new(image, &frame, &reading);
        for strategy in Strategy::ALL {
            let Some(grid) = extractor.extract(strategy, &mut self.caches) else {
                continue;
            };
            if grid.missing() > reading.header.ec_codewords() {
                trace!(?strategy, missing = grid.missing(), "pdf417 too many unread codewords");
                continue;
            }
            let Some((data, confidence)) = correct(&grid) else {
                continue;
            };
            match payload::decode(&data, encoding) {
                Ok(payload) => {
                    return Some(Pdf417Read {
                        payload,
                        region: *region,
                        header: reading.header,
                        strategy,
                        confidence,
                    });
                }
                Err(e) => trace!(?strategy, error = %e, "pdf417 payload rejected"),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::region::ScanLine;
    use crate::test_utils::{canvas, pdf417 as fixture};

    fn scan(image: &BitImage) -> Vec<Pdf417Read> {
        let lines: Vec<ScanLine> = (0..image.height())
            .step_by(2)
            .map(|y| ScanLine::row(y, image.width()))
            .collect();
        let regions = Pdf417Locator::new().locate(image, &lines);
        let mut decoder = Pdf417Decoder::new();
        regions
            .iter()
            .filter_map(|r| decoder.decode_region(image, r, TextEncoding::Utf8))
            .collect()
    }

    #[test]
    fn test_correct_restores_damaged_grid() {
        let data = fixture::byte_data(b"grid");
        let symbol = fixture::Pdf417Symbol::new(&data, 2, 3).expect("symbol");
        let mut grid = CodewordGrid::new(symbol.header);
        for (i, &cw) in symbol.codewords.iter().enumerate() {
            grid.set(i / 3, i % 3, cw as u16);
        }
        grid.set(0, 1, 5);
        grid.set(1, 2, 6);
        let (data_out, confidence) = correct(&grid).expect("corrected");
        assert_eq!(&data_out[..data.len() + 1], &symbol.codewords[..data.len() + 1]);
        assert!(confidence < 1.0);
    }

    #[test]
    fn test_decodes_rendered_symbol() {
        let symbol = fixture::Pdf417Symbol::new(&fixture::byte_data(b"PDF417 test"), 2, 4).expect("symbol");
        let image = canvas::to_image(&canvas::render(&symbol.modules(), 3, 4));
        let reads = scan(&image);
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].payload.text, "PDF417 test");
        assert_eq!(reads[0].header, symbol.header);
        assert_eq!(reads[0].strategy, Strategy::DirectGrid);
        assert_eq!(reads[0].confidence, 1.0);
    }

    /// Payload text produced by each extraction strategy on the first region
    fn strategy_texts(image: &BitImage) -> Vec<(Strategy, Option<String>)> {
        let lines: Vec<ScanLine> = (0..image.height())
            .step_by(2)
            .map(|y| ScanLine::row(y, image.width()))
            .collect();
        let regions = Pdf417Locator::new().locate(image, &lines);
        let frame = SymbolFrame::new(*regions.first().expect("region"));
        let mut caches = ClusterCaches::default();
        let reading = header::read_header(image, &frame, &mut caches).expect("header");
        let extractor = Extractor::new(image, &frame, &reading);
        Strategy::ALL
            .iter()
            .map(|&strategy| {
                let text = extractor
                    .extract(strategy, &mut caches)
                    .and_then(|grid| correct(&grid))
                    .and_then(|(data, _)| payload::decode(&data, TextEncoding::Utf8).ok())
                    .map(|p| p.text);
                (strategy, text)
            })
            .collect()
    }

    #[test]
    fn test_every_strategy_reads_clean_symbol() {
        let symbol = fixture::Pdf417Symbol::new(&fixture::byte_data(b"strategy check"), 2, 4).expect("symbol");
        let image = canvas::to_image(&canvas::render(&symbol.modules(), 3, 4));
        for (strategy, text) in strategy_texts(&image) {
            assert_eq!(text.as_deref(), Some("strategy check"), "{strategy:?}");
        }
    }

    #[test]
    fn test_column_following_strategies_read_sheared_symbol() {
        let symbol = fixture::Pdf417Symbol::new(&fixture::byte_data(b"strategy check"), 2, 4).expect("symbol");
        let pixels = canvas::shear(&canvas::render(&symbol.modules(), 3, 4), 0.1);
        let texts = strategy_texts(&canvas::to_image(&pixels));
        for (strategy, text) in texts {
            if matches!(strategy, Strategy::ColumnAnchored | Strategy::AdaptiveGrid) {
                assert_eq!(text.as_deref(), Some("strategy check"), "{strategy:?}");
            }
        }
    }

    #[test]
    fn test_decodes_upside_down_symbol() {
        let symbol = fixture::Pdf417Symbol::new(&fixture::byte_data(b"flipped"), 1, 3).expect("symbol");
        let modules = canvas::rotate(&symbol.modules(), 2);
        let image = canvas::to_image(&canvas::render(&modules, 3, 4));
        let reads = scan(&image);
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].payload.text, "flipped");
    }
}
