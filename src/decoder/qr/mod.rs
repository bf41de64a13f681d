//! QR Code and Micro QR decoding.
//!
//! Finder triples are triangulated into a module transform, the matrix is
//! sampled through up to three grids (perspective, alignment lattice,
//! adaptive lattice) and each sampled matrix runs the strict pipeline of
//! format check, unmasking, zig-zag codeword read, block correction and
//! segment decoding. The first grid whose matrix decodes wins.

pub mod codewords;
pub mod format;
pub mod function_mask;
pub mod locate;
pub mod payload;
pub mod tables;
pub mod version;

pub use locate::{triangulate, FinderTriple};
pub use payload::{Fnc1, QrPayload};

use crate::config::TextEncoding;
use crate::detector::finder::FinderPattern;
use crate::detector::grid::SamplingGrid;
use crate::detector::region::square_finder_axis;
use crate::models::{BarcodeType, BitImage, BitMatrix, ECLevel, Point, SymbolMatrix, Version};
use format::FormatInfo;
use function_mask::FunctionMask;
use tables::BlockLayout;
use tracing::trace;

/// A decoded QR or Micro QR symbol
#[derive(Debug, Clone, PartialEq)]
pub struct QrRead {
    pub symbology: BarcodeType,
    pub payload: QrPayload,
    pub version: Version,
    pub ec_level: ECLevel,
    /// The symbol was read from its mirror image
    pub mirrored: bool,
    /// Image corners clockwise from the symbol's top-left
    pub polygon: [Point; 4],
    pub confidence: f32,
}

fn read_format(modules: &BitMatrix, micro: bool) -> Option<FormatInfo> {
    if micro {
        format::read_micro(modules)
    } else {
        Some(format::read_qr(modules))
    }
}

/// Check the format information of a sampled matrix.
///
/// With `allow_mirror` the transposed matrix is read as well; a mirrored
/// symbol samples as the transpose of the true one. The transposed reading
/// is kept only when its format distance is strictly lower.
pub fn read_symbol(modules: BitMatrix, micro: bool, allow_mirror: bool) -> Option<SymbolMatrix> {
    let dimension = modules.width();
    let version = Version::from_dimension(dimension, micro)?;
    let forward = read_format(&modules, micro);
    let (modules, info, mirrored) = if allow_mirror {
        let transposed = modules.transpose();
        let mirror = read_format(&transposed, micro);
        match (forward, mirror) {
            (Some(f), Some(m)) if m.distance < f.distance => (transposed, m, true),
            (None, Some(m)) => (transposed, m, true),
            (Some(f), _) => (modules, f, false),
            (None, None) => return None,
        }
    } else {
        (modules, forward?, false)
    };
    if !info.is_valid() {
        trace!(distance = info.distance, micro, "format information rejected");
        return None;
    }
    if info.version.is_some_and(|v| v != version) {
        trace!(?version, declared = ?info.version, "micro symbol size disagrees with format");
        return None;
    }
    Some(SymbolMatrix {
        modules,
        version,
        ec_level: info.ec_level,
        mask: info.mask,
        format_distance: info.distance,
        mirrored,
    })
}

/// Unmask, read, correct and decode a checked symbol matrix
pub fn decode_symbol(mut symbol: SymbolMatrix, encoding: TextEncoding) -> Option<(QrPayload, f32)> {
    let func = FunctionMask::new(symbol.version);
    codewords::unmask(&mut symbol.modules, symbol.mask, &func);
    let layout = BlockLayout::for_symbol(symbol.version, symbol.ec_level)?;
    let positions = codewords::zigzag(symbol.version, &func);
    let raw = codewords::read_codewords(&symbol.modules, &positions, &layout);
    let (data, confidence) = codewords::correct_blocks(&raw, &layout)?;
    match payload::decode(&data, layout.data_bits, symbol.version, encoding) {
        Ok(p) if p.bytes.is_empty() && p.structured_append.is_none() => {
            trace!(version = ?symbol.version, "empty qr payload");
            None
        }
        Ok(p) => Some((p, confidence)),
        Err(e) => {
            trace!(version = ?symbol.version, error = %e, "qr payload rejected");
            None
        }
    }
}

/// Decode a sampled module matrix; `polygon` is the image outline of the
/// sampled grid, reordered when the matrix turns out to be mirrored
pub fn decode_matrix(
    modules: BitMatrix,
    polygon: [Point; 4],
    micro: bool,
    allow_mirror: bool,
    encoding: TextEncoding,
) -> Option<QrRead> {
    let symbol = read_symbol(modules, micro, allow_mirror)?;
    let version = symbol.version;
    let ec_level = symbol.ec_level;
    let mirrored = symbol.mirrored;
    let (payload, confidence) = decode_symbol(symbol, encoding)?;
    let polygon = if mirrored {
        [polygon[0], polygon[3], polygon[2], polygon[1]]
    } else {
        polygon
    };
    Some(QrRead {
        symbology: if micro { BarcodeType::MicroQr } else { BarcodeType::QrCode },
        payload,
        version,
        ec_level,
        mirrored,
        polygon,
        confidence,
    })
}

/// Decode the Model 2 symbol framed by a finder triple
pub fn decode_triple(
    image: &BitImage,
    triple: &FinderTriple,
    allow_mirror: bool,
    encoding: TextEncoding,
) -> Option<QrRead> {
    let estimate = triple.estimated_version()?;
    let mut pending = vec![estimate];
    let mut tried = Vec::with_capacity(2);
    while let Some(number) = pending.pop() {
        if tried.contains(&number) {
            continue;
        }
        tried.push(number);
        let Some(transform) = locate::symbol_transform(image, triple, number) else {
            continue;
        };
        let dimension = Version::Model2(number).size();
        for grid in locate::symbol_grids(image, &transform, number) {
            let jitter = !matches!(grid, SamplingGrid::Perspective(_));
            let modules = grid.extract_points(image, dimension, dimension, jitter);
            if tried.len() == 1 {
                if let Some(declared) = version::read_version(&modules) {
                    if declared != number {
                        trace!(estimate = number, declared, "qr version information disagrees with size");
                        pending.push(declared);
                        break;
                    }
                }
            }
            let polygon = locate::outline(&grid, dimension);
            if let Some(read) = decode_matrix(modules, polygon, false, allow_mirror, encoding) {
                return Some(read);
            }
        }
    }
    None
}

/// Decode a Micro QR symbol around a lone finder
pub fn decode_micro(
    image: &BitImage,
    finder: &FinderPattern,
    allow_mirror: bool,
    encoding: TextEncoding,
) -> Option<QrRead> {
    let axis = square_finder_axis(image, finder.center, finder.module_size);
    let placement = locate::place_micro(image, finder, axis)?;
    let dimension = placement.dimension;
    let modules = placement.grid.extract_points(image, dimension, dimension, false);
    let polygon = locate::outline(&placement.grid, dimension);
    decode_matrix(modules, polygon, true, allow_mirror, encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::finder::FinderDetector;
    use crate::models::MaskPattern;
    use crate::test_utils::canvas;
    use crate::test_utils::qr::{micro_modules, qr_modules, Segment};

    fn hello_world() -> BitMatrix {
        qr_modules(
            1,
            ECLevel::M,
            MaskPattern::Pattern0,
            &[Segment::Alphanumeric("HELLO WORLD".into())],
        )
        .expect("fits")
    }

    fn scan(image: &BitImage, allow_mirror: bool) -> Vec<QrRead> {
        let finders = FinderDetector::new().detect(image, 0..image.height());
        triangulate(&finders)
            .iter()
            .filter_map(|t| decode_triple(image, t, allow_mirror, TextEncoding::Utf8))
            .collect()
    }

    #[test]
    fn test_hello_world_matrix() {
        let modules = hello_world();
        assert_eq!(modules.width(), 21);
        let symbol = read_symbol(modules, false, false).expect("format");
        assert!(symbol.format_distance <= 3);
        assert_eq!(symbol.ec_level, ECLevel::M);
        assert_eq!(symbol.mask, MaskPattern::Pattern0);
        let (payload, confidence) = decode_symbol(symbol, TextEncoding::Utf8).expect("decoded");
        assert_eq!(payload.text, "HELLO WORLD");
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn test_damaged_format_copy_still_reads() {
        let mut modules = hello_world();
        for x in 0..4 {
            modules.toggle(x, 8);
        }
        let symbol = read_symbol(modules, false, false).expect("second copy");
        assert_eq!(symbol.format_distance, 0);
    }

    #[test]
    fn test_transposed_matrix_reads_as_mirrored() {
        let modules = hello_world().transpose();
        let read = decode_matrix(modules.clone(), [Point::default(); 4], false, true, TextEncoding::Utf8)
            .expect("mirrored");
        assert!(read.mirrored);
        assert_eq!(read.payload.text, "HELLO WORLD");
        assert!(decode_matrix(modules, [Point::default(); 4], false, false, TextEncoding::Utf8).is_none());
    }

    #[test]
    fn test_decodes_rendered_symbol() {
        let image = canvas::to_image(&canvas::render(&hello_world(), 4, 4));
        let reads = scan(&image, true);
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].payload.text, "HELLO WORLD");
        assert_eq!(reads[0].version, Version::Model2(1));
        assert!(!reads[0].mirrored);
        assert_eq!(reads[0].confidence, 1.0);
        // quiet zone of four modules at four pixels each
        assert!(reads[0].polygon[0].distance(&Point::new(16.0, 16.0)) < 2.0);
    }

    #[test]
    fn test_decodes_rotated_and_mirrored_renderings() {
        let modules = qr_modules(
            3,
            ECLevel::Q,
            MaskPattern::Pattern5,
            &[Segment::Byte(b"rotate me".to_vec())],
        )
        .expect("fits");
        for quarter in 1..4 {
            let image = canvas::to_image(&canvas::render(&canvas::rotate(&modules, quarter), 4, 3));
            let reads = scan(&image, false);
            assert_eq!(reads.len(), 1, "quarter turns {quarter}");
            assert_eq!(reads[0].payload.text, "rotate me");
        }
        let image = canvas::to_image(&canvas::render(&modules.flip_horizontal(), 4, 3));
        let reads = scan(&image, true);
        assert_eq!(reads.len(), 1);
        assert!(reads[0].mirrored);
        assert_eq!(reads[0].payload.text, "rotate me");
    }

    #[test]
    fn test_decodes_micro_symbol() {
        let modules = micro_modules(3, ECLevel::M, 2, &[Segment::Numeric("0123456789".into())]).expect("fits");
        assert_eq!(modules.width(), 15);
        let image = canvas::to_image(&canvas::render(&modules, 3, 4));
        let finders = FinderDetector::new().detect(&image, 0..image.height());
        let finder = finders.iter().max_by_key(|f| f.hits).expect("finder");
        assert!(finder.center.distance(&Point::new(22.5, 22.5)) < 1.5);
        let read = decode_micro(&image, finder, true, TextEncoding::Utf8).expect("micro");
        assert_eq!(read.symbology, BarcodeType::MicroQr);
        assert_eq!(read.version, Version::Micro(3));
        assert_eq!(read.payload.text, "0123456789");
    }
}
