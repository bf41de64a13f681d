//! PDF417 and Macro PDF417 through the public scan entry points.

mod common;

use common::{compose, gray_of, image_of, jitter_gray, toggle_pixels};
use rust_barcode::decoder::pdf417::payload::{MACRO_BLOCK, MACRO_OPTIONAL_FIELD, MACRO_TERMINATOR};
use rust_barcode::decoder::pdf417::{Pdf417Decoder, Pdf417Locator};
use rust_barcode::detector::region::ScanLine;
use rust_barcode::test_utils::canvas;
use rust_barcode::test_utils::pdf417::{Pdf417Symbol, byte_data};
use rust_barcode::{BarcodeType, BitImage, ScanOptions, TextEncoding, scan, scan_gray};

fn symbol(text: &[u8], ec_level: u8, columns: usize) -> Pdf417Symbol {
    Pdf417Symbol::new(&byte_data(text), ec_level, columns).expect("symbol")
}

fn options() -> ScanOptions {
    ScanOptions::only(BarcodeType::Pdf417)
}

#[test]
fn test_error_levels_and_widths() {
    for (ec_level, columns) in [(0, 2), (2, 4), (4, 6)] {
        let s = symbol(b"stacked barcode", ec_level, columns);
        let found = scan(&image_of(&s.modules(), 3, 4), &options()).expect("scan");
        assert_eq!(found.len(), 1, "ec {ec_level} columns {columns}");
        assert_eq!(found[0].text, "stacked barcode");
        assert_eq!(found[0].bytes, b"stacked barcode");
    }
}

#[test]
fn test_header_vote_allocates_24_codewords() {
    // 13 bytes: latch, two six-byte groups of five, one plain byte
    let s = symbol(b"PDF417 stacks", 2, 4);
    assert_eq!((s.header.rows, s.header.columns, s.header.ec_level), (6, 4, 2));
    let image = image_of(&s.modules(), 3, 4);
    let lines: Vec<ScanLine> = (0..image.height())
        .step_by(2)
        .map(|y| ScanLine::row(y, image.width()))
        .collect();
    let regions = Pdf417Locator::new().locate(&image, &lines);
    assert_eq!(regions.len(), 1);
    let read = Pdf417Decoder::new()
        .decode_region(&image, &regions[0], TextEncoding::Utf8)
        .expect("decoded");
    assert_eq!(read.header.codeword_count(), 24);
    assert_eq!(read.header.ec_codewords(), 8);
    assert_eq!(read.payload.text, "PDF417 stacks");
}

#[test]
fn test_orientations() {
    let s = symbol(b"any way up", 2, 3);
    for turns in 0..4 {
        let image = image_of(&canvas::rotate(&s.modules(), turns), 3, 4);
        let found = scan(&image, &options()).expect("scan");
        assert_eq!(found.len(), 1, "{turns} quarter turns");
        assert_eq!(found[0].text, "any way up");
    }
}

#[test]
fn test_mirrored_symbol() {
    let s = symbol(b"looking glass", 2, 3);
    let image = image_of(&canvas::mirror(&s.modules()), 3, 4);
    let found = scan(&image, &options()).expect("scan");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].text, "looking glass");
    assert!(found[0].bounds.right <= image.width() as i32 + 2);

    let strict = ScanOptions::builder()
        .symbologies(options().symbologies)
        .allow_mirror(false)
        .build();
    let found = scan(&image, &strict).expect("scan");
    assert!(found.iter().all(|f| f.text == "looking glass"));
}

#[test]
fn test_gray_noise() {
    let s = symbol(b"grainy", 3, 3);
    let (mut gray, w, h) = gray_of(&s.modules(), 3, 4);
    jitter_gray(&mut gray, 45, 21);
    let found = scan_gray(&gray, w, h, &options()).expect("scan");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].text, "grainy");
}

#[test]
fn test_macro_segments_are_merged() {
    // text compaction: "AB" = 1, "CD" = 63; segment index 1xxxxx in base 900;
    // file id 017 042; optional segment count field 1 holds "2"
    let first = vec![1, MACRO_BLOCK, 111, 100, 17, 42, MACRO_OPTIONAL_FIELD, 1, 12];
    let second = vec![63, MACRO_BLOCK, 111, 101, 17, 42, MACRO_OPTIONAL_FIELD, 1, 12, MACRO_TERMINATOR];
    let render = |data: &[u32]| {
        let s = Pdf417Symbol::new(data, 2, 3).expect("symbol");
        canvas::render(&s.modules(), 3, 4)
    };
    let (a, b) = (render(&first), render(&second));
    let pixels = compose(a.width().max(b.width()), a.height() + b.height() + 12, &[
        (&b, 0, 0),
        (&a, 0, b.height() + 12),
    ]);
    let found = scan(&BitImage::from_bits(pixels), &options()).expect("scan");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].text, "ABCD");

    let lone = scan(&BitImage::from_bits(a), &options()).expect("scan");
    assert_eq!(lone.len(), 1);
    let sa = lone[0].structured_append.as_ref().expect("macro block");
    assert_eq!((sa.index, sa.count), (0, Some(2)));
    assert_eq!(sa.id, "017042");
}

#[test]
fn test_pixel_inversions() {
    let s = symbol(b"speckled", 2, 4);
    for (fraction, seed) in [(0.01, 3), (0.03, 5), (0.05, 8)] {
        let mut pixels = canvas::render(&s.modules(), 4, 4);
        toggle_pixels(&mut pixels, fraction, seed);
        let found = scan(&BitImage::from_bits(pixels), &options()).expect("scan");
        assert_eq!(found.len(), 1, "{fraction}");
        assert_eq!(found[0].text, "speckled");
    }
}

#[test]
fn test_sheared_symbol() {
    let s = symbol(b"leaning rows", 2, 4);
    for factor in [0.05, 0.1, 0.15] {
        let pixels = canvas::shear(&canvas::render(&s.modules(), 4, 4), factor);
        let found = scan(&BitImage::from_bits(pixels), &options()).expect("scan");
        assert_eq!(found.len(), 1, "{factor}");
        assert_eq!(found[0].text, "leaning rows");
    }
}
