//! Raster fixtures: module matrices scaled to pixels and transformed.

use crate::models::{BitImage, BitMatrix};

/// Scale `modules` to `scale` pixels per module inside a light border of
/// `quiet` modules
pub fn render(modules: &BitMatrix, scale: usize, quiet: usize) -> BitMatrix {
    let scale = scale.max(1);
    let w = (modules.width() + 2 * quiet) * scale;
    let h = (modules.height() + 2 * quiet) * scale;
    let mut out = BitMatrix::new(w, h);
    for y in 0..modules.height() {
        for x in 0..modules.width() {
            if modules.get(x, y) {
                out.set_region((x + quiet) * scale, (y + quiet) * scale, scale, scale);
            }
        }
    }
    out
}

/// Module matrix of bar/space rows: each row is its element widths, starting
/// dark when the flag is set. Rows are `row_height` modules tall with a
/// one-module light gap between them.
pub fn bars(rows: &[(bool, Vec<u32>)], row_height: usize) -> BitMatrix {
    let width = rows
        .iter()
        .map(|(_, w)| w.iter().sum::<u32>() as usize)
        .max()
        .unwrap_or(0);
    let height = (rows.len() * (row_height + 1)).saturating_sub(1);
    let mut out = BitMatrix::new(width.max(1), height.max(1));
    for (r, (first_dark, widths)) in rows.iter().enumerate() {
        let y = r * (row_height + 1);
        let mut x = 0usize;
        let mut dark = *first_dark;
        for &w in widths {
            if dark && w > 0 {
                out.set_region(x, y, w as usize, row_height);
            }
            x += w as usize;
            dark = !dark;
        }
    }
    out
}

/// Rotate by a multiple of 90 degrees
pub fn rotate(bits: &BitMatrix, quarter_turns: usize) -> BitMatrix {
    match quarter_turns % 4 {
        1 => bits.rotate90(),
        2 => bits.rotate180(),
        3 => bits.rotate270(),
        _ => bits.clone(),
    }
}

/// Left-right mirror
pub fn mirror(bits: &BitMatrix) -> BitMatrix {
    bits.flip_horizontal()
}

/// Horizontal shear: row `y` moves right by `factor * y` pixels
pub fn shear(bits: &BitMatrix, factor: f32) -> BitMatrix {
    let extra = (factor.abs() * bits.height() as f32).ceil() as usize;
    let mut out = BitMatrix::new(bits.width() + extra, bits.height());
    for y in 0..bits.height() {
        let shift = factor * y as f32;
        let shift = if factor < 0.0 { shift + extra as f32 } else { shift };
        for x in 0..bits.width() {
            if bits.get(x, y) {
                out.set(x + shift.round() as usize, y, true);
            }
        }
    }
    out
}

/// Binarized image of a pixel matrix
pub fn to_image(bits: &BitMatrix) -> BitImage {
    BitImage::from_bits(bits.clone())
}

/// Grayscale samples of a pixel matrix: dark 30, light 220
pub fn to_gray(bits: &BitMatrix) -> Vec<u8> {
    let mut out = Vec::with_capacity(bits.width() * bits.height());
    for y in 0..bits.height() {
        for x in 0..bits.width() {
            out.push(if bits.get(x, y) { 30 } else { 220 });
        }
    }
    out
}
