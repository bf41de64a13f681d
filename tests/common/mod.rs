//! Shared helpers for the integration tests.
#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_barcode::test_utils::canvas;
use rust_barcode::{BitImage, BitMatrix};

/// Render a module matrix at `scale` pixels per module with a `quiet`
/// module border
pub fn image_of(modules: &BitMatrix, scale: usize, quiet: usize) -> BitImage {
    canvas::to_image(&canvas::render(modules, scale, quiet))
}

/// Grayscale pixels of a rendered module matrix
pub fn gray_of(modules: &BitMatrix, scale: usize, quiet: usize) -> (Vec<u8>, usize, usize) {
    let pixels = canvas::render(modules, scale, quiet);
    (canvas::to_gray(&pixels), pixels.width(), pixels.height())
}

/// Paste pixel matrices onto a light canvas at the given offsets
pub fn compose(width: usize, height: usize, parts: &[(&BitMatrix, usize, usize)]) -> BitMatrix {
    let mut out = BitMatrix::new(width, height);
    for &(part, x0, y0) in parts {
        for y in 0..part.height() {
            for x in 0..part.width() {
                if part.get(x, y) && x0 + x < width && y0 + y < height {
                    out.set(x0 + x, y0 + y, true);
                }
            }
        }
    }
    out
}

/// Flip `count` distinct modules inside the square `from..to` on both axes
pub fn flip_modules(modules: &mut BitMatrix, from: usize, to: usize, count: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut flipped: Vec<(usize, usize)> = Vec::with_capacity(count);
    while flipped.len() < count {
        let p = (rng.gen_range(from..to), rng.gen_range(from..to));
        if !flipped.contains(&p) {
            modules.toggle(p.0, p.1);
            flipped.push(p);
        }
    }
}

/// Add uniform noise of at most `amplitude` levels to every sample
pub fn jitter_gray(gray: &mut [u8], amplitude: i16, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for v in gray.iter_mut() {
        let delta: i16 = rng.gen_range(-amplitude..=amplitude);
        *v = (*v as i16 + delta).clamp(0, 255) as u8;
    }
}

/// Invert each pixel independently with probability `fraction`
pub fn toggle_pixels(pixels: &mut BitMatrix, fraction: f64, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for y in 0..pixels.height() {
        for x in 0..pixels.width() {
            if rng.gen_bool(fraction) {
                pixels.toggle(x, y);
            }
        }
    }
}
