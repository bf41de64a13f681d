//! Row-line sampling inside a located PDF417 region.
//!
//! Positions inside the symbol are given as `(t, v)`: `t` runs from the left
//! edge of the start pattern (0) to the right edge of the stop pattern (1),
//! `v` from the top edge (0) to the bottom edge (1).

use crate::detector::region::BarCodeRegion;
use crate::models::{BitImage, Point};
use crate::utils::line::run_lengths;

/// Samples per pixel along a row line
const OVERSAMPLE: f32 = 2.0;
/// Margin sampled beyond each edge, in pixels
const MARGIN_PX: f32 = 3.0;

/// Bilinear frame over a region's four corners
#[derive(Debug, Clone, Copy)]
pub struct SymbolFrame {
    region: BarCodeRegion,
    across: Point,
}

impl SymbolFrame {
    pub fn new(region: BarCodeRegion) -> Self {
        let across = (region.a - region.c).normalized();
        Self { region, across }
    }

    pub fn region(&self) -> &BarCodeRegion {
        &self.region
    }

    /// Point on the left edge
    pub fn left(&self, v: f32) -> Point {
        self.region.c.lerp(&self.region.a, v)
    }

    /// Point on the right edge
    pub fn right(&self, v: f32) -> Point {
        self.region.d.lerp(&self.region.b, v)
    }

    /// Image point of `(t, v)`
    pub fn point(&self, t: f32, v: f32) -> Point {
        self.left(v).lerp(&self.right(v), t)
    }

    /// Height of the region in pixels
    pub fn height_px(&self) -> f32 {
        self.region.height()
    }

    /// Sample the row line at `v`, each sample a three-pixel vote across the bars
    pub fn sample_row(&self, image: &BitImage, v: f32) -> RowLine {
        let l = self.left(v);
        let r = self.right(v);
        let len = l.distance(&r).max(1.0);
        let dt = 1.0 / (len * OVERSAMPLE);
        let t0 = -MARGIN_PX / len;
        let count = ((1.0 - 2.0 * t0) / dt).ceil() as usize + 1;
        let across = self.across;
        let bits: Vec<bool> = (0..count)
            .map(|i| {
                let p = l.lerp(&r, t0 + i as f32 * dt);
                [p - across, p, p + across]
                    .iter()
                    .filter(|&&q| image.sample(q))
                    .count()
                    >= 2
            })
            .collect();
        RowLine::new(v, t0, dt, bits)
    }
}

/// One sampled row line
#[derive(Debug, Clone)]
pub struct RowLine {
    pub v: f32,
    t0: f32,
    dt: f32,
    bits: Vec<bool>,
    runs: Vec<u32>,
    starts: Vec<usize>,
    first_dark: bool,
}

impl RowLine {
    fn new(v: f32, t0: f32, dt: f32, bits: Vec<bool>) -> Self {
        let mut runs = Vec::new();
        let first_dark = run_lengths(&bits, &mut runs);
        let mut starts = Vec::with_capacity(runs.len());
        let mut pos = 0usize;
        for &r in &runs {
            starts.push(pos);
            pos += r as usize;
        }
        Self {
            v,
            t0,
            dt,
            bits,
            runs,
            starts,
            first_dark,
        }
    }

    pub fn runs(&self) -> &[u32] {
        &self.runs
    }

    /// Frame coordinate of the start of run `i`
    pub fn run_t(&self, i: usize) -> f32 {
        let at = self.starts.get(i).copied().unwrap_or(self.bits.len());
        self.t0 + at as f32 * self.dt
    }

    /// Indices of the first and last dark runs
    pub fn dark_span(&self) -> Option<(usize, usize)> {
        let first = if self.first_dark { 0 } else { 1 };
        let count = self.runs.len();
        if count <= first {
            return None;
        }
        let last_dark = if (count - 1 - first) % 2 == 0 {
            count - 1
        } else {
            count - 2
        };
        (last_dark > first).then_some((first, last_dark))
    }

    /// Runs of the samples between `t_from` and `t_to`, trimmed to start with
    /// a dark run and end with a light one
    pub fn segment_runs(&self, t_from: f32, t_to: f32, out: &mut Vec<u32>) {
        let index = |t: f32| (((t - self.t0) / self.dt).round().max(0.0) as usize).min(self.bits.len());
        let (from, to) = (index(t_from), index(t_to));
        out.clear();
        if to <= from {
            return;
        }
        let slice = &self.bits[from..to];
        let first_dark = run_lengths(slice, out);
        if !first_dark && !out.is_empty() {
            out.remove(0);
        }
        // trailing bar spilled from the next codeword
        if out.len() % 2 == 1 && out.len() > 8 {
            out.pop();
        }
    }
}
