//! Square finder patterns (1:1:3:1:1 in every direction through the centre).
//!
//! Rows are matched with the shared [`PatternFinder`]; each row hit is
//! cross-checked along the column and both diagonals through its centre and
//! validated against the nested ring samples before it is kept. Hits on
//! neighbouring rows are merged into one pattern.

use super::pattern::{PatternFinder, PatternTemplate};
use super::region::{square_finder_axis, validate_square_finder};
use crate::models::{BitImage, Point};

const FINDER_MODULES: [u8; 5] = [1, 1, 3, 1, 1];
/// Ring samples allowed to disagree before a candidate is rejected
const MAX_RING_FAILURES: usize = 3;

/// A located finder pattern
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinderPattern {
    pub center: Point,
    pub module_size: f32,
    /// Scan lines that confirmed the pattern
    pub hits: usize,
}

impl FinderPattern {
    pub fn new(center: Point, module_size: f32) -> Self {
        Self {
            center,
            module_size,
            hits: 1,
        }
    }

    /// True when `other` is the same physical pattern
    fn is_same(&self, other: &FinderPattern) -> bool {
        let module = self.module_size.max(other.module_size);
        self.center.distance(&other.center) < 2.0 * module
            && (self.module_size - other.module_size).abs() < 0.5 * module
    }

    fn absorb(&mut self, other: &FinderPattern) {
        let n = self.hits as f32;
        let m = other.hits as f32;
        self.center = (self.center * n + other.center * m) * (1.0 / (n + m));
        self.module_size = (self.module_size * n + other.module_size * m) / (n + m);
        self.hits += other.hits;
    }
}

/// Merge `candidate` into `list`, or append it
pub fn merge_finder(list: &mut Vec<FinderPattern>, candidate: FinderPattern) {
    match list.iter_mut().find(|p| p.is_same(&candidate)) {
        Some(existing) => existing.absorb(&candidate),
        None => list.push(candidate),
    }
}

/// Pixels of colour `dark` walked from `*t` in steps of `step`. An
/// interruption of at most `gap` pixels is counted into the run when the
/// colour then holds for at least two pixels. `None` once the run exceeds
/// `max_run`.
fn walk_run(at: &impl Fn(i32) -> bool, t: &mut i32, step: i32, dark: bool, gap: i32, max_run: usize) -> Option<u32> {
    let hold = gap.max(2);
    let mut run = 0u32;
    loop {
        if at(*t) == dark {
            run += 1;
            *t += step;
        } else {
            let here = *t;
            let resume = (1..=gap).find(|&k| (k..k + hold).all(|j| at(here + j * step) == dark));
            match resume {
                Some(k) => {
                    run += k as u32;
                    *t += k * step;
                }
                None => return Some(run),
            }
        }
        if run as usize > max_run {
            return None;
        }
    }
}

/// Runs of the finder along `dir` through `center`: returns the refined
/// centre and the five run widths, or `None` when the line leaves the image
/// or the colour sequence is not dark/light/dark/light/dark. Interruptions
/// of up to `gap` pixels inside a run are read as noise.
fn cross_runs(image: &BitImage, center: Point, dir: Point, max_run: usize, gap: i32) -> Option<(Point, [u32; 5])> {
    // walk from a pixel centre so every step lands on one
    let start = Point::new(center.x.floor() + 0.5, center.y.floor() + 0.5);
    let at = |t: i32| image.sample(start + dir * t as f32);
    // backwards: centre run, inner light, outer dark
    let mut back = [0u32; 3];
    let mut t = 0i32;
    for (state, slot) in back.iter_mut().enumerate() {
        *slot = walk_run(&at, &mut t, -1, state != 1, gap, max_run)?;
    }
    let mut fwd = [0u32; 3];
    t = 1;
    for (state, slot) in fwd.iter_mut().enumerate() {
        *slot = walk_run(&at, &mut t, 1, state != 1, gap, max_run)?;
    }
    if back.contains(&0) || fwd[1] == 0 || fwd[2] == 0 {
        return None;
    }
    let mid = (fwd[0] as f32 - (back[0] as f32 - 1.0)) * 0.5;
    let runs = [back[2], back[1], back[0] + fwd[0], fwd[1], fwd[2]];
    // only the component along `dir` is refined
    let unit = dir.normalized();
    let refined = start + dir * mid;
    Some((center + unit * (refined - center).dot(&unit), runs))
}

/// Reusable finder-pattern detector
pub struct FinderDetector {
    finder: PatternFinder,
    template: PatternTemplate,
    line: Vec<bool>,
}

impl Default for FinderDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FinderDetector {
    pub fn new() -> Self {
        let template = PatternTemplate::from_modules(&FINDER_MODULES, Some(true));
        let finder = PatternFinder::new(vec![template.clone()]).with_tolerance(0.3, 0.8);
        Self {
            finder,
            template,
            line: Vec::new(),
        }
    }

    /// Confirm a row hit: vertical and diagonal cross-checks, then ring samples
    fn confirm(&self, image: &BitImage, center: Point, module: f32) -> Option<FinderPattern> {
        let max_run = (module * 5.0).ceil() as usize + 2;
        // runs shorter than half a module are noise, up to two pixels
        let gap = ((module * 0.5) as i32).clamp(0, 2);
        let (center, vertical) = cross_runs(image, center, Point::new(0.0, 1.0), max_run, gap)?;
        if self.template.variance(&vertical, 0.8) > 0.35 {
            return None;
        }
        let (center, horizontal) = cross_runs(image, center, Point::new(1.0, 0.0), max_run, gap)?;
        if self.template.variance(&horizontal, 0.8) > 0.35 {
            return None;
        }
        let module_h = horizontal.iter().sum::<u32>() as f32 / 7.0;
        let module_v = vertical.iter().sum::<u32>() as f32 / 7.0;
        if module_h > 1.6 * module_v || module_v > 1.6 * module_h {
            return None;
        }
        // the diagonal crosses the rings at sqrt(2) times the module size
        let diagonal = Point::new(1.0, 1.0);
        let (_, diag) = cross_runs(image, center, diagonal, max_run * 2, gap)?;
        if self.template.variance(&diag, 1.0) > 0.45 {
            return None;
        }
        let module = (module_h + module_v) * 0.5;
        let axis = square_finder_axis(image, center, module);
        // along a tilted axis the horizontal crossing overestimates the module
        let module = module * axis.x.abs().max(axis.y.abs());
        if !validate_square_finder(image, center, module, axis, MAX_RING_FAILURES) {
            return None;
        }
        Some(FinderPattern::new(center, module))
    }

    /// Confirmed finder hits on row `y`
    pub fn scan_row(&mut self, image: &BitImage, y: usize) -> Vec<FinderPattern> {
        image.row_into(y, &mut self.line);
        self.finder.load(&self.line);
        let mut out = Vec::new();
        while let Some(m) = self.finder.next_match() {
            let w = &m.runs.widths;
            let x = m.start as f32 + (w[0] + w[1]) as f32 + w[2] as f32 * 0.5;
            if let Some(p) = self.confirm(image, Point::new(x, y as f32 + 0.5), m.module_len) {
                merge_finder(&mut out, p);
            }
        }
        out
    }

    /// Merged finder patterns over the given rows
    pub fn detect(&mut self, image: &BitImage, rows: impl IntoIterator<Item = usize>) -> Vec<FinderPattern> {
        let mut found = Vec::new();
        for y in rows {
            for p in self.scan_row(image, y) {
                merge_finder(&mut found, p);
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BitMatrix;
    use crate::test_utils::canvas;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn draw_finder(bits: &mut BitMatrix, x0: usize, y0: usize, m: usize) {
        bits.set_region(x0, y0, 7 * m, 7 * m);
        for y in y0 + m..y0 + 6 * m {
            for x in x0 + m..x0 + 6 * m {
                bits.set(x, y, false);
            }
        }
        bits.set_region(x0 + 2 * m, y0 + 2 * m, 3 * m, 3 * m);
    }

    #[test]
    fn test_cross_runs_through_centre() {
        let mut bits = BitMatrix::new(40, 40);
        draw_finder(&mut bits, 5, 5, 3);
        let image = BitImage::from_bits(bits);
        // start off-centre inside the middle square
        let (center, runs) = cross_runs(&image, Point::new(15.5, 16.5), Point::new(1.0, 0.0), 20, 1).unwrap();
        assert_eq!(runs, [3, 3, 9, 3, 3]);
        assert!((center.x - 15.5).abs() < 0.6, "centre {:?}", center);
    }

    fn toggle(bits: &mut BitMatrix, fraction: f64, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        for y in 0..bits.height() {
            for x in 0..bits.width() {
                if rng.gen_bool(fraction) {
                    bits.toggle(x, y);
                }
            }
        }
    }

    #[test]
    fn test_cross_runs_bridge_single_pixels() {
        let mut bits = BitMatrix::new(40, 40);
        draw_finder(&mut bits, 5, 5, 4);
        // light speck in the centre square, dark speck in the light ring
        bits.toggle(16, 19);
        bits.toggle(11, 19);
        let image = BitImage::from_bits(bits);
        let (_, runs) = cross_runs(&image, Point::new(18.5, 19.5), Point::new(1.0, 0.0), 30, 2).expect("bridged");
        assert_eq!(runs, [4, 4, 12, 4, 4]);
        let (_, raw) = cross_runs(&image, Point::new(18.5, 19.5), Point::new(1.0, 0.0), 30, 0).expect("runs");
        assert_ne!(raw, [4, 4, 12, 4, 4]);
    }

    #[test]
    fn test_detects_single_finder() {
        let mut bits = BitMatrix::new(60, 60);
        draw_finder(&mut bits, 10, 12, 4);
        let image = BitImage::from_bits(bits);
        let found = FinderDetector::new().detect(&image, 0..60);
        assert_eq!(found.len(), 1);
        let p = found[0];
        assert!(p.center.distance(&Point::new(24.0, 26.0)) < 1.0, "centre {:?}", p.center);
        assert!((p.module_size - 4.0).abs() < 0.5);
        assert!(p.hits >= 3);
    }

    #[test]
    fn test_detects_finder_with_pixel_noise() {
        for (fraction, seed) in [(0.01, 3), (0.03, 5), (0.05, 8)] {
            let mut bits = BitMatrix::new(60, 60);
            draw_finder(&mut bits, 10, 12, 4);
            toggle(&mut bits, fraction, seed);
            let found = FinderDetector::new().detect(&BitImage::from_bits(bits), 0..60);
            assert_eq!(found.len(), 1, "noise {fraction}");
            assert!(found[0].center.distance(&Point::new(24.0, 26.0)) < 1.5, "centre {:?}", found[0].center);
        }
    }

    #[test]
    fn test_detects_sheared_finder() {
        for factor in [0.05, 0.1, 0.15] {
            let mut bits = BitMatrix::new(60, 60);
            draw_finder(&mut bits, 10, 12, 4);
            let image = canvas::to_image(&canvas::shear(&bits, factor));
            let found = FinderDetector::new().detect(&image, 0..60);
            assert_eq!(found.len(), 1, "shear {factor}");
            let expected = Point::new(24.0 + factor * 26.0, 26.0);
            assert!(found[0].center.distance(&expected) < 1.5, "centre {:?}", found[0].center);
        }
    }

    #[test]
    fn test_rejects_bars() {
        // 1:1:3:1:1 bars on the rows, but solid along the column
        let mut bits = BitMatrix::new(60, 60);
        for (x, w) in [(10, 4), (18, 12), (34, 4)] {
            bits.set_region(x, 5, w, 50);
        }
        let image = BitImage::from_bits(bits);
        assert!(FinderDetector::new().detect(&image, 0..60).is_empty());
    }
}
