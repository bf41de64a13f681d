//! Sampling grids: maps from module coordinates to raster coordinates.
//!
//! Module coordinates are continuous; the centre of module (row i, col j) is
//! `(j + 0.5, i + 0.5)`. Every grid variant answers `sample(x, y)` and shares
//! the module-matrix extraction in [`SamplingGrid::extract_points`].

use crate::models::{BitImage, BitMatrix, Point};
use crate::utils::geometry::PerspectiveTransform;

/// Reference lattice of known image positions at fixed module coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    xs: Vec<f32>,
    ys: Vec<f32>,
    points: Vec<Point>,
}

impl Lattice {
    /// Lattice over `xs` × `ys` (both strictly ascending, at least two entries
    /// each) with `points` in row-major order (`points[row * xs.len() + col]`)
    pub fn new(xs: Vec<f32>, ys: Vec<f32>, points: Vec<Point>) -> Option<Self> {
        if xs.len() < 2 || ys.len() < 2 || points.len() != xs.len() * ys.len() {
            return None;
        }
        if xs.windows(2).any(|w| w[1] <= w[0]) || ys.windows(2).any(|w| w[1] <= w[0]) {
            return None;
        }
        Some(Self { xs, ys, points })
    }

    /// Module x coordinates of the lattice columns
    pub fn xs(&self) -> &[f32] {
        &self.xs
    }

    /// Module y coordinates of the lattice rows
    pub fn ys(&self) -> &[f32] {
        &self.ys
    }

    /// Image point of lattice node (row, col)
    pub fn node(&self, row: usize, col: usize) -> Point {
        self.points[row * self.xs.len() + col]
    }

    fn cell(coords: &[f32], v: f32) -> usize {
        // last cell extrapolates beyond the final node
        let last = coords.len() - 2;
        coords[1..=last]
            .iter()
            .position(|&c| v < c)
            .unwrap_or(last)
    }

    fn cell_weights(&self, x: f32, y: f32) -> (usize, usize, f32, f32) {
        let cx = Self::cell(&self.xs, x);
        let cy = Self::cell(&self.ys, y);
        let u = (x - self.xs[cx]) / (self.xs[cx + 1] - self.xs[cx]);
        let v = (y - self.ys[cy]) / (self.ys[cy + 1] - self.ys[cy]);
        (cx, cy, u, v)
    }

    fn bilinear(&self, x: f32, y: f32) -> Point {
        let (cx, cy, u, v) = self.cell_weights(x, y);
        let top = self.node(cy, cx).lerp(&self.node(cy, cx + 1), u);
        let bottom = self.node(cy + 1, cx).lerp(&self.node(cy + 1, cx + 1), u);
        top.lerp(&bottom, v)
    }

    /// Local module step vectors at a node, by central differences
    fn local_scale(&self, row: usize, col: usize) -> (Point, Point) {
        let c0 = col.saturating_sub(1);
        let c1 = (col + 1).min(self.xs.len() - 1);
        let r0 = row.saturating_sub(1);
        let r1 = (row + 1).min(self.ys.len() - 1);
        let ux = (self.node(row, c1) - self.node(row, c0)) * (1.0 / (self.xs[c1] - self.xs[c0]));
        let uy = (self.node(r1, col) - self.node(r0, col)) * (1.0 / (self.ys[r1] - self.ys[r0]));
        (ux, uy)
    }
}

/// Per-node local module vectors used by the adaptive grid
#[derive(Debug, Clone, PartialEq)]
pub struct NodeScale {
    /// Image displacement of one module along x
    pub ux: Point,
    /// Image displacement of one module along y
    pub uy: Point,
}

/// A module-to-raster mapping.
#[derive(Debug, Clone)]
pub enum SamplingGrid {
    /// Bilinear interpolation between four corners placed at the module
    /// coordinates `origin` (top-left) and `origin + extent` (bottom-right)
    Regular {
        /// Module coordinates of the top-left corner
        origin: Point,
        /// Module extent of the rectangle spanned by the corners
        extent: Point,
        /// Image corners clockwise from top-left
        corners: [Point; 4],
    },
    /// Projective mapping from module to image coordinates
    Perspective(PerspectiveTransform),
    /// Piecewise bilinear grid over a lattice of reference points
    NonUniform(Lattice),
    /// Lattice grid whose nodes also carry local module vectors; interpolation
    /// blends the per-node linear predictions
    Adaptive {
        /// Reference positions
        lattice: Lattice,
        /// Local scale per node, row-major like the lattice
        scales: Vec<NodeScale>,
    },
}

impl SamplingGrid {
    /// Regular grid whose four image corners enclose a `width` × `height`
    /// module rectangle
    pub fn regular(corners: [Point; 4], width: f32, height: f32) -> Self {
        SamplingGrid::Regular {
            origin: Point::new(0.0, 0.0),
            extent: Point::new(width, height),
            corners,
        }
    }

    /// Perspective grid through four module/image point pairs
    pub fn perspective(modules: &[Point; 4], image: &[Point; 4]) -> Option<Self> {
        PerspectiveTransform::from_points(modules, image).map(SamplingGrid::Perspective)
    }

    /// Adaptive grid whose node scales come from the lattice's own spacing
    pub fn adaptive(lattice: Lattice) -> Self {
        let mut scales = Vec::with_capacity(lattice.points.len());
        for row in 0..lattice.ys.len() {
            for col in 0..lattice.xs.len() {
                let (ux, uy) = lattice.local_scale(row, col);
                scales.push(NodeScale { ux, uy });
            }
        }
        SamplingGrid::Adaptive { lattice, scales }
    }

    /// Image position of module coordinate `(x, y)`
    pub fn sample(&self, x: f32, y: f32) -> Point {
        match self {
            SamplingGrid::Regular {
                origin,
                extent,
                corners,
            } => {
                let u = (x - origin.x) / extent.x;
                let v = (y - origin.y) / extent.y;
                let top = corners[0].lerp(&corners[1], u);
                let bottom = corners[3].lerp(&corners[2], u);
                top.lerp(&bottom, v)
            }
            SamplingGrid::Perspective(t) => t.transform(&Point::new(x, y)),
            SamplingGrid::NonUniform(lattice) => lattice.bilinear(x, y),
            SamplingGrid::Adaptive { lattice, scales } => {
                let (cx, cy, u, v) = lattice.cell_weights(x, y);
                let mut acc = Point::new(0.0, 0.0);
                for (dr, dc, w) in [
                    (0, 0, (1.0 - u) * (1.0 - v)),
                    (0, 1, u * (1.0 - v)),
                    (1, 0, (1.0 - u) * v),
                    (1, 1, u * v),
                ] {
                    let (row, col) = (cy + dr, cx + dc);
                    let node = lattice.node(row, col);
                    let scale = &scales[row * lattice.xs.len() + col];
                    let predicted = node
                        + scale.ux * (x - lattice.xs[col])
                        + scale.uy * (y - lattice.ys[row]);
                    acc = acc + predicted * w;
                }
                acc
            }
        }
    }

    /// Image position of the centre of module (row `i`, column `j`)
    pub fn sample_regular(&self, i: usize, j: usize) -> Point {
        self.sample(j as f32 + 0.5, i as f32 + 0.5)
    }

    /// Sample a `width` × `height` module matrix from the image.
    ///
    /// Modules at least three pixels wide are read as a five-point majority.
    /// With `jitter` enabled each row carries a drift offset that is nudged
    /// toward the transitions actually observed between differently coloured
    /// neighbours, bounded to a third of a module.
    pub fn extract_points(
        &self,
        image: &BitImage,
        width: usize,
        height: usize,
        jitter: bool,
    ) -> BitMatrix {
        let mut out = BitMatrix::new(width, height);
        for i in 0..height {
            let mut drift = 0.0f32;
            let mut prev: Option<bool> = None;
            for j in 0..width {
                let x = j as f32 + 0.5;
                let y = i as f32 + 0.5;
                let center = self.sample_regular(i, j);
                let ux = self.sample(x + 0.5, y) - self.sample(x - 0.5, y);
                let module = ux.length();
                let p = center + ux * drift;
                let dark = sample_module(image, p, ux, self.sample(x, y + 0.5) - center, module);
                if jitter && module >= 3.0 {
                    if let Some(prev_dark) = prev {
                        if prev_dark != dark {
                            if let Some(offset) = edge_offset(image, p - ux * 0.5, ux) {
                                drift = (drift - offset * 0.5).clamp(-0.33, 0.33);
                            }
                        }
                    }
                }
                prev = Some(dark);
                out.set(j, i, dark);
            }
        }
        out
    }
}

/// Five-point majority for modules of at least three pixels, single point otherwise
fn sample_module(image: &BitImage, p: Point, ux: Point, half_uy: Point, module: f32) -> bool {
    if module < 3.0 {
        return image.sample(p);
    }
    let dx = ux * 0.25;
    let dy = half_uy * 0.5;
    let votes = [p, p + dx + dy, p + dx - dy, p - dx + dy, p - dx - dy]
        .iter()
        .filter(|&&q| image.sample(q))
        .count();
    votes >= 3
}

/// Offset, in modules, of the observed colour change from the expected edge at
/// `expected`; `None` when no single change is found within ±0.4 module
fn edge_offset(image: &BitImage, expected: Point, ux: Point) -> Option<f32> {
    const STEPS: i32 = 8;
    let left = image.sample(expected - ux * 0.45);
    let right = image.sample(expected + ux * 0.45);
    if left == right {
        return None;
    }
    let mut last = left;
    for k in -STEPS..=STEPS {
        let t = k as f32 * 0.4 / STEPS as f32;
        let c = image.sample(expected + ux * t);
        if c != last {
            return Some(t);
        }
        last = c;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(modules: usize, scale: usize, offset: usize) -> (BitImage, BitMatrix) {
        let mut m = BitMatrix::new(modules, modules);
        for y in 0..modules {
            for x in 0..modules {
                m.set(x, y, (x * 7 + y * 3) % 5 < 2);
            }
        }
        let size = modules * scale + 2 * offset;
        let mut bits = BitMatrix::new(size, size);
        for y in 0..modules {
            for x in 0..modules {
                if m.get(x, y) {
                    bits.set_region(offset + x * scale, offset + y * scale, scale, scale);
                }
            }
        }
        (BitImage::from_bits(bits), m)
    }

    #[test]
    fn test_lattice_grids_match_affine_mapping() {
        // an affine map sampled at uneven nodes: every variant reproduces it
        let map = |x: f32, y: f32| Point::new(5.0 + 3.0 * x + 0.5 * y, 7.0 + 0.25 * x + 3.0 * y);
        let xs = vec![3.5, 10.5, 22.5];
        let ys = vec![3.5, 14.5, 22.5];
        let mut pts = Vec::new();
        for &y in &ys {
            for &x in &xs {
                pts.push(map(x, y));
            }
        }
        let lattice = Lattice::new(xs, ys, pts).unwrap();
        let non_uniform = SamplingGrid::NonUniform(lattice.clone());
        let adaptive = SamplingGrid::adaptive(lattice);
        for &(x, y) in &[(0.5, 0.5), (12.0, 5.0), (24.5, 24.5), (7.25, 19.0)] {
            let want = map(x, y);
            assert!(non_uniform.sample(x, y).distance(&want) < 1e-3);
            assert!(adaptive.sample(x, y).distance(&want) < 1e-3);
        }
    }

    #[test]
    fn test_lattice_rejects_bad_shapes() {
        let p = Point::new(0.0, 0.0);
        assert!(Lattice::new(vec![0.0], vec![0.0, 1.0], vec![p; 2]).is_none());
        assert!(Lattice::new(vec![1.0, 0.0], vec![0.0, 1.0], vec![p; 4]).is_none());
        assert!(Lattice::new(vec![0.0, 1.0], vec![0.0, 1.0], vec![p; 3]).is_none());
    }
}
