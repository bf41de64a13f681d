//! Symbol geometry from finder patterns.
//!
//! Model 2 symbols are triangulated from three finders: the corner finder
//! sits opposite the longest side of the triangle and the orientation of the
//! other two follows from the sign of the cross product. Micro QR symbols
//! have a single finder; their orientation and size come from the timing
//! patterns along the outer row and column.

use crate::decoder::config;
use crate::detector::alignment::{find_alignment, locate_alignment_grid};
use crate::detector::finder::FinderPattern;
use crate::detector::grid::SamplingGrid;
use crate::models::{BitImage, Point, Version};
use crate::utils::geometry::PerspectiveTransform;

use super::function_mask::alignment_positions;

/// Largest allowed ratio between the module sizes of a triple's finders
const MAX_MODULE_RATIO: f32 = 1.5;
/// Largest allowed |cos| of the angle at the corner finder
const MAX_CORNER_COS: f32 = 0.4;
/// Finders considered for triangulation, by confirmation count
const MAX_FINDERS: usize = 24;

/// Three finders in symbol order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinderTriple {
    pub top_left: FinderPattern,
    pub top_right: FinderPattern,
    pub bottom_left: FinderPattern,
    /// Lower is a better right-angled isosceles fit
    pub score: f32,
    /// Indices into the finder list the triple was built from
    pub members: [usize; 3],
}

impl FinderTriple {
    pub fn module_size(&self) -> f32 {
        (self.top_left.module_size + self.top_right.module_size + self.bottom_left.module_size) / 3.0
    }

    /// Dimension estimated from finder spacing, snapped to `17 + 4v`
    pub fn estimated_version(&self) -> Option<u8> {
        let module = self.module_size();
        let span = (self.top_left.center.distance(&self.top_right.center)
            + self.top_left.center.distance(&self.bottom_left.center))
            * 0.5
            / module;
        let version = ((span + 7.0 - 17.0) / 4.0).round();
        (1.0..=40.0).contains(&version).then_some(version as u8)
    }
}

fn triple_from(finders: &[FinderPattern], members: [usize; 3]) -> Option<FinderTriple> {
    let [p0, p1, p2] = members.map(|i| finders[i]);
    let sizes = [p0.module_size, p1.module_size, p2.module_size];
    let min = sizes.iter().copied().fold(f32::MAX, f32::min);
    let max = sizes.iter().copied().fold(0.0f32, f32::max);
    if min <= 0.0 || max / min > MAX_MODULE_RATIO {
        return None;
    }
    let d01 = p0.center.distance(&p1.center);
    let d02 = p0.center.distance(&p2.center);
    let d12 = p1.center.distance(&p2.center);
    // corner opposite the longest side
    let (corner, a, b) = if d12 >= d01 && d12 >= d02 {
        (p0, p1, p2)
    } else if d02 >= d01 && d02 >= d12 {
        (p1, p0, p2)
    } else {
        (p2, p0, p1)
    };
    let va = a.center - corner.center;
    let vb = b.center - corner.center;
    let (la, lb) = (va.length(), vb.length());
    if la < 14.0 * min || lb < 14.0 * min {
        return None;
    }
    let cos = va.dot(&vb) / (la * lb);
    let ratio = la.max(lb) / la.min(lb);
    if cos.abs() > MAX_CORNER_COS || ratio > 1.4 {
        return None;
    }
    let (top_right, bottom_left) = if va.cross(&vb) > 0.0 { (a, b) } else { (b, a) };
    Some(FinderTriple {
        top_left: corner,
        top_right,
        bottom_left,
        score: cos.abs() + (ratio - 1.0),
        members,
    })
}

/// Disjoint finder triples, best fit first
pub fn triangulate(finders: &[FinderPattern]) -> Vec<FinderTriple> {
    let mut order: Vec<usize> = (0..finders.len()).collect();
    order.sort_by(|&a, &b| finders[b].hits.cmp(&finders[a].hits));
    order.truncate(MAX_FINDERS);
    let mut candidates = Vec::new();
    for (x, &i) in order.iter().enumerate() {
        for (y, &j) in order.iter().enumerate().skip(x + 1) {
            for &k in order.iter().skip(y + 1) {
                if let Some(t) = triple_from(finders, [i, j, k]) {
                    candidates.push(t);
                }
            }
        }
    }
    candidates.sort_by(|a, b| a.score.total_cmp(&b.score));
    let mut used = vec![false; finders.len()];
    let mut out = Vec::new();
    for t in candidates {
        if t.members.iter().any(|&m| used[m]) {
            continue;
        }
        for &m in &t.members {
            used[m] = true;
        }
        out.push(t);
    }
    out
}

/// Module-to-image transform of a Model 2 symbol of `version`, anchored on
/// the finder centres and, when found, the bottom-right alignment pattern
pub fn symbol_transform(image: &BitImage, triple: &FinderTriple, version: u8) -> Option<PerspectiveTransform> {
    let dim = Version::Model2(version).size() as f32;
    let tl = triple.top_left.center;
    let tr = triple.top_right.center;
    let bl = triple.bottom_left.center;
    let near = 3.5;
    let far = dim - 3.5;
    let src = [
        Point::new(near, near),
        Point::new(far, near),
        Point::new(far, far),
        Point::new(near, far),
    ];
    let affine_corner = tr + bl - tl;
    let affine = PerspectiveTransform::from_points(&src, &[tl, tr, affine_corner, bl])?;
    if version < 2 {
        return Some(affine);
    }
    let at = dim - 6.5;
    let m = Point::new(at, at);
    let predicted = affine.transform(&m);
    let (ux, uy) = affine.module_axes(m);
    let radius = config::qr_alignment_radius() as f32;
    match find_alignment(image, predicted, ux, uy, radius) {
        Some(found) => {
            let src = [Point::new(near, near), Point::new(far, near), m, Point::new(near, far)];
            PerspectiveTransform::from_points(&src, &[tl, tr, found, bl]).or(Some(affine))
        }
        None => Some(affine),
    }
}

/// Sampling grids for a Model 2 symbol, in the order they are tried
pub fn symbol_grids(image: &BitImage, transform: &PerspectiveTransform, version: u8) -> Vec<SamplingGrid> {
    let mut grids = vec![SamplingGrid::Perspective(*transform)];
    let positions = alignment_positions(version);
    if positions.len() >= 2 {
        let radius = config::qr_alignment_radius() as f32;
        if let Some(lattice) = locate_alignment_grid(image, &positions, transform, radius) {
            grids.push(SamplingGrid::NonUniform(lattice.clone()));
            grids.push(SamplingGrid::adaptive(lattice));
        }
    }
    grids
}

/// Image corners (clockwise from top-left) of a `dim`-module symbol
pub fn outline(grid: &SamplingGrid, dim: usize) -> [Point; 4] {
    let d = dim as f32;
    [
        grid.sample(0.0, 0.0),
        grid.sample(d, 0.0),
        grid.sample(d, d),
        grid.sample(0.0, d),
    ]
}

/// Micro QR placement: grid and module count
#[derive(Debug, Clone)]
pub struct MicroPlacement {
    pub grid: SamplingGrid,
    pub dimension: usize,
}

/// Frame around a single finder: module (x, y) maps to
/// `center + ux * (x - 3.5) + uy * (y - 3.5)`
#[derive(Debug, Clone, Copy)]
struct MicroFrame {
    center: Point,
    ux: Point,
    uy: Point,
}

impl MicroFrame {
    fn at(&self, x: f32, y: f32) -> Point {
        self.center + self.ux * (x - 3.5) + self.uy * (y - 3.5)
    }

    /// Mismatches of the timing patterns and the quiet zone beyond them for
    /// a symbol of `dim` modules
    fn timing_errors(&self, image: &BitImage, dim: usize) -> usize {
        let mut errors = 0;
        for k in 8..dim + 2 {
            let expected = k < dim && k % 2 == 0;
            let c = k as f32 + 0.5;
            errors += (image.sample(self.at(c, 0.5)) != expected) as usize;
            errors += (image.sample(self.at(0.5, c)) != expected) as usize;
        }
        errors
    }

    /// Rescale `ux` so the last timing module lands on its observed centre
    fn refine_scale(&mut self, image: &BitImage, dim: usize) {
        let last = dim as f32 - 0.5;
        let step = 0.1;
        let mut first_dark = None;
        let mut last_dark = None;
        let mut t = last - 1.0;
        while t <= last + 1.0 {
            if image.sample(self.at(t, 0.5)) {
                first_dark.get_or_insert(t);
                last_dark = Some(t);
            } else if first_dark.is_some() && t > last {
                break;
            }
            t += step;
        }
        if let (Some(a), Some(b)) = (first_dark, last_dark) {
            let observed = (a + b) * 0.5;
            let scale = (observed - 3.5) / (last - 3.5);
            if (0.85..1.15).contains(&scale) {
                self.ux = self.ux * scale;
                self.uy = self.uy * scale;
            }
        }
    }
}

/// Find the orientation and size of a Micro QR symbol around `finder`
pub fn place_micro(image: &BitImage, finder: &FinderPattern, axis: Point) -> Option<MicroPlacement> {
    let m = finder.module_size;
    let mut best: Option<(usize, MicroFrame, usize)> = None;
    let mut u = axis.normalized();
    for _ in 0..4 {
        let frame = MicroFrame {
            center: finder.center,
            ux: u * m,
            uy: u.perpendicular() * m,
        };
        for version in 1..=4u8 {
            let dim = Version::Micro(version).size();
            let errors = frame.timing_errors(image, dim);
            if best.as_ref().is_none_or(|&(e, ..)| errors < e) {
                best = Some((errors, frame, dim));
            }
        }
        u = u.perpendicular();
    }
    let (errors, mut frame, dimension) = best?;
    if errors > 2 {
        return None;
    }
    frame.refine_scale(image, dimension);
    let d = dimension as f32;
    let corners = [frame.at(0.0, 0.0), frame.at(d, 0.0), frame.at(d, d), frame.at(0.0, d)];
    Some(MicroPlacement {
        grid: SamplingGrid::regular(corners, d, d),
        dimension,
    })
}
