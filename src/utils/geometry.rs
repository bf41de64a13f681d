//! Planar homographies between module space and image space.

use crate::models::Point;

const SINGULAR: f32 = 1e-10;

/// Projective map `(x, y) -> ((h0 x + h1 y + h2) / w, (h3 x + h4 y + h5) / w)`
/// with `w = h6 x + h7 y + 1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveTransform {
    h: [f32; 8],
}

impl PerspectiveTransform {
    /// Transform taking each `src[i]` to `dst[i]`, or `None` when three of
    /// the points are collinear
    pub fn from_points(src: &[Point; 4], dst: &[Point; 4]) -> Option<Self> {
        let mut rows = [[0.0f32; 9]; 8];
        for (i, (s, d)) in src.iter().zip(dst).enumerate() {
            rows[2 * i] = [s.x, s.y, 1.0, 0.0, 0.0, 0.0, -d.x * s.x, -d.x * s.y, d.x];
            rows[2 * i + 1] = [0.0, 0.0, 0.0, s.x, s.y, 1.0, -d.y * s.x, -d.y * s.y, d.y];
        }
        solve(rows).map(|h| Self { h })
    }

    /// Image position of module-space point `p`
    pub fn transform(&self, p: &Point) -> Point {
        let h = &self.h;
        let w = h[6] * p.x + h[7] * p.y + 1.0;
        if w.abs() < SINGULAR {
            return Point::new(0.0, 0.0);
        }
        Point::new(
            (h[0] * p.x + h[1] * p.y + h[2]) / w,
            (h[3] * p.x + h[4] * p.y + h[5]) / w,
        )
    }

    /// Image vectors spanned by one module along x and along y, centred on `m`
    pub fn module_axes(&self, m: Point) -> (Point, Point) {
        let half_x = Point::new(0.5, 0.0);
        let half_y = Point::new(0.0, 0.5);
        (
            self.transform(&(m + half_x)) - self.transform(&(m - half_x)),
            self.transform(&(m + half_y)) - self.transform(&(m - half_y)),
        )
    }
}

/// Gauss-Jordan elimination with partial pivoting on an augmented 8x9 system
fn solve(mut rows: [[f32; 9]; 8]) -> Option<[f32; 8]> {
    for col in 0..8 {
        let pivot = (col..8).max_by(|&a, &b| rows[a][col].abs().total_cmp(&rows[b][col].abs()))?;
        if rows[pivot][col].abs() < SINGULAR {
            return None;
        }
        rows.swap(col, pivot);
        let lead = rows[col];
        for (r, row) in rows.iter_mut().enumerate() {
            if r == col || row[col] == 0.0 {
                continue;
            }
            let factor = row[col] / lead[col];
            for (v, l) in row.iter_mut().zip(lead.iter()).skip(col) {
                *v -= factor * l;
            }
        }
    }
    let mut h = [0.0f32; 8];
    for (i, value) in h.iter_mut().enumerate() {
        *value = rows[i][8] / rows[i][i];
    }
    Some(h)
}
