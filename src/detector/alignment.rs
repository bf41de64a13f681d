//! Alignment patterns: 5x5 module squares (dark ring, light ring, dark
//! centre) at known module positions inside larger matrix symbols.

use super::grid::Lattice;
use crate::models::{BitImage, Point};
use crate::utils::geometry::PerspectiveTransform;
use tracing::trace;

/// Best mismatch count (of 25 samples) still accepted as a pattern
const MAX_MISMATCH: usize = 5;

/// Samples of the 5x5 pattern around `center` that have the wrong colour;
/// `ux`/`uy` are the image vectors of one module along x and y
pub fn alignment_mismatch(image: &BitImage, center: Point, ux: Point, uy: Point) -> usize {
    let mut mismatches = 0;
    for dy in -2i32..=2 {
        for dx in -2i32..=2 {
            let dark = dx.abs() == 2 || dy.abs() == 2 || (dx == 0 && dy == 0);
            let p = center + ux * dx as f32 + uy * dy as f32;
            if image.sample(p) != dark {
                mismatches += 1;
            }
        }
    }
    mismatches
}

/// Search a `radius`-module neighbourhood of `predicted` for the pattern
/// centre; ties at the best score are averaged
pub fn find_alignment(image: &BitImage, predicted: Point, ux: Point, uy: Point, radius: f32) -> Option<Point> {
    if !predicted.x.is_finite() || !predicted.y.is_finite() {
        return None;
    }
    let module = (ux.length() + uy.length()) * 0.5;
    if module < 1.0 {
        return None;
    }
    let reach = (radius * module).ceil() as i32;
    let mut best = usize::MAX;
    let mut sum = Point::default();
    let mut count = 0usize;
    for oy in -reach..=reach {
        for ox in -reach..=reach {
            let p = Point::new(predicted.x + ox as f32, predicted.y + oy as f32);
            let mismatch = alignment_mismatch(image, p, ux, uy);
            if mismatch < best {
                best = mismatch;
                sum = p;
                count = 1;
            } else if mismatch == best {
                sum = sum + p;
                count += 1;
            }
        }
    }
    (best <= MAX_MISMATCH && count > 0).then(|| sum * (1.0 / count as f32))
}

/// Locate every node of an alignment position grid.
///
/// `positions` are the module coordinates of pattern centres along each
/// axis; the three nodes covered by finder patterns are taken from
/// `transform`. The remaining nodes are visited from the top-left outward:
/// each is predicted from already located neighbours (or from `transform`
/// when none are available) and then refined by a local search.
pub fn locate_alignment_grid(
    image: &BitImage,
    positions: &[usize],
    transform: &PerspectiveTransform,
    radius: f32,
) -> Option<Lattice> {
    let n = positions.len();
    if n < 2 {
        return None;
    }
    let module_point = |row: usize, col: usize| Point::new(positions[col] as f32 + 0.5, positions[row] as f32 + 0.5);
    let mut nodes: Vec<Option<Point>> = vec![None; n * n];
    let mut order: Vec<(usize, usize)> = (0..n).flat_map(|r| (0..n).map(move |c| (r, c))).collect();
    order.sort_by_key(|&(r, c)| (r + c, r));

    let mut refined = 0usize;
    for (row, col) in order {
        let m = module_point(row, col);
        let from_transform = transform.transform(&m);
        let finder = (row == 0 && col == 0) || (row == 0 && col == n - 1) || (row == n - 1 && col == 0);
        if finder {
            nodes[row * n + col] = Some(from_transform);
            continue;
        }
        let at = |r: usize, c: usize| nodes[r * n + c];
        let predicted = match (row, col) {
            (r, c) if r > 0 && c > 0 => match (at(r, c - 1), at(r - 1, c), at(r - 1, c - 1)) {
                (Some(left), Some(up), Some(diag)) => left + up - diag,
                _ => from_transform,
            },
            _ => from_transform,
        };
        let (ux, uy) = transform.module_axes(m);
        let found = find_alignment(image, predicted, ux, uy, radius);
        if found.is_some() {
            refined += 1;
        }
        nodes[row * n + col] = Some(found.unwrap_or(predicted));
    }
    trace!(nodes = n * n - 3, refined, "alignment grid");

    let coords: Vec<f32> = positions.iter().map(|&p| p as f32 + 0.5).collect();
    let points = nodes.into_iter().collect::<Option<Vec<Point>>>()?;
    Lattice::new(coords.clone(), coords, points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BitMatrix;

    fn draw_alignment(bits: &mut BitMatrix, cx: usize, cy: usize, m: usize) {
        let x0 = cx - 2 * m - m / 2;
        let y0 = cy - 2 * m - m / 2;
        bits.set_region(x0, y0, 5 * m, 5 * m);
        for y in y0 + m..y0 + 4 * m {
            for x in x0 + m..x0 + 4 * m {
                bits.set(x, y, false);
            }
        }
        bits.set_region(x0 + 2 * m, y0 + 2 * m, m, m);
    }

    #[test]
    fn test_find_alignment_near_prediction() {
        let mut bits = BitMatrix::new(80, 80);
        draw_alignment(&mut bits, 40, 42, 4);
        let image = BitImage::from_bits(bits);
        let ux = Point::new(4.0, 0.0);
        let uy = Point::new(0.0, 4.0);
        assert_eq!(alignment_mismatch(&image, Point::new(40.0, 42.0), ux, uy), 0);
        let found = find_alignment(&image, Point::new(37.0, 45.0), ux, uy, 3.0).expect("found");
        assert!(found.distance(&Point::new(40.0, 42.0)) < 1.5, "found {:?}", found);
        assert!(find_alignment(&BitImage::from_bits(BitMatrix::new(80, 80)), Point::new(40.0, 40.0), ux, uy, 3.0).is_none());
    }

    #[test]
    fn test_grid_uses_transform_for_finder_nodes() {
        // identity-like transform at 2 px per module, blank image: every
        // node falls back to its prediction
        let src = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        let dst = src.map(|p| p * 2.0);
        let transform = PerspectiveTransform::from_points(&src, &dst).unwrap();
        let image = BitImage::from_bits(BitMatrix::new(100, 100));
        let lattice = locate_alignment_grid(&image, &[6, 22, 38], &transform, 2.0).unwrap();
        assert_eq!(lattice.xs(), &[6.5, 22.5, 38.5]);
        assert!(lattice.node(0, 0).distance(&Point::new(13.0, 13.0)) < 1e-3);
        assert!(lattice.node(2, 2).distance(&Point::new(77.0, 77.0)) < 1e-3);
    }
}
