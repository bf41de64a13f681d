//! Line walking over a [`BitImage`]: Bresenham stepping, run-length capture
//! and bar-edge tracking.

use crate::models::{BitImage, Point, PointI};

/// Integer Bresenham walk from `start` to `end`, both inclusive
#[derive(Debug, Clone)]
pub struct BresenhamLine {
    current: PointI,
    end: PointI,
    dx: i32,
    dy: i32,
    sx: i32,
    sy: i32,
    err: i32,
    done: bool,
}

impl BresenhamLine {
    pub fn new(start: PointI, end: PointI) -> Self {
        let dx = (end.x - start.x).abs();
        let dy = -(end.y - start.y).abs();
        Self {
            current: start,
            end,
            dx,
            dy,
            sx: if start.x < end.x { 1 } else { -1 },
            sy: if start.y < end.y { 1 } else { -1 },
            err: dx + dy,
            done: false,
        }
    }
}

impl Iterator for BresenhamLine {
    type Item = PointI;

    fn next(&mut self) -> Option<PointI> {
        if self.done {
            return None;
        }
        let p = self.current;
        if p == self.end {
            self.done = true;
            return Some(p);
        }
        let e2 = 2 * self.err;
        if e2 >= self.dy {
            self.err += self.dy;
            self.current.x += self.sx;
        }
        if e2 <= self.dx {
            self.err += self.dx;
            self.current.y += self.sy;
        }
        Some(p)
    }
}

/// Pixels from `start` to `end` into `out` (reused)
pub fn sample_line(image: &BitImage, start: PointI, end: PointI, out: &mut Vec<bool>) {
    out.clear();
    out.extend(BresenhamLine::new(start, end).map(|p| image.is_black(p.x, p.y)));
}

/// Run lengths of a bit line, first run colour returned separately
pub fn run_lengths(line: &[bool], out: &mut Vec<u32>) -> bool {
    out.clear();
    let Some(&first) = line.first() else {
        return false;
    };
    let mut color = first;
    let mut len = 0u32;
    for &bit in line {
        if bit == color {
            len += 1;
        } else {
            out.push(len);
            color = bit;
            len = 1;
        }
    }
    out.push(len);
    first
}

/// Follow a dark edge from `start` in direction `along`.
///
/// Each step moves one pixel along the edge; when the pixel ahead turns light
/// the walk tries a one-pixel nudge to either side, which absorbs skew of up to
/// 45 degrees. The walk stops after `max_gap` consecutive light steps.
pub fn track_edge(
    image: &BitImage,
    start: Point,
    along: Point,
    max_len: usize,
    max_gap: usize,
) -> Point {
    let along = along.normalized();
    let side = along.perpendicular();
    let mut pos = start;
    let mut last_dark = start;
    let mut gap = 0usize;
    for _ in 0..max_len {
        let ahead = pos + along;
        let next = if image.sample(ahead) {
            Some(ahead)
        } else if image.sample(ahead + side) {
            Some(ahead + side)
        } else if image.sample(ahead - side) {
            Some(ahead - side)
        } else {
            None
        };
        match next {
            Some(p) => {
                pos = p;
                last_dark = p;
                gap = 0;
            }
            None => {
                gap += 1;
                if gap > max_gap {
                    break;
                }
                pos = ahead;
            }
        }
    }
    last_dark
}

/// Both extremes of the dark edge through `start`, walking `dir` and its reverse
pub fn track_edge_extent(
    image: &BitImage,
    start: Point,
    dir: Point,
    max_len: usize,
) -> (Point, Point) {
    let a = track_edge(image, start, -dir, max_len, 1);
    let b = track_edge(image, start, dir, max_len, 1);
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BitMatrix;

    #[test]
    fn test_bresenham_endpoints() {
        let pts: Vec<_> = BresenhamLine::new(PointI::new(0, 0), PointI::new(5, 2)).collect();
        assert_eq!(pts.first(), Some(&PointI::new(0, 0)));
        assert_eq!(pts.last(), Some(&PointI::new(5, 2)));
        assert_eq!(pts.len(), 6);
        let single: Vec<_> = BresenhamLine::new(PointI::new(3, 3), PointI::new(3, 3)).collect();
        assert_eq!(single, vec![PointI::new(3, 3)]);
    }

    #[test]
    fn test_run_lengths() {
        let mut runs = Vec::new();
        let first = run_lengths(&[true, true, false, true, true, true], &mut runs);
        assert!(first);
        assert_eq!(runs, vec![2, 1, 3]);
        assert!(!run_lengths(&[], &mut runs));
        assert!(runs.is_empty());
    }

    #[test]
    fn test_track_skewed_edge() {
        // A bar leaning one pixel right every four rows
        let mut bits = BitMatrix::new(40, 40);
        for y in 0..40 {
            let x0 = 10 + y / 4;
            bits.set_region(x0, y, 3, 1);
        }
        let image = BitImage::from_bits(bits);
        let (top, bottom) =
            track_edge_extent(&image, Point::new(16.5, 20.5), Point::new(0.0, 1.0), 100);
        assert!(top.y < 1.0, "top {:?}", top);
        assert!(bottom.y > 38.0, "bottom {:?}", bottom);
    }
}
