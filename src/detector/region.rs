//! Promotion of one-dimensional pattern matches into located 2-D regions.

use crate::models::{BitImage, Point, PointI, Rect};
use crate::utils::line::{sample_line, track_edge_extent};

/// A scan line through the image: pixel `i` is `origin + step * i`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLine {
    /// First pixel
    pub origin: PointI,
    /// Unit step between pixels
    pub step: PointI,
    /// Number of pixels
    pub len: usize,
}

impl ScanLine {
    /// Row `y` of an image `width` pixels wide
    pub fn row(y: usize, width: usize) -> Self {
        Self {
            origin: PointI::new(0, y as i32),
            step: PointI::new(1, 0),
            len: width,
        }
    }

    /// Column `x` of an image `height` pixels tall
    pub fn column(x: usize, height: usize) -> Self {
        Self {
            origin: PointI::new(x as i32, 0),
            step: PointI::new(0, 1),
            len: height,
        }
    }

    /// True for a vertical line
    pub fn is_column(&self) -> bool {
        self.step.x == 0
    }

    /// Centre of pixel `offset` (fractional offsets allowed)
    pub fn point(&self, offset: f32) -> Point {
        Point::new(
            self.origin.x as f32 + self.step.x as f32 * offset + 0.5,
            self.origin.y as f32 + self.step.y as f32 * offset + 0.5,
        )
    }

    /// Direction along the line
    pub fn direction(&self) -> Point {
        Point::new(self.step.x as f32, self.step.y as f32)
    }

    /// Nominal bar direction, perpendicular to the line
    pub fn bar_direction(&self) -> Point {
        self.direction().perpendicular()
    }

    /// Last pixel
    pub fn end(&self) -> PointI {
        let n = self.len.saturating_sub(1) as i32;
        PointI::new(self.origin.x + self.step.x * n, self.origin.y + self.step.y * n)
    }

    /// Read the line into `out`
    pub fn read(&self, image: &BitImage, out: &mut Vec<bool>) {
        if self.len == 0 {
            out.clear();
            return;
        }
        sample_line(image, self.origin, self.end(), out);
    }

    /// Read the line as a per-pixel majority over `2 * radius + 1` parallel
    /// lines, so isolated pixels along the bars crossing it are outvoted
    pub fn read_band(&self, image: &BitImage, radius: usize, out: &mut Vec<bool>) {
        if radius == 0 {
            self.read(image, out);
            return;
        }
        out.clear();
        let across = PointI::new(-self.step.y, self.step.x);
        let reach = radius as i32;
        out.extend((0..self.len as i32).map(|i| {
            let x = self.origin.x + self.step.x * i;
            let y = self.origin.y + self.step.y * i;
            let votes = (-reach..=reach)
                .filter(|&k| image.is_black(x + across.x * k, y + across.y * k))
                .count();
            votes > radius
        }));
    }

    /// Position of the line across the image (row index or column index)
    pub fn index(&self) -> usize {
        if self.is_column() {
            self.origin.x as usize
        } else {
            self.origin.y as usize
        }
    }
}

/// A located symbol: a possibly skewed quadrilateral.
///
/// Corners are always A = bottom-left, B = bottom-right, C = top-left,
/// D = top-right in the symbol's own reading frame, so sampling never has to
/// re-orient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarCodeRegion {
    /// Bottom-left
    pub a: Point,
    /// Bottom-right
    pub b: Point,
    /// Top-left
    pub c: Point,
    /// Top-right
    pub d: Point,
    /// Location confidence in [0, 1]
    pub confidence: f32,
    /// Set when the symbol reads right to left on its scan line
    pub reversed: bool,
    /// Estimated module size in pixels
    pub module_size: f32,
}

impl BarCodeRegion {
    /// Region from corners given clockwise from top-left
    pub fn from_corners(tl: Point, tr: Point, br: Point, bl: Point, module_size: f32) -> Self {
        Self {
            a: bl,
            b: br,
            c: tl,
            d: tr,
            confidence: 1.0,
            reversed: false,
            module_size,
        }
    }

    /// Corners clockwise from top-left
    pub fn polygon(&self) -> [Point; 4] {
        [self.c, self.d, self.b, self.a]
    }

    /// Axis-aligned bounds
    pub fn bounds(&self) -> Rect {
        Rect::bounding(&self.polygon())
    }

    /// Mean length of the top and bottom edges
    pub fn width(&self) -> f32 {
        (self.c.distance(&self.d) + self.a.distance(&self.b)) * 0.5
    }

    /// Mean length of the left and right edges
    pub fn height(&self) -> f32 {
        (self.c.distance(&self.a) + self.d.distance(&self.b)) * 0.5
    }

    /// True when the two regions cover substantially the same pixels
    pub fn overlaps(&self, other: &BarCodeRegion) -> bool {
        self.bounds().overlap_ratio(&other.bounds()) > 0.5
    }

    /// Same region in an image mirrored left to right
    pub fn mirrored(&self, image_width: usize) -> Self {
        let flip = |p: Point| Point::new(image_width as f32 - p.x, p.y);
        Self {
            a: flip(self.b),
            b: flip(self.a),
            c: flip(self.d),
            d: flip(self.c),
            ..*self
        }
    }

    /// Region read from the opposite end: corners rotated by 180 degrees
    pub fn rotated180(&self) -> Self {
        Self {
            a: self.d,
            b: self.c,
            c: self.b,
            d: self.a,
            reversed: !self.reversed,
            ..*self
        }
    }
}

/// Track the bars at both ends of a match on `line` up and down to the
/// symbol's full height.
///
/// `start`/`end` are pixel offsets of the first and one-past-last pixel of
/// the match. The walk direction is refined from the first tracking pass and
/// re-tracked if the refined direction yields a longer edge.
pub fn track_pattern_region(
    image: &BitImage,
    line: &ScanLine,
    start: usize,
    end: usize,
    module_size: f32,
) -> Option<BarCodeRegion> {
    if end <= start + 1 {
        return None;
    }
    let max_len = image.width().max(image.height());
    let near = line.point(start as f32);
    let far = line.point((end - 1) as f32);
    let dir = line.bar_direction();

    let (near_top, near_bottom) = track_edge_refined(image, near, dir, max_len);
    let (far_top, far_bottom) = track_edge_refined(image, far, dir, max_len);

    let region = BarCodeRegion {
        a: near_bottom,
        b: far_bottom,
        c: near_top,
        d: far_top,
        confidence: 1.0,
        reversed: false,
        module_size,
    };
    if region.height() < 1.0 {
        return None;
    }
    Some(region)
}

fn track_edge_refined(
    image: &BitImage,
    start: Point,
    dir: Point,
    max_len: usize,
) -> (Point, Point) {
    let (top, bottom) = track_edge_extent(image, start, dir, max_len);
    let first_len = top.distance(&bottom);
    let refined = (bottom - top).normalized();
    if first_len < 4.0 || refined.dot(&dir).abs() > 0.9999 {
        return (top, bottom);
    }
    let refined = if refined.dot(&dir) < 0.0 { -refined } else { refined };
    let (top2, bottom2) = track_edge_extent(image, start, refined, max_len);
    if top2.distance(&bottom2) > first_len {
        (top2, bottom2)
    } else {
        (top, bottom)
    }
}

// (dx, dy, dark) in module units around the centre of a 7x7 finder square
const SQUARE_FINDER_SAMPLES: [(i8, i8, bool); 29] = [
    (0, 0, true),
    (1, 0, true),
    (-1, 0, true),
    (0, 1, true),
    (0, -1, true),
    (1, 1, true),
    (-1, -1, true),
    (1, -1, true),
    (-1, 1, true),
    (2, 0, false),
    (-2, 0, false),
    (0, 2, false),
    (0, -2, false),
    (2, 2, false),
    (-2, -2, false),
    (2, -2, false),
    (-2, 2, false),
    (3, 0, true),
    (-3, 0, true),
    (0, 3, true),
    (0, -3, true),
    (3, 3, true),
    (-3, -3, true),
    (3, -3, true),
    (-3, 3, true),
    (4, 0, false),
    (-4, 0, false),
    (0, 4, false),
    (0, -4, false),
];

/// Number of fixed samples around a square finder that disagree with the
/// nested dark/light/dark rings; `axis` is the finder's x direction.
pub fn square_finder_failures(
    image: &BitImage,
    center: Point,
    module_size: f32,
    axis: Point,
) -> usize {
    let ux = axis.normalized() * module_size;
    let uy = ux.perpendicular();
    SQUARE_FINDER_SAMPLES
        .iter()
        .filter(|&&(dx, dy, dark)| {
            let p = center + ux * dx as f32 + uy * dy as f32;
            image.sample(p) != dark
        })
        .count()
}

/// Accept a square finder candidate if at most `max_failures` samples disagree
pub fn validate_square_finder(
    image: &BitImage,
    center: Point,
    module_size: f32,
    axis: Point,
    max_failures: usize,
) -> bool {
    square_finder_failures(image, center, module_size, axis) <= max_failures
}

/// Estimate the rotation of a square finder from the distance to its outer
/// edge along rays: the edge is nearest along the side normals. Returns the
/// unit x axis of the square (one of four equivalent directions).
pub fn square_finder_axis(image: &BitImage, center: Point, module_size: f32) -> Point {
    const STEPS: usize = 90;
    let max_steps = (module_size * 6.0).ceil() as usize + 2;
    let mut best_angle = 0.0f32;
    let mut best_score = f32::MAX;
    // distance profile is periodic in 90 degrees; fold the four quadrants
    for k in 0..STEPS {
        let base = k as f32 * std::f32::consts::FRAC_PI_2 / STEPS as f32;
        let mut score = 0.0f32;
        for q in 0..4 {
            let angle = base + q as f32 * std::f32::consts::FRAC_PI_2;
            let dir = Point::new(angle.cos(), angle.sin());
            score += ray_to_outer_edge(image, center, dir, module_size, max_steps);
        }
        if score < best_score {
            best_score = score;
            best_angle = base;
        }
    }
    Point::new(best_angle.cos(), best_angle.sin())
}

/// Distance from `center` to the first light pixel beyond the outer dark ring
fn ray_to_outer_edge(
    image: &BitImage,
    center: Point,
    dir: Point,
    module_size: f32,
    max_steps: usize,
) -> f32 {
    let gap = (module_size * 0.5).min(2.0);
    let limit = max_steps as f32;
    // skip past the light ring first
    let start = (module_size * 2.5).max(1.0);
    let t = walk_ray(image, center, dir, start, limit, false, gap);
    walk_ray(image, center, dir, t, limit, true, gap)
}

/// First position from `t` where the ray leaves colour `dark` for longer than
/// `gap` pixels, in half-pixel steps
fn walk_ray(image: &BitImage, center: Point, dir: Point, mut t: f32, limit: f32, dark: bool, gap: f32) -> f32 {
    while t < limit {
        if image.sample(center + dir * t) != dark {
            let mut k = 0.5;
            while k <= gap && image.sample(center + dir * (t + k)) != dark {
                k += 0.5;
            }
            if k > gap {
                return t;
            }
            t += k;
        }
        t += 0.5;
    }
    t
}
