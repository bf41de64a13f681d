use std::ops::{Add, Mul, Neg, Sub};

/// 2D point with floating point coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

impl Point {
    /// Create a new point
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point
    pub fn distance(&self, other: &Point) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// Calculate squared distance (faster, no sqrt)
    pub fn distance_squared(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Length when the point is read as a vector
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit vector in the same direction, or zero for a zero vector
    pub fn normalized(&self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            return Self::default();
        }
        Self::new(self.x / len, self.y / len)
    }

    /// Vector rotated by +90 degrees (image coordinates: y grows downward)
    pub fn perpendicular(&self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Dot product
    pub fn dot(&self, other: &Point) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product
    pub fn cross(&self, other: &Point) -> f32 {
        self.x * other.y - self.y * other.x
    }

    /// Linear interpolation toward `other` (`t = 0` is `self`)
    pub fn lerp(&self, other: &Point, t: f32) -> Self {
        Self::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    /// Nearest pixel
    pub fn round(&self) -> PointI {
        PointI::new(self.x.round() as i32, self.y.round() as i32)
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Point {
    type Output = Point;

    fn mul(self, rhs: f32) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

/// Integer point for grid coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PointI {
    /// X coordinate
    pub x: i32,
    /// Y coordinate
    pub y: i32,
}

impl PointI {
    /// Create a new integer point
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<PointI> for Point {
    fn from(p: PointI) -> Self {
        Point::new(p.x as f32, p.y as f32)
    }
}

/// Axis-aligned rectangle in pixel coordinates, `right`/`bottom` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge
    pub left: i32,
    /// Top edge
    pub top: i32,
    /// Exclusive right edge
    pub right: i32,
    /// Exclusive bottom edge
    pub bottom: i32,
}

impl Rect {
    /// Create a rectangle from its origin and size
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            right: left + width.max(0),
            bottom: top + height.max(0),
        }
    }

    /// Smallest rectangle containing every point
    pub fn bounding(points: &[Point]) -> Self {
        if points.is_empty() {
            return Self::default();
        }
        let mut min_x = f32::MAX;
        let mut min_y = f32::MAX;
        let mut max_x = f32::MIN;
        let mut max_y = f32::MIN;
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Self {
            left: min_x.floor() as i32,
            top: min_y.floor() as i32,
            right: max_x.ceil() as i32 + 1,
            bottom: max_y.ceil() as i32 + 1,
        }
    }

    /// Width in pixels
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    /// Height in pixels
    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Area in pixels
    pub fn area(&self) -> i64 {
        self.width().max(0) as i64 * self.height().max(0) as i64
    }

    /// True when the rectangle holds no pixels
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Overlapping part of two rectangles
    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        }
    }

    /// True if (x, y) lies inside
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Fraction of the smaller rectangle covered by the intersection
    pub fn overlap_ratio(&self, other: &Rect) -> f32 {
        let inter = self.intersect(other);
        if inter.is_empty() {
            return 0.0;
        }
        let smaller = self.area().min(other.area()).max(1);
        inter.area() as f32 / smaller as f32
    }
}
