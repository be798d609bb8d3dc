/// Core geometry types for the relief pipeline.
///
/// Swiss-cheese layer: **Geometry representation**
/// Points, boxes, polylines and the handful of 2-D predicates the height-map
/// builders need (same-side, plane equation, line intersection).
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Tolerance used for "is this coefficient zero" decisions.
pub const EPSILON: f64 = 1e-6;

pub fn is_zero(v: f64) -> bool {
    v.abs() < EPSILON
}

/// Round to `digits` decimal places.
pub fn round_to(v: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (v * scale).round() / scale
}

// ── 3-D ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
    pub fn lerp(a: Self, b: Self, t: f64) -> Self {
        Self {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
            z: a.z + (b.z - a.z) * t,
        }
    }
    /// Component-wise product.
    pub fn scale(self, s: Vec3) -> Self {
        Self::new(self.x * s.x, self.y * s.y, self.z * s.z)
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

/// A triangle resolved from mesh vertex indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
}

impl Triangle {
    pub fn vertices(&self) -> [Vec3; 3] {
        [self.v0, self.v1, self.v2]
    }
    pub fn bounds(&self) -> BoundingBox {
        let mut b = BoundingBox::empty();
        for v in self.vertices() {
            b.extend(v);
        }
        b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// An inverted box that any point will grow.
    pub fn empty() -> Self {
        Self {
            min: Vec3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Vec3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    pub fn from_points(pts: &[Vec3]) -> Option<Self> {
        if pts.is_empty() {
            return None;
        }
        let mut b = Self::empty();
        for p in pts {
            b.extend(*p);
        }
        Some(b)
    }

    pub fn extend(&mut self, v: Vec3) {
        self.min.x = self.min.x.min(v.x);
        self.min.y = self.min.y.min(v.y);
        self.min.z = self.min.z.min(v.z);
        self.max.x = self.max.x.max(v.x);
        self.max.y = self.max.y.max(v.y);
        self.max.z = self.max.z.max(v.z);
    }

    pub fn length(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        Vec3::lerp(self.min, self.max, 0.5)
    }
}

/// Plane through three points, `a·x + b·y + c·z + d = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneEquation {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl PlaneEquation {
    pub fn through(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        let a = (v1.y - v0.y) * (v2.z - v0.z) - (v1.z - v0.z) * (v2.y - v0.y);
        let b = (v1.z - v0.z) * (v2.x - v0.x) - (v1.x - v0.x) * (v2.z - v0.z);
        let c = (v1.x - v0.x) * (v2.y - v0.y) - (v1.y - v0.y) * (v2.x - v0.x);
        let d = -(a * v0.x + b * v0.y + c * v0.z);
        Self { a, b, c, d }
    }

    /// Height of the plane above `(x, y)`, or `None` for a vertical plane.
    pub fn z_at(&self, x: f64, y: f64) -> Option<f64> {
        if is_zero(self.c) {
            return None;
        }
        Some(-(self.a * x + self.b * y + self.d) / self.c)
    }

    /// Horizontal distance from `(x, y)` to the trace of a vertical plane.
    pub fn trace_distance(&self, x: f64, y: f64) -> f64 {
        let norm = (self.a * self.a + self.b * self.b).sqrt();
        if norm < f64::EPSILON {
            return f64::INFINITY;
        }
        (self.a * x + self.b * y + self.d).abs() / norm
    }
}

// ── 2-D ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
    pub fn dist(a: Self, b: Self) -> f64 {
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
    }
    pub fn cross(self, o: Self) -> f64 {
        self.x * o.y - self.y * o.x
    }
    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x + o.x, self.y + o.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x - o.x, self.y - o.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, s: f64) -> Vec2 {
        Vec2::new(self.x * s, self.y * s)
    }
}

/// True when `p` and `q` lie on the same side of line `a`–`b` (or on it).
pub fn same_side(a: Vec2, b: Vec2, p: Vec2, q: Vec2) -> bool {
    let edge = b - a;
    edge.cross(p - a) * edge.cross(q - a) >= 0.0
}

/// Point-in-triangle by same-side tests against all three edges.
pub fn point_in_triangle(v0: Vec2, v1: Vec2, v2: Vec2, p: Vec2) -> bool {
    same_side(v0, v1, p, v2) && same_side(v1, v2, p, v0) && same_side(v2, v0, p, v1)
}

/// Intersect segment `a`–`b` with the infinite line through `p`–`q`.
///
/// Returns `None` for parallel lines or when the hit falls outside the segment.
pub fn segment_line_intersection(a: Vec2, b: Vec2, p: Vec2, q: Vec2) -> Option<Vec2> {
    let r = b - a;
    let s = q - p;
    let denom = r.cross(s);
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let t = (p - a).cross(s) / denom;
    if !(-EPSILON..=1.0 + EPSILON).contains(&t) {
        return None;
    }
    Some(a + r * t)
}

/// Distance along the ray from the origin at `angle` (measured from +Y towards
/// +X) to the line through `a`–`b`.
pub fn ray_line_distance(angle: f64, a: Vec2, b: Vec2) -> Option<f64> {
    let dir = Vec2::new(angle.sin(), angle.cos());
    let edge = b - a;
    let denom = dir.cross(edge);
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let s = a.cross(edge) / denom;
    (s >= 0.0).then_some(s)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox2 {
    pub min: Vec2,
    pub max: Vec2,
}

impl BoundingBox2 {
    pub fn from_points(pts: &[Vec2]) -> Option<Self> {
        if pts.is_empty() {
            return None;
        }
        let mut min = Vec2::new(f64::MAX, f64::MAX);
        let mut max = Vec2::new(f64::MIN, f64::MIN);
        for p in pts {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Some(Self { min, max })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polyline {
    pub points: Vec<Vec2>,
    pub closed: bool,
}

impl Polyline {
    pub fn new(points: Vec<Vec2>, closed: bool) -> Self {
        Self { points, closed }
    }

    pub fn bounds(&self) -> Option<BoundingBox2> {
        BoundingBox2::from_points(&self.points)
    }

    /// Consecutive point pairs (closed polylines repeat their first point).
    pub fn edges(&self) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }
}

// ── Segment (used by slicer) ─────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Segment2 {
    pub a: Vec2,
    pub b: Vec2,
}

impl Segment2 {
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self { a, b }
    }
}
