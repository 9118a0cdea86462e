use serde::{Deserialize, Serialize};

use super::point::{Point2d, Point3d};

/// Axis-aligned bounding box in model space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3d,
    pub max: Point3d,
}

impl BoundingBox {
    pub fn new(min: Point3d, max: Point3d) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Point3d::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3d::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn from_points(points: &[Point3d]) -> Self {
        let mut bb = Self::empty();
        for p in points {
            bb.expand_to_include(p);
        }
        bb
    }

    pub fn expand_to_include(&mut self, p: &Point3d) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        out.expand_to_include(&other.min);
        out.expand_to_include(&other.max);
        out
    }

    /// Overlap test with the boxes grown by `tol`; touching boxes intersect.
    pub fn intersects(&self, other: &Self, tol: f64) -> bool {
        self.min.x <= other.max.x + tol
            && self.max.x >= other.min.x - tol
            && self.min.y <= other.max.y + tol
            && self.max.y >= other.min.y - tol
            && self.min.z <= other.max.z + tol
            && self.max.z >= other.min.z - tol
    }

    pub fn contains_point(&self, p: &Point3d, tol: f64) -> bool {
        p.x >= self.min.x - tol
            && p.x <= self.max.x + tol
            && p.y >= self.min.y - tol
            && p.y <= self.max.y + tol
            && p.z >= self.min.z - tol
            && p.z <= self.max.z + tol
    }

    /// The box grown by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min: Point3d::new(self.min.x - margin, self.min.y - margin, self.min.z - margin),
            max: Point3d::new(self.max.x + margin, self.max.y + margin, self.max.z + margin),
        }
    }

    /// Overlap of two boxes; invalid when they are disjoint.
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            min: Point3d::new(
                self.min.x.max(other.min.x),
                self.min.y.max(other.min.y),
                self.min.z.max(other.min.z),
            ),
            max: Point3d::new(
                self.max.x.min(other.max.x),
                self.max.y.min(other.max.y),
                self.max.z.min(other.max.z),
            ),
        }
    }

    pub fn center(&self) -> Point3d {
        self.min.midpoint(&self.max)
    }

    pub fn diagonal(&self) -> f64 {
        if self.is_valid() { self.min.distance_to(&self.max) } else { 0.0 }
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }
}

/// Axis-aligned box in a surface's parameter plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2d {
    pub min: Point2d,
    pub max: Point2d,
}

impl BoundingBox2d {
    pub fn empty() -> Self {
        Self {
            min: Point2d::new(f64::INFINITY, f64::INFINITY),
            max: Point2d::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn from_points(points: &[Point2d]) -> Self {
        let mut bb = Self::empty();
        for p in points {
            bb.expand_to_include(p);
        }
        bb
    }

    pub fn expand_to_include(&mut self, p: &Point2d) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        out.expand_to_include(&other.min);
        out.expand_to_include(&other.max);
        out
    }

    pub fn intersects(&self, other: &Self, tol: f64) -> bool {
        self.min.x <= other.max.x + tol
            && self.max.x >= other.min.x - tol
            && self.min.y <= other.max.y + tol
            && self.max.y >= other.min.y - tol
    }

    pub fn contains_point(&self, p: &Point2d, tol: f64) -> bool {
        p.x >= self.min.x - tol
            && p.x <= self.max.x + tol
            && p.y >= self.min.y - tol
            && p.y <= self.max.y + tol
    }

    pub fn diagonal(&self) -> f64 {
        if self.min.x <= self.max.x && self.min.y <= self.max.y {
            self.min.distance_to(&self.max)
        } else {
            0.0
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
}
