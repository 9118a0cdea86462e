use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

use super::vector::Vec3;

/// A point in 3D model space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3d {
    pub const ORIGIN: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Self) -> f64 {
        self.distance_squared_to(other).sqrt()
    }

    pub fn distance_squared_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn midpoint(&self, other: &Self) -> Self {
        self.lerp(other, 0.5)
    }

    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        Self {
            x: self.x + t * (other.x - self.x),
            y: self.y + t * (other.y - self.y),
            z: self.z + t * (other.z - self.z),
        }
    }

    pub fn to_vec3(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl Add<Vec3> for Point3d {
    type Output = Point3d;
    fn add(self, rhs: Vec3) -> Self::Output {
        Point3d::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3d {
    type Output = Vec3;
    fn sub(self, rhs: Self) -> Self::Output {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Sub<Vec3> for Point3d {
    type Output = Point3d;
    fn sub(self, rhs: Vec3) -> Self::Output {
        Point3d::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// A point (or displacement) in a surface's (u, v) parameter plane.
///
/// Trim curves, loops and the loop Boolean all live in this space, so the
/// type doubles as a 2D vector: `cross` and `dot` treat it as one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2d {
    pub x: f64,
    pub y: f64,
}

impl Point2d {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        Self {
            x: self.x + t * (other.x - self.x),
            y: self.y + t * (other.y - self.y),
        }
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z-component of the 3D cross product.
    pub fn cross(&self, other: &Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }
}

impl Add for Point2d {
    type Output = Point2d;
    fn add(self, rhs: Self) -> Self::Output {
        Point2d::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2d {
    type Output = Point2d;
    fn sub(self, rhs: Self) -> Self::Output {
        Point2d::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point2d {
    type Output = Point2d;
    fn mul(self, rhs: f64) -> Self::Output {
        Point2d::new(self.x * rhs, self.y * rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point3d::new(1.0, 0.0, 0.0);
        let b = Point3d::new(4.0, 0.0, 0.0);
        assert!((a.distance_to(&b) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_point_sub_gives_vector() {
        let v = Point3d::new(3.0, 4.0, 5.0) - Point3d::new(1.0, 1.0, 1.0);
        assert!((v.x - 2.0).abs() < 1e-12);
        assert!((v.y - 3.0).abs() < 1e-12);
        assert!((v.z - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_uv_cross_sign() {
        let a = Point2d::new(1.0, 0.0);
        let b = Point2d::new(0.0, 1.0);
        assert!(a.cross(&b) > 0.0, "x cross y should be positive (counter-clockwise)");
        assert!(b.cross(&a) < 0.0);
    }

    #[test]
    fn test_uv_lerp() {
        let m = Point2d::new(0.0, 2.0).lerp(&Point2d::new(4.0, 2.0), 0.25);
        assert!((m.x - 1.0).abs() < 1e-12);
        assert!((m.y - 2.0).abs() < 1e-12);
    }
}
