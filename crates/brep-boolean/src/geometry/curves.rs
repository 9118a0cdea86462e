use serde::{Deserialize, Serialize};

use crate::error::BooleanError;

use super::bounds::BoundingBox2d;
use super::nurbs::{NurbsCurve2d, NurbsCurve3d};
use super::point::{Point2d, Point3d};
use super::vector::Vec3;

// ─── Parameter-space curves ─────────────────────────────────────────────────

/// A bounded straight segment in the (u, v) plane, reaching `start` at `t0`
/// and `end` at `t1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line2d {
    pub start: Point2d,
    pub end: Point2d,
    pub t0: f64,
    pub t1: f64,
}

impl Line2d {
    pub fn new(start: Point2d, end: Point2d) -> Self {
        Self::with_domain(start, end, 0.0, 1.0)
    }

    pub fn with_domain(start: Point2d, end: Point2d, t0: f64, t1: f64) -> Self {
        Self { start, end, t0, t1 }
    }

    pub fn point_at(&self, t: f64) -> Point2d {
        let span = self.t1 - self.t0;
        if span.abs() < 1e-300 {
            return self.start;
        }
        self.start.lerp(&self.end, (t - self.t0) / span)
    }

    /// Parameter of the orthogonal projection of `p`, unclamped.
    pub fn param_of(&self, p: &Point2d) -> f64 {
        let d = self.end - self.start;
        let len2 = d.dot(&d);
        if len2 < 1e-300 {
            return self.t0;
        }
        self.t0 + (*p - self.start).dot(&d) / len2 * (self.t1 - self.t0)
    }
}

/// A trim curve: lives in one surface's parameter plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Curve2d {
    Line(Line2d),
    Nurbs(NurbsCurve2d),
}

impl Curve2d {
    pub fn line(start: Point2d, end: Point2d) -> Self {
        Curve2d::Line(Line2d::new(start, end))
    }

    pub fn domain(&self) -> (f64, f64) {
        match self {
            Curve2d::Line(l) => (l.t0, l.t1),
            Curve2d::Nurbs(n) => n.domain(),
        }
    }

    pub fn point_at(&self, t: f64) -> Point2d {
        match self {
            Curve2d::Line(l) => l.point_at(t),
            Curve2d::Nurbs(n) => n.evaluate(t),
        }
    }

    pub fn start(&self) -> Point2d {
        self.point_at(self.domain().0)
    }

    pub fn end(&self) -> Point2d {
        self.point_at(self.domain().1)
    }

    pub fn midpoint(&self) -> Point2d {
        let (t0, t1) = self.domain();
        self.point_at(0.5 * (t0 + t1))
    }

    pub fn tangent_at(&self, t: f64) -> Point2d {
        match self {
            Curve2d::Line(l) => {
                let span = l.t1 - l.t0;
                if span.abs() < 1e-300 {
                    Point2d::ORIGIN
                } else {
                    (l.end - l.start) * (1.0 / span)
                }
            }
            Curve2d::Nurbs(n) => {
                let d = n.derivative(t);
                Point2d::new(d[0], d[1])
            }
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self, Curve2d::Line(_))
    }

    pub fn reversed(&self) -> Self {
        match self {
            Curve2d::Line(l) => Curve2d::Line(Line2d::with_domain(l.end, l.start, l.t0, l.t1)),
            Curve2d::Nurbs(n) => Curve2d::Nurbs(n.reversed()),
        }
    }

    /// The part of the curve over `[t0, t1]`; empty or out-of-domain
    /// intervals are rejected with `InvalidInterval`.
    pub fn sub_curve(&self, t0: f64, t1: f64) -> Result<Self, BooleanError> {
        match self {
            Curve2d::Line(l) => {
                let slack = 1e-12 * (l.t1 - l.t0).abs().max(1.0);
                if !(t1 > t0) || t0 < l.t0 - slack || t1 > l.t1 + slack {
                    return Err(BooleanError::InvalidInterval { start: t0, end: t1 });
                }
                Ok(Curve2d::Line(Line2d::with_domain(l.point_at(t0), l.point_at(t1), t0, t1)))
            }
            Curve2d::Nurbs(n) => n.sub_curve(t0, t1).map(Curve2d::Nurbs),
        }
    }

    /// The same curve with its end points moved where given.
    pub fn with_ends(mut self, start: Option<Point2d>, end: Option<Point2d>) -> Self {
        match &mut self {
            Curve2d::Line(l) => {
                if let Some(p) = start {
                    l.start = p;
                }
                if let Some(p) = end {
                    l.end = p;
                }
            }
            Curve2d::Nurbs(n) => n.move_ends(start, end),
        }
        self
    }

    /// `(param, point)` pairs that resolve the curve shape: segment ends for
    /// lines, every knot for polylines, `samples` uniform steps plus knots
    /// for higher degree curves.
    pub fn flatten(&self, samples: usize) -> Vec<(f64, Point2d)> {
        let (t0, t1) = self.domain();
        let mut params = match self {
            Curve2d::Line(_) => vec![t0, t1],
            Curve2d::Nurbs(n) if n.degree == 1 => {
                let mut p = vec![t0];
                p.extend(n.interior_knots());
                p.push(t1);
                p
            }
            Curve2d::Nurbs(n) => {
                let steps = samples.max(2);
                let mut p: Vec<f64> = (0..=steps)
                    .map(|i| t0 + (t1 - t0) * i as f64 / steps as f64)
                    .collect();
                p.extend(n.interior_knots());
                p.sort_by(f64::total_cmp);
                p.dedup_by(|a, b| (*a - *b).abs() < 1e-14);
                p
            }
        };
        params.dedup();
        params.into_iter().map(|t| (t, self.point_at(t))).collect()
    }

    pub fn bounding_box(&self, samples: usize) -> BoundingBox2d {
        let pts: Vec<Point2d> = self.flatten(samples).into_iter().map(|(_, p)| p).collect();
        BoundingBox2d::from_points(&pts)
    }

    pub fn approximate_length(&self, samples: usize) -> f64 {
        self.flatten(samples)
            .windows(2)
            .map(|w| w[0].1.distance_to(&w[1].1))
            .sum()
    }
}

// ─── Model-space curves ─────────────────────────────────────────────────────

/// A straight segment from `start` (t = 0) to `end` (t = 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line3d {
    pub start: Point3d,
    pub end: Point3d,
}

impl Line3d {
    pub fn new(start: Point3d, end: Point3d) -> Self {
        Self { start, end }
    }

    pub fn direction(&self) -> Vec3 {
        self.end - self.start
    }

    pub fn point_at(&self, t: f64) -> Point3d {
        self.start.lerp(&self.end, t)
    }
}

/// A circular arc swept counter-clockwise about `normal` from `start_angle`
/// to `end_angle`; the parameter is the angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle3d {
    pub center: Point3d,
    pub normal: Vec3,
    pub x_axis: Vec3,
    pub radius: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

impl Circle3d {
    pub fn full(center: Point3d, normal: Vec3, radius: f64) -> Self {
        let normal = normal.normalized().unwrap_or(Vec3::Z);
        Self {
            center,
            normal,
            x_axis: normal.any_perpendicular(),
            radius,
            start_angle: 0.0,
            end_angle: std::f64::consts::TAU,
        }
    }

    pub fn point_at(&self, angle: f64) -> Point3d {
        let y_axis = self.normal.cross(&self.x_axis);
        self.center + self.x_axis * (self.radius * angle.cos()) + y_axis * (self.radius * angle.sin())
    }
}

/// An edge curve in model space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Curve3d {
    Line(Line3d),
    Circle(Circle3d),
    Nurbs(NurbsCurve3d),
}

impl Curve3d {
    pub fn domain(&self) -> (f64, f64) {
        match self {
            Curve3d::Line(_) => (0.0, 1.0),
            Curve3d::Circle(c) => (c.start_angle, c.end_angle),
            Curve3d::Nurbs(n) => n.domain(),
        }
    }

    pub fn point_at(&self, t: f64) -> Point3d {
        match self {
            Curve3d::Line(l) => l.point_at(t),
            Curve3d::Circle(c) => c.point_at(t),
            Curve3d::Nurbs(n) => n.evaluate(t),
        }
    }

    pub fn start(&self) -> Point3d {
        self.point_at(self.domain().0)
    }

    pub fn end(&self) -> Point3d {
        self.point_at(self.domain().1)
    }

    /// `samples + 1` evenly spaced points including both ends.
    pub fn sample(&self, samples: usize) -> Vec<Point3d> {
        let (t0, t1) = self.domain();
        let n = samples.max(1);
        (0..=n)
            .map(|i| self.point_at(t0 + (t1 - t0) * i as f64 / n as f64))
            .collect()
    }

    pub fn approximate_length(&self, samples: usize) -> f64 {
        self.sample(samples)
            .windows(2)
            .map(|w| w[0].distance_to(&w[1]))
            .sum()
    }

    pub fn curve_type_name(&self) -> &'static str {
        match self {
            Curve3d::Line(_) => "Line",
            Curve3d::Circle(_) => "Circle",
            Curve3d::Nurbs(_) => "Nurbs",
        }
    }
}
