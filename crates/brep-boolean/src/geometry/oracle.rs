//! The geometry oracle: every primitive intersection the Boolean engine needs,
//! behind one trait so a different NURBS library can be plugged in.

use super::bounds::BoundingBox;
use super::curves::{Curve2d, Curve3d};
use super::intersection;
use super::point::{Point2d, Point3d};
use super::surface_intersection;
use super::surfaces::Surface;
use crate::config::BooleanConfig;

/// An intersection between two parameter-space curves.
#[derive(Debug, Clone, PartialEq)]
pub enum CurveEvent {
    Transverse { t_a: f64, t_b: f64, point: Point2d },
    Tangent { t_a: f64, t_b: f64, point: Point2d },
    /// The curves coincide over `a` on the first curve and `b` on the
    /// second; both ranges are increasing.
    Overlap { a: (f64, f64), b: (f64, f64) },
}

/// An intersection between a model-space curve and a surface.
#[derive(Debug, Clone, PartialEq)]
pub enum CurveSurfaceEvent {
    Transverse { t: f64, uv: Point2d, point: Point3d },
    Tangent { t: f64, uv: Point2d, point: Point3d },
    Overlap { t: (f64, f64) },
}

/// One branch of a surface/surface intersection. `uv_a` and `uv_b` share
/// the parameter domain of `curve`.
#[derive(Debug, Clone, PartialEq)]
pub struct SsiCurve {
    pub curve: Curve3d,
    pub uv_a: Curve2d,
    pub uv_b: Curve2d,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Transverse(SsiCurve),
    Tangent { point: Point3d, uv_a: Point2d, uv_b: Point2d },
    /// The surfaces coincide; no curve is produced.
    Overlap,
}

pub trait GeometryOracle {
    fn point_point(&self, a: &Point3d, b: &Point3d, tol: f64) -> bool;

    /// Parameter on `curve` of a point within `tol` of `p`.
    fn point_curve(&self, p: &Point2d, curve: &Curve2d, tol: f64) -> Option<f64>;

    /// Surface parameters of `p` when it lies within `tol` of the surface.
    fn point_surface(&self, p: &Point3d, surface: &Surface, tol: f64) -> Option<Point2d>;

    fn curve_curve(&self, a: &Curve2d, b: &Curve2d, tol: f64) -> Vec<CurveEvent>;

    fn curve_surface(&self, curve: &Curve3d, surface: &Surface, tol: f64) -> Vec<CurveSurfaceEvent>;

    /// Intersection branches inside `region`; unbounded branches are clipped to it.
    fn surface_surface(
        &self,
        a: &Surface,
        b: &Surface,
        region: &BoundingBox,
        tol: f64,
    ) -> Vec<SurfaceEvent>;
}

/// Default oracle: closed forms for lines, planes and spheres, sampling plus
/// Newton refinement for NURBS.
#[derive(Debug, Clone, Copy)]
pub struct NumericOracle {
    pub flatten_samples: usize,
    pub ssi_samples: usize,
}

impl Default for NumericOracle {
    fn default() -> Self {
        Self::from_config(&BooleanConfig::default())
    }
}

impl NumericOracle {
    pub fn from_config(config: &BooleanConfig) -> Self {
        Self {
            flatten_samples: config.flatten_samples,
            ssi_samples: config.ssi_samples,
        }
    }
}

impl GeometryOracle for NumericOracle {
    fn point_point(&self, a: &Point3d, b: &Point3d, tol: f64) -> bool {
        a.distance_to(b) <= tol
    }

    fn point_curve(&self, p: &Point2d, curve: &Curve2d, tol: f64) -> Option<f64> {
        intersection::point_curve(p, curve, tol, self.flatten_samples)
    }

    fn point_surface(&self, p: &Point3d, surface: &Surface, tol: f64) -> Option<Point2d> {
        let uv = surface.closest_parameters(p);
        (surface.evaluate(uv).distance_to(p) <= tol).then_some(uv)
    }

    fn curve_curve(&self, a: &Curve2d, b: &Curve2d, tol: f64) -> Vec<CurveEvent> {
        intersection::curve_curve(a, b, tol, self.flatten_samples)
    }

    fn curve_surface(&self, curve: &Curve3d, surface: &Surface, tol: f64) -> Vec<CurveSurfaceEvent> {
        intersection::curve_surface(curve, surface, tol, self.flatten_samples)
    }

    fn surface_surface(
        &self,
        a: &Surface,
        b: &Surface,
        region: &BoundingBox,
        tol: f64,
    ) -> Vec<SurfaceEvent> {
        surface_intersection::surface_surface(a, b, region, tol, self.ssi_samples)
    }
}
