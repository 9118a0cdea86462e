use std::f64::consts::{FRAC_PI_2, TAU};

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use super::curves::{Circle3d, Curve2d, Curve3d, Line3d};
use super::nurbs::{NurbsCurve, NurbsSurface};
use super::point::{Point2d, Point3d};
use super::vector::Vec3;

/// Surface kinds a trimmed face can reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Surface {
    Plane(Plane),
    Sphere(Sphere),
    Nurbs(NurbsSurface),
}

/// An infinite plane with an orthonormal (u, v) frame; `u_axis × v_axis = normal`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub origin: Point3d,
    pub normal: Vec3,
    pub u_axis: Vec3,
    pub v_axis: Vec3,
}

impl Plane {
    /// The plane `{p : p·normal = offset}` with its frame derived only from
    /// `normal`, so two coplanar, co-oriented planes share one parametrisation.
    pub fn canonical(normal: Vec3, offset: f64) -> Self {
        let normal = normal.normalized().unwrap_or(Vec3::Z);
        let u_axis = normal.any_perpendicular();
        let v_axis = normal.cross(&u_axis);
        Self {
            origin: Point3d::ORIGIN + normal * offset,
            normal,
            u_axis,
            v_axis,
        }
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        self.origin + self.u_axis * u + self.v_axis * v
    }

    pub fn signed_distance(&self, p: &Point3d) -> f64 {
        (*p - self.origin).dot(&self.normal)
    }

    pub fn parameters_of(&self, p: &Point3d) -> Point2d {
        let d = *p - self.origin;
        Point2d::new(d.dot(&self.u_axis), d.dot(&self.v_axis))
    }
}

/// A sphere parametrised by longitude `u ∈ [0, 2π]` about +z and latitude
/// `v ∈ [-π/2, π/2]`; the surface normal points outward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Point3d,
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: Point3d, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        let cos_v = v.cos();
        Point3d::new(
            self.center.x + self.radius * cos_v * u.cos(),
            self.center.y + self.radius * cos_v * u.sin(),
            self.center.z + self.radius * v.sin(),
        )
    }

    /// Longitude in `[0, 2π)`, latitude in `[-π/2, π/2]`.
    pub fn parameters_of(&self, p: &Point3d) -> Point2d {
        let d = *p - self.center;
        let len = d.length();
        if len < 1e-300 {
            return Point2d::ORIGIN;
        }
        let mut u = d.y.atan2(d.x);
        if u < 0.0 {
            u += TAU;
        }
        if u >= TAU {
            u -= TAU;
        }
        let v = (d.z / len).clamp(-1.0, 1.0).asin();
        Point2d::new(u, v)
    }
}

impl Surface {
    pub fn evaluate(&self, uv: Point2d) -> Point3d {
        match self {
            Surface::Plane(p) => p.evaluate(uv.x, uv.y),
            Surface::Sphere(s) => s.evaluate(uv.x, uv.y),
            Surface::Nurbs(n) => n.evaluate(uv.x, uv.y),
        }
    }

    /// `S_u × S_v`, the unnormalised normal; its length is the area element.
    pub fn area_element(&self, uv: Point2d) -> Vec3 {
        match self {
            Surface::Plane(p) => p.normal,
            Surface::Sphere(s) => {
                let radial = s.evaluate(uv.x, uv.y) - s.center;
                radial * (s.radius * uv.y.cos())
            }
            Surface::Nurbs(n) => {
                let (su, sv) = n.derivatives(uv.x, uv.y);
                su.cross(&sv)
            }
        }
    }

    pub fn normal_at(&self, uv: Point2d) -> Vec3 {
        match self {
            Surface::Plane(p) => p.normal,
            Surface::Sphere(s) => (s.evaluate(uv.x, uv.y) - s.center)
                .normalized()
                .unwrap_or(Vec3::Z),
            Surface::Nurbs(n) => n.normal(uv.x, uv.y),
        }
    }

    /// Parameters of the surface point closest to `p`.
    pub fn closest_parameters(&self, p: &Point3d) -> Point2d {
        match self {
            Surface::Plane(plane) => plane.parameters_of(p),
            Surface::Sphere(s) => s.parameters_of(p),
            Surface::Nurbs(n) => invert_nurbs(n, p),
        }
    }

    /// The parameter image of `uv` closest to `near`. Sphere longitudes are
    /// taken modulo 2π and follow `near` at the poles.
    pub fn align_parameters(&self, uv: Point2d, near: Point2d) -> Point2d {
        match self {
            Surface::Sphere(_) if uv.y.cos().abs() < 1e-9 => Point2d::new(near.x, uv.y),
            Surface::Sphere(_) => {
                let turns = ((near.x - uv.x) / TAU).round();
                Point2d::new(uv.x + turns * TAU, uv.y)
            }
            Surface::Plane(_) | Surface::Nurbs(_) => uv,
        }
    }

    /// Whether two surfaces are the same point set with the same
    /// parametrisation, so trims of one are valid trims of the other.
    pub fn same_parametrisation(&self, other: &Surface, tol: f64) -> bool {
        let close = |a: Vec3, b: Vec3| (a - b).length() < tol;
        match (self, other) {
            (Surface::Plane(a), Surface::Plane(b)) => {
                a.origin.distance_to(&b.origin) < tol
                    && close(a.normal, b.normal)
                    && close(a.u_axis, b.u_axis)
                    && close(a.v_axis, b.v_axis)
            }
            (Surface::Sphere(a), Surface::Sphere(b)) => {
                a.center.distance_to(&b.center) < tol && (a.radius - b.radius).abs() < tol
            }
            (Surface::Nurbs(a), Surface::Nurbs(b)) => a == b,
            _ => false,
        }
    }

    /// Model-space image of a trim curve. Exact where the image is a line or
    /// a circle, otherwise a polyline through `samples + 1` surface points.
    pub fn lift(&self, curve: &Curve2d, samples: usize) -> Curve3d {
        match (self, curve) {
            (Surface::Plane(p), Curve2d::Line(l)) => Curve3d::Line(Line3d::new(
                p.evaluate(l.start.x, l.start.y),
                p.evaluate(l.end.x, l.end.y),
            )),
            (Surface::Plane(p), Curve2d::Nurbs(n)) => Curve3d::Nurbs(NurbsCurve {
                degree: n.degree,
                control_points: n.control_points.iter().map(|c| p.evaluate(c.x, c.y)).collect(),
                weights: n.weights.clone(),
                knots: n.knots.clone(),
            }),
            (Surface::Sphere(s), Curve2d::Line(l)) => {
                lift_sphere_line(s, l.start, l.end).unwrap_or_else(|| self.lift_sampled(curve, samples))
            }
            _ => self.lift_sampled(curve, samples),
        }
    }

    fn lift_sampled(&self, curve: &Curve2d, samples: usize) -> Curve3d {
        let (t0, t1) = curve.domain();
        let n = samples.max(2);
        let params: Vec<f64> = (0..=n).map(|i| t0 + (t1 - t0) * i as f64 / n as f64).collect();
        let points: Vec<Point3d> = params.iter().map(|&t| self.evaluate(curve.point_at(t))).collect();
        match NurbsCurve::polyline(points.clone(), params) {
            Ok(c) => Curve3d::Nurbs(c),
            Err(_) => Curve3d::Line(Line3d::new(points[0], points[points.len() - 1])),
        }
    }

    pub fn surface_type_name(&self) -> &'static str {
        match self {
            Surface::Plane(_) => "Plane",
            Surface::Sphere(_) => "Sphere",
            Surface::Nurbs(_) => "Nurbs",
        }
    }
}

/// Meridians and parallels of a sphere are circular arcs.
fn lift_sphere_line(s: &Sphere, a: Point2d, b: Point2d) -> Option<Curve3d> {
    if (a.x - b.x).abs() < 1e-12 {
        let x_axis = Vec3::new(a.x.cos(), a.x.sin(), 0.0);
        let n = x_axis.cross(&Vec3::Z);
        let (normal, start_angle, end_angle) = if a.y <= b.y { (n, a.y, b.y) } else { (-n, -a.y, -b.y) };
        return Some(Curve3d::Circle(Circle3d {
            center: s.center,
            normal,
            x_axis,
            radius: s.radius,
            start_angle,
            end_angle,
        }));
    }
    if (a.y - b.y).abs() < 1e-12 {
        let radius = s.radius * a.y.cos();
        if radius.abs() < 1e-12 || a.y.abs() > FRAC_PI_2 {
            return None;
        }
        let center = s.center + Vec3::Z * (s.radius * a.y.sin());
        let (normal, start_angle, end_angle) = if a.x <= b.x { (Vec3::Z, a.x, b.x) } else { (-Vec3::Z, -a.x, -b.x) };
        return Some(Curve3d::Circle(Circle3d {
            center,
            normal,
            x_axis: Vec3::X,
            radius,
            start_angle,
            end_angle,
        }));
    }
    None
}

/// Closest-point inversion: coarse grid seed, then Gauss-Newton on
/// `|S(u, v) - p|²` clamped to the domain.
fn invert_nurbs(n: &NurbsSurface, p: &Point3d) -> Point2d {
    const GRID: usize = 16;
    let (u0, u1) = n.domain_u();
    let (v0, v1) = n.domain_v();

    let mut best = (u0, v0);
    let mut best_d = f64::INFINITY;
    for i in 0..=GRID {
        for j in 0..=GRID {
            let u = u0 + (u1 - u0) * i as f64 / GRID as f64;
            let v = v0 + (v1 - v0) * j as f64 / GRID as f64;
            let d = n.evaluate(u, v).distance_squared_to(p);
            if d < best_d {
                best_d = d;
                best = (u, v);
            }
        }
    }

    let (mut u, mut v) = best;
    for _ in 0..32 {
        let r = n.evaluate(u, v) - *p;
        let (su, sv) = n.derivatives(u, v);
        let jtj = Matrix2::new(su.dot(&su), su.dot(&sv), su.dot(&sv), sv.dot(&sv));
        let jtr = Vector2::new(su.dot(&r), sv.dot(&r));
        let Some(step) = jtj.lu().solve(&jtr) else {
            break;
        };
        u = (u - step.x).clamp(u0, u1);
        v = (v - step.y).clamp(v0, v1);
        if step.norm() < 1e-14 {
            break;
        }
    }
    Point2d::new(u, v)
}
