use serde::{Deserialize, Serialize};

use crate::error::BooleanError;

use super::point::{Point2d, Point3d};
use super::vector::Vec3;

/// Coordinates a control point can be lifted to for homogeneous arithmetic.
/// 2D points use a zero z-coordinate.
pub trait ControlPoint: Copy + std::fmt::Debug {
    fn to_xyz(&self) -> [f64; 3];
    fn from_xyz(xyz: [f64; 3]) -> Self;
}

impl ControlPoint for Point2d {
    fn to_xyz(&self) -> [f64; 3] {
        [self.x, self.y, 0.0]
    }
    fn from_xyz(xyz: [f64; 3]) -> Self {
        Point2d::new(xyz[0], xyz[1])
    }
}

impl ControlPoint for Point3d {
    fn to_xyz(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
    fn from_xyz(xyz: [f64; 3]) -> Self {
        Point3d::new(xyz[0], xyz[1], xyz[2])
    }
}

/// A rational B-spline curve over 2D or 3D control points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NurbsCurve<P> {
    pub degree: usize,
    pub control_points: Vec<P>,
    /// Empty for non-rational curves.
    pub weights: Vec<f64>,
    pub knots: Vec<f64>,
}

/// Trim curves in a surface's parameter plane.
pub type NurbsCurve2d = NurbsCurve<Point2d>;
/// Edge curves in model space.
pub type NurbsCurve3d = NurbsCurve<Point3d>;

impl<P: ControlPoint> NurbsCurve<P> {
    pub fn new(
        degree: usize,
        control_points: Vec<P>,
        weights: Vec<f64>,
        knots: Vec<f64>,
    ) -> Result<Self, BooleanError> {
        if control_points.len() <= degree {
            return Err(BooleanError::InvalidGeometry(format!(
                "degree {} curve needs more than {} control points",
                degree,
                control_points.len()
            )));
        }
        if knots.len() != control_points.len() + degree + 1 {
            return Err(BooleanError::InvalidGeometry(
                "knot vector length must be n + p + 1".into(),
            ));
        }
        if !weights.is_empty() && weights.len() != control_points.len() {
            return Err(BooleanError::InvalidGeometry(
                "weights must be empty or match the control points".into(),
            ));
        }
        if knots.windows(2).any(|w| w[1] < w[0]) {
            return Err(BooleanError::InvalidGeometry("knots must be non-decreasing".into()));
        }
        Ok(Self {
            degree,
            control_points,
            weights,
            knots,
        })
    }

    /// Degree-1 curve through `points`, reaching `points[i]` at `params[i]`.
    pub fn polyline(points: Vec<P>, params: Vec<f64>) -> Result<Self, BooleanError> {
        if points.len() < 2 || points.len() != params.len() {
            return Err(BooleanError::InvalidGeometry(
                "polyline needs at least two points with one parameter each".into(),
            ));
        }
        if params.windows(2).any(|w| w[1] <= w[0]) {
            return Err(BooleanError::InvalidGeometry(
                "polyline parameters must be strictly increasing".into(),
            ));
        }
        let mut knots = Vec::with_capacity(params.len() + 2);
        knots.push(params[0]);
        knots.extend_from_slice(&params);
        knots.push(params[params.len() - 1]);
        Self::new(1, points, Vec::new(), knots)
    }

    fn weight(&self, i: usize) -> f64 {
        if self.weights.is_empty() { 1.0 } else { self.weights[i] }
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.knots[self.degree], self.knots[self.knots.len() - self.degree - 1])
    }

    pub fn evaluate(&self, t: f64) -> P {
        let n = self.control_points.len();
        let span = find_span(&self.knots, self.degree, n, t);
        let basis = basis_functions(&self.knots, span, t, self.degree);

        let mut acc = [0.0; 3];
        let mut w_sum = 0.0;
        for (i, b) in basis.iter().enumerate() {
            let idx = span - self.degree + i;
            let cp = self.control_points[idx].to_xyz();
            let bw = b * self.weight(idx);
            acc[0] += cp[0] * bw;
            acc[1] += cp[1] * bw;
            acc[2] += cp[2] * bw;
            w_sum += bw;
        }
        P::from_xyz([acc[0] / w_sum, acc[1] / w_sum, acc[2] / w_sum])
    }

    /// First derivative by central differences, clamped to the domain.
    pub fn derivative(&self, t: f64) -> [f64; 3] {
        let (lo, hi) = self.domain();
        let h = 1e-7 * (hi - lo).max(1.0);
        let t0 = (t - h).max(lo);
        let t1 = (t + h).min(hi);
        if t1 - t0 < 1e-15 {
            return [0.0; 3];
        }
        let a = self.evaluate(t0).to_xyz();
        let b = self.evaluate(t1).to_xyz();
        let dt = t1 - t0;
        [(b[0] - a[0]) / dt, (b[1] - a[1]) / dt, (b[2] - a[2]) / dt]
    }

    /// Interior knot values, each listed once.
    pub fn interior_knots(&self) -> Vec<f64> {
        let (lo, hi) = self.domain();
        let mut out: Vec<f64> = Vec::new();
        for &k in &self.knots {
            if k > lo && k < hi && out.last().is_none_or(|&last| last < k) {
                out.push(k);
            }
        }
        out
    }

    /// Move the end points of the curve. An end moves only when the knot
    /// vector is clamped there, so that the control point is the curve point.
    pub fn move_ends(&mut self, start: Option<P>, end: Option<P>) {
        let p = self.degree;
        let k = &self.knots;
        let clamped_start = k[..=p].iter().all(|&x| x == k[0]);
        let clamped_end = k[k.len() - p - 1..].iter().all(|&x| x == k[k.len() - 1]);
        let last = self.control_points.len() - 1;
        if let (Some(s), true) = (start, clamped_start) {
            self.control_points[0] = s;
        }
        if let (Some(e), true) = (end, clamped_end) {
            self.control_points[last] = e;
        }
    }

    /// Same point set traversed backwards over the same domain.
    pub fn reversed(&self) -> Self {
        let (lo, hi) = self.domain();
        let knots = self.knots.iter().rev().map(|k| lo + hi - k).collect();
        let mut control_points = self.control_points.clone();
        control_points.reverse();
        let mut weights = self.weights.clone();
        weights.reverse();
        Self {
            degree: self.degree,
            control_points,
            weights,
            knots,
        }
    }

    /// Split at an interior parameter by knot insertion up to full multiplicity.
    pub fn split_at(&self, t: f64) -> Option<(Self, Self)> {
        let (lo, hi) = self.domain();
        if t <= lo || t >= hi {
            return None;
        }
        let p = self.degree;
        let mut knots = self.knots.clone();
        let mut hpts: Vec<[f64; 4]> = self
            .control_points
            .iter()
            .enumerate()
            .map(|(i, cp)| {
                let w = self.weight(i);
                let c = cp.to_xyz();
                [c[0] * w, c[1] * w, c[2] * w, w]
            })
            .collect();

        let existing = knots.iter().filter(|&&k| k == t).count();
        for _ in existing..=p {
            let (k2, h2) = insert_knot(&knots, &hpts, p, t);
            knots = k2;
            hpts = h2;
        }

        let first = knots.iter().position(|&k| k == t)?;
        let left_knots = knots[..first + p + 1].to_vec();
        let right_knots = knots[first..].to_vec();

        let rational = !self.weights.is_empty();
        let build = |pts: &[[f64; 4]], knots: Vec<f64>| -> Self {
            let control_points = pts
                .iter()
                .map(|h| P::from_xyz([h[0] / h[3], h[1] / h[3], h[2] / h[3]]))
                .collect();
            let weights = if rational { pts.iter().map(|h| h[3]).collect() } else { Vec::new() };
            Self {
                degree: p,
                control_points,
                weights,
                knots,
            }
        };

        Some((build(&hpts[..first], left_knots), build(&hpts[first..], right_knots)))
    }

    /// Extract the part of the curve over `[t0, t1]`.
    pub fn sub_curve(&self, t0: f64, t1: f64) -> Result<Self, BooleanError> {
        let (lo, hi) = self.domain();
        let slack = 1e-12 * (hi - lo).abs().max(1.0);
        if !(t1 > t0) || t0 < lo - slack || t1 > hi + slack {
            return Err(BooleanError::InvalidInterval { start: t0, end: t1 });
        }
        let mut curve = self.clone();
        if t0 > lo + slack {
            curve = curve.split_at(t0).map(|(_, right)| right).unwrap_or(curve);
        }
        if t1 < hi - slack {
            curve = curve.split_at(t1).map(|(left, _)| left).unwrap_or(curve);
        }
        Ok(curve)
    }
}

fn insert_knot(knots: &[f64], hpts: &[[f64; 4]], p: usize, t: f64) -> (Vec<f64>, Vec<[f64; 4]>) {
    let n = hpts.len();
    let k = find_span(knots, p, n, t);
    let mut out = Vec::with_capacity(n + 1);
    for i in 0..=n {
        if i + p <= k {
            out.push(hpts[i]);
        } else if i > k {
            out.push(hpts[i - 1]);
        } else {
            let denom = knots[i + p] - knots[i];
            let a = if denom.abs() < 1e-300 { 0.0 } else { (t - knots[i]) / denom };
            let (cur, prev) = (hpts[i], hpts[i - 1]);
            out.push([
                a * cur[0] + (1.0 - a) * prev[0],
                a * cur[1] + (1.0 - a) * prev[1],
                a * cur[2] + (1.0 - a) * prev[2],
                a * cur[3] + (1.0 - a) * prev[3],
            ]);
        }
    }
    let mut new_knots = knots.to_vec();
    new_knots.insert(k + 1, t);
    (new_knots, out)
}

/// Index `k` with `knots[k] <= t < knots[k + 1]`, clamped to the valid spans.
fn find_span(knots: &[f64], p: usize, num_ctrl: usize, t: f64) -> usize {
    let n = num_ctrl - 1;
    if t >= knots[n + 1] {
        return n;
    }
    if t <= knots[p] {
        return p;
    }
    let mut low = p;
    let mut high = n + 1;
    let mut mid = (low + high) / 2;
    while t < knots[mid] || t >= knots[mid + 1] {
        if t < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

fn basis_functions(knots: &[f64], span: usize, t: f64, p: usize) -> Vec<f64> {
    let mut n_vals = vec![0.0; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];

    n_vals[0] = 1.0;
    for j in 1..=p {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            let temp = n_vals[r] / (right[r + 1] + left[j - r]);
            n_vals[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n_vals[j] = saved;
    }
    n_vals
}

/// A tensor-product rational B-spline surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NurbsSurface {
    pub degree_u: usize,
    pub degree_v: usize,
    /// Row-major grid: `[u_index * num_v + v_index]`.
    pub control_points: Vec<Point3d>,
    pub weights: Vec<f64>,
    pub knots_u: Vec<f64>,
    pub knots_v: Vec<f64>,
    pub num_u: usize,
    pub num_v: usize,
}

impl NurbsSurface {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        degree_u: usize,
        degree_v: usize,
        control_points: Vec<Point3d>,
        weights: Vec<f64>,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        num_u: usize,
        num_v: usize,
    ) -> Result<Self, BooleanError> {
        if control_points.len() != num_u * num_v
            || knots_u.len() != num_u + degree_u + 1
            || knots_v.len() != num_v + degree_v + 1
            || (!weights.is_empty() && weights.len() != control_points.len())
        {
            return Err(BooleanError::InvalidGeometry(
                "inconsistent NURBS surface dimensions".into(),
            ));
        }
        Ok(Self {
            degree_u,
            degree_v,
            control_points,
            weights,
            knots_u,
            knots_v,
            num_u,
            num_v,
        })
    }

    fn weight(&self, u_idx: usize, v_idx: usize) -> f64 {
        if self.weights.is_empty() {
            1.0
        } else {
            self.weights[u_idx * self.num_v + v_idx]
        }
    }

    pub fn domain_u(&self) -> (f64, f64) {
        (
            self.knots_u[self.degree_u],
            self.knots_u[self.knots_u.len() - self.degree_u - 1],
        )
    }

    pub fn domain_v(&self) -> (f64, f64) {
        (
            self.knots_v[self.degree_v],
            self.knots_v[self.knots_v.len() - self.degree_v - 1],
        )
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        let span_u = find_span(&self.knots_u, self.degree_u, self.num_u, u);
        let span_v = find_span(&self.knots_v, self.degree_v, self.num_v, v);
        let basis_u = basis_functions(&self.knots_u, span_u, u, self.degree_u);
        let basis_v = basis_functions(&self.knots_v, span_v, v, self.degree_v);

        let mut acc = Vec3::ZERO;
        let mut w_sum = 0.0;
        for (i, bu) in basis_u.iter().enumerate() {
            let u_idx = span_u - self.degree_u + i;
            for (j, bv) in basis_v.iter().enumerate() {
                let v_idx = span_v - self.degree_v + j;
                let cp = self.control_points[u_idx * self.num_v + v_idx];
                let bw = bu * bv * self.weight(u_idx, v_idx);
                acc = acc + cp.to_vec3() * bw;
                w_sum += bw;
            }
        }
        let p = acc / w_sum;
        Point3d::new(p.x, p.y, p.z)
    }

    /// Partial derivatives `(S_u, S_v)` by central differences.
    pub fn derivatives(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        let (u_min, u_max) = self.domain_u();
        let (v_min, v_max) = self.domain_v();
        let hu = 1e-7 * (u_max - u_min).max(1.0);
        let hv = 1e-7 * (v_max - v_min).max(1.0);
        let (u0, u1) = ((u - hu).max(u_min), (u + hu).min(u_max));
        let (v0, v1) = ((v - hv).max(v_min), (v + hv).min(v_max));
        let su = (self.evaluate(u1, v) - self.evaluate(u0, v)) / (u1 - u0);
        let sv = (self.evaluate(u, v1) - self.evaluate(u, v0)) / (v1 - v0);
        (su, sv)
    }

    pub fn normal(&self, u: f64, v: f64) -> Vec3 {
        let (su, sv) = self.derivatives(u, v);
        su.cross(&sv).normalized().unwrap_or(Vec3::Z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quarter_circle() -> NurbsCurve2d {
        let w = std::f64::consts::FRAC_1_SQRT_2;
        NurbsCurve::new(
            2,
            vec![Point2d::new(1.0, 0.0), Point2d::new(1.0, 1.0), Point2d::new(0.0, 1.0)],
            vec![1.0, w, 1.0],
            vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn test_rational_quarter_circle_stays_on_circle() {
        let c = quarter_circle();
        for i in 0..=20 {
            let p = c.evaluate(i as f64 / 20.0);
            let r = (p.x * p.x + p.y * p.y).sqrt();
            assert!((r - 1.0).abs() < 1e-9, "radius {} at sample {}", r, i);
        }
    }

    #[test]
    fn test_split_preserves_geometry() {
        let c = quarter_circle();
        let (left, right) = c.split_at(0.3).unwrap();
        assert_eq!(left.domain(), (0.0, 0.3));
        assert_eq!(right.domain(), (0.3, 1.0));
        for t in [0.0, 0.1, 0.25, 0.3] {
            assert!(left.evaluate(t).distance_to(&c.evaluate(t)) < 1e-9, "left at {}", t);
        }
        for t in [0.3, 0.5, 0.9, 1.0] {
            assert!(right.evaluate(t).distance_to(&c.evaluate(t)) < 1e-9, "right at {}", t);
        }
    }

    #[test]
    fn test_sub_curve_rejects_empty_interval() {
        let c = quarter_circle();
        assert!(matches!(
            c.sub_curve(0.5, 0.5),
            Err(BooleanError::InvalidInterval { .. })
        ));
        assert!(c.sub_curve(-1.0, 0.5).is_err());
        let mid = c.sub_curve(0.25, 0.75).unwrap();
        assert!(mid.evaluate(0.5).distance_to(&c.evaluate(0.5)) < 1e-9);
    }

    #[test]
    fn test_move_ends_keeps_interior() {
        let mut c = NurbsCurve::polyline(
            vec![Point2d::new(0.0, 0.0), Point2d::new(1.0, 1.0), Point2d::new(2.0, 0.0)],
            vec![0.0, 1.0, 2.0],
        )
        .unwrap();
        c.move_ends(Some(Point2d::new(0.0, 0.5)), None);
        assert!(c.evaluate(0.0).distance_to(&Point2d::new(0.0, 0.5)) < 1e-12);
        assert!(c.evaluate(1.0).distance_to(&Point2d::new(1.0, 1.0)) < 1e-12);
        assert!(c.evaluate(2.0).distance_to(&Point2d::new(2.0, 0.0)) < 1e-12);
    }

    #[test]
    fn test_reversed_swaps_ends() {
        let c = quarter_circle();
        let r = c.reversed();
        assert!(r.evaluate(0.0).distance_to(&Point2d::new(0.0, 1.0)) < 1e-12);
        assert!(r.evaluate(1.0).distance_to(&Point2d::new(1.0, 0.0)) < 1e-12);
        assert!(r.evaluate(0.4).distance_to(&c.evaluate(0.6)) < 1e-9);
    }

    #[test]
    fn test_polyline_hits_params() {
        let pts = vec![Point2d::new(0.0, 0.0), Point2d::new(1.0, 0.0), Point2d::new(1.0, 2.0)];
        let c = NurbsCurve::polyline(pts, vec![0.0, 1.0, 3.0]).unwrap();
        assert!(c.evaluate(1.0).distance_to(&Point2d::new(1.0, 0.0)) < 1e-12);
        assert!(c.evaluate(2.0).distance_to(&Point2d::new(1.0, 1.0)) < 1e-12);
        assert_eq!(c.interior_knots(), vec![1.0]);
    }

    #[test]
    fn test_bilinear_surface_normal() {
        let s = NurbsSurface::new(
            1,
            1,
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(0.0, 1.0, 0.0),
                Point3d::new(1.0, 0.0, 0.0),
                Point3d::new(1.0, 1.0, 0.0),
            ],
            vec![],
            vec![0.0, 0.0, 1.0, 1.0],
            vec![0.0, 0.0, 1.0, 1.0],
            2,
            2,
        )
        .unwrap();
        let p = s.evaluate(0.25, 0.75);
        assert!((p.x - 0.25).abs() < 1e-12 && (p.y - 0.75).abs() < 1e-12);
        assert!((s.normal(0.5, 0.5).z - 1.0).abs() < 1e-6);
    }
}
