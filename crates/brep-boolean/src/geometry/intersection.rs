use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};

use super::bounds::BoundingBox2d;
use super::curves::{Curve2d, Curve3d, Line2d, Line3d};
use super::nurbs::NurbsSurface;
use super::oracle::{CurveEvent, CurveSurfaceEvent};
use super::point::{Point2d, Point3d};
use super::surfaces::{Plane, Sphere, Surface};

// ─── Point / Curve ──────────────────────────────────────────────────────────

pub fn point_curve(p: &Point2d, curve: &Curve2d, tol: f64, samples: usize) -> Option<f64> {
    let t = closest_param(p, curve, samples);
    (curve.point_at(t).distance_to(p) <= tol).then_some(t)
}

/// Parameter of the curve point nearest to `p`.
pub fn closest_param(p: &Point2d, curve: &Curve2d, samples: usize) -> f64 {
    match curve {
        Curve2d::Line(l) => l.param_of(p).clamp(l.t0.min(l.t1), l.t0.max(l.t1)),
        Curve2d::Nurbs(n) => {
            let flat = curve.flatten(samples);
            let mut best_t = flat[0].0;
            let mut best_d = f64::INFINITY;
            for w in flat.windows(2) {
                let seg = Line2d::with_domain(w[0].1, w[1].1, w[0].0, w[1].0);
                let t = seg.param_of(p).clamp(w[0].0, w[1].0);
                let d = seg.point_at(t).distance_to(p);
                if d < best_d {
                    best_d = d;
                    best_t = t;
                }
            }
            if n.degree == 1 { best_t } else { refine_closest(curve, p, best_t) }
        }
    }
}

fn refine_closest(curve: &Curve2d, p: &Point2d, seed: f64) -> f64 {
    let (lo, hi) = curve.domain();
    let mut t = seed;
    for _ in 0..20 {
        let d = curve.tangent_at(t);
        let denom = d.dot(&d);
        if denom < 1e-300 {
            break;
        }
        let step = (curve.point_at(t) - *p).dot(&d) / denom;
        t = (t - step).clamp(lo, hi);
        if step.abs() < 1e-15 * (hi - lo).max(1.0) {
            break;
        }
    }
    t
}

fn is_piecewise_linear(c: &Curve2d) -> bool {
    match c {
        Curve2d::Line(_) => true,
        Curve2d::Nurbs(n) => n.degree == 1,
    }
}

// ─── Curve / Curve ──────────────────────────────────────────────────────────

pub fn curve_curve(a: &Curve2d, b: &Curve2d, tol: f64, samples: usize) -> Vec<CurveEvent> {
    match (a, b) {
        (Curve2d::Line(la), Curve2d::Line(lb)) => line_line(la, lb, tol),
        _ => general_curve_curve(a, b, tol, samples),
    }
}

/// Segment/segment intersection including collinear overlap.
pub fn line_line(la: &Line2d, lb: &Line2d, tol: f64) -> Vec<CurveEvent> {
    let da = la.end - la.start;
    let db = lb.end - lb.start;
    let len_a = da.length();
    let len_b = db.length();

    if len_a <= tol || len_b <= tol {
        return degenerate_line_line(la, lb, len_a <= tol, tol);
    }

    let off0 = (lb.start - la.start).cross(&da) / len_a;
    let off1 = (lb.end - la.start).cross(&da) / len_a;
    if off0.abs() <= tol && off1.abs() <= tol {
        return collinear_line_line(la, lb, tol);
    }

    let denom = da.cross(&db);
    if denom.abs() <= 1e-14 * len_a * len_b {
        return Vec::new();
    }
    let w = lb.start - la.start;
    let s = w.cross(&db) / denom;
    let u = w.cross(&da) / denom;
    let (ea, eb) = (tol / len_a, tol / len_b);
    if s < -ea || s > 1.0 + ea || u < -eb || u > 1.0 + eb {
        return Vec::new();
    }
    let (s, u) = (s.clamp(0.0, 1.0), u.clamp(0.0, 1.0));
    vec![CurveEvent::Transverse {
        t_a: la.t0 + s * (la.t1 - la.t0),
        t_b: lb.t0 + u * (lb.t1 - lb.t0),
        point: la.start.lerp(&la.end, s),
    }]
}

fn degenerate_line_line(la: &Line2d, lb: &Line2d, a_is_point: bool, tol: f64) -> Vec<CurveEvent> {
    let (pt, other) = if a_is_point { (la.start, lb) } else { (lb.start, la) };
    let t_other = other.param_of(&pt).clamp(other.t0, other.t1);
    if other.point_at(t_other).distance_to(&pt) > tol {
        return Vec::new();
    }
    let (t_a, t_b) = if a_is_point { (la.t0, t_other) } else { (t_other, lb.t0) };
    vec![CurveEvent::Tangent { t_a, t_b, point: pt }]
}

fn collinear_line_line(la: &Line2d, lb: &Line2d, tol: f64) -> Vec<CurveEvent> {
    let da = la.end - la.start;
    let len2 = da.dot(&da);
    let len_a = len2.sqrt();
    let sb0 = (lb.start - la.start).dot(&da) / len2;
    let sb1 = (lb.end - la.start).dot(&da) / len2;
    let lo = sb0.min(sb1).max(0.0);
    let hi = sb0.max(sb1).min(1.0);

    let a_param = |s: f64| la.t0 + s * (la.t1 - la.t0);
    let b_param = |s: f64| lb.param_of(&la.start.lerp(&la.end, s)).clamp(lb.t0, lb.t1);

    if (hi - lo) * len_a > tol {
        let (b0, b1) = (b_param(lo), b_param(hi));
        vec![CurveEvent::Overlap {
            a: (a_param(lo), a_param(hi)),
            b: (b0.min(b1), b0.max(b1)),
        }]
    } else if (hi - lo) * len_a > -tol {
        let s = (0.5 * (lo + hi)).clamp(0.0, 1.0);
        vec![CurveEvent::Tangent {
            t_a: a_param(s),
            t_b: b_param(s),
            point: la.start.lerp(&la.end, s),
        }]
    } else {
        Vec::new()
    }
}

fn general_curve_curve(a: &Curve2d, b: &Curve2d, tol: f64, samples: usize) -> Vec<CurveEvent> {
    let fa = a.flatten(samples);
    let fb = b.flatten(samples);
    let box_a = BoundingBox2d::from_points(&fa.iter().map(|(_, p)| *p).collect::<Vec<_>>());
    let box_b = BoundingBox2d::from_points(&fb.iter().map(|(_, p)| *p).collect::<Vec<_>>());
    if !box_a.intersects(&box_b, tol) {
        return Vec::new();
    }

    let overlap = overlap_by_projection(a, b, tol, samples);
    let refine = !(is_piecewise_linear(a) && is_piecewise_linear(b));

    let mut hits: Vec<(f64, f64, Point2d)> = Vec::new();
    for wa in fa.windows(2) {
        let la = Line2d::with_domain(wa[0].1, wa[1].1, wa[0].0, wa[1].0);
        for wb in fb.windows(2) {
            let lb = Line2d::with_domain(wb[0].1, wb[1].1, wb[0].0, wb[1].0);
            for ev in line_line(&la, &lb, tol) {
                match ev {
                    CurveEvent::Transverse { t_a, t_b, point } | CurveEvent::Tangent { t_a, t_b, point } => {
                        hits.push((t_a, t_b, point));
                    }
                    CurveEvent::Overlap { .. } => {}
                }
            }
        }
    }

    if refine {
        for hit in hits.iter_mut() {
            *hit = refine_crossing(a, b, hit.0, hit.1);
        }
    }

    hits.sort_by(|x, y| x.0.total_cmp(&y.0));
    hits.dedup_by(|x, y| x.2.distance_to(&y.2) <= tol);

    let mut events = Vec::new();
    let inside_overlap = |t: f64| match &overlap {
        Some(CurveEvent::Overlap { a: (lo, hi), .. }) => t > *lo && t < *hi,
        _ => false,
    };
    for (t_a, t_b, point) in hits {
        if inside_overlap(t_a) {
            continue;
        }
        if a.point_at(t_a).distance_to(&b.point_at(t_b)) > tol {
            continue;
        }
        let ta = a.tangent_at(t_a);
        let tb = b.tangent_at(t_b);
        let scale = ta.length() * tb.length();
        if scale > 0.0 && (ta.cross(&tb) / scale).abs() < 1e-9 {
            events.push(CurveEvent::Tangent { t_a, t_b, point });
        } else {
            events.push(CurveEvent::Transverse { t_a, t_b, point });
        }
    }
    if let Some(ov) = overlap {
        events.push(ov);
    }
    events
}

/// Newton on `a(s) - b(t) = 0` from a polyline estimate.
fn refine_crossing(a: &Curve2d, b: &Curve2d, s0: f64, t0: f64) -> (f64, f64, Point2d) {
    let (a_lo, a_hi) = a.domain();
    let (b_lo, b_hi) = b.domain();
    let (mut s, mut t) = (s0, t0);
    for _ in 0..20 {
        let f = a.point_at(s) - b.point_at(t);
        let da = a.tangent_at(s);
        let db = b.tangent_at(t);
        let jac = Matrix2::new(da.x, -db.x, da.y, -db.y);
        let Some(step) = jac.lu().solve(&Vector2::new(-f.x, -f.y)) else {
            break;
        };
        s = (s + step.x).clamp(a_lo, a_hi);
        t = (t + step.y).clamp(b_lo, b_hi);
        if step.norm() < 1e-15 {
            break;
        }
    }
    (s, t, a.point_at(s))
}

/// Coincident stretch of two curves, bounded by whichever curve ends lie on
/// the other curve.
fn overlap_by_projection(a: &Curve2d, b: &Curve2d, tol: f64, samples: usize) -> Option<CurveEvent> {
    let (a0, a1) = a.domain();
    let (b0, b1) = b.domain();
    let mut cands: Vec<(f64, f64)> = Vec::new();
    for ta in [a0, a1] {
        if let Some(tb) = point_curve(&a.point_at(ta), b, tol, samples) {
            cands.push((ta, tb));
        }
    }
    for tb in [b0, b1] {
        if let Some(ta) = point_curve(&b.point_at(tb), a, tol, samples) {
            cands.push((ta, tb));
        }
    }
    if cands.len() < 2 {
        return None;
    }
    cands.sort_by(|x, y| x.0.total_cmp(&y.0));
    let lo = cands[0];
    let hi = cands[cands.len() - 1];
    if a.point_at(lo.0).distance_to(&a.point_at(hi.0)) <= tol {
        return None;
    }
    for f in [0.25, 0.5, 0.75] {
        let p = a.point_at(lo.0 + f * (hi.0 - lo.0));
        point_curve(&p, b, tol, samples)?;
    }
    Some(CurveEvent::Overlap {
        a: (lo.0, hi.0),
        b: (lo.1.min(hi.1), lo.1.max(hi.1)),
    })
}

// ─── Curve / Surface ────────────────────────────────────────────────────────

pub fn curve_surface(curve: &Curve3d, surface: &Surface, tol: f64, samples: usize) -> Vec<CurveSurfaceEvent> {
    match curve {
        Curve3d::Line(l) => line_surface(l, surface, tol),
        _ => {
            let (t0, t1) = curve.domain();
            let n = samples.max(2);
            let params: Vec<f64> = (0..=n).map(|i| t0 + (t1 - t0) * i as f64 / n as f64).collect();
            let mut events = Vec::new();
            for w in params.windows(2) {
                let seg = Line3d::new(curve.point_at(w[0]), curve.point_at(w[1]));
                for ev in line_surface(&seg, surface, tol) {
                    let map = |t: f64| w[0] + t * (w[1] - w[0]);
                    events.push(match ev {
                        CurveSurfaceEvent::Transverse { t, uv, point } => {
                            CurveSurfaceEvent::Transverse { t: map(t), uv, point }
                        }
                        CurveSurfaceEvent::Tangent { t, uv, point } => {
                            CurveSurfaceEvent::Tangent { t: map(t), uv, point }
                        }
                        CurveSurfaceEvent::Overlap { t } => CurveSurfaceEvent::Overlap { t: (map(t.0), map(t.1)) },
                    });
                }
            }
            dedup_surface_events(events, tol)
        }
    }
}

fn event_point(ev: &CurveSurfaceEvent) -> Option<Point3d> {
    match ev {
        CurveSurfaceEvent::Transverse { point, .. } | CurveSurfaceEvent::Tangent { point, .. } => Some(*point),
        CurveSurfaceEvent::Overlap { .. } => None,
    }
}

fn dedup_surface_events(mut events: Vec<CurveSurfaceEvent>, tol: f64) -> Vec<CurveSurfaceEvent> {
    let key = |ev: &CurveSurfaceEvent| match ev {
        CurveSurfaceEvent::Transverse { t, .. } | CurveSurfaceEvent::Tangent { t, .. } => *t,
        CurveSurfaceEvent::Overlap { t } => t.0,
    };
    events.sort_by(|x, y| key(x).total_cmp(&key(y)));
    events.dedup_by(|x, y| match (event_point(x), event_point(y)) {
        (Some(p), Some(q)) => p.distance_to(&q) <= tol,
        _ => false,
    });
    events
}

pub fn line_surface(line: &Line3d, surface: &Surface, tol: f64) -> Vec<CurveSurfaceEvent> {
    match surface {
        Surface::Plane(p) => line_plane(line, p, tol),
        Surface::Sphere(s) => line_sphere(line, s, tol),
        Surface::Nurbs(n) => line_nurbs(line, n, tol),
    }
}

fn line_plane(line: &Line3d, plane: &Plane, tol: f64) -> Vec<CurveSurfaceEvent> {
    let d = line.direction();
    let len = d.length();
    let dist0 = plane.signed_distance(&line.start);
    if len <= tol {
        if dist0.abs() <= tol {
            let point = line.start;
            return vec![CurveSurfaceEvent::Tangent { t: 0.0, uv: plane.parameters_of(&point), point }];
        }
        return Vec::new();
    }
    let denom = d.dot(&plane.normal);
    if denom.abs() <= 1e-12 * len {
        return if dist0.abs() <= tol {
            vec![CurveSurfaceEvent::Overlap { t: (0.0, 1.0) }]
        } else {
            Vec::new()
        };
    }
    let t = -dist0 / denom;
    let et = tol / len;
    if t < -et || t > 1.0 + et {
        return Vec::new();
    }
    let t = t.clamp(0.0, 1.0);
    let point = line.point_at(t);
    vec![CurveSurfaceEvent::Transverse { t, uv: plane.parameters_of(&point), point }]
}

fn line_sphere(line: &Line3d, sphere: &Sphere, tol: f64) -> Vec<CurveSurfaceEvent> {
    let d = line.direction();
    let a = d.dot(&d);
    if a < 1e-300 {
        return Vec::new();
    }
    let oc = line.start - sphere.center;
    let b = 2.0 * oc.dot(&d);
    let c = oc.dot(&oc) - sphere.radius * sphere.radius;
    let et = tol / a.sqrt();
    let in_range = |t: f64| t >= -et && t <= 1.0 + et;

    let t_mid = -b / (2.0 * a);
    let miss = (oc + d * t_mid).length();
    if miss > sphere.radius + tol {
        return Vec::new();
    }
    if (sphere.radius - miss).abs() <= tol {
        if !in_range(t_mid) {
            return Vec::new();
        }
        let t = t_mid.clamp(0.0, 1.0);
        let point = line.point_at(t);
        return vec![CurveSurfaceEvent::Tangent { t, uv: sphere.parameters_of(&point), point }];
    }

    let sq = (b * b - 4.0 * a * c).max(0.0).sqrt();
    [(-b - sq) / (2.0 * a), (-b + sq) / (2.0 * a)]
        .into_iter()
        .filter(|&t| in_range(t))
        .map(|t| {
            let t = t.clamp(0.0, 1.0);
            let point = line.point_at(t);
            CurveSurfaceEvent::Transverse { t, uv: sphere.parameters_of(&point), point }
        })
        .collect()
}

/// Newton on `L(t) - S(u, v) = 0`, seeded from closest points of samples
/// along the line.
fn line_nurbs(line: &Line3d, surface: &NurbsSurface, tol: f64) -> Vec<CurveSurfaceEvent> {
    const SEEDS: usize = 16;
    let d = line.direction();
    let len = d.length();
    if len <= tol {
        return Vec::new();
    }
    let (u_lo, u_hi) = surface.domain_u();
    let (v_lo, v_hi) = surface.domain_v();
    let wrapped = Surface::Nurbs(surface.clone());

    let mut events = Vec::new();
    for i in 0..=SEEDS {
        let mut t = i as f64 / SEEDS as f64;
        let uv = wrapped.closest_parameters(&line.point_at(t));
        let (mut u, mut v) = (uv.x, uv.y);
        let mut residual = f64::INFINITY;
        for _ in 0..25 {
            let g = line.point_at(t) - surface.evaluate(u, v);
            residual = g.length();
            if residual < tol * 1e-3 {
                break;
            }
            let (su, sv) = surface.derivatives(u, v);
            let jac = Matrix3::from_columns(&[
                Vector3::new(d.x, d.y, d.z),
                Vector3::new(-su.x, -su.y, -su.z),
                Vector3::new(-sv.x, -sv.y, -sv.z),
            ]);
            let Some(step) = jac.lu().solve(&Vector3::new(-g.x, -g.y, -g.z)) else {
                break;
            };
            t += step.x;
            u = (u + step.y).clamp(u_lo, u_hi);
            v = (v + step.z).clamp(v_lo, v_hi);
        }
        let et = tol / len;
        if residual > tol || t < -et || t > 1.0 + et {
            continue;
        }
        let t = t.clamp(0.0, 1.0);
        let point = line.point_at(t);
        let uv = Point2d::new(u, v);
        let n = surface.normal(u, v);
        let grazing = (d / len).dot(&n).abs() < 1e-6;
        events.push(if grazing {
            CurveSurfaceEvent::Tangent { t, uv, point }
        } else {
            CurveSurfaceEvent::Transverse { t, uv, point }
        });
    }
    dedup_surface_events(events, tol)
}
