use std::f64::consts::{PI, TAU};

use tracing::warn;

use super::bounds::BoundingBox;
use super::curves::{Circle3d, Curve2d, Curve3d, Line2d, Line3d};
use super::nurbs::NurbsCurve;
use super::oracle::{SsiCurve, SurfaceEvent};
use super::point::{Point2d, Point3d};
use super::surfaces::{Plane, Sphere, Surface};
use super::vector::Vec3;

/// Intersection branches of two surfaces within `region`.
pub fn surface_surface(
    a: &Surface,
    b: &Surface,
    region: &BoundingBox,
    tol: f64,
    samples: usize,
) -> Vec<SurfaceEvent> {
    match (a, b) {
        (Surface::Plane(pa), Surface::Plane(pb)) => plane_plane(pa, pb, region, tol),
        (Surface::Plane(p), Surface::Sphere(s)) | (Surface::Sphere(s), Surface::Plane(p)) => {
            match plane_sphere(p, s, tol) {
                Contact::None => Vec::new(),
                Contact::Coincident => vec![SurfaceEvent::Overlap],
                Contact::Point(point) => vec![tangent_event(point, a, b)],
                Contact::Circle(circle) => circle_events(&circle, a, b, samples),
            }
        }
        (Surface::Sphere(sa), Surface::Sphere(sb)) => match sphere_sphere(sa, sb, tol) {
            Contact::None => Vec::new(),
            Contact::Coincident => vec![SurfaceEvent::Overlap],
            Contact::Point(point) => vec![tangent_event(point, a, b)],
            Contact::Circle(circle) => circle_events(&circle, a, b, samples),
        },
        _ => {
            warn!(
                a = a.surface_type_name(),
                b = b.surface_type_name(),
                "no intersection method for surface pair"
            );
            Vec::new()
        }
    }
}

/// Closed-form contact between two quadrics.
#[derive(Debug, Clone, PartialEq)]
enum Contact {
    None,
    Coincident,
    Point(Point3d),
    Circle(Circle3d),
}

fn tangent_event(point: Point3d, a: &Surface, b: &Surface) -> SurfaceEvent {
    SurfaceEvent::Tangent {
        point,
        uv_a: a.closest_parameters(&point),
        uv_b: b.closest_parameters(&point),
    }
}

// ─── Plane–Plane ─────────────────────────────────────────────────────────────

fn plane_plane(p1: &Plane, p2: &Plane, region: &BoundingBox, tol: f64) -> Vec<SurfaceEvent> {
    let cross = p1.normal.cross(&p2.normal);
    let cross_len = cross.length();

    if cross_len < 1e-12 {
        return if p1.signed_distance(&p2.origin).abs() <= tol {
            vec![SurfaceEvent::Overlap]
        } else {
            Vec::new()
        };
    }

    let dir = cross / cross_len;

    // Plane i: n_i . P = d_i
    let d1 = p1.origin.to_vec3().dot(&p1.normal);
    let d2 = p2.origin.to_vec3().dot(&p2.normal);
    let n1n2 = p1.normal.dot(&p2.normal);
    let denom = 1.0 - n1n2 * n1n2;
    let c1 = (d1 - d2 * n1n2) / denom;
    let c2 = (d2 - d1 * n1n2) / denom;
    let origin = Point3d::ORIGIN + p1.normal * c1 + p2.normal * c2;

    let Some((t0, t1)) = clip_line_to_box(&origin, &dir, &region.expanded(tol)) else {
        return Vec::new();
    };
    if t1 - t0 <= tol {
        return Vec::new();
    }
    let start = origin + dir * t0;
    let end = origin + dir * t1;
    vec![SurfaceEvent::Transverse(SsiCurve {
        curve: Curve3d::Line(Line3d::new(start, end)),
        uv_a: Curve2d::Line(Line2d::new(p1.parameters_of(&start), p1.parameters_of(&end))),
        uv_b: Curve2d::Line(Line2d::new(p2.parameters_of(&start), p2.parameters_of(&end))),
    })]
}

/// Slab clip of the infinite line `origin + t·dir`.
fn clip_line_to_box(origin: &Point3d, dir: &Vec3, bb: &BoundingBox) -> Option<(f64, f64)> {
    let o = [origin.x, origin.y, origin.z];
    let d = [dir.x, dir.y, dir.z];
    let lo = [bb.min.x, bb.min.y, bb.min.z];
    let hi = [bb.max.x, bb.max.y, bb.max.z];
    let mut tmin = f64::NEG_INFINITY;
    let mut tmax = f64::INFINITY;
    for i in 0..3 {
        if d[i].abs() < 1e-15 {
            if o[i] < lo[i] || o[i] > hi[i] {
                return None;
            }
            continue;
        }
        let mut a = (lo[i] - o[i]) / d[i];
        let mut b = (hi[i] - o[i]) / d[i];
        if a > b {
            std::mem::swap(&mut a, &mut b);
        }
        tmin = tmin.max(a);
        tmax = tmax.min(b);
        if tmax < tmin {
            return None;
        }
    }
    Some((tmin, tmax))
}

// ─── Plane–Sphere / Sphere–Sphere ───────────────────────────────────────────

fn plane_sphere(plane: &Plane, sphere: &Sphere, tol: f64) -> Contact {
    let dist = plane.signed_distance(&sphere.center);
    let foot = sphere.center - plane.normal * dist;
    if dist.abs() > sphere.radius + tol {
        return Contact::None;
    }
    if (dist.abs() - sphere.radius).abs() <= tol {
        return Contact::Point(foot);
    }
    let radius = (sphere.radius * sphere.radius - dist * dist).sqrt();
    Contact::Circle(Circle3d {
        center: foot,
        normal: plane.normal,
        x_axis: plane.u_axis,
        radius,
        start_angle: 0.0,
        end_angle: TAU,
    })
}

fn sphere_sphere(s1: &Sphere, s2: &Sphere, tol: f64) -> Contact {
    let axis = s2.center - s1.center;
    let dist = axis.length();
    if dist <= tol {
        return if (s1.radius - s2.radius).abs() <= tol { Contact::Coincident } else { Contact::None };
    }
    let (r1, r2) = (s1.radius, s2.radius);
    if dist > r1 + r2 + tol || dist < (r1 - r2).abs() - tol {
        return Contact::None;
    }
    let axis = axis / dist;
    let h = (dist * dist + r1 * r1 - r2 * r2) / (2.0 * dist);
    let center = s1.center + axis * h;
    if (dist - (r1 + r2)).abs() <= tol || (dist - (r1 - r2).abs()).abs() <= tol {
        return Contact::Point(center);
    }
    let radius = (r1 * r1 - h * h).max(0.0).sqrt();
    Contact::Circle(Circle3d::full(center, axis, radius))
}

// ─── Sampled branches ───────────────────────────────────────────────────────

#[derive(Default)]
struct Piece {
    params: Vec<f64>,
    uv_a: Vec<Point2d>,
    uv_b: Vec<Point2d>,
}

impl Piece {
    fn push(&mut self, t: f64, ua: Point2d, ub: Point2d) {
        self.params.push(t);
        self.uv_a.push(ua);
        self.uv_b.push(ub);
    }
}

fn is_periodic(s: &Surface) -> bool {
    matches!(s, Surface::Sphere(_))
}

const SEAM_EPS: f64 = 1e-9;

/// Resolve the longitude of a sphere sample that sits on the seam or at a
/// pole, where it is ambiguous, toward the longitude of its neighbour.
fn settle_longitude(surface: &Surface, uv: Point2d, neighbour: Point2d) -> Point2d {
    if !is_periodic(surface) {
        return uv;
    }
    if uv.y.cos().abs() < SEAM_EPS {
        return Point2d::new(neighbour.x, uv.y);
    }
    if uv.x < SEAM_EPS || uv.x > TAU - SEAM_EPS {
        let u = if neighbour.x > PI { TAU } else { 0.0 };
        return Point2d::new(u, uv.y);
    }
    uv
}

fn on_seam(u: f64) -> bool {
    u < SEAM_EPS || u > TAU - SEAM_EPS
}

/// Sample a circular branch into parameter-space polylines on both surfaces,
/// starting a new piece wherever the branch crosses a sphere seam so that no
/// piece jumps across the parameter domain.
fn circle_events(circle: &Circle3d, a: &Surface, b: &Surface, samples: usize) -> Vec<SurfaceEvent> {
    let n = samples.max(8);
    let (t_start, t_end) = (circle.start_angle, circle.end_angle);
    let param = |i: usize| t_start + (t_end - t_start) * i as f64 / n as f64;
    let raw_uv = |t: f64| {
        let p = circle.point_at(t);
        (a.closest_parameters(&p), b.closest_parameters(&p))
    };

    let mut pieces: Vec<Piece> = Vec::new();
    let mut cur = Piece::default();
    let (ua0, ub0) = raw_uv(t_start);
    let (ua1, ub1) = raw_uv(param(1));
    cur.push(t_start, settle_longitude(a, ua0, ua1), settle_longitude(b, ub0, ub1));

    for i in 1..=n {
        let t = param(i);
        let last = cur.params.len() - 1;
        let (prev_t, prev_ua, prev_ub) = (cur.params[last], cur.uv_a[last], cur.uv_b[last]);
        let (ua, ub) = raw_uv(t);
        let ua = settle_longitude(a, ua, prev_ua);
        let ub = settle_longitude(b, ub, prev_ub);
        let jump_a = is_periodic(a) && (ua.x - prev_ua.x).abs() > PI;
        let jump_b = is_periodic(b) && (ub.x - prev_ub.x).abs() > PI;

        if jump_a || jump_b {
            let (surface, prev_u) = if jump_a { (a, prev_ua.x) } else { (b, prev_ub.x) };
            let high = prev_u > PI;
            let (seam_end, seam_start) = if high { (TAU, 0.0) } else { (0.0, TAU) };

            if on_seam(prev_u) {
                // The previous sample already sits on the seam: restart there.
                let mut start_a = prev_ua;
                let mut start_b = prev_ub;
                if jump_a {
                    start_a.x = seam_start;
                }
                if jump_b {
                    start_b.x = seam_start;
                }
                if cur.params.len() > 1 {
                    pieces.push(std::mem::take(&mut cur));
                } else {
                    cur = Piece::default();
                }
                cur.push(prev_t, start_a, start_b);
            } else {
                let (mut lo, mut hi) = (prev_t, t);
                for _ in 0..60 {
                    let mid = 0.5 * (lo + hi);
                    let u = surface.closest_parameters(&circle.point_at(mid)).x;
                    if (u > PI) == high {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                let eps = 1e-9 * (t - prev_t);
                let ts = (0.5 * (lo + hi)).clamp(prev_t + eps, t - eps);
                let (mut end_a, mut end_b) = raw_uv(ts);
                let (mut start_a, mut start_b) = (end_a, end_b);
                if jump_a {
                    end_a.x = seam_end;
                    start_a.x = seam_start;
                }
                if jump_b {
                    end_b.x = seam_end;
                    start_b.x = seam_start;
                }
                cur.push(ts, end_a, end_b);
                pieces.push(std::mem::take(&mut cur));
                cur.push(ts, start_a, start_b);
            }
        }
        cur.push(t, ua, ub);
    }
    pieces.push(cur);

    pieces
        .into_iter()
        .filter(|piece| piece.params.len() >= 2)
        .filter_map(|piece| {
            let (t0, t1) = (piece.params[0], piece.params[piece.params.len() - 1]);
            let uv_a = NurbsCurve::polyline(piece.uv_a, piece.params.clone()).ok()?;
            let uv_b = NurbsCurve::polyline(piece.uv_b, piece.params).ok()?;
            let arc = Circle3d {
                start_angle: t0,
                end_angle: t1,
                ..*circle
            };
            Some(SurfaceEvent::Transverse(SsiCurve {
                curve: Curve3d::Circle(arc),
                uv_a: Curve2d::Nurbs(uv_a),
                uv_b: Curve2d::Nurbs(uv_b),
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn big_region() -> BoundingBox {
        BoundingBox::new(Point3d::new(-10.0, -10.0, -10.0), Point3d::new(10.0, 10.0, 10.0))
    }

    fn branches(events: &[SurfaceEvent]) -> Vec<&SsiCurve> {
        events
            .iter()
            .filter_map(|e| match e {
                SurfaceEvent::Transverse(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    fn assert_branch_on_both(c: &SsiCurve, a: &Surface, b: &Surface, tol: f64) {
        let (t0, t1) = c.curve.domain();
        for i in 0..=10 {
            let t = t0 + (t1 - t0) * i as f64 / 10.0;
            let p = c.curve.point_at(t);
            let pa = a.evaluate(c.uv_a.point_at(t));
            let pb = b.evaluate(c.uv_b.point_at(t));
            assert!(p.distance_to(&pa) < tol, "uv_a off the curve by {}", p.distance_to(&pa));
            assert!(p.distance_to(&pb) < tol, "uv_b off the curve by {}", p.distance_to(&pb));
        }
    }

    #[test]
    fn plane_plane_perpendicular_is_clipped_to_region() {
        let a = Surface::Plane(Plane::canonical(Vec3::X, 1.0));
        let b = Surface::Plane(Plane::canonical(Vec3::Y, 0.5));
        let region = BoundingBox::new(Point3d::new(0.0, 0.0, 0.0), Point3d::new(2.0, 2.0, 3.0));
        let ev = surface_surface(&a, &b, &region, TOL, 32);
        let br = branches(&ev);
        assert_eq!(br.len(), 1);
        assert!((br[0].curve.approximate_length(1) - 3.0).abs() < 1e-6);
        assert_branch_on_both(br[0], &a, &b, 1e-9);
    }

    #[test]
    fn plane_plane_coincident_overlaps() {
        let a = Surface::Plane(Plane::canonical(Vec3::Z, 1.0));
        let b = Surface::Plane(Plane::canonical(-Vec3::Z, -1.0));
        assert_eq!(surface_surface(&a, &b, &big_region(), TOL, 32), vec![SurfaceEvent::Overlap]);
    }

    #[test]
    fn plane_plane_parallel_apart_is_empty() {
        let a = Surface::Plane(Plane::canonical(Vec3::Z, 1.0));
        let b = Surface::Plane(Plane::canonical(Vec3::Z, 2.0));
        assert!(surface_surface(&a, &b, &big_region(), TOL, 32).is_empty());
    }

    #[test]
    fn plane_sphere_small_circle_lies_on_both() {
        let a = Surface::Plane(Plane::canonical(Vec3::Z, 0.5));
        let b = Surface::Sphere(Sphere::new(Point3d::ORIGIN, 1.0));
        let ev = surface_surface(&a, &b, &big_region(), TOL, 64);
        let br = branches(&ev);
        assert!(!br.is_empty());
        for c in &br {
            // Chords of the sampled branch stay within the sagitta of the arc.
            assert_branch_on_both(c, &a, &b, 2e-3);
        }
        let total: f64 = br.iter().map(|c| c.curve.domain().1 - c.curve.domain().0).sum();
        assert!((total - TAU).abs() < 1e-9, "branches cover the full circle");
    }

    #[test]
    fn plane_sphere_branch_is_split_at_the_seam() {
        // The circle frame starts at longitude π/2, so the latitude circle
        // crosses the seam once.
        let plane = Plane::canonical(Vec3::Z, 0.25);
        let a = Surface::Plane(plane);
        let b = Surface::Sphere(Sphere::new(Point3d::ORIGIN, 1.0));
        let ev = surface_surface(&a, &b, &big_region(), TOL, 48);
        let br = branches(&ev);
        for c in &br {
            let (t0, t1) = c.uv_b.domain();
            let mut prev = c.uv_b.point_at(t0);
            for i in 1..=20 {
                let p = c.uv_b.point_at(t0 + (t1 - t0) * i as f64 / 20.0);
                assert!((p.x - prev.x).abs() < PI, "a piece jumps across the seam");
                prev = p;
            }
        }
        assert_eq!(br.len(), 2, "one seam crossing gives two pieces");
        let seam_ends = br
            .iter()
            .flat_map(|c| [c.uv_b.start(), c.uv_b.end()])
            .filter(|p| on_seam(p.x))
            .count();
        assert_eq!(seam_ends, 2, "each piece meets the seam once");
    }

    #[test]
    fn plane_touching_sphere_is_tangent() {
        let a = Surface::Plane(Plane::canonical(Vec3::Z, 1.0));
        let b = Surface::Sphere(Sphere::new(Point3d::ORIGIN, 1.0));
        let ev = surface_surface(&a, &b, &big_region(), 1e-9, 32);
        assert!(matches!(ev.as_slice(), [SurfaceEvent::Tangent { .. }]));
    }

    #[test]
    fn concentric_spheres_do_not_meet() {
        let a = Surface::Sphere(Sphere::new(Point3d::ORIGIN, 2.0));
        let b = Surface::Sphere(Sphere::new(Point3d::ORIGIN, 1.0));
        assert!(surface_surface(&a, &b, &big_region(), TOL, 32).is_empty());
        assert_eq!(surface_surface(&a, &a, &big_region(), TOL, 32), vec![SurfaceEvent::Overlap]);
    }

    #[test]
    fn overlapping_spheres_meet_in_a_circle() {
        let a = Surface::Sphere(Sphere::new(Point3d::ORIGIN, 1.0));
        let b = Surface::Sphere(Sphere::new(Point3d::new(1.0, 0.0, 0.0), 1.0));
        let ev = surface_surface(&a, &b, &big_region(), TOL, 64);
        let br = branches(&ev);
        assert!(!br.is_empty());
        for c in &br {
            let mid = c.curve.point_at(0.5 * (c.curve.domain().0 + c.curve.domain().1));
            assert!((mid.x - 0.5).abs() < 1e-9, "circle lies in the plane x = 0.5");
            assert_branch_on_both(c, &a, &b, 1e-2);
        }
    }
}
