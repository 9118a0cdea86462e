//! Parameter-space loop queries: validity, signed area, and point membership.

use crate::error::BooleanError;
use crate::geometry::bounds::BoundingBox2d;
use crate::geometry::curves::Curve2d;
use crate::geometry::point::Point2d;

/// Position of a parameter-space point relative to a closed loop or region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    Inside,
    Outside,
    OnBoundary,
}

impl Containment {
    /// Inside or on the boundary.
    pub fn is_closed_inside(self) -> bool {
        !matches!(self, Containment::Outside)
    }
}

/// The loop as a closed polygon (last vertex not repeated).
pub fn loop_polygon(curves: &[Curve2d], samples: usize) -> Vec<Point2d> {
    let mut pts = Vec::new();
    for c in curves {
        let flat = c.flatten(samples);
        // The end of each curve is the start of the next one.
        pts.extend(flat[..flat.len().saturating_sub(1)].iter().map(|&(_, p)| p));
    }
    pts
}

/// Shoelace area; positive for counter-clockwise loops.
pub fn signed_area(curves: &[Curve2d], samples: usize) -> f64 {
    let pts = loop_polygon(curves, samples);
    if pts.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..pts.len() {
        let a = pts[i];
        let b = pts[(i + 1) % pts.len()];
        twice += a.cross(&b);
    }
    0.5 * twice
}

pub fn loop_bounding_box(curves: &[Curve2d], samples: usize) -> BoundingBox2d {
    curves
        .iter()
        .map(|c| c.bounding_box(samples))
        .fold(BoundingBox2d::empty(), |acc, bb| acc.union(&bb))
}

/// The same loop traversed the other way.
pub fn reverse_loop(curves: &[Curve2d]) -> Vec<Curve2d> {
    curves.iter().rev().map(Curve2d::reversed).collect()
}

/// Check that a loop is non-empty, continuous and closed.
pub fn validate_loop(curves: &[Curve2d], tol: f64) -> Result<(), BooleanError> {
    let (Some(first), Some(last)) = (curves.first(), curves.last()) else {
        return Err(BooleanError::InvalidGeometry("empty loop".into()));
    };
    for (i, w) in curves.windows(2).enumerate() {
        let gap = w[0].end().distance_to(&w[1].start());
        if gap > tol {
            return Err(BooleanError::InvalidGeometry(format!(
                "loop is not continuous after curve {} (gap {:e})",
                i, gap
            )));
        }
    }
    let gap = last.end().distance_to(&first.start());
    if gap > tol {
        return Err(BooleanError::InvalidGeometry(format!("loop is not closed (gap {:e})", gap)));
    }
    Ok(())
}

/// Zero area or zero extent within tolerance.
pub fn is_degenerate_loop(curves: &[Curve2d], tol: f64, samples: usize) -> bool {
    loop_bounding_box(curves, samples).diagonal() <= tol || signed_area(curves, samples).abs() <= tol * tol
}

/// A curve whose ends coincide and whose samples all stay within `tol` of
/// each other.
pub fn is_zero_length(curve: &Curve2d, tol: f64, samples: usize) -> bool {
    curve.start().distance_to(&curve.end()) <= tol && curve.bounding_box(samples).diagonal() <= tol
}

fn segment_distance(p: &Point2d, a: &Point2d, b: &Point2d) -> f64 {
    let ab = *b - *a;
    let len2 = ab.dot(&ab);
    if len2 <= 0.0 {
        return p.distance_to(a);
    }
    let s = ((*p - *a).dot(&ab) / len2).clamp(0.0, 1.0);
    p.distance_to(&a.lerp(b, s))
}

pub fn distance_to_loop(p: &Point2d, curves: &[Curve2d], samples: usize) -> f64 {
    let pts = loop_polygon(curves, samples);
    (0..pts.len())
        .map(|i| segment_distance(p, &pts[i], &pts[(i + 1) % pts.len()]))
        .fold(f64::INFINITY, f64::min)
}

/// Even-odd membership of `p` in a closed loop, with a boundary band of
/// width `tol`.
pub fn point_in_loop(p: &Point2d, curves: &[Curve2d], tol: f64, samples: usize) -> Containment {
    let pts = loop_polygon(curves, samples);
    if pts.len() < 2 {
        return Containment::Outside;
    }
    let mut inside = false;
    for i in 0..pts.len() {
        let a = pts[i];
        let b = pts[(i + 1) % pts.len()];
        if segment_distance(p, &a, &b) <= tol {
            return Containment::OnBoundary;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if x > p.x {
                inside = !inside;
            }
        }
    }
    if inside { Containment::Inside } else { Containment::Outside }
}

/// Membership in the region bounded by `outer` minus the `inners` holes.
pub fn point_in_region(
    p: &Point2d,
    outer: &[Curve2d],
    inners: &[Vec<Curve2d>],
    tol: f64,
    samples: usize,
) -> Containment {
    match point_in_loop(p, outer, tol, samples) {
        Containment::Inside => {}
        other => return other,
    }
    for hole in inners {
        match point_in_loop(p, hole, tol, samples) {
            Containment::Inside => return Containment::Outside,
            Containment::OnBoundary => return Containment::OnBoundary,
            Containment::Outside => {}
        }
    }
    Containment::Inside
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Closed polygon through `pts` as line trims.
    pub(crate) fn polygon(pts: &[(f64, f64)]) -> Vec<Curve2d> {
        (0..pts.len())
            .map(|i| {
                let (a, b) = (pts[i], pts[(i + 1) % pts.len()]);
                Curve2d::line(Point2d::new(a.0, a.1), Point2d::new(b.0, b.1))
            })
            .collect()
    }

    pub(crate) fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Curve2d> {
        polygon(&[(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
    }

    #[test]
    fn test_signed_area_follows_winding() {
        let sq = rect(0.0, 0.0, 2.0, 1.0);
        assert!((signed_area(&sq, 8) - 2.0).abs() < 1e-12);
        assert!((signed_area(&reverse_loop(&sq), 8) + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_point_in_loop() {
        let sq = rect(0.0, 0.0, 1.0, 1.0);
        assert_eq!(point_in_loop(&Point2d::new(0.5, 0.5), &sq, 1e-9, 8), Containment::Inside);
        assert_eq!(point_in_loop(&Point2d::new(1.5, 0.5), &sq, 1e-9, 8), Containment::Outside);
        assert_eq!(point_in_loop(&Point2d::new(1.0, 0.5), &sq, 1e-9, 8), Containment::OnBoundary);
        assert_eq!(point_in_loop(&Point2d::new(0.0, 0.0), &sq, 1e-9, 8), Containment::OnBoundary);
    }

    #[test]
    fn test_point_in_region_respects_holes() {
        let outer = rect(0.0, 0.0, 4.0, 4.0);
        let hole = reverse_loop(&rect(1.0, 1.0, 2.0, 2.0));
        let inners = vec![hole];
        assert_eq!(point_in_region(&Point2d::new(1.5, 1.5), &outer, &inners, 1e-9, 8), Containment::Outside);
        assert_eq!(point_in_region(&Point2d::new(3.0, 3.0), &outer, &inners, 1e-9, 8), Containment::Inside);
        assert_eq!(point_in_region(&Point2d::new(2.0, 1.5), &outer, &inners, 1e-9, 8), Containment::OnBoundary);
    }

    #[test]
    fn test_validate_loop() {
        assert!(validate_loop(&rect(0.0, 0.0, 1.0, 1.0), 1e-9).is_ok());
        assert!(validate_loop(&[], 1e-9).is_err(), "empty loop is invalid");
        let mut open = rect(0.0, 0.0, 1.0, 1.0);
        open.pop();
        assert!(matches!(validate_loop(&open, 1e-9), Err(BooleanError::InvalidGeometry(_))));
    }

    #[test]
    fn test_degenerate_detection() {
        let sliver = polygon(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        assert!(is_degenerate_loop(&sliver, 1e-9, 8), "collinear loop has zero area");
        assert!(!is_degenerate_loop(&rect(0.0, 0.0, 1.0, 1.0), 1e-9, 8));
        let dot = Curve2d::line(Point2d::new(1.0, 1.0), Point2d::new(1.0, 1.0 + 1e-12));
        assert!(is_zero_length(&dot, 1e-9, 8));
    }
}
