//! Boolean combination of two closed loops in one surface's parameter space.
//!
//! Both loops are cut at every mutual intersection and at every curve end.
//! Each resulting segment is classified against the other loop, a subset of
//! segments is selected for the requested operation, and the selection is
//! chained back into closed loops. A segment and its exact reverse cancel
//! out of the selection, which removes walls shared by abutting regions.

use tracing::{debug, warn};

use crate::geometry::curves::Curve2d;
use crate::geometry::oracle::{CurveEvent, GeometryOracle};
use crate::geometry::point::Point2d;

use super::membership::{
    is_zero_length, point_in_loop, reverse_loop, signed_area, validate_loop, Containment,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOp {
    Union,
    Intersect,
    Difference,
}

/// Classification of a cut point or segment against the other loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentClass {
    Boundary,
    Inside,
    Outside,
}

/// A cut point on one of the two input loops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopPoint {
    /// 0 for the first loop, 1 for the second.
    pub origin: usize,
    pub curve: usize,
    pub param: f64,
    pub point: Point2d,
    pub class: SegmentClass,
}

/// The piece of a loop curve between two consecutive cut points.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSegment {
    pub origin: usize,
    pub curve: Curve2d,
    pub class: SegmentClass,
}

/// Outer loops wind counter-clockwise, inner loops clockwise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopBooleanResult {
    pub outers: Vec<Vec<Curve2d>>,
    pub inners: Vec<Vec<Curve2d>>,
}

/// An outer loop with the holes it contains.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub outer: Vec<Curve2d>,
    pub inners: Vec<Vec<Curve2d>>,
}

impl Region {
    pub fn new(outer: Vec<Curve2d>) -> Self {
        Self {
            outer,
            inners: Vec::new(),
        }
    }
}

impl LoopBooleanResult {
    pub fn is_empty(&self) -> bool {
        self.outers.is_empty() && self.inners.is_empty()
    }

    /// Attach every inner loop to the smallest outer loop containing it.
    /// Inner loops outside every outer loop are dropped.
    pub fn into_regions(self, tol: f64, samples: usize) -> Vec<Region> {
        let mut regions: Vec<Region> = self.outers.into_iter().map(Region::new).collect();
        for inner in self.inners {
            match containing_region(&regions, &inner, tol, samples) {
                Some(i) => regions[i].inners.push(inner),
                None => warn!("inner loop lies in no outer loop; dropped"),
            }
        }
        regions
    }
}

/// Index of the smallest region whose outer loop contains `inner`.
pub fn containing_region(regions: &[Region], inner: &[Curve2d], tol: f64, samples: usize) -> Option<usize> {
    let probes: Vec<Point2d> = inner
        .iter()
        .flat_map(|c| {
            let (t0, t1) = c.domain();
            [c.point_at(0.5 * (t0 + t1)), c.start()]
        })
        .collect();
    regions
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            probes
                .iter()
                .map(|p| point_in_loop(p, &r.outer, tol, samples))
                .find(|c| *c != Containment::OnBoundary)
                .is_some_and(|c| c == Containment::Inside)
        })
        .min_by(|a, b| signed_area(&a.1.outer, samples).total_cmp(&signed_area(&b.1.outer, samples)))
        .map(|(i, _)| i)
}

/// Combine two closed loops. Invalid or zero-area input gives an empty
/// result.
pub fn loop_boolean(
    loop1: &[Curve2d],
    loop2: &[Curve2d],
    op: LoopOp,
    oracle: &dyn GeometryOracle,
    tol: f64,
    samples: usize,
) -> LoopBooleanResult {
    let Some(l1) = standardize(loop1, true, tol, samples) else {
        return LoopBooleanResult::default();
    };
    let Some(l2) = standardize(loop2, op != LoopOp::Difference, tol, samples) else {
        return LoopBooleanResult::default();
    };

    let (cuts1, cuts2) = cut_parameters(&l1, &l2, oracle, tol);
    let points1 = cut_points(&l1, &cuts1, &l2, 0, tol, samples);
    let points2 = cut_points(&l2, &cuts2, &l1, 1, tol, samples);
    let segs1 = segments(&l1, &points1, &l2, oracle, tol, samples);
    let segs2 = segments(&l2, &points2, &l1, oracle, tol, samples);

    let of = |segs: &[LoopSegment], class: SegmentClass| -> Vec<Curve2d> {
        segs.iter().filter(|s| s.class == class).map(|s| s.curve.clone()).collect()
    };
    let (in1, out1, bnd1) = (
        of(&segs1, SegmentClass::Inside),
        of(&segs1, SegmentClass::Outside),
        of(&segs1, SegmentClass::Boundary),
    );
    let (in2, out2, bnd2) = (
        of(&segs2, SegmentClass::Inside),
        of(&segs2, SegmentClass::Outside),
        of(&segs2, SegmentClass::Boundary),
    );

    let mut selected = SegmentSet::new(oracle, tol);
    match op {
        LoopOp::Union => {
            selected.extend(out1);
            selected.extend(out2);
            selected.extend(bnd1);
            selected.extend(bnd2);
        }
        LoopOp::Intersect => {
            selected.extend(in1);
            selected.extend(in2);
            for s in bnd1 {
                if bnd2.iter().any(|b| same_course(&s, b, false, oracle, tol)) {
                    selected.insert(s);
                }
            }
        }
        LoopOp::Difference => {
            selected.extend(out1);
            selected.extend(in2);
            selected.extend(bnd1);
            selected.extend(bnd2);
        }
    }

    let mut result = LoopBooleanResult::default();
    for l in chain_segments(selected.into_curves(), tol) {
        let area = signed_area(&l, samples);
        if area > tol * tol {
            result.outers.push(l);
        } else if area < -tol * tol {
            result.inners.push(l);
        } else {
            debug!("dropping zero-area loop");
        }
    }
    debug!(
        ?op,
        outers = result.outers.len(),
        inners = result.inners.len(),
        "loop boolean"
    );
    result
}

/// Validate a loop and orient it counter-clockwise (`ccw`) or clockwise.
fn standardize(curves: &[Curve2d], ccw: bool, tol: f64, samples: usize) -> Option<Vec<Curve2d>> {
    if let Err(e) = validate_loop(curves, tol) {
        warn!(error = %e, "loop boolean input rejected");
        return None;
    }
    let area = signed_area(curves, samples);
    if area.abs() <= tol * tol {
        warn!("loop boolean input bounds no area");
        return None;
    }
    if (area > 0.0) == ccw {
        Some(curves.to_vec())
    } else {
        Some(reverse_loop(curves))
    }
}

fn cut_parameters(
    l1: &[Curve2d],
    l2: &[Curve2d],
    oracle: &dyn GeometryOracle,
    tol: f64,
) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let mut cuts1: Vec<Vec<f64>> = vec![Vec::new(); l1.len()];
    let mut cuts2: Vec<Vec<f64>> = vec![Vec::new(); l2.len()];
    for (i, a) in l1.iter().enumerate() {
        for (j, b) in l2.iter().enumerate() {
            for event in oracle.curve_curve(a, b, tol) {
                match event {
                    CurveEvent::Transverse { t_a, t_b, .. } | CurveEvent::Tangent { t_a, t_b, .. } => {
                        cuts1[i].push(t_a);
                        cuts2[j].push(t_b);
                    }
                    CurveEvent::Overlap { a: ra, b: rb } => {
                        cuts1[i].extend([ra.0, ra.1]);
                        cuts2[j].extend([rb.0, rb.1]);
                    }
                }
            }
        }
    }
    // Vertices of one loop lying on a curve of the other.
    for (own, other, cuts) in [(l1, l2, &mut cuts1), (l2, l1, &mut cuts2)] {
        for v in other.iter().map(Curve2d::start) {
            for (i, c) in own.iter().enumerate() {
                if let Some(t) = oracle.point_curve(&v, c, tol) {
                    cuts[i].push(t);
                }
            }
        }
    }
    (cuts1, cuts2)
}

fn cut_points(
    own: &[Curve2d],
    cuts: &[Vec<f64>],
    other: &[Curve2d],
    origin: usize,
    tol: f64,
    samples: usize,
) -> Vec<Vec<LoopPoint>> {
    own.iter()
        .zip(cuts)
        .enumerate()
        .map(|(i, (curve, extra))| {
            let (t0, t1) = curve.domain();
            let mut params: Vec<f64> = extra.iter().copied().filter(|t| *t > t0 && *t < t1).collect();
            params.push(t0);
            params.push(t1);
            params.sort_by(f64::total_cmp);

            let mut points: Vec<LoopPoint> = Vec::with_capacity(params.len());
            for t in params {
                let p = curve.point_at(t);
                if let Some(last) = points.last() {
                    if last.point.distance_to(&p) <= tol {
                        // Keep the domain end when it collides with a cut.
                        if t == t1 {
                            points.pop();
                        } else {
                            continue;
                        }
                    }
                }
                let class = match point_in_loop(&p, other, tol, samples) {
                    Containment::Inside => SegmentClass::Inside,
                    Containment::Outside => SegmentClass::Outside,
                    Containment::OnBoundary => SegmentClass::Boundary,
                };
                points.push(LoopPoint {
                    origin,
                    curve: i,
                    param: t,
                    point: p,
                    class,
                });
            }
            if points.len() == 1 {
                // The whole curve is shorter than tolerance; keep both ends.
                points.push(LoopPoint {
                    param: t1,
                    point: curve.point_at(t1),
                    ..points[0]
                });
            }
            points
        })
        .collect()
}

fn segments(
    own: &[Curve2d],
    points: &[Vec<LoopPoint>],
    other: &[Curve2d],
    oracle: &dyn GeometryOracle,
    tol: f64,
    samples: usize,
) -> Vec<LoopSegment> {
    let mut out = Vec::new();
    for (curve, pts) in own.iter().zip(points) {
        let (t0, t1) = curve.domain();
        for w in pts.windows(2) {
            let (a, b) = (w[0].param, w[1].param);
            let piece = if a <= t0 && b >= t1 {
                curve.clone()
            } else {
                match curve.sub_curve(a, b) {
                    Ok(c) => c,
                    Err(e) => {
                        debug!(error = %e, "skipping loop segment");
                        continue;
                    }
                }
            };
            if is_zero_length(&piece, tol, samples) {
                continue;
            }
            let class = classify_segment(&piece, other, oracle, tol, samples);
            out.push(LoopSegment {
                origin: w[0].origin,
                curve: piece,
                class,
            });
        }
    }
    out
}

fn on_loop(p: &Point2d, curves: &[Curve2d], oracle: &dyn GeometryOracle, tol: f64) -> bool {
    curves.iter().any(|c| oracle.point_curve(p, c, tol).is_some())
}

fn classify_segment(
    seg: &Curve2d,
    other: &[Curve2d],
    oracle: &dyn GeometryOracle,
    tol: f64,
    samples: usize,
) -> SegmentClass {
    let (t0, t1) = seg.domain();
    let probe = [0.5, 0.25, 0.75]
        .into_iter()
        .map(|f| seg.point_at(t0 + (t1 - t0) * f))
        .find(|p| !on_loop(p, other, oracle, tol));
    match probe {
        None => SegmentClass::Boundary,
        Some(p) => match point_in_loop(&p, other, tol, samples) {
            Containment::Inside => SegmentClass::Inside,
            _ => SegmentClass::Outside,
        },
    }
}

/// Whether `a` runs over the same points as `b`, in the same direction or,
/// with `reversed`, the opposite one.
fn same_course(a: &Curve2d, b: &Curve2d, reversed: bool, oracle: &dyn GeometryOracle, tol: f64) -> bool {
    let (bs, be) = if reversed { (b.end(), b.start()) } else { (b.start(), b.end()) };
    a.start().distance_to(&bs) <= tol
        && a.end().distance_to(&be) <= tol
        && oracle.point_curve(&a.midpoint(), b, tol).is_some()
}

/// Selected segments with duplicate removal and reverse cancellation.
struct SegmentSet<'a> {
    curves: Vec<Curve2d>,
    oracle: &'a dyn GeometryOracle,
    tol: f64,
}

impl<'a> SegmentSet<'a> {
    fn new(oracle: &'a dyn GeometryOracle, tol: f64) -> Self {
        Self {
            curves: Vec::new(),
            oracle,
            tol,
        }
    }

    fn insert(&mut self, seg: Curve2d) {
        if self
            .curves
            .iter()
            .any(|c| same_course(&seg, c, false, self.oracle, self.tol))
        {
            return;
        }
        if let Some(i) = self
            .curves
            .iter()
            .position(|c| same_course(&seg, c, true, self.oracle, self.tol))
        {
            self.curves.swap_remove(i);
            return;
        }
        self.curves.push(seg);
    }

    fn extend(&mut self, segs: Vec<Curve2d>) {
        for s in segs {
            self.insert(s);
        }
    }

    fn into_curves(self) -> Vec<Curve2d> {
        self.curves
    }
}

/// Signed turn from direction `a` to direction `b`, in `(-π, π]`.
fn turn_angle(a: Point2d, b: Point2d) -> f64 {
    a.cross(&b).atan2(a.dot(&b))
}

/// Chain segments end to start into closed loops. At a vertex with several
/// continuations the leftmost turn is taken, which keeps regions that touch
/// at a single point in separate loops. Chains that cannot be closed are
/// dropped.
pub fn chain_segments(segs: Vec<Curve2d>, tol: f64) -> Vec<Vec<Curve2d>> {
    let mut used = vec![false; segs.len()];
    let mut loops = Vec::new();
    for first in 0..segs.len() {
        if used[first] {
            continue;
        }
        used[first] = true;
        let origin = segs[first].start();
        let mut chain = vec![segs[first].clone()];
        loop {
            let Some(last) = chain.last() else { break };
            let end = last.end();
            if end.distance_to(&origin) <= tol {
                loops.push(chain);
                break;
            }
            let incoming = last.tangent_at(last.domain().1);
            let next = (0..segs.len())
                .filter(|&k| !used[k] && segs[k].start().distance_to(&end) <= tol)
                .max_by(|&x, &y| {
                    let tx = turn_angle(incoming, segs[x].tangent_at(segs[x].domain().0));
                    let ty = turn_angle(incoming, segs[y].tangent_at(segs[y].domain().0));
                    tx.total_cmp(&ty)
                });
            match next {
                Some(k) => {
                    used[k] = true;
                    chain.push(segs[k].clone());
                }
                None => {
                    warn!(segments = chain.len(), "could not close segment chain; dropped");
                    break;
                }
            }
        }
    }
    loops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::membership::tests::{polygon, rect};
    use crate::geometry::oracle::NumericOracle;

    const TOL: f64 = 1e-9;

    fn run(a: &[Curve2d], b: &[Curve2d], op: LoopOp) -> LoopBooleanResult {
        loop_boolean(a, b, op, &NumericOracle::default(), TOL, 16)
    }

    fn total_area(r: &LoopBooleanResult) -> f64 {
        r.outers.iter().chain(&r.inners).map(|l| signed_area(l, 16)).sum()
    }

    fn assert_closed(r: &LoopBooleanResult) {
        for l in r.outers.iter().chain(&r.inners) {
            assert!(validate_loop(l, TOL).is_ok(), "emitted loop is not closed and continuous");
        }
    }

    #[test]
    fn test_identical_loops() {
        let sq = rect(0.0, 0.0, 1.0, 1.0);
        let u = run(&sq, &sq, LoopOp::Union);
        assert_eq!(u.outers.len(), 1);
        assert!((total_area(&u) - 1.0).abs() < 1e-12);
        let i = run(&sq, &sq, LoopOp::Intersect);
        assert_eq!(i.outers.len(), 1);
        assert!((total_area(&i) - 1.0).abs() < 1e-12);
        let d = run(&sq, &sq, LoopOp::Difference);
        assert!(d.outers.is_empty(), "difference of a loop with itself is empty");
    }

    #[test]
    fn test_overlapping_squares() {
        let a = rect(0.0, 0.0, 2.0, 2.0);
        let b = rect(1.0, 1.0, 3.0, 3.0);
        let u = run(&a, &b, LoopOp::Union);
        assert_eq!(u.outers.len(), 1);
        assert!((total_area(&u) - 7.0).abs() < 1e-9, "union area {}", total_area(&u));
        let i = run(&a, &b, LoopOp::Intersect);
        assert_eq!(i.outers.len(), 1);
        assert!((total_area(&i) - 1.0).abs() < 1e-9, "intersection area {}", total_area(&i));
        let d = run(&a, &b, LoopOp::Difference);
        assert_eq!(d.outers.len(), 1);
        assert!((total_area(&d) - 3.0).abs() < 1e-9, "difference area {}", total_area(&d));
        for r in [&u, &i, &d] {
            assert_closed(r);
        }
    }

    #[test]
    fn test_abutting_squares_union_removes_shared_wall() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0, 0.0, 2.0, 1.0);
        let u = run(&a, &b, LoopOp::Union);
        assert_eq!(u.outers.len(), 1, "abutting squares merge into one loop");
        assert!((total_area(&u) - 2.0).abs() < 1e-12);
        assert!(
            u.outers[0].iter().all(|c| (c.start().x - 1.0).abs() > TOL || (c.end().x - 1.0).abs() > TOL),
            "no trim runs along the shared wall"
        );
        let i = run(&a, &b, LoopOp::Intersect);
        assert!(i.outers.is_empty(), "abutting squares share no area");
    }

    #[test]
    fn test_nested_difference_gives_a_hole() {
        let outer = rect(0.0, 0.0, 4.0, 4.0);
        let inner = rect(1.0, 1.0, 2.0, 2.0);
        let d = run(&outer, &inner, LoopOp::Difference);
        assert_eq!(d.outers.len(), 1);
        assert_eq!(d.inners.len(), 1);
        assert!(signed_area(&d.inners[0], 16) < 0.0, "hole winds clockwise");
        let regions = d.into_regions(TOL, 16);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].inners.len(), 1);
    }

    #[test]
    fn test_disjoint_loops() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(3.0, 0.0, 4.0, 1.0);
        assert_eq!(run(&a, &b, LoopOp::Union).outers.len(), 2);
        assert!(run(&a, &b, LoopOp::Intersect).is_empty());
        let d = run(&a, &b, LoopOp::Difference);
        assert_eq!(d.outers.len(), 1);
        assert!((total_area(&d) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_clockwise_input_is_standardized() {
        let a = reverse_loop(&rect(0.0, 0.0, 2.0, 2.0));
        let b = reverse_loop(&rect(1.0, 1.0, 3.0, 3.0));
        let u = run(&a, &b, LoopOp::Union);
        assert_eq!(u.outers.len(), 1);
        assert!((total_area(&u) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_corner_touching_squares_stay_separate() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0, 1.0, 2.0, 2.0);
        let u = run(&a, &b, LoopOp::Union);
        assert_eq!(u.outers.len(), 2, "a shared corner does not fuse the loops");
        assert_closed(&u);
    }

    #[test]
    fn test_zero_area_input_gives_empty_result() {
        let sliver = polygon(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let sq = rect(0.0, 0.0, 1.0, 1.0);
        assert!(run(&sliver, &sq, LoopOp::Union).is_empty());
    }
}
