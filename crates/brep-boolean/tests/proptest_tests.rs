//! Property-based tests for Boolean engine invariants using the `proptest` crate.

use proptest::prelude::*;

use brep_boolean::boolean::classify::interior_point;
use brep_boolean::boolean::linker::LinkedCurve;
use brep_boolean::boolean::loop_boolean::{loop_boolean, LoopOp};
use brep_boolean::boolean::membership::{point_in_loop, signed_area, Containment};
use brep_boolean::boolean::split::{split_face, SplitContext};
use brep_boolean::boolean::trimmed_face::{Operand, TrimmedFace};
use brep_boolean::geometry::curves::Curve2d;
use brep_boolean::geometry::point::{Point2d, Point3d};
use brep_boolean::geometry::vector::Vec3;
use brep_boolean::topology::audit::SolidAudit;
use brep_boolean::topology::brep::Solid;
use brep_boolean::topology::primitives::make_box;
use brep_boolean::topology::volume::enclosed_volume;
use brep_boolean::{evaluate, BooleanOp, NumericOracle, Tolerance};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

/// Arbitrary 3D coordinate tuple in a reasonable floating-point range.
fn arb_point() -> impl Strategy<Value = (f64, f64, f64)> {
    (-1000.0f64..1000.0, -1000.0f64..1000.0, -1000.0f64..1000.0)
}

/// Arbitrary positive dimension suitable for box extents (avoids degenerate zero-size).
fn arb_positive_dim() -> impl Strategy<Value = f64> {
    0.1f64..1000.0
}

/// Axis-aligned rectangle `(x0, y0, x1, y1)` in a 10 × 10 window.
fn arb_rect() -> impl Strategy<Value = (f64, f64, f64, f64)> {
    (0.0f64..10.0, 0.0f64..10.0, 0.5f64..5.0, 0.5f64..5.0).prop_map(|(x, y, w, h)| (x, y, x + w, y + h))
}

fn rect_loop((x0, y0, x1, y1): (f64, f64, f64, f64)) -> Vec<Curve2d> {
    let pts = [
        Point2d::new(x0, y0),
        Point2d::new(x1, y0),
        Point2d::new(x1, y1),
        Point2d::new(x0, y1),
    ];
    (0..4).map(|i| Curve2d::line(pts[i], pts[(i + 1) % 4])).collect()
}

fn rect_area((x0, y0, x1, y1): (f64, f64, f64, f64)) -> f64 {
    (x1 - x0) * (y1 - y0)
}

fn result_area(outers: &[Vec<Curve2d>], inners: &[Vec<Curve2d>]) -> f64 {
    outers.iter().chain(inners).map(|l| signed_area(l, 8)).sum()
}

const TOL: f64 = 1e-6;

// ---------------------------------------------------------------------------
// 1. Point distance symmetry: distance(a, b) == distance(b, a)
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn point_distance_symmetry(
        (ax, ay, az) in arb_point(),
        (bx, by, bz) in arb_point(),
    ) {
        let a = Point3d::new(ax, ay, az);
        let b = Point3d::new(bx, by, bz);
        let d_ab = a.distance_to(&b);
        let d_ba = b.distance_to(&a);
        prop_assert!((d_ab - d_ba).abs() < TOL,
            "distance(a,b)={} != distance(b,a)={}", d_ab, d_ba);
    }
}

// ---------------------------------------------------------------------------
// 2. Perpendicular helper: any_perpendicular(n) is a unit vector normal to n
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn any_perpendicular_is_unit_and_normal(
        (x, y, z) in arb_point(),
    ) {
        let n = Vec3::new(x, y, z);
        prop_assume!(n.length() > 1e-3);
        let p = n.any_perpendicular();
        prop_assert!((p.length() - 1.0).abs() < 1e-12, "length {}", p.length());
        prop_assert!(p.dot(&n).abs() < 1e-9 * n.length(), "dot {}", p.dot(&n));
    }
}

// ---------------------------------------------------------------------------
// 3. Box topology and volume: V - E + F = 2 and volume = dx * dy * dz
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn box_is_closed_and_measures_its_extent(
        (ox, oy, oz) in arb_point(),
        dx in arb_positive_dim(),
        dy in arb_positive_dim(),
        dz in arb_positive_dim(),
    ) {
        let mut solid = Solid::new();
        make_box(&mut solid, Point3d::new(ox, oy, oz), Point3d::new(ox + dx, oy + dy, oz + dz))
            .expect("box");

        let (v, e, f) = (solid.vertices.len(), solid.edges.len(), solid.face_count());
        prop_assert_eq!(v, 8, "expected 8 vertices, got {}", v);
        prop_assert_eq!(e, 12, "expected 12 edges, got {}", e);
        prop_assert_eq!(f, 6, "expected 6 faces, got {}", f);

        let audit = SolidAudit::run(&solid, &Tolerance::default(), 8);
        prop_assert!(audit.all_valid(), "audit errors: {:?}", audit.errors);

        let expected = dx * dy * dz;
        let volume = enclosed_volume(&solid, 4, 8);
        prop_assert!((volume - expected).abs() <= 1e-9 * expected.max(1.0) * 1e3,
            "volume {} != {}", volume, expected);
    }
}

// ---------------------------------------------------------------------------
// 4. Loop Booleans conserve area: |A ∪ B| + |A ∩ B| = |A| + |B|
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn loop_union_and_intersection_conserve_area(
        a in arb_rect(),
        b in arb_rect(),
    ) {
        let oracle = NumericOracle::default();
        let (la, lb) = (rect_loop(a), rect_loop(b));
        let union = loop_boolean(&la, &lb, LoopOp::Union, &oracle, 1e-9, 8);
        let inter = loop_boolean(&la, &lb, LoopOp::Intersect, &oracle, 1e-9, 8);
        let total = result_area(&union.outers, &union.inners) + result_area(&inter.outers, &inter.inners);
        let expected = rect_area(a) + rect_area(b);
        prop_assert!((total - expected).abs() < TOL, "areas {} != {}", total, expected);
    }
}

// ---------------------------------------------------------------------------
// 5. Difference and intersection partition the first loop
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn loop_difference_complements_intersection(
        a in arb_rect(),
        b in arb_rect(),
    ) {
        let oracle = NumericOracle::default();
        let (la, lb) = (rect_loop(a), rect_loop(b));
        let diff = loop_boolean(&la, &lb, LoopOp::Difference, &oracle, 1e-9, 8);
        let inter = loop_boolean(&la, &lb, LoopOp::Intersect, &oracle, 1e-9, 8);
        let total = result_area(&diff.outers, &diff.inners) + result_area(&inter.outers, &inter.inners);
        prop_assert!((total - rect_area(a)).abs() < TOL, "areas {} != {}", total, rect_area(a));
        for outer in &diff.outers {
            prop_assert!(signed_area(outer, 8) > 0.0, "outer loops wind counter-clockwise");
        }
    }
}

// ---------------------------------------------------------------------------
// 6. A straight cut splits a face into two pieces that cover it exactly
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn straight_cut_preserves_area(
        r in arb_rect(),
        frac in 0.05f64..0.95,
    ) {
        let oracle = NumericOracle::default();
        let ctx = SplitContext { oracle: &oracle, tol: 1e-9, samples: 8 };
        let x = r.0 + frac * (r.2 - r.0);
        let cut = LinkedCurve::single(Curve2d::line(Point2d::new(x, r.1 - 1.0), Point2d::new(x, r.3 + 1.0)));
        let face = TrimmedFace::new(0, Operand::A, rect_loop(r), Vec::new());
        let pieces = split_face(&face, &[cut], ctx);
        prop_assert_eq!(pieces.len(), 2);
        let total: f64 = pieces.iter().map(|p| p.area(8)).sum();
        prop_assert!((total - rect_area(r)).abs() < TOL, "areas {} != {}", total, rect_area(r));
    }
}

// ---------------------------------------------------------------------------
// 7. Interior points are strictly inside their loop
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn interior_point_is_inside(
        r in arb_rect(),
    ) {
        let l = rect_loop(r);
        let p = interior_point(&l, &[], 8, 1e-9, 8).expect("interior point");
        prop_assert_eq!(point_in_loop(&p, &l, 1e-9, 8), Containment::Inside);
    }
}

// ---------------------------------------------------------------------------
// 8. Solid volume identity: vol(A ∪ B) + vol(A ∩ B) = vol(A) + vol(B)
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]
    #[test]
    fn cube_volume_identity(
        dx in 0.1f64..0.9,
        dy in 0.1f64..0.9,
        dz in 0.1f64..0.9,
    ) {
        let mut a = Solid::new();
        make_box(&mut a, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).expect("box a");
        let mut b = Solid::new();
        make_box(&mut b, Point3d::new(dx, dy, dz), Point3d::new(dx + 1.0, dy + 1.0, dz + 1.0)).expect("box b");

        let mut union = Solid::new();
        let mut inter = Solid::new();
        prop_assert_eq!(evaluate(&mut union, &a, &b, BooleanOp::Union), 0);
        prop_assert_eq!(evaluate(&mut inter, &a, &b, BooleanOp::Intersect), 0);

        let total = enclosed_volume(&union, 4, 8) + enclosed_volume(&inter, 4, 8);
        prop_assert!((total - 2.0).abs() < TOL, "vol(A ∪ B) + vol(A ∩ B) = {}", total);
        let expected_inter = (1.0 - dx) * (1.0 - dy) * (1.0 - dz);
        prop_assert!((enclosed_volume(&inter, 4, 8) - expected_inter).abs() < TOL);
    }
}
