use std::collections::HashMap;

use thiserror::Error;
use tracing::{info, instrument};

use super::brep::{EdgeId, FaceId, LoopId, LoopKind, Solid};
use crate::boolean::membership::signed_area;
use crate::Tolerance;

/// Topological checks of a finished solid. Failures are reported, never
/// repaired.
#[derive(Debug, Clone, Default)]
pub struct SolidAudit {
    pub all_loops_closed: bool,
    pub all_loops_oriented: bool,
    pub all_edges_two_trimmed: bool,
    pub euler_valid: bool,
    pub errors: Vec<AuditError>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuditError {
    #[error("loop {loop_id:?} does not close (gap {gap:e})")]
    OpenLoop { loop_id: LoopId, gap: f64 },

    #[error("loop {loop_id:?} breaks after trim {index} (gap {gap:e})")]
    Discontinuous { loop_id: LoopId, index: usize, gap: f64 },

    #[error("{kind:?} loop {loop_id:?} winds the wrong way (area {area:e})")]
    LoopOrientation { loop_id: LoopId, kind: LoopKind, area: f64 },

    #[error("edge {edge:?} is used by {uses} trims")]
    EdgeUse { edge: EdgeId, uses: usize },

    #[error("V - E + F - H = {v} - {e} + {f} - {h} = {actual}, expected {expected} less an even genus term")]
    Euler {
        v: usize,
        e: usize,
        f: usize,
        h: usize,
        expected: i64,
        actual: i64,
    },
}

impl SolidAudit {
    #[instrument(skip(solid, tol), fields(faces = solid.face_count()))]
    pub fn run(solid: &Solid, tol: &Tolerance, samples: usize) -> Self {
        let mut audit = SolidAudit::default();
        audit.check_loops(solid, tol, samples);
        audit.check_edges(solid);
        audit.check_euler(solid);

        audit.all_loops_closed = !audit
            .errors
            .iter()
            .any(|e| matches!(e, AuditError::OpenLoop { .. } | AuditError::Discontinuous { .. }));
        audit.all_loops_oriented = !audit.errors.iter().any(|e| matches!(e, AuditError::LoopOrientation { .. }));
        audit.all_edges_two_trimmed = !audit.errors.iter().any(|e| matches!(e, AuditError::EdgeUse { .. }));
        audit.euler_valid = !audit.errors.iter().any(|e| matches!(e, AuditError::Euler { .. }));

        info!(
            loops_closed = audit.all_loops_closed,
            loops_oriented = audit.all_loops_oriented,
            edges_two_trimmed = audit.all_edges_two_trimmed,
            euler_valid = audit.euler_valid,
            error_count = audit.errors.len(),
            "solid audit complete"
        );
        audit
    }

    pub fn all_valid(&self) -> bool {
        self.all_loops_closed && self.all_loops_oriented && self.all_edges_two_trimmed && self.euler_valid
    }

    fn check_loops(&mut self, solid: &Solid, tol: &Tolerance, samples: usize) {
        for (loop_id, lp) in &solid.loops {
            let curves = solid.loop_curves(loop_id);
            for (index, w) in curves.windows(2).enumerate() {
                let gap = w[0].end().distance_to(&w[1].start());
                if gap > tol.parametric {
                    self.errors.push(AuditError::Discontinuous { loop_id, index, gap });
                }
            }
            if let (Some(first), Some(last)) = (curves.first(), curves.last()) {
                let gap = last.end().distance_to(&first.start());
                if gap > tol.parametric {
                    self.errors.push(AuditError::OpenLoop { loop_id, gap });
                }
            }
            let area = signed_area(&curves, samples);
            let wrong = match lp.kind {
                LoopKind::Outer => area <= 0.0,
                LoopKind::Inner => area >= 0.0,
            };
            if wrong {
                self.errors.push(AuditError::LoopOrientation { loop_id, kind: lp.kind, area });
            }
        }
    }

    fn check_edges(&mut self, solid: &Solid) {
        for (edge, e) in &solid.edges {
            if e.trims.len() != 2 {
                self.errors.push(AuditError::EdgeUse { edge, uses: e.trims.len() });
            }
        }
    }

    /// Euler-Poincaré: `V - E + F - H = 2 (S - G)` for `S` shells of total
    /// genus `G`, so the sum may fall below `2 S` by an even amount.
    fn check_euler(&mut self, solid: &Solid) {
        let (v, e, f) = (solid.vertices.len(), solid.edges.len(), solid.face_count());
        if f == 0 {
            return;
        }
        let h: usize = solid.faces.values().map(|face| face.inners.len()).sum();
        let expected = 2 * shell_count(solid) as i64;
        let actual = v as i64 - e as i64 + f as i64 - h as i64;
        let genus_twice = expected - actual;
        if genus_twice < 0 || genus_twice % 2 != 0 {
            self.errors.push(AuditError::Euler { v, e, f, h, expected, actual });
        }
    }
}

/// Connected components of faces joined through shared edges.
fn shell_count(solid: &Solid) -> usize {
    let index: HashMap<FaceId, usize> = solid.face_ids().enumerate().map(|(i, f)| (f, i)).collect();
    let mut parent: Vec<usize> = (0..index.len()).collect();
    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    for edge in solid.edges.values() {
        let faces: Vec<usize> = edge
            .trims
            .iter()
            .filter_map(|&t| index.get(&solid.loops[solid.trims[t].loop_id].face).copied())
            .collect();
        for w in faces.windows(2) {
            let (a, b) = (root(&mut parent, w[0]), root(&mut parent, w[1]));
            parent[a] = b;
        }
    }
    (0..parent.len()).filter(|&i| root(&mut parent, i) == i).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::boolean::{evaluate, BooleanOp};
    use crate::topology::primitives::{make_box, make_sphere};

    #[test]
    fn test_box_passes_audit() {
        let mut solid = Solid::new();
        make_box(&mut solid, Point3d::ORIGIN, Point3d::new(1.0, 2.0, 3.0)).unwrap();
        let audit = SolidAudit::run(&solid, &Tolerance::default(), 8);
        assert!(audit.all_valid(), "box audit errors: {:?}", audit.errors);
    }

    #[test]
    fn test_sphere_passes_audit() {
        let mut solid = Solid::new();
        make_sphere(&mut solid, Point3d::ORIGIN, 2.0).unwrap();
        let audit = SolidAudit::run(&solid, &Tolerance::default(), 8);
        assert!(audit.all_valid(), "sphere audit errors: {:?}", audit.errors);
    }

    #[test]
    fn test_two_shells_are_counted() {
        let mut solid = Solid::new();
        make_box(&mut solid, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        make_box(&mut solid, Point3d::new(3.0, 0.0, 0.0), Point3d::new(4.0, 1.0, 1.0)).unwrap();
        assert_eq!(shell_count(&solid), 2);
        assert!(SolidAudit::run(&solid, &Tolerance::default(), 8).euler_valid);
    }

    #[test]
    fn test_through_hole_has_genus_one() {
        let mut plate = Solid::new();
        make_box(&mut plate, Point3d::ORIGIN, Point3d::new(3.0, 3.0, 1.0)).unwrap();
        let mut drill = Solid::new();
        make_box(&mut drill, Point3d::new(1.0, 1.0, -1.0), Point3d::new(2.0, 2.0, 2.0)).unwrap();
        let mut out = Solid::new();
        assert_eq!(evaluate(&mut out, &plate, &drill, BooleanOp::Difference), 0);
        assert_eq!(out.face_count(), 10);

        let audit = SolidAudit::run(&out, &Tolerance::default(), 8);
        assert!(audit.all_valid(), "audit errors: {:?}", audit.errors);
        let h: usize = out.faces.values().map(|f| f.inners.len()).sum();
        let chi = out.vertices.len() as i64 - out.edges.len() as i64 + out.face_count() as i64 - h as i64;
        assert_eq!(chi, 0, "one shell of genus one");
    }

    #[test]
    fn test_missing_face_is_reported() {
        let mut solid = Solid::new();
        let faces = make_box(&mut solid, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let mut open = Solid::new();
        let tol = Tolerance::default();
        for &face in &faces[1..] {
            let (outer, inners) = solid.face_loops(face);
            let surface = open.add_surface(solid.face_surface(face).clone());
            open.add_face_from_loops(surface, &outer, &inners, false, &tol).unwrap();
        }
        let audit = SolidAudit::run(&open, &tol, 8);
        assert!(!audit.all_edges_two_trimmed);
        let border = audit.errors.iter().filter(|e| matches!(e, AuditError::EdgeUse { uses: 1, .. })).count();
        assert_eq!(border, 4, "the missing face leaves four border edges");
        assert!(!audit.euler_valid, "V - E + F = 1 is odd");
    }

    #[test]
    fn test_reversed_outer_loop_is_reported() {
        let mut solid = Solid::new();
        let faces = make_box(&mut solid, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let outer = solid.faces[faces[0]].outer;
        solid.reverse_loop(outer);
        let audit = SolidAudit::run(&solid, &Tolerance::default(), 8);
        assert!(!audit.all_loops_oriented);
        assert!(audit.all_loops_closed);
    }
}
