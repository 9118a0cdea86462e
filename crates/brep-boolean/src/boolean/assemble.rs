//! Fragment selection and construction of the output solid.

use std::collections::HashMap;

use tracing::{debug, info, instrument, warn};

use crate::config::BooleanConfig;
use crate::error::BooleanError;
use crate::geometry::oracle::GeometryOracle;
use crate::topology::brep::{LoopId, Solid, SurfaceId};

use super::loop_boolean::{loop_boolean, LoopOp};
use super::membership::{loop_bounding_box, signed_area};
use super::trimmed_face::{Membership, Operand, Position, SourceFace, TrimmedFace};
use super::BooleanOp;

/// Counts from one assembly, checked against each other before returning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    pub kept: usize,
    pub merged: usize,
    pub instantiated: usize,
    pub rewound: usize,
}

/// Whether a fragment at `position` survives `op`, and if so whether its
/// orientation flips. `None` drops the fragment.
pub fn keep(op: BooleanOp, operand: Operand, position: Position) -> Option<bool> {
    use BooleanOp::*;
    match (position, op) {
        (Position::Inside, Intersect) => Some(false),
        (Position::Inside, Xor) => Some(true),
        (Position::Inside, Difference) if operand == Operand::B => Some(true),
        (Position::Inside, _) => None,

        (Position::Outside, Union | Xor) => Some(false),
        (Position::Outside, Difference) if operand == Operand::A => Some(false),
        (Position::Outside, _) => None,

        // Coincident faces are only ever kept from the first operand.
        (Position::OnSurface { normals_agree }, Union | Intersect) if operand == Operand::A && normals_agree => {
            Some(false)
        }
        (Position::OnSurface { normals_agree }, Difference) if operand == Operand::A && !normals_agree => {
            Some(false)
        }
        (Position::OnSurface { .. }, _) => None,
    }
}

struct Sources<'a> {
    a: &'a [SourceFace],
    b: &'a [SourceFace],
}

impl Sources<'_> {
    fn of(&self, frag: &TrimmedFace) -> &SourceFace {
        match frag.operand {
            Operand::A => &self.a[frag.source],
            Operand::B => &self.b[frag.source],
        }
    }

    /// Final outward orientation relative to the surface normal.
    fn reversed(&self, frag: &TrimmedFace) -> bool {
        self.of(frag).reversed ^ frag.reversed
    }
}

/// Turn classified fragments into faces of `out`.
#[instrument(skip_all, fields(op = ?op, fragments = fragments.len()))]
pub fn assemble(
    out: &mut Solid,
    mut fragments: Vec<TrimmedFace>,
    sources_a: &[SourceFace],
    sources_b: &[SourceFace],
    op: BooleanOp,
    config: &BooleanConfig,
    oracle: &dyn GeometryOracle,
) -> Result<AssemblyReport, BooleanError> {
    let sources = Sources { a: sources_a, b: sources_b };
    let mut report = AssemblyReport::default();

    for frag in &mut fragments {
        match frag.position.and_then(|p| keep(op, frag.operand, p)) {
            Some(reversed) => {
                frag.membership = Membership::Belongs;
                frag.reversed = reversed;
            }
            None => frag.membership = Membership::Excluded,
        }
    }
    let mut kept: Vec<TrimmedFace> = fragments
        .into_iter()
        .filter(|f| f.membership == Membership::Belongs)
        .collect();
    report.kept = kept.len();

    if config.merge_coplanar_faces {
        report.merged = merge_coplanar(&mut kept, &sources, config, oracle);
    }

    let tol = &config.tolerance;
    let mut surfaces: HashMap<(Operand, usize), SurfaceId> = HashMap::new();
    for frag in &kept {
        let src = sources.of(frag);
        let surface = *surfaces
            .entry((frag.operand, frag.source))
            .or_insert_with(|| out.add_surface(src.surface.clone()));
        match out.add_face_from_loops(surface, &frag.outer, &frag.inners, sources.reversed(frag), tol) {
            Ok(_) => report.instantiated += 1,
            Err(e) => warn!(error = %e, operand = ?frag.operand, source = frag.source, "fragment not instantiated"),
        }
    }

    report.rewound = fix_winding(out, config.flatten_samples);

    if report.kept - report.merged != report.instantiated {
        return Err(BooleanError::GeometryGeneration(format!(
            "kept {} fragments, merged {}, but built {} faces",
            report.kept, report.merged, report.instantiated
        )));
    }
    info!(
        kept = report.kept,
        merged = report.merged,
        faces = report.instantiated,
        "assembled result"
    );
    Ok(report)
}

/// Union kept fragments that share a parametrisation and an orientation
/// whenever the union is a single loop. Returns the number of merges.
fn merge_coplanar(
    kept: &mut Vec<TrimmedFace>,
    sources: &Sources<'_>,
    config: &BooleanConfig,
    oracle: &dyn GeometryOracle,
) -> usize {
    let (ptol, samples) = (config.tolerance.parametric, config.flatten_samples);
    let mut merged = 0;
    'restart: loop {
        for i in 0..kept.len() {
            for j in (i + 1)..kept.len() {
                let (fi, fj) = (&kept[i], &kept[j]);
                if !fi.inners.is_empty() || !fj.inners.is_empty() {
                    continue;
                }
                if sources.reversed(fi) != sources.reversed(fj)
                    || !sources
                        .of(fi)
                        .surface
                        .same_parametrisation(&sources.of(fj).surface, config.tolerance.coincidence)
                {
                    continue;
                }
                if !loop_bounding_box(&fi.outer, samples).intersects(&loop_bounding_box(&fj.outer, samples), ptol) {
                    continue;
                }
                let union = loop_boolean(&fi.outer, &fj.outer, LoopOp::Union, oracle, ptol, samples);
                if union.outers.len() != 1 || !union.inners.is_empty() {
                    continue;
                }
                debug!(i, j, "merging coplanar fragments");
                if let Some(outer) = union.outers.into_iter().next() {
                    kept[i].outer = outer;
                    kept.remove(j);
                    merged += 1;
                    continue 'restart;
                }
            }
        }
        break;
    }
    merged
}

/// Rewind loops whose orientation disagrees with their kind: outer loops
/// counter-clockwise, inner loops clockwise. Returns the number rewound.
fn fix_winding(solid: &mut Solid, samples: usize) -> usize {
    let mut wrong: Vec<LoopId> = Vec::new();
    for face in solid.face_ids() {
        let f = &solid.faces[face];
        if signed_area(&solid.loop_curves(f.outer), samples) < 0.0 {
            wrong.push(f.outer);
        }
        wrong.extend(
            f.inners
                .iter()
                .copied()
                .filter(|&l| signed_area(&solid.loop_curves(l), samples) > 0.0),
        );
    }
    for &l in &wrong {
        solid.reverse_loop(l);
    }
    if !wrong.is_empty() {
        debug!(count = wrong.len(), "rewound loops");
    }
    wrong.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::membership::reverse_loop;
    use crate::geometry::oracle::NumericOracle;
    use crate::geometry::point::{Point2d, Point3d};
    use crate::geometry::vector::Vec3;
    use crate::topology::primitives::make_box;

    fn box_sources(min: Point3d, max: Point3d, operand: Operand) -> Vec<SourceFace> {
        let mut solid = Solid::new();
        make_box(&mut solid, min, max).expect("box");
        SourceFace::collect(&solid, operand)
    }

    fn top_face(sources: &[SourceFace]) -> usize {
        sources
            .iter()
            .position(|s| (s.surface.normal_at(Point2d::ORIGIN) - Vec3::Z).length() < 1e-12)
            .expect("box has a top face")
    }

    fn placed(sources: &[SourceFace], index: usize, position: Position) -> TrimmedFace {
        let mut f = TrimmedFace::from_source(index, &sources[index]);
        f.position = Some(position);
        f
    }

    #[test]
    fn test_keep_table() {
        use BooleanOp::*;
        let on = |agree| Position::OnSurface { normals_agree: agree };
        assert_eq!(keep(Union, Operand::A, Position::Outside), Some(false));
        assert_eq!(keep(Union, Operand::B, Position::Inside), None);
        assert_eq!(keep(Intersect, Operand::B, Position::Inside), Some(false));
        assert_eq!(keep(Difference, Operand::A, Position::Inside), None);
        assert_eq!(keep(Difference, Operand::B, Position::Inside), Some(true));
        assert_eq!(keep(Difference, Operand::B, Position::Outside), None);
        assert_eq!(keep(Xor, Operand::A, Position::Inside), Some(true));
        assert_eq!(keep(Xor, Operand::B, Position::Outside), Some(false));
        assert_eq!(keep(Union, Operand::A, on(true)), Some(false));
        assert_eq!(keep(Union, Operand::B, on(true)), None, "coincident faces come from a only");
        assert_eq!(keep(Union, Operand::A, on(false)), None);
        assert_eq!(keep(Difference, Operand::A, on(false)), Some(false));
        assert_eq!(keep(Difference, Operand::A, on(true)), None);
        assert_eq!(keep(Xor, Operand::A, on(true)), None);
    }

    #[test]
    fn test_coplanar_fragments_merge() {
        let a = box_sources(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0), Operand::A);
        let b = box_sources(Point3d::new(1.0, 0.0, 0.0), Point3d::new(2.0, 1.0, 1.0), Operand::B);
        let frags = vec![placed(&a, top_face(&a), Position::Outside), placed(&b, top_face(&b), Position::Outside)];

        let mut out = Solid::new();
        let report = assemble(
            &mut out,
            frags,
            &a,
            &b,
            BooleanOp::Union,
            &BooleanConfig::default(),
            &NumericOracle::default(),
        )
        .expect("assembly");
        assert_eq!(report.kept, 2);
        assert_eq!(report.merged, 1);
        assert_eq!(out.face_count(), 1, "the two tops join into one face");
        let face = out.face_ids().next().expect("one face");
        let area = signed_area(&out.loop_curves(out.faces[face].outer), 8);
        assert!((area - 2.0).abs() < 1e-9, "merged area {}", area);
    }

    #[test]
    fn test_merging_can_be_disabled() {
        let a = box_sources(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0), Operand::A);
        let b = box_sources(Point3d::new(1.0, 0.0, 0.0), Point3d::new(2.0, 1.0, 1.0), Operand::B);
        let frags = vec![placed(&a, top_face(&a), Position::Outside), placed(&b, top_face(&b), Position::Outside)];
        let config = BooleanConfig {
            merge_coplanar_faces: false,
            ..BooleanConfig::default()
        };
        let mut out = Solid::new();
        let report = assemble(&mut out, frags, &a, &b, BooleanOp::Union, &config, &NumericOracle::default())
            .expect("assembly");
        assert_eq!(report.merged, 0);
        assert_eq!(out.face_count(), 2);
    }

    #[test]
    fn test_difference_flips_faces_of_b() {
        let a = box_sources(Point3d::ORIGIN, Point3d::new(3.0, 3.0, 3.0), Operand::A);
        let b = box_sources(Point3d::new(1.0, 1.0, 1.0), Point3d::new(2.0, 2.0, 2.0), Operand::B);
        let top = top_face(&b);
        let frags = vec![placed(&b, top, Position::Inside), placed(&a, 0, Position::Inside)];
        let mut out = Solid::new();
        let report = assemble(
            &mut out,
            frags,
            &a,
            &b,
            BooleanOp::Difference,
            &BooleanConfig::default(),
            &NumericOracle::default(),
        )
        .expect("assembly");
        assert_eq!(report.kept, 1, "inside faces of a are dropped");
        let face = out.face_ids().next().expect("one face");
        assert!(out.faces[face].reversed, "cavity wall faces into the hole");
        assert!(
            out.face_normal_at(face, Point2d::ORIGIN).dot(&Vec3::Z) < 0.0,
            "the top of the cavity points down"
        );
    }

    #[test]
    fn test_winding_is_repaired() {
        let a = box_sources(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0), Operand::A);
        let mut frag = placed(&a, 0, Position::Outside);
        frag.outer = reverse_loop(&frag.outer);
        let mut out = Solid::new();
        let report = assemble(
            &mut out,
            vec![frag],
            &a,
            &[],
            BooleanOp::Union,
            &BooleanConfig::default(),
            &NumericOracle::default(),
        )
        .expect("assembly");
        assert_eq!(report.rewound, 1);
        let face = out.face_ids().next().expect("one face");
        assert!(signed_area(&out.loop_curves(out.faces[face].outer), 8) > 0.0);
    }
}
