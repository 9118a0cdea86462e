//! The evaluation pipeline: intersect, link, split, classify, assemble.

use tracing::{debug, info, instrument, warn};

use crate::config::BooleanConfig;
use crate::error::BooleanError;
use crate::geometry::curves::{Curve2d, Curve3d};
use crate::geometry::oracle::{CurveEvent, CurveSurfaceEvent, GeometryOracle, SsiCurve, SurfaceEvent};
use crate::geometry::point::{Point2d, Point3d};
use crate::geometry::surfaces::Surface;
use crate::topology::audit::SolidAudit;
use crate::topology::brep::Solid;

use super::assemble::{assemble, AssemblyReport};
use super::classify::{classify_fragment, ClassifyContext};
use super::linker::{link_curves, LinkedCurve};
use super::membership::{point_in_region, validate_loop};
use super::split::{split_face, SplitContext};
use super::trimmed_face::{Operand, SourceFace, TrimmedFace};
use super::BooleanOp;

/// Run `op` on `a` and `b`, writing the result into `out`, which must be
/// empty.
#[instrument(skip_all, fields(op = ?op, faces_a = a.face_count(), faces_b = b.face_count()))]
pub fn run(
    out: &mut Solid,
    a: &Solid,
    b: &Solid,
    op: BooleanOp,
    config: &BooleanConfig,
    oracle: &dyn GeometryOracle,
) -> Result<AssemblyReport, BooleanError> {
    let tol = &config.tolerance;
    let (bb_a, bb_b) = (a.bounding_box(), b.bounding_box());
    if a.is_empty() || b.is_empty() || !bb_a.intersects(&bb_b, tol.coincidence) {
        return disjoint(out, a, b, op, config);
    }

    let sources_a = usable_faces(SourceFace::collect(a, Operand::A), tol.parametric);
    let sources_b = usable_faces(SourceFace::collect(b, Operand::B), tol.parametric);

    let (raw_a, raw_b) = intersect_faces(&sources_a, &sources_b, config, oracle);

    let split_ctx = SplitContext {
        oracle,
        tol: tol.parametric,
        samples: config.flatten_samples,
    };
    let mut fragments = Vec::new();
    for (sources, raw) in [(&sources_a, raw_a), (&sources_b, raw_b)] {
        for (index, (src, curves)) in sources.iter().zip(raw).enumerate() {
            let face = TrimmedFace::from_source(index, src);
            if curves.is_empty() {
                fragments.push(face);
                continue;
            }
            let linked = link_curves(
                curves.into_iter().map(LinkedCurve::single).collect(),
                oracle,
                tol.parametric,
                config.flatten_samples,
            );
            fragments.extend(split_face(&face, &linked, split_ctx));
        }
    }
    debug!(fragments = fragments.len(), "faces split");

    let classify_ctx = ClassifyContext {
        oracle,
        tolerance: *tol,
        max_depth: config.max_grid_depth,
        samples: config.flatten_samples,
    };
    for frag in &mut fragments {
        let (own, others, other_bb) = match frag.operand {
            Operand::A => (&sources_a[frag.source], sources_b.as_slice(), &bb_b),
            Operand::B => (&sources_b[frag.source], sources_a.as_slice(), &bb_a),
        };
        match classify_fragment(frag, own, others, other_bb, &classify_ctx) {
            Ok(position) => frag.position = Some(position),
            Err(e) => warn!(error = %e, operand = ?frag.operand, source = frag.source, "fragment not classified; dropped"),
        }
    }

    let report = assemble(out, fragments, &sources_a, &sources_b, op, config, oracle)?;

    let audit = SolidAudit::run(out, tol, config.flatten_samples);
    if audit.all_valid() {
        debug!("result passed topology audit");
    } else {
        warn!(issues = audit.errors.len(), "result failed topology audit");
        for issue in &audit.errors {
            debug!(%issue, "audit");
        }
    }
    Ok(report)
}

/// Operands whose boxes do not meet: the result is a copy of one or both.
fn disjoint(
    out: &mut Solid,
    a: &Solid,
    b: &Solid,
    op: BooleanOp,
    config: &BooleanConfig,
) -> Result<AssemblyReport, BooleanError> {
    info!("operands do not overlap");
    let tol = &config.tolerance;
    match op {
        BooleanOp::Union | BooleanOp::Xor => {
            out.append(a, tol)?;
            out.append(b, tol)?;
        }
        BooleanOp::Difference => out.append(a, tol)?,
        BooleanOp::Intersect => {}
    }
    let faces = out.face_count();
    Ok(AssemblyReport {
        kept: faces,
        instantiated: faces,
        ..AssemblyReport::default()
    })
}

/// Drop faces whose loops are not closed.
fn usable_faces(sources: Vec<SourceFace>, tol: f64) -> Vec<SourceFace> {
    sources
        .into_iter()
        .filter(|s| {
            let check = std::iter::once(&s.outer)
                .chain(s.inners.iter())
                .try_for_each(|l| validate_loop(l, tol));
            if let Err(e) = &check {
                warn!(error = %e, operand = ?s.operand, "skipping face with invalid loop");
            }
            check.is_ok()
        })
        .collect()
}

/// Intersection curves of every face pair, clipped to both faces, in each
/// face's parameter space. Indexed like the source lists.
fn intersect_faces(
    sources_a: &[SourceFace],
    sources_b: &[SourceFace],
    config: &BooleanConfig,
    oracle: &dyn GeometryOracle,
) -> (Vec<Vec<Curve2d>>, Vec<Vec<Curve2d>>) {
    let tol = config.tolerance.coincidence;
    let mut raw_a = vec![Vec::new(); sources_a.len()];
    let mut raw_b = vec![Vec::new(); sources_b.len()];
    for (i, fa) in sources_a.iter().enumerate() {
        for (j, fb) in sources_b.iter().enumerate() {
            if !fa.bbox.intersects(&fb.bbox, tol) {
                continue;
            }
            if fa.surface.same_parametrisation(&fb.surface, tol) {
                continue;
            }
            let margin = 1e-3 * fa.bbox.diagonal().max(fb.bbox.diagonal()) + tol;
            let region = fa.bbox.intersection(&fb.bbox).expanded(margin);
            for event in oracle.surface_surface(&fa.surface, &fb.surface, &region, tol) {
                match event {
                    SurfaceEvent::Transverse(ssi) => {
                        for (ca, cb) in clip_to_faces(&ssi, fa, fb, config, oracle) {
                            raw_a[i].push(ca);
                            raw_b[j].push(cb);
                        }
                    }
                    SurfaceEvent::Tangent { point, .. } => {
                        debug!(a = i, b = j, ?point, "surfaces touch at a point")
                    }
                    SurfaceEvent::Overlap => debug!(a = i, b = j, "coincident surfaces"),
                }
            }
        }
    }
    let total: usize = raw_a.iter().map(Vec::len).sum();
    debug!(curves = total, "surface intersections clipped");
    (raw_a, raw_b)
}

/// A parameter where an intersection branch is cut, with the model-space
/// point of the trim crossing when it is known exactly.
#[derive(Debug, Clone, Copy)]
struct Cut {
    t: f64,
    point: Option<Point3d>,
}

impl Cut {
    fn at(t: f64) -> Self {
        Self { t, point: None }
    }
}

/// Pieces of an intersection branch that lie on both faces. Piece ends that
/// cross a straight trim are moved onto the exact crossing of that edge with
/// the other surface, so pieces clipped by neighbouring faces meet.
fn clip_to_faces(
    ssi: &SsiCurve,
    fa: &SourceFace,
    fb: &SourceFace,
    config: &BooleanConfig,
    oracle: &dyn GeometryOracle,
) -> Vec<(Curve2d, Curve2d)> {
    let (ptol, tol, samples) = (
        config.tolerance.parametric,
        config.tolerance.coincidence,
        config.flatten_samples,
    );
    let reach = SNAP_REACH * ssi.curve.approximate_length(samples) + tol;
    let (t0, t1) = ssi.uv_a.domain();
    let mut cuts = vec![Cut::at(t0), Cut::at(t1)];
    for (uv, face, other) in [(&ssi.uv_a, fa, &fb.surface), (&ssi.uv_b, fb, &fa.surface)] {
        for trim in face.trims() {
            for event in oracle.curve_curve(uv, trim, ptol) {
                match event {
                    CurveEvent::Transverse { t_a, .. } | CurveEvent::Tangent { t_a, .. } => {
                        let guess = ssi.curve.point_at(t_a);
                        cuts.push(Cut {
                            t: t_a,
                            point: trim_crossing(&guess, face, trim, other, reach, config, oracle),
                        });
                    }
                    CurveEvent::Overlap { a, .. } => cuts.extend([Cut::at(a.0), Cut::at(a.1)]),
                }
            }
        }
    }
    cuts.retain(|c| (t0..=t1).contains(&c.t));
    cuts.sort_by(|x, y| x.t.total_cmp(&y.t));
    cuts.dedup_by(|later, kept| {
        if (later.t - kept.t).abs() > 1e-12 {
            return false;
        }
        kept.point = kept.point.or(later.point);
        true
    });

    let mut pieces = Vec::new();
    for w in cuts.windows(2) {
        let (c0, c1) = (w[0], w[1]);
        let (s0, s1) = (c0.t, c1.t);
        let mid = 0.5 * (s0 + s1);
        let (p0, pm, p1) = (ssi.curve.point_at(s0), ssi.curve.point_at(mid), ssi.curve.point_at(s1));
        if p0.distance_to(&pm) <= tol && pm.distance_to(&p1) <= tol {
            continue;
        }
        let on_a = point_in_region(&ssi.uv_a.point_at(mid), &fa.outer, &fa.inners, ptol, samples);
        let on_b = point_in_region(&ssi.uv_b.point_at(mid), &fb.outer, &fb.inners, ptol, samples);
        if !(on_a.is_closed_inside() && on_b.is_closed_inside()) {
            continue;
        }
        match (ssi.uv_a.sub_curve(s0, s1), ssi.uv_b.sub_curve(s0, s1)) {
            (Ok(ca), Ok(cb)) => pieces.push((
                snap_ends(ca, &fa.surface, c0.point, c1.point, tol, oracle),
                snap_ends(cb, &fb.surface, c0.point, c1.point, tol, oracle),
            )),
            (Err(e), _) | (_, Err(e)) => debug!(error = %e, "dropping intersection piece"),
        }
    }
    pieces
}

/// Largest distance, relative to the branch length, between a sampled trim
/// crossing and the exact one it is replaced by.
const SNAP_REACH: f64 = 1e-2;

/// Where the edge under `trim` meets `other`, nearest to `guess`. Only
/// straight edges are refined; their crossings are exact.
fn trim_crossing(
    guess: &Point3d,
    face: &SourceFace,
    trim: &Curve2d,
    other: &Surface,
    reach: f64,
    config: &BooleanConfig,
    oracle: &dyn GeometryOracle,
) -> Option<Point3d> {
    let edge = face.surface.lift(trim, config.flatten_samples);
    if !matches!(edge, Curve3d::Line(_)) {
        return None;
    }
    oracle
        .curve_surface(&edge, other, config.tolerance.coincidence)
        .into_iter()
        .filter_map(|event| match event {
            CurveSurfaceEvent::Transverse { point, .. } | CurveSurfaceEvent::Tangent { point, .. } => Some(point),
            CurveSurfaceEvent::Overlap { .. } => None,
        })
        .map(|p| (p.distance_to(guess), p))
        .filter(|(d, _)| *d <= reach)
        .min_by(|x, y| x.0.total_cmp(&y.0))
        .map(|(_, p)| p)
}

/// Move the ends of a clipped piece to the parameters of the exact crossings.
fn snap_ends(
    piece: Curve2d,
    surface: &Surface,
    start: Option<Point3d>,
    end: Option<Point3d>,
    tol: f64,
    oracle: &dyn GeometryOracle,
) -> Curve2d {
    let locate = |p: Option<Point3d>, near: Point2d| {
        p.and_then(|p| oracle.point_surface(&p, surface, tol))
            .map(|uv| surface.align_parameters(uv, near))
    };
    let start_uv = locate(start, piece.start());
    let end_uv = locate(end, piece.end());
    piece.with_ends(start_uv, end_uv)
}
