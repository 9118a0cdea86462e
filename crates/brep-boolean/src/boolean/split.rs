//! Splitting a trimmed face along linked intersection curves.

use tracing::{debug, instrument, warn};

use crate::geometry::curves::Curve2d;
use crate::geometry::oracle::{CurveEvent, GeometryOracle};
use crate::geometry::point::Point2d;

use super::linker::LinkedCurve;
use super::loop_boolean::{containing_region, loop_boolean, LoopOp, Region};
use super::membership::{
    is_degenerate_loop, point_in_loop, reverse_loop, validate_loop, Containment,
};
use super::trimmed_face::TrimmedFace;

/// How an intersection curve meets a counter-clockwise loop at a crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingDirection {
    Entering,
    Leaving,
    Tangent,
    Unresolved,
}

/// A point where a linked curve meets a face's outer loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectPoint {
    pub point: Point2d,
    /// Parameter on the loop curve `segment`.
    pub loop_param: f64,
    pub segment: usize,
    /// Chain parameter on the linked curve.
    pub curve_param: f64,
    /// Position among all points of this loop/curve pair, by `curve_param`.
    pub rank: usize,
    pub direction: CrossingDirection,
    /// Index of the loop piece ending at this point once the loop has been
    /// cut at every intersect point.
    pub prev_piece: usize,
}

/// Tolerances and collaborators shared by the splitting steps.
#[derive(Clone, Copy)]
pub struct SplitContext<'a> {
    pub oracle: &'a dyn GeometryOracle,
    pub tol: f64,
    pub samples: usize,
}

/// Split one face along every linked curve, then re-attach the face's holes
/// to whichever fragments contain them. Degenerate fragments are dropped.
#[instrument(skip_all, fields(source = face.source, curves = curves.len()))]
pub fn split_face(face: &TrimmedFace, curves: &[LinkedCurve], ctx: SplitContext<'_>) -> Vec<TrimmedFace> {
    let mut regions = vec![Region::new(face.outer.clone())];
    for curve in curves {
        regions = regions
            .into_iter()
            .flat_map(|r| split_region(r, curve, ctx))
            .collect();
    }
    for hole in &face.inners {
        regions = regions
            .into_iter()
            .flat_map(|r| subtract_hole(r, hole, ctx))
            .collect();
    }

    let fragments: Vec<TrimmedFace> = regions
        .into_iter()
        .filter(|r| {
            let degenerate = is_degenerate_loop(&r.outer, ctx.tol, ctx.samples);
            if degenerate {
                debug!("dropping degenerate fragment");
            }
            !degenerate
        })
        .map(|r| TrimmedFace::new(face.source, face.operand, r.outer, r.inners))
        .collect();
    debug!(fragments = fragments.len(), "split face");
    fragments
}

fn split_region(region: Region, curve: &LinkedCurve, ctx: SplitContext<'_>) -> Vec<Region> {
    let outers: Vec<Region> = if curve.closed {
        let inside = loop_boolean(&region.outer, &curve.segments, LoopOp::Intersect, ctx.oracle, ctx.tol, ctx.samples);
        if inside.outers.is_empty() {
            return vec![region];
        }
        let rest = loop_boolean(&region.outer, &curve.segments, LoopOp::Difference, ctx.oracle, ctx.tol, ctx.samples);
        let mut out = inside.into_regions(ctx.tol, ctx.samples);
        out.extend(rest.into_regions(ctx.tol, ctx.samples));
        out
    } else {
        let loops = split_loop_by_curve(&region.outer, curve, ctx);
        if loops.len() <= 1 {
            return vec![region];
        }
        loops.into_iter().map(Region::new).collect()
    };

    let mut out = outers;
    for hole in &region.inners {
        out = out.into_iter().flat_map(|r| subtract_hole(r, hole, ctx)).collect();
    }
    out
}

/// Remove a hole from a region. The region's own holes stay with whichever
/// resulting region contains them.
fn subtract_hole(region: Region, hole: &[Curve2d], ctx: SplitContext<'_>) -> Vec<Region> {
    if let Err(e) = validate_loop(hole, ctx.tol) {
        warn!(error = %e, "ignoring invalid inner loop");
        return vec![region];
    }
    let result = loop_boolean(&region.outer, hole, LoopOp::Difference, ctx.oracle, ctx.tol, ctx.samples);
    if result.outers.is_empty() {
        return Vec::new();
    }
    let mut regions = result.into_regions(ctx.tol, ctx.samples);
    for inner in region.inners {
        match containing_region(&regions, &inner, ctx.tol, ctx.samples) {
            Some(i) => regions[i].inners.push(inner),
            None => debug!("inner loop cut away with its fragment"),
        }
    }
    regions
}

/// Points where `curve` meets `outer`, ranked by curve parameter, with the
/// loop cut at every one of them. Returns the cut loop and the points.
pub fn intersect_points(
    outer: &[Curve2d],
    curve: &LinkedCurve,
    ctx: SplitContext<'_>,
) -> (Vec<Curve2d>, Vec<IntersectPoint>) {
    let tol = ctx.tol;
    // (point, loop segment, loop param, curve param)
    let mut raw: Vec<(Point2d, usize, f64, f64)> = Vec::new();
    for (seg, lc) in outer.iter().enumerate() {
        for (k, frag) in curve.segments.iter().enumerate() {
            for event in ctx.oracle.curve_curve(lc, frag, tol) {
                match event {
                    CurveEvent::Transverse { t_a, t_b, point } | CurveEvent::Tangent { t_a, t_b, point } => {
                        raw.push((point, seg, t_a, curve.chain_param(k, t_b)));
                    }
                    CurveEvent::Overlap { a, b } => {
                        let aligned = lc.point_at(a.0).distance_to(&frag.point_at(b.0)) <= tol;
                        let (b0, b1) = if aligned { (b.0, b.1) } else { (b.1, b.0) };
                        raw.push((lc.point_at(a.0), seg, a.0, curve.chain_param(k, b0)));
                        raw.push((lc.point_at(a.1), seg, a.1, curve.chain_param(k, b1)));
                    }
                }
            }
        }
    }
    let (s0, s1) = curve.domain();
    for (p, s) in [(curve.start(), s0), (curve.end(), s1)] {
        for (seg, lc) in outer.iter().enumerate() {
            if let Some(t) = ctx.oracle.point_curve(&p, lc, tol) {
                raw.push((p, seg, t, s));
            }
        }
    }

    raw.sort_by(|x, y| x.3.total_cmp(&y.3));
    let mut unique: Vec<(Point2d, usize, f64, f64)> = Vec::new();
    for r in raw {
        if !unique.iter().any(|u| u.0.distance_to(&r.0) <= tol) {
            unique.push(r);
        }
    }

    let mut points: Vec<IntersectPoint> = unique
        .into_iter()
        .enumerate()
        .map(|(rank, (point, segment, loop_param, curve_param))| IntersectPoint {
            point,
            loop_param,
            segment,
            curve_param,
            rank,
            direction: crossing_direction(&outer[segment], loop_param, curve, curve_param),
            prev_piece: 0,
        })
        .collect();

    let pieces = presplit_loop(outer, &mut points, tol);
    (pieces, points)
}

fn crossing_direction(lc: &Curve2d, t: f64, curve: &LinkedCurve, s: f64) -> CrossingDirection {
    let a = lc.tangent_at(t);
    let b = curve.tangent_at(s);
    let (la, lb) = (a.length(), b.length());
    if la < 1e-14 || lb < 1e-14 {
        return CrossingDirection::Unresolved;
    }
    let sin = a.cross(&b) / (la * lb);
    if sin > 1e-9 {
        CrossingDirection::Entering
    } else if sin < -1e-9 {
        CrossingDirection::Leaving
    } else {
        CrossingDirection::Tangent
    }
}

/// Cut the loop at every intersect point and record, for each point, the
/// piece that ends there.
fn presplit_loop(outer: &[Curve2d], points: &mut [IntersectPoint], tol: f64) -> Vec<Curve2d> {
    let mut pieces: Vec<Curve2d> = Vec::new();
    for (seg, lc) in outer.iter().enumerate() {
        let (t0, t1) = lc.domain();
        let (a, b) = (lc.start(), lc.end());
        let mut cuts: Vec<f64> = points
            .iter()
            .filter(|p| p.segment == seg && p.point.distance_to(&a) > tol && p.point.distance_to(&b) > tol)
            .map(|p| p.loop_param)
            .collect();
        cuts.sort_by(f64::total_cmp);
        cuts.push(t1);

        let first = pieces.len();
        let mut from = t0;
        for t in cuts {
            if t - from <= 1e-12 {
                continue;
            }
            match lc.sub_curve(from, t) {
                Ok(piece) => {
                    pieces.push(piece);
                    from = t;
                }
                Err(e) => debug!(error = %e, "skipping loop cut"),
            }
        }
        if pieces.len() == first {
            pieces.push(lc.clone());
        }
    }
    let last = pieces.len().saturating_sub(1);
    for p in points.iter_mut() {
        p.prev_piece = pieces
            .iter()
            .position(|c| c.end().distance_to(&p.point) <= tol)
            .unwrap_or(last);
    }
    pieces
}

/// Split a counter-clockwise loop along an open curve. Each stretch of the
/// curve between consecutive intersect points that runs through the loop's
/// interior is a chord; chords are applied one at a time, each splitting
/// the loop piece it crosses in two.
fn split_loop_by_curve(outer: &[Curve2d], curve: &LinkedCurve, ctx: SplitContext<'_>) -> Vec<Vec<Curve2d>> {
    let tol = ctx.tol;
    let (pieces, points) = intersect_points(outer, curve, ctx);
    if points.len() < 2 {
        return vec![outer.to_vec()];
    }
    debug!(
        points = points.len(),
        entering = points.iter().filter(|p| p.direction == CrossingDirection::Entering).count(),
        "intersect points"
    );

    let mut loops: Vec<Vec<Curve2d>> = vec![pieces];
    for w in points.windows(2) {
        let (p, q) = (w[0], w[1]);
        if q.curve_param - p.curve_param <= 1e-12 {
            continue;
        }
        let mid = curve.point_at(0.5 * (p.curve_param + q.curve_param));
        let Some(li) = loops
            .iter()
            .position(|l| point_in_loop(&mid, l, tol, ctx.samples) == Containment::Inside)
        else {
            continue;
        };
        let chord = match curve.sub_range(p.curve_param, q.curve_param) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "could not extract chord");
                continue;
            }
        };
        match cut_loop(&loops[li], &chord, p.point, q.point, tol) {
            Some((l1, l2)) => {
                loops.swap_remove(li);
                loops.push(l1);
                loops.push(l2);
            }
            None => warn!(rank = p.rank, "chord ends are not loop vertices; left unsplit"),
        }
    }
    loops
}

/// Split `lp` by `chord` running from vertex `p` to vertex `q`.
fn cut_loop(
    lp: &[Curve2d],
    chord: &[Curve2d],
    p: Point2d,
    q: Point2d,
    tol: f64,
) -> Option<(Vec<Curve2d>, Vec<Curve2d>)> {
    let ip = lp.iter().position(|c| c.end().distance_to(&p) <= tol)?;
    let iq = lp.iter().position(|c| c.end().distance_to(&q) <= tol)?;
    if ip == iq {
        return None;
    }
    let n = lp.len();
    // Loop curves after `from` up to and including `to`.
    let path = |from: usize, to: usize| -> Vec<Curve2d> {
        let mut out = Vec::new();
        let mut i = (from + 1) % n;
        loop {
            out.push(lp[i].clone());
            if i == to {
                break;
            }
            i = (i + 1) % n;
        }
        out
    };
    let mut l1 = chord.to_vec();
    l1.extend(path(iq, ip));
    let mut l2 = reverse_loop(chord);
    l2.extend(path(ip, iq));
    Some((l1, l2))
}
