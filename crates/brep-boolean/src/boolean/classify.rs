//! Inside/outside/on-surface classification of face fragments.

use tracing::{debug, trace};

use crate::error::BooleanError;
use crate::geometry::bounds::BoundingBox;
use crate::geometry::curves::{Curve2d, Curve3d, Line3d};
use crate::geometry::oracle::{CurveSurfaceEvent, GeometryOracle};
use crate::geometry::point::{Point2d, Point3d};
use crate::geometry::vector::Vec3;
use crate::Tolerance;

use super::membership::{distance_to_loop, loop_bounding_box, point_in_region, Containment};
use super::trimmed_face::{Position, SourceFace, TrimmedFace};

/// Direction of the parity ray; chosen off every axis and diagonal so that
/// it rarely grazes edges of axis-aligned models.
const RAY_DIRECTION: Vec3 = Vec3 {
    x: 0.577_3,
    y: 0.591_7,
    z: 0.563_1,
};

/// Normals closer than this to (anti)parallel count as a coincident contact.
const PARALLEL_COS: f64 = 1.0 - 1e-6;

/// A point strictly inside the region bounded by `outer` minus `inners`.
///
/// The loop's bounding box is searched with `2^d × 2^d` grids for
/// `d = 0..=max_depth`; at the first level with any interior cell centre,
/// the one farthest from the boundary wins.
pub fn interior_point(
    outer: &[Curve2d],
    inners: &[Vec<Curve2d>],
    max_depth: u32,
    tol: f64,
    samples: usize,
) -> Result<Point2d, BooleanError> {
    let bb = loop_bounding_box(outer, samples);
    if bb.width() <= tol && bb.height() <= tol {
        return Err(BooleanError::AlgorithmError("loop has no extent".into()));
    }
    let clearance = |p: &Point2d| {
        inners
            .iter()
            .map(|l| distance_to_loop(p, l, samples))
            .fold(distance_to_loop(p, outer, samples), f64::min)
    };
    for depth in 0..=max_depth.min(16) {
        let n = 1usize << depth;
        let (dx, dy) = (bb.width() / n as f64, bb.height() / n as f64);
        let mut best: Option<(f64, Point2d)> = None;
        for i in 0..n {
            for j in 0..n {
                let p = Point2d::new(bb.min.x + (i as f64 + 0.5) * dx, bb.min.y + (j as f64 + 0.5) * dy);
                if point_in_region(&p, outer, inners, tol, samples) != Containment::Inside {
                    continue;
                }
                let d = clearance(&p);
                if best.is_none_or(|(bd, _)| d > bd) {
                    best = Some((d, p));
                }
            }
        }
        if let Some((d, p)) = best {
            trace!(depth, clearance = d, "interior point");
            return Ok(p);
        }
    }
    Err(BooleanError::AlgorithmError(format!(
        "no interior point found within {} grid levels",
        max_depth
    )))
}

/// Collaborators and limits for classifying fragments.
#[derive(Clone, Copy)]
pub struct ClassifyContext<'a> {
    pub oracle: &'a dyn GeometryOracle,
    pub tolerance: Tolerance,
    pub max_depth: u32,
    pub samples: usize,
}

/// Outward normal of a face at `uv`.
fn outward_normal(face: &SourceFace, uv: Point2d) -> Vec3 {
    let n = face.surface.normal_at(uv);
    if face.reversed { -n } else { n }
}

/// Where `frag` lies relative to the solid whose faces are `others`.
///
/// A fragment whose interior point sits on a face of the other solid, with
/// parallel normals, is on that surface; otherwise a ray from the point is
/// cast through the other solid and its crossings are counted.
pub fn classify_fragment(
    frag: &TrimmedFace,
    own: &SourceFace,
    others: &[SourceFace],
    other_bbox: &BoundingBox,
    ctx: &ClassifyContext<'_>,
) -> Result<Position, BooleanError> {
    let (tolerance, samples) = (&ctx.tolerance, ctx.samples);
    let uv = interior_point(&frag.outer, &frag.inners, ctx.max_depth, tolerance.parametric, samples)?;
    let p = own.surface.evaluate(uv);
    let tol = tolerance.coincidence;

    let normal = outward_normal(own, uv);
    for other in others {
        if !other.bbox.contains_point(&p, tol) {
            continue;
        }
        let Some(ouv) = ctx.oracle.point_surface(&p, &other.surface, tol) else {
            continue;
        };
        if !point_in_region(&ouv, &other.outer, &other.inners, tolerance.parametric, samples).is_closed_inside() {
            continue;
        }
        let cos = normal.dot(&outward_normal(other, ouv));
        if cos.abs() >= PARALLEL_COS {
            debug!(agree = cos > 0.0, "fragment lies on a face of the other solid");
            return Ok(Position::OnSurface { normals_agree: cos > 0.0 });
        }
    }

    let crossings = ray_crossings(&p, others, other_bbox, ctx);
    trace!(crossings, "parity ray");
    Ok(if crossings % 2 == 1 { Position::Inside } else { Position::Outside })
}

/// Distinct transverse crossings of a ray segment from `origin` with the
/// faces in `others`.
fn ray_crossings(
    origin: &Point3d,
    others: &[SourceFace],
    other_bbox: &BoundingBox,
    ctx: &ClassifyContext<'_>,
) -> usize {
    let tol = ctx.tolerance.coincidence;
    let dir = RAY_DIRECTION.normalized().unwrap_or(Vec3::X);
    let length = origin.distance_to(&other_bbox.center()) + other_bbox.diagonal() + 1.0;
    let target = *origin + dir * length;
    let ray = Curve3d::Line(Line3d::new(*origin, target));
    let ray_bbox = BoundingBox::from_points(&[*origin, target]);

    let mut hits: Vec<Point3d> = Vec::new();
    for face in others {
        if !face.bbox.intersects(&ray_bbox, tol) {
            continue;
        }
        for event in ctx.oracle.curve_surface(&ray, &face.surface, tol) {
            let CurveSurfaceEvent::Transverse { t, uv, point } = event else {
                continue;
            };
            if t * length <= tol {
                continue;
            }
            if !point_in_region(&uv, &face.outer, &face.inners, ctx.tolerance.parametric, ctx.samples).is_closed_inside() {
                continue;
            }
            if !hits.iter().any(|h| h.distance_to(&point) <= tol) {
                hits.push(point);
            }
        }
    }
    hits.len()
}
