use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::error::BooleanError;
use crate::geometry::bounds::{BoundingBox, BoundingBox2d};
use crate::geometry::curves::{Curve2d, Curve3d};
use crate::geometry::point::{Point2d, Point3d};
use crate::geometry::surfaces::Surface;
use crate::geometry::vector::Vec3;
use crate::Tolerance;

// ─── Entity Keys ─────────────────────────────────────────────────────────────

new_key_type! {
    pub struct SurfaceId;
    pub struct FaceId;
    pub struct LoopId;
    pub struct TrimId;
    pub struct EdgeId;
    pub struct VertexId;
}

// ─── Topological Entities ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertex {
    pub point: Point3d,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub curve: Curve3d,
    pub start: VertexId,
    pub end: VertexId,
    /// Every trim that uses this edge.
    pub trims: Vec<TrimId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrimKind {
    /// `reversed` is true when the trim runs against the edge curve.
    Edge { edge: EdgeId, reversed: bool },
    /// A trim whose model-space image collapses to one point, such as a
    /// sphere pole.
    Singular { vertex: VertexId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trim {
    pub curve: Curve2d,
    pub kind: TrimKind,
    pub loop_id: LoopId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopKind {
    Outer,
    Inner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loop {
    pub face: FaceId,
    pub kind: LoopKind,
    pub trims: Vec<TrimId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    pub surface: SurfaceId,
    pub outer: LoopId,
    pub inners: Vec<LoopId>,
    /// true if the face normal is opposite to the surface normal.
    pub reversed: bool,
}

// ─── Solid ───────────────────────────────────────────────────────────────────

/// A boundary-representation solid. Every entity lives in an arena owned by
/// the solid and is referenced by key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Solid {
    pub surfaces: SlotMap<SurfaceId, Surface>,
    pub faces: SlotMap<FaceId, Face>,
    pub loops: SlotMap<LoopId, Loop>,
    pub trims: SlotMap<TrimId, Trim>,
    pub edges: SlotMap<EdgeId, Edge>,
    pub vertices: SlotMap<VertexId, Vertex>,
    /// Faces in insertion order.
    pub face_order: Vec<FaceId>,
}

/// Number of samples used to lift trim curves and bound curved faces.
const LIFT_SAMPLES: usize = 32;

impl Solid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn face_count(&self) -> usize {
        self.face_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.face_order.is_empty()
    }

    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.face_order.iter().copied()
    }

    pub fn add_surface(&mut self, surface: Surface) -> SurfaceId {
        self.surfaces.insert(surface)
    }

    pub fn face_surface(&self, face: FaceId) -> &Surface {
        &self.surfaces[self.faces[face].surface]
    }

    /// Trim curves of a loop in traversal order.
    pub fn loop_curves(&self, loop_id: LoopId) -> Vec<Curve2d> {
        self.loops[loop_id]
            .trims
            .iter()
            .map(|&t| self.trims[t].curve.clone())
            .collect()
    }

    /// Outer and inner loops of a face as parameter-space curves.
    pub fn face_loops(&self, face: FaceId) -> (Vec<Curve2d>, Vec<Vec<Curve2d>>) {
        let f = &self.faces[face];
        let outer = self.loop_curves(f.outer);
        let inners = f.inners.iter().map(|&l| self.loop_curves(l)).collect();
        (outer, inners)
    }

    /// Outward normal of the face at `uv`.
    pub fn face_normal_at(&self, face: FaceId, uv: Point2d) -> Vec3 {
        let n = self.face_surface(face).normal_at(uv);
        if self.faces[face].reversed { -n } else { n }
    }

    /// Conservative model-space bounds of a face.
    pub fn face_bounding_box(&self, face: FaceId) -> BoundingBox {
        let surface = self.face_surface(face);
        let outer = self.loop_curves(self.faces[face].outer);
        let mut bb = BoundingBox::empty();
        let mut uv_bb = BoundingBox2d::empty();
        for curve in &outer {
            for (_, uv) in curve.flatten(LIFT_SAMPLES) {
                uv_bb.expand_to_include(&uv);
                bb.expand_to_include(&surface.evaluate(uv));
            }
        }
        if matches!(surface, Surface::Plane(_)) || !uv_bb.min.x.is_finite() {
            return bb;
        }

        // A curved patch can bulge past its boundary; sample the parameter
        // box and pad by the chord error of the grid.
        let n = LIFT_SAMPLES;
        for i in 0..=n {
            for j in 0..=n {
                let uv = Point2d::new(
                    uv_bb.min.x + uv_bb.width() * i as f64 / n as f64,
                    uv_bb.min.y + uv_bb.height() * j as f64 / n as f64,
                );
                bb.expand_to_include(&surface.evaluate(uv));
            }
        }
        bb.expanded(0.02 * bb.diagonal())
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.face_ids()
            .map(|f| self.face_bounding_box(f))
            .fold(BoundingBox::empty(), |acc, bb| acc.union(&bb))
    }

    // ─── Builders ────────────────────────────────────────────────────────────

    /// Create a face on `surface` bounded by the given parameter-space loops.
    /// Trim images shorter than the coincidence tolerance become singular
    /// trims; vertices and edges are shared with existing ones within
    /// tolerance.
    pub fn add_face_from_loops(
        &mut self,
        surface: SurfaceId,
        outer: &[Curve2d],
        inners: &[Vec<Curve2d>],
        reversed: bool,
        tol: &Tolerance,
    ) -> Result<FaceId, BooleanError> {
        if !self.surfaces.contains_key(surface) {
            return Err(BooleanError::InvalidGeometry("face references an unknown surface".into()));
        }
        if outer.is_empty() {
            return Err(BooleanError::InvalidGeometry("face has an empty outer loop".into()));
        }

        let face = self.faces.insert(Face {
            surface,
            outer: LoopId::default(),
            inners: Vec::new(),
            reversed,
        });
        let outer_loop = self.add_loop(face, LoopKind::Outer, outer, tol);
        let inner_loops: Vec<LoopId> = inners
            .iter()
            .filter(|l| !l.is_empty())
            .map(|l| self.add_loop(face, LoopKind::Inner, l, tol))
            .collect();

        let f = &mut self.faces[face];
        f.outer = outer_loop;
        f.inners = inner_loops;
        self.face_order.push(face);
        Ok(face)
    }

    fn add_loop(&mut self, face: FaceId, kind: LoopKind, curves: &[Curve2d], tol: &Tolerance) -> LoopId {
        let surface = self.surfaces[self.faces[face].surface].clone();
        let loop_id = self.loops.insert(Loop {
            face,
            kind,
            trims: Vec::with_capacity(curves.len()),
        });
        for curve in curves {
            let image = surface.lift(curve, LIFT_SAMPLES);
            let kind = if tol.is_zero_length(image.approximate_length(LIFT_SAMPLES)) {
                TrimKind::Singular {
                    vertex: self.find_or_add_vertex(image.start(), tol),
                }
            } else {
                let (edge, reversed) = self.find_or_add_edge(image, tol);
                TrimKind::Edge { edge, reversed }
            };
            let trim = self.trims.insert(Trim {
                curve: curve.clone(),
                kind,
                loop_id,
            });
            if let TrimKind::Edge { edge, .. } = kind {
                self.edges[edge].trims.push(trim);
            }
            self.loops[loop_id].trims.push(trim);
        }
        loop_id
    }

    pub fn find_or_add_vertex(&mut self, point: Point3d, tol: &Tolerance) -> VertexId {
        if let Some((id, _)) = self
            .vertices
            .iter()
            .find(|(_, v)| tol.points_coincident(&v.point, &point))
        {
            return id;
        }
        self.vertices.insert(Vertex {
            point,
            tolerance: tol.coincidence,
        })
    }

    /// Reuse an edge running along the same points as `curve`, in either
    /// direction, or create one.
    fn find_or_add_edge(&mut self, curve: Curve3d, tol: &Tolerance) -> (EdgeId, bool) {
        let start = self.find_or_add_vertex(curve.start(), tol);
        let end = self.find_or_add_vertex(curve.end(), tol);
        let probe = curve.sample(4);
        let length = curve.approximate_length(LIFT_SAMPLES);
        let match_tol = tol.coincidence.max(1e-3 * length);

        for (id, edge) in &self.edges {
            let same_ends = (edge.start == start && edge.end == end) || (edge.start == end && edge.end == start);
            if !same_ends {
                continue;
            }
            let samples = edge.curve.sample(LIFT_SAMPLES);
            let positions: Option<Vec<f64>> = probe[1..4]
                .iter()
                .map(|p| {
                    let (d, pos) = polyline_position(&samples, p);
                    (d <= match_tol).then_some(pos)
                })
                .collect();
            if let Some(pos) = positions {
                let reversed = if start == end {
                    pos[0] > pos[2]
                } else {
                    edge.start != start
                };
                return (id, reversed);
            }
        }

        let id = self.edges.insert(Edge {
            curve,
            start,
            end,
            trims: Vec::new(),
        });
        (id, false)
    }

    /// Reverse a loop in place: trim order, trim curves and edge senses.
    /// Edges are shared, so only the trims' `reversed` flags change.
    pub fn reverse_loop(&mut self, loop_id: LoopId) {
        let trims = {
            let l = &mut self.loops[loop_id];
            l.trims.reverse();
            l.trims.clone()
        };
        for t in trims {
            let trim = &mut self.trims[t];
            trim.curve = trim.curve.reversed();
            if let TrimKind::Edge { reversed, .. } = &mut trim.kind {
                *reversed = !*reversed;
            }
        }
    }

    /// Copy every face of `other` into this solid, one new surface per
    /// source surface.
    pub fn append(&mut self, other: &Solid, tol: &Tolerance) -> Result<(), BooleanError> {
        let mut surface_map: HashMap<SurfaceId, SurfaceId> = HashMap::new();
        for face in other.face_ids() {
            let src = &other.faces[face];
            let surface = *surface_map
                .entry(src.surface)
                .or_insert_with(|| self.surfaces.insert(other.surfaces[src.surface].clone()));
            let (outer, inners) = other.face_loops(face);
            self.add_face_from_loops(surface, &outer, &inners, src.reversed, tol)?;
        }
        Ok(())
    }
}

/// Distance from `p` to a polyline and the fractional vertex index of the
/// closest point.
fn polyline_position(points: &[Point3d], p: &Point3d) -> (f64, f64) {
    let mut best = (f64::INFINITY, 0.0);
    for (i, w) in points.windows(2).enumerate() {
        let seg = w[1] - w[0];
        let len2 = seg.dot(&seg);
        let s = if len2 > 0.0 {
            ((*p - w[0]).dot(&seg) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let d = p.distance_to(&(w[0] + seg * s));
        if d < best.0 {
            best = (d, i as f64 + s);
        }
    }
    best
}
