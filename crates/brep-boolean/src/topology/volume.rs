//! Enclosed volume by the divergence theorem, `V = 1/3 ∮ P·n dA`.

use tracing::debug;

use super::brep::{FaceId, Solid};
use crate::boolean::membership::{loop_bounding_box, point_in_region, signed_area};
use crate::geometry::point::Point2d;
use crate::geometry::surfaces::Surface;

/// Volume enclosed by the faces of `solid`. Planar faces are integrated
/// exactly; curved faces use a `grid × grid` midpoint rule over their
/// parameter box.
pub fn enclosed_volume(solid: &Solid, grid: usize, samples: usize) -> f64 {
    let volume: f64 = solid.face_ids().map(|f| face_flux(solid, f, grid, samples)).sum::<f64>() / 3.0;
    debug!(volume, faces = solid.face_count(), "enclosed volume");
    volume
}

/// `∫ P·n dA` over one face, with `n` the outward face normal.
pub fn face_flux(solid: &Solid, face: FaceId, grid: usize, samples: usize) -> f64 {
    let (outer, inners) = solid.face_loops(face);
    let flux = match solid.face_surface(face) {
        Surface::Plane(plane) => {
            let area = signed_area(&outer, samples) - inners.iter().map(|l| signed_area(l, samples).abs()).sum::<f64>();
            plane.normal.dot(&plane.origin.to_vec3()) * area
        }
        surface => {
            let bb = loop_bounding_box(&outer, samples);
            let n = grid.max(1);
            let (du, dv) = (bb.width() / n as f64, bb.height() / n as f64);
            let mut sum = 0.0;
            for i in 0..n {
                for j in 0..n {
                    let uv = Point2d::new(bb.min.x + (i as f64 + 0.5) * du, bb.min.y + (j as f64 + 0.5) * dv);
                    if point_in_region(&uv, &outer, &inners, 0.0, samples).is_closed_inside() {
                        sum += surface.evaluate(uv).to_vec3().dot(&surface.area_element(uv));
                    }
                }
            }
            sum * du * dv
        }
    };
    if solid.faces[face].reversed { -flux } else { flux }
}
