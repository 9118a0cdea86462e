use std::f64::consts::{FRAC_PI_2, TAU};

use tracing::{info, instrument};

use super::brep::{FaceId, Solid};
use crate::boolean::membership::signed_area;
use crate::error::BooleanError;
use crate::geometry::curves::Curve2d;
use crate::geometry::point::{Point2d, Point3d};
use crate::geometry::surfaces::{Plane, Sphere, Surface};
use crate::geometry::vector::Vec3;
use crate::Tolerance;

/// Add an axis-aligned box with corners `min` and `max` to `solid`.
///
/// Every face lies on a canonical plane, so coplanar faces of different boxes
/// share one parametrisation.
#[instrument(skip(solid))]
pub fn make_box(solid: &mut Solid, min: Point3d, max: Point3d) -> Result<Vec<FaceId>, BooleanError> {
    info!(min = ?[min.x, min.y, min.z], max = ?[max.x, max.y, max.z], "creating box primitive");
    if !(min.x < max.x && min.y < max.y && min.z < max.z) {
        return Err(BooleanError::InvalidGeometry(format!(
            "box corners do not span a volume: {:?} .. {:?}",
            min, max
        )));
    }
    let tol = Tolerance::default();

    let corner = |i: usize| {
        Point3d::new(
            if i & 1 == 0 { min.x } else { max.x },
            if i & 2 == 0 { min.y } else { max.y },
            if i & 4 == 0 { min.z } else { max.z },
        )
    };
    // (outward normal, the four corners of that side)
    let sides: [(Vec3, [usize; 4]); 6] = [
        (-Vec3::X, [0, 2, 6, 4]),
        (Vec3::X, [1, 3, 7, 5]),
        (-Vec3::Y, [0, 1, 5, 4]),
        (Vec3::Y, [2, 3, 7, 6]),
        (-Vec3::Z, [0, 1, 3, 2]),
        (Vec3::Z, [4, 5, 7, 6]),
    ];

    let mut faces = Vec::with_capacity(6);
    for (normal, idx) in sides {
        let offset = corner(idx[0]).to_vec3().dot(&normal);
        let plane = Plane::canonical(normal, offset);
        let mut uv: Vec<Point2d> = idx.iter().map(|&i| plane.parameters_of(&corner(i))).collect();
        let outline: Vec<Curve2d> = (0..4).map(|i| Curve2d::line(uv[i], uv[(i + 1) % 4])).collect();
        if signed_area(&outline, 1) < 0.0 {
            uv.reverse();
        }
        let outer: Vec<Curve2d> = (0..4).map(|i| Curve2d::line(uv[i], uv[(i + 1) % 4])).collect();
        let surface = solid.add_surface(Surface::Plane(plane));
        faces.push(solid.add_face_from_loops(surface, &outer, &[], false, &tol)?);
    }
    Ok(faces)
}

/// Add a sphere to `solid`: one face over the whole parameter rectangle,
/// with singular trims at both poles and a seam edge used twice.
#[instrument(skip(solid))]
pub fn make_sphere(solid: &mut Solid, center: Point3d, radius: f64) -> Result<FaceId, BooleanError> {
    info!(center = ?[center.x, center.y, center.z], radius, "creating sphere primitive");
    if radius.is_nan() || radius <= 0.0 {
        return Err(BooleanError::InvalidGeometry(format!("sphere radius must be positive, got {}", radius)));
    }
    let tol = Tolerance::default();

    let corners = [
        Point2d::new(0.0, -FRAC_PI_2),
        Point2d::new(TAU, -FRAC_PI_2),
        Point2d::new(TAU, FRAC_PI_2),
        Point2d::new(0.0, FRAC_PI_2),
    ];
    let outer: Vec<Curve2d> = (0..4).map(|i| Curve2d::line(corners[i], corners[(i + 1) % 4])).collect();
    let surface = solid.add_surface(Surface::Sphere(Sphere::new(center, radius)));
    solid.add_face_from_loops(surface, &outer, &[], false, &tol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::brep::TrimKind;

    #[test]
    fn test_make_box_topology() {
        let mut solid = Solid::new();
        let faces = make_box(&mut solid, Point3d::ORIGIN, Point3d::new(1.0, 2.0, 3.0)).expect("box");
        assert_eq!(faces.len(), 6);
        assert_eq!(solid.vertices.len(), 8, "box should have 8 vertices");
        assert_eq!(solid.edges.len(), 12, "box should have 12 edges");
        assert!(
            solid.edges.values().all(|e| e.trims.len() == 2),
            "every box edge is shared by two faces"
        );
    }

    #[test]
    fn test_make_box_outer_loops_are_counter_clockwise() {
        let mut solid = Solid::new();
        make_box(&mut solid, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).expect("box");
        for face in solid.face_ids() {
            let outer = solid.loop_curves(solid.faces[face].outer);
            assert!(signed_area(&outer, 1) > 0.0, "outer loop of {:?} is clockwise", face);
        }
    }

    #[test]
    fn test_make_box_normals_point_outward() {
        let mut solid = Solid::new();
        make_box(&mut solid, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).expect("box");
        let center = Point3d::new(0.5, 0.5, 0.5);
        for face in solid.face_ids() {
            let Surface::Plane(plane) = solid.face_surface(face) else {
                panic!("box faces are planar");
            };
            let outward = plane.origin - center;
            assert!(
                solid.face_normal_at(face, Point2d::ORIGIN).dot(&outward) > 0.0,
                "face normal points into the box"
            );
        }
    }

    #[test]
    fn test_make_box_rejects_flat_box() {
        let mut solid = Solid::new();
        let result = make_box(&mut solid, Point3d::ORIGIN, Point3d::new(1.0, 0.0, 1.0));
        assert!(matches!(result, Err(BooleanError::InvalidGeometry(_))));
        assert!(solid.is_empty());
    }

    #[test]
    fn test_make_sphere_topology() {
        let mut solid = Solid::new();
        make_sphere(&mut solid, Point3d::ORIGIN, 2.0).expect("sphere");
        assert_eq!(solid.face_count(), 1);
        assert_eq!(solid.vertices.len(), 2, "only the poles are vertices");
        assert_eq!(solid.edges.len(), 1, "the seam is the only edge");
        let singular = solid
            .trims
            .values()
            .filter(|t| matches!(t.kind, TrimKind::Singular { .. }))
            .count();
        assert_eq!(singular, 2);
        let seam = solid.edges.values().next().expect("seam edge");
        assert_eq!(seam.trims.len(), 2, "the seam is used by both sides of the face");
    }

    #[test]
    fn test_sphere_bounding_box_covers_the_equator() {
        let mut solid = Solid::new();
        make_sphere(&mut solid, Point3d::new(1.0, 0.0, 0.0), 1.0).expect("sphere");
        let bb = solid.bounding_box();
        assert!(bb.min.x <= 0.0 && bb.max.x >= 2.0, "bbox {:?}", bb);
        assert!(bb.min.y <= -1.0 && bb.max.y >= 1.0, "bbox {:?}", bb);
    }
}
