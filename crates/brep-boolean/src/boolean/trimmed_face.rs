use crate::geometry::bounds::BoundingBox;
use crate::geometry::curves::Curve2d;
use crate::geometry::surfaces::Surface;
use crate::topology::brep::{FaceId, Solid};

use super::membership::{is_degenerate_loop, loop_bounding_box, signed_area};

/// Which operand a face or fragment comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    A,
    B,
}

impl Operand {
    pub fn other(self) -> Self {
        match self {
            Operand::A => Operand::B,
            Operand::B => Operand::A,
        }
    }
}

/// Keep decision for a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Membership {
    #[default]
    Unknown,
    Belongs,
    Excluded,
}

/// Where a fragment lies relative to the other solid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Inside,
    Outside,
    /// On a face of the other solid; `normals_agree` compares the outward
    /// normals of the two coincident faces.
    OnSurface { normals_agree: bool },
}

/// Snapshot of an input face, shared by every fragment cut from it.
#[derive(Debug, Clone)]
pub struct SourceFace {
    pub operand: Operand,
    pub face: FaceId,
    pub surface: Surface,
    pub outer: Vec<Curve2d>,
    pub inners: Vec<Vec<Curve2d>>,
    pub reversed: bool,
    pub bbox: BoundingBox,
}

impl SourceFace {
    pub fn from_solid(solid: &Solid, face: FaceId, operand: Operand) -> Self {
        let (outer, inners) = solid.face_loops(face);
        Self {
            operand,
            face,
            surface: solid.face_surface(face).clone(),
            outer,
            inners,
            reversed: solid.faces[face].reversed,
            bbox: solid.face_bounding_box(face),
        }
    }

    /// Every face of `solid`, in face order.
    pub fn collect(solid: &Solid, operand: Operand) -> Vec<Self> {
        solid.face_ids().map(|f| Self::from_solid(solid, f, operand)).collect()
    }

    /// All trim curves, outer loop first.
    pub fn trims(&self) -> impl Iterator<Item = &Curve2d> {
        self.outer.iter().chain(self.inners.iter().flatten())
    }
}

/// One face, or one fragment of a face, in its surface's parameter space.
#[derive(Debug, Clone)]
pub struct TrimmedFace {
    /// Index of the source face in its operand's face list.
    pub source: usize,
    pub operand: Operand,
    pub outer: Vec<Curve2d>,
    pub inners: Vec<Vec<Curve2d>>,
    pub membership: Membership,
    pub position: Option<Position>,
    /// Flip the output face relative to its source face.
    pub reversed: bool,
}

impl TrimmedFace {
    pub fn new(source: usize, operand: Operand, outer: Vec<Curve2d>, inners: Vec<Vec<Curve2d>>) -> Self {
        Self {
            source,
            operand,
            outer,
            inners,
            membership: Membership::Unknown,
            position: None,
            reversed: false,
        }
    }

    pub fn from_source(index: usize, src: &SourceFace) -> Self {
        Self::new(index, src.operand, src.outer.clone(), src.inners.clone())
    }

    pub fn area(&self, samples: usize) -> f64 {
        signed_area(&self.outer, samples) - self.inners.iter().map(|l| signed_area(l, samples).abs()).sum::<f64>()
    }

    pub fn bbox_diagonal(&self, samples: usize) -> f64 {
        loop_bounding_box(&self.outer, samples).diagonal()
    }

    pub fn is_degenerate(&self, tol: f64, samples: usize) -> bool {
        is_degenerate_loop(&self.outer, tol, samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::membership::reverse_loop;
    use crate::boolean::membership::tests::rect;
    use crate::geometry::point::Point3d;
    use crate::topology::primitives::make_box;

    #[test]
    fn test_operand_other() {
        assert_eq!(Operand::A.other(), Operand::B);
        assert_eq!(Operand::B.other(), Operand::A);
    }

    #[test]
    fn test_area_subtracts_holes() {
        let face = TrimmedFace::new(
            0,
            Operand::A,
            rect(0.0, 0.0, 2.0, 2.0),
            vec![reverse_loop(&rect(0.5, 0.5, 1.0, 1.0))],
        );
        assert!((face.area(8) - 3.75).abs() < 1e-12, "area {}", face.area(8));
        assert_eq!(face.membership, Membership::Unknown);
        assert!(!face.is_degenerate(1e-9, 8));
    }

    #[test]
    fn test_source_faces_of_a_box() {
        let mut solid = Solid::new();
        make_box(&mut solid, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).expect("box");
        let faces = SourceFace::collect(&solid, Operand::B);
        assert_eq!(faces.len(), 6);
        assert!(faces.iter().all(|f| f.operand == Operand::B && f.trims().count() == 4));
    }
}
