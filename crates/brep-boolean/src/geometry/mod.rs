pub mod bounds;
pub mod curves;
pub mod intersection;
pub mod nurbs;
pub mod oracle;
pub mod point;
pub mod surface_intersection;
pub mod surfaces;
pub mod vector;
