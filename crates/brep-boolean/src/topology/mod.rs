pub mod audit;
pub mod brep;
pub mod primitives;
pub mod volume;
