pub mod boolean;
pub mod config;
pub mod error;
pub mod geometry;
pub mod topology;

use serde::{Deserialize, Serialize};

// Re-export the entry points at crate root for convenience.
pub use boolean::{evaluate, evaluate_code, evaluate_with, BooleanEngine, BooleanOp, DefaultBooleanEngine};
pub use config::BooleanConfig;
pub use error::BooleanError;
pub use geometry::oracle::{GeometryOracle, NumericOracle};

/// Tolerances for geometric comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    /// Model-space points closer than this are coincident.
    pub coincidence: f64,
    /// Angles smaller than this (radians) are considered zero.
    pub angular: f64,
    /// Parameter-space points closer than this are coincident.
    pub parametric: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            coincidence: 1e-6,
            angular: 1e-10,
            parametric: 1e-7,
        }
    }
}

impl Tolerance {
    pub fn points_coincident(&self, a: &geometry::point::Point3d, b: &geometry::point::Point3d) -> bool {
        a.distance_to(b) < self.coincidence
    }

    pub fn uv_coincident(&self, a: &geometry::point::Point2d, b: &geometry::point::Point2d) -> bool {
        a.distance_to(b) < self.parametric
    }

    pub fn is_zero_length(&self, length: f64) -> bool {
        length.abs() < self.coincidence
    }

    pub fn is_zero_angle(&self, angle: f64) -> bool {
        angle.abs() < self.angular
    }
}
