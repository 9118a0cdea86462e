pub mod assemble;
pub mod classify;
pub mod engine;
pub mod linker;
pub mod loop_boolean;
pub mod membership;
pub mod split;
pub mod trimmed_face;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::BooleanConfig;
use crate::error::BooleanError;
use crate::geometry::oracle::{GeometryOracle, NumericOracle};
use crate::topology::brep::Solid;

/// Boolean operation, with its stable integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BooleanOp {
    Union = 0,
    Intersect = 1,
    Difference = 2,
    Xor = 3,
}

impl TryFrom<i32> for BooleanOp {
    type Error = BooleanError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(BooleanOp::Union),
            1 => Ok(BooleanOp::Intersect),
            2 => Ok(BooleanOp::Difference),
            3 => Ok(BooleanOp::Xor),
            _ => Err(BooleanError::InvalidBooleanOp { code }),
        }
    }
}

/// Trait for Boolean evaluation of B-rep solids.
///
/// Implement this trait to provide alternative Boolean backends or mock
/// implementations.
pub trait BooleanEngine {
    /// Replace the contents of `out` with `a op b`. On error `out` is left
    /// empty.
    fn evaluate(&self, out: &mut Solid, a: &Solid, b: &Solid, op: BooleanOp) -> Result<(), BooleanError>;
}

/// Boolean engine backed by the numeric geometry oracle.
#[derive(Debug, Clone, Default)]
pub struct DefaultBooleanEngine {
    pub config: BooleanConfig,
    pub oracle: NumericOracle,
}

impl DefaultBooleanEngine {
    pub fn new(config: BooleanConfig) -> Self {
        let oracle = NumericOracle::from_config(&config);
        Self { config, oracle }
    }
}

impl BooleanEngine for DefaultBooleanEngine {
    fn evaluate(&self, out: &mut Solid, a: &Solid, b: &Solid, op: BooleanOp) -> Result<(), BooleanError> {
        evaluate_with(out, a, b, op, &self.config, &self.oracle)
    }
}

/// Evaluate with an explicit configuration and oracle.
pub fn evaluate_with(
    out: &mut Solid,
    a: &Solid,
    b: &Solid,
    op: BooleanOp,
    config: &BooleanConfig,
    oracle: &dyn GeometryOracle,
) -> Result<(), BooleanError> {
    *out = Solid::new();
    match engine::run(out, a, b, op, config, oracle) {
        Ok(report) => {
            info!(op = ?op, faces = report.instantiated, "boolean evaluation finished");
            Ok(())
        }
        Err(e) => {
            *out = Solid::new();
            error!(op = ?op, error = %e, "boolean evaluation failed");
            Err(e)
        }
    }
}

/// Evaluate with the default configuration. Returns 0 on success and -1 on
/// failure; details of a failure are logged.
pub fn evaluate(out: &mut Solid, a: &Solid, b: &Solid, op: BooleanOp) -> i32 {
    match DefaultBooleanEngine::default().evaluate(out, a, b, op) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Like [`evaluate`], with the operation given by its integer code.
pub fn evaluate_code(out: &mut Solid, a: &Solid, b: &Solid, code: i32) -> i32 {
    match BooleanOp::try_from(code) {
        Ok(op) => evaluate(out, a, b, op),
        Err(e) => {
            *out = Solid::new();
            error!(error = %e, "boolean evaluation rejected");
            -1
        }
    }
}

#[cfg(test)]
mod trait_tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::topology::primitives::make_box;

    fn unit_cube_at(x: f64) -> Solid {
        let mut s = Solid::new();
        make_box(&mut s, Point3d::new(x, 0.0, 0.0), Point3d::new(x + 1.0, 1.0, 1.0)).expect("cube");
        s
    }

    #[test]
    fn test_codes_round_trip() {
        for op in [BooleanOp::Union, BooleanOp::Intersect, BooleanOp::Difference, BooleanOp::Xor] {
            assert_eq!(BooleanOp::try_from(op as i32), Ok(op));
        }
        assert_eq!(BooleanOp::try_from(4), Err(BooleanError::InvalidBooleanOp { code: 4 }));
        assert!(BooleanOp::try_from(-1).is_err());
    }

    #[test]
    fn test_boolean_engine_trait_union() {
        let engine = DefaultBooleanEngine::default();
        let mut out = Solid::new();
        let result = engine.evaluate(&mut out, &unit_cube_at(0.0), &unit_cube_at(5.0), BooleanOp::Union);
        assert!(result.is_ok());
        assert_eq!(out.face_count(), 12);
    }

    #[test]
    fn test_unknown_code_clears_output() {
        let mut out = unit_cube_at(0.0);
        let status = evaluate_code(&mut out, &unit_cube_at(0.0), &unit_cube_at(0.5), 7);
        assert_eq!(status, -1);
        assert!(out.is_empty(), "output is cleared on failure");
    }

    #[test]
    fn test_output_is_replaced() {
        let mut out = unit_cube_at(10.0);
        let status = evaluate(&mut out, &unit_cube_at(0.0), &unit_cube_at(5.0), BooleanOp::Difference);
        assert_eq!(status, 0);
        assert_eq!(out.face_count(), 6, "previous contents are discarded");
    }
}
