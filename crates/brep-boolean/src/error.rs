use thiserror::Error;

/// Failure conditions raised inside an evaluation.
///
/// Only `InvalidBooleanOp` and `GeometryGeneration` abort an evaluation; the
/// others are recovered where they occur and only show up in the log.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BooleanError {
    #[error("unsupported boolean operation code {code}")]
    InvalidBooleanOp { code: i32 },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("algorithm error: {0}")]
    AlgorithmError(String),

    #[error("invalid curve interval [{start}, {end}]")]
    InvalidInterval { start: f64, end: f64 },

    #[error("geometry generation failed: {0}")]
    GeometryGeneration(String),
}

impl BooleanError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BooleanError::InvalidBooleanOp { .. } | BooleanError::GeometryGeneration(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(BooleanError::InvalidBooleanOp { code: 9 }.is_fatal());
        assert!(BooleanError::GeometryGeneration("count".into()).is_fatal());
        assert!(!BooleanError::InvalidGeometry("open loop".into()).is_fatal());
        assert!(!BooleanError::AlgorithmError("no point".into()).is_fatal());
        assert!(!BooleanError::InvalidInterval { start: 1.0, end: 0.0 }.is_fatal());
    }

    #[test]
    fn test_display_mentions_code() {
        let msg = BooleanError::InvalidBooleanOp { code: 7 }.to_string();
        assert!(msg.contains('7'), "message was {}", msg);
    }
}
