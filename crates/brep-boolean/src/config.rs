//! Tunables for an evaluation.

use serde::{Deserialize, Serialize};

use crate::Tolerance;
use crate::error::BooleanError;

/// Limits and tolerances threaded through every stage of an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BooleanConfig {
    pub tolerance: Tolerance,
    /// Refinement levels of the interior-point grid search (level `d` uses a
    /// `2^d × 2^d` grid).
    pub max_grid_depth: u32,
    /// Samples along a curved surface/surface intersection.
    pub ssi_samples: usize,
    /// Samples per non-linear trim curve when flattening for membership,
    /// area and bounding-box queries.
    pub flatten_samples: usize,
    /// Merge kept fragments that share one parametrisation and orientation.
    pub merge_coplanar_faces: bool,
}

impl Default for BooleanConfig {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::default(),
            max_grid_depth: 8,
            ssi_samples: 96,
            flatten_samples: 32,
            merge_coplanar_faces: true,
        }
    }
}

impl BooleanConfig {
    /// Parse a (possibly partial) JSON configuration; missing keys keep
    /// their defaults.
    pub fn from_json(text: &str) -> Result<Self, BooleanError> {
        serde_json::from_str(text)
            .map_err(|e| BooleanError::InvalidGeometry(format!("bad configuration: {e}")))
    }
}
