//! Scene-wide configuration for osteon-animation-core.

use osteon_api_core::MatrixBlend;
use serde::{Deserialize, Serialize};

use crate::error::AnimationError;

/// Evaluation flags and sizing hints. Every field has a default, so partial
/// JSON documents are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interpolate MATRIX keys between frames. When off, matrix tracks snap to
    /// the start key of the current segment.
    pub allow_matrices_interpolation: bool,
    /// Interpolate and blend matrices through scale/rotation/translation
    /// decomposition instead of element-wise.
    pub allow_matrix_decompose_for_interpolation: bool,

    /// Advance the clock by a fixed 16 ms per frame.
    pub use_constant_animation_delta_time: bool,
    /// Multiplier applied to wall-clock deltas.
    pub animation_time_scale: f64,
    pub animations_enabled: bool,

    /// Initial capacity hints for scratch buffers.
    pub scratch_quaternions: usize,
    pub scratch_holders: usize,

    /// Maximum events kept per tick; the rest are dropped with a warning.
    pub max_events_per_tick: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allow_matrices_interpolation: false,
            allow_matrix_decompose_for_interpolation: true,
            use_constant_animation_delta_time: false,
            animation_time_scale: 1.0,
            animations_enabled: true,
            scratch_quaternions: 16,
            scratch_holders: 64,
            max_events_per_tick: 1024,
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, AnimationError> {
        serde_json::from_str(text).map_err(|e| AnimationError::InvalidConfig {
            reason: e.to_string(),
        })
    }

    #[inline]
    pub fn matrix_blend(&self) -> MatrixBlend {
        if self.allow_matrix_decompose_for_interpolation {
            MatrixBlend::Decompose
        } else {
            MatrixBlend::Elementwise
        }
    }

    /// Matrix interpolation policy for key segments, `None` when matrices snap.
    #[inline]
    pub fn matrix_interpolation(&self) -> Option<MatrixBlend> {
        self.allow_matrices_interpolation.then(|| self.matrix_blend())
    }
}
