//! Call-scoped scratch buffers.
//!
//! The scene owns one `Scratch` and lends it by `&mut` to the late-binding
//! pass. Callees clear what they use on entry and never keep references past
//! the call, so nested use cannot observe stale contents.

use glam::Quat;

use crate::config::Config;

#[derive(Debug, Default)]
pub struct Scratch {
    /// Rotations gathered for an N-way quaternion blend.
    pub quaternions: Vec<Quat>,
    /// Normalized weights parallel to `quaternions`.
    pub weights: Vec<f32>,
}

impl Scratch {
    pub fn new(cfg: &Config) -> Self {
        Self {
            quaternions: Vec::with_capacity(cfg.scratch_quaternions),
            weights: Vec::with_capacity(cfg.scratch_quaternions),
        }
    }

    #[inline]
    pub fn begin_quaternion_blend(&mut self) {
        self.quaternions.clear();
        self.weights.clear();
    }

    #[inline]
    pub fn push_quaternion(&mut self, q: Quat, weight: f32) {
        self.quaternions.push(q);
        self.weights.push(weight);
    }
}
