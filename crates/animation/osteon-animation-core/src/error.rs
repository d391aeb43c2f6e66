//! Error types for the animation core.

use osteon_api_core::{ValueError, ValueKind};

use crate::ids::{AnimId, AnimatableId, BoneId, TargetId};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AnimationError {
    #[error("animation not found: {id:?}")]
    AnimationNotFound { id: AnimId },

    #[error("animatable not found: {id:?}")]
    AnimatableNotFound { id: AnimatableId },

    #[error("target not found: {id:?}")]
    TargetNotFound { id: TargetId },

    /// The target exists but is not of the requested concrete type.
    #[error("target {id:?} is not a {expected}")]
    TargetTypeMismatch { id: TargetId, expected: &'static str },

    #[error("bone not found: {name}")]
    BoneNotFound { name: String },

    #[error("bone index out of range: {id:?}")]
    BoneOutOfRange { id: BoneId },

    /// Re-parenting would make a bone its own ancestor.
    #[error("bone {bone:?} cannot be parented under its descendant {parent:?}")]
    BoneCycle { bone: BoneId, parent: BoneId },

    /// A key (or tangent) does not match the track's data type.
    #[error("key at frame {frame} in '{animation}' is {actual:?}, track is {expected:?}")]
    KeyKindMismatch {
        animation: String,
        frame: f32,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("property '{path}' does not accept {kind:?}")]
    PropertyKindMismatch { path: String, kind: ValueKind },

    #[error("property '{path}' cannot be resolved on the target")]
    PropertyNotFound { path: String },

    #[error("invalid animation json: {reason}")]
    InvalidAnimation { reason: String },

    #[error("invalid config json: {reason}")]
    InvalidConfig { reason: String },

    #[error(transparent)]
    Value(#[from] ValueError),
}
