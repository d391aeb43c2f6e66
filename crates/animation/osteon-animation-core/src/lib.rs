//! Osteon Animation Core (engine-agnostic)
//!
//! Keyframe tracks evaluated by runtime animations, grouped into animatables
//! and committed once per frame through the late-binding resolver. Bones and
//! skeletons are ordinary animation targets; the look controller aims a bone
//! at a point under yaw/pitch limits.

pub mod animatable;
pub mod binding;
pub mod bone;
pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod ids;
pub mod interp;
pub mod late_binding;
pub mod look_controller;
pub mod outputs;
pub mod runtime;
pub mod scene;
pub mod scratch;
pub mod skeleton;
pub mod transform;

// Re-exports for consumers (hosts and tests)
pub use animatable::Animatable;
pub use binding::{AnimationTarget, PropertyBag, PropertyHandle, TargetStore};
pub use bone::{Bone, Space};
pub use clock::SceneClock;
pub use config::Config;
pub use data::{
    Animation, AnimationEvent, AnimationKey, AnimationPropertiesOverride, AnimationRange, KeyInterpolation, LoopMode,
};
pub use error::AnimationError;
pub use ids::{AnimId, AnimatableId, BoneId, IdAllocator, RuntimeId, TargetId};
pub use interp::{EasingCurve, EasingFunction, EasingMode};
pub use late_binding::{resolve_holder, Contribution, LateBindingHolder, LateBindingKey, LateBindingResolver};
pub use look_controller::{BoneLookController, BoneLookOptions};
pub use outputs::{Change, CoreEvent, Outputs};
pub use runtime::{EvalContext, RuntimeAnimation, SyncFrame};
pub use scene::Scene;
pub use scratch::Scratch;
pub use skeleton::Skeleton;
pub use transform::{TransformNode, Transformable};
pub use osteon_api_core::{MatrixBlend, PropertyPath, Value, ValueKind};
