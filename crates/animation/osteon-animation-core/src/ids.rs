//! Identifiers and simple allocators for core entities.

use serde::{Deserialize, Serialize};

/// Animation (keyframe track) loaded into a scene.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AnimId(pub u32);

/// A playing group of runtime animations.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AnimatableId(pub u32);

/// One track bound to one target property.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RuntimeId(pub u32);

/// Object owned by the scene's target store.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub u32);

/// Index of a bone inside its skeleton.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BoneId(pub u32);

impl BoneId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Monotonic allocator for scene-level ids.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_anim: u32,
    next_animatable: u32,
    next_runtime: u32,
    next_target: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_anim(&mut self) -> AnimId {
        let id = AnimId(self.next_anim);
        self.next_anim = self.next_anim.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_animatable(&mut self) -> AnimatableId {
        let id = AnimatableId(self.next_animatable);
        self.next_animatable = self.next_animatable.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_runtime(&mut self) -> RuntimeId {
        let id = RuntimeId(self.next_runtime);
        self.next_runtime = self.next_runtime.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_target(&mut self) -> TargetId {
        let id = TargetId(self.next_target);
        self.next_target = self.next_target.wrapping_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_monotonic() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_anim(), AnimId(0));
        assert_eq!(alloc.alloc_anim(), AnimId(1));
        assert_eq!(alloc.alloc_animatable(), AnimatableId(0));
        assert_eq!(alloc.alloc_runtime(), RuntimeId(0));
        assert_eq!(alloc.alloc_runtime(), RuntimeId(1));
        assert_eq!(alloc.alloc_target(), TargetId(0));
    }
}
