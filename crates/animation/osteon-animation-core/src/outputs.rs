//! Per-frame outputs of the scene tick.
//!
//! `changes` lists every value committed by the late-binding pass;
//! write-through (unweighted) values are applied directly and not listed.
//! `events` carries semantic notifications in the order they happened.

use osteon_api_core::Value;
use serde::{Deserialize, Serialize};

use crate::ids::{AnimatableId, TargetId};

/// One late-bound value written onto a target this frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub target: TargetId,
    pub property: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CoreEvent {
    /// A keyframe event was crossed.
    AnimationEvent {
        animatable: AnimatableId,
        animation: String,
        name: String,
        frame: f32,
    },
    /// A looping track wrapped around its range.
    AnimationLooped {
        animatable: AnimatableId,
        animation: String,
        repeat_count: i32,
    },
    /// The animatable ran past its range without looping, or was stopped.
    AnimatableEnded { animatable: AnimatableId },
    Error {
        animatable: Option<AnimatableId>,
        message: String,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default)]
    pub events: Vec<CoreEvent>,
}

impl Outputs {
    #[inline]
    pub fn clear(&mut self) {
        self.changes.clear();
        self.events.clear();
    }

    #[inline]
    pub fn push_change(&mut self, change: Change) {
        self.changes.push(change);
    }

    #[inline]
    pub fn push_event(&mut self, event: CoreEvent) {
        self.events.push(event);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.events.is_empty()
    }

    /// Drop events beyond `max`, returning how many were dropped.
    pub fn truncate_events(&mut self, max: usize) -> usize {
        let dropped = self.events.len().saturating_sub(max);
        self.events.truncate(max);
        dropped
    }
}
