//! Keyframe track data model.
//!
//! An [`Animation`] is an ordered, typed key sequence bound by name to one
//! property path, plus loop mode, easing, named frame ranges and events.
//! Keys are validated and sorted when set; a frame-0 key is synthesized when
//! the first key starts later.

use osteon_api_core::json::normalize_value_json;
use osteon_api_core::{PropertyPath, Value, ValueKind};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::AnimationError;
use crate::ids::{AnimId, RuntimeId};
use crate::interp::EasingFunction;

/// Behavior at and after the end of the play range.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopMode {
    /// Each loop continues from the previous loop's end value.
    Relative,
    /// Restart from the beginning.
    #[default]
    Cycle,
    /// Hold the last value.
    Constant,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyInterpolation {
    #[default]
    Linear,
    /// Hold the key's value until the next key.
    Step,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationKey {
    pub frame: f32,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_tangent: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_tangent: Option<Value>,
    #[serde(default)]
    pub interpolation: KeyInterpolation,
}

impl AnimationKey {
    pub fn new(frame: f32, value: Value) -> Self {
        Self {
            frame,
            value,
            in_tangent: None,
            out_tangent: None,
            interpolation: KeyInterpolation::Linear,
        }
    }

    pub fn with_tangents(mut self, in_tangent: Option<Value>, out_tangent: Option<Value>) -> Self {
        self.in_tangent = in_tangent;
        self.out_tangent = out_tangent;
        self
    }

    pub fn step(mut self) -> Self {
        self.interpolation = KeyInterpolation::Step;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationRange {
    pub name: String,
    pub from: f32,
    pub to: f32,
}

/// Frame-triggered notification. Fired events surface as
/// `CoreEvent::AnimationEvent` in the frame outputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationEvent {
    pub frame: f32,
    pub name: String,
    #[serde(default)]
    pub only_once: bool,
}

impl AnimationEvent {
    pub fn new(frame: f32, name: impl Into<String>, only_once: bool) -> Self {
        Self {
            frame,
            name: name.into(),
            only_once,
        }
    }
}

/// Target-level replacement for a track's blending and loop settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationPropertiesOverride {
    pub enable_blending: bool,
    pub blending_speed: f32,
    pub loop_mode: LoopMode,
}

impl Default for AnimationPropertiesOverride {
    fn default() -> Self {
        Self {
            enable_blending: false,
            blending_speed: 0.01,
            loop_mode: LoopMode::Cycle,
        }
    }
}

fn default_fps() -> f32 {
    60.0
}

fn default_blending_speed() -> f32 {
    0.01
}

fn invalid_json(e: serde_json::Error) -> AnimationError {
    AnimationError::InvalidAnimation {
        reason: e.to_string(),
    }
}

/// Rewrite shorthand key values of a track document in place.
pub(crate) fn normalize_key_values(doc: &mut JsonValue) {
    let Some(keys) = doc.get_mut("keys").and_then(JsonValue::as_array_mut) else {
        return;
    };
    for key in keys {
        for field in ["value", "in_tangent", "out_tangent"] {
            if let Some(slot) = key.get_mut(field) {
                *slot = normalize_value_json(slot.take());
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Animation {
    #[serde(skip)]
    pub id: Option<AnimId>,
    pub name: String,
    /// Dotted property path on the target, e.g. `position.x`.
    pub target_property: String,
    #[serde(default = "default_fps")]
    pub frame_per_second: f32,
    pub data_type: ValueKind,
    #[serde(default)]
    pub loop_mode: LoopMode,
    #[serde(default)]
    pub enable_blending: bool,
    #[serde(default = "default_blending_speed")]
    pub blending_speed: f32,
    #[serde(default)]
    pub easing: Option<EasingFunction>,
    #[serde(default)]
    keys: Vec<AnimationKey>,
    #[serde(default)]
    ranges: Vec<AnimationRange>,
    #[serde(default)]
    events: Vec<AnimationEvent>,
    #[serde(skip)]
    runtime_animations: Vec<RuntimeId>,
}

impl Animation {
    pub fn new(
        name: impl Into<String>,
        target_property: impl Into<String>,
        frame_per_second: f32,
        data_type: ValueKind,
        loop_mode: LoopMode,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            target_property: target_property.into(),
            frame_per_second,
            data_type,
            loop_mode,
            enable_blending: false,
            blending_speed: default_blending_speed(),
            easing: None,
            keys: Vec::new(),
            ranges: Vec::new(),
            events: Vec::new(),
            runtime_animations: Vec::new(),
        }
    }

    /// Deserialize a track and normalize its keys. Key values may use the
    /// shorthand forms accepted by [`osteon_api_core::json`].
    pub fn from_json(text: &str) -> Result<Self, AnimationError> {
        let mut doc: JsonValue = serde_json::from_str(text).map_err(invalid_json)?;
        normalize_key_values(&mut doc);
        let anim: Animation = serde_json::from_value(doc).map_err(invalid_json)?;
        anim.normalized()
    }

    /// Sort keys and events of a freshly deserialized track.
    pub(crate) fn normalized(mut self) -> Result<Self, AnimationError> {
        let keys = std::mem::take(&mut self.keys);
        self.set_keys(keys)?;
        self.events
            .sort_by(|a, b| a.frame.total_cmp(&b.frame));
        Ok(self)
    }

    /// Parsed target path, `None` when the path is empty or malformed.
    pub fn target_property_path(&self) -> Option<PropertyPath> {
        PropertyPath::parse(&self.target_property).ok()
    }

    pub fn keys(&self) -> &[AnimationKey] {
        &self.keys
    }

    /// Replace the key sequence. Keys are checked against `data_type`, sorted
    /// by frame, and a frame-0 key copying the first value is inserted when
    /// the sequence starts after frame 0.
    pub fn set_keys(&mut self, mut keys: Vec<AnimationKey>) -> Result<(), AnimationError> {
        for key in &keys {
            let values = std::iter::once(&key.value)
                .chain(key.in_tangent.iter())
                .chain(key.out_tangent.iter());
            for value in values {
                if value.kind() != self.data_type {
                    return Err(AnimationError::KeyKindMismatch {
                        animation: self.name.clone(),
                        frame: key.frame,
                        expected: self.data_type,
                        actual: value.kind(),
                    });
                }
            }
        }
        keys.sort_by(|a, b| a.frame.total_cmp(&b.frame));
        if let Some(first) = keys.first() {
            if first.frame > 0.0 {
                let synthesized = AnimationKey::new(0.0, first.value);
                keys.insert(0, synthesized);
            }
        }
        self.keys = keys;
        Ok(())
    }

    /// Frame of the last key, 0 for an empty track.
    pub fn highest_frame(&self) -> f32 {
        self.keys.last().map(|k| k.frame).unwrap_or(0.0)
    }

    pub fn set_easing_function(&mut self, easing: Option<EasingFunction>) {
        self.easing = easing;
    }

    /// Register a named frame range. An existing range with the same name is
    /// kept.
    pub fn create_range(&mut self, name: impl Into<String>, from: f32, to: f32) {
        let name = name.into();
        if self.range(&name).is_none() {
            self.ranges.push(AnimationRange { name, from, to });
        }
    }

    /// Remove a named range, optionally dropping the keys inside it.
    pub fn delete_range(&mut self, name: &str, delete_frames: bool) {
        let Some(pos) = self.ranges.iter().position(|r| r.name == name) else {
            return;
        };
        let range = self.ranges.remove(pos);
        if delete_frames {
            self.keys
                .retain(|k| !(k.frame >= range.from && k.frame <= range.to));
        }
    }

    pub fn range(&self, name: &str) -> Option<&AnimationRange> {
        self.ranges.iter().find(|r| r.name == name)
    }

    pub fn ranges(&self) -> &[AnimationRange] {
        &self.ranges
    }

    /// Add an event, keeping events ordered by frame.
    pub fn add_event(&mut self, event: AnimationEvent) {
        let idx = self.events.partition_point(|e| e.frame <= event.frame);
        self.events.insert(idx, event);
    }

    pub fn remove_events(&mut self, frame: f32) {
        self.events.retain(|e| e.frame != frame);
    }

    pub fn events(&self) -> &[AnimationEvent] {
        &self.events
    }

    /// Runtime animations currently bound to this track.
    pub fn runtime_animations(&self) -> &[RuntimeId] {
        &self.runtime_animations
    }

    pub(crate) fn register_runtime(&mut self, id: RuntimeId) {
        self.runtime_animations.push(id);
    }

    pub(crate) fn unregister_runtime(&mut self, id: RuntimeId) {
        self.runtime_animations.retain(|r| *r != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_track(keys: &[(f32, f32)]) -> Animation {
        let mut anim = Animation::new("fade", "visibility", 30.0, ValueKind::Float, LoopMode::Cycle);
        anim.set_keys(
            keys.iter()
                .map(|(f, v)| AnimationKey::new(*f, Value::f(*v)))
                .collect(),
        )
        .unwrap();
        anim
    }

    #[test]
    fn keys_are_sorted_and_frame_zero_synthesized() {
        let anim = float_track(&[(20.0, 2.0), (5.0, 1.0)]);
        let frames: Vec<f32> = anim.keys().iter().map(|k| k.frame).collect();
        assert_eq!(frames, vec![0.0, 5.0, 20.0]);
        assert_eq!(anim.keys()[0].value, Value::f(1.0));
        assert_eq!(anim.highest_frame(), 20.0);
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let mut anim = Animation::new("a", "position", 60.0, ValueKind::Vec3, LoopMode::Cycle);
        let err = anim
            .set_keys(vec![AnimationKey::new(0.0, Value::f(1.0))])
            .unwrap_err();
        assert!(matches!(err, AnimationError::KeyKindMismatch { .. }));

        let err = anim
            .set_keys(vec![AnimationKey::new(0.0, Value::vec3(0.0, 0.0, 0.0))
                .with_tangents(Some(Value::f(0.0)), None)])
            .unwrap_err();
        assert!(matches!(err, AnimationError::KeyKindMismatch { .. }));
    }

    #[test]
    fn ranges_create_and_delete() {
        let mut anim = float_track(&[(0.0, 0.0), (10.0, 1.0), (20.0, 2.0), (30.0, 3.0)]);
        anim.create_range("walk", 0.0, 10.0);
        anim.create_range("walk", 5.0, 6.0);
        assert_eq!(anim.range("walk").unwrap().to, 10.0);

        anim.create_range("run", 20.0, 30.0);
        anim.delete_range("run", true);
        assert!(anim.range("run").is_none());
        assert_eq!(anim.keys().len(), 2);
    }

    #[test]
    fn events_stay_ordered() {
        let mut anim = float_track(&[(0.0, 0.0), (10.0, 1.0)]);
        anim.add_event(AnimationEvent::new(8.0, "late", false));
        anim.add_event(AnimationEvent::new(2.0, "early", true));
        let names: Vec<&str> = anim.events().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["early", "late"]);
        anim.remove_events(2.0);
        assert_eq!(anim.events().len(), 1);
    }

    #[test]
    fn empty_path_has_no_property() {
        let anim = Animation::new("broken", "", 60.0, ValueKind::Float, LoopMode::Cycle);
        assert!(anim.target_property_path().is_none());
    }

    #[test]
    fn from_json_normalizes_keys() {
        let json = r#"{
            "name": "bounce",
            "target_property": "position.y",
            "data_type": "Float",
            "keys": [
                { "frame": 10, "value": { "type": "Float", "data": 1.0 } },
                { "frame": 20, "value": 0.0, "out_tangent": 0.5 }
            ]
        }"#;
        let anim = Animation::from_json(json).unwrap();
        assert_eq!(anim.frame_per_second, 60.0);
        assert_eq!(anim.keys().len(), 3);
        assert_eq!(anim.loop_mode, LoopMode::Cycle);
        assert_eq!(anim.keys()[2].out_tangent, Some(Value::f(0.5)));
    }
}
