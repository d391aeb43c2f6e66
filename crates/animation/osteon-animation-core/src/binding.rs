//! Target binding: the contract animated objects implement, plus the arena
//! that owns them.
//!
//! Property paths are resolved to a [`PropertyHandle`] once, when a track is
//! attached to a target. Per-frame reads and writes go through the handle.

use std::any::Any;

use osteon_api_core::{PropertyPath, Value};
use serde::{Deserialize, Serialize};

use crate::data::AnimationPropertiesOverride;
use crate::error::AnimationError;
use crate::ids::TargetId;

/// Opaque, target-specific property identifier.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PropertyHandle(pub u32);

/// An object whose properties can be animated.
pub trait AnimationTarget: Any {
    /// Resolve a property path into a handle, `None` when the target has no
    /// such property.
    fn resolve_property(&self, path: &PropertyPath) -> Option<PropertyHandle>;

    fn get_value(&self, handle: PropertyHandle) -> Option<Value>;

    fn set_value(&mut self, handle: PropertyHandle, value: &Value) -> Result<(), AnimationError>;

    /// Baseline used for weight-under-one blending (bones expose their rest
    /// pose here).
    fn rest_pose(&self, _handle: PropertyHandle) -> Option<Value> {
        None
    }

    fn animation_properties_override(&self) -> Option<&AnimationPropertiesOverride> {
        None
    }

    /// Invalidate caches that depend on the property.
    fn mark_as_dirty(&mut self, _handle: PropertyHandle) {}

    /// Called once per frame after the late-binding pass.
    fn prepare(&mut self) {}

    /// Human-readable property name for outputs.
    fn property_name(&self, handle: PropertyHandle) -> String {
        format!("#{}", handle.0)
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Arena of scene targets.
#[derive(Default)]
pub struct TargetStore {
    items: Vec<(TargetId, Box<dyn AnimationTarget>)>,
}

impl TargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: TargetId, target: Box<dyn AnimationTarget>) {
        self.items.push((id, target));
    }

    pub fn remove(&mut self, id: TargetId) -> Option<Box<dyn AnimationTarget>> {
        let pos = self.items.iter().position(|(t, _)| *t == id)?;
        Some(self.items.remove(pos).1)
    }

    pub fn get(&self, id: TargetId) -> Option<&dyn AnimationTarget> {
        self.items
            .iter()
            .find(|(t, _)| *t == id)
            .map(|(_, target)| target.as_ref())
    }

    pub fn get_mut(&mut self, id: TargetId) -> Option<&mut (dyn AnimationTarget + 'static)> {
        self.items
            .iter_mut()
            .find(|(t, _)| *t == id)
            .map(|(_, target)| target.as_mut())
    }

    pub fn downcast<T: AnimationTarget>(&self, id: TargetId) -> Result<&T, AnimationError> {
        self.get(id)
            .ok_or(AnimationError::TargetNotFound { id })?
            .as_any()
            .downcast_ref::<T>()
            .ok_or(AnimationError::TargetTypeMismatch {
                id,
                expected: std::any::type_name::<T>(),
            })
    }

    pub fn downcast_mut<T: AnimationTarget>(&mut self, id: TargetId) -> Result<&mut T, AnimationError> {
        self.get_mut(id)
            .ok_or(AnimationError::TargetNotFound { id })?
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(AnimationError::TargetTypeMismatch {
                id,
                expected: std::any::type_name::<T>(),
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (TargetId, &mut (dyn AnimationTarget + 'static))> {
        self.items.iter_mut().map(|(id, t)| (*id, t.as_mut()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Free-form target holding named values, addressed by dotted paths.
///
/// Entries are registered with their full path (`material.alpha`). Vector
/// and color entries additionally expose `.x/.y/.z` (or `.r/.g/.b`)
/// component channels as floats.
#[derive(Clone, Debug, Default)]
pub struct PropertyBag {
    entries: Vec<(String, Value)>,
    rest: Vec<Option<Value>>,
    dirty: Vec<bool>,
    properties_override: Option<AnimationPropertiesOverride>,
}

const COMPONENT_BITS: u32 = 2;

fn component_index(name: &str) -> Option<u32> {
    match name {
        "x" | "r" | "width" => Some(1),
        "y" | "g" | "height" => Some(2),
        "z" | "b" => Some(3),
        _ => None,
    }
}

fn read_component(value: &Value, component: u32) -> Option<f32> {
    let c = (component - 1) as usize;
    match value {
        Value::Vec2(v) | Value::Size(v) if c < 2 => Some(v[c]),
        Value::Vec3(v) | Value::Color3(v) if c < 3 => Some(v[c]),
        _ => None,
    }
}

fn write_component(value: &mut Value, component: u32, x: f32) -> bool {
    let c = (component - 1) as usize;
    match value {
        Value::Vec2(v) | Value::Size(v) if c < 2 => {
            v[c] = x;
            true
        }
        Value::Vec3(v) | Value::Color3(v) if c < 3 => {
            v[c] = x;
            true
        }
        _ => false,
    }
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, path: &str, value: Value) -> Self {
        self.insert(path, value);
        self
    }

    pub fn insert(&mut self, path: &str, value: Value) {
        if let Some(slot) = self.entries.iter_mut().find(|(p, _)| p == path) {
            slot.1 = value;
            return;
        }
        self.entries.push((path.to_string(), value));
        self.rest.push(None);
        self.dirty.push(false);
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries.iter().find(|(p, _)| p == path).map(|(_, v)| v)
    }

    pub fn set_rest_pose(&mut self, path: &str, value: Value) {
        if let Some(idx) = self.entries.iter().position(|(p, _)| p == path) {
            self.rest[idx] = Some(value);
        }
    }

    pub fn set_properties_override(&mut self, value: Option<AnimationPropertiesOverride>) {
        self.properties_override = value;
    }

    pub fn is_dirty(&self, path: &str) -> bool {
        self.entries
            .iter()
            .position(|(p, _)| p == path)
            .map(|idx| self.dirty[idx])
            .unwrap_or(false)
    }

    fn decode(handle: PropertyHandle) -> (usize, u32) {
        (
            (handle.0 >> COMPONENT_BITS) as usize,
            handle.0 & ((1 << COMPONENT_BITS) - 1),
        )
    }
}

impl AnimationTarget for PropertyBag {
    fn resolve_property(&self, path: &PropertyPath) -> Option<PropertyHandle> {
        let full = path.to_string();
        if let Some(idx) = self.entries.iter().position(|(p, _)| *p == full) {
            return Some(PropertyHandle((idx as u32) << COMPONENT_BITS));
        }
        // `<entry>.<component>` on a vector entry.
        let component = component_index(path.leaf())?;
        let parent = path.parents().join(".");
        let idx = self.entries.iter().position(|(p, _)| *p == parent)?;
        read_component(&self.entries[idx].1, component)?;
        Some(PropertyHandle(((idx as u32) << COMPONENT_BITS) | component))
    }

    fn get_value(&self, handle: PropertyHandle) -> Option<Value> {
        let (idx, component) = Self::decode(handle);
        let value = &self.entries.get(idx)?.1;
        if component == 0 {
            Some(*value)
        } else {
            read_component(value, component).map(Value::Float)
        }
    }

    fn set_value(&mut self, handle: PropertyHandle, value: &Value) -> Result<(), AnimationError> {
        let (idx, component) = Self::decode(handle);
        let Some((path, slot)) = self.entries.get_mut(idx) else {
            return Err(AnimationError::PropertyNotFound {
                path: format!("#{}", handle.0),
            });
        };
        let mismatch = || AnimationError::PropertyKindMismatch {
            path: path.clone(),
            kind: value.kind(),
        };
        if component == 0 {
            if slot.kind() != value.kind() {
                return Err(mismatch());
            }
            *slot = *value;
            return Ok(());
        }
        let Value::Float(x) = value else {
            return Err(mismatch());
        };
        if write_component(slot, component, *x) {
            Ok(())
        } else {
            Err(mismatch())
        }
    }

    fn rest_pose(&self, handle: PropertyHandle) -> Option<Value> {
        let (idx, component) = Self::decode(handle);
        let rest = self.rest.get(idx)?.as_ref()?;
        if component == 0 {
            Some(*rest)
        } else {
            read_component(rest, component).map(Value::Float)
        }
    }

    fn animation_properties_override(&self) -> Option<&AnimationPropertiesOverride> {
        self.properties_override.as_ref()
    }

    fn mark_as_dirty(&mut self, handle: PropertyHandle) {
        let (idx, _) = Self::decode(handle);
        if let Some(flag) = self.dirty.get_mut(idx) {
            *flag = true;
        }
    }

    fn prepare(&mut self) {
        self.dirty.iter_mut().for_each(|d| *d = false);
    }

    fn property_name(&self, handle: PropertyHandle) -> String {
        let (idx, component) = Self::decode(handle);
        let Some((path, value)) = self.entries.get(idx) else {
            return format!("#{}", handle.0);
        };
        let suffix = match (component, value) {
            (0, _) => return path.clone(),
            (1, Value::Color3(_)) => "r",
            (2, Value::Color3(_)) => "g",
            (3, Value::Color3(_)) => "b",
            (1, _) => "x",
            (2, _) => "y",
            _ => "z",
        };
        format!("{path}.{suffix}")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bag_resolves_whole_and_component_paths() {
        let mut bag = PropertyBag::new()
            .with("material.alpha", Value::f(1.0))
            .with("material.diffuse", Value::color3(1.0, 0.0, 0.0));

        let alpha = bag
            .resolve_property(&PropertyPath::parse("material.alpha").unwrap())
            .unwrap();
        let green = bag
            .resolve_property(&PropertyPath::parse("material.diffuse.g").unwrap())
            .unwrap();
        assert!(bag
            .resolve_property(&PropertyPath::parse("material.beta").unwrap())
            .is_none());

        bag.set_value(green, &Value::f(0.5)).unwrap();
        assert_eq!(
            bag.get("material.diffuse"),
            Some(&Value::color3(1.0, 0.5, 0.0))
        );
        assert_eq!(bag.property_name(green), "material.diffuse.g");

        let err = bag.set_value(alpha, &Value::vec3(0.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, AnimationError::PropertyKindMismatch { .. }));
    }

    #[test]
    fn store_downcasts_by_type() {
        let mut store = TargetStore::new();
        store.insert(TargetId(3), Box::new(PropertyBag::new().with("a", Value::f(0.0))));
        assert!(store.downcast::<PropertyBag>(TargetId(3)).is_ok());
        assert!(matches!(
            store.downcast::<PropertyBag>(TargetId(4)),
            Err(AnimationError::TargetNotFound { .. })
        ));
        store.downcast_mut::<PropertyBag>(TargetId(3)).unwrap().insert("b", Value::f(1.0));
        assert_eq!(store.downcast::<PropertyBag>(TargetId(3)).unwrap().get("b"), Some(&Value::f(1.0)));
    }
}
