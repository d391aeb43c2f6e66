//! Transform abstraction shared by scene nodes and bones, and a plain
//! transform node target.

use std::any::Any;

use glam::{Mat4, Quat, Vec3};
use osteon_api_core::{blend, PropertyPath, Value};

use crate::binding::{AnimationTarget, PropertyHandle};
use crate::data::AnimationPropertiesOverride;
use crate::error::AnimationError;

/// Something with a local transform inside a parent frame.
pub trait Transformable {
    fn local_matrix(&self) -> Mat4;

    /// Local matrix composed with every ancestor frame.
    fn world_matrix(&self) -> Mat4;

    /// Invalidate cached world data after a local change.
    fn mark_as_dirty(&mut self);

    fn scaling(&self) -> Vec3 {
        blend::decompose(self.local_matrix()).0
    }

    /// `local_axis` expressed in world space (not normalized).
    fn direction(&self, local_axis: Vec3) -> Vec3 {
        self.world_matrix().transform_vector3(local_axis)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Channel {
    Position,
    Rotation,
    Scaling,
    Visibility,
}

impl Channel {
    const ALL: [Channel; 4] = [
        Channel::Position,
        Channel::Rotation,
        Channel::Scaling,
        Channel::Visibility,
    ];

    fn name(self) -> &'static str {
        match self {
            Channel::Position => "position",
            Channel::Rotation => "rotation_quaternion",
            Channel::Scaling => "scaling",
            Channel::Visibility => "visibility",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "position" => Some(Channel::Position),
            "rotation_quaternion" | "rotationQuaternion" => Some(Channel::Rotation),
            "scaling" => Some(Channel::Scaling),
            "visibility" => Some(Channel::Visibility),
            _ => None,
        }
    }

    fn encode(self, component: u32) -> PropertyHandle {
        let idx = Channel::ALL.iter().position(|c| *c == self).unwrap_or(0) as u32;
        PropertyHandle(idx << 2 | component)
    }

    fn decode(handle: PropertyHandle) -> Option<(Self, u32)> {
        let channel = *Channel::ALL.get((handle.0 >> 2) as usize)?;
        Some((channel, handle.0 & 0b11))
    }
}

/// A node with position, rotation quaternion, scaling and visibility, all
/// animatable. Vector channels also expose `.x`, `.y` and `.z`.
#[derive(Clone, Debug)]
pub struct TransformNode {
    pub name: String,
    position: Vec3,
    rotation: Quat,
    scaling: Vec3,
    visibility: f32,
    parent_world: Mat4,
    world: Mat4,
    dirty: bool,
    properties_override: Option<AnimationPropertiesOverride>,
}

impl Default for TransformNode {
    fn default() -> Self {
        Self::new("node")
    }
}

impl TransformNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scaling: Vec3::ONE,
            visibility: 1.0,
            parent_world: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
            dirty: false,
            properties_override: None,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.dirty = true;
    }

    pub fn rotation_quaternion(&self) -> Quat {
        self.rotation
    }

    pub fn set_rotation_quaternion(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.dirty = true;
    }

    pub fn set_scaling(&mut self, scaling: Vec3) {
        self.scaling = scaling;
        self.dirty = true;
    }

    pub fn visibility(&self) -> f32 {
        self.visibility
    }

    /// World frame of the parent; identity for scene roots.
    pub fn set_parent_world(&mut self, parent_world: Mat4) {
        self.parent_world = parent_world;
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_properties_override(&mut self, value: Option<AnimationPropertiesOverride>) {
        self.properties_override = value;
    }

    /// Recompute the cached world matrix.
    pub fn compute_world_matrix(&mut self) -> Mat4 {
        self.world = self.parent_world * self.local_matrix();
        self.dirty = false;
        self.world
    }

    fn channel_value(&self, channel: Channel) -> Value {
        match channel {
            Channel::Position => Value::Vec3(self.position),
            Channel::Rotation => Value::Quat(self.rotation),
            Channel::Scaling => Value::Vec3(self.scaling),
            Channel::Visibility => Value::Float(self.visibility),
        }
    }

    fn vector_mut(&mut self, channel: Channel) -> Option<&mut Vec3> {
        match channel {
            Channel::Position => Some(&mut self.position),
            Channel::Scaling => Some(&mut self.scaling),
            _ => None,
        }
    }
}

impl Transformable for TransformNode {
    fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scaling, self.rotation, self.position)
    }

    fn world_matrix(&self) -> Mat4 {
        if self.dirty {
            self.parent_world * self.local_matrix()
        } else {
            self.world
        }
    }

    fn mark_as_dirty(&mut self) {
        self.dirty = true;
    }

    fn scaling(&self) -> Vec3 {
        self.scaling
    }
}

impl AnimationTarget for TransformNode {
    fn resolve_property(&self, path: &PropertyPath) -> Option<PropertyHandle> {
        let channel = Channel::parse(path.first())?;
        match (path.len(), channel) {
            (1, _) => Some(channel.encode(0)),
            (2, Channel::Position | Channel::Scaling) => {
                let component = match path.leaf() {
                    "x" => 1,
                    "y" => 2,
                    "z" => 3,
                    _ => return None,
                };
                Some(channel.encode(component))
            }
            _ => None,
        }
    }

    fn get_value(&self, handle: PropertyHandle) -> Option<Value> {
        let (channel, component) = Channel::decode(handle)?;
        let value = self.channel_value(channel);
        match (component, value) {
            (0, v) => Some(v),
            (c, Value::Vec3(v)) => Some(Value::Float(v[(c - 1) as usize])),
            _ => None,
        }
    }

    fn set_value(&mut self, handle: PropertyHandle, value: &Value) -> Result<(), AnimationError> {
        let mismatch = |path: &str| AnimationError::PropertyKindMismatch {
            path: path.to_string(),
            kind: value.kind(),
        };
        let (channel, component) = Channel::decode(handle).ok_or(AnimationError::PropertyNotFound {
            path: format!("#{}", handle.0),
        })?;
        match (channel, component, value) {
            (Channel::Rotation, 0, Value::Quat(q)) => self.rotation = *q,
            (Channel::Visibility, 0, Value::Float(x)) => self.visibility = *x,
            (Channel::Position | Channel::Scaling, 0, Value::Vec3(v)) => {
                if let Some(slot) = self.vector_mut(channel) {
                    *slot = *v;
                }
            }
            (Channel::Position | Channel::Scaling, c @ 1..=3, Value::Float(x)) => {
                if let Some(slot) = self.vector_mut(channel) {
                    slot[(c - 1) as usize] = *x;
                }
            }
            _ => return Err(mismatch(&self.property_name(handle))),
        }
        Ok(())
    }

    fn animation_properties_override(&self) -> Option<&AnimationPropertiesOverride> {
        self.properties_override.as_ref()
    }

    fn mark_as_dirty(&mut self, _handle: PropertyHandle) {
        self.dirty = true;
    }

    fn prepare(&mut self) {
        if self.dirty {
            self.compute_world_matrix();
        }
    }

    fn property_name(&self, handle: PropertyHandle) -> String {
        match Channel::decode(handle) {
            Some((channel, 0)) => channel.name().to_string(),
            Some((channel, c)) => format!("{}.{}", channel.name(), ["x", "y", "z"][(c - 1) as usize]),
            None => format!("#{}", handle.0),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
