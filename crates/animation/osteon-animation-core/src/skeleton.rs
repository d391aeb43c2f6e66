//! Skeleton: owns a flat bone list and keeps absolute transforms in sync.
//!
//! Matrices are column-major with column vectors, so a bone's absolute
//! transform is `parent.absolute * local` and the root is
//! `pose_matrix * local`. Bone operations take a `BoneId` and, for world
//! space, an optional mesh whose world matrix frames the skeleton.
//!
//! The skeleton is also an animation target: `"<bone>.matrix"` addresses a
//! bone's local matrix, and the bone rest pose is the late-binding baseline.

use std::any::Any;

use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};
use log::debug;
use osteon_api_core::{blend, PropertyPath, Value, ValueKind};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::binding::{AnimationTarget, PropertyHandle};
use crate::bone::{Bone, Space};
use crate::data::{normalize_key_values, Animation, AnimationKey, AnimationPropertiesOverride, LoopMode};
use crate::error::AnimationError;
use crate::ids::BoneId;
use crate::transform::Transformable;

fn mesh_world(mesh: Option<&dyn Transformable>) -> Mat4 {
    mesh.map_or(Mat4::IDENTITY, |m| m.world_matrix())
}

fn is_invertible(m: &Mat4) -> bool {
    let det = m.determinant();
    det != 0.0 && det.is_finite()
}

/// Serialized skeleton. Bones are listed parents first; `parent` indexes
/// into `bones`. Matrices are 16 column-major floats.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkeletonDesc {
    pub name: String,
    #[serde(default)]
    pub bones: Vec<BoneDesc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoneDesc {
    pub name: String,
    #[serde(default)]
    pub parent: Option<u32>,
    pub matrix: Mat4,
    #[serde(default)]
    pub rest: Option<Mat4>,
    #[serde(default)]
    pub length: Option<f32>,
    #[serde(default)]
    pub animation: Option<Animation>,
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    pub name: String,
    bones: Vec<Bone>,
    pose_matrix: Option<Mat4>,
    dirty: bool,
    properties_override: Option<AnimationPropertiesOverride>,
}

impl Skeleton {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bones: Vec::new(),
            pose_matrix: None,
            dirty: false,
            properties_override: None,
        }
    }

    /// Build a skeleton from its description. A bone whose parent is not
    /// listed before it is rejected.
    pub fn from_desc(desc: SkeletonDesc) -> Result<Self, AnimationError> {
        let mut skeleton = Skeleton::new(desc.name);
        for (i, bone) in desc.bones.into_iter().enumerate() {
            let parent = match bone.parent {
                Some(p) if p as usize >= i => return Err(AnimationError::BoneOutOfRange { id: BoneId(p) }),
                p => p.map(BoneId),
            };
            let id = skeleton.add_bone_with(bone.name, parent, bone.matrix, bone.rest, None)?;
            let b = &mut skeleton.bones[id.index()];
            b.length = bone.length;
            if let Some(animation) = bone.animation {
                b.animations.push(animation.normalized()?);
            }
        }
        skeleton.compute_absolute_transforms();
        Ok(skeleton)
    }

    pub fn from_json(text: &str) -> Result<Self, AnimationError> {
        let invalid = |e: serde_json::Error| AnimationError::InvalidAnimation {
            reason: e.to_string(),
        };
        let mut doc: JsonValue = serde_json::from_str(text).map_err(invalid)?;
        if let Some(bones) = doc.get_mut("bones").and_then(JsonValue::as_array_mut) {
            for bone in bones {
                if let Some(animation) = bone.get_mut("animation") {
                    normalize_key_values(animation);
                }
            }
        }
        let desc: SkeletonDesc = serde_json::from_value(doc).map_err(invalid)?;
        Self::from_desc(desc)
    }

    /// Append a bone whose rest pose and base matrix equal `local`.
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<BoneId>,
        local: Mat4,
    ) -> Result<BoneId, AnimationError> {
        self.add_bone_with(name, parent, local, None, None)
    }

    pub fn add_bone_with(
        &mut self,
        name: impl Into<String>,
        parent: Option<BoneId>,
        local: Mat4,
        rest_pose: Option<Mat4>,
        base: Option<Mat4>,
    ) -> Result<BoneId, AnimationError> {
        if let Some(p) = parent {
            self.index(p)?;
        }
        let id = BoneId(self.bones.len() as u32);
        self.bones
            .push(Bone::new(name.into(), local, rest_pose, base));
        self.set_parent(id, parent, false)?;
        self.update_difference(id.index(), None);
        Ok(id)
    }

    fn index(&self, id: BoneId) -> Result<usize, AnimationError> {
        if id.index() < self.bones.len() {
            Ok(id.index())
        } else {
            Err(AnimationError::BoneOutOfRange { id })
        }
    }

    pub fn bone(&self, id: BoneId) -> Result<&Bone, AnimationError> {
        let i = self.index(id)?;
        Ok(&self.bones[i])
    }

    pub fn bone_mut(&mut self, id: BoneId) -> Result<&mut Bone, AnimationError> {
        let i = self.index(id)?;
        Ok(&mut self.bones[i])
    }

    pub fn bone_id(&self, name: &str) -> Option<BoneId> {
        self.bones
            .iter()
            .position(|b| b.name == name)
            .map(|i| BoneId(i as u32))
    }

    pub fn bone_by_name(&self, name: &str) -> Result<BoneId, AnimationError> {
        self.bone_id(name).ok_or_else(|| AnimationError::BoneNotFound {
            name: name.to_string(),
        })
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn pose_matrix(&self) -> Option<Mat4> {
        self.pose_matrix
    }

    /// Global transform applied above every root bone.
    pub fn set_pose_matrix(&mut self, pose: Option<Mat4>) {
        self.pose_matrix = pose;
        self.dirty = true;
    }

    pub fn set_properties_override(&mut self, value: Option<AnimationPropertiesOverride>) {
        self.properties_override = value;
    }

    pub fn mark_as_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn mark_bone_dirty(&mut self, i: usize) {
        self.bones[i].dirty = true;
        self.dirty = true;
    }

    /// Move `id` under `parent` (or make it a root). With
    /// `update_difference_matrix`, absolute transforms are rebuilt from the
    /// base matrices of the moved subtree.
    pub fn set_parent(
        &mut self,
        id: BoneId,
        parent: Option<BoneId>,
        update_difference_matrix: bool,
    ) -> Result<(), AnimationError> {
        let i = self.index(id)?;
        if let Some(p) = parent {
            let mut cursor = Some(self.index(p)?);
            while let Some(c) = cursor {
                if c == i {
                    return Err(AnimationError::BoneCycle { bone: id, parent: p });
                }
                cursor = self.bones[c].parent.map(BoneId::index);
            }
        }
        if self.bones[i].parent == parent {
            return Ok(());
        }
        if let Some(old) = self.bones[i].parent {
            self.bones[old.index()].children.retain(|c| *c != id);
        }
        self.bones[i].parent = parent;
        if let Some(p) = parent {
            self.bones[p.index()].children.push(id);
        }
        if update_difference_matrix {
            self.update_difference(i, None);
        }
        self.mark_bone_dirty(i);
        Ok(())
    }

    /// Replace base and local matrices of a bone.
    pub fn update_matrix(
        &mut self,
        id: BoneId,
        matrix: Mat4,
        update_difference_matrix: bool,
    ) -> Result<(), AnimationError> {
        let i = self.index(id)?;
        self.bones[i].base = matrix;
        self.bones[i].local = matrix;
        if update_difference_matrix {
            self.update_difference(i, None);
        }
        self.mark_bone_dirty(i);
        Ok(())
    }

    /// Rebuild absolute and inverted absolute transforms of a subtree from
    /// `root` (the bone's base matrix when `None`).
    pub fn update_difference_matrix(&mut self, id: BoneId, root: Option<Mat4>) -> Result<(), AnimationError> {
        let i = self.index(id)?;
        self.update_difference(i, root);
        Ok(())
    }

    fn update_difference(&mut self, i: usize, root: Option<Mat4>) {
        let root = root.unwrap_or(self.bones[i].base);
        let absolute = match self.bones[i].parent {
            Some(p) => self.bones[p.index()].absolute * root,
            None => root,
        };
        let bone = &mut self.bones[i];
        bone.absolute = absolute;
        bone.inverted_absolute = absolute.inverse();
        for c in 0..self.bones[i].children.len() {
            let child = self.bones[i].children[c].index();
            self.update_difference(child, None);
        }
        self.bones[i].scaling_determinant = if absolute.determinant() < 0.0 { -1.0 } else { 1.0 };
    }

    /// Recompute absolute transforms of every bone from local matrices.
    pub fn compute_absolute_transforms(&mut self) {
        for i in 0..self.bones.len() {
            if self.bones[i].parent.is_none() {
                self.compute_bone_absolute(i);
            }
        }
    }

    /// Recompute absolute transforms of one bone and its descendants.
    pub fn compute_bone_absolute_transforms(&mut self, id: BoneId) -> Result<(), AnimationError> {
        let i = self.index(id)?;
        self.compute_bone_absolute(i);
        Ok(())
    }

    fn compute_bone_absolute(&mut self, i: usize) {
        let local = self.bones[i].local;
        self.bones[i].absolute = match self.bones[i].parent {
            Some(p) => self.bones[p.index()].absolute * local,
            None => self.pose_matrix.map_or(local, |pose| pose * local),
        };
        for c in 0..self.bones[i].children.len() {
            let child = self.bones[i].children[c].index();
            self.compute_bone_absolute(child);
        }
    }

    /// Absolute transform from the current local matrices, without touching
    /// the cached one.
    fn current_absolute(&self, i: usize) -> Mat4 {
        let mut m = self.bones[i].local;
        let mut cursor = self.bones[i].parent;
        while let Some(p) = cursor {
            let parent = &self.bones[p.index()];
            m = parent.local * m;
            cursor = parent.parent;
        }
        self.pose_matrix.map_or(m, |pose| pose * m)
    }

    /// Mesh world matrix times the bone's current absolute transform.
    fn world_of(&self, i: usize, mesh: Option<&dyn Transformable>) -> Mat4 {
        mesh_world(mesh) * self.current_absolute(i)
    }

    /// Frame that world-space inputs are converted from for bone `i`: the
    /// parent's world transform, or the mesh world for roots.
    fn parent_world_of(&self, i: usize, mesh: Option<&dyn Transformable>) -> Mat4 {
        match self.bones[i].parent {
            Some(p) => self.world_of(p.index(), mesh),
            None => mesh_world(mesh),
        }
    }

    /// Recompute absolute transforms when anything changed since the last
    /// call.
    pub fn prepare(&mut self) {
        if !self.dirty {
            return;
        }
        self.compute_absolute_transforms();
        for bone in &mut self.bones {
            bone.dirty = false;
        }
        self.dirty = false;
    }

    pub fn return_to_rest(&mut self, id: BoneId) -> Result<(), AnimationError> {
        let rest = self.bone(id)?.rest_pose;
        self.update_matrix(id, rest, true)
    }

    pub fn return_all_to_rest(&mut self) {
        for i in 0..self.bones.len() {
            let rest = self.bones[i].rest_pose;
            self.bones[i].base = rest;
            self.bones[i].local = rest;
            self.bones[i].dirty = true;
        }
        for i in 0..self.bones.len() {
            if self.bones[i].parent.is_none() {
                self.update_difference(i, None);
            }
        }
        self.dirty = true;
    }

    pub fn translate(
        &mut self,
        id: BoneId,
        vec: Vec3,
        space: Space,
        mesh: Option<&dyn Transformable>,
    ) -> Result<(), AnimationError> {
        let i = self.index(id)?;
        let delta = match space {
            Space::World => {
                let mut frame = self.parent_world_of(i, mesh);
                frame.w_axis = Vec4::W;
                if !is_invertible(&frame) {
                    debug!("translate: singular parent frame for bone '{}'", self.bones[i].name);
                    return Ok(());
                }
                frame.inverse().transform_point3(vec)
            }
            Space::Local | Space::Bone => vec,
        };
        self.bones[i].local.w_axis += delta.extend(0.0);
        self.mark_bone_dirty(i);
        Ok(())
    }

    pub fn set_position(
        &mut self,
        id: BoneId,
        position: Vec3,
        space: Space,
        mesh: Option<&dyn Transformable>,
    ) -> Result<(), AnimationError> {
        let i = self.index(id)?;
        let local = match space {
            Space::World => {
                let frame = self.parent_world_of(i, mesh);
                if !is_invertible(&frame) {
                    debug!("set_position: singular parent frame for bone '{}'", self.bones[i].name);
                    return Ok(());
                }
                frame.inverse().transform_point3(position)
            }
            Space::Local | Space::Bone => position,
        };
        self.bones[i].local.w_axis = local.extend(1.0);
        self.mark_bone_dirty(i);
        Ok(())
    }

    pub fn set_absolute_position(
        &mut self,
        id: BoneId,
        position: Vec3,
        mesh: Option<&dyn Transformable>,
    ) -> Result<(), AnimationError> {
        self.set_position(id, position, Space::World, mesh)
    }

    /// Scale a bone in its own frame. Direct children are counter-scaled so
    /// their world offsets follow the scaled parent without inheriting the
    /// scale; with `scale_children` every descendant is scaled as well.
    /// A child's local translation is left as is; the parent scale shows up
    /// in its absolute transform only.
    pub fn scale(&mut self, id: BoneId, x: f32, y: f32, z: f32, scale_children: bool) -> Result<(), AnimationError> {
        let i = self.index(id)?;
        let factors = Vec3::new(x, y, z);
        let scale = Mat4::from_scale(factors);
        self.bones[i].local *= scale;

        let children = self.bones[i].children.clone();
        if x * y * z != 0.0 {
            let inverse = Mat4::from_scale(factors.recip());
            for child in &children {
                let c = child.index();
                let translation = self.bones[c].local.w_axis;
                let mut m = inverse * self.bones[c].local;
                m.w_axis = translation;
                self.bones[c].local = m;
                self.bones[c].dirty = true;
            }
        } else {
            debug!("scale: zero factor on bone '{}', children left as is", self.bones[i].name);
        }
        self.mark_bone_dirty(i);

        if scale_children {
            for child in children {
                self.scale(child, x, y, z, true)?;
            }
        }
        Ok(())
    }

    /// Replace the scale part of the local matrix.
    pub fn set_scale(&mut self, id: BoneId, scale: Vec3) -> Result<(), AnimationError> {
        let i = self.index(id)?;
        let (_, rotation, translation) = blend::decompose(self.bones[i].local);
        self.bones[i].local = Mat4::from_scale_rotation_translation(scale, rotation, translation);
        self.mark_bone_dirty(i);
        Ok(())
    }

    pub fn set_yaw_pitch_roll(
        &mut self,
        id: BoneId,
        yaw: f32,
        pitch: f32,
        roll: f32,
        space: Space,
        mesh: Option<&dyn Transformable>,
    ) -> Result<(), AnimationError> {
        if space != Space::World {
            let q = Quat::from_euler(EulerRot::YXZ, yaw, pitch, roll);
            return self.set_rotation_quaternion(id, q, space, mesh);
        }
        let rotation = Mat4::from_euler(EulerRot::YXZ, yaw, pitch, roll);
        self.set_world_rotation(id, rotation, mesh)
    }

    /// Rotate by `amount` radians around `axis`, on top of the current
    /// rotation.
    pub fn rotate(
        &mut self,
        id: BoneId,
        axis: Vec3,
        amount: f32,
        space: Space,
        mesh: Option<&dyn Transformable>,
    ) -> Result<(), AnimationError> {
        let i = self.index(id)?;
        let axis = axis.normalize_or_zero();
        if axis == Vec3::ZERO {
            return Ok(());
        }
        self.rotate_with_matrix(i, Mat4::from_axis_angle(axis, amount), space, mesh);
        Ok(())
    }

    pub fn set_axis_angle(
        &mut self,
        id: BoneId,
        axis: Vec3,
        angle: f32,
        space: Space,
        mesh: Option<&dyn Transformable>,
    ) -> Result<(), AnimationError> {
        let axis = axis.normalize_or_zero();
        if axis == Vec3::ZERO {
            return Ok(());
        }
        if space != Space::World {
            return self.set_rotation_quaternion(id, Quat::from_axis_angle(axis, angle), space, mesh);
        }
        self.set_world_rotation(id, Mat4::from_axis_angle(axis, angle), mesh)
    }

    /// Euler rotation as (pitch, yaw, roll) in x, y, z.
    pub fn set_rotation(
        &mut self,
        id: BoneId,
        rotation: Vec3,
        space: Space,
        mesh: Option<&dyn Transformable>,
    ) -> Result<(), AnimationError> {
        self.set_yaw_pitch_roll(id, rotation.y, rotation.x, rotation.z, space, mesh)
    }

    pub fn set_rotation_quaternion(
        &mut self,
        id: BoneId,
        rotation: Quat,
        space: Space,
        mesh: Option<&dyn Transformable>,
    ) -> Result<(), AnimationError> {
        let i = self.index(id)?;
        if space != Space::World {
            let (scale, _, translation) = blend::decompose(self.bones[i].local);
            self.bones[i].local =
                Mat4::from_scale_rotation_translation(scale, rotation.normalize(), translation);
            self.mark_bone_dirty(i);
            return Ok(());
        }
        self.set_world_rotation(id, Mat4::from_quat(rotation.normalize()), mesh)
    }

    pub fn set_rotation_matrix(
        &mut self,
        id: BoneId,
        rotation: Mat4,
        space: Space,
        mesh: Option<&dyn Transformable>,
    ) -> Result<(), AnimationError> {
        if space != Space::World {
            let q = Quat::from_mat4(&rotation);
            return self.set_rotation_quaternion(id, q, space, mesh);
        }
        self.set_world_rotation(id, rotation, mesh)
    }

    /// Make the bone's world rotation equal to `rotation`.
    fn set_world_rotation(
        &mut self,
        id: BoneId,
        rotation: Mat4,
        mesh: Option<&dyn Transformable>,
    ) -> Result<(), AnimationError> {
        let i = self.index(id)?;
        let Some(negative) = self.negative_rotation(i, mesh) else {
            debug!("bone '{}': world transform is singular, rotation skipped", self.bones[i].name);
            return Ok(());
        };
        self.rotate_with_matrix(i, rotation * negative, Space::World, mesh);
        Ok(())
    }

    /// Inverse of the bone's current world transform, with the mesh scaling
    /// (mirrored on x for negative determinants) applied on the left.
    fn negative_rotation(&self, i: usize, mesh: Option<&dyn Transformable>) -> Option<Mat4> {
        let world = self.world_of(i, mesh);
        if !is_invertible(&world) {
            return None;
        }
        let mut scale = mesh.map_or(Mat4::IDENTITY, |m| Mat4::from_scale(m.scaling()));
        scale.x_axis.x *= self.bones[i].scaling_determinant;
        Some(scale * world.inverse())
    }

    /// Apply `rotation` to the local matrix, keeping the local translation.
    /// In world space the rotation is conjugated into the parent's frame.
    fn rotate_with_matrix(&mut self, i: usize, rotation: Mat4, space: Space, mesh: Option<&dyn Transformable>) {
        let translation = self.bones[i].local.w_axis;
        let frame = match (self.bones[i].parent, space, mesh) {
            (Some(p), Space::World, _) => Some(self.world_of(p.index(), mesh)),
            (None, Space::World, Some(m)) => Some(m.world_matrix()),
            _ => None,
        };
        let local = self.bones[i].local;
        let mut next = match frame.filter(is_invertible) {
            Some(frame) => frame.inverse() * rotation * frame * local,
            None => rotation * local,
        };
        next.w_axis = translation;
        self.bones[i].local = next;
        self.compute_bone_absolute(i);
        self.mark_bone_dirty(i);
    }

    pub fn position(
        &self,
        id: BoneId,
        space: Space,
        mesh: Option<&dyn Transformable>,
    ) -> Result<Vec3, AnimationError> {
        let i = self.index(id)?;
        Ok(match space {
            Space::World => self.world_of(i, mesh).w_axis.truncate(),
            Space::Local | Space::Bone => self.bones[i].local.w_axis.truncate(),
        })
    }

    pub fn absolute_position(&self, id: BoneId, mesh: Option<&dyn Transformable>) -> Result<Vec3, AnimationError> {
        self.position(id, Space::World, mesh)
    }

    /// World direction of an axis given in the bone's local space,
    /// normalized.
    pub fn direction(
        &self,
        id: BoneId,
        local_axis: Vec3,
        mesh: Option<&dyn Transformable>,
    ) -> Result<Vec3, AnimationError> {
        let i = self.index(id)?;
        Ok(self
            .world_of(i, mesh)
            .transform_vector3(local_axis)
            .normalize_or_zero())
    }

    pub fn rotation_quaternion(
        &self,
        id: BoneId,
        space: Space,
        mesh: Option<&dyn Transformable>,
    ) -> Result<Quat, AnimationError> {
        let i = self.index(id)?;
        let m = match space {
            Space::World => {
                let mut m = self.world_of(i, mesh);
                m.x_axis *= self.bones[i].scaling_determinant;
                m
            }
            Space::Local | Space::Bone => self.bones[i].local,
        };
        Ok(blend::decompose(m).1)
    }

    /// Euler rotation as (pitch, yaw, roll) in x, y, z.
    pub fn rotation(
        &self,
        id: BoneId,
        space: Space,
        mesh: Option<&dyn Transformable>,
    ) -> Result<Vec3, AnimationError> {
        let (yaw, pitch, roll) = self.rotation_quaternion(id, space, mesh)?.to_euler(EulerRot::YXZ);
        Ok(Vec3::new(pitch, yaw, roll))
    }

    pub fn rotation_matrix(
        &self,
        id: BoneId,
        space: Space,
        mesh: Option<&dyn Transformable>,
    ) -> Result<Mat4, AnimationError> {
        Ok(Mat4::from_quat(self.rotation_quaternion(id, space, mesh)?))
    }

    /// World position of a point given in the bone's local space.
    pub fn absolute_position_from_local(
        &self,
        id: BoneId,
        position: Vec3,
        mesh: Option<&dyn Transformable>,
    ) -> Result<Vec3, AnimationError> {
        let i = self.index(id)?;
        Ok(self.world_of(i, mesh).transform_point3(position))
    }

    /// Local position of a world-space point.
    pub fn local_position_from_absolute(
        &self,
        id: BoneId,
        position: Vec3,
        mesh: Option<&dyn Transformable>,
    ) -> Result<Vec3, AnimationError> {
        let i = self.index(id)?;
        let world = self.world_of(i, mesh);
        if !is_invertible(&world) {
            return Err(AnimationError::InvalidAnimation {
                reason: format!("bone '{}' has a singular world transform", self.bones[i].name),
            });
        }
        Ok(world.inverse().transform_point3(position))
    }

    /// Copy the keys of range `range_name` from `source_bone` (in `source`)
    /// onto bone `dest`, shifted by `frame_offset`.
    ///
    /// With `rescale`, key translations are scaled by the ratio of the parent
    /// bone lengths, or by `skeleton_dimensions_ratio` for root bones. When
    /// the data needed for a rescale is missing the keys are copied as is.
    /// Returns `Ok(false)` when the source has no such range.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_animation_range(
        &mut self,
        dest: BoneId,
        source: &Skeleton,
        source_bone: BoneId,
        range_name: &str,
        frame_offset: f32,
        rescale: bool,
        skeleton_dimensions_ratio: Option<Vec3>,
    ) -> Result<bool, AnimationError> {
        let d = self.index(dest)?;
        let src = source.bone(source_bone)?;
        let Some(src_anim) = src.animations.first() else {
            return Ok(false);
        };

        if self.bones[d].animations.is_empty() {
            let name = self.bones[d].name.clone();
            let property = format!("{name}.matrix");
            self.bones[d].animations.push(Animation::new(
                name,
                property,
                src_anim.frame_per_second,
                ValueKind::Matrix,
                LoopMode::Relative,
            ));
        }

        let Some(range) = src_anim.range(range_name).cloned() else {
            return Ok(false);
        };

        let length_of = |l: Option<f32>| l.filter(|l| *l != 0.0);
        let src_parent_length = src
            .parent
            .and_then(|p| source.bones.get(p.index()))
            .map(|p| p.length);
        let dest_parent_length = self.bones[d]
            .parent
            .map(|p| self.bones[p.index()].length);

        let parent_scaling = rescale
            && src_parent_length.is_some()
            && matches!(
                (length_of(src.length), length_of(self.bones[d].length)),
                (Some(a), Some(b)) if a != b
            );
        let parent_ratio = match (dest_parent_length.flatten(), src_parent_length.flatten()) {
            (Some(dest_len), Some(src_len)) if parent_scaling && src_len != 0.0 => dest_len / src_len,
            _ => 1.0,
        };
        let dimensions = skeleton_dimensions_ratio
            .filter(|r| rescale && dest_parent_length.is_none() && *r != Vec3::ONE);

        let mut copied = Vec::new();
        for key in src_anim.keys() {
            if key.frame < range.from || key.frame > range.to {
                continue;
            }
            let mut value = key.value;
            if let Value::Matrix(m) = &mut value {
                if parent_scaling {
                    let t = m.w_axis.truncate() * parent_ratio;
                    m.w_axis = t.extend(1.0);
                } else if let Some(ratio) = dimensions {
                    let t = m.w_axis.truncate() * ratio;
                    m.w_axis = t.extend(1.0);
                }
            }
            copied.push(AnimationKey::new(key.frame + frame_offset, value));
        }

        let dest_anim = &mut self.bones[d].animations[0];
        let mut keys = dest_anim.keys().to_vec();
        keys.extend(copied);
        dest_anim.set_keys(keys)?;
        dest_anim.create_range(range_name, range.from + frame_offset, range.to + frame_offset);
        Ok(true)
    }

    fn decode(&self, handle: PropertyHandle) -> Option<usize> {
        let i = handle.0 as usize;
        (i < self.bones.len()).then_some(i)
    }
}

impl AnimationTarget for Skeleton {
    /// `"<bone>.matrix"`; bone names may themselves contain dots.
    fn resolve_property(&self, path: &PropertyPath) -> Option<PropertyHandle> {
        if path.len() < 2 || !matches!(path.leaf(), "matrix" | "_matrix") {
            return None;
        }
        let name = path.parents().join(".");
        self.bone_id(&name).map(|id| PropertyHandle(id.0))
    }

    fn get_value(&self, handle: PropertyHandle) -> Option<Value> {
        self.decode(handle).map(|i| Value::Matrix(self.bones[i].local))
    }

    fn set_value(&mut self, handle: PropertyHandle, value: &Value) -> Result<(), AnimationError> {
        let i = self.decode(handle).ok_or(AnimationError::BoneOutOfRange { id: BoneId(handle.0) })?;
        let Value::Matrix(m) = value else {
            return Err(AnimationError::PropertyKindMismatch {
                path: self.property_name(handle),
                kind: value.kind(),
            });
        };
        self.bones[i].local = *m;
        self.dirty = true;
        Ok(())
    }

    fn rest_pose(&self, handle: PropertyHandle) -> Option<Value> {
        self.decode(handle).map(|i| Value::Matrix(self.bones[i].rest_pose))
    }

    fn animation_properties_override(&self) -> Option<&AnimationPropertiesOverride> {
        self.properties_override.as_ref()
    }

    fn mark_as_dirty(&mut self, handle: PropertyHandle) {
        if let Some(i) = self.decode(handle) {
            self.mark_bone_dirty(i);
        }
    }

    fn prepare(&mut self) {
        Skeleton::prepare(self);
    }

    fn property_name(&self, handle: PropertyHandle) -> String {
        match self.decode(handle) {
            Some(i) => format!("{}.matrix", self.bones[i].name),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn arm() -> (Skeleton, BoneId, BoneId) {
        let mut skeleton = Skeleton::new("rig");
        let root = skeleton
            .add_bone("root", None, Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)))
            .unwrap();
        let hand = skeleton
            .add_bone("hand", Some(root), Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        (skeleton, root, hand)
    }

    #[test]
    fn absolute_follows_parent_chain() {
        let (mut skeleton, root, hand) = arm();
        let abs = skeleton.bone(hand).unwrap().absolute_transform();
        assert!(abs.w_axis.truncate().abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));

        skeleton.set_position(root, Vec3::new(0.0, 2.0, 0.0), Space::Local, None).unwrap();
        assert!(skeleton.is_dirty());
        skeleton.prepare();
        let abs = skeleton.bone(hand).unwrap().absolute_transform();
        assert!(abs.w_axis.truncate().abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-6));
        assert!(!skeleton.is_dirty());
    }

    #[test]
    fn pose_matrix_frames_roots() {
        let (mut skeleton, _, hand) = arm();
        skeleton.set_pose_matrix(Some(Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0))));
        skeleton.prepare();
        let p = skeleton.absolute_position(hand, None).unwrap();
        assert!(p.abs_diff_eq(Vec3::new(1.0, 1.0, 5.0), 1e-6));
    }

    #[test]
    fn reparenting_under_descendant_is_rejected() {
        let (mut skeleton, root, hand) = arm();
        let err = skeleton.set_parent(root, Some(hand), true).unwrap_err();
        assert!(matches!(err, AnimationError::BoneCycle { .. }));
        skeleton.set_parent(hand, None, true).unwrap();
        assert!(skeleton.bone(root).unwrap().children().is_empty());
    }

    #[test]
    fn target_channel_addresses_local_matrix() {
        let (mut skeleton, _, hand) = arm();
        let handle = skeleton
            .resolve_property(&PropertyPath::parse("hand.matrix").unwrap())
            .unwrap();
        assert_eq!(handle, PropertyHandle(hand.0));
        assert!(skeleton
            .resolve_property(&PropertyPath::parse("hand.position").unwrap())
            .is_none());

        let moved = Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0));
        skeleton.set_value(handle, &Value::Matrix(moved)).unwrap();
        assert_eq!(skeleton.get_value(handle), Some(Value::Matrix(moved)));
        // Rest pose is untouched by animation writes.
        assert_eq!(
            skeleton.rest_pose(handle),
            Some(Value::Matrix(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0))))
        );
        assert!(skeleton.set_value(handle, &Value::f(1.0)).is_err());
    }

    #[test]
    fn world_rotation_lands_in_world_space() {
        let (mut skeleton, root, hand) = arm();
        skeleton
            .set_rotation_quaternion(root, Quat::from_rotation_z(0.7), Space::Local, None)
            .unwrap();
        skeleton.prepare();
        let wanted = Quat::from_rotation_y(0.4);
        skeleton
            .set_rotation_quaternion(hand, wanted, Space::World, None)
            .unwrap();
        let got = skeleton.rotation_quaternion(hand, Space::World, None).unwrap();
        assert!(got.dot(wanted).abs() > 1.0 - 1e-5);
        // The local translation is preserved.
        let local = skeleton.position(hand, Space::Local, None).unwrap();
        assert!(local.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn positions_round_trip_between_spaces() {
        let (mut skeleton, _, hand) = arm();
        skeleton.rotate(hand, Vec3::Y, 0.5, Space::Local, None).unwrap();
        let p = Vec3::new(0.3, -0.2, 0.9);
        let world = skeleton.absolute_position_from_local(hand, p, None).unwrap();
        let back = skeleton.local_position_from_absolute(hand, world, None).unwrap();
        assert!(back.abs_diff_eq(p, 1e-5));

        skeleton
            .set_absolute_position(hand, Vec3::new(4.0, 4.0, 4.0), None)
            .unwrap();
        let abs = skeleton.absolute_position(hand, None).unwrap();
        assert!(abs.abs_diff_eq(Vec3::new(4.0, 4.0, 4.0), 1e-5));
    }

    #[test]
    fn euler_rotation_round_trips() {
        let (mut skeleton, root, _) = arm();
        let euler = Vec3::new(0.2, -0.4, 0.1);
        skeleton.set_rotation(root, euler, Space::Local, None).unwrap();
        let back = skeleton.rotation(root, Space::Local, None).unwrap();
        assert!(back.abs_diff_eq(euler, 1e-5));
    }

    #[test]
    fn loads_from_json_with_shorthand_keys() {
        let json = r#"{
            "name": "rig",
            "bones": [
                { "name": "root", "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,1,0,1], "length": 1.0 },
                { "name": "tip", "parent": 0, "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,2,1],
                  "animation": {
                      "name": "tip", "target_property": "tip.matrix", "data_type": "Matrix",
                      "keys": [ { "frame": 0, "value": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,2,1] } ]
                  } }
            ]
        }"#;
        let skeleton = Skeleton::from_json(json).unwrap();
        let tip = skeleton.bone_by_name("tip").unwrap();
        let abs = skeleton.bone(tip).unwrap().absolute_transform().w_axis.truncate();
        assert!(abs.abs_diff_eq(Vec3::new(0.0, 1.0, 2.0), 1e-6));
        assert_eq!(skeleton.bone(tip).unwrap().animations.len(), 1);

        let forward_parent = r#"{ "name": "bad", "bones": [
            { "name": "a", "parent": 0, "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1] } ] }"#;
        assert!(matches!(
            Skeleton::from_json(forward_parent),
            Err(AnimationError::BoneOutOfRange { .. })
        ));
    }
}
