//! Bone node data. Bones live in their skeleton's flat list; hierarchy
//! operations that need parents or children are on [`crate::Skeleton`].

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::data::Animation;
use crate::ids::BoneId;
use crate::transform::Transformable;

/// Frame in which a bone operation's input is expressed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Space {
    /// The bone's parent frame.
    #[default]
    Local,
    /// World frame, optionally through a mesh world matrix.
    World,
    /// The bone's own frame.
    Bone,
}

/// One joint of a [`crate::Skeleton`].
///
/// There is no separate scale state: [`crate::Skeleton::scale`] folds the
/// factors into `local` and counter-scales the children in place.
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub(crate) parent: Option<BoneId>,
    pub(crate) children: Vec<BoneId>,

    pub(crate) local: Mat4,
    pub(crate) base: Mat4,
    pub(crate) rest_pose: Mat4,
    pub(crate) absolute: Mat4,
    pub(crate) inverted_absolute: Mat4,
    /// Sign of the absolute transform's determinant.
    pub(crate) scaling_determinant: f32,
    pub(crate) dirty: bool,

    /// Bone length, used to rescale copied animation ranges.
    pub length: Option<f32>,
    /// Tracks owned by the bone until they are loaded into a scene.
    pub animations: Vec<Animation>,
}

impl Bone {
    pub(crate) fn new(name: String, local: Mat4, rest_pose: Option<Mat4>, base: Option<Mat4>) -> Self {
        Self {
            name,
            parent: None,
            children: Vec::new(),
            local,
            base: base.unwrap_or(local),
            rest_pose: rest_pose.unwrap_or(local),
            absolute: Mat4::IDENTITY,
            inverted_absolute: Mat4::IDENTITY,
            scaling_determinant: 1.0,
            dirty: false,
            length: None,
            animations: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<BoneId> {
        self.parent
    }

    pub fn children(&self) -> &[BoneId] {
        &self.children
    }

    pub fn local(&self) -> Mat4 {
        self.local
    }

    pub fn base(&self) -> Mat4 {
        self.base
    }

    pub fn rest_pose(&self) -> Mat4 {
        self.rest_pose
    }

    pub fn set_rest_pose(&mut self, rest_pose: Mat4) {
        self.rest_pose = rest_pose;
    }

    /// Parent absolute transform times local matrix, as of the last
    /// recompute.
    pub fn absolute_transform(&self) -> Mat4 {
        self.absolute
    }

    pub fn inverted_absolute_transform(&self) -> Mat4 {
        self.inverted_absolute
    }

    pub fn scaling_determinant(&self) -> f32 {
        self.scaling_determinant
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Transformable for Bone {
    fn local_matrix(&self) -> Mat4 {
        self.local
    }

    fn world_matrix(&self) -> Mat4 {
        self.absolute
    }

    fn mark_as_dirty(&mut self) {
        self.dirty = true;
    }
}
