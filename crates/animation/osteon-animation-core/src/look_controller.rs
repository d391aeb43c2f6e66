//! Look-at constraint that turns one bone toward a world-space point, with
//! optional yaw/pitch limits and slerped tracking.

use std::f32::consts::PI;

use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::bone::Space;
use crate::error::AnimationError;
use crate::ids::BoneId;
use crate::skeleton::Skeleton;
use crate::transform::Transformable;

/// Construction options for [`BoneLookController`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoneLookOptions {
    pub min_yaw: f32,
    pub max_yaw: f32,
    pub min_pitch: f32,
    pub max_pitch: f32,
    /// Fraction of the way to the target per update; 1 snaps.
    pub slerp_amount: f32,
    pub up_axis: Vec3,
    pub up_axis_space: Space,
    /// Set when the bone does not yaw around its y axis.
    pub yaw_axis: Option<Vec3>,
    /// Set when the bone does not pitch around its x axis.
    pub pitch_axis: Option<Vec3>,
    pub adjust_yaw: f32,
    pub adjust_pitch: f32,
    pub adjust_roll: f32,
}

impl Default for BoneLookOptions {
    fn default() -> Self {
        Self {
            min_yaw: -PI,
            max_yaw: PI,
            min_pitch: -PI,
            max_pitch: PI,
            slerp_amount: 1.0,
            up_axis: Vec3::Y,
            up_axis_space: Space::Local,
            yaw_axis: None,
            pitch_axis: None,
            adjust_yaw: 0.0,
            adjust_pitch: 0.0,
            adjust_roll: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BoneLookController {
    bone: BoneId,
    /// World-space point to look at.
    pub target: Vec3,
    pub up_axis: Vec3,
    pub up_axis_space: Space,
    pub adjust_yaw: f32,
    pub adjust_pitch: f32,
    pub adjust_roll: f32,
    pub slerp_amount: f32,

    min_yaw: f32,
    max_yaw: f32,
    min_pitch: f32,
    max_pitch: f32,
    min_yaw_sin: f32,
    min_yaw_cos: f32,
    max_yaw_sin: f32,
    max_yaw_cos: f32,
    min_pitch_tan: f32,
    max_pitch_tan: f32,
    mid_yaw_constraint: f32,
    yaw_range: f32,

    /// Maps the remapped yaw/pitch basis back to bone axes, and its inverse.
    transform_yaw_pitch: Option<(Mat4, Mat4)>,

    bone_quat: Quat,
    slerping: bool,
    first_frame_skipped: bool,
}

impl BoneLookController {
    pub fn new(bone: BoneId, target: Vec3, options: BoneLookOptions) -> Self {
        let transform_yaw_pitch = if options.yaw_axis.is_some() || options.pitch_axis.is_some() {
            let yaw = options.yaw_axis.map_or(Vec3::Y, Vec3::normalize_or_zero);
            let pitch = options.pitch_axis.map_or(Vec3::X, Vec3::normalize_or_zero);
            let roll = pitch.cross(yaw);
            let basis = Mat4::from_cols(pitch.extend(0.0), yaw.extend(0.0), roll.extend(0.0), Vec4::W);
            Some((basis.inverse(), basis))
        } else {
            None
        };

        let mut ctl = Self {
            bone,
            target,
            up_axis: options.up_axis,
            up_axis_space: options.up_axis_space,
            adjust_yaw: options.adjust_yaw,
            adjust_pitch: options.adjust_pitch,
            adjust_roll: options.adjust_roll,
            slerp_amount: options.slerp_amount,
            min_yaw: 0.0,
            max_yaw: 0.0,
            min_pitch: 0.0,
            max_pitch: 0.0,
            min_yaw_sin: 0.0,
            min_yaw_cos: 1.0,
            max_yaw_sin: 0.0,
            max_yaw_cos: 1.0,
            min_pitch_tan: 0.0,
            max_pitch_tan: 0.0,
            mid_yaw_constraint: 0.0,
            yaw_range: 0.0,
            transform_yaw_pitch,
            bone_quat: Quat::IDENTITY,
            slerping: false,
            first_frame_skipped: false,
        };
        ctl.set_max_yaw(options.max_yaw);
        ctl.set_min_yaw(options.min_yaw);
        ctl.set_max_pitch(options.max_pitch);
        ctl.set_min_pitch(options.min_pitch);
        ctl
    }

    pub fn bone(&self) -> BoneId {
        self.bone
    }

    pub fn min_yaw(&self) -> f32 {
        self.min_yaw
    }

    pub fn set_min_yaw(&mut self, value: f32) {
        self.min_yaw = value;
        self.min_yaw_sin = value.sin();
        self.min_yaw_cos = value.cos();
        self.update_yaw_range();
    }

    pub fn max_yaw(&self) -> f32 {
        self.max_yaw
    }

    pub fn set_max_yaw(&mut self, value: f32) {
        self.max_yaw = value;
        self.max_yaw_sin = value.sin();
        self.max_yaw_cos = value.cos();
        self.update_yaw_range();
    }

    pub fn min_pitch(&self) -> f32 {
        self.min_pitch
    }

    pub fn set_min_pitch(&mut self, value: f32) {
        self.min_pitch = value;
        self.min_pitch_tan = value.tan();
    }

    pub fn max_pitch(&self) -> f32 {
        self.max_pitch
    }

    pub fn set_max_pitch(&mut self, value: f32) {
        self.max_pitch = value;
        self.max_pitch_tan = value.tan();
    }

    fn update_yaw_range(&mut self) {
        self.mid_yaw_constraint = angle_diff(self.min_yaw, self.max_yaw) * 0.5 + self.min_yaw;
        self.yaw_range = self.max_yaw - self.min_yaw;
    }

    /// Turn the bone toward [`Self::target`]. Call once per frame, before the
    /// skeleton is prepared.
    pub fn update(&mut self, skeleton: &mut Skeleton, mesh: Option<&dyn Transformable>) -> Result<(), AnimationError> {
        // The first slerped update has no previous orientation to start from.
        if self.slerp_amount < 1.0 && !self.first_frame_skipped {
            self.first_frame_skipped = true;
            return Ok(());
        }

        let bone = self.bone;
        let parent = skeleton.bone(bone)?.parent();
        let bone_pos = skeleton.absolute_position(bone, mesh)?;
        let remap = self.transform_yaw_pitch.map(|(_, basis)| basis);
        let to_bone_axes = |v: Vec3| remap.map_or(v, |b| b.transform_vector3(v));

        let space = match (self.up_axis_space, parent) {
            (Space::Bone, None) => Space::Local,
            (space, _) => space,
        };

        let up = match (space, parent) {
            (Space::Bone, Some(p)) => skeleton.direction(p, to_bone_axes(self.up_axis), mesh)?,
            (Space::Local, _) => match mesh {
                Some(m) => {
                    let up = m.direction(self.up_axis);
                    if m.scaling() != Vec3::ONE {
                        up.normalize_or_zero()
                    } else {
                        up
                    }
                }
                None => self.up_axis,
            },
            _ => self.up_axis,
        };

        let check_yaw = self.max_yaw != PI || self.min_yaw != -PI;
        let check_pitch = self.max_pitch != PI || self.min_pitch != -PI;
        let mut target = self.target;

        if check_yaw || check_pitch {
            let frame = match (space, parent) {
                (Space::Bone, Some(p)) if up.y == 1.0 => skeleton.rotation_matrix(p, Space::World, mesh)?,
                (Space::Local, None) if up.y == 1.0 => mesh.map_or(Mat4::IDENTITY, |m| m.world_matrix()),
                _ => {
                    let forward = to_bone_axes(Vec3::Z);
                    let forward = match (parent, mesh) {
                        (Some(p), _) => skeleton.direction(p, forward, mesh)?,
                        (None, Some(m)) => m.direction(forward),
                        (None, None) => forward,
                    };
                    let right = up.cross(forward).normalize_or_zero();
                    let forward = right.cross(up);
                    Mat4::from_cols(right.extend(0.0), up.extend(0.0), forward.extend(0.0), Vec4::W)
                }
            };
            let frame_inv = frame.inverse();
            let to_frame = |p: Vec3| frame_inv.transform_vector3(p - bone_pos);
            let from_frame = |local: Vec3| frame.transform_vector3(local) + bone_pos;

            if check_pitch {
                let mut local = to_frame(target);
                let xz_len = (local.x * local.x + local.z * local.z).sqrt();
                let pitch = local.y.atan2(xz_len);
                if pitch > self.max_pitch {
                    local.y = self.max_pitch_tan * xz_len;
                    target = from_frame(local);
                } else if pitch < self.min_pitch {
                    local.y = self.min_pitch_tan * xz_len;
                    target = from_frame(local);
                }
            }

            if check_yaw {
                let mut local = to_frame(target);
                let xz_len = (local.x * local.x + local.z * local.z).sqrt();
                let yaw = local.x.atan2(local.z);
                let mut new_yaw = yaw;
                if yaw > self.max_yaw {
                    local.z = self.max_yaw_cos * xz_len;
                    local.x = self.max_yaw_sin * xz_len;
                    new_yaw = self.max_yaw;
                } else if yaw < self.min_yaw {
                    local.z = self.min_yaw_cos * xz_len;
                    local.x = self.min_yaw_sin * xz_len;
                    new_yaw = self.min_yaw;
                }

                if self.slerping && self.yaw_range > PI {
                    // Heading for the excluded arc: swing toward the closer limit.
                    let tip = skeleton.absolute_position_from_local(bone, to_bone_axes(Vec3::Z), mesh)?;
                    let heading = to_frame(tip);
                    let bone_yaw = heading.x.atan2(heading.z);
                    if angle_between(bone_yaw, yaw) > angle_between(bone_yaw, self.mid_yaw_constraint) {
                        let to_max = angle_between(bone_yaw, self.max_yaw);
                        let to_min = angle_between(bone_yaw, self.min_yaw);
                        new_yaw = if to_min < to_max {
                            bone_yaw + PI * 0.95
                        } else {
                            bone_yaw - PI * 0.95
                        };
                        local.z = new_yaw.cos() * xz_len;
                        local.x = new_yaw.sin() * xz_len;
                    }
                }

                if yaw != new_yaw {
                    target = from_frame(local);
                }
            }
        }

        let z_axis = (target - bone_pos).normalize_or_zero();
        let x_axis = up.cross(z_axis).normalize_or_zero();
        let y_axis = z_axis.cross(x_axis).normalize_or_zero();
        if x_axis == Vec3::ZERO || y_axis == Vec3::ZERO || z_axis == Vec3::ZERO {
            warn!(
                "look controller on bone {:?}: degenerate basis (target {:?}, up {:?}), skipped",
                bone, target, up
            );
            return Ok(());
        }

        let mut look = Mat4::from_cols(x_axis.extend(0.0), y_axis.extend(0.0), z_axis.extend(0.0), Vec4::W);
        if self.adjust_yaw != 0.0 || self.adjust_pitch != 0.0 || self.adjust_roll != 0.0 {
            look *= Mat4::from_euler(EulerRot::YXZ, self.adjust_yaw, self.adjust_pitch, self.adjust_roll);
        }
        if let Some((inv, _)) = self.transform_yaw_pitch {
            look *= inv;
        }

        if self.slerp_amount < 1.0 {
            if !self.slerping {
                self.bone_quat = skeleton.rotation_quaternion(bone, Space::World, mesh)?;
            }
            let goal = Quat::from_mat4(&look);
            self.bone_quat = self.bone_quat.slerp(goal, self.slerp_amount);
            skeleton.set_rotation_quaternion(bone, self.bone_quat, Space::World, mesh)?;
            self.slerping = true;
        } else {
            skeleton.set_rotation_matrix(bone, look, Space::World, mesh)?;
            self.slerping = false;
        }
        Ok(())
    }
}

/// Signed difference `b - a`, wrapped into [-π, π].
fn angle_diff(a: f32, b: f32) -> f32 {
    let diff = (b - a) % (PI * 2.0);
    if diff > PI {
        diff - PI * 2.0
    } else if diff < -PI {
        diff + PI * 2.0
    } else {
        diff
    }
}

/// Unsigned shortest angle between two headings.
fn angle_between(a: f32, b: f32) -> f32 {
    let wrap = |x: f32| x.rem_euclid(PI * 2.0);
    let ab = (wrap(a) - wrap(b)).abs();
    if ab > PI {
        PI * 2.0 - ab
    } else {
        ab
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_helpers_wrap() {
        assert!((angle_diff(-0.1, 0.1) - 0.2).abs() < 1e-6);
        assert!((angle_diff(3.0, -3.0) - (2.0 * PI - 6.0)).abs() < 1e-5);
        assert!((angle_between(0.1, 2.0 * PI - 0.1) - 0.2).abs() < 1e-5);
        assert!((angle_between(-PI / 2.0, PI / 2.0) - PI).abs() < 1e-5);
    }

    #[test]
    fn setters_cache_trig_and_mid_yaw() {
        let mut ctl = BoneLookController::new(BoneId(0), Vec3::Z, BoneLookOptions::default());
        ctl.set_min_yaw(-0.5);
        ctl.set_max_yaw(1.5);
        assert!((ctl.mid_yaw_constraint - 0.5).abs() < 1e-6);
        assert!((ctl.yaw_range - 2.0).abs() < 1e-6);
        assert!((ctl.max_yaw_sin - 1.5f32.sin()).abs() < 1e-6);
        ctl.set_max_pitch(0.25);
        assert!((ctl.max_pitch_tan - 0.25f32.tan()).abs() < 1e-6);
    }

    #[test]
    fn unconstrained_look_points_z_at_target() {
        let mut skel = Skeleton::new("rig");
        let head = skel.add_bone("head", None, Mat4::IDENTITY).unwrap();
        let mut ctl = BoneLookController::new(head, Vec3::new(3.0, 0.0, 0.0), BoneLookOptions::default());
        ctl.update(&mut skel, None).unwrap();
        let dir = skel.direction(head, Vec3::Z, None).unwrap();
        assert!(dir.abs_diff_eq(Vec3::X, 1e-5), "{dir:?}");
    }

    #[test]
    fn target_on_bone_is_a_no_op() {
        let mut skel = Skeleton::new("rig");
        let head = skel.add_bone("head", None, Mat4::IDENTITY).unwrap();
        let mut ctl = BoneLookController::new(head, Vec3::ZERO, BoneLookOptions::default());
        ctl.update(&mut skel, None).unwrap();
        assert_eq!(skel.bone(head).unwrap().local(), Mat4::IDENTITY);
    }

    #[test]
    fn slerp_skips_first_frame_then_moves_part_way() {
        let mut skel = Skeleton::new("rig");
        let head = skel.add_bone("head", None, Mat4::IDENTITY).unwrap();
        let options = BoneLookOptions {
            slerp_amount: 0.5,
            ..BoneLookOptions::default()
        };
        let mut ctl = BoneLookController::new(head, Vec3::new(1.0, 0.0, 0.0), options);
        ctl.update(&mut skel, None).unwrap();
        assert_eq!(skel.bone(head).unwrap().local(), Mat4::IDENTITY);

        ctl.update(&mut skel, None).unwrap();
        let dir = skel.direction(head, Vec3::Z, None).unwrap();
        let yaw = dir.x.atan2(dir.z);
        assert!((yaw - PI / 4.0).abs() < 1e-4, "yaw {yaw}");
    }
}
