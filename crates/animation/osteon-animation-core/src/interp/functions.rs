//! Interpolation helpers:
//! - cubic-bezier timing (used by the bezier easing curve)
//! - per-kind evaluation of one key segment, including tangents and
//!   relative-loop offsets

use osteon_api_core::{blend, MatrixBlend, Value, ValueError, ValueKind};

use crate::data::{AnimationKey, LoopMode};

/// Cubic Bezier basis function
#[inline]
fn cubic_bezier(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let u = 1.0 - t;
    u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
}

/// Given control points (x1, y1, x2, y2) and an input t in [0,1],
/// compute the eased y by inverting the x bezier via binary search.
pub(crate) fn bezier_ease_t(t: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if x1 == 0.0 && y1 == 0.0 && x2 == 1.0 && y2 == 1.0 {
        return t;
    }
    let mut lo = 0.0f32;
    let mut hi = 1.0f32;
    let mut mid = t;
    for _ in 0..24 {
        let x = cubic_bezier(0.0, x1, x2, 1.0, mid);
        if (x - t).abs() < 1e-6 {
            break;
        }
        if x < t {
            lo = mid;
        } else {
            hi = mid;
        }
        mid = 0.5 * (lo + hi);
    }
    cubic_bezier(0.0, y1, y2, 1.0, mid)
}

/// Relative looping adds `offset * repeat_count` on top of the segment value.
fn with_loop_offset(
    value: Value,
    loop_mode: LoopMode,
    offset: Option<&Value>,
    repeat_count: i32,
) -> Result<Value, ValueError> {
    match (loop_mode, offset) {
        (LoopMode::Relative, Some(offset)) if repeat_count != 0 => {
            blend::add(&value, &blend::scale(offset, repeat_count as f32))
        }
        _ => Ok(value),
    }
}

/// Evaluate the segment `[start, end]` at `gradient` (already eased).
///
/// `frame_delta` scales tangents from per-frame to per-segment units.
/// `matrix` is `None` when matrix interpolation is disabled, in which case
/// matrix tracks hold the start key.
#[allow(clippy::too_many_arguments)]
pub fn interpolate_segment(
    data_type: ValueKind,
    start: &AnimationKey,
    end: &AnimationKey,
    gradient: f32,
    frame_delta: f32,
    loop_mode: LoopMode,
    offset: Option<&Value>,
    repeat_count: i32,
    matrix: Option<MatrixBlend>,
) -> Result<Value, ValueError> {
    let tangents = match (&start.out_tangent, &end.in_tangent) {
        (Some(out_t), Some(in_t)) if data_type.supports_tangents() => Some((
            blend::scale(out_t, frame_delta),
            blend::scale(in_t, frame_delta),
        )),
        _ => None,
    };

    let value = match data_type {
        ValueKind::Float | ValueKind::Vec2 | ValueKind::Vec3 => match tangents {
            Some((out_t, in_t)) => {
                blend::hermite(&start.value, &out_t, &end.value, &in_t, gradient)?
            }
            None => blend::lerp(&start.value, &end.value, gradient)?,
        },
        ValueKind::Quat => match tangents {
            Some((out_t, in_t)) => {
                match blend::hermite(&start.value, &out_t, &end.value, &in_t, gradient)? {
                    Value::Quat(q) => Value::Quat(q.normalize()),
                    other => other,
                }
            }
            None => blend::blend(&start.value, &end.value, gradient, MatrixBlend::default())?,
        },
        ValueKind::Size | ValueKind::Color3 => blend::lerp(&start.value, &end.value, gradient)?,
        ValueKind::Matrix => {
            return Ok(match (loop_mode, matrix) {
                (LoopMode::Cycle | LoopMode::Constant, Some(policy)) => {
                    blend::blend(&start.value, &end.value, gradient, policy)?
                }
                _ => start.value,
            });
        }
    };

    with_loop_offset(value, loop_mode, offset, repeat_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Quat, Vec3};

    fn approx(a: f32, b: f32, eps: f32) {
        assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
    }

    fn key(frame: f32, value: Value) -> AnimationKey {
        AnimationKey::new(frame, value)
    }

    #[test]
    fn float_lerp_and_relative_offset() {
        let a = key(0.0, Value::f(0.0));
        let b = key(10.0, Value::f(1.0));
        let v = interpolate_segment(
            ValueKind::Float,
            &a,
            &b,
            0.5,
            10.0,
            LoopMode::Cycle,
            None,
            0,
            None,
        )
        .unwrap();
        approx(v.as_float().unwrap(), 0.5, 1e-6);

        let offset = Value::f(1.0);
        let v = interpolate_segment(
            ValueKind::Float,
            &a,
            &b,
            0.5,
            10.0,
            LoopMode::Relative,
            Some(&offset),
            3,
            None,
        )
        .unwrap();
        approx(v.as_float().unwrap(), 3.5, 1e-6);
    }

    #[test]
    fn tangents_drive_hermite() {
        // Flat tangents ease in and out.
        let a = key(0.0, Value::f(0.0)).with_tangents(None, Some(Value::f(0.0)));
        let b = key(4.0, Value::f(1.0)).with_tangents(Some(Value::f(0.0)), None);
        let v = interpolate_segment(
            ValueKind::Float,
            &a,
            &b,
            0.25,
            4.0,
            LoopMode::Cycle,
            None,
            0,
            None,
        )
        .unwrap();
        approx(v.as_float().unwrap(), 0.15625, 1e-6);
    }

    #[test]
    fn matrix_snaps_unless_allowed() {
        let a = key(0.0, Value::Matrix(Mat4::IDENTITY));
        let b = key(
            10.0,
            Value::Matrix(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0))),
        );
        let snapped = interpolate_segment(
            ValueKind::Matrix,
            &a,
            &b,
            0.5,
            10.0,
            LoopMode::Cycle,
            None,
            0,
            None,
        )
        .unwrap();
        assert_eq!(snapped, Value::Matrix(Mat4::IDENTITY));

        let blended = interpolate_segment(
            ValueKind::Matrix,
            &a,
            &b,
            0.5,
            10.0,
            LoopMode::Cycle,
            None,
            0,
            Some(MatrixBlend::Decompose),
        )
        .unwrap();
        let m = blended.as_matrix().unwrap();
        assert!(m
            .w_axis
            .truncate()
            .abs_diff_eq(Vec3::new(5.0, 0.0, 0.0), 1e-5));

        // Relative mode always holds the start key for matrices.
        let rel = interpolate_segment(
            ValueKind::Matrix,
            &a,
            &b,
            0.5,
            10.0,
            LoopMode::Relative,
            None,
            1,
            Some(MatrixBlend::Decompose),
        )
        .unwrap();
        assert_eq!(rel, Value::Matrix(Mat4::IDENTITY));
    }

    #[test]
    fn quaternion_segments_slerp() {
        let a = key(0.0, Value::Quat(Quat::IDENTITY));
        let b = key(1.0, Value::Quat(Quat::from_rotation_y(1.0)));
        let v = interpolate_segment(
            ValueKind::Quat,
            &a,
            &b,
            0.5,
            1.0,
            LoopMode::Cycle,
            None,
            0,
            None,
        )
        .unwrap();
        assert!(v
            .as_quat()
            .unwrap()
            .abs_diff_eq(Quat::from_rotation_y(0.5), 1e-5));
    }
}
