//! Blend arithmetic for Value kinds.
//! - component-wise lerp for floats, vectors, colors, sizes and raw matrices
//! - quaternion slerp (shortest-arc)
//! - matrix decompose-lerp (scale/translation lerp, rotation slerp)
//! - cubic hermite with tangents
//! - add / subtract / scale / scale_and_add used by relative looping and the
//!   late-binding weighted sums
//!
//! Operations on mismatched kinds return `ValueError::KindMismatch` and
//! operations with no meaning for a kind return `ValueError::UnsupportedBlend`.

use glam::{Mat4, Quat, Vec3};

use crate::{Value, ValueError};

/// How matrices are interpolated and blended.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MatrixBlend {
    /// Decompose into scale/rotation/translation, blend each, recompose.
    #[default]
    Decompose,
    /// Element-wise lerp of the 16 entries.
    Elementwise,
}

#[inline]
fn lerp_f(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
fn mismatch(a: &Value, b: &Value) -> ValueError {
    ValueError::KindMismatch {
        expected: a.kind(),
        actual: b.kind(),
    }
}

/// Slerp between two unit quaternions.
pub fn slerp(q1: Quat, q2: Quat, t: f32) -> Quat {
    let qa = q1.normalize();
    let mut qb = q2.normalize();

    let mut dot = qa.dot(qb);

    // Take the short path.
    if dot < 0.0 {
        qb = -qb;
        dot = -dot;
    }

    // Nearly parallel: lerp and renormalize.
    const DOT_THRESHOLD: f32 = 0.9995;
    if dot > DOT_THRESHOLD {
        let res = Quat::from_xyzw(
            lerp_f(qa.x, qb.x, t),
            lerp_f(qa.y, qb.y, t),
            lerp_f(qa.z, qb.z, t),
            lerp_f(qa.w, qb.w, t),
        );
        return res.normalize();
    }

    let theta_0 = dot.clamp(-1.0, 1.0).acos();
    let theta = theta_0 * t;
    let sin_theta_0 = theta_0.sin();

    let s0 = (theta_0 - theta).sin() / sin_theta_0;
    let s1 = theta.sin() / sin_theta_0;

    qa * s0 + qb * s1
}

/// Scalar cubic hermite.
#[inline]
pub fn hermite_f(value1: f32, tangent1: f32, value2: f32, tangent2: f32, amount: f32) -> f32 {
    let squared = amount * amount;
    let cubed = amount * squared;
    let part1 = 2.0 * cubed - 3.0 * squared + 1.0;
    let part2 = -2.0 * cubed + 3.0 * squared;
    let part3 = cubed - 2.0 * squared + amount;
    let part4 = cubed - squared;
    value1 * part1 + value2 * part2 + tangent1 * part3 + tangent2 * part4
}

/// Split a matrix into (scale, rotation, translation).
#[inline]
pub fn decompose(m: Mat4) -> (Vec3, Quat, Vec3) {
    m.to_scale_rotation_translation()
}

/// Inverse of [`decompose`]; the rotation is renormalized first.
#[inline]
pub fn compose(scale: Vec3, rotation: Quat, translation: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, rotation.normalize(), translation)
}

pub fn decompose_lerp(a: Mat4, b: Mat4, t: f32) -> Mat4 {
    let (sa, ra, ta) = decompose(a);
    let (sb, rb, tb) = decompose(b);
    compose(sa.lerp(sb, t), slerp(ra, rb, t), ta.lerp(tb, t))
}

fn lerp_matrix(a: Mat4, b: Mat4, t: f32) -> Mat4 {
    a + (b - a) * t
}

/// Component-wise linear interpolation. Quaternions are lerped per component
/// without renormalization; use [`blend`] for rotation-aware mixing.
pub fn lerp(a: &Value, b: &Value, t: f32) -> Result<Value, ValueError> {
    Ok(match (a, b) {
        (Value::Float(x), Value::Float(y)) => Value::Float(lerp_f(*x, *y, t)),
        (Value::Vec2(x), Value::Vec2(y)) => Value::Vec2(x.lerp(*y, t)),
        (Value::Vec3(x), Value::Vec3(y)) => Value::Vec3(x.lerp(*y, t)),
        (Value::Color3(x), Value::Color3(y)) => Value::Color3(x.lerp(*y, t)),
        (Value::Size(x), Value::Size(y)) => Value::Size(x.lerp(*y, t)),
        (Value::Quat(x), Value::Quat(y)) => Value::Quat(*x + (*y - *x) * t),
        (Value::Matrix(x), Value::Matrix(y)) => Value::Matrix(lerp_matrix(*x, *y, t)),
        _ => return Err(mismatch(a, b)),
    })
}

/// Type-appropriate interpolation: slerp for quaternions, `matrix` policy for
/// matrices, lerp for the rest.
pub fn blend(a: &Value, b: &Value, t: f32, matrix: MatrixBlend) -> Result<Value, ValueError> {
    match (a, b) {
        (Value::Quat(x), Value::Quat(y)) => Ok(Value::Quat(slerp(*x, *y, t))),
        (Value::Matrix(x), Value::Matrix(y)) => Ok(Value::Matrix(match matrix {
            MatrixBlend::Decompose => decompose_lerp(*x, *y, t),
            MatrixBlend::Elementwise => lerp_matrix(*x, *y, t),
        })),
        _ => lerp(a, b, t),
    }
}

/// Cubic hermite between `value1` and `value2`. Tangents must share the kind
/// of the values. Matrices have no hermite form.
pub fn hermite(
    value1: &Value,
    tangent1: &Value,
    value2: &Value,
    tangent2: &Value,
    amount: f32,
) -> Result<Value, ValueError> {
    let kind = value1.kind();
    for other in [tangent1, value2, tangent2] {
        if other.kind() != kind {
            return Err(mismatch(value1, other));
        }
    }
    let h = |a: f32, ta: f32, b: f32, tb: f32| hermite_f(a, ta, b, tb, amount);
    Ok(match (value1, tangent1, value2, tangent2) {
        (Value::Float(a), Value::Float(ta), Value::Float(b), Value::Float(tb)) => {
            Value::Float(h(*a, *ta, *b, *tb))
        }
        (Value::Vec2(a), Value::Vec2(ta), Value::Vec2(b), Value::Vec2(tb))
        | (Value::Size(a), Value::Size(ta), Value::Size(b), Value::Size(tb)) => {
            let v = glam::Vec2::new(h(a.x, ta.x, b.x, tb.x), h(a.y, ta.y, b.y, tb.y));
            if kind == crate::ValueKind::Size {
                Value::Size(v)
            } else {
                Value::Vec2(v)
            }
        }
        (Value::Vec3(a), Value::Vec3(ta), Value::Vec3(b), Value::Vec3(tb))
        | (Value::Color3(a), Value::Color3(ta), Value::Color3(b), Value::Color3(tb)) => {
            let v = Vec3::new(
                h(a.x, ta.x, b.x, tb.x),
                h(a.y, ta.y, b.y, tb.y),
                h(a.z, ta.z, b.z, tb.z),
            );
            if kind == crate::ValueKind::Color3 {
                Value::Color3(v)
            } else {
                Value::Vec3(v)
            }
        }
        (Value::Quat(a), Value::Quat(ta), Value::Quat(b), Value::Quat(tb)) => {
            Value::Quat(Quat::from_xyzw(
                h(a.x, ta.x, b.x, tb.x),
                h(a.y, ta.y, b.y, tb.y),
                h(a.z, ta.z, b.z, tb.z),
                h(a.w, ta.w, b.w, tb.w),
            ))
        }
        _ => {
            return Err(ValueError::UnsupportedBlend {
                op: "hermite",
                kind,
            })
        }
    })
}

pub fn add(a: &Value, b: &Value) -> Result<Value, ValueError> {
    Ok(match (a, b) {
        (Value::Float(x), Value::Float(y)) => Value::Float(x + y),
        (Value::Vec2(x), Value::Vec2(y)) => Value::Vec2(*x + *y),
        (Value::Vec3(x), Value::Vec3(y)) => Value::Vec3(*x + *y),
        (Value::Color3(x), Value::Color3(y)) => Value::Color3(*x + *y),
        (Value::Size(x), Value::Size(y)) => Value::Size(*x + *y),
        (Value::Quat(x), Value::Quat(y)) => Value::Quat(*x + *y),
        (Value::Matrix(x), Value::Matrix(y)) => Value::Matrix(*x + *y),
        _ => return Err(mismatch(a, b)),
    })
}

pub fn subtract(a: &Value, b: &Value) -> Result<Value, ValueError> {
    Ok(match (a, b) {
        (Value::Float(x), Value::Float(y)) => Value::Float(x - y),
        (Value::Vec2(x), Value::Vec2(y)) => Value::Vec2(*x - *y),
        (Value::Vec3(x), Value::Vec3(y)) => Value::Vec3(*x - *y),
        (Value::Color3(x), Value::Color3(y)) => Value::Color3(*x - *y),
        (Value::Size(x), Value::Size(y)) => Value::Size(*x - *y),
        (Value::Quat(x), Value::Quat(y)) => Value::Quat(*x - *y),
        (Value::Matrix(x), Value::Matrix(y)) => Value::Matrix(*x - *y),
        _ => return Err(mismatch(a, b)),
    })
}

/// Multiply every component by `s`.
pub fn scale(v: &Value, s: f32) -> Value {
    match v {
        Value::Float(x) => Value::Float(x * s),
        Value::Vec2(x) => Value::Vec2(*x * s),
        Value::Vec3(x) => Value::Vec3(*x * s),
        Value::Color3(x) => Value::Color3(*x * s),
        Value::Size(x) => Value::Size(*x * s),
        Value::Quat(x) => Value::Quat(*x * s),
        Value::Matrix(x) => Value::Matrix(*x * s),
    }
}

/// `acc += v * s`, in place.
pub fn scale_and_add(acc: &mut Value, v: &Value, s: f32) -> Result<(), ValueError> {
    let expected = acc.kind();
    match (acc, v) {
        (Value::Float(a), Value::Float(x)) => *a += x * s,
        (Value::Vec2(a), Value::Vec2(x)) | (Value::Size(a), Value::Size(x)) => *a += *x * s,
        (Value::Vec3(a), Value::Vec3(x)) | (Value::Color3(a), Value::Color3(x)) => *a += *x * s,
        (Value::Quat(a), Value::Quat(x)) => *a = *a + *x * s,
        (Value::Matrix(a), Value::Matrix(x)) => *a = *a + *x * s,
        _ => {
            return Err(ValueError::KindMismatch {
                expected,
                actual: v.kind(),
            })
        }
    }
    Ok(())
}
