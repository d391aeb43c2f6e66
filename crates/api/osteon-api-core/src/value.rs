//! Value: the typed payload carried by keys, targets and late-binding holders.
//! All numeric types use f32 and glam storage.

use glam::{Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Kind of an animated value. A track's `data_type` is one of these and decides
/// which interpolation and blend arithmetic applies.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Float,
    Vec2,
    Vec3,
    Quat,
    Matrix,
    Color3,
    Size,
}

impl ValueKind {
    /// Additive identity for this kind. Used as the relative-loop offset when
    /// none has been computed yet.
    pub fn zero(self) -> Value {
        match self {
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Vec2 => Value::Vec2(Vec2::ZERO),
            ValueKind::Vec3 => Value::Vec3(Vec3::ZERO),
            ValueKind::Quat => Value::Quat(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0)),
            ValueKind::Matrix => Value::Matrix(Mat4::ZERO),
            ValueKind::Color3 => Value::Color3(Vec3::ZERO),
            ValueKind::Size => Value::Size(Vec2::ZERO),
        }
    }

    /// Kinds whose keys may carry in/out tangents.
    #[inline]
    pub fn supports_tangents(self) -> bool {
        matches!(
            self,
            ValueKind::Float | ValueKind::Vec2 | ValueKind::Vec3 | ValueKind::Quat
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum Value {
    Float(f32),

    Vec2(Vec2),

    Vec3(Vec3),

    /// Rotation quaternion (x, y, z, w)
    Quat(Quat),

    /// Column-major 4x4 transform
    Matrix(Mat4),

    /// Linear RGB color
    Color3(Vec3),

    /// Width / height pair
    Size(Vec2),
}

impl Value {
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Float(_) => ValueKind::Float,
            Value::Vec2(_) => ValueKind::Vec2,
            Value::Vec3(_) => ValueKind::Vec3,
            Value::Quat(_) => ValueKind::Quat,
            Value::Matrix(_) => ValueKind::Matrix,
            Value::Color3(_) => ValueKind::Color3,
            Value::Size(_) => ValueKind::Size,
        }
    }

    pub fn f(v: f32) -> Self {
        Value::Float(v)
    }

    pub fn vec3(x: f32, y: f32, z: f32) -> Self {
        Value::Vec3(Vec3::new(x, y, z))
    }

    pub fn quat(x: f32, y: f32, z: f32, w: f32) -> Self {
        Value::Quat(Quat::from_xyzw(x, y, z, w))
    }

    pub fn color3(r: f32, g: f32, b: f32) -> Self {
        Value::Color3(Vec3::new(r, g, b))
    }

    pub fn size(width: f32, height: f32) -> Self {
        Value::Size(Vec2::new(width, height))
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<Vec2> {
        match self {
            Value::Vec2(v) | Value::Size(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Value::Vec3(v) | Value::Color3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_quat(&self) -> Option<Quat> {
        match self {
            Value::Quat(q) => Some(*q),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<Mat4> {
        match self {
            Value::Matrix(m) => Some(*m),
            _ => None,
        }
    }

    /// Component-wise approximate equality, useful for tests and change
    /// detection. Kinds must match.
    pub fn abs_diff_eq(&self, other: &Value, eps: f32) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => (a - b).abs() <= eps,
            (Value::Vec2(a), Value::Vec2(b)) | (Value::Size(a), Value::Size(b)) => {
                a.abs_diff_eq(*b, eps)
            }
            (Value::Vec3(a), Value::Vec3(b)) | (Value::Color3(a), Value::Color3(b)) => {
                a.abs_diff_eq(*b, eps)
            }
            (Value::Quat(a), Value::Quat(b)) => a.abs_diff_eq(*b, eps),
            (Value::Matrix(a), Value::Matrix(b)) => a.abs_diff_eq(*b, eps),
            _ => false,
        }
    }
}
