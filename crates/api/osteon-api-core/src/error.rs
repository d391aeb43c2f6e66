//! Errors raised by value arithmetic and path parsing.

use crate::ValueKind;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ValueError {
    /// Two operands (or a key and its track) disagree on kind.
    #[error("value kind mismatch: expected {expected:?}, got {actual:?}")]
    KindMismatch {
        expected: ValueKind,
        actual: ValueKind,
    },

    /// The operation has no meaning for this kind (e.g. hermite on a matrix).
    #[error("unsupported blend type: {op} is not defined for {kind:?}")]
    UnsupportedBlend { op: &'static str, kind: ValueKind },

    #[error("invalid property path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid value json: {reason}")]
    InvalidJson { reason: String },
}
