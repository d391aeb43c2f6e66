//! Key interpolation: easing curves and per-kind segment evaluation.

pub mod easing;
pub mod functions;

pub use easing::{EasingCurve, EasingFunction, EasingMode};
pub use functions::interpolate_segment;
