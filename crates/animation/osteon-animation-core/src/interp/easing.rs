//! Easing functions applied to a segment gradient before interpolation.

use std::f32::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Serialize};

use super::functions::bezier_ease_t;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EasingMode {
    #[default]
    EaseIn,
    EaseOut,
    EaseInOut,
}

/// Shape of the ease-in half of an easing function.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EasingCurve {
    Circle,
    Back { amplitude: f32 },
    Cubic,
    Exponential { exponent: f32 },
    Power { power: f32 },
    Quadratic,
    Quartic,
    Quintic,
    Sine,
    /// Cubic bezier timing curve with control points (x1, y1) and (x2, y2).
    Bezier { x1: f32, y1: f32, x2: f32, y2: f32 },
}

impl EasingCurve {
    fn ease_in_core(&self, g: f32) -> f32 {
        match *self {
            EasingCurve::Circle => {
                let g = g.clamp(0.0, 1.0);
                1.0 - (1.0 - g * g).sqrt()
            }
            EasingCurve::Back { amplitude } => {
                let a = amplitude.max(0.0);
                g.powi(3) - g * a * (PI * g).sin()
            }
            EasingCurve::Cubic => g * g * g,
            EasingCurve::Exponential { exponent } => {
                if exponent <= 0.0 {
                    g
                } else {
                    ((exponent * g).exp() - 1.0) / (exponent.exp() - 1.0)
                }
            }
            EasingCurve::Power { power } => g.powf(power.max(0.0)),
            EasingCurve::Quadratic => g * g,
            EasingCurve::Quartic => g.powi(4),
            EasingCurve::Quintic => g.powi(5),
            EasingCurve::Sine => 1.0 - (FRAC_PI_2 * (1.0 - g)).sin(),
            EasingCurve::Bezier { x1, y1, x2, y2 } => bezier_ease_t(g, x1, y1, x2, y2),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EasingFunction {
    pub curve: EasingCurve,
    #[serde(default)]
    pub mode: EasingMode,
}

impl EasingFunction {
    pub fn new(curve: EasingCurve, mode: EasingMode) -> Self {
        Self { curve, mode }
    }

    /// Map a linear gradient in [0, 1] through the curve.
    pub fn ease(&self, gradient: f32) -> f32 {
        match self.mode {
            EasingMode::EaseIn => self.curve.ease_in_core(gradient),
            EasingMode::EaseOut => 1.0 - self.curve.ease_in_core(1.0 - gradient),
            EasingMode::EaseInOut => {
                if gradient >= 0.5 {
                    (1.0 - self.curve.ease_in_core((1.0 - gradient) * 2.0)) * 0.5 + 0.5
                } else {
                    self.curve.ease_in_core(gradient * 2.0) * 0.5
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32, eps: f32) {
        assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
    }

    #[test]
    fn endpoints_are_fixed() {
        for curve in [
            EasingCurve::Circle,
            EasingCurve::Cubic,
            EasingCurve::Sine,
            EasingCurve::Exponential { exponent: 2.0 },
            EasingCurve::Power { power: 3.0 },
        ] {
            for mode in [EasingMode::EaseIn, EasingMode::EaseOut, EasingMode::EaseInOut] {
                let e = EasingFunction::new(curve, mode);
                approx(e.ease(0.0), 0.0, 1e-5);
                approx(e.ease(1.0), 1.0, 1e-5);
            }
        }
    }

    #[test]
    fn quadratic_modes() {
        let ease_in = EasingFunction::new(EasingCurve::Quadratic, EasingMode::EaseIn);
        approx(ease_in.ease(0.5), 0.25, 1e-6);
        let ease_out = EasingFunction::new(EasingCurve::Quadratic, EasingMode::EaseOut);
        approx(ease_out.ease(0.5), 0.75, 1e-6);
        let in_out = EasingFunction::new(EasingCurve::Quadratic, EasingMode::EaseInOut);
        approx(in_out.ease(0.25), 0.125, 1e-6);
        approx(in_out.ease(0.5), 0.5, 1e-6);
    }

    #[test]
    fn linear_bezier_is_identity() {
        let e = EasingFunction::new(
            EasingCurve::Bezier {
                x1: 0.0,
                y1: 0.0,
                x2: 1.0,
                y2: 1.0,
            },
            EasingMode::EaseIn,
        );
        approx(e.ease(0.3), 0.3, 1e-6);
    }

    #[test]
    fn serde_tags_curve_kind() {
        let e: EasingFunction =
            serde_json::from_str(r#"{ "curve": { "kind": "Back", "amplitude": 1.0 }, "mode": "EaseOut" }"#)
                .unwrap();
        assert_eq!(e.curve, EasingCurve::Back { amplitude: 1.0 });
        assert_eq!(e.mode, EasingMode::EaseOut);
    }
}
