//! Scene clock: turns wall-clock samples into accumulated animation time.

use crate::config::Config;

/// Fixed step used when `use_constant_animation_delta_time` is set.
pub const CONSTANT_DELTA_MS: f64 = 16.0;

#[derive(Clone, Debug, Default)]
pub struct SceneClock {
    last_ms: Option<f64>,
    animation_time: f64,
    render_id: u64,
}

impl SceneClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one rendered frame.
    pub fn next_render_id(&mut self) -> u64 {
        self.render_id = self.render_id.wrapping_add(1);
        self.render_id
    }

    /// Advance animation time to wall-clock `now_ms` and return it. The
    /// first sample only anchors the clock. A clock that goes backwards
    /// contributes no time.
    pub fn tick(&mut self, now_ms: f64, cfg: &Config) -> f64 {
        let last = *self.last_ms.get_or_insert(now_ms);
        let delta = if cfg.use_constant_animation_delta_time {
            CONSTANT_DELTA_MS
        } else {
            (now_ms - last).max(0.0) * cfg.animation_time_scale
        };
        self.animation_time += delta;
        self.last_ms = Some(now_ms);
        self.animation_time
    }

    /// Milliseconds of animation time accumulated so far.
    pub fn animation_time(&self) -> f64 {
        self.animation_time
    }

    pub fn render_id(&self) -> u64 {
        self.render_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_anchors_then_accumulates_scaled_deltas() {
        let cfg = Config {
            animation_time_scale: 0.5,
            ..Config::default()
        };
        let mut clock = SceneClock::new();
        assert_eq!(clock.tick(1000.0, &cfg), 0.0);
        assert_eq!(clock.tick(1100.0, &cfg), 50.0);
        assert_eq!(clock.tick(1050.0, &cfg), 50.0);
        assert_eq!(clock.tick(1250.0, &cfg), 150.0);
    }

    #[test]
    fn constant_delta_ignores_wall_clock() {
        let cfg = Config {
            use_constant_animation_delta_time: true,
            ..Config::default()
        };
        let mut clock = SceneClock::new();
        clock.tick(0.0, &cfg);
        clock.tick(500.0, &cfg);
        assert_eq!(clock.animation_time(), 32.0);
        assert_eq!(clock.next_render_id(), 1);
    }
}
