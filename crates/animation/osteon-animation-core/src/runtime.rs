//! Runtime animation: one track bound to one target property.
//!
//! Holds the transient evaluation state of a playing track (current frame,
//! loop caches, blend-in ramp, baseline values, per-runtime event flags) and
//! turns a host delay into a value that is either written straight onto the
//! target or registered with the late-binding resolver.

use hashbrown::HashMap;
use log::{debug, warn};
use osteon_api_core::{blend, Value, ValueKind};

use crate::binding::{AnimationTarget, PropertyHandle};
use crate::config::Config;
use crate::data::{Animation, AnimationEvent, KeyInterpolation, LoopMode};
use crate::error::AnimationError;
use crate::ids::{AnimId, AnimatableId, RuntimeId, TargetId};
use crate::interp::interpolate_segment;
use crate::late_binding::{Contribution, LateBindingKey, LateBindingResolver};
use crate::outputs::{CoreEvent, Outputs};

/// Borrowed scene state needed to evaluate one runtime animation.
pub struct EvalContext<'a> {
    pub animation: &'a Animation,
    pub target: &'a mut dyn AnimationTarget,
    pub late: &'a mut LateBindingResolver,
    pub cfg: &'a Config,
    pub outputs: &'a mut Outputs,
    /// Animatable driving this evaluation, reported in events.
    pub host: AnimatableId,
}

/// Frame position of a sync root, used to lock a follower's frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SyncFrame {
    pub master_frame: f32,
    pub from: f32,
    pub to: f32,
}

impl SyncFrame {
    /// Position of the master frame inside the root range, in [0, 1] for a
    /// frame inside the range. A degenerate root range maps to 0.
    pub fn normalized(&self) -> f32 {
        let span = self.to - self.from;
        if span == 0.0 {
            0.0
        } else {
            (self.master_frame - self.from) / span
        }
    }
}

/// Cache key for a (from, to) play range.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
struct RangeKey(u32, u32);

impl RangeKey {
    fn new(from: f32, to: f32) -> Self {
        Self(from.to_bits(), to.to_bits())
    }
}

#[derive(Clone, Debug)]
struct EventState {
    event: AnimationEvent,
    done: bool,
}

fn seed_events(animation: &Animation) -> Vec<EventState> {
    animation
        .events()
        .iter()
        .cloned()
        .map(|event| EventState { event, done: false })
        .collect()
}

#[derive(Clone, Debug)]
pub struct RuntimeAnimation {
    id: RuntimeId,
    animation: AnimId,
    target: TargetId,
    handle: Option<PropertyHandle>,

    current_frame: f32,
    current_value: Option<Value>,
    original_value: Option<Value>,
    original_blend_value: Option<Value>,
    blending_factor: f32,
    weight: Option<f32>,

    ratio_offset: f64,
    previous_delay: f64,
    previous_ratio: f64,
    repeat_count: i32,

    offsets_cache: HashMap<RangeKey, Value>,
    high_limits_cache: HashMap<RangeKey, Value>,
    events: Vec<EventState>,
    stopped: bool,
}

impl RuntimeAnimation {
    /// Bind `animation` to `target`. The property path is resolved once here;
    /// an unresolved path leaves the runtime inert and it stops on its first
    /// `animate`.
    pub fn new(
        id: RuntimeId,
        animation_id: AnimId,
        animation: &mut Animation,
        target_id: TargetId,
        target: &dyn AnimationTarget,
    ) -> Self {
        let handle = animation
            .target_property_path()
            .and_then(|path| target.resolve_property(&path));
        if handle.is_none() {
            warn!(
                "animation '{}': property '{}' does not resolve on target {target_id:?}",
                animation.name, animation.target_property
            );
        }
        animation.register_runtime(id);
        Self {
            id,
            animation: animation_id,
            target: target_id,
            handle,
            current_frame: 0.0,
            current_value: None,
            original_value: None,
            original_blend_value: None,
            blending_factor: 0.0,
            weight: None,
            ratio_offset: 0.0,
            previous_delay: 0.0,
            previous_ratio: 0.0,
            repeat_count: 0,
            offsets_cache: HashMap::new(),
            high_limits_cache: HashMap::new(),
            events: seed_events(animation),
            stopped: false,
        }
    }

    pub fn id(&self) -> RuntimeId {
        self.id
    }

    pub fn animation_id(&self) -> AnimId {
        self.animation
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn handle(&self) -> Option<PropertyHandle> {
        self.handle
    }

    pub fn current_frame(&self) -> f32 {
        self.current_frame
    }

    /// Value produced by the last evaluation, after the blend-in ramp.
    pub fn current_value(&self) -> Option<&Value> {
        self.current_value.as_ref()
    }

    /// Baseline captured on the first weighted write.
    pub fn original_value(&self) -> Option<&Value> {
        self.original_value.as_ref()
    }

    pub fn weight(&self) -> Option<f32> {
        self.weight
    }

    pub fn blending_factor(&self) -> f32 {
        self.blending_factor
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Loop mode in effect: the target override wins over the track.
    fn loop_mode(animation: &Animation, target: &dyn AnimationTarget) -> LoopMode {
        target
            .animation_properties_override()
            .map(|o| o.loop_mode)
            .unwrap_or(animation.loop_mode)
    }

    /// Evaluate the track at `current_frame`.
    ///
    /// Frames before the first key return the first key, frames past
    /// the last key return the last key. Constant loops that already
    /// repeated return `high_limit`. The stored frame is clamped to the
    /// key range.
    #[allow(clippy::too_many_arguments)]
    pub fn interpolate(
        &mut self,
        animation: &Animation,
        cfg: &Config,
        current_frame: f32,
        repeat_count: i32,
        loop_mode: LoopMode,
        offset: Option<&Value>,
        high_limit: Option<&Value>,
    ) -> Result<Value, AnimationError> {
        let keys = animation.keys();
        let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
            return Err(AnimationError::InvalidAnimation {
                reason: format!("animation '{}' has no keys", animation.name),
            });
        };
        self.current_frame = current_frame.clamp(first.frame, last.frame);

        if loop_mode == LoopMode::Constant && repeat_count > 0 {
            if let Some(high) = high_limit {
                return Ok(*high);
            }
        }
        if keys.len() == 1 || current_frame < first.frame {
            return Ok(first.value);
        }

        // Proportional guess, then walk back to a key strictly before the frame.
        let n = keys.len();
        let span = last.frame - first.frame;
        let guess = if span > 0.0 {
            (n as f32 * (current_frame - first.frame) / span).floor() as isize - 1
        } else {
            0
        };
        let mut start = guess.clamp(0, n as isize - 1) as usize;
        while start > 0 && keys[start].frame >= current_frame {
            start -= 1;
        }

        for pair in keys[start..].windows(2) {
            let (start_key, end_key) = (&pair[0], &pair[1]);
            if end_key.frame < current_frame {
                continue;
            }
            if start_key.interpolation == KeyInterpolation::Step {
                return Ok(start_key.value);
            }
            let frame_delta = end_key.frame - start_key.frame;
            if frame_delta <= 0.0 {
                return Ok(end_key.value);
            }
            let mut gradient = (current_frame - start_key.frame) / frame_delta;
            if let Some(easing) = &animation.easing {
                gradient = easing.ease(gradient);
            }
            return interpolate_segment(
                animation.data_type,
                start_key,
                end_key,
                gradient,
                frame_delta,
                loop_mode,
                offset,
                repeat_count,
                cfg.matrix_interpolation(),
            )
            .map_err(AnimationError::from);
        }

        Ok(last.value)
    }

    /// Advance to `delay` milliseconds of host time and apply the value.
    ///
    /// Returns `Ok(false)` once the runtime ran past `[from, to]` without
    /// looping, or when it can never produce a value (unresolved property,
    /// empty track).
    #[allow(clippy::too_many_arguments)]
    pub fn animate(
        &mut self,
        delay: f64,
        from: f32,
        to: f32,
        looping: bool,
        speed_ratio: f32,
        weight: Option<f32>,
        sync: Option<SyncFrame>,
        ctx: &mut EvalContext<'_>,
    ) -> Result<bool, AnimationError> {
        let Some(handle) = self.handle else {
            if !self.stopped {
                debug!("runtime {:?}: no resolved property, stopping", self.id);
            }
            self.stopped = true;
            return Ok(false);
        };
        let animation = ctx.animation;
        let keys = animation.keys();
        let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
            debug!("runtime {:?}: '{}' has no keys, stopping", self.id, animation.name);
            self.stopped = true;
            return Ok(false);
        };

        let (mut from, mut to) = (from, to);
        if from < first.frame || from > last.frame {
            from = first.frame;
        }
        if to < first.frame || to > last.frame {
            to = last.frame;
        }
        if from == to {
            if from > first.frame {
                from -= 1.0;
            } else if to < last.frame {
                to += 1.0;
            }
            debug!("runtime {:?}: degenerate range nudged to [{from}, {to}]", self.id);
        }

        let range = (to - from) as f64;
        let ratio = delay * (animation.frame_per_second as f64 * speed_ratio as f64) / 1000.0
            + self.ratio_offset;
        self.previous_delay = delay;
        self.previous_ratio = ratio;

        let loop_mode = Self::loop_mode(animation, &*ctx.target);
        let mut running = true;
        let mut offset = None;
        let mut high_limit = None;

        if ((to > from && ratio > range) || (from > to && ratio < range)) && !looping {
            running = false;
            high_limit = Some(last.value);
        } else if loop_mode != LoopMode::Cycle {
            let key = RangeKey::new(from, to);
            if !self.high_limits_cache.contains_key(&key) {
                let from_value =
                    self.interpolate(animation, ctx.cfg, from, 0, LoopMode::Cycle, None, None)?;
                let to_value =
                    self.interpolate(animation, ctx.cfg, to, 0, LoopMode::Cycle, None, None)?;
                if animation.data_type != ValueKind::Matrix {
                    self.offsets_cache
                        .insert(key, blend::subtract(&to_value, &from_value)?);
                }
                self.high_limits_cache.insert(key, to_value);
            }
            high_limit = self.high_limits_cache.get(&key).copied();
            offset = self.offsets_cache.get(&key).copied();
        }

        let (repeat_count, mut current_frame) = if range == 0.0 {
            (0, from)
        } else {
            let repeat = (ratio / range).trunc() as i32;
            let frame = if running {
                from + (ratio % range) as f32
            } else {
                to
            };
            (repeat, frame)
        };

        if let Some(sync) = sync {
            current_frame = from + (to - from) * sync.normalized();
        }

        let value = self.interpolate(
            animation,
            ctx.cfg,
            current_frame,
            repeat_count,
            loop_mode,
            offset.as_ref(),
            high_limit.as_ref(),
        )?;
        self.set_value(handle, value, weight, ctx)?;

        if looping && running && repeat_count > self.repeat_count {
            ctx.outputs.push_event(CoreEvent::AnimationLooped {
                animatable: ctx.host,
                animation: animation.name.clone(),
                repeat_count,
            });
        }
        self.repeat_count = repeat_count;

        self.fire_events(current_frame, from, to, ctx);

        if !running {
            self.stopped = true;
        }
        Ok(running)
    }

    fn fire_events(&mut self, current_frame: f32, from: f32, to: f32, ctx: &mut EvalContext<'_>) {
        let range = to - from;
        let mut idx = 0;
        while idx < self.events.len() {
            let state = &mut self.events[idx];
            let frame = state.event.frame;
            let crossed = (range > 0.0 && current_frame >= frame && frame >= from)
                || (range < 0.0 && current_frame <= frame && frame <= from);
            if crossed {
                if !state.done {
                    state.done = true;
                    ctx.outputs.push_event(CoreEvent::AnimationEvent {
                        animatable: ctx.host,
                        animation: ctx.animation.name.clone(),
                        name: state.event.name.clone(),
                        frame,
                    });
                    if state.event.only_once {
                        self.events.remove(idx);
                        continue;
                    }
                }
            } else if state.done && !state.event.only_once {
                // Looping re-entered the range before the event frame.
                state.done = false;
            }
            idx += 1;
        }
    }

    /// Apply `value`: run the blend-in ramp, capture baselines, then either
    /// register with the late-binding resolver (`weight` is `Some`) or write
    /// through (`None`).
    fn set_value(
        &mut self,
        handle: PropertyHandle,
        value: Value,
        weight: Option<f32>,
        ctx: &mut EvalContext<'_>,
    ) -> Result<(), AnimationError> {
        self.weight = weight;
        let animation = ctx.animation;
        let (enable_blending, blending_speed) = match ctx.target.animation_properties_override() {
            Some(o) => (o.enable_blending, o.blending_speed),
            None => (animation.enable_blending, animation.blending_speed),
        };
        let ramping = enable_blending && self.blending_factor <= 1.0;

        if ramping && self.original_blend_value.is_none() {
            self.original_blend_value = Some(ctx.target.get_value(handle).unwrap_or(value));
        }
        if weight.is_some() && self.original_value.is_none() {
            let baseline = ctx
                .target
                .rest_pose(handle)
                .or_else(|| ctx.target.get_value(handle))
                .unwrap_or(value);
            self.original_value = Some(baseline);
        }

        let current = match (ramping, self.original_blend_value) {
            (true, Some(start)) => {
                let v = blend::blend(&start, &value, self.blending_factor, ctx.cfg.matrix_blend())?;
                self.blending_factor += blending_speed;
                v
            }
            _ => value,
        };

        match weight {
            Some(weight) => ctx.late.register(
                LateBindingKey {
                    target: self.target,
                    property: handle,
                },
                Contribution {
                    runtime: self.id,
                    weight,
                    value: current,
                },
                self.original_value.unwrap_or(current),
            ),
            None => ctx.target.set_value(handle, &current)?,
        }
        ctx.target.mark_as_dirty(handle);
        self.current_value = Some(current);
        Ok(())
    }

    /// Jump to `frame` (clamped to the key range) and write the value
    /// through, bypassing late binding.
    pub fn go_to_frame(&mut self, frame: f32, ctx: &mut EvalContext<'_>) -> Result<(), AnimationError> {
        let Some(handle) = self.handle else {
            return Err(AnimationError::PropertyNotFound {
                path: ctx.animation.target_property.clone(),
            });
        };
        let animation = ctx.animation;
        let keys = animation.keys();
        let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
            return Err(AnimationError::InvalidAnimation {
                reason: format!("animation '{}' has no keys", animation.name),
            });
        };
        let frame = frame.clamp(first.frame, last.frame);
        let loop_mode = Self::loop_mode(animation, &*ctx.target);
        let value = self.interpolate(animation, ctx.cfg, frame, 0, loop_mode, None, None)?;
        self.set_value(handle, value, None, ctx)
    }

    /// Clear transient state for a replay. With `restore_original`, the
    /// captured baseline is written back onto the target first.
    pub fn reset(
        &mut self,
        animation: &Animation,
        target: &mut dyn AnimationTarget,
        restore_original: bool,
    ) -> Result<(), AnimationError> {
        if restore_original {
            if let (Some(handle), Some(original)) = (self.handle, self.original_value) {
                target.set_value(handle, &original)?;
                target.mark_as_dirty(handle);
            }
        }
        self.offsets_cache.clear();
        self.high_limits_cache.clear();
        self.current_frame = 0.0;
        self.blending_factor = 0.0;
        self.original_value = None;
        self.original_blend_value = None;
        self.repeat_count = 0;
        self.events = seed_events(animation);
        Ok(())
    }

    /// Re-anchor the ratio so a speed change does not jump in time.
    pub fn prepare_for_speed_ratio_change(&mut self, animation: &Animation, new_speed_ratio: f32) {
        let new_ratio = self.previous_delay
            * (animation.frame_per_second as f64 * new_speed_ratio as f64)
            / 1000.0;
        self.ratio_offset = self.previous_ratio - new_ratio;
    }

    /// Unregister from the track.
    pub fn dispose(&self, animation: &mut Animation) {
        animation.unregister_runtime(self.id);
    }
}
