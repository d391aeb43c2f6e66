//! Animatable: the runtime animations started by one play request, sharing a
//! frame range, loop flag, speed ratio and weight.

use log::debug;

use crate::binding::TargetStore;
use crate::config::Config;
use crate::data::Animation;
use crate::error::AnimationError;
use crate::ids::{AnimId, AnimatableId, RuntimeId, TargetId};
use crate::late_binding::LateBindingResolver;
use crate::outputs::Outputs;
use crate::runtime::{EvalContext, RuntimeAnimation, SyncFrame};

/// Scene state lent to animatables for one tick.
pub(crate) struct FrameEnv<'a> {
    pub anims: &'a [(AnimId, Animation)],
    pub targets: &'a mut TargetStore,
    pub late: &'a mut LateBindingResolver,
    pub cfg: &'a Config,
    pub outputs: &'a mut Outputs,
}

pub(crate) fn find_animation(anims: &[(AnimId, Animation)], id: AnimId) -> Result<&Animation, AnimationError> {
    anims
        .iter()
        .find(|(a, _)| *a == id)
        .map(|(_, anim)| anim)
        .ok_or(AnimationError::AnimationNotFound { id })
}

pub(crate) fn find_animation_mut(
    anims: &mut [(AnimId, Animation)],
    id: AnimId,
) -> Result<&mut Animation, AnimationError> {
    anims
        .iter_mut()
        .find(|(a, _)| *a == id)
        .map(|(_, anim)| anim)
        .ok_or(AnimationError::AnimationNotFound { id })
}

/// Clamp a requested weight; `None` stays unweighted.
fn clamp_weight(weight: Option<f32>) -> Option<f32> {
    weight.map(|w| w.clamp(0.0, 1.0))
}

#[derive(Clone, Debug)]
pub struct Animatable {
    id: AnimatableId,
    target: TargetId,
    pub from_frame: f32,
    pub to_frame: f32,
    pub loop_animation: bool,
    speed_ratio: f32,
    weight: Option<f32>,
    runtimes: Vec<RuntimeAnimation>,
    sync_root: Option<AnimatableId>,

    local_delay_offset: Option<f64>,
    paused_delay: Option<f64>,
    paused: bool,
    animation_started: bool,
}

impl Animatable {
    pub fn new(
        id: AnimatableId,
        target: TargetId,
        from_frame: f32,
        to_frame: f32,
        loop_animation: bool,
        speed_ratio: f32,
    ) -> Self {
        Self {
            id,
            target,
            from_frame,
            to_frame,
            loop_animation,
            speed_ratio,
            weight: None,
            runtimes: Vec::new(),
            sync_root: None,
            local_delay_offset: None,
            paused_delay: None,
            paused: false,
            animation_started: false,
        }
    }

    pub fn id(&self) -> AnimatableId {
        self.id
    }

    /// Target the play request was issued for.
    pub fn target(&self) -> TargetId {
        self.target
    }

    /// True when any runtime animation writes to `target`.
    pub fn drives(&self, target: TargetId) -> bool {
        self.target == target || self.runtimes.iter().any(|r| r.target() == target)
    }

    pub fn runtimes(&self) -> &[RuntimeAnimation] {
        &self.runtimes
    }

    pub(crate) fn runtimes_mut(&mut self) -> &mut Vec<RuntimeAnimation> {
        &mut self.runtimes
    }

    pub fn add_runtime(&mut self, runtime: RuntimeAnimation) {
        self.runtimes.push(runtime);
    }

    pub fn runtime(&self, id: RuntimeId) -> Option<&RuntimeAnimation> {
        self.runtimes.iter().find(|r| r.id() == id)
    }

    pub fn speed_ratio(&self) -> f32 {
        self.speed_ratio
    }

    /// Change the playback speed without a jump: every runtime re-anchors its
    /// ratio on the last delay it saw.
    pub fn set_speed_ratio(
        &mut self,
        speed_ratio: f32,
        anims: &[(AnimId, Animation)],
    ) -> Result<(), AnimationError> {
        for runtime in &mut self.runtimes {
            let animation = find_animation(anims, runtime.animation_id())?;
            runtime.prepare_for_speed_ratio_change(animation, speed_ratio);
        }
        self.speed_ratio = speed_ratio;
        Ok(())
    }

    pub fn weight(&self) -> Option<f32> {
        self.weight
    }

    /// `None` writes straight onto targets; `Some(w)` is clamped to [0, 1] and
    /// goes through late binding. Weight 0 keeps the animatable alive without
    /// evaluating it.
    pub fn set_weight(&mut self, weight: Option<f32>) {
        self.weight = clamp_weight(weight);
    }

    pub fn sync_root(&self) -> Option<AnimatableId> {
        self.sync_root
    }

    pub(crate) fn set_sync_root(&mut self, root: Option<AnimatableId>) {
        self.sync_root = root;
    }

    /// Frame of the first runtime animation, used by followers.
    pub fn master_frame(&self) -> f32 {
        self.runtimes
            .first()
            .map(RuntimeAnimation::current_frame)
            .unwrap_or(0.0)
    }

    pub fn sync_frame(&self) -> SyncFrame {
        SyncFrame {
            master_frame: self.master_frame(),
            from: self.from_frame,
            to: self.to_frame,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn animation_started(&self) -> bool {
        self.animation_started
    }

    pub fn pause(&mut self) {
        if !self.paused {
            debug!("animatable {:?} paused", self.id);
        }
        self.paused = true;
    }

    pub fn restart(&mut self) {
        self.paused = false;
    }

    /// Runtime animation whose track drives `property` (its dotted path).
    pub fn runtime_by_target_property<'a>(
        &'a self,
        property: &str,
        anims: &[(AnimId, Animation)],
    ) -> Option<&'a RuntimeAnimation> {
        self.runtimes.iter().find(|r| {
            find_animation(anims, r.animation_id())
                .map(|a| a.target_property == property)
                .unwrap_or(false)
        })
    }

    /// Rewind every runtime and forget the local time origin.
    pub fn reset(
        &mut self,
        anims: &[(AnimId, Animation)],
        targets: &mut TargetStore,
        restore_original: bool,
    ) -> Result<(), AnimationError> {
        for runtime in &mut self.runtimes {
            let animation = find_animation(anims, runtime.animation_id())?;
            let target = targets
                .get_mut(runtime.target())
                .ok_or(AnimationError::TargetNotFound { id: runtime.target() })?;
            runtime.reset(animation, target, restore_original)?;
        }
        self.local_delay_offset = None;
        self.paused_delay = None;
        Ok(())
    }

    /// Jump every runtime to `frame` and shift the local time origin so
    /// playback resumes from there.
    pub(crate) fn go_to_frame(&mut self, frame: f32, env: &mut FrameEnv<'_>) -> Result<(), AnimationError> {
        if let Some(first) = self.runtimes.first() {
            let fps = find_animation(env.anims, first.animation_id())?.frame_per_second as f64;
            let speed = self.speed_ratio as f64;
            if fps * speed != 0.0 {
                let adjust = (frame - first.current_frame()) as f64;
                let delay = adjust * 1000.0 / (fps * speed);
                *self.local_delay_offset.get_or_insert(0.0) -= delay;
            }
        }
        for runtime in &mut self.runtimes {
            let animation = find_animation(env.anims, runtime.animation_id())?;
            let target = env
                .targets
                .get_mut(runtime.target())
                .ok_or(AnimationError::TargetNotFound { id: runtime.target() })?;
            let mut ctx = EvalContext {
                animation,
                target,
                late: &mut *env.late,
                cfg: env.cfg,
                outputs: &mut *env.outputs,
                host: self.id,
            };
            runtime.go_to_frame(frame, &mut ctx)?;
        }
        Ok(())
    }

    /// Evaluate one tick at scene time `delay` (ms). Returns `Ok(false)` once
    /// no runtime animation is running anymore.
    pub(crate) fn animate(
        &mut self,
        delay: f64,
        sync: Option<SyncFrame>,
        env: &mut FrameEnv<'_>,
    ) -> Result<bool, AnimationError> {
        if self.paused {
            self.animation_started = false;
            if self.paused_delay.is_none() {
                self.paused_delay = Some(delay);
            }
            return Ok(true);
        }

        match (self.local_delay_offset, self.paused_delay.take()) {
            (None, _) => self.local_delay_offset = Some(delay),
            (Some(offset), Some(paused)) => self.local_delay_offset = Some(offset + delay - paused),
            (Some(_), None) => {}
        }

        if self.weight == Some(0.0) {
            return Ok(true);
        }

        let local = delay - self.local_delay_offset.unwrap_or(delay);
        let mut running = false;
        for runtime in &mut self.runtimes {
            let animation = find_animation(env.anims, runtime.animation_id())?;
            let target = env
                .targets
                .get_mut(runtime.target())
                .ok_or(AnimationError::TargetNotFound { id: runtime.target() })?;
            let mut ctx = EvalContext {
                animation,
                target,
                late: &mut *env.late,
                cfg: env.cfg,
                outputs: &mut *env.outputs,
                host: self.id,
            };
            let is_running = runtime.animate(
                local,
                self.from_frame,
                self.to_frame,
                self.loop_animation,
                self.speed_ratio,
                self.weight,
                sync,
                &mut ctx,
            )?;
            running = running || is_running;
        }
        self.animation_started = running;
        Ok(running)
    }

    /// Drop runtime animations, all of them or only those whose track is
    /// named `animation_name`. Dropped runtimes unregister from their track.
    /// Returns true when nothing is left.
    pub fn stop(&mut self, animation_name: Option<&str>, anims: &mut [(AnimId, Animation)]) -> bool {
        let mut kept = Vec::with_capacity(self.runtimes.len());
        for runtime in self.runtimes.drain(..) {
            let Ok(animation) = find_animation_mut(anims, runtime.animation_id()) else {
                continue;
            };
            let matches = animation_name.map_or(true, |name| animation.name == name);
            if matches {
                runtime.dispose(animation);
            } else {
                kept.push(runtime);
            }
        }
        self.runtimes = kept;
        self.runtimes.is_empty()
    }
}
