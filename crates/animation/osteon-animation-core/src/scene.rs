//! Scene: owns the animation library, the targets and the active
//! animatables, and runs the per-frame tick.
//!
//! Methods:
//! - load_animation, attach_animation, load_skeleton_animations, add_target
//! - begin_direct_animation, begin_animation, begin_weighted_animation
//! - stop_animation, stop_all_animations, playback controls per animatable
//! - animate (clock → animatables → late binding → prepare)

use hashbrown::HashMap;
use log::{debug, error, warn};

use crate::animatable::{find_animation, find_animation_mut, Animatable, FrameEnv};
use crate::binding::{AnimationTarget, TargetStore};
use crate::clock::SceneClock;
use crate::config::Config;
use crate::data::Animation;
use crate::error::AnimationError;
use crate::ids::{AnimId, AnimatableId, IdAllocator, RuntimeId, TargetId};
use crate::late_binding::LateBindingResolver;
use crate::outputs::{CoreEvent, Outputs};
use crate::runtime::RuntimeAnimation;
use crate::scratch::Scratch;
use crate::skeleton::Skeleton;

pub struct Scene {
    cfg: Config,
    ids: IdAllocator,
    anims: Vec<(AnimId, Animation)>,
    /// Tracks a target carries, used by `begin_animation`.
    attached: HashMap<TargetId, Vec<AnimId>>,
    targets: TargetStore,
    animatables: Vec<Animatable>,
    late: LateBindingResolver,
    scratch: Scratch,
    clock: SceneClock,
    outputs: Outputs,
    /// Events raised between ticks, reported with the next tick.
    pending: Outputs,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Create one runtime per animation and attach it to `animatable`.
fn append_runtimes(
    ids: &mut IdAllocator,
    anims: &mut [(AnimId, Animation)],
    targets: &TargetStore,
    animatable: &mut Animatable,
    target: TargetId,
    animations: &[AnimId],
) -> Result<(), AnimationError> {
    let object = targets.get(target).ok_or(AnimationError::TargetNotFound { id: target })?;
    for &anim_id in animations {
        let animation = find_animation_mut(anims, anim_id)?;
        let runtime = RuntimeAnimation::new(ids.alloc_runtime(), anim_id, animation, target, object);
        animatable.add_runtime(runtime);
    }
    Ok(())
}

impl Scene {
    pub fn new(cfg: Config) -> Self {
        Self {
            scratch: Scratch::new(&cfg),
            late: LateBindingResolver::with_capacity(cfg.scratch_holders),
            cfg,
            ids: IdAllocator::new(),
            anims: Vec::new(),
            attached: HashMap::new(),
            targets: TargetStore::new(),
            animatables: Vec::new(),
            clock: SceneClock::new(),
            outputs: Outputs::default(),
            pending: Outputs::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.cfg
    }

    // ---------- library ----------

    pub fn load_animation(&mut self, mut animation: Animation) -> AnimId {
        let id = self.ids.alloc_anim();
        animation.id = Some(id);
        self.anims.push((id, animation));
        id
    }

    pub fn animation(&self, id: AnimId) -> Option<&Animation> {
        find_animation(&self.anims, id).ok()
    }

    pub fn animation_mut(&mut self, id: AnimId) -> Option<&mut Animation> {
        find_animation_mut(&mut self.anims, id).ok()
    }

    pub fn animations(&self) -> impl Iterator<Item = (AnimId, &Animation)> {
        self.anims.iter().map(|(id, a)| (*id, a))
    }

    /// Make `animation` one of the tracks `target` carries.
    pub fn attach_animation(&mut self, target: TargetId, animation: AnimId) -> Result<(), AnimationError> {
        self.targets.get(target).ok_or(AnimationError::TargetNotFound { id: target })?;
        find_animation(&self.anims, animation)?;
        let list = self.attached.entry(target).or_default();
        if !list.contains(&animation) {
            list.push(animation);
        }
        Ok(())
    }

    pub fn attached_animations(&self, target: TargetId) -> &[AnimId] {
        self.attached.get(&target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Load copies of every bone track of the skeleton stored as `target` and
    /// attach them to it. Tracks addressing a bone's own `matrix` are
    /// rewritten to `<bone>.matrix`.
    pub fn load_skeleton_animations(&mut self, target: TargetId) -> Result<Vec<AnimId>, AnimationError> {
        let skeleton = self.targets.downcast::<Skeleton>(target)?;
        let mut tracks = Vec::new();
        for bone in skeleton.bones() {
            for animation in &bone.animations {
                let mut animation = animation.clone();
                if matches!(animation.target_property.as_str(), "matrix" | "_matrix") {
                    animation.target_property = format!("{}.matrix", bone.name);
                }
                tracks.push(animation);
            }
        }
        let ids: Vec<AnimId> = tracks.into_iter().map(|a| self.load_animation(a)).collect();
        self.attached.entry(target).or_default().extend(ids.iter().copied());
        debug!("skeleton target {target:?}: loaded {} bone tracks", ids.len());
        Ok(ids)
    }

    // ---------- targets ----------

    pub fn add_target<T: AnimationTarget>(&mut self, target: T) -> TargetId {
        let id = self.ids.alloc_target();
        self.targets.insert(id, Box::new(target));
        id
    }

    pub fn target(&self, id: TargetId) -> Option<&dyn AnimationTarget> {
        self.targets.get(id)
    }

    pub fn target_mut(&mut self, id: TargetId) -> Option<&mut (dyn AnimationTarget + 'static)> {
        self.targets.get_mut(id)
    }

    pub fn target_as<T: AnimationTarget>(&self, id: TargetId) -> Result<&T, AnimationError> {
        self.targets.downcast(id)
    }

    pub fn target_as_mut<T: AnimationTarget>(&mut self, id: TargetId) -> Result<&mut T, AnimationError> {
        self.targets.downcast_mut(id)
    }

    // ---------- starting playback ----------

    /// Play `animations` on `target` in a new animatable, leaving anything
    /// already playing untouched.
    pub fn begin_direct_animation(
        &mut self,
        target: TargetId,
        animations: &[AnimId],
        from: f32,
        to: f32,
        loop_animation: bool,
        speed_ratio: f32,
    ) -> Result<AnimatableId, AnimationError> {
        let id = self.ids.alloc_animatable();
        let mut animatable = Animatable::new(id, target, from, to, loop_animation, speed_ratio);
        append_runtimes(&mut self.ids, &mut self.anims, &self.targets, &mut animatable, target, animations)?;
        debug!("animatable {id:?} begins on {target:?}: {} tracks, [{from}, {to}]", animations.len());
        self.animatables.push(animatable);
        Ok(id)
    }

    /// Play the tracks attached to `target`. A `from` above `to` plays
    /// backwards. With `stop_current`, animatables already driving the target
    /// are stopped first.
    pub fn begin_animation(
        &mut self,
        target: TargetId,
        from: f32,
        to: f32,
        loop_animation: bool,
        speed_ratio: f32,
        stop_current: bool,
    ) -> Result<AnimatableId, AnimationError> {
        let speed_ratio = if from > to && speed_ratio > 0.0 {
            -speed_ratio
        } else {
            speed_ratio
        };
        if stop_current {
            self.stop_animation(target, None);
        }
        let tracks = self.attached.get(&target).cloned().unwrap_or_default();
        let id = self.begin_direct_animation(target, &tracks, from, to, loop_animation, speed_ratio)?;
        self.reset_animatable(id, true)?;
        Ok(id)
    }

    /// `begin_animation` without stopping current playback, at `weight`.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_weighted_animation(
        &mut self,
        target: TargetId,
        from: f32,
        to: f32,
        weight: f32,
        loop_animation: bool,
        speed_ratio: f32,
    ) -> Result<AnimatableId, AnimationError> {
        let id = self.begin_animation(target, from, to, loop_animation, speed_ratio, false)?;
        self.set_weight(id, Some(weight))?;
        Ok(id)
    }

    // ---------- lookup ----------

    pub fn animatables(&self) -> &[Animatable] {
        &self.animatables
    }

    pub fn animatable(&self, id: AnimatableId) -> Option<&Animatable> {
        self.animatables.iter().find(|a| a.id() == id)
    }

    pub fn animatable_mut(&mut self, id: AnimatableId) -> Option<&mut Animatable> {
        self.animatables.iter_mut().find(|a| a.id() == id)
    }

    fn animatable_index(&self, id: AnimatableId) -> Result<usize, AnimationError> {
        self.animatables
            .iter()
            .position(|a| a.id() == id)
            .ok_or(AnimationError::AnimatableNotFound { id })
    }

    /// First active animatable started for `target`.
    pub fn animatable_by_target(&self, target: TargetId) -> Option<&Animatable> {
        self.animatables.iter().find(|a| a.target() == target)
    }

    pub fn animatables_by_target(&self, target: TargetId) -> impl Iterator<Item = &Animatable> {
        self.animatables.iter().filter(move |a| a.target() == target)
    }

    /// Track of animatable `id` that drives `property`.
    pub fn animation_by_target_property(&self, id: AnimatableId, property: &str) -> Option<&Animation> {
        let runtime = self.animatable(id)?.runtime_by_target_property(property, &self.anims)?;
        self.animation(runtime.animation_id())
    }

    // ---------- control ----------

    /// Stop the animatables started for `target`: all their tracks, or only
    /// those named `animation_name`. Animatables left empty are removed.
    pub fn stop_animation(&mut self, target: TargetId, animation_name: Option<&str>) {
        let anims = &mut self.anims;
        let pending = &mut self.pending;
        self.animatables.retain_mut(|a| {
            if a.target() != target || !a.stop(animation_name, anims) {
                return true;
            }
            debug!("animatable {:?} stopped", a.id());
            pending.push_event(CoreEvent::AnimatableEnded { animatable: a.id() });
            false
        });
    }

    pub fn stop_all_animations(&mut self) {
        for mut a in self.animatables.drain(..) {
            a.stop(None, &mut self.anims);
            self.pending.push_event(CoreEvent::AnimatableEnded { animatable: a.id() });
        }
        debug!("all animatables stopped");
    }

    pub fn set_speed_ratio(&mut self, id: AnimatableId, speed_ratio: f32) -> Result<(), AnimationError> {
        let i = self.animatable_index(id)?;
        self.animatables[i].set_speed_ratio(speed_ratio, &self.anims)
    }

    pub fn set_weight(&mut self, id: AnimatableId, weight: Option<f32>) -> Result<(), AnimationError> {
        let i = self.animatable_index(id)?;
        self.animatables[i].set_weight(weight);
        Ok(())
    }

    /// Jump animatable `id` to `frame`, writing values through immediately.
    pub fn go_to_frame(&mut self, id: AnimatableId, frame: f32) -> Result<(), AnimationError> {
        let i = self.animatable_index(id)?;
        let mut env = FrameEnv {
            anims: &self.anims,
            targets: &mut self.targets,
            late: &mut self.late,
            cfg: &self.cfg,
            outputs: &mut self.pending,
        };
        self.animatables[i].go_to_frame(frame, &mut env)
    }

    pub fn reset_animatable(&mut self, id: AnimatableId, restore_original: bool) -> Result<(), AnimationError> {
        let i = self.animatable_index(id)?;
        self.animatables[i].reset(&self.anims, &mut self.targets, restore_original)
    }

    /// Turn on the blend-in ramp for every track of animatable `id`.
    pub fn enable_blending(&mut self, id: AnimatableId, blending_speed: f32) -> Result<(), AnimationError> {
        self.set_blending(id, Some(blending_speed))
    }

    pub fn disable_blending(&mut self, id: AnimatableId) -> Result<(), AnimationError> {
        self.set_blending(id, None)
    }

    fn set_blending(&mut self, id: AnimatableId, speed: Option<f32>) -> Result<(), AnimationError> {
        let i = self.animatable_index(id)?;
        for runtime in self.animatables[i].runtimes() {
            let animation = find_animation_mut(&mut self.anims, runtime.animation_id())?;
            animation.enable_blending = speed.is_some();
            if let Some(speed) = speed {
                animation.blending_speed = speed;
            }
        }
        Ok(())
    }

    /// Lock animatable `id` to the frame position of `root`, or unlock it with
    /// `None`. A synced animatable is moved after every other so its root is
    /// always evaluated first.
    pub fn sync_with(&mut self, id: AnimatableId, root: Option<AnimatableId>) -> Result<(), AnimationError> {
        if let Some(root) = root {
            self.animatable_index(root)?;
        }
        let i = self.animatable_index(id)?;
        let mut animatable = self.animatables.remove(i);
        animatable.set_sync_root(root);
        self.animatables.push(animatable);
        Ok(())
    }

    pub fn pause(&mut self, id: AnimatableId) -> Result<(), AnimationError> {
        let i = self.animatable_index(id)?;
        self.animatables[i].pause();
        Ok(())
    }

    pub fn restart(&mut self, id: AnimatableId) -> Result<(), AnimationError> {
        let i = self.animatable_index(id)?;
        self.animatables[i].restart();
        Ok(())
    }

    // ---------- tick ----------

    /// Run one frame at wall-clock `now_ms`: advance the clock, evaluate every
    /// animatable, then resolve late bindings once and let targets refresh
    /// their caches. Animatables that finished or failed are retired.
    pub fn animate(&mut self, now_ms: f64) -> &Outputs {
        self.outputs.clear();
        self.outputs.changes.append(&mut self.pending.changes);
        self.outputs.events.append(&mut self.pending.events);
        self.clock.next_render_id();

        if !self.cfg.animations_enabled || self.animatables.is_empty() {
            return &self.outputs;
        }
        let time = self.clock.tick(now_ms, &self.cfg);

        let mut retired = Vec::new();
        {
            let mut env = FrameEnv {
                anims: &self.anims,
                targets: &mut self.targets,
                late: &mut self.late,
                cfg: &self.cfg,
                outputs: &mut self.outputs,
            };
            for i in 0..self.animatables.len() {
                let sync = self.animatables[i].sync_root().and_then(|root| {
                    self.animatables
                        .iter()
                        .find(|a| a.id() == root)
                        .map(Animatable::sync_frame)
                });
                let animatable = &mut self.animatables[i];
                match animatable.animate(time, sync, &mut env) {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!("animatable {:?} ended", animatable.id());
                        env.outputs.push_event(CoreEvent::AnimatableEnded {
                            animatable: animatable.id(),
                        });
                        retired.push(animatable.id());
                    }
                    Err(err) => {
                        error!("animatable {:?} retired: {err}", animatable.id());
                        let runtimes: Vec<RuntimeId> =
                            animatable.runtimes().iter().map(RuntimeAnimation::id).collect();
                        env.late.discard(&runtimes);
                        env.outputs.push_event(CoreEvent::Error {
                            animatable: Some(animatable.id()),
                            message: err.to_string(),
                        });
                        retired.push(animatable.id());
                    }
                }
            }
        }

        self.late
            .process(&mut self.targets, &self.cfg, &mut self.scratch, &mut self.outputs);

        if !retired.is_empty() {
            let anims = &mut self.anims;
            self.animatables.retain_mut(|a| {
                if retired.contains(&a.id()) {
                    a.stop(None, anims);
                    false
                } else {
                    true
                }
            });
        }

        for (_, target) in self.targets.iter_mut() {
            target.prepare();
        }

        let dropped = self.outputs.truncate_events(self.cfg.max_events_per_tick);
        if dropped > 0 {
            warn!("{dropped} events dropped this frame (max_events_per_tick = {})", self.cfg.max_events_per_tick);
        }
        &self.outputs
    }

    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    /// Number of `animate` calls so far.
    pub fn render_id(&self) -> u64 {
        self.clock.render_id()
    }

    /// Accumulated animation time in milliseconds.
    pub fn animation_time(&self) -> f64 {
        self.clock.animation_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::PropertyBag;
    use crate::data::{AnimationKey, LoopMode};
    use osteon_api_core::{Value, ValueKind};

    fn fade(scene: &mut Scene) -> AnimId {
        let mut anim = Animation::new("fade", "alpha", 10.0, ValueKind::Float, LoopMode::Cycle);
        anim.set_keys(vec![
            AnimationKey::new(0.0, Value::f(0.0)),
            AnimationKey::new(10.0, Value::f(1.0)),
        ])
        .unwrap();
        scene.load_animation(anim)
    }

    fn alpha(scene: &Scene, target: TargetId) -> f32 {
        match scene.target_as::<PropertyBag>(target).unwrap().get("alpha") {
            Some(Value::Float(x)) => *x,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn begin_animation_plays_attached_tracks_and_retires() {
        let mut scene = Scene::default();
        let anim = fade(&mut scene);
        let bag = scene.add_target(PropertyBag::new().with("alpha", Value::f(0.0)));
        scene.attach_animation(bag, anim).unwrap();
        let id = scene.begin_animation(bag, 0.0, 10.0, false, 1.0, true).unwrap();

        scene.animate(0.0);
        scene.animate(500.0);
        assert!((alpha(&scene, bag) - 0.5).abs() < 1e-5);

        let out = scene.animate(1500.0);
        assert!(out
            .events
            .iter()
            .any(|e| matches!(e, CoreEvent::AnimatableEnded { animatable } if *animatable == id)));
        assert!(scene.animatable(id).is_none());
        assert!(scene.animation(anim).unwrap().runtime_animations().is_empty());
        assert_eq!(scene.render_id(), 3);
    }

    #[test]
    fn stop_events_are_reported_with_the_next_tick() {
        let mut scene = Scene::default();
        let anim = fade(&mut scene);
        let bag = scene.add_target(PropertyBag::new().with("alpha", Value::f(0.0)));
        let id = scene.begin_direct_animation(bag, &[anim], 0.0, 10.0, true, 1.0).unwrap();
        scene.stop_animation(bag, Some("other"));
        assert!(scene.animatable(id).is_some());
        scene.stop_animation(bag, Some("fade"));
        assert!(scene.animatable(id).is_none());

        let out = scene.animate(0.0);
        assert_eq!(out.events, vec![CoreEvent::AnimatableEnded { animatable: id }]);
    }

    #[test]
    fn reversed_range_negates_speed() {
        let mut scene = Scene::default();
        let anim = fade(&mut scene);
        let bag = scene.add_target(PropertyBag::new().with("alpha", Value::f(0.0)));
        scene.attach_animation(bag, anim).unwrap();
        let id = scene.begin_animation(bag, 10.0, 0.0, false, 1.0, true).unwrap();
        assert_eq!(scene.animatable(id).unwrap().speed_ratio(), -1.0);
    }

    #[test]
    fn sync_with_moves_follower_last() {
        let mut scene = Scene::default();
        let anim = fade(&mut scene);
        let bag = scene.add_target(PropertyBag::new().with("alpha", Value::f(0.0)));
        let follower = scene.begin_direct_animation(bag, &[anim], 0.0, 10.0, true, 1.0).unwrap();
        let root = scene.begin_direct_animation(bag, &[anim], 0.0, 10.0, true, 1.0).unwrap();
        scene.sync_with(follower, Some(root)).unwrap();
        assert_eq!(scene.animatables()[1].id(), follower);
        assert_eq!(scene.animatables()[1].sync_root(), Some(root));

        let missing = scene.sync_with(follower, Some(AnimatableId(99))).unwrap_err();
        assert!(matches!(missing, AnimationError::AnimatableNotFound { .. }));
    }

    #[test]
    fn disabled_animations_only_count_frames() {
        let mut scene = Scene::new(Config {
            animations_enabled: false,
            ..Config::default()
        });
        let anim = fade(&mut scene);
        let bag = scene.add_target(PropertyBag::new().with("alpha", Value::f(0.0)));
        scene.begin_direct_animation(bag, &[anim], 0.0, 10.0, true, 1.0).unwrap();
        scene.animate(0.0);
        scene.animate(500.0);
        assert_eq!(alpha(&scene, bag), 0.0);
        assert_eq!(scene.render_id(), 2);
        assert_eq!(scene.animation_time(), 0.0);
    }
}
