//! Late animation binding: weighted runtime animations register their value
//! for a (target, property) pair during the frame, and one pass at the end of
//! the frame folds every pair into a single write.
//!
//! Policy per pair, with `total` the summed weight:
//! - `total < 1`: the baseline (rest pose or pre-animation value) fills the
//!   remaining `1 - total`
//! - `total >= 1`: contributions are normalized by `total`
//!
//! Matrices are blended through their decomposed scale/rotation/translation
//! when decomposition is enabled. Quaternions use slerp; with more than two
//! contributions the blend is a cumulative pairwise slerp, which depends on
//! registration order.

use glam::{Quat, Vec3};
use hashbrown::HashMap;
use log::warn;
use osteon_api_core::{blend, MatrixBlend, Value, ValueError};

use crate::binding::{PropertyHandle, TargetStore};
use crate::config::Config;
use crate::error::AnimationError;
use crate::ids::{RuntimeId, TargetId};
use crate::outputs::{Change, CoreEvent, Outputs};
use crate::scratch::Scratch;

/// Registration address: a property on a target.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct LateBindingKey {
    pub target: TargetId,
    pub property: PropertyHandle,
}

/// One runtime animation's value for this frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Contribution {
    pub runtime: RuntimeId,
    pub weight: f32,
    pub value: Value,
}

/// Everything registered for one (target, property) pair this frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LateBindingHolder {
    pub total_weight: f32,
    pub animations: Vec<Contribution>,
    pub original_value: Value,
}

#[derive(Debug, Default)]
pub struct LateBindingResolver {
    /// Targets in first-registration order, without duplicates.
    targets: Vec<TargetId>,
    /// Holders per target, in first-registration order.
    holders: HashMap<TargetId, Vec<(PropertyHandle, LateBindingHolder)>>,
}

impl LateBindingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(holders: usize) -> Self {
        Self {
            targets: Vec::with_capacity(holders),
            holders: HashMap::with_capacity(holders),
        }
    }

    /// Record a contribution. The holder for `key` is created on first use
    /// with `original_value` as its baseline.
    pub fn register(&mut self, key: LateBindingKey, contribution: Contribution, original_value: Value) {
        if !self.targets.contains(&key.target) {
            self.targets.push(key.target);
        }
        let per_target = self.holders.entry(key.target).or_default();
        let holder = match per_target.iter().position(|(p, _)| *p == key.property) {
            Some(idx) => &mut per_target[idx].1,
            None => {
                per_target.push((
                    key.property,
                    LateBindingHolder {
                        total_weight: 0.0,
                        animations: Vec::new(),
                        original_value,
                    },
                ));
                // Just pushed.
                let last = per_target.len() - 1;
                &mut per_target[last].1
            }
        };
        holder.total_weight += contribution.weight;
        holder.animations.push(contribution);
    }

    pub fn holder(&self, key: LateBindingKey) -> Option<&LateBindingHolder> {
        self.holders
            .get(&key.target)?
            .iter()
            .find(|(p, _)| *p == key.property)
            .map(|(_, h)| h)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Targets with pending registrations, in registration order.
    pub fn pending_targets(&self) -> &[TargetId] {
        &self.targets
    }

    pub fn clear(&mut self) {
        self.targets.clear();
        self.holders.clear();
    }

    /// Drop every contribution registered by `runtimes` this frame. Holders
    /// and targets left without contributions are removed.
    pub fn discard(&mut self, runtimes: &[RuntimeId]) {
        if runtimes.is_empty() {
            return;
        }
        for holders in self.holders.values_mut() {
            for (_, holder) in holders.iter_mut() {
                holder.animations.retain(|c| !runtimes.contains(&c.runtime));
                holder.total_weight = holder.animations.iter().map(|c| c.weight).sum();
            }
            holders.retain(|(_, h)| !h.animations.is_empty());
        }
        self.holders.retain(|_, holders| !holders.is_empty());
        let holders = &self.holders;
        self.targets.retain(|t| holders.contains_key(t));
    }

    /// Resolve every holder, write the results onto their targets and clear
    /// all registrations. Failures on one property are reported and do not
    /// stop the others.
    pub fn process(
        &mut self,
        targets: &mut TargetStore,
        cfg: &Config,
        scratch: &mut Scratch,
        outputs: &mut Outputs,
    ) {
        let matrix = cfg.matrix_blend();
        for target_id in self.targets.drain(..) {
            let Some(holders) = self.holders.remove(&target_id) else {
                continue;
            };
            let Some(target) = targets.get_mut(target_id) else {
                warn!("late binding: target {target_id:?} disappeared before resolution");
                continue;
            };
            for (property, holder) in holders {
                let result = resolve_holder(&holder, matrix, scratch)
                    .map_err(AnimationError::from)
                    .and_then(|value| target.set_value(property, &value).map(|_| value));
                match result {
                    Ok(value) => outputs.push_change(Change {
                        target: target_id,
                        property: target.property_name(property),
                        value,
                    }),
                    Err(err) => {
                        warn!(
                            "late binding: could not write {} on {target_id:?}: {err}",
                            target.property_name(property)
                        );
                        outputs.push_event(CoreEvent::Error {
                            animatable: None,
                            message: err.to_string(),
                        });
                    }
                }
            }
        }
        self.holders.clear();
    }
}

/// Fold one holder into its final value.
pub fn resolve_holder(
    holder: &LateBindingHolder,
    matrix: MatrixBlend,
    scratch: &mut Scratch,
) -> Result<Value, ValueError> {
    let Some(first) = holder.animations.first() else {
        return Ok(holder.original_value);
    };
    match (&holder.original_value, matrix) {
        (Value::Matrix(_), MatrixBlend::Decompose) => resolve_matrices(holder, first),
        (Value::Quat(_), _) => resolve_quaternions(holder, first, scratch),
        _ => resolve_linear(holder, first),
    }
}

fn matrix_of(value: &Value) -> Result<glam::Mat4, ValueError> {
    value.as_matrix().ok_or(ValueError::KindMismatch {
        expected: osteon_api_core::ValueKind::Matrix,
        actual: value.kind(),
    })
}

fn quat_of(value: &Value) -> Result<Quat, ValueError> {
    value.as_quat().ok_or(ValueError::KindMismatch {
        expected: osteon_api_core::ValueKind::Quat,
        actual: value.kind(),
    })
}

fn resolve_matrices(holder: &LateBindingHolder, first: &Contribution) -> Result<Value, ValueError> {
    let mut normalizer = 1.0;
    let mut start_index = 0;
    let (base, scale) = if holder.total_weight < 1.0 {
        (matrix_of(&holder.original_value)?, 1.0 - holder.total_weight)
    } else {
        start_index = 1;
        normalizer = holder.total_weight;
        let scale = first.weight / normalizer;
        if scale == 1.0 {
            return Ok(first.value);
        }
        (matrix_of(&first.value)?, scale)
    };

    let (s, r, t) = blend::decompose(base);
    let mut final_scaling: Vec3 = s * scale;
    let mut final_rotation: Quat = r * scale;
    let mut final_position: Vec3 = t * scale;

    for contribution in &holder.animations[start_index..] {
        let w = contribution.weight / normalizer;
        let (s, r, t) = blend::decompose(matrix_of(&contribution.value)?);
        final_scaling += s * w;
        final_rotation = final_rotation + r * w;
        final_position += t * w;
    }

    Ok(Value::Matrix(blend::compose(
        final_scaling,
        final_rotation,
        final_position,
    )))
}

fn resolve_quaternions(
    holder: &LateBindingHolder,
    first: &Contribution,
    scratch: &mut Scratch,
) -> Result<Value, ValueError> {
    let original = quat_of(&holder.original_value)?;

    if holder.animations.len() == 1 {
        let q = blend::slerp(original, quat_of(&first.value)?, holder.total_weight.min(1.0));
        return Ok(Value::Quat(q));
    }

    scratch.begin_quaternion_blend();
    let mut normalizer = 1.0;
    if holder.total_weight < 1.0 {
        scratch.push_quaternion(original, 1.0 - holder.total_weight);
    } else {
        if holder.animations.len() == 2 {
            let second = &holder.animations[1];
            let q = blend::slerp(
                quat_of(&first.value)?,
                quat_of(&second.value)?,
                second.weight / holder.total_weight,
            );
            return Ok(Value::Quat(q));
        }
        normalizer = holder.total_weight;
    }
    for contribution in &holder.animations {
        scratch.push_quaternion(quat_of(&contribution.value)?, contribution.weight / normalizer);
    }

    // Cumulative pairwise slerp: the first two seed the accumulator, every
    // following rotation is folded in by its share of the running weight.
    let qs = &scratch.quaternions;
    let ws = &scratch.weights;
    let mut cumulative_amount = ws[0] + ws[1];
    let mut cumulative = blend::slerp(qs[0], qs[1], ws[1] / cumulative_amount);
    for (q, w) in qs.iter().zip(ws.iter()).skip(2) {
        cumulative_amount += w;
        cumulative = blend::slerp(cumulative, *q, w / cumulative_amount);
    }
    Ok(Value::Quat(cumulative))
}

fn resolve_linear(holder: &LateBindingHolder, first: &Contribution) -> Result<Value, ValueError> {
    let mut normalizer = 1.0;
    let mut start_index = 0;
    let mut final_value = if holder.total_weight < 1.0 {
        blend::scale(&holder.original_value, 1.0 - holder.total_weight)
    } else {
        normalizer = holder.total_weight;
        start_index = 1;
        let scale = first.weight / normalizer;
        if scale != 1.0 {
            blend::scale(&first.value, scale)
        } else {
            first.value
        }
    };

    for contribution in &holder.animations[start_index..] {
        blend::scale_and_add(
            &mut final_value,
            &contribution.value,
            contribution.weight / normalizer,
        )?;
    }
    Ok(final_value)
}
