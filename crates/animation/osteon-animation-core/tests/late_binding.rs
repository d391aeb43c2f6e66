use glam::{Mat4, Quat, Vec3};
use osteon_animation_core::{
    resolve_holder, AnimId, Animation, AnimationError, AnimationKey, Config, Contribution, CoreEvent,
    LateBindingHolder, LoopMode, MatrixBlend, PropertyBag, RuntimeId, Scene, Scratch, TargetId, TransformNode,
    Value, ValueKind,
};
use osteon_api_core::blend;

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

fn holder(original: Value, contributions: &[(f32, Value)]) -> LateBindingHolder {
    LateBindingHolder {
        total_weight: contributions.iter().map(|(w, _)| w).sum(),
        animations: contributions
            .iter()
            .enumerate()
            .map(|(i, (weight, value))| Contribution {
                runtime: RuntimeId(i as u32),
                weight: *weight,
                value: *value,
            })
            .collect(),
        original_value: original,
    }
}

fn resolve(h: &LateBindingHolder) -> Value {
    let mut scratch = Scratch::new(&Config::default());
    resolve_holder(h, MatrixBlend::Decompose, &mut scratch).unwrap()
}

/// Flat two-key track holding `value` on `property`.
fn hold(scene: &mut Scene, name: &str, property: &str, value: Value) -> AnimId {
    let mut anim = Animation::new(name, property, 10.0, value.kind(), LoopMode::Cycle);
    anim.set_keys(vec![AnimationKey::new(0.0, value), AnimationKey::new(10.0, value)])
        .unwrap();
    scene.load_animation(anim)
}

fn quarter_turn_y() -> Quat {
    Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)
}

#[test]
/// it should mix two weighted floats by their weights
fn weighted_floats_mix() {
    let h = holder(Value::f(0.0), &[(0.3, Value::f(10.0)), (0.7, Value::f(20.0))]);
    approx(resolve(&h).as_float().unwrap(), 17.0, 1e-4);
}

#[test]
/// it should give the same linear result whatever the registration order
fn linear_result_ignores_order() {
    let a = (0.2, Value::vec3(1.0, 0.0, 0.0));
    let b = (0.5, Value::vec3(0.0, 4.0, 0.0));
    let c = (0.6, Value::vec3(0.0, 0.0, -2.0));
    let base = Value::vec3(9.0, 9.0, 9.0);
    let abc = resolve(&holder(base, &[a, b, c]));
    let cab = resolve(&holder(base, &[c, a, b]));
    let bca = resolve(&holder(base, &[b, c, a]));
    assert!(abc.abs_diff_eq(&cab, 1e-5), "{abc:?} vs {cab:?}");
    assert!(abc.abs_diff_eq(&bca, 1e-5), "{abc:?} vs {bca:?}");
}

#[test]
/// it should fill the missing weight from the baseline
fn under_weight_pulls_toward_baseline() {
    let h = holder(Value::f(0.0), &[(0.5, Value::f(10.0))]);
    approx(resolve(&h).as_float().unwrap(), 5.0, 1e-6);

    let h = holder(Value::f(4.0), &[(0.25, Value::f(8.0)), (0.25, Value::f(0.0))]);
    // 4 * 0.5 + 8 * 0.25 + 0 * 0.25
    approx(resolve(&h).as_float().unwrap(), 4.0, 1e-6);
}

#[test]
/// it should normalize weights that add up past one
fn over_weight_is_normalized() {
    let h = holder(Value::f(100.0), &[(1.0, Value::f(10.0)), (3.0, Value::f(20.0))]);
    approx(resolve(&h).as_float().unwrap(), 17.5, 1e-5);
}

#[test]
/// it should slerp two rotations by the second weight share
fn two_rotations_slerp() {
    let q1 = Quat::IDENTITY;
    let q2 = quarter_turn_y();
    let h = holder(Value::Quat(Quat::IDENTITY), &[(0.25, Value::Quat(q1)), (0.75, Value::Quat(q2))]);
    let q = resolve(&h).as_quat().unwrap();
    let expected = blend::slerp(q1, q2, 0.75);
    assert!(q.abs_diff_eq(expected, 1e-5), "{q:?} vs {expected:?}");
}

#[test]
/// it should keep a rotation when every contribution agrees
fn identical_rotations_stay_put() {
    let q = Quat::from_rotation_x(0.4);
    let h = holder(
        Value::Quat(Quat::IDENTITY),
        &[(0.5, Value::Quat(q)), (0.5, Value::Quat(q)), (1.0, Value::Quat(q))],
    );
    let out = resolve(&h).as_quat().unwrap();
    assert!(out.abs_diff_eq(q, 1e-4) || out.abs_diff_eq(-q, 1e-4), "{out:?}");
}

#[test]
/// it should fold three or more rotations pairwise in registration order
fn many_rotations_fold_in_order() {
    let q0 = Quat::from_rotation_x(1.2);
    let q1 = Quat::from_rotation_y(1.2);
    let q2 = Quat::from_rotation_z(-0.9);
    let (w0, w1, w2) = (0.5, 0.5, 1.0);
    let base = Value::Quat(Quat::IDENTITY);

    let h = holder(base, &[(w0, Value::Quat(q0)), (w1, Value::Quat(q1)), (w2, Value::Quat(q2))]);
    let out = resolve(&h).as_quat().unwrap();
    let expected = blend::slerp(blend::slerp(q0, q1, w1 / (w0 + w1)), q2, w2 / (w0 + w1 + w2));
    assert!(out.abs_diff_eq(expected, 1e-5), "{out:?} vs {expected:?}");

    let h = holder(base, &[(w2, Value::Quat(q2)), (w0, Value::Quat(q0)), (w1, Value::Quat(q1))]);
    let reordered = resolve(&h).as_quat().unwrap();
    assert!(
        !reordered.abs_diff_eq(out, 1e-4) && !reordered.abs_diff_eq(-out, 1e-4),
        "{reordered:?} vs {out:?}"
    );
}

#[test]
/// it should slerp a lone rotation from the baseline by its weight
fn lone_rotation_from_baseline() {
    let q2 = quarter_turn_y();
    let h = holder(Value::Quat(Quat::IDENTITY), &[(0.5, Value::Quat(q2))]);
    let out = resolve(&h).as_quat().unwrap();
    let (axis, angle) = out.to_axis_angle();
    approx(angle, std::f32::consts::FRAC_PI_4, 1e-4);
    approx(axis.y.abs(), 1.0, 1e-4);
}

#[test]
/// it should average matrix translations through decomposition
fn matrices_blend_by_parts() {
    let a = Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0));
    let b = Mat4::from_scale_rotation_translation(Vec3::splat(3.0), Quat::IDENTITY, Vec3::new(0.0, 4.0, 0.0));
    let h = holder(Value::Matrix(Mat4::IDENTITY), &[(0.5, Value::Matrix(a)), (0.5, Value::Matrix(b))]);
    let m = resolve(&h).as_matrix().unwrap();
    let (scale, rotation, translation) = m.to_scale_rotation_translation();
    assert!(translation.abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-5), "{translation:?}");
    assert!(scale.abs_diff_eq(Vec3::splat(2.0), 1e-5), "{scale:?}");
    assert!(rotation.abs_diff_eq(Quat::IDENTITY, 1e-5));
}

#[test]
/// it should blend matrices to the same result whatever the registration order
fn matrix_blend_ignores_order() {
    let a = Mat4::from_scale_rotation_translation(
        Vec3::new(1.0, 2.0, 1.0),
        Quat::from_rotation_x(0.4),
        Vec3::new(1.0, 0.0, 0.0),
    );
    let b = Mat4::from_scale_rotation_translation(Vec3::splat(2.0), Quat::from_rotation_y(0.9), Vec3::new(0.0, 3.0, 0.0));
    let c = Mat4::from_scale_rotation_translation(
        Vec3::new(0.5, 1.0, 1.5),
        Quat::from_rotation_z(-0.6),
        Vec3::new(0.0, 0.0, -2.0),
    );
    let (a, b, c) = (Value::Matrix(a), Value::Matrix(b), Value::Matrix(c));

    // Over one: normalized by the total.
    let base = Value::Matrix(Mat4::IDENTITY);
    let abc = resolve(&holder(base, &[(1.0, a), (0.5, b), (0.5, c)])).as_matrix().unwrap();
    let cab = resolve(&holder(base, &[(0.5, c), (1.0, a), (0.5, b)])).as_matrix().unwrap();
    assert!(abc.abs_diff_eq(cab, 1e-5), "{abc:?} vs {cab:?}");
    let (scale, _, translation) = abc.to_scale_rotation_translation();
    assert!(translation.abs_diff_eq(Vec3::new(0.5, 0.75, -0.5), 1e-5), "{translation:?}");
    assert!(scale.abs_diff_eq(Vec3::new(1.125, 1.75, 1.375), 1e-4), "{scale:?}");

    // Under one: the baseline fills the rest.
    let base = Value::Matrix(Mat4::from_translation(Vec3::new(4.0, 0.0, 0.0)));
    let abc = resolve(&holder(base, &[(0.2, a), (0.1, b), (0.3, c)])).as_matrix().unwrap();
    let bca = resolve(&holder(base, &[(0.1, b), (0.3, c), (0.2, a)])).as_matrix().unwrap();
    assert!(abc.abs_diff_eq(bca, 1e-5), "{abc:?} vs {bca:?}");
    let translation = abc.w_axis.truncate();
    assert!(translation.abs_diff_eq(Vec3::new(1.8, 0.3, -0.6), 1e-5), "{translation:?}");
}

#[test]
/// it should commit the weighted mix of two animatables through the scene tick
fn scene_commits_weighted_mix() {
    let mut scene = Scene::default();
    let low = hold(&mut scene, "low", "alpha", Value::f(10.0));
    let high = hold(&mut scene, "high", "alpha", Value::f(20.0));
    let bag = scene.add_target(PropertyBag::new().with("alpha", Value::f(0.0)));
    let a = scene.begin_direct_animation(bag, &[low], 0.0, 10.0, true, 1.0).unwrap();
    let b = scene.begin_direct_animation(bag, &[high], 0.0, 10.0, true, 1.0).unwrap();
    scene.set_weight(a, Some(0.3)).unwrap();
    scene.set_weight(b, Some(0.7)).unwrap();

    let out = scene.animate(0.0);
    assert_eq!(out.changes.len(), 1);
    assert_eq!(out.changes[0].target, bag);
    assert_eq!(out.changes[0].property, "alpha");
    approx(out.changes[0].value.as_float().unwrap(), 17.0, 1e-4);
    let alpha = scene.target_as::<PropertyBag>(bag).unwrap().get("alpha").copied();
    approx(alpha.and_then(|v| v.as_float()).unwrap(), 17.0, 1e-4);

    // A second tick resolves from fresh registrations, not the last result.
    let out = scene.animate(250.0);
    approx(out.changes[0].value.as_float().unwrap(), 17.0, 1e-4);
}

#[test]
/// it should leave a zero-weight animatable alive without touching the target
fn zero_weight_writes_nothing() {
    let mut scene = Scene::default();
    let track = hold(&mut scene, "hold", "alpha", Value::f(5.0));
    let bag = scene.add_target(PropertyBag::new().with("alpha", Value::f(1.0)));
    let id = scene.begin_direct_animation(bag, &[track], 0.0, 10.0, true, 1.0).unwrap();
    scene.set_weight(id, Some(0.0)).unwrap();

    let out = scene.animate(0.0);
    assert!(out.changes.is_empty());
    assert!(!out.events.iter().any(|e| matches!(e, CoreEvent::AnimatableEnded { .. })));
    let alpha = scene.target_as::<PropertyBag>(bag).unwrap().get("alpha").copied();
    assert_eq!(alpha, Some(Value::f(1.0)));
    assert!(scene.animatable(id).is_some());
}

#[test]
/// it should blend node rotations of two animatables with slerp
fn scene_blends_node_rotations() {
    let mut scene = Scene::default();
    let q2 = quarter_turn_y();
    let rest = hold(&mut scene, "rest", "rotation_quaternion", Value::Quat(Quat::IDENTITY));
    let turned = hold(&mut scene, "turned", "rotation_quaternion", Value::Quat(q2));
    let node = scene.add_target(TransformNode::new("head"));
    let a = scene.begin_direct_animation(node, &[rest], 0.0, 10.0, true, 1.0).unwrap();
    let b = scene.begin_direct_animation(node, &[turned], 0.0, 10.0, true, 1.0).unwrap();
    scene.set_weight(a, Some(0.25)).unwrap();
    scene.set_weight(b, Some(0.75)).unwrap();

    scene.animate(0.0);
    let q = scene.target_as::<TransformNode>(node).unwrap().rotation_quaternion();
    let expected = blend::slerp(Quat::IDENTITY, q2, 0.75);
    assert!(q.abs_diff_eq(expected, 1e-5), "{q:?} vs {expected:?}");
}

#[test]
/// it should leave out every value of an animatable that failed mid frame
fn failed_animatable_writes_nothing() {
    let mut scene = Scene::default();
    let steady = hold(&mut scene, "steady", "alpha", Value::f(10.0));
    let loud = hold(&mut scene, "loud", "alpha", Value::f(20.0));
    // A float track on a vector property fails as soon as it blends in.
    let mut broken = Animation::new("broken", "offset", 10.0, ValueKind::Float, LoopMode::Cycle);
    broken
        .set_keys(vec![AnimationKey::new(0.0, Value::f(1.0)), AnimationKey::new(10.0, Value::f(1.0))])
        .unwrap();
    broken.enable_blending = true;
    let broken = scene.load_animation(broken);
    let bag = scene.add_target(
        PropertyBag::new()
            .with("alpha", Value::f(0.0))
            .with("offset", Value::vec3(0.0, 0.0, 0.0)),
    );
    let a = scene.begin_direct_animation(bag, &[steady], 0.0, 10.0, true, 1.0).unwrap();
    let b = scene.begin_direct_animation(bag, &[loud, broken], 0.0, 10.0, true, 1.0).unwrap();
    scene.set_weight(a, Some(0.5)).unwrap();
    scene.set_weight(b, Some(0.5)).unwrap();

    let out = scene.animate(0.0);
    assert!(out
        .events
        .iter()
        .any(|e| matches!(e, CoreEvent::Error { animatable: Some(id), .. } if *id == b)));
    // Only the healthy half remains, filled from the baseline.
    assert_eq!(out.changes.len(), 1);
    approx(out.changes[0].value.as_float().unwrap(), 5.0, 1e-5);
    assert!(scene.animatable(b).is_none());
    assert!(scene.animatable(a).is_some());
}

#[test]
/// it should refuse to start on a target the scene does not hold
fn unknown_target_is_rejected() {
    let mut scene = Scene::default();
    let track = hold(&mut scene, "hold", "alpha", Value::f(5.0));
    let err = scene
        .begin_direct_animation(TargetId(42), &[track], 0.0, 10.0, true, 1.0)
        .unwrap_err();
    assert!(matches!(err, AnimationError::TargetNotFound { id: TargetId(42) }));
    assert!(scene.animatables().is_empty());
    assert!(scene.animation(track).unwrap().runtime_animations().is_empty());
}
