use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{Mat4, Quat, Vec3};
use osteon_animation_core::{Animation, AnimationKey, LoopMode, Scene, Skeleton, Value, ValueKind};

/// A chain of `bones` bones, each carrying a looping matrix track.
fn chain_scene(bones: usize, weighted: bool) -> Scene {
    let mut skeleton = Skeleton::new("chain");
    let mut parent = None;
    for i in 0..bones {
        let local = Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0));
        let id = skeleton.add_bone(format!("b{i}"), parent, local).unwrap();
        parent = Some(id);
    }

    let mut scene = Scene::default();
    scene.config_mut().allow_matrices_interpolation = true;
    let rig = scene.add_target(skeleton);
    for i in 0..bones {
        let mut anim = Animation::new(
            format!("wave{i}"),
            format!("b{i}.matrix"),
            30.0,
            ValueKind::Matrix,
            LoopMode::Cycle,
        );
        let keys = (0..=4)
            .map(|k| {
                let angle = (k as f32 * 0.4 + i as f32 * 0.1).sin();
                let m = Mat4::from_rotation_translation(Quat::from_rotation_z(angle), Vec3::new(0.0, 1.0, 0.0));
                AnimationKey::new(k as f32 * 15.0, Value::Matrix(m))
            })
            .collect();
        anim.set_keys(keys).unwrap();
        let id = scene.load_animation(anim);
        scene.attach_animation(rig, id).unwrap();
    }

    if weighted {
        scene.begin_weighted_animation(rig, 0.0, 60.0, 0.6, true, 1.0).unwrap();
        scene.begin_weighted_animation(rig, 0.0, 60.0, 0.4, true, 1.5).unwrap();
    } else {
        scene.begin_animation(rig, 0.0, 60.0, true, 1.0, true).unwrap();
    }
    scene
}

fn bench_scene_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_tick");
    for bones in [8usize, 64] {
        for weighted in [false, true] {
            let label = if weighted { "weighted" } else { "direct" };
            group.bench_with_input(BenchmarkId::new(label, bones), &bones, |b, &bones| {
                let mut scene = chain_scene(bones, weighted);
                let mut now = 0.0;
                b.iter(|| {
                    now += 16.0;
                    black_box(scene.animate(now).changes.len());
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_scene_tick);
criterion_main!(benches);
