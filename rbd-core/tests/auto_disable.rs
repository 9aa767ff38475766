//! Auto-disable behavior through full steps.

#![allow(clippy::unwrap_used)]

use nalgebra::{Point3, Vector3};
use rbd_core::{AutoDisableConfig, MassProperties, Pose, World, WorldConfig};

const DT: f64 = 0.01;

fn idle_config() -> WorldConfig {
    WorldConfig::with_timestep(DT).auto_disable(
        AutoDisableConfig::with_thresholds(0.05, 0.05)
            .idle_for(5, 0.0)
            .with_sample_count(2),
    )
}

/// Two resting bodies joined together; both are auto-disable candidates.
fn resting_pair(world: &mut World) -> (rbd_core::BodyHandle, rbd_core::BodyHandle) {
    let a = world.add_body(
        Pose::from_position(Point3::new(-0.5, 0.0, 0.0)),
        MassProperties::sphere(1.0, 0.25),
    );
    let b = world.add_body(
        Pose::from_position(Point3::new(0.5, 0.0, 0.0)),
        MassProperties::sphere(1.0, 0.25),
    );
    world.add_ball_joint(a, Some(b), Point3::origin()).unwrap();
    (a, b)
}

#[test]
fn idle_jointed_bodies_get_disabled() {
    let mut world = World::new(idle_config());
    let (a, b) = resting_pair(&mut world);

    // Window (2) + idle steps (5) at rest: disabled on the pass after.
    for _ in 0..10 {
        world.step().unwrap();
    }

    assert!(!world.body(a).unwrap().is_enabled());
    assert!(!world.body(b).unwrap().is_enabled());
    assert_eq!(world.body(a).unwrap().twist().linear.norm(), 0.0);

    // Disabled bodies sit out of stepping entirely.
    let summary = world.step().unwrap();
    assert_eq!(summary.islands, 0);
    assert_eq!(summary.bodies_integrated, 0);
}

#[test]
fn jointless_bodies_are_never_auto_disabled() {
    let mut world = World::new(idle_config());
    let loner = world.add_body(Pose::identity(), MassProperties::sphere(1.0, 0.25));

    for _ in 0..50 {
        world.step().unwrap();
    }

    // At rest the whole time, but exempt: no joints.
    assert!(world.body(loner).unwrap().is_enabled());
}

#[test]
fn force_injection_wakes_before_the_next_island_build() {
    let mut world = World::new(idle_config());
    let (a, b) = resting_pair(&mut world);

    for _ in 0..10 {
        world.step().unwrap();
    }
    assert!(!world.body(a).unwrap().is_enabled());

    // Inject a force between steps: the flag clears immediately, and the
    // next step integrates the body again.
    world
        .body_mut(a)
        .unwrap()
        .apply_force(Vector3::new(50.0, 0.0, 0.0));
    assert!(world.body(a).unwrap().is_enabled());

    let summary = world.step().unwrap();
    // Waking one end pulls the joined partner back in too.
    assert_eq!(summary.bodies_integrated, 2);
    assert!(world.body(b).unwrap().is_enabled());
    assert!(world.body(a).unwrap().twist().linear.x > 0.0);
}

#[test]
fn moving_bodies_do_not_disable() {
    let mut world = World::new(idle_config());
    let (a, _) = resting_pair(&mut world);
    world
        .body_mut(a)
        .unwrap()
        .set_linear_velocity(Vector3::new(1.0, 0.0, 0.0));

    for _ in 0..30 {
        world.step().unwrap();
    }

    assert!(world.body(a).unwrap().is_enabled());
}

#[test]
fn per_body_override_beats_world_config() {
    // World-level auto-disable off; one body opts in on its own. Both are
    // anchored to the world frame, not to each other, so neither can wake
    // the other through island traversal.
    let mut world = World::new(WorldConfig::with_timestep(DT));
    let a = world.add_body(
        Pose::from_position(Point3::new(-1.0, 0.0, 0.0)),
        MassProperties::sphere(1.0, 0.25),
    );
    let b = world.add_body(
        Pose::from_position(Point3::new(1.0, 0.0, 0.0)),
        MassProperties::sphere(1.0, 0.25),
    );
    world
        .add_ball_joint(a, None, Point3::new(-1.0, 0.0, 0.0))
        .unwrap();
    world
        .add_ball_joint(b, None, Point3::new(1.0, 0.0, 0.0))
        .unwrap();
    world.body_mut(a).unwrap().set_auto_disable_override(Some(
        AutoDisableConfig::with_thresholds(0.05, 0.05)
            .idle_for(3, 0.0)
            .with_sample_count(1),
    ));

    for _ in 0..10 {
        world.step().unwrap();
    }

    assert!(!world.body(a).unwrap().is_enabled());
    // The other body uses the (switched-off) world default and stays awake.
    assert!(world.body(b).unwrap().is_enabled());
}
