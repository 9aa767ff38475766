//! Benchmarks for world stepping.
//!
//! Run with: cargo bench -p rbd-core

#![allow(missing_docs, clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nalgebra::{Point3, Vector3};
use rbd_core::World;
use rbd_types::{MassProperties, Pose, WorldConfig};

/// A hanging chain: `n` spheres ball-jointed end to end, the first link
/// anchored to the world frame, under gravity. One island, 3(n+1) rows.
fn hanging_chain(n: usize) -> World {
    let mut world = World::new(
        WorldConfig::with_timestep(1.0 / 240.0).gravity(Vector3::new(0.0, -9.81, 0.0)),
    );

    let mut prev = None;
    for i in 0..n {
        #[allow(clippy::cast_precision_loss)]
        let x = i as f64 * 0.5;
        let handle = world.add_body(
            Pose::from_position(Point3::new(x, 0.0, 0.0)),
            MassProperties::sphere(1.0, 0.2),
        );
        match prev {
            None => {
                world
                    .add_ball_joint(handle, None, Point3::new(-0.25, 0.0, 0.0))
                    .unwrap();
            }
            Some(p) => {
                world
                    .add_ball_joint(p, Some(handle), Point3::new(x - 0.25, 0.0, 0.0))
                    .unwrap();
            }
        }
        prev = Some(handle);
    }
    world
}

/// Many independent falling bodies: n trivial islands, no constraints.
fn body_field(n: usize) -> World {
    let mut world = World::new(
        WorldConfig::with_timestep(1.0 / 240.0).gravity(Vector3::new(0.0, -9.81, 0.0)),
    );
    for i in 0..n {
        #[allow(clippy::cast_precision_loss)]
        let x = i as f64 * 2.0;
        world.add_body(
            Pose::from_position(Point3::new(x, 10.0, 0.0)),
            MassProperties::box_shape(1.0, Vector3::new(0.3, 0.3, 0.3)),
        );
    }
    world
}

fn bench_chain_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_step");
    for &links in &[4usize, 16, 64] {
        group.throughput(Throughput::Elements(links as u64));
        group.bench_with_input(BenchmarkId::from_parameter(links), &links, |b, &links| {
            let mut world = hanging_chain(links);
            b.iter(|| {
                black_box(world.step().unwrap());
            });
        });
    }
    group.finish();
}

fn bench_island_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("trivial_islands_step");
    for &bodies in &[64usize, 512] {
        group.throughput(Throughput::Elements(bodies as u64));
        group.bench_with_input(BenchmarkId::from_parameter(bodies), &bodies, |b, &bodies| {
            let mut world = body_field(bodies);
            b.iter(|| {
                black_box(world.step().unwrap());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_chain_step, bench_island_partition);
criterion_main!(benches);
