use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};

use pcdet_core::{BatchLayout, ExecutionContext};
use pcdet_pointnet2::{ball_query, interpolate, sampling};

fn random_points(num_points: usize, seed: u64) -> Vec<f32> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..num_points * 3)
        .map(|_| rng.random_range(-10.0..10.0))
        .collect()
}

fn bench_furthest_point_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("furthest_point_sample");
    let ctx = ExecutionContext::default();

    for num_points in [4096, 16384] {
        let xyz = random_points(num_points, 0);
        let count = sampling::SampleCount::Fixed(num_points / 4);
        group.bench_with_input(BenchmarkId::new("fps", num_points), &xyz, |b, xyz| {
            b.iter(|| {
                black_box(sampling::furthest_point_sample(
                    &ctx,
                    xyz,
                    &BatchLayout::single(),
                    &count,
                ))
            })
        });
    }
    group.finish();
}

fn bench_ball_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("ball_query");
    let xyz = random_points(16384, 1);
    let new_xyz = random_points(4096, 2);
    let config = ball_query::BallQueryConfig::new(0.8, 32);

    for (name, ctx) in [
        ("serial", ExecutionContext::serial()),
        ("parallel", ExecutionContext::default()),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                black_box(ball_query::ball_query(
                    &ctx,
                    &xyz,
                    &BatchLayout::single(),
                    &new_xyz,
                    &BatchLayout::single(),
                    &config,
                ))
            })
        });
    }
    group.finish();
}

fn bench_three_interpolate(c: &mut Criterion) {
    let ctx = ExecutionContext::default();
    let known = random_points(1024, 3);
    let unknown = random_points(16384, 4);
    let mut rng = rand::rngs::StdRng::seed_from_u64(5);
    let features: Vec<f32> = (0..1024 * 64).map(|_| rng.random_range(-1.0..1.0)).collect();

    c.bench_function("three_interpolate", |b| {
        b.iter(|| {
            black_box(interpolate::three_interpolate(
                &ctx,
                &unknown,
                &BatchLayout::single(),
                &known,
                &BatchLayout::single(),
                &features,
                64,
            ))
        })
    });
}

criterion_group!(
    benches,
    bench_furthest_point_sample,
    bench_ball_query,
    bench_three_interpolate
);
criterion_main!(benches);
