use std::f32::consts::PI;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec2;
use rand::{Rng, SeedableRng};

use pcdet_core::geometry::{rotated_rect_intersection, Rect2d};

fn random_rects(n: usize) -> Vec<Rect2d> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    (0..n)
        .map(|_| {
            Rect2d::new(
                Vec2::new(rng.random_range(-5.0..5.0), rng.random_range(-5.0..5.0)),
                Vec2::new(rng.random_range(0.5..2.5), rng.random_range(0.5..2.5)),
                rng.random_range(-PI..PI),
            )
        })
        .collect()
}

fn bench_intersection(c: &mut Criterion) {
    let mut group = c.benchmark_group("rotated_rect_intersection");

    for n in [64, 256].iter() {
        group.throughput(criterion::Throughput::Elements((n * n) as u64));
        let rects = random_rects(*n);

        group.bench_with_input(BenchmarkId::new("all_pairs", n), &rects, |b, r| {
            b.iter(|| {
                let mut total = 0.0f32;
                for a in r.iter() {
                    for other in r.iter() {
                        total += rotated_rect_intersection(black_box(a), black_box(other));
                    }
                }
                total
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_intersection);
criterion_main!(benches);
