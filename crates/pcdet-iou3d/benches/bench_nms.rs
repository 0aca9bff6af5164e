use std::f32::consts::PI;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};

use pcdet_core::{ExecutionContext, ExecutionStrategy};
use pcdet_iou3d::{iou, nms};

fn random_boxes(n: usize) -> (Vec<f32>, Vec<f32>) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let boxes = (0..n)
        .flat_map(|_| {
            [
                rng.random_range(-40.0..40.0),
                rng.random_range(-40.0..40.0),
                rng.random_range(-2.0..0.0),
                rng.random_range(1.5..4.5),
                rng.random_range(1.5..2.0),
                rng.random_range(1.4..1.8),
                rng.random_range(-PI..PI),
            ]
        })
        .collect();
    let scores = (0..n).map(|_| rng.random_range(0.0..1.0)).collect();
    (boxes, scores)
}

fn bench_nms(c: &mut Criterion) {
    let mut group = c.benchmark_group("nms");

    for n in [256, 1024, 4096].iter() {
        group.throughput(criterion::Throughput::Elements(*n as u64));
        let (boxes, scores) = random_boxes(*n);
        let config = nms::NmsConfig::new(0.7);

        for strategy in [ExecutionStrategy::Serial, ExecutionStrategy::Parallel] {
            let ctx = ExecutionContext::new(strategy).expect("context");
            group.bench_with_input(
                BenchmarkId::new(format!("nms_{strategy:?}"), n),
                &(&boxes, &scores),
                |b, (bx, sc)| b.iter(|| nms::nms(black_box(&ctx), bx, sc, &config)),
            );
        }
    }
    group.finish();
}

fn bench_iou_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("boxes_iou3d");

    for n in [128, 512].iter() {
        group.throughput(criterion::Throughput::Elements((n * n) as u64));
        let (boxes, _) = random_boxes(*n);
        let ctx = ExecutionContext::default();

        group.bench_with_input(BenchmarkId::new("iou3d_matrix", n), &boxes, |b, bx| {
            b.iter(|| iou::boxes_iou3d(black_box(&ctx), bx, bx))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_nms, bench_iou_matrix);
criterion_main!(benches);
