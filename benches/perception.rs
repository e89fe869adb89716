//! Criterion benchmarks for perception and the turn pipeline.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use gridmind::prelude::*;

/// Scattered blocks of several colours, shifted by `offset` rows.
fn scene(size: usize, offset: usize) -> Grid {
    let mut g = Grid::new(size, size);
    let mut color = 1u8;
    for top in (0..size.saturating_sub(4)).step_by(8) {
        for left in (0..size.saturating_sub(4)).step_by(8) {
            for r in 0..3 {
                for c in 0..3 {
                    g.set(top + r + offset, left + c, color);
                }
            }
            color = color % 15 + 1;
        }
    }
    g
}

fn bench_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect");
    let detector = ObjectDetector::new();

    for size in [16usize, 32, 64].iter() {
        let grid = scene(*size, 0);
        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &grid, |b, grid| {
            b.iter(|| black_box(detector.detect(grid).len()))
        });
    }

    group.finish();
}

fn bench_analyze(c: &mut Criterion) {
    let cfg = EngineConfig::default();
    let classifier = ChangeClassifier::new(&cfg.perception);
    let before = scene(64, 0);
    let after = scene(64, 1);
    let input = ActionInput::new(Action::Down);

    c.bench_function("analyze_64x64", |b| {
        b.iter(|| {
            let a = classifier.analyze(black_box(&before), black_box(&after), Some(&input));
            black_box(a.total_changes)
        })
    });
}

fn bench_step(c: &mut Criterion) {
    let mut cfg = EngineConfig::default();
    cfg.interpretation.enabled = false;
    let frames = [scene(64, 0), scene(64, 1)];

    c.bench_function("orchestrator_step_64x64", |b| {
        let mut engine = Orchestrator::new(cfg.clone());
        engine.step(&Frame::new(frames[0].clone(), 0));
        let mut i = 0usize;
        b.iter(|| {
            i += 1;
            let frame = Frame::new(frames[i % 2].clone(), 0).with_action(Action::Down, None);
            black_box(engine.step(&frame).turn)
        });
    });
}

criterion_group!(benches, bench_detect, bench_analyze, bench_step);
criterion_main!(benches);
