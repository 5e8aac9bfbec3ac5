use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lae::{ComputationNode, ExecutorConfig, LinearAlgebraEngine, LockedMatrix};

fn square(n: usize, seed: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| ((i * n + j + seed) % 17) as f64 - 8.0).collect())
        .collect()
}

fn bench_multiply(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_multiply");
    group.sample_size(20);

    for n in [32, 64] {
        for threads in [1, 4] {
            let (a, b) = (square(n, 1), square(n, 5));
            group.bench_with_input(
                BenchmarkId::new(format!("{n}x{n}"), threads),
                &threads,
                |bench, &threads| {
                    // An engine shuts its pool down after one run, so build a
                    // fresh one per iteration outside the timed section.
                    bench.iter_batched(
                        || {
                            let engine = LinearAlgebraEngine::with_config(
                                ExecutorConfig::new(threads).with_seed(42),
                            )
                            .expect("engine");
                            let tree = ComputationNode::multiply(vec![
                                ComputationNode::matrix(a.clone()),
                                ComputationNode::matrix(b.clone()),
                            ]);
                            (engine, tree)
                        },
                        |(engine, tree)| black_box(engine.run(tree).expect("run")),
                        BatchSize::PerIteration,
                    );
                },
            );
        }
    }
    group.finish();
}

fn bench_column_major_load(c: &mut Criterion) {
    let rows = square(128, 3);
    let matrix = LockedMatrix::new();
    c.bench_function("load_column_major_128", |bench| {
        bench.iter(|| matrix.load_column_major(black_box(&rows)).expect("load"))
    });
}

criterion_group!(benches, bench_multiply, bench_column_major_load);
criterion_main!(benches);
