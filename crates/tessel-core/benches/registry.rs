use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessel_core::{HandleKind, Registry};

enum Bench {}
impl HandleKind for Bench {
    const NAME: &'static str = "bench";
}

fn churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_churn");

    for &live in &[64usize, 1024, 8192] {
        group.bench_with_input(BenchmarkId::new("first_fit", live), &live, |b, &live| {
            let mut registry: Registry<Bench, u64> = Registry::first_fit();
            let handles: Vec<_> = (0..live as u64).map(|i| registry.allocate(i)).collect();
            let mut cursor = 0;
            b.iter(|| {
                let victim = handles[cursor % handles.len()];
                registry.destroy(victim);
                black_box(registry.allocate(cursor as u64));
                cursor += 7;
            });
        });

        group.bench_with_input(BenchmarkId::new("lookup", live), &live, |b, &live| {
            let mut registry: Registry<Bench, u64> = Registry::first_fit();
            let handles: Vec<_> = (0..live as u64).map(|i| registry.allocate(i)).collect();
            b.iter(|| {
                let sum: u64 = handles
                    .iter()
                    .filter_map(|h| registry.get(*h))
                    .copied()
                    .sum();
                black_box(sum)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, churn);
criterion_main!(benches);
