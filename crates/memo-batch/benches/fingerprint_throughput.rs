use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use memo_batch::{fingerprint, Batch, BatchConfig, Computation, FnComputation, MemoryStore};
use memo_core::{Param, ParameterSet, Value};

fn parameters() -> ParameterSet {
    let mut set = ParameterSet::new();
    set.insert("A".into(), Param::from(1000));
    set.insert("B".into(), Param::seq((0..64).map(|v| v as f64 * 0.5)));
    set.insert("C".into(), Param::callable("mean", ()));
    set.insert("label".into(), Param::from("warm start"));
    set
}

fn bench_fingerprint(c: &mut Criterion) {
    let params = parameters();
    c.bench_function("fingerprint_throughput", |b| {
        b.iter(|| {
            let _ = fingerprint(&params).expect("fingerprint");
        });
    });
}

fn bench_rerun(c: &mut Criterion) {
    let computation: Arc<dyn Computation> = Arc::new(
        FnComputation::new("noop", |params: &ParameterSet| {
            let a = params.get("A").and_then(Param::as_i64).unwrap_or_default();
            Ok([("a".to_string(), Value::Int(a))].into_iter().collect())
        })
        .with_default("A", 0),
    );
    let store = Arc::new(MemoryStore::new());
    let config = BatchConfig {
        verbose: false,
        ..BatchConfig::default()
    };
    c.bench_function("memoized_rerun_256", |b| {
        b.iter(|| {
            let mut batch =
                Batch::with_store("bench", config.clone(), store.clone()).expect("batch");
            for a in 0..256 {
                let overrides = [("A".to_string(), Param::from(a))].into_iter().collect();
                batch.add_run(computation.clone(), overrides).expect("add");
            }
            batch.run_pending().expect("run");
        });
    });
}

criterion_group!(benches, bench_fingerprint, bench_rerun);
criterion_main!(benches);
