//! Runs a small factorial batch twice; the second pass only loads results.
//!
//! `cargo run -p memo-batch --example quickstart -- <dir>`

use std::env;
use std::sync::Arc;

use indexmap::IndexMap;
use memo_batch::{Batch, BatchConfig, Computation, Filter, FnComputation};
use memo_core::{MemoError, Param, ParameterSet, Value};
use tracing::info;

fn damped() -> Arc<dyn Computation> {
    Arc::new(
        FnComputation::new("damped", |params: &ParameterSet| {
            let steps = params.get("steps").and_then(Param::as_i64).unwrap_or(100);
            let damping = params.get("damping").and_then(Param::as_f64).unwrap_or(0.1);
            let mut x = 1.0f64;
            let mut trace = Vec::new();
            for _ in 0..steps {
                x *= 1.0 - damping;
                trace.push(Value::Float(x));
            }
            Ok([
                ("final".to_string(), Value::Float(x)),
                ("trace".to_string(), Value::Seq(trace)),
            ]
            .into_iter()
            .collect())
        })
        .with_default("steps", 100)
        .with_default("damping", 0.1),
    )
}

fn main() -> Result<(), MemoError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let base = env::args().nth(1).unwrap_or_else(|| ".".to_string());
    let mut factors = IndexMap::new();
    factors.insert("steps".to_string(), vec![Param::from(10), Param::from(1000)]);
    factors.insert(
        "damping".to_string(),
        vec![Param::from(0.01), Param::from(0.1), Param::from(0.5)],
    );

    for pass in 1..=2 {
        let mut batch = Batch::new("quickstart", BatchConfig::at(&base))?;
        batch.add_factorial_runs(damped(), &factors)?;
        let summary = batch.run_pending()?;
        info!(pass, "{summary}");
    }

    let batch = {
        let mut batch = Batch::new("quickstart", BatchConfig::at(&base))?;
        batch.add_factorial_runs(damped(), &factors)?;
        batch
    };
    for run in batch.get_runs_with(&[Filter::parse("steps__ge", 1000)]) {
        let last = run.load().and_then(|mut result| result.remove("final"));
        info!(run = run.index(), damping = ?run.parameters().get("damping"), ?last, "long run");
    }
    Ok(())
}
