//! Ordered collections of memoized runs and their sequential driver.
//!
//! Runs execute one at a time in ascending index order. A run whose result is
//! already stored under its fingerprint is never executed again; when results
//! are committed after every run, terminating the process loses at most the
//! run in flight.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use memo_core::errors::{ErrorInfo, MemoError};
use memo_core::{ParameterSet, Value};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::computation::Computation;
use crate::config::{BatchConfig, FailurePolicy};
use crate::factorial::{expand_factors, Factors};
use crate::filter::Filter;
use crate::progress::{minutes, Progress};
use crate::run::{BatchContext, Completed, Run};
use crate::store::{FileStore, ResultStore};

/// Which runs a batch call should consider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// Every run that is not done yet.
    #[default]
    Pending,
    Index(usize),
    Indices(Vec<usize>),
}

impl From<usize> for Selection {
    fn from(index: usize) -> Self {
        Selection::Index(index)
    }
}

impl From<Vec<usize>> for Selection {
    fn from(indices: Vec<usize>) -> Self {
        Selection::Indices(indices)
    }
}

/// Outcome of one batch call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Runs named by the selection.
    pub selected: usize,
    /// Runs executed successfully.
    pub executed: usize,
    /// Selected runs that were already done, or that took the result of an
    /// earlier run with the same fingerprint.
    pub skipped: usize,
    /// Indices of runs that failed.
    pub failed: Vec<usize>,
    pub elapsed: Duration,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total runtime {}: {} executed, {} skipped, {} failed",
            minutes(self.elapsed),
            self.executed,
            self.skipped,
            self.failed.len()
        )
    }
}

/// Named, ordered collection of runs sharing one result store.
pub struct Batch {
    context: Arc<BatchContext>,
    config: BatchConfig,
    runs: Vec<Run>,
}

impl Batch {
    /// Creates a batch backed by a file store under the configured base path.
    pub fn new(name: impl Into<String>, config: BatchConfig) -> Result<Self, MemoError> {
        let store = FileStore::under(&config.base_path, config.layout, config.codec);
        Self::with_store(name, config, Arc::new(store))
    }

    /// Creates a batch backed by a caller supplied store.
    pub fn with_store(
        name: impl Into<String>,
        config: BatchConfig,
        store: Arc<dyn ResultStore>,
    ) -> Result<Self, MemoError> {
        let name = name.into();
        validate_name(&name)?;
        config.validate()?;
        let context = Arc::new(BatchContext::new(
            name,
            store,
            config.save_results,
            config.identity_policy,
        ));
        Ok(Self {
            context,
            config,
            runs: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        self.context.name()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        self.context.store()
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn get(&self, index: usize) -> Option<&Run> {
        self.runs.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Run> {
        self.runs.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Indices of runs not done yet, ascending.
    pub fn pending_indices(&self) -> Vec<usize> {
        self.indices_where(|run| !run.is_done())
    }

    pub fn done_indices(&self) -> Vec<usize> {
        self.indices_where(Run::is_done)
    }

    fn indices_where(&self, predicate: impl Fn(&Run) -> bool) -> Vec<usize> {
        self.runs
            .iter()
            .filter(|run| predicate(*run))
            .map(Run::index)
            .collect()
    }

    /// Registers one run and returns its index.
    pub fn add_run(
        &mut self,
        computation: Arc<dyn Computation>,
        parameters: ParameterSet,
    ) -> Result<usize, MemoError> {
        let index = self.runs.len();
        let run = Run::new(self.context.clone(), index, computation, parameters)?;
        self.runs.push(run);
        Ok(index)
    }

    /// Registers one run per combination of the factor levels; the last factor
    /// varies fastest. Returns the index range of the new runs.
    pub fn add_factorial_runs(
        &mut self,
        computation: Arc<dyn Computation>,
        factors: &Factors,
    ) -> Result<Range<usize>, MemoError> {
        let start = self.runs.len();
        for parameters in expand_factors(factors) {
            self.add_run(computation.clone(), parameters)?;
        }
        Ok(start..self.runs.len())
    }

    /// Registers result-only runs for known fingerprints.
    pub fn add_result_runs<I, S>(&mut self, fingerprints: I) -> Range<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let start = self.runs.len();
        for fingerprint in fingerprints {
            let index = self.runs.len();
            self.runs
                .push(Run::result_only(self.context.clone(), index, fingerprint));
        }
        start..self.runs.len()
    }

    /// Registers result-only runs for every fingerprint saved by [`Batch::save_ids`].
    pub fn add_result_runs_from_ids(&mut self) -> Result<Range<usize>, MemoError> {
        let ids = self.store().read_ids(self.name())?.ok_or_else(|| {
            MemoError::Store(
                ErrorInfo::new("ids-missing", "no saved fingerprint list for batch")
                    .with_context("batch", self.name().to_string())
                    .with_hint("call save_ids on the producing batch first"),
            )
        })?;
        Ok(self.add_result_runs(ids))
    }

    /// Persists the fingerprints of all runs, in index order.
    pub fn save_ids(&self) -> Result<(), MemoError> {
        let ids: Vec<String> = self.runs.iter().map(|run| run.id().to_string()).collect();
        self.store().write_ids(self.name(), &ids)
    }

    /// Runs whose parameters satisfy every filter.
    pub fn get_runs_with(&self, filters: &[Filter]) -> Vec<&Run> {
        self.runs
            .iter()
            .filter(|run| filters.iter().all(|filter| filter.matches(run.parameters())))
            .collect()
    }

    /// One result key collected across all runs, in index order.
    pub fn results(&self, key: &str) -> Vec<Option<Value>> {
        self.runs
            .iter()
            .map(|run| run.load().and_then(|mut result| result.remove(key)))
            .collect()
    }

    pub fn record_path(&self, index: usize) -> Option<PathBuf> {
        self.runs.get(index).and_then(Run::record_path)
    }

    /// Deletes the stored result of one run and returns it to pending.
    pub fn clear_run(&mut self, index: usize) -> Result<bool, MemoError> {
        self.check_index(index)?;
        self.runs[index].clear()
    }

    fn check_index(&self, index: usize) -> Result<(), MemoError> {
        if index < self.runs.len() {
            return Ok(());
        }
        Err(MemoError::Selection(
            ErrorInfo::new("run-index", "run index out of range")
                .with_context("batch", self.name().to_string())
                .with_context("index", index.to_string())
                .with_hint(format!("batch holds {} runs", self.runs.len())),
        ))
    }

    /// Selected indices, ascending and deduplicated, done runs included.
    fn resolve(&self, selection: &Selection) -> Result<Vec<usize>, MemoError> {
        let mut indices = match selection {
            Selection::Pending => return Ok(self.pending_indices()),
            Selection::Index(index) => vec![*index],
            Selection::Indices(indices) => indices.clone(),
        };
        for &index in &indices {
            self.check_index(index)?;
        }
        indices.sort_unstable();
        indices.dedup();
        Ok(indices)
    }

    /// Executes the selected runs that are not done yet, in ascending index order.
    pub fn run(&mut self, selection: Selection) -> Result<BatchSummary, MemoError> {
        let selected = self.resolve(&selection)?;
        let pending: Vec<usize> = selected
            .iter()
            .copied()
            .filter(|&index| !self.runs[index].is_done())
            .collect();
        let progress = Progress::new(&pending, self.config.max_progress_lines, self.config.verbose);
        let fail_fast = self.config.failure_policy == FailurePolicy::FailFast;
        let save_every_run = self.config.save_every_run;
        let start = Instant::now();

        let mut summary = BatchSummary {
            selected: selected.len(),
            executed: 0,
            skipped: selected.len() - pending.len(),
            failed: Vec::new(),
            elapsed: Duration::ZERO,
        };
        let mut deferred: Vec<(usize, Completed)> = Vec::new();
        let mut abort: Option<MemoError> = None;
        // Fingerprint -> run that produces (or already holds) its result.
        let mut sources: HashMap<String, usize> = self
            .runs
            .iter()
            .filter(|run| run.is_done())
            .map(|run| (run.id().to_string(), run.index()))
            .collect();
        let mut duplicates: Vec<(usize, usize)> = Vec::new();

        for (position, &index) in pending.iter().enumerate() {
            progress.report(position, index, start.elapsed());
            let id = self.runs[index].id().to_string();
            if let Some(&source) = sources.get(&id) {
                duplicates.push((index, source));
                continue;
            }
            sources.insert(id, index);
            let run = &mut self.runs[index];
            let outcome = run.execute().and_then(|completed| {
                if save_every_run {
                    run.commit(completed).map(|_| ())
                } else {
                    deferred.push((index, completed));
                    Ok(())
                }
            });
            match outcome {
                Ok(()) => summary.executed += 1,
                Err(err) => {
                    warn!(batch = %self.context.name(), run = index, error = %err, "run failed");
                    summary.failed.push(index);
                    if fail_fast {
                        abort = Some(err);
                        break;
                    }
                }
            }
        }

        for (index, completed) in deferred {
            if let Err(err) = self.runs[index].commit(completed) {
                warn!(batch = %self.context.name(), run = index, error = %err, "commit failed");
                summary.executed -= 1;
                summary.failed.push(index);
                if fail_fast && abort.is_none() {
                    abort = Some(err);
                }
            }
        }
        for (index, source) in duplicates {
            let shared = if self.runs[source].is_done() {
                self.runs[source].load()
            } else {
                None
            };
            match shared {
                Some(result) => {
                    let runtime = self.runs[source].runtime();
                    self.runs[index].attach(result, runtime);
                    summary.skipped += 1;
                }
                None => {
                    warn!(
                        batch = %self.context.name(),
                        run = index,
                        source,
                        "run with the same fingerprint produced no result"
                    );
                    summary.failed.push(index);
                }
            }
        }
        summary.failed.sort_unstable();
        summary.elapsed = start.elapsed();

        info!(
            batch = %self.context.name(),
            executed = summary.executed,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "{summary}"
        );
        match abort {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    /// Executes every pending run.
    pub fn run_pending(&mut self) -> Result<BatchSummary, MemoError> {
        self.run(Selection::Pending)
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("name", &self.context.name())
            .field("runs", &self.runs.len())
            .field("pending", &self.pending_indices().len())
            .finish_non_exhaustive()
    }
}

fn validate_name(name: &str) -> Result<(), MemoError> {
    let invalid = name.is_empty()
        || name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '\0') || c.is_control());
    if invalid {
        return Err(MemoError::Config(
            ErrorInfo::new("batch-name", "batch name must be a non-empty file name fragment")
                .with_context("name", name.to_string()),
        ));
    }
    Ok(())
}
