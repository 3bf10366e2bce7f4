use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use memo_core::errors::{ErrorInfo, MemoError};
use memo_core::{ParameterSet, ResultMap, Value};
use tracing::{debug, warn};

use crate::codec::RunRecord;
use crate::computation::{Capabilities, Computation};
use crate::hash::{fingerprint_with, DroppedParam, IdentityPolicy};
use crate::store::ResultStore;

/// Batch-level state shared by every run of a batch.
pub struct BatchContext {
    name: String,
    store: Arc<dyn ResultStore>,
    save_results: bool,
    identity_policy: IdentityPolicy,
}

impl BatchContext {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn ResultStore>,
        save_results: bool,
        identity_policy: IdentityPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            save_results,
            identity_policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    pub fn save_results(&self) -> bool {
        self.save_results
    }
}

impl fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchContext")
            .field("name", &self.name)
            .field("save_results", &self.save_results)
            .field("identity_policy", &self.identity_policy)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Done,
}

/// Output of [`Run::execute`] that has not been committed yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed {
    result: ResultMap,
    runtime: f64,
}

impl Completed {
    pub fn result(&self) -> &ResultMap {
        &self.result
    }

    /// Wall-clock execution time in seconds.
    pub fn runtime(&self) -> f64 {
        self.runtime
    }
}

/// One memoized unit of computation inside a batch.
pub struct Run {
    ctx: Arc<BatchContext>,
    index: usize,
    id: String,
    computation: Option<Arc<dyn Computation>>,
    raw: ParameterSet,
    parameters: BTreeMap<String, Value>,
    dropped: Vec<DroppedParam>,
    capabilities: Capabilities,
    state: RunState,
    result: Option<ResultMap>,
    runtime: Option<f64>,
}

impl Run {
    /// Resolves parameters over the computation's defaults, derives the
    /// fingerprint and attaches to a stored result when one exists.
    pub fn new(
        ctx: Arc<BatchContext>,
        index: usize,
        computation: Arc<dyn Computation>,
        overrides: ParameterSet,
    ) -> Result<Self, MemoError> {
        let raw = computation.merge(overrides);
        let fingerprint = fingerprint_with(&raw, ctx.identity_policy)
            .map_err(|err| err.with_context("index", index.to_string()))?;
        let capabilities = computation.capabilities();
        let mut run = Self {
            ctx,
            index,
            id: fingerprint.id,
            computation: Some(computation),
            raw,
            parameters: fingerprint.normalized,
            dropped: fingerprint.dropped,
            capabilities,
            state: RunState::Pending,
            result: None,
            runtime: None,
        };
        if run.is_persistent() {
            if let Some(record) = run.read_record() {
                run.adopt(record);
            }
        }
        Ok(run)
    }

    /// Reconstructs a run from its fingerprint alone. Such a run can load a
    /// stored result but cannot execute.
    pub fn result_only(
        ctx: Arc<BatchContext>,
        index: usize,
        fingerprint: impl Into<String>,
    ) -> Self {
        let mut run = Self {
            ctx,
            index,
            id: fingerprint.into(),
            computation: None,
            raw: ParameterSet::new(),
            parameters: BTreeMap::new(),
            dropped: Vec::new(),
            capabilities: Capabilities::default(),
            state: RunState::Pending,
            result: None,
            runtime: None,
        };
        match run.read_record() {
            Some(record) => {
                run.parameters = record.parameters.clone().unwrap_or_default();
                run.adopt(record);
            }
            None => warn!(
                batch = %run.ctx.name,
                fingerprint = %run.id,
                "no stored result for result-only run"
            ),
        }
        run
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Fingerprint identifying the run.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Normalized parameters, as they entered the fingerprint.
    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    /// Parameters as resolved from defaults and overrides. Empty for result-only runs.
    pub fn raw_parameters(&self) -> &ParameterSet {
        &self.raw
    }

    pub fn dropped_parameters(&self) -> &[DroppedParam] {
        &self.dropped
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == RunState::Done
    }

    pub fn is_result_only(&self) -> bool {
        self.computation.is_none()
    }

    /// Execution time in seconds of the run that produced the result.
    pub fn runtime(&self) -> Option<f64> {
        self.runtime
    }

    pub fn record_path(&self) -> Option<PathBuf> {
        self.ctx.store.record_path(&self.ctx.name, &self.id)
    }

    fn is_persistent(&self) -> bool {
        self.ctx.save_results && self.capabilities.persist
    }

    fn reads_store(&self) -> bool {
        self.is_persistent() || self.is_result_only()
    }

    fn read_record(&self) -> Option<RunRecord> {
        match self.ctx.store.read(&self.ctx.name, &self.id) {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    batch = %self.ctx.name,
                    fingerprint = %self.id,
                    error = %err,
                    "store read failed"
                );
                None
            }
        }
    }

    fn adopt(&mut self, record: RunRecord) {
        debug!(
            batch = %self.ctx.name,
            index = self.index,
            fingerprint = %self.id,
            "attached stored result"
        );
        self.state = RunState::Done;
        self.runtime = Some(record.runtime);
        if self.capabilities.cache_results {
            self.result = Some(record.result);
        }
    }

    fn context_error(&self, err: MemoError) -> MemoError {
        err.with_context("batch", self.ctx.name.clone())
            .with_context("index", self.index.to_string())
            .with_context("fingerprint", self.id.clone())
    }

    fn reconstruction_error(&self) -> MemoError {
        self.context_error(MemoError::Reconstruction(
            ErrorInfo::new(
                "specification-unavailable",
                "result-only run has no computation to execute",
            )
            .with_hint("register the run with add_run to make it executable"),
        ))
    }

    /// Returns the result, computing and persisting it if the run is pending.
    ///
    /// Repeated calls on a done run never recompute.
    pub fn invoke(&mut self) -> Result<ResultMap, MemoError> {
        if self.is_result_only() {
            return Err(self.reconstruction_error());
        }
        if self.is_done() {
            if let Some(result) = self.load() {
                return Ok(result);
            }
            warn!(
                batch = %self.ctx.name,
                fingerprint = %self.id,
                "stored result disappeared, executing again"
            );
            self.state = RunState::Pending;
        }
        let completed = self.execute()?;
        self.commit(completed)
    }

    /// Runs the computation without persisting or changing state.
    pub fn execute(&self) -> Result<Completed, MemoError> {
        let computation = self
            .computation
            .as_ref()
            .ok_or_else(|| self.reconstruction_error())?;
        let start = Instant::now();
        let result = computation
            .compute(&self.raw)
            .map_err(|err| self.context_error(err))?;
        Ok(Completed {
            result,
            runtime: start.elapsed().as_secs_f64(),
        })
    }

    /// Persists a completed execution and marks the run done. On a write
    /// failure the run stays pending.
    pub fn commit(&mut self, completed: Completed) -> Result<ResultMap, MemoError> {
        let Completed { result, runtime } = completed;
        let persistent = self.is_persistent();
        if persistent {
            let record = RunRecord::new(
                self.id.clone(),
                result.clone(),
                runtime,
                Some(self.parameters.clone()),
            );
            self.ctx
                .store
                .write(&self.ctx.name, &record)
                .map_err(|err| self.context_error(err))?;
        }
        debug!(
            batch = %self.ctx.name,
            index = self.index,
            runtime,
            persisted = persistent,
            "run committed"
        );
        self.state = RunState::Done;
        self.runtime = Some(runtime);
        if !persistent || self.capabilities.cache_results {
            self.result = Some(result.clone());
        }
        Ok(result)
    }

    /// Marks the run done with a result produced by another run sharing its
    /// fingerprint. Nothing is written.
    pub(crate) fn attach(&mut self, result: ResultMap, runtime: Option<f64>) {
        debug!(
            batch = %self.ctx.name,
            index = self.index,
            fingerprint = %self.id,
            "attached result of a run with the same fingerprint"
        );
        self.state = RunState::Done;
        self.runtime = runtime;
        if !self.is_persistent() || self.capabilities.cache_results {
            self.result = Some(result);
        }
    }

    /// Returns the cached or stored result without ever computing.
    pub fn load(&self) -> Option<ResultMap> {
        if let Some(result) = &self.result {
            return Some(result.clone());
        }
        if !self.reads_store() {
            return None;
        }
        self.read_record().map(|record| record.result)
    }

    /// Deletes the stored result and returns the run to pending. Reports
    /// whether a stored or in-memory result was actually removed.
    pub fn clear(&mut self) -> Result<bool, MemoError> {
        let mut removed = false;
        if self.reads_store() {
            removed = self
                .ctx
                .store
                .delete(&self.ctx.name, &self.id)
                .map_err(|err| self.context_error(err))?;
        }
        if self.result.take().is_some() && !self.reads_store() {
            removed = true;
        }
        self.state = RunState::Pending;
        self.runtime = None;
        Ok(removed)
    }
}

impl fmt::Debug for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Run")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("state", &self.state)
            .field("result_only", &self.is_result_only())
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}
