use std::fmt;

use memo_core::{MemoError, Param, ParameterSet, ResultMap};
use serde::{Deserialize, Serialize};

/// Optional behaviours a computation opts into or out of.
///
/// Read once when a run is registered; later changes have no effect on that run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Results may be written to the batch's result store.
    pub persist: bool,
    /// Results are kept in memory after they are first produced or read.
    pub cache_results: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            persist: true,
            cache_results: true,
        }
    }
}

/// A parameterized computation a batch can memoize.
///
/// Implementations must not depend on global state: a batch may call
/// [`Computation::compute`] many times with different parameter sets.
pub trait Computation: Send + Sync {
    /// Name used in diagnostics. Not part of run identity.
    fn name(&self) -> &str;

    /// Declared default parameters.
    fn defaults(&self) -> ParameterSet {
        ParameterSet::new()
    }

    /// Applies caller overrides over the declared defaults. Overridden keys keep
    /// their declared position, new keys are appended.
    fn merge(&self, overrides: ParameterSet) -> ParameterSet {
        let mut merged = self.defaults();
        for (key, value) in overrides {
            merged.insert(key, value);
        }
        merged
    }

    /// Runs the computation on a resolved parameter set.
    fn compute(&self, parameters: &ParameterSet) -> Result<ResultMap, MemoError>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}

/// [`Computation`] backed by a closure.
///
/// ```
/// use memo_batch::{Computation, FnComputation};
/// use memo_core::Value;
///
/// let square = FnComputation::new("square", |params| {
///     let x = params.get("x").and_then(|p| p.as_f64()).unwrap_or_default();
///     Ok([("y".to_string(), Value::Float(x * x))].into_iter().collect())
/// })
/// .with_default("x", 2.0);
/// assert_eq!(square.defaults().len(), 1);
/// ```
pub struct FnComputation<F> {
    name: String,
    defaults: ParameterSet,
    capabilities: Capabilities,
    body: F,
}

impl<F> FnComputation<F>
where
    F: Fn(&ParameterSet) -> Result<ResultMap, MemoError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            defaults: ParameterSet::new(),
            capabilities: Capabilities::default(),
            body,
        }
    }

    /// Declares a default parameter value.
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Param>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

impl<F> Computation for FnComputation<F>
where
    F: Fn(&ParameterSet) -> Result<ResultMap, MemoError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn defaults(&self) -> ParameterSet {
        self.defaults.clone()
    }

    fn compute(&self, parameters: &ParameterSet) -> Result<ResultMap, MemoError> {
        (self.body)(parameters)
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

impl<F> fmt::Debug for FnComputation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnComputation")
            .field("name", &self.name)
            .field("defaults", &self.defaults)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
