//! Memoized, resumable execution of parameterized computation batches.
//!
//! A [`Batch`] holds an ordered list of [`Run`]s. Each run is identified by a
//! fingerprint of its normalized parameters; results are persisted under that
//! fingerprint, so re-creating a batch with the same parameters attaches to
//! the stored results instead of computing them again.

mod batch;
mod codec;
mod computation;
mod config;
mod factorial;
mod filter;
pub mod hash;
mod progress;
mod run;
mod store;

pub use batch::{Batch, BatchSummary, Selection};
pub use codec::{Codec, DecodedRecord, RunRecord};
pub use computation::{Capabilities, Computation, FnComputation};
pub use config::{BatchConfig, FailurePolicy};
pub use factorial::{expand_factors, Factors};
pub use filter::{CompareOp, Filter};
pub use hash::{
    fingerprint, fingerprint_values, fingerprint_with, normalize, stable_hash_string,
    DroppedParam, Fingerprint, IdentityPolicy, Unserializable,
};
pub use progress::{compact_list, Progress, ProgressLine, DEFAULT_PROGRESS_LINES};
pub use run::{BatchContext, Completed, Run, RunState};
pub use store::{FileStore, MemoryStore, ResultStore, StoreLayout, RESULT_DIR};
