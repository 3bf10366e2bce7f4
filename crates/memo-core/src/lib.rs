#![deny(missing_docs)]
#![doc = "Shared errors, record schema versions and the value model for memoized batch runs."]

mod canonical;
pub mod errors;
pub mod provenance;
pub mod value;

pub use canonical::to_canonical_json_bytes;
pub use errors::{ErrorInfo, MemoError};
pub use provenance::SchemaVersion;
pub use value::{NamedCallable, OpaqueParam, Param, ParameterSet, ResultMap, TypeRef, Value};
