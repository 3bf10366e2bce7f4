//! Structured error types shared across the memo crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`MemoError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (batch names, fingerprints, indices, paths).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for memoized batch execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum MemoError {
    /// A parameter could not be normalized and the identity policy is strict.
    #[error("identity error: {0}")]
    Identity(ErrorInfo),
    /// Result store I/O failures.
    #[error("store error: {0}")]
    Store(ErrorInfo),
    /// Encoding and decoding failures.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Failures raised by a computation body.
    #[error("computation error: {0}")]
    Computation(ErrorInfo),
    /// A result-only run was asked to execute.
    #[error("reconstruction error: {0}")]
    Reconstruction(ErrorInfo),
    /// A run selection referenced an index outside the batch.
    #[error("selection error: {0}")]
    Selection(ErrorInfo),
    /// Invalid batch configuration.
    #[error("config error: {0}")]
    Config(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl MemoError {
    /// Convenience constructor for errors raised inside computation bodies.
    pub fn computation(code: impl Into<String>, message: impl Into<String>) -> Self {
        MemoError::Computation(ErrorInfo::new(code, message))
    }

    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            MemoError::Identity(info)
            | MemoError::Store(info)
            | MemoError::Serde(info)
            | MemoError::Computation(info)
            | MemoError::Reconstruction(info)
            | MemoError::Selection(info)
            | MemoError::Config(info) => info,
        }
    }

    fn info_mut(&mut self) -> &mut ErrorInfo {
        match self {
            MemoError::Identity(info)
            | MemoError::Store(info)
            | MemoError::Serde(info)
            | MemoError::Computation(info)
            | MemoError::Reconstruction(info)
            | MemoError::Selection(info)
            | MemoError::Config(info) => info,
        }
    }

    /// Adds a context entry while keeping the error family intact.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info_mut().context.insert(key.into(), value.into());
        self
    }

    /// Returns `true` when the error originated in a computation body.
    pub fn is_computation(&self) -> bool {
        matches!(self, MemoError::Computation(_))
    }

    /// Returns `true` when the error signals a missing computation specification.
    pub fn is_reconstruction(&self) -> bool {
        matches!(self, MemoError::Reconstruction(_))
    }
}
