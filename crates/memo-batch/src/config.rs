use std::fs;
use std::path::{Path, PathBuf};

use memo_core::errors::{ErrorInfo, MemoError};
use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::hash::IdentityPolicy;
use crate::progress::DEFAULT_PROGRESS_LINES;
use crate::store::StoreLayout;

/// What the batch driver does when a run fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failed run and return its error.
    #[default]
    FailFast,
    /// Keep going and list failed runs in the summary.
    Continue,
}

/// Batch settings, loadable from YAML or JSON. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Records are stored under `<base_path>/_res/`.
    pub base_path: PathBuf,
    /// Persist results; when off they live only as long as the batch.
    pub save_results: bool,
    /// Commit each result as soon as its run finishes rather than after the loop.
    pub save_every_run: bool,
    pub layout: StoreLayout,
    pub codec: Codec,
    pub failure_policy: FailurePolicy,
    pub identity_policy: IdentityPolicy,
    /// Emit progress lines while running.
    pub verbose: bool,
    pub max_progress_lines: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            save_results: true,
            save_every_run: true,
            layout: StoreLayout::default(),
            codec: Codec::default(),
            failure_policy: FailurePolicy::default(),
            identity_policy: IdentityPolicy::default(),
            verbose: true,
            max_progress_lines: DEFAULT_PROGRESS_LINES,
        }
    }
}

impl BatchConfig {
    /// Default settings rooted at `base_path`.
    pub fn at(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, MemoError> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|err| config_error("config-yaml", err))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, MemoError> {
        let config: Self =
            serde_json::from_str(text).map_err(|err| config_error("config-json", err))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file, choosing the format from its extension.
    pub fn from_path(path: &Path) -> Result<Self, MemoError> {
        let text = fs::read_to_string(path).map_err(|err| {
            config_error("config-read", err).with_context("path", path.display().to_string())
        })?;
        let result = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            Some("json") => Self::from_json_str(&text),
            _ => Err(MemoError::Config(
                ErrorInfo::new("config-format", "unsupported configuration format")
                    .with_hint("use a .yaml, .yml or .json file"),
            )),
        };
        result.map_err(|err| err.with_context("path", path.display().to_string()))
    }

    pub fn validate(&self) -> Result<(), MemoError> {
        if self.max_progress_lines == 0 {
            return Err(MemoError::Config(
                ErrorInfo::new("config-progress", "max_progress_lines must be positive")
                    .with_context("max_progress_lines", "0"),
            ));
        }
        Ok(())
    }
}

fn config_error(code: &str, err: impl ToString) -> MemoError {
    MemoError::Config(ErrorInfo::new(code, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = BatchConfig::from_yaml_str(
            "base_path: /tmp/runs\nlayout: aggregate\ncodec: bincode\nfailure_policy: continue\n",
        )
        .expect("config");
        assert_eq!(config.base_path, PathBuf::from("/tmp/runs"));
        assert_eq!(config.layout, StoreLayout::Aggregate);
        assert_eq!(config.codec, Codec::Bincode);
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert!(config.save_results);
        assert_eq!(config.max_progress_lines, DEFAULT_PROGRESS_LINES);
    }

    #[test]
    fn json_and_validation() {
        let config =
            BatchConfig::from_json_str(r#"{"identity_policy": "strict", "verbose": false}"#)
                .expect("config");
        assert_eq!(config.identity_policy, IdentityPolicy::Strict);
        assert!(!config.verbose);
        let err = BatchConfig::from_json_str(r#"{"max_progress_lines": 0}"#).expect_err("invalid");
        assert_eq!(err.info().code, "config-progress");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = BatchConfig::from_yaml_str("save_reslts: false\n").expect_err("typo");
        assert_eq!(err.info().code, "config-yaml");
    }
}
