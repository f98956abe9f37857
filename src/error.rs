//! Error types for perfcache
//!
//! Configuration problems are fatal at startup. Everything else in this crate
//! is observability plumbing, so its errors are logged by the caller and
//! never allowed to change the outcome of the operation being measured.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid configuration (environment values or constructor arguments)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    OutOfRange(String),
}

impl ConfigError {
    pub(crate) fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure to write an export document
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write metrics export to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize metrics export: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A resource probe could not produce a reading
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("resource probe unavailable: {0}")]
    Unavailable(String),
}

/// The synthetic workload did not run to completion
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkloadError {
    #[error("a workload thread panicked")]
    WorkerPanicked,
}
