//! Error taxonomy for a collection cycle.
//!
//! Only `StateWriteFailed` and `LockFailed` ever leave `LogCollector::collect()`.
//! `SourceUnavailable` and `StateCorrupt` are logged and degraded inside the
//! cycle; they exist as variants so the degraded paths report uniformly.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    /// Log file missing or unreadable.
    #[error("log source {path} unavailable: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Persisted state unreadable or malformed.
    #[error("state file {path} corrupt: {reason}")]
    StateCorrupt { path: PathBuf, reason: String },

    /// Commit of the counter state failed.
    #[error("failed to write state file {path}: {source}")]
    StateWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Advisory lock on the state store could not be taken.
    #[error("failed to lock state store {path}: {source}")]
    LockFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ExporterError>;
