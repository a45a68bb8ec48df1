//! postfix-exporter-core - shared library for the postfix exporter binaries.
//!
//! Provides:
//! - `catalog` - counter keys, metric families and the log pattern table
//! - `collector` - position tracking, line classification, gauge probes
//!   and the serialized collection cycle
//! - `storage` - persisted counter state with atomic commits
//! - `exposition` - Prometheus text exposition rendering
//! - `config` - exporter configuration shared by both binaries

pub mod catalog;
pub mod collector;
pub mod config;
pub mod error;
pub mod exposition;
pub mod storage;

pub use collector::{CycleReport, LogCollector};
pub use config::ExporterConfig;
pub use error::{ExporterError, Result};

/// Crate version plus the short git SHA captured at build time.
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_SHA"), ")");
