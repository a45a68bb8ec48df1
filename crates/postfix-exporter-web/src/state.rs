//! Shared application state and the global allocator.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::Arc;

use axum::extract::State;

use postfix_exporter_core::LogCollector;

/// Cycles are serialized inside the collector, so handlers share it freely.
pub(crate) type SharedCollector = Arc<LogCollector>;

pub(crate) type AppState = State<SharedCollector>;
