//! Collection cycle.
//!
//! `LogCollector::collect()` is the only code path that reads the log and
//! mutates counter state. One cycle:
//!
//! 1. takes the in-process mutex, then the advisory lock on the state file
//! 2. loads the persisted counters and position
//! 3. resolves the new byte range (bootstrap, incremental, rotated, truncated)
//! 4. classifies every complete line in that range once
//! 5. applies the increments and commits counters plus the new position
//!    as one atomic replace
//!
//! Counters are never applied without the matching position, so a failed
//! commit re-reads the same range on the next cycle and nothing is counted
//! twice.

mod classifier;
mod gauges;
pub mod master;
pub mod queue;
mod tracker;
pub mod version;

use std::fs::File;
use std::io;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, error, info, warn};

pub use classifier::{Classifier, classify};
pub use gauges::GaugeSnapshot;
pub use tracker::{
    ReadSummary, ResolvedRange, TrackerMode, read_range, resolve_range, select_mode,
    tail_start_offset,
};

use crate::config::ExporterConfig;
use crate::error::{ExporterError, Result};
use crate::exposition;
use crate::storage::{CounterState, CounterStore, Increments, LogIdentity, StateLock};

/// Outcome of one collection cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// `None` when the log could not be read and nothing was committed.
    pub mode: Option<TrackerMode>,
    pub lines_read: u64,
    pub lines_skipped: u64,
    /// Increments applied in this cycle.
    pub increments: Increments,
    /// Counters and position after the cycle.
    pub state: CounterState,
}

/// Drives collection cycles against one log file and one state store.
///
/// Cycles are serialized twice: by a mutex across threads of this process
/// and by an exclusive `flock` on `<state>.lock` across processes.
pub struct LogCollector {
    config: ExporterConfig,
    cycle: Mutex<()>,
}

impl LogCollector {
    pub fn new(config: ExporterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cycle: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    /// Runs one cycle. Fails only on lock or commit errors.
    pub fn collect(&self) -> Result<CycleReport> {
        // The mutex guards no data, a poisoned lock is still usable.
        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        let _lock = StateLock::acquire(&self.config.state_path)?;
        let started = Instant::now();

        let mut store = CounterStore::load(&self.config.state_path);
        let stored = store.state().position;

        let (mut file, identity, size) = match open_source(&self.config) {
            Ok(source) => source,
            Err(err) => {
                warn!(error = %err, "skipping cycle, counters unchanged");
                return Ok(CycleReport::unchanged(store.into_state()));
            }
        };

        let mut classifier = Classifier::new();
        let read = resolve_range(&mut file, identity, size, stored, self.config.bootstrap_lines)
            .and_then(|range| {
                read_range(&mut file, range.start, range.end, |line| {
                    classifier.observe(line)
                })
                .map(|summary| (range, summary))
            });
        let (range, summary) = match read {
            Ok(v) => v,
            Err(source) => {
                let err = ExporterError::SourceUnavailable {
                    path: self.config.log_path.clone(),
                    source,
                };
                warn!(error = %err, "skipping cycle, counters unchanged");
                return Ok(CycleReport::unchanged(store.into_state()));
            }
        };
        let increments = classifier.finish();

        match range.mode {
            TrackerMode::Rotated => info!(
                previous = %stored.map(|p| p.identity.to_string()).unwrap_or_default(),
                current = %identity,
                "log rotated, reading new file from the start"
            ),
            TrackerMode::Truncated => info!(
                identity = %identity,
                size,
                "log truncated, reading from the start"
            ),
            TrackerMode::Bootstrap => info!(
                start = range.start,
                lines = self.config.bootstrap_lines,
                "no saved position, reading tail window"
            ),
            TrackerMode::Incremental => {}
        }

        let position = summary.position(identity);
        if increments.is_empty() && stored == Some(position) {
            debug!("no new lines");
        } else {
            store.apply(&increments);
            if let Err(e) = store.commit(position) {
                error!(error = %e, "commit failed, range will be re-read next cycle");
                return Err(e);
            }
        }

        debug!(
            mode = range.mode.as_str(),
            lines = summary.lines_read,
            skipped = summary.lines_skipped,
            matched = increments.total(),
            offset = position.byte_offset,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cycle complete"
        );

        Ok(CycleReport {
            mode: Some(range.mode),
            lines_read: summary.lines_read,
            lines_skipped: summary.lines_skipped,
            increments,
            state: store.into_state(),
        })
    }

    /// Runs a cycle, probes the gauges and renders the exposition document.
    pub fn scrape(&self) -> Result<String> {
        let report = self.collect()?;
        let gauges = GaugeSnapshot::gather(&self.config);
        Ok(exposition::render(&self.config.prefix, &report.state, &gauges))
    }
}

impl CycleReport {
    fn unchanged(state: CounterState) -> Self {
        Self {
            mode: None,
            lines_read: 0,
            lines_skipped: 0,
            increments: Increments::new(),
            state,
        }
    }
}

fn open_source(config: &ExporterConfig) -> Result<(File, LogIdentity, u64)> {
    let unavailable = |source: io::Error| ExporterError::SourceUnavailable {
        path: config.log_path.clone(),
        source,
    };

    let file = File::open(&config.log_path).map_err(unavailable)?;
    let metadata = file.metadata().map_err(unavailable)?;
    if !metadata.is_file() {
        return Err(unavailable(io::Error::other("not a regular file")));
    }
    Ok((file, LogIdentity::from_metadata(&metadata), metadata.len()))
}
