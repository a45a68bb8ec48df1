use crate::collector::master::{MasterStatus, probe_master};
use crate::collector::queue::queue_depths;
use crate::collector::version::discover_version;
use crate::config::ExporterConfig;

/// Point-in-time gauges rendered next to the persisted counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GaugeSnapshot {
    /// `(queue, messages)` for every readable queue.
    pub queues: Vec<(&'static str, u64)>,
    pub master: MasterStatus,
    pub version: Option<String>,
}

impl GaugeSnapshot {
    /// Runs every probe. Never fails; unknown values are left out.
    pub fn gather(config: &ExporterConfig) -> Self {
        Self {
            queues: queue_depths(&config.queue_root),
            master: probe_master(&config.queue_root, &config.proc_path),
            version: discover_version(&config.postconf_path, config.config_dir.as_deref()),
        }
    }
}
