use std::path::PathBuf;

use crate::error::{ExporterError, Result};

/// Configuration consumed by the collection cycle and the gauge probes.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Postfix log file to classify.
    pub log_path: PathBuf,
    /// Postfix queue directory (`queue_directory` in main.cf).
    pub queue_root: PathBuf,
    /// Trailing lines read on the first run, when no position is persisted.
    pub bootstrap_lines: usize,
    /// Persisted counter state. A `.lock` and a `.tmp` sibling are created next to it.
    pub state_path: PathBuf,
    /// Metric name prefix, e.g. `postfix` → `postfix_messages_received_total`.
    pub prefix: String,
    /// Path to the /proc filesystem (for testing/mocking).
    pub proc_path: PathBuf,
    /// `postconf` binary used for version discovery.
    pub postconf_path: PathBuf,
    /// Optional Postfix config directory, passed to postconf as `-c`.
    pub config_dir: Option<PathBuf>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/var/log/mail.log"),
            queue_root: PathBuf::from("/var/spool/postfix"),
            bootstrap_lines: 1000,
            state_path: PathBuf::from("/var/lib/postfix-exporter/state.json"),
            prefix: "postfix".to_string(),
            proc_path: PathBuf::from("/proc"),
            postconf_path: PathBuf::from("postconf"),
            config_dir: None,
        }
    }
}

impl ExporterConfig {
    /// Checks values that would otherwise produce an unusable exposition.
    pub fn validate(&self) -> Result<()> {
        if !is_metric_name_fragment(&self.prefix) {
            return Err(ExporterError::Config(format!(
                "prefix '{}' is not a valid metric name",
                self.prefix
            )));
        }
        if self.bootstrap_lines == 0 {
            return Err(ExporterError::Config(
                "bootstrap_lines must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`
fn is_metric_name_fragment(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
