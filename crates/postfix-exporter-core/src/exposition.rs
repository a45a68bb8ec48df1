//! Prometheus text exposition rendering.
//!
//! Families are written in `FAMILY_ORDER`, series within a family in catalog
//! order, so identical input always renders identical text. Each family's
//! HELP/TYPE header is written once, before its first series; families with
//! no series are left out entirely.

use std::collections::HashSet;
use std::fmt::Write;

use crate::catalog::{
    CounterKey, FAMILY_ORDER, MASTER_PROCESS_RUNNING, MASTER_PROCESS_UPTIME, MetricFamily,
    QUEUE_SIZE, VERSION_INFO,
};
use crate::collector::GaugeSnapshot;
use crate::storage::CounterState;

/// Renders counters and gauges as one exposition document.
pub fn render(prefix: &str, state: &CounterState, gauges: &GaugeSnapshot) -> String {
    let mut writer = ExpositionWriter::new(prefix);

    for family in FAMILY_ORDER {
        if family.name == QUEUE_SIZE.name {
            for (queue, depth) in &gauges.queues {
                writer.sample(family, &[("queue", *queue)], *depth);
            }
        } else if family.name == MASTER_PROCESS_RUNNING.name {
            writer.sample(family, &[], u64::from(gauges.master.running));
        } else if family.name == MASTER_PROCESS_UPTIME.name {
            if let Some(uptime) = gauges.master.uptime_seconds {
                writer.sample(family, &[], uptime);
            }
        } else if family.name == VERSION_INFO.name {
            if let Some(version) = &gauges.version {
                writer.sample(family, &[("version", version.as_str())], 1);
            }
        } else {
            for key in CounterKey::ALL {
                let series = key.series();
                if series.family.name == family.name {
                    writer.sample(family, series.labels, state.get(key));
                }
            }
        }
    }

    writer.finish()
}

struct ExpositionWriter<'a> {
    prefix: &'a str,
    out: String,
    headers_written: HashSet<&'static str>,
}

impl<'a> ExpositionWriter<'a> {
    fn new(prefix: &'a str) -> Self {
        Self {
            prefix,
            out: String::new(),
            headers_written: HashSet::new(),
        }
    }

    fn sample(&mut self, family: &'static MetricFamily, labels: &[(&str, &str)], value: u64) {
        // Writing to a String cannot fail.
        if self.headers_written.insert(family.name) {
            let _ = writeln!(self.out, "# HELP {}_{} {}", self.prefix, family.name, family.help);
            let _ = writeln!(
                self.out,
                "# TYPE {}_{} {}",
                self.prefix,
                family.name,
                family.kind.as_str()
            );
        }

        let _ = write!(self.out, "{}_{}", self.prefix, family.name);
        if !labels.is_empty() {
            self.out.push('{');
            for (i, (name, value)) in labels.iter().enumerate() {
                if i > 0 {
                    self.out.push(',');
                }
                let _ = write!(self.out, "{}=\"{}\"", name, escape_label_value(value));
            }
            self.out.push('}');
        }
        let _ = writeln!(self.out, " {}", value);
    }

    fn finish(self) -> String {
        self.out
    }
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}
