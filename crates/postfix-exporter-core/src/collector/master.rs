//! Postfix master process probe.
//!
//! Reads the pid Postfix writes to `<queue_root>/pid/master.pid`, confirms the
//! process is alive and is `master`, and derives uptime from `/proc`:
//! start = btime + starttime / CLK_TCK.

use std::fs;
use std::path::Path;

use tracing::debug;

/// Fallback when `sysconf(_SC_CLK_TCK)` is unavailable.
const DEFAULT_CLK_TCK: u64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MasterStatus {
    pub running: bool,
    pub uptime_seconds: Option<u64>,
}

/// Probes the master process. Any failure reports it as not running.
pub fn probe_master(queue_root: &Path, proc_path: &Path) -> MasterStatus {
    probe_master_at(queue_root, proc_path, chrono::Utc::now().timestamp(), clk_tck())
}

fn probe_master_at(queue_root: &Path, proc_path: &Path, now: i64, clk_tck: u64) -> MasterStatus {
    let pid_path = queue_root.join("pid").join("master.pid");
    let pid = match fs::read_to_string(&pid_path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
    {
        Some(pid) => pid,
        None => {
            debug!(path = %pid_path.display(), "no master pid");
            return MasterStatus::default();
        }
    };

    let stat = match fs::read_to_string(proc_path.join(pid.to_string()).join("stat")) {
        Ok(s) => s,
        Err(e) => {
            debug!(pid, error = %e, "master pid not alive");
            return MasterStatus::default();
        }
    };

    let (comm, starttime) = match parse_comm_and_starttime(&stat) {
        Some(v) => v,
        None => return MasterStatus::default(),
    };
    // Stale pid file whose pid was reused by another process.
    if comm != "master" {
        debug!(pid, comm, "pid does not belong to master");
        return MasterStatus::default();
    }

    let uptime_seconds = fs::read_to_string(proc_path.join("stat"))
        .ok()
        .and_then(|s| parse_btime(&s))
        .map(|btime| btime + starttime / clk_tck.max(1))
        .map(|started| (now.max(0) as u64).saturating_sub(started));

    MasterStatus {
        running: true,
        uptime_seconds,
    }
}

/// Extracts comm and starttime (field 22) from `/proc/[pid]/stat`.
///
/// comm may contain spaces and parentheses, so fields are counted after the
/// last `)`.
fn parse_comm_and_starttime(content: &str) -> Option<(&str, u64)> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close <= open {
        return None;
    }
    let comm = &content[open + 1..close];
    let starttime = content[close + 1..]
        .split_whitespace()
        .nth(19)?
        .parse()
        .ok()?;
    Some((comm, starttime))
}

/// Boot time in seconds since epoch from `/proc/stat`.
fn parse_btime(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(unix)]
fn clk_tck() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 { ticks as u64 } else { DEFAULT_CLK_TCK }
}

#[cfg(not(unix))]
fn clk_tck() -> u64 {
    DEFAULT_CLK_TCK
}
