//! Counter state data model.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::catalog::CounterKey;

/// Physical identity of a log file instance (device + inode).
///
/// Changes when the file is rotated; unchanged across appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogIdentity {
    pub dev: u64,
    pub ino: u64,
}

impl LogIdentity {
    /// Identity of the file described by `metadata`.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    /// Fallback for non-Unix: constant identity, rotation is only seen as truncation.
    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &std::fs::Metadata) -> Self {
        Self { dev: 0, ino: 0 }
    }
}

impl fmt::Display for LogIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.ino)
    }
}

impl FromStr for LogIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (dev, ino) = s
            .split_once(':')
            .ok_or_else(|| format!("identity '{}' is not <dev>:<ino>", s))?;
        let dev = dev
            .parse()
            .map_err(|_| format!("invalid device in identity '{}'", s))?;
        let ino = ino
            .parse()
            .map_err(|_| format!("invalid inode in identity '{}'", s))?;
        Ok(Self { dev, ino })
    }
}

/// Last classified byte boundary within a given log file instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPosition {
    pub identity: LogIdentity,
    pub byte_offset: u64,
}

/// Per-cycle counter increments produced by the classifier.
///
/// Only keys that matched at least one line are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Increments {
    counts: BTreeMap<CounterKey, u64>,
}

impl Increments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: CounterKey, n: u64) {
        let count = self.counts.entry(key).or_insert(0);
        *count = count.saturating_add(n);
    }

    pub fn get(&self, key: CounterKey) -> u64 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CounterKey, u64)> + '_ {
        self.counts.iter().map(|(k, v)| (*k, *v))
    }

    /// Sum over all keys, saturating.
    pub fn total(&self) -> u64 {
        self.counts.values().fold(0u64, |acc, v| acc.saturating_add(*v))
    }
}

/// Persisted counters plus the position they were counted up to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterState {
    /// `None` until the first successful commit.
    pub position: Option<LogPosition>,
    counters: [u64; CounterKey::COUNT],
}

impl CounterState {
    pub fn get(&self, key: CounterKey) -> u64 {
        self.counters[key as usize]
    }

    pub fn set(&mut self, key: CounterKey, value: u64) {
        self.counters[key as usize] = value;
    }

    /// Adds every increment, saturating at `u64::MAX`.
    pub fn apply(&mut self, increments: &Increments) {
        for (key, n) in increments.iter() {
            let slot = &mut self.counters[key as usize];
            *slot = slot.saturating_add(n);
        }
    }

    /// All counters in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (CounterKey, u64)> + '_ {
        CounterKey::ALL.into_iter().map(|k| (k, self.get(k)))
    }
}
