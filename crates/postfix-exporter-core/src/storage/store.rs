//! Durable counter store.
//!
//! State is a flat JSON object: `last_identity`, `last_byteOffset` and one
//! entry per counter key. Commits go through a `.tmp` sibling that is synced
//! and renamed over the state file, so counters and position always change
//! together.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::CounterKey;
use crate::error::{ExporterError, Result};
use crate::storage::model::{CounterState, Increments, LogIdentity, LogPosition};
use crate::storage::sibling_path;

/// On-disk layout. Counter keys are flattened next to the position fields.
#[derive(Serialize, Deserialize)]
struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_identity: Option<String>,
    #[serde(default, rename = "last_byteOffset")]
    last_byte_offset: u64,
    #[serde(flatten)]
    counters: BTreeMap<String, serde_json::Value>,
}

/// Counter state loaded from disk, mutated in memory, committed once per cycle.
pub struct CounterStore {
    path: PathBuf,
    state: CounterState,
}

impl CounterStore {
    /// Loads the persisted state at `path`.
    ///
    /// A missing file yields the zero state. An unreadable or malformed file
    /// also yields the zero state (a counter reset) after a warning; the bad
    /// file is moved aside to `<path>.corrupt`.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match fs::read(&path) {
            Ok(bytes) => match decode(&bytes) {
                Ok(state) => state,
                Err(reason) => {
                    let err = ExporterError::StateCorrupt {
                        path: path.clone(),
                        reason,
                    };
                    warn!(error = %err, "counter state reset to zero");
                    quarantine(&path);
                    CounterState::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no persisted state, starting fresh");
                CounterState::default()
            }
            Err(e) => {
                let err = ExporterError::StateCorrupt {
                    path: path.clone(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "counter state reset to zero");
                // Keep the unread file; the next commit would replace it.
                quarantine(&path);
                CounterState::default()
            }
        };

        Self { path, state }
    }

    /// True when no position has ever been committed.
    pub fn is_fresh(&self) -> bool {
        self.state.position.is_none()
    }

    pub fn state(&self) -> &CounterState {
        &self.state
    }

    pub fn into_state(self) -> CounterState {
        self.state
    }

    /// Adds the cycle's increments to the in-memory counters.
    pub fn apply(&mut self, increments: &Increments) {
        self.state.apply(increments);
    }

    /// Persists counters together with `position` as one atomic replace.
    ///
    /// On failure the store is unchanged on disk and the error is returned;
    /// the next cycle re-reads the same range from the previous position.
    pub fn commit(&mut self, position: LogPosition) -> Result<()> {
        let mut next = self.state.clone();
        next.position = Some(position);

        let write_failed = |source: io::Error| ExporterError::StateWriteFailed {
            path: self.path.clone(),
            source,
        };
        let bytes = encode(&next).map_err(write_failed)?;
        write_atomic(&self.path, &bytes).map_err(write_failed)?;

        self.state = next;
        Ok(())
    }
}

fn encode(state: &CounterState) -> io::Result<Vec<u8>> {
    let persisted = PersistedState {
        last_identity: state.position.map(|p| p.identity.to_string()),
        last_byte_offset: state.position.map(|p| p.byte_offset).unwrap_or(0),
        counters: state
            .iter()
            .map(|(key, value)| (key.as_str().to_string(), serde_json::Value::from(value)))
            .collect(),
    };
    let mut bytes = serde_json::to_vec_pretty(&persisted).map_err(io::Error::other)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> std::result::Result<CounterState, String> {
    let persisted: PersistedState = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;

    let mut state = CounterState::default();
    for key in CounterKey::ALL {
        if let Some(value) = persisted.counters.get(key.as_str()) {
            let value = value
                .as_u64()
                .ok_or_else(|| format!("counter {} is not an unsigned integer", key.as_str()))?;
            state.set(key, value);
        }
    }

    if let Some(identity) = persisted.last_identity {
        state.position = Some(LogPosition {
            identity: identity.parse::<LogIdentity>()?,
            byte_offset: persisted.last_byte_offset,
        });
    }

    Ok(state)
}

/// Writes `bytes` to a `.tmp` sibling, syncs it and renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = sibling_path(path, "tmp");
    let mut file = File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;

    // Make the rename itself durable.
    #[cfg(unix)]
    {
        if let Some(dir) = parent.and_then(|p| File::open(p).ok()) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

fn quarantine(path: &Path) {
    let corrupt_path = sibling_path(path, "corrupt");
    if let Err(e) = fs::rename(path, &corrupt_path) {
        warn!(path = %path.display(), error = %e, "failed to move corrupt state aside");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(ino: u64, byte_offset: u64) -> LogPosition {
        LogPosition {
            identity: LogIdentity { dev: 64769, ino },
            byte_offset,
        }
    }

    #[test]
    fn test_missing_state_is_fresh_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = CounterStore::load(dir.path().join("state.json"));

        assert!(store.is_fresh());
        assert_eq!(store.state(), &CounterState::default());
    }

    #[test]
    fn test_commit_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = CounterStore::load(&path);
        let mut inc = Increments::new();
        inc.add(CounterKey::MessagesReceived, 3);
        inc.add(CounterKey::DeliveryPipeSent, 1);
        store.apply(&inc);
        store.commit(position(42, 1234)).unwrap();

        let reloaded = CounterStore::load(&path);
        assert!(!reloaded.is_fresh());
        assert_eq!(reloaded.state(), store.state());
        assert_eq!(reloaded.state().position, Some(position(42, 1234)));
        assert_eq!(reloaded.state().get(CounterKey::MessagesReceived), 3);
    }

    #[test]
    fn test_recommit_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = CounterStore::load(&path);
        let mut inc = Increments::new();
        inc.add(CounterKey::RejectHelo, 7);
        store.apply(&inc);
        store.commit(position(9, 77)).unwrap();
        let first = fs::read(&path).unwrap();

        let mut reloaded = CounterStore::load(&path);
        let pos = reloaded.state().position.unwrap();
        reloaded.commit(pos).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_persisted_layout_is_flat() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = CounterStore::load(&path);
        store.commit(position(5, 10)).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2 + CounterKey::COUNT);
        assert_eq!(object["last_identity"], "64769:5");
        assert_eq!(object["last_byteOffset"], 10);
        assert_eq!(object["reject_unknown_user"], 0);
    }

    #[test]
    fn test_corrupt_state_resets_and_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{\"last_identity\": \"1:2\", \"messages_rec").unwrap();

        let store = CounterStore::load(&path);
        assert!(store.is_fresh());
        assert_eq!(store.state(), &CounterState::default());
        assert!(!path.exists());
        assert!(dir.path().join("state.json.corrupt").exists());
    }

    #[test]
    fn test_unreadable_state_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        // Reading a directory fails with something other than NotFound.
        fs::create_dir(&path).unwrap();
        fs::write(path.join("marker"), b"x").unwrap();

        let mut store = CounterStore::load(&path);
        assert!(store.is_fresh());
        assert!(dir.path().join("state.json.corrupt/marker").exists());

        store.commit(position(1, 0)).unwrap();
        assert!(path.is_file());
        assert!(dir.path().join("state.json.corrupt/marker").exists());
    }

    #[test]
    fn test_negative_counter_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            br#"{"last_identity": "1:2", "last_byteOffset": 5, "messages_received": -1}"#,
        )
        .unwrap();

        let store = CounterStore::load(&path);
        assert_eq!(store.state(), &CounterState::default());
    }

    #[test]
    fn test_bad_identity_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, br#"{"last_identity": "inode-7", "last_byteOffset": 5}"#).unwrap();

        assert!(CounterStore::load(&path).is_fresh());
    }

    #[test]
    fn test_unknown_and_missing_keys_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            br#"{"last_identity": "3:4", "last_byteOffset": 99, "messages_bounced": 12, "legacy_key": "x"}"#,
        )
        .unwrap();

        let store = CounterStore::load(&path);
        assert_eq!(store.state().get(CounterKey::MessagesBounced), 12);
        assert_eq!(store.state().get(CounterKey::MessagesReceived), 0);
        assert_eq!(
            store.state().position,
            Some(LogPosition {
                identity: LogIdentity { dev: 3, ino: 4 },
                byte_offset: 99,
            })
        );
    }

    #[test]
    fn test_commit_failure_leaves_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = CounterStore::load(&path);
        store.commit(position(1, 100)).unwrap();
        let before = fs::read(&path).unwrap();

        // A directory squatting on the tmp path makes File::create fail.
        fs::create_dir(dir.path().join("state.json.tmp")).unwrap();

        let mut store = CounterStore::load(&path);
        let mut inc = Increments::new();
        inc.add(CounterKey::MessagesDeferred, 4);
        store.apply(&inc);
        let err = store.commit(position(1, 200)).unwrap_err();

        assert!(matches!(err, ExporterError::StateWriteFailed { .. }));
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(store.state().position, Some(position(1, 100)));
    }

    #[test]
    fn test_commit_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("var").join("lib").join("state.json");

        let mut store = CounterStore::load(&path);
        store.commit(position(1, 0)).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("var/lib/state.json.tmp").exists());
    }
}
