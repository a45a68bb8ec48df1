pub mod lock;
pub mod model;
pub mod store;

pub use lock::StateLock;
pub use model::{CounterState, Increments, LogIdentity, LogPosition};
pub use store::CounterStore;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// `state.json` + `lock` → `state.json.lock`, in the same directory.
pub(crate) fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("state"));
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_path() {
        assert_eq!(
            sibling_path(Path::new("/var/lib/pe/state.json"), "tmp"),
            PathBuf::from("/var/lib/pe/state.json.tmp")
        );
        assert_eq!(
            sibling_path(Path::new("state"), "lock"),
            PathBuf::from("state.lock")
        );
    }
}
