//! Queue depth probe.
//!
//! Counts queue files under each Postfix queue directory, descending into
//! the hashed subdirectories (`deferred/A/...`).

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

/// Queues exported as `queue_size{queue=...}`, in render order.
pub const QUEUES: [&str; 6] = ["incoming", "maildrop", "active", "deferred", "hold", "corrupt"];

/// Message counts for every readable queue under `queue_root`.
///
/// Queues whose directory is missing or unreadable are left out.
pub fn queue_depths(queue_root: &Path) -> Vec<(&'static str, u64)> {
    QUEUES
        .iter()
        .filter_map(|queue| {
            let dir = queue_root.join(queue);
            match count_files(&dir) {
                Ok(n) => Some((*queue, n)),
                Err(e) => {
                    debug!(queue, path = %dir.display(), error = %e, "queue not readable");
                    None
                }
            }
        })
        .collect()
}

fn count_files(dir: &Path) -> io::Result<u64> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            // Files vanish while the queue manager moves them.
            Err(_) => continue,
        };
        match entry.file_type() {
            Ok(t) if t.is_dir() => count += count_files(&entry.path()).unwrap_or(0),
            Ok(t) if t.is_file() => count += 1,
            _ => {}
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_hashed_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for queue in QUEUES {
            fs::create_dir(root.join(queue)).unwrap();
        }
        fs::create_dir_all(root.join("deferred/A")).unwrap();
        fs::create_dir_all(root.join("deferred/B/C")).unwrap();
        fs::write(root.join("deferred/A/A1B2C3"), "").unwrap();
        fs::write(root.join("deferred/A/A4B5C6"), "").unwrap();
        fs::write(root.join("deferred/B/C/BC7788"), "").unwrap();
        fs::write(root.join("active/D00001"), "").unwrap();

        let depths = queue_depths(root);
        assert_eq!(
            depths,
            vec![
                ("incoming", 0),
                ("maildrop", 0),
                ("active", 1),
                ("deferred", 3),
                ("hold", 0),
                ("corrupt", 0),
            ]
        );
    }

    #[test]
    fn test_missing_queues_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("hold")).unwrap();
        fs::write(dir.path().join("hold/H1"), "").unwrap();

        assert_eq!(queue_depths(dir.path()), vec![("hold", 1)]);
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(queue_depths(&dir.path().join("nope")).is_empty());
    }
}
