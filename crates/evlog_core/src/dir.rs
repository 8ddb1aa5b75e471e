//! Log directory management.
//!
//! This module handles the file system layout of an event log:
//!
//! ```text
//! <log_dir>/
//! ├─ events.000001.jsonl.zst   # Segment (sealed or latest)
//! ├─ events.000001.meta.json   # Segment sidecar metadata
//! ├─ latest                    # Name of the segment open for append
//! ├─ events.lock               # Advisory lock file
//! └─ markers/
//!    └─ <channel>.json         # Consumer marker per channel
//! ```
//!
//! Small state files (sidecars, the latest pointer, markers) are replaced
//! with a write-then-rename sequence so readers never see a torn update.

use crate::error::CoreResult;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// File names within the log directory.
const LATEST_FILE: &str = "latest";
const LOCK_FILE: &str = "events.lock";
const MARKERS_DIR: &str = "markers";
/// Suffix for temporary files used by atomic writes.
const TEMP_SUFFIX: &str = ".tmp";

/// Paths of an event log directory.
#[derive(Debug, Clone)]
pub struct LogDir {
    /// Root directory path.
    path: PathBuf,
}

impl LogDir {
    /// Creates a handle for `path` without touching the file system.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates the log directory and its markers subdirectory.
    pub fn create_all(&self) -> CoreResult<()> {
        fs::create_dir_all(&self.path)?;
        fs::create_dir_all(self.markers_dir())?;
        Ok(())
    }

    /// Returns the path to the log directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the latest-segment pointer.
    #[must_use]
    pub fn latest_path(&self) -> PathBuf {
        self.path.join(LATEST_FILE)
    }

    /// Returns the path to the lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.path.join(LOCK_FILE)
    }

    /// Returns the path to the markers directory.
    #[must_use]
    pub fn markers_dir(&self) -> PathBuf {
        self.path.join(MARKERS_DIR)
    }

    /// Returns the path of a file directly inside the log directory.
    #[must_use]
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

/// Reads a whole file, returning `None` if it does not exist.
pub fn read_optional(path: &Path) -> CoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replaces `path` with `data` atomically.
///
/// Uses write-then-rename for crash safety:
/// 1. Write to a temporary file next to the target
/// 2. Sync the temporary file to disk
/// 3. Rename it over the target
/// 4. Fsync the parent directory so the rename is durable
pub fn write_atomic(path: &Path, data: &[u8]) -> CoreResult<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(TEMP_SUFFIX);
    let temp_path = PathBuf::from(temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    if let Some(parent) = path.parent() {
        sync_directory(parent)?;
    }

    Ok(())
}

/// Returns true if `name` is a leftover of [`write_atomic`].
#[must_use]
pub fn is_temp_file(name: &str) -> bool {
    name.ends_with(TEMP_SUFFIX)
}

/// Syncs a directory so that entry creations and renames are durable.
///
/// On Windows, directory fsync is not supported in the same way as Unix.
/// NTFS journaling covers metadata durability, so the call is skipped.
#[cfg(unix)]
pub fn sync_directory(dir: &Path) -> CoreResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

/// Syncs a directory (no-op on this platform).
#[cfg(not(unix))]
pub fn sync_directory(_dir: &Path) -> CoreResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_all_makes_markers_dir() {
        let temp = tempdir().unwrap();
        let dir = LogDir::new(temp.path().join("log"));

        dir.create_all().unwrap();
        assert!(dir.path().is_dir());
        assert!(dir.markers_dir().is_dir());

        // Idempotent
        dir.create_all().unwrap();
    }

    #[test]
    fn paths_are_correct() {
        let temp = tempdir().unwrap();
        let dir = LogDir::new(temp.path());

        assert_eq!(dir.latest_path(), temp.path().join("latest"));
        assert_eq!(dir.lock_path(), temp.path().join("events.lock"));
        assert_eq!(dir.markers_dir(), temp.path().join("markers"));
    }

    #[test]
    fn write_atomic_replaces_content() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state.json");

        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"two");
        assert!(!temp.path().join("state.json.tmp").exists());
    }

    #[test]
    fn read_optional_missing_is_none() {
        let temp = tempdir().unwrap();
        assert!(read_optional(&temp.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn temp_file_detection() {
        assert!(is_temp_file("inbox.json.tmp"));
        assert!(!is_temp_file("inbox.json"));
    }
}
