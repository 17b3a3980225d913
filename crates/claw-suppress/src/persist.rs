//! JSON snapshot files for [`MemoryStore`](crate::store::MemoryStore).
//!
//! Each collection lives in its own `<name>.json` file under a state
//! directory. Writes go to a temporary file that is then renamed over the
//! old snapshot, so a crash never leaves a truncated file behind.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::Result;

/// Writes and reads JSON snapshots in one directory.
#[derive(Debug)]
pub struct JsonSnapshots {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonSnapshots {
    /// Opens `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `SuppressError::Io` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// The snapshot directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Loads snapshot `name`, or the default value if no snapshot exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load<T>(&self, name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path(name);
        if !path.exists() {
            return Ok(T::default());
        }
        let bytes = fs::read(&path)?;
        let value = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), "loaded snapshot");
        Ok(value)
    }

    /// Replaces snapshot `name` with the JSON produced by `render`.
    ///
    /// `render` runs while the write lock is held, so concurrent savers of the
    /// same collection land on disk in the order they rendered.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub fn save_with<T, F>(&self, name: &str, render: F) -> Result<()>
    where
        T: Serialize,
        F: FnOnce() -> T,
    {
        let _guard = self.write_lock.lock();
        let bytes = serde_json::to_vec_pretty(&render())?;

        let path = self.path(name);
        let tmp = self.dir.join(format!(".{name}.json.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_snapshot_loads_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshots = JsonSnapshots::open(dir.path()).unwrap();
        let loaded: Vec<String> = snapshots.load("silences").unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshots = JsonSnapshots::open(dir.path().join("nested")).unwrap();
        snapshots
            .save_with("names", || vec!["a".to_string(), "b".to_string()])
            .unwrap();

        let reopened = JsonSnapshots::open(dir.path().join("nested")).unwrap();
        let loaded: Vec<String> = reopened.load("names").unwrap();
        assert_eq!(loaded, vec!["a", "b"]);
        assert!(!dir.path().join("nested/.names.json.tmp").exists());
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("names.json"), b"{not json").unwrap();
        let snapshots = JsonSnapshots::open(dir.path()).unwrap();
        assert!(snapshots.load::<Vec<String>>("names").is_err());
    }
}
