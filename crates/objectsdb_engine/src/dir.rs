//! Store directory management.
//!
//! One directory holds one store:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK                  # advisory lock, one open engine per directory
//! ├─ objects.log           # record log
//! └─ objects.log.compact   # staging file, only while compacting
//! ```

use crate::error::{EngineError, EngineResult};
use crate::file::FileBackend;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "objects.log";
const STAGING_FILE: &str = "objects.log.compact";

/// Returns the record log path inside a store directory.
#[must_use]
pub fn log_path(store: &Path) -> PathBuf {
    store.join(LOG_FILE)
}

/// An exclusively locked store directory.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    lock_file: File,
}

impl StoreDir {
    /// Opens `path`, creating it when `create_if_missing` is set, and takes
    /// the directory lock.
    ///
    /// # Errors
    ///
    /// Returns `MissingStore` if the directory is absent and may not be
    /// created, `StoreLocked` if another handle holds it, or an I/O error.
    pub fn open(path: &Path, create_if_missing: bool) -> EngineResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(EngineError::MissingStore(path.display().to_string()));
            }
        }
        if !path.is_dir() {
            return Err(EngineError::invalid_argument(format!(
                "store path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::StoreLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the record log path.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        log_path(&self.path)
    }

    /// Returns true if no record log exists yet.
    #[must_use]
    pub fn is_new(&self) -> bool {
        !self.log_path().exists()
    }

    /// Deletes the record log, leaving an empty store behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists and cannot be removed.
    pub fn wipe(&self) -> EngineResult<()> {
        let log = self.log_path();
        if log.exists() {
            fs::remove_file(log)?;
        }
        Ok(())
    }

    /// Replaces the record log with `data` and opens the new log.
    ///
    /// The bytes are synced to a staging file which is then renamed over the
    /// log, so after a crash the directory holds either log in full.
    ///
    /// # Errors
    ///
    /// Returns an error if the staging file cannot be written or renamed.
    /// The old log is untouched then.
    pub fn replace_log(&self, data: &[u8]) -> EngineResult<FileBackend> {
        let staging = self.path.join(STAGING_FILE);
        {
            let mut file = File::create(&staging)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        let log = self.log_path();
        fs::rename(&staging, &log)?;
        FileBackend::open(&log)
    }
}

impl Drop for StoreDir {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StorageBackend;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_directory() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("store");

        let dir = StoreDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert!(dir.is_new());
    }

    #[test]
    fn missing_directory_without_create() {
        let tmp = tempdir().unwrap();
        let err = StoreDir::open(&tmp.path().join("absent"), false).unwrap_err();
        assert!(matches!(err, EngineError::MissingStore(_)));
    }

    #[test]
    fn second_open_is_locked() {
        let tmp = tempdir().unwrap();
        let _first = StoreDir::open(tmp.path(), true).unwrap();
        let err = StoreDir::open(tmp.path(), true).unwrap_err();
        assert!(matches!(err, EngineError::StoreLocked));
    }

    #[test]
    fn lock_released_on_drop() {
        let tmp = tempdir().unwrap();
        drop(StoreDir::open(tmp.path(), true).unwrap());
        assert!(StoreDir::open(tmp.path(), true).is_ok());
    }

    #[test]
    fn wipe_removes_log() {
        let tmp = tempdir().unwrap();
        let dir = StoreDir::open(tmp.path(), true).unwrap();
        fs::write(dir.log_path(), b"old").unwrap();
        assert!(!dir.is_new());

        dir.wipe().unwrap();
        assert!(dir.is_new());
    }

    #[test]
    fn replace_log_swaps_contents() {
        let tmp = tempdir().unwrap();
        let dir = StoreDir::open(tmp.path(), true).unwrap();
        fs::write(dir.log_path(), b"a long superseded log").unwrap();

        let backend = dir.replace_log(b"short").unwrap();
        assert_eq!(backend.size().unwrap(), 5);
        assert_eq!(fs::read(dir.log_path()).unwrap(), b"short");
        assert!(!tmp.path().join(STAGING_FILE).exists());
    }
}
