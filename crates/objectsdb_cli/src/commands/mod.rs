//! CLI command implementations.

pub mod compact;
pub mod inspect;
pub mod verify;

use objectsdb_engine::{log_path, FileBackend};
use std::path::Path;
use tracing::debug;

/// Opens the record log of the store at `path` without taking the store lock.
pub(crate) fn open_log(path: &Path) -> Result<FileBackend, Box<dyn std::error::Error>> {
    let log = log_path(path);
    if !log.exists() {
        return Err(format!("No store found at {}", path.display()).into());
    }
    debug!(log = %log.display(), "opening record log read-only");
    Ok(FileBackend::open_read_only(&log)?)
}
