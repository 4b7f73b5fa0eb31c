//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{EngineError, EngineResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A storage backend writing the record log to a single file.
///
/// Reads seek on a cloned handle so that `read_at` can stay `&self`.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: File,
    size: u64,
}

impl FileBackend {
    /// Opens or creates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> EngineResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
        })
    }

    /// Opens an existing file for reading only.
    ///
    /// Writes through the returned backend fail with an I/O error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    pub fn open_read_only(path: &Path) -> EngineResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
        })
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> EngineResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if end > self.size {
            return Err(EngineError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut reader = self.file.try_clone()?;
        reader.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        reader.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> EngineResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> EngineResult<()> {
        self.file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> EngineResult<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> EngineResult<u64> {
        Ok(self.size)
    }

    fn truncate(&mut self, new_size: u64) -> EngineResult<()> {
        if new_size > self.size {
            return Err(EngineError::invalid_argument(format!(
                "cannot truncate {} to {new_size}, file holds {} bytes",
                self.path.display(),
                self.size
            )));
        }
        self.file.set_len(new_size)?;
        self.file.sync_all()?;
        self.size = new_size;
        Ok(())
    }
}
