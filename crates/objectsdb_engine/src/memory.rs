//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A storage backend that keeps the record log in memory.
///
/// Clones share the same buffer, which lets tests reopen an engine over the
/// bytes a previous engine wrote.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> EngineResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(EngineError::ReadPastEnd { offset, len, size });
        }
        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> EngineResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn size(&self) -> EngineResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> EngineResult<()> {
        let mut data = self.data.write();
        if new_size > data.len() as u64 {
            return Err(EngineError::invalid_argument(format!(
                "cannot truncate to {new_size}, store holds {} bytes",
                data.len()
            )));
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}
