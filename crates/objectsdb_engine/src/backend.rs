//! Byte-level storage backend trait.

use crate::error::EngineResult;

/// An append-only byte store holding the engine's record log.
///
/// Backends are opaque: they never interpret the bytes they hold. The engine
/// owns the record format layered on top.
///
/// # Invariants
///
/// - `append` returns the offset the data was written at
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - `sync` makes every appended byte durable
/// - `truncate` only ever shrinks the store
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `ReadPastEnd` if the range is not fully inside the store, or
    /// an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> EngineResult<Vec<u8>>;

    /// Appends data and returns the offset it starts at.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> EngineResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> EngineResult<()>;

    /// Flushes data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> EngineResult<()>;

    /// Returns the current size in bytes, which is where the next append lands.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> EngineResult<u64>;

    /// Discards everything after `new_size`.
    ///
    /// Used to roll back an open transaction and to cut a torn tail during
    /// recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` exceeds the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> EngineResult<()>;
}
