//! Error types for the object engine.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the object engine and its storage backends.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of a backend.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// The record log is malformed.
    #[error("log corruption at offset {offset}: {message}")]
    Corruption {
        /// Offset of the offending record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A record checksum did not match its contents.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the offending record.
        offset: u64,
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed over the record.
        actual: u32,
    },

    /// No live object has the given identifier.
    #[error("object not found: {0}")]
    ObjectNotFound(u64),

    /// Another handle holds the store directory.
    #[error("store locked: another session has exclusive access")]
    StoreLocked,

    /// The store directory is missing and creation was not requested.
    #[error("store directory does not exist: {0}")]
    MissingStore(String),

    /// A write was attempted without an open transaction.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// `begin` was called while a transaction is already open.
    #[error("a transaction is already active")]
    TransactionActive,

    /// The engine has been closed.
    #[error("engine is closed")]
    Closed,

    /// The log was compacted after the cursor was opened.
    #[error("cursor invalidated: the record log was compacted")]
    CursorInvalidated,

    /// An argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl EngineError {
    /// Creates a corruption error.
    pub fn corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::Corruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns true if the error means the log ends in a torn or partial record.
    ///
    /// Recovery treats these as the end of the usable log.
    #[must_use]
    pub fn is_torn_tail(&self) -> bool {
        matches!(
            self,
            Self::ReadPastEnd { .. } | Self::Corruption { .. } | Self::ChecksumMismatch { .. }
        )
    }
}
