//! Error types for ObjectsDB sessions.

use crate::entity::{EntityKey, Kind};
use thiserror::Error;

/// Result type for session operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in session operations.
///
/// A key that is not in the store is not an error: retrieval returns `None`
/// and removal is a no-op. Cancellation is not an error either; batch
/// operations return what they completed.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The key is already live in this store.
    #[error("duplicate key: {key}")]
    DuplicateKey {
        /// The rejected key.
        key: EntityKey,
    },

    /// An absent entity was offered for insertion.
    #[error("null entity inserted under key {key}")]
    NullEntity {
        /// The key the insertion targeted.
        key: EntityKey,
    },

    /// The backing engine failed. Propagated unmodified, never retried.
    #[error("store error: {0}")]
    Engine(#[from] objectsdb_engine::EngineError),

    /// An entity could not be encoded or decoded.
    #[error("codec error for key {key}: {message}")]
    Codec {
        /// Key of the entity involved.
        key: EntityKey,
        /// Description of the failure.
        message: String,
    },

    /// A kind was used with a type other than the one it is bound to.
    #[error("kind {kind} is bound to {expected}, not {actual}")]
    KindMismatch {
        /// The kind tag.
        kind: Kind,
        /// Type the kind is registered for.
        expected: &'static str,
        /// Type that was requested.
        actual: &'static str,
    },

    /// Cache and index disagree about a key.
    #[error("inconsistent state for key {key}: {message}")]
    Inconsistent {
        /// The affected key.
        key: EntityKey,
        /// Description of the disagreement.
        message: String,
    },

    /// The session is locked and has no open transaction.
    #[error("session is locked")]
    SessionInactive,

    /// The session has been closed.
    #[error("session is closed")]
    SessionClosed,
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(key: EntityKey, message: impl Into<String>) -> Self {
        Self::Codec {
            key,
            message: message.into(),
        }
    }

    /// Creates an inconsistency error.
    pub fn inconsistent(key: EntityKey, message: impl Into<String>) -> Self {
        Self::Inconsistent {
            key,
            message: message.into(),
        }
    }
}
