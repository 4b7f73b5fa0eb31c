//! # ObjectsDB Engine
//!
//! The durable object store underneath an ObjectsDB session.
//!
//! This crate provides:
//! - [`StorageBackend`] byte stores ([`FileBackend`], [`InMemoryBackend`])
//! - a checksummed record log with crash recovery
//! - [`ObjectEngine`]: single-writer transactions, object persist/fetch/delete
//!   by engine-assigned [`ObjectId`], lazy per-kind cursors, and log
//!   compaction
//!
//! The engine knows nothing about entity types; payloads are opaque bytes
//! tagged with a key, a kind and a root flag.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod dir;
mod engine;
mod error;
mod file;
mod memory;
mod record;
mod replay;
mod types;

pub use backend::StorageBackend;
pub use dir::{log_path, StoreDir};
pub use engine::{CompactStats, EngineConfig, ObjectCursor, ObjectEngine};
pub use error::{EngineError, EngineResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use record::{Record, RecordIter, RecordType, RECORD_MAGIC, RECORD_VERSION};
pub use replay::{replay, Location, Replay};
pub use types::{ObjectId, ObjectMeta, SequenceNumber, StoredObject};
