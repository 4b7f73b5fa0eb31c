//! # ObjectsDB Core
//!
//! Entity persistence on top of [`objectsdb_engine`].
//!
//! This crate provides:
//! - the [`Entity`] identity contract and caller-assigned [`EntityKey`]s
//! - [`Session`]: insert, retrieve, remove, count and commit entities by key
//! - a bounded write-back cache that flushes before it evicts
//! - [`AccessBarrier`]: field accesses drain before every commit
//! - [`EntityIter`]: lazy iteration over stored entities of one [`Kind`]
//!
//! Resident entities are reached through [`Handle`]s. All field access goes
//! through [`EntityCell::read`] and [`EntityCell::write`]:
//!
//! ```rust,ignore
//! let handle = session.retrieve::<Protein>(key)?.expect("stored");
//! handle.write(|p| p.validated = true);
//! session.commit()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod barrier;
mod cache;
mod cell;
mod codec;
mod config;
mod entity;
mod error;
mod index;
mod iterator;
mod progress;
mod registry;
mod session;

pub use barrier::{AccessBarrier, AccessTicket};
pub use cell::{EntityCell, Handle};
pub use config::{Config, DEFAULT_CACHE_CAPACITY};
pub use entity::{Entity, EntityHeader, EntityKey, Kind};
pub use error::{CoreError, CoreResult};
pub use index::KeyIndex;
pub use iterator::EntityIter;
pub use progress::{CancelFlag, NoProgress, Progress};
pub use registry::KindRegistry;
pub use session::Session;

pub use objectsdb_engine::{CompactStats, ObjectId, SequenceNumber};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
