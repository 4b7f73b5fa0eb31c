//! Resident entity cells.

use crate::barrier::AccessBarrier;
use crate::codec;
use crate::entity::{Entity, EntityKey, Kind};
use crate::error::CoreResult;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared handle to a resident entity.
pub type Handle<E> = Arc<EntityCell<E>>;

/// The in-memory home of one entity while it is resident in a session.
///
/// Every field access goes through [`EntityCell::read`] or
/// [`EntityCell::write`], which hold an access ticket for the duration of
/// the closure so that commits never observe a half-applied change. Writes
/// mark the cell dirty; the cache writes dirty cells back to the store.
///
/// The closures must not call into the session: a commit waiting for the
/// ticket would never be able to finish.
pub struct EntityCell<E> {
    key: EntityKey,
    kind: Kind,
    barrier: Arc<AccessBarrier>,
    value: RwLock<E>,
    dirty: AtomicBool,
}

impl<E: Entity> EntityCell<E> {
    pub(crate) fn new(key: EntityKey, kind: Kind, value: E, barrier: Arc<AccessBarrier>, dirty: bool) -> Self {
        Self {
            key,
            kind,
            barrier,
            value: RwLock::new(value),
            dirty: AtomicBool::new(dirty),
        }
    }

    /// Returns the entity key.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        self.key
    }

    /// Returns the kind the entity was stored under.
    #[must_use]
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Runs `f` with shared access to the entity.
    pub fn read<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        let _ticket = self.barrier.acquire();
        let guard = self.value.read();
        f(&guard)
    }

    /// Runs `f` with exclusive access to the entity and marks it dirty.
    pub fn write<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        let _ticket = self.barrier.acquire();
        let mut guard = self.value.write();
        let out = f(&mut guard);
        self.dirty.store(true, Ordering::Release);
        out
    }

    /// Returns a copy of the entity.
    #[must_use]
    pub fn snapshot(&self) -> E
    where
        E: Clone,
    {
        self.read(E::clone)
    }

    /// Returns true if the entity has changes not yet written to the store.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

impl<E> fmt::Debug for EntityCell<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCell")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("dirty", &self.dirty.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Type-erased view of a cell, as held by the cache.
pub(crate) trait Resident: Send + Sync {
    fn key(&self) -> EntityKey;

    fn kind(&self) -> &Kind;

    fn root(&self) -> bool;

    /// Encodes the entity if it is dirty and clears the flag.
    ///
    /// Runs under the cell's read lock, so no write can slip in between the
    /// encode and the flag reset.
    fn take_dirty(&self) -> CoreResult<Option<Vec<u8>>>;

    /// Sets the dirty flag again after a failed write-back.
    fn mark_dirty(&self);

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: Entity> Resident for EntityCell<E> {
    fn key(&self) -> EntityKey {
        self.key
    }

    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn root(&self) -> bool {
        self.value.read().is_root()
    }

    fn take_dirty(&self) -> CoreResult<Option<Vec<u8>>> {
        let guard = self.value.read();
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(None);
        }
        match codec::encode(self.key, &*guard) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) => {
                self.dirty.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
