//! Bounded write-back cache of resident entities.
//!
//! Entries are kept in least-recently-used order. Writes are deferred: a
//! dirty entry reaches the store only when it is evicted or the cache is
//! flushed. Eviction always writes back before dropping, so a change made
//! while resident is never lost.
//!
//! Callers may still hold a handle to an entry after it leaves the cache.
//! Such entries are remembered weakly as detached: flushes keep writing them
//! back, and a later lookup of the key brings the same cell back instead of
//! materializing a second copy.

use crate::cell::Resident;
use crate::entity::{EntityKey, Kind};
use crate::error::{CoreError, CoreResult};
use crate::index::KeyIndex;
use crate::progress::Progress;
use lru::LruCache;
use objectsdb_engine::{ObjectEngine, ObjectMeta};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Destination of write-backs: the open transaction plus the index that
/// records the identifiers the engine hands out.
pub(crate) struct WriteBack<'a> {
    pub(crate) engine: &'a mut ObjectEngine,
    pub(crate) index: &'a mut KeyIndex,
}

impl WriteBack<'_> {
    /// Persists `entry` if it is dirty. Returns true if it was written.
    fn write(&mut self, entry: &dyn Resident) -> CoreResult<bool> {
        let Some(bytes) = entry.take_dirty()? else {
            return Ok(false);
        };
        let key = entry.key();
        let Some(oid) = self.index.backing_id(key) else {
            entry.mark_dirty();
            return Err(CoreError::inconsistent(key, "resident entity has no index entry"));
        };

        let meta = ObjectMeta {
            key: key.as_u64(),
            kind: entry.kind().as_str().to_owned(),
            root: entry.root(),
        };
        match self.engine.persist(oid, meta, bytes) {
            Ok(assigned) => {
                self.index.bind(key, assigned);
                trace!(%key, oid = %assigned, "wrote back entity");
                Ok(true)
            }
            Err(e) => {
                entry.mark_dirty();
                Err(e.into())
            }
        }
    }
}

/// LRU cache of resident entities keyed by entity key.
pub(crate) struct EntityCache {
    entries: LruCache<EntityKey, Arc<dyn Resident>>,
    detached: HashMap<EntityKey, Weak<dyn Resident>>,
}

impl EntityCache {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            detached: HashMap::new(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Inserts or refreshes an entry and marks it most recently used.
    ///
    /// When a new key would exceed capacity, the least recently used entry
    /// is written back and then dropped. If the write-back fails the victim
    /// stays resident, the new entry is not added, and the error is returned.
    pub(crate) fn put(&mut self, key: EntityKey, entry: Arc<dyn Resident>, sink: &mut WriteBack<'_>) -> CoreResult<()> {
        if !self.entries.contains(&key) && self.entries.len() >= self.capacity() {
            if let Some((victim_key, victim)) = self.entries.peek_lru() {
                let (victim_key, victim) = (*victim_key, Arc::clone(victim));
                sink.write(victim.as_ref())?;
                self.entries.pop(&victim_key);
                self.detach(victim_key, &victim);
                trace!(key = %victim_key, "evicted entity");
            }
        }
        self.detached.remove(&key);
        self.entries.put(key, entry);
        Ok(())
    }

    /// Inserts every entry, evicting as needed.
    pub(crate) fn put_all(
        &mut self,
        entries: impl IntoIterator<Item = (EntityKey, Arc<dyn Resident>)>,
        sink: &mut WriteBack<'_>,
    ) -> CoreResult<()> {
        for (key, entry) in entries {
            self.put(key, entry, sink)?;
        }
        Ok(())
    }

    /// Looks up an entry, marking it most recently used.
    pub(crate) fn get(&mut self, key: EntityKey) -> Option<Arc<dyn Resident>> {
        self.entries.get(&key).cloned()
    }

    pub(crate) fn contains(&self, key: EntityKey) -> bool {
        self.entries.contains(&key)
    }

    /// Returns the detached cell for `key` if a caller still holds it.
    ///
    /// The cell stays tracked until [`EntityCache::put`] makes it resident
    /// again, so a failed re-admission cannot drop pending writes.
    pub(crate) fn detached(&self, key: EntityKey) -> Option<Arc<dyn Resident>> {
        self.detached.get(&key)?.upgrade()
    }

    /// Remembers `entry` weakly if anyone besides `entry` itself holds it.
    fn detach(&mut self, key: EntityKey, entry: &Arc<dyn Resident>) {
        if Arc::strong_count(entry) > 1 {
            self.detached.insert(key, Arc::downgrade(entry));
        }
    }

    /// Number of detached cells still referenced by callers.
    pub(crate) fn detached_len(&self) -> usize {
        self.detached.values().filter(|w| w.strong_count() > 0).count()
    }

    /// Drops an entry without writing it back and returns its kind.
    ///
    /// Detached cells for the key are forgotten too.
    pub(crate) fn evict(&mut self, key: EntityKey) -> Option<Kind> {
        let detached = self.detached.remove(&key).and_then(|w| w.upgrade());
        self.entries
            .pop(&key)
            .or(detached)
            .map(|entry| entry.kind().clone())
    }

    /// Writes every dirty entry back, resident and detached, in key order.
    ///
    /// With `clear_after`, written-back entries are dropped from memory.
    /// Cancellation stops between entries; entries already handled stay
    /// handled. Returns the number of entries written.
    pub(crate) fn flush(&mut self, sink: &mut WriteBack<'_>, progress: &dyn Progress, clear_after: bool) -> CoreResult<usize> {
        self.detached.retain(|_, w| w.strong_count() > 0);
        let mut pending: Vec<(EntityKey, Arc<dyn Resident>)> = self
            .entries
            .iter()
            .map(|(key, entry)| (*key, Arc::clone(entry)))
            .chain(
                self.detached
                    .iter()
                    .filter_map(|(key, w)| w.upgrade().map(|entry| (*key, entry))),
            )
            .collect();
        pending.sort_by_key(|(key, _)| *key);

        let mut written = 0;
        for (key, entry) in pending {
            if progress.is_canceled() {
                break;
            }
            if sink.write(entry.as_ref())? {
                written += 1;
            }
            if clear_after {
                self.entries.pop(&key);
            }
            progress.advance(1);
        }
        Ok(written)
    }

    /// Drops every entry without writing anything back.
    ///
    /// Entries callers still hold become detached; call [`EntityCache::flush`]
    /// first so nothing dirty is dropped.
    pub(crate) fn clear(&mut self) {
        let drained: Vec<(EntityKey, Arc<dyn Resident>)> = std::iter::from_fn(|| self.entries.pop_lru()).collect();
        for (key, entry) in drained {
            self.detach(key, &entry);
        }
    }

    /// Drops everything, detached cells included.
    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.detached.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::AccessBarrier;
    use crate::cell::EntityCell;
    use crate::entity::{Entity, EntityHeader};
    use crate::progress::{CancelFlag, NoProgress};
    use objectsdb_engine::ObjectId;
    use serde::{Deserialize, Serialize};

    const PSM: Kind = Kind::new("SpectrumMatch");

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Psm {
        header: EntityHeader,
        score: u32,
    }

    impl Entity for Psm {
        fn header(&self) -> &EntityHeader {
            &self.header
        }
        fn header_mut(&mut self) -> &mut EntityHeader {
            &mut self.header
        }
    }

    struct Fixture {
        engine: ObjectEngine,
        index: KeyIndex,
        barrier: Arc<AccessBarrier>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut engine = ObjectEngine::open_in_memory().unwrap();
            engine.begin().unwrap();
            Self {
                engine,
                index: KeyIndex::new(),
                barrier: Arc::new(AccessBarrier::new()),
            }
        }

        fn cell(&mut self, key: u64, score: u32) -> Arc<EntityCell<Psm>> {
            let key = EntityKey::new(key);
            self.index.insert_new(key, &PSM);
            let value = Psm {
                header: EntityHeader { key, root: true },
                score,
            };
            Arc::new(EntityCell::new(key, PSM, value, Arc::clone(&self.barrier), true))
        }

        fn sink(&mut self) -> WriteBack<'_> {
            WriteBack {
                engine: &mut self.engine,
                index: &mut self.index,
            }
        }
    }

    #[test]
    fn eviction_writes_back_lru_entry() {
        let mut fx = Fixture::new();
        let mut cache = EntityCache::new(2);

        for (k, score) in [(1, 10), (2, 20), (3, 30)] {
            let cell = fx.cell(k, score);
            cache.put(EntityKey::new(k), cell, &mut fx.sink()).unwrap();
        }

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(EntityKey::new(1)));
        let oid = fx.index.backing_id(EntityKey::new(1)).unwrap();
        assert!(oid.is_set());
        assert!(fx.engine.fetch(oid).is_ok());
        assert_eq!(fx.index.backing_id(EntityKey::new(2)), Some(ObjectId::UNSET));
    }

    #[test]
    fn get_refreshes_recency() {
        let mut fx = Fixture::new();
        let mut cache = EntityCache::new(2);
        let a = fx.cell(1, 1);
        let b = fx.cell(2, 2);
        let c = fx.cell(3, 3);
        cache.put(EntityKey::new(1), a, &mut fx.sink()).unwrap();
        cache.put(EntityKey::new(2), b, &mut fx.sink()).unwrap();

        assert!(cache.get(EntityKey::new(1)).is_some());
        cache.put(EntityKey::new(3), c, &mut fx.sink()).unwrap();

        assert!(cache.contains(EntityKey::new(1)));
        assert!(!cache.contains(EntityKey::new(2)));
    }

    #[test]
    fn refresh_does_not_evict() {
        let mut fx = Fixture::new();
        let mut cache = EntityCache::new(1);
        let a = fx.cell(1, 1);
        cache.put(EntityKey::new(1), a.clone(), &mut fx.sink()).unwrap();
        cache.put(EntityKey::new(1), a, &mut fx.sink()).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(fx.engine.object_count(), 0);
    }

    #[test]
    fn failed_write_back_keeps_victim() {
        let mut fx = Fixture::new();
        let mut cache = EntityCache::new(1);
        let a = fx.cell(1, 1);
        cache.put(EntityKey::new(1), a.clone(), &mut fx.sink()).unwrap();
        fx.engine.rollback().unwrap();

        let b = fx.cell(2, 2);
        assert!(cache.put(EntityKey::new(2), b, &mut fx.sink()).is_err());
        assert!(cache.contains(EntityKey::new(1)));
        assert!(!cache.contains(EntityKey::new(2)));
        assert!(a.is_dirty());
    }

    #[test]
    fn flush_writes_dirty_only() {
        let mut fx = Fixture::new();
        let mut cache = EntityCache::new(10);
        let a = fx.cell(1, 1);
        let b = fx.cell(2, 2);
        cache.put(EntityKey::new(1), a.clone(), &mut fx.sink()).unwrap();
        cache.put(EntityKey::new(2), b, &mut fx.sink()).unwrap();

        assert_eq!(cache.flush(&mut fx.sink(), &NoProgress, false).unwrap(), 2);
        assert_eq!(cache.flush(&mut fx.sink(), &NoProgress, false).unwrap(), 0);

        a.write(|p| p.score = 99);
        assert_eq!(cache.flush(&mut fx.sink(), &NoProgress, false).unwrap(), 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn flush_with_clear_drops_entries() {
        let mut fx = Fixture::new();
        let mut cache = EntityCache::new(10);
        for k in 1..=3 {
            let cell = fx.cell(k, 0);
            cache.put(EntityKey::new(k), cell, &mut fx.sink()).unwrap();
        }

        cache.flush(&mut fx.sink(), &NoProgress, true).unwrap();
        assert_eq!(cache.len(), 0);
        assert_eq!(fx.engine.object_count(), 3);
    }

    #[test]
    fn canceled_flush_stops_early() {
        let mut fx = Fixture::new();
        let mut cache = EntityCache::new(10);
        for k in 1..=4 {
            let cell = fx.cell(k, 0);
            cache.put(EntityKey::new(k), cell, &mut fx.sink()).unwrap();
        }

        let flag = CancelFlag::cancel_after(2);
        let written = cache.flush(&mut fx.sink(), &flag, false).unwrap();
        assert_eq!(written, 2);
        assert_eq!(fx.engine.object_count(), 2);
    }

    #[test]
    fn held_handle_survives_eviction() {
        let mut fx = Fixture::new();
        let mut cache = EntityCache::new(1);
        let held = fx.cell(1, 1);
        cache.put(EntityKey::new(1), held.clone(), &mut fx.sink()).unwrap();
        let other = fx.cell(2, 2);
        cache.put(EntityKey::new(2), other, &mut fx.sink()).unwrap();
        assert!(!cache.contains(EntityKey::new(1)));
        assert_eq!(cache.detached_len(), 1);

        held.write(|p| p.score = 77);
        assert_eq!(cache.flush(&mut fx.sink(), &NoProgress, false).unwrap(), 2);
        assert!(!held.is_dirty());

        let back = cache.detached(EntityKey::new(1)).unwrap();
        let typed = back.into_any().downcast::<EntityCell<Psm>>().unwrap();
        assert!(Arc::ptr_eq(&typed, &held));
    }

    #[test]
    fn failed_readmission_keeps_cell_detached() {
        let mut fx = Fixture::new();
        let mut cache = EntityCache::new(1);
        let held = fx.cell(1, 1);
        cache.put(EntityKey::new(1), held.clone(), &mut fx.sink()).unwrap();
        let other = fx.cell(2, 2);
        cache.put(EntityKey::new(2), other.clone(), &mut fx.sink()).unwrap();
        other.write(|p| p.score = 3);
        fx.engine.rollback().unwrap();

        let back = cache.detached(EntityKey::new(1)).unwrap();
        assert!(cache.put(EntityKey::new(1), back, &mut fx.sink()).is_err());
        assert!(cache.contains(EntityKey::new(2)));
        assert_eq!(cache.detached_len(), 1);

        held.write(|p| p.score = 88);
        fx.engine.begin().unwrap();
        fx.index.bind(EntityKey::new(1), ObjectId::UNSET);
        fx.index.bind(EntityKey::new(2), ObjectId::UNSET);
        assert_eq!(cache.flush(&mut fx.sink(), &NoProgress, false).unwrap(), 2);
        assert!(!held.is_dirty());
    }

    #[test]
    fn readmission_stops_tracking_detached_cell() {
        let mut fx = Fixture::new();
        let mut cache = EntityCache::new(1);
        let held = fx.cell(1, 1);
        cache.put(EntityKey::new(1), held.clone(), &mut fx.sink()).unwrap();
        let other = fx.cell(2, 2);
        cache.put(EntityKey::new(2), other, &mut fx.sink()).unwrap();

        let back = cache.detached(EntityKey::new(1)).unwrap();
        cache.put(EntityKey::new(1), back, &mut fx.sink()).unwrap();
        assert!(cache.contains(EntityKey::new(1)));
        assert!(cache.detached(EntityKey::new(1)).is_none());
    }

    #[test]
    fn unreferenced_victim_is_not_detached() {
        let mut fx = Fixture::new();
        let mut cache = EntityCache::new(1);
        let a = fx.cell(1, 1);
        cache.put(EntityKey::new(1), a, &mut fx.sink()).unwrap();
        let b = fx.cell(2, 2);
        cache.put(EntityKey::new(2), b, &mut fx.sink()).unwrap();

        assert_eq!(cache.detached_len(), 0);
        assert!(cache.detached(EntityKey::new(1)).is_none());
    }

    #[test]
    fn clear_keeps_held_cells_reachable() {
        let mut fx = Fixture::new();
        let mut cache = EntityCache::new(4);
        let held = fx.cell(1, 1);
        let dropped = fx.cell(2, 2);
        cache.put(EntityKey::new(1), held.clone(), &mut fx.sink()).unwrap();
        cache.put(EntityKey::new(2), dropped, &mut fx.sink()).unwrap();

        cache.clear();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.detached_len(), 1);

        cache.reset();
        assert_eq!(cache.detached_len(), 0);
    }

    #[test]
    fn evict_returns_kind_without_writing() {
        let mut fx = Fixture::new();
        let mut cache = EntityCache::new(4);
        let a = fx.cell(1, 1);
        cache.put(EntityKey::new(1), a, &mut fx.sink()).unwrap();

        assert_eq!(cache.evict(EntityKey::new(1)), Some(PSM));
        assert_eq!(cache.evict(EntityKey::new(1)), None);
        assert_eq!(fx.engine.object_count(), 0);
    }
}
