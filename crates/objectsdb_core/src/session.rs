//! Store session: the single entry point to a store.

use crate::barrier::AccessBarrier;
use crate::cache::{EntityCache, WriteBack};
use crate::cell::{EntityCell, Handle, Resident};
use crate::codec;
use crate::config::Config;
use crate::entity::{Entity, EntityKey, Kind};
use crate::error::{CoreError, CoreResult};
use crate::index::KeyIndex;
use crate::iterator::EntityIter;
use crate::progress::{NoProgress, Progress};
use crate::registry::KindRegistry;
use objectsdb_engine::{CompactStats, ObjectEngine, ObjectId, SequenceNumber};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An open store.
///
/// `Session` keeps recently used entities resident in a bounded write-back
/// cache and maps caller-assigned keys to the objects of the backing store.
/// Every structural operation runs under one session-wide lock, so
/// operations on the same key are totally ordered. Field access on resident
/// entities goes through [`EntityCell`] and never takes that lock; it is
/// coordinated with commits by the session's [`AccessBarrier`].
///
/// A transaction is always open while the session is active. Changes reach
/// the transaction when entities are evicted or flushed, and become durable
/// on [`Session::commit`].
///
/// ```rust,ignore
/// use objectsdb_core::{Config, Kind, NoProgress, Session};
///
/// const PROTEIN: Kind = Kind::new("Protein");
///
/// let session = Session::open(path, Config::default())?;
/// let handle = session.insert(key, Some(protein), &PROTEIN)?;
/// handle.write(|p| p.score = 0.98);
/// session.commit()?;
/// session.close(false)?;
/// ```
pub struct Session {
    state: Mutex<State>,
    barrier: Arc<AccessBarrier>,
    config: Config,
}

struct State {
    engine: ObjectEngine,
    index: KeyIndex,
    cache: EntityCache,
    registry: KindRegistry,
    /// Insertions since the last commit.
    current_added: usize,
    active: bool,
    closed: bool,
}

/// Outcome of resolving one key.
enum Lookup<E> {
    /// Already resident.
    Resident(Handle<E>),
    /// Materialized from the store or a detached handle; not yet cached.
    Loaded(Handle<E>),
    Missing,
}

/// Forwards progress but never cancels.
///
/// Used where stopping halfway would drop dirty entities.
struct Uncancelable<'a>(&'a dyn Progress);

impl Progress for Uncancelable<'_> {
    fn is_canceled(&self) -> bool {
        false
    }

    fn advance(&self, n: u64) {
        self.0.advance(n);
    }
}

impl Session {
    /// Opens the store in directory `path`.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the store cannot be opened, is locked by
    /// another session, or its objects cannot be enumerated.
    pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let engine = ObjectEngine::open_with_config(path.as_ref(), config.engine_config())?;
        Self::with_engine(engine, config)
    }

    /// Opens a session over a fresh in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the transaction cannot be started.
    pub fn open_in_memory(config: Config) -> CoreResult<Self> {
        Self::with_engine(ObjectEngine::open_in_memory()?, config)
    }

    /// Opens a session over an already opened engine.
    ///
    /// With `load_existing`, the key index is rebuilt from every root object
    /// in the store. Otherwise the index starts empty.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the roots cannot be read or the
    /// transaction cannot be started.
    pub fn with_engine(mut engine: ObjectEngine, config: Config) -> CoreResult<Self> {
        let mut index = KeyIndex::new();
        if config.load_existing {
            let roots = engine.roots()?;
            index.rebuild(
                roots
                    .into_iter()
                    .map(|(oid, meta)| (EntityKey::new(meta.key), oid, Kind::owned(meta.kind))),
            );
        }
        if !engine.is_active() {
            engine.begin()?;
        }
        info!(
            path = ?engine.path(),
            keys = index.len(),
            capacity = config.cache_capacity,
            "session opened"
        );

        Ok(Self {
            state: Mutex::new(State {
                engine,
                index,
                cache: EntityCache::new(config.cache_capacity),
                registry: KindRegistry::new(),
                current_added: 0,
                active: true,
                closed: false,
            }),
            barrier: Arc::new(AccessBarrier::new()),
            config,
        })
    }

    /// Returns the configuration the session was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the barrier shared by all cells of this session.
    ///
    /// Custom accessors that reach entity state without going through
    /// [`EntityCell`] must hold a ticket from it.
    #[must_use]
    pub fn barrier(&self) -> &Arc<AccessBarrier> {
        &self.barrier
    }

    /// Binds `kind` to `E` up front.
    ///
    /// # Errors
    ///
    /// Returns `KindMismatch` if `kind` is already bound to another type.
    pub fn register<E: Entity>(&self, kind: &Kind) -> CoreResult<()> {
        self.state.lock().registry.bind::<E>(kind)
    }

    /// Inserts a new entity under `key`.
    ///
    /// The key and root flag are written into the entity, which becomes
    /// resident and dirty. It reaches the store on eviction or flush.
    ///
    /// # Errors
    ///
    /// Returns `NullEntity` for `None`, `DuplicateKey` if the key is live,
    /// `KindMismatch` if `kind` is bound to another type, or the engine
    /// error of a failed eviction. On error nothing changes.
    pub fn insert<E: Entity>(&self, key: EntityKey, entity: Option<E>, kind: &Kind) -> CoreResult<Handle<E>> {
        let mut state = self.state.lock();
        state.ensure_active()?;
        let mut entity = entity.ok_or(CoreError::NullEntity { key })?;
        if state.index.contains(key) {
            return Err(CoreError::DuplicateKey { key });
        }
        state.registry.bind::<E>(kind)?;

        entity.set_key(key);
        entity.set_root(true);
        let handle = self.new_cell(key, kind, entity);
        state.admit(key, kind, handle.clone())?;
        debug!(%key, %kind, "inserted entity");
        Ok(handle)
    }

    /// Inserts several entities of one kind.
    ///
    /// Every entry is validated before anything changes, so a rejected
    /// batch leaves the session untouched. Progress is reported per entry;
    /// the batch cannot be canceled once validated.
    ///
    /// # Errors
    ///
    /// Returns the first `NullEntity`, `DuplicateKey` (also for keys
    /// repeated within the batch) or `KindMismatch`. An engine error during
    /// eviction stops the batch; entries before it stay inserted.
    pub fn insert_batch<E: Entity>(
        &self,
        entries: impl IntoIterator<Item = (EntityKey, Option<E>)>,
        kind: &Kind,
        progress: &dyn Progress,
    ) -> CoreResult<Vec<Handle<E>>> {
        let mut state = self.state.lock();
        state.ensure_active()?;

        let mut seen = HashSet::new();
        let mut validated = Vec::new();
        for (key, entity) in entries {
            let entity = entity.ok_or(CoreError::NullEntity { key })?;
            if state.index.contains(key) || !seen.insert(key) {
                return Err(CoreError::DuplicateKey { key });
            }
            validated.push((key, entity));
        }
        state.registry.bind::<E>(kind)?;

        let mut handles = Vec::with_capacity(validated.len());
        for (key, mut entity) in validated {
            entity.set_key(key);
            entity.set_root(true);
            let handle = self.new_cell(key, kind, entity);
            state.admit(key, kind, handle.clone())?;
            handles.push(handle);
            progress.advance(1);
        }
        debug!(%kind, count = handles.len(), "inserted entity batch");
        Ok(handles)
    }

    /// Returns the entity stored under `key`, or `None` if the key is not
    /// live.
    ///
    /// # Errors
    ///
    /// Returns `KindMismatch` if the entity's kind is bound to another
    /// type, `Inconsistent` if an unflushed key is missing from the cache,
    /// or an engine or codec error.
    pub fn retrieve<E: Entity>(&self, key: EntityKey) -> CoreResult<Option<Handle<E>>> {
        let mut state = self.state.lock();
        state.ensure_active()?;
        match state.lookup::<E>(key, &self.barrier)? {
            Lookup::Resident(handle) => Ok(Some(handle)),
            Lookup::Loaded(handle) => {
                state.cache_put(key, handle.clone())?;
                debug!(%key, "loaded entity from store");
                Ok(Some(handle))
            }
            Lookup::Missing => Ok(None),
        }
    }

    /// Returns the entities stored under `keys`, in request order.
    ///
    /// Unknown keys are skipped. When `progress` cancels, the entities
    /// resolved so far are returned and stay cached.
    ///
    /// # Errors
    ///
    /// As [`Session::retrieve`].
    pub fn retrieve_batch<E: Entity>(&self, keys: &[EntityKey], progress: &dyn Progress) -> CoreResult<Vec<Handle<E>>> {
        let mut state = self.state.lock();
        state.ensure_active()?;
        state.resolve_many(keys, progress, &self.barrier)
    }

    /// Returns every live entity of `kind`, in ascending key order.
    ///
    /// # Errors
    ///
    /// As [`Session::retrieve`].
    pub fn retrieve_by_kind<E: Entity>(&self, kind: &Kind, progress: &dyn Progress) -> CoreResult<Vec<Handle<E>>> {
        let mut state = self.state.lock();
        state.ensure_active()?;
        state.registry.bind::<E>(kind)?;
        let keys = state.index.keys_of(kind);
        state.resolve_many(&keys, progress, &self.barrier)
    }

    /// Makes the entities under `keys` resident without returning them.
    ///
    /// # Errors
    ///
    /// As [`Session::retrieve`].
    pub fn load<E: Entity>(&self, keys: &[EntityKey], progress: &dyn Progress) -> CoreResult<()> {
        self.retrieve_batch::<E>(keys, progress).map(drop)
    }

    /// Makes every entity of `kind` resident.
    ///
    /// # Errors
    ///
    /// As [`Session::retrieve`].
    pub fn load_by_kind<E: Entity>(&self, kind: &Kind, progress: &dyn Progress) -> CoreResult<()> {
        self.retrieve_by_kind::<E>(kind, progress).map(drop)
    }

    /// Removes the entity under `key` from the cache, the store and the
    /// index. Returns false if the key was not live.
    ///
    /// Handles to the removed entity stay usable but are no longer
    /// connected to the store.
    ///
    /// # Errors
    ///
    /// Returns the engine error of a failed delete; nothing changes then.
    pub fn remove(&self, key: EntityKey) -> CoreResult<bool> {
        let mut state = self.state.lock();
        state.ensure_active()?;
        state.remove_one(key)
    }

    /// Removes several entities. Returns how many were live.
    ///
    /// When `progress` cancels, entities already removed stay removed.
    ///
    /// # Errors
    ///
    /// As [`Session::remove`].
    pub fn remove_batch(&self, keys: &[EntityKey], progress: &dyn Progress) -> CoreResult<usize> {
        let mut state = self.state.lock();
        state.ensure_active()?;
        let mut removed = 0;
        for &key in keys {
            if progress.is_canceled() {
                debug!(removed, "entity removal canceled");
                break;
            }
            if state.remove_one(key)? {
                removed += 1;
            }
            progress.advance(1);
        }
        Ok(removed)
    }

    /// Number of live entities of `kind`.
    #[must_use]
    pub fn count(&self, kind: &Kind) -> usize {
        self.state.lock().index.count(kind)
    }

    /// Returns true if `key` is live, resident or not.
    #[must_use]
    pub fn contains(&self, key: EntityKey) -> bool {
        self.state.lock().index.contains(key)
    }

    /// Returns true if `key` is resident in the cache.
    #[must_use]
    pub fn in_cache(&self, key: EntityKey) -> bool {
        self.state.lock().cache.contains(key)
    }

    /// Live keys of `kind` in ascending order.
    #[must_use]
    pub fn keys_of(&self, kind: &Kind) -> Vec<EntityKey> {
        self.state.lock().index.keys_of(kind)
    }

    /// Kinds with at least one live entity.
    #[must_use]
    pub fn kinds(&self) -> Vec<Kind> {
        self.state.lock().index.kinds()
    }

    /// Copy of the key to backing object map. Unflushed keys map to
    /// [`ObjectId::UNSET`].
    #[must_use]
    pub fn key_map(&self) -> HashMap<EntityKey, ObjectId> {
        self.state.lock().index.snapshot()
    }

    /// Number of entities inserted since the last commit.
    #[must_use]
    pub fn current_added(&self) -> usize {
        self.state.lock().current_added
    }

    /// Number of resident entities.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.state.lock().cache.len()
    }

    /// Returns false while locked or after close.
    #[must_use]
    pub fn is_active(&self) -> bool {
        let state = self.state.lock();
        state.active && !state.closed
    }

    /// Returns true once the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Returns the store directory, `None` for in-memory sessions.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.state.lock().engine.path().map(Path::to_path_buf)
    }

    /// Sequence number of the last commit.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.state.lock().engine.sequence()
    }

    /// Makes every change durable.
    ///
    /// Waits for in-flight field accesses to finish and holds new ones back,
    /// writes dirty resident entities into the transaction, commits it and
    /// opens the next one. Entities stay resident.
    ///
    /// # Errors
    ///
    /// Returns the write-back or engine error. Field access resumes either
    /// way.
    pub fn commit(&self) -> CoreResult<SequenceNumber> {
        let mut guard = self.state.lock();
        guard.ensure_active()?;
        let state = &mut *guard;
        let sequence = self.barrier.drain_and_commit(|| -> CoreResult<SequenceNumber> {
            state.flush(&NoProgress, false)?;
            let sequence = state.engine.commit()?;
            state.engine.begin()?;
            Ok(sequence)
        })?;
        info!(%sequence, added = state.current_added, "committed");
        state.current_added = 0;
        Ok(sequence)
    }

    /// Commits, then rewrites the store so it holds only the current
    /// version of each live entity.
    ///
    /// Entities stay resident and handles stay valid. Iterators opened
    /// before the call yield an engine error for the entities they have not
    /// reached yet.
    ///
    /// # Errors
    ///
    /// Returns the write-back or engine error. If the commit went through
    /// but the rewrite failed, the committed state stays on the old log.
    pub fn compact(&self) -> CoreResult<CompactStats> {
        let mut guard = self.state.lock();
        guard.ensure_active()?;
        let state = &mut *guard;
        self.barrier.drain_and_commit(|| -> CoreResult<CompactStats> {
            state.flush(&NoProgress, false)?;
            state.engine.commit()?;
            state.current_added = 0;
            let compacted = state.engine.compact();
            state.engine.begin()?;
            compacted.map_err(CoreError::from)
        })
    }

    /// Writes dirty resident entities into the open transaction without
    /// committing. Returns the number written.
    ///
    /// # Errors
    ///
    /// Returns the first write-back error.
    pub fn flush_to_store(&self) -> CoreResult<usize> {
        let mut state = self.state.lock();
        state.ensure_active()?;
        let written = state.flush(&NoProgress, false)?;
        debug!(written, "flushed cache");
        Ok(written)
    }

    /// Flushes and empties the cache, commits, and makes the session
    /// inactive until [`Session::unlock`].
    ///
    /// `progress` observes the flush; it cannot cancel it.
    ///
    /// # Errors
    ///
    /// Returns the write-back or engine error; the session stays active
    /// then.
    pub fn lock(&self, progress: &dyn Progress) -> CoreResult<()> {
        let mut guard = self.state.lock();
        guard.ensure_active()?;
        let state = &mut *guard;
        let sequence = self.barrier.drain_and_commit(|| -> CoreResult<SequenceNumber> {
            state.flush(&Uncancelable(progress), false)?;
            state.cache.clear();
            Ok(state.engine.commit()?)
        })?;
        state.active = false;
        state.current_added = 0;
        info!(%sequence, "session locked");
        Ok(())
    }

    /// Opens a new transaction after [`Session::lock`]. A no-op on an
    /// active session.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed`, or the engine error.
    pub fn unlock(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if state.active {
            return Ok(());
        }
        state.engine.begin()?;
        state.active = true;
        info!("session unlocked");
        Ok(())
    }

    /// Commits outstanding changes and releases the store.
    ///
    /// With `clear_index` the key index is emptied as well. Closing twice
    /// is a no-op; every other operation fails with `SessionClosed`.
    ///
    /// # Errors
    ///
    /// Returns the commit or engine error. The session is closed regardless.
    pub fn close(&self, clear_index: bool) -> CoreResult<()> {
        self.state.lock().close(&self.barrier, clear_index)
    }

    /// Iterates over the stored entities of `kind` that satisfy `predicate`.
    ///
    /// Resident changes are flushed first. The iterator reads straight from
    /// the store, bypasses the cache, and does not see entities inserted
    /// after it was created. Yielded values are detached copies.
    ///
    /// # Errors
    ///
    /// Returns `KindMismatch`, or the flush or engine error.
    pub fn iter<E, F>(&self, kind: &Kind, predicate: F) -> CoreResult<EntityIter<E, F>>
    where
        E: Entity,
        F: FnMut(&E) -> bool,
    {
        let mut state = self.state.lock();
        state.ensure_active()?;
        state.registry.bind::<E>(kind)?;
        state.flush(&NoProgress, false)?;
        let cursor = state.engine.query(kind.as_str())?;
        Ok(EntityIter::new(cursor, predicate))
    }

    /// Iterates over every stored entity of `kind`.
    ///
    /// # Errors
    ///
    /// As [`Session::iter`].
    pub fn iter_all<E: Entity>(&self, kind: &Kind) -> CoreResult<EntityIter<E, fn(&E) -> bool>> {
        self.iter::<E, fn(&E) -> bool>(kind, |_| true)
    }

    fn new_cell<E: Entity>(&self, key: EntityKey, kind: &Kind, entity: E) -> Handle<E> {
        Arc::new(EntityCell::new(key, kind.clone(), entity, Arc::clone(&self.barrier), true))
    }
}

impl State {
    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed {
            Err(CoreError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn ensure_active(&self) -> CoreResult<()> {
        self.ensure_open()?;
        if self.active {
            Ok(())
        } else {
            Err(CoreError::SessionInactive)
        }
    }

    fn write_back(&mut self) -> (&mut EntityCache, WriteBack<'_>) {
        let Self { cache, engine, index, .. } = self;
        (cache, WriteBack { engine, index })
    }

    fn cache_put(&mut self, key: EntityKey, entry: Arc<dyn Resident>) -> CoreResult<()> {
        let (cache, mut sink) = self.write_back();
        cache.put(key, entry, &mut sink)
    }

    fn flush(&mut self, progress: &dyn Progress, clear_after: bool) -> CoreResult<usize> {
        let (cache, mut sink) = self.write_back();
        cache.flush(&mut sink, progress, clear_after)
    }

    /// Indexes a new key and makes its cell resident, undoing the index
    /// entry if the cache rejects it.
    fn admit(&mut self, key: EntityKey, kind: &Kind, entry: Arc<dyn Resident>) -> CoreResult<()> {
        self.index.insert_new(key, kind);
        if let Err(e) = self.cache_put(key, entry) {
            self.index.remove(key, kind);
            return Err(e);
        }
        self.current_added += 1;
        Ok(())
    }

    fn typed<E: Entity>(&mut self, entry: Arc<dyn Resident>) -> CoreResult<Handle<E>> {
        let key = entry.key();
        self.registry.bind::<E>(entry.kind())?;
        entry
            .into_any()
            .downcast::<EntityCell<E>>()
            .map_err(|_| CoreError::inconsistent(key, "resident entity has an unexpected type"))
    }

    fn lookup<E: Entity>(&mut self, key: EntityKey, barrier: &Arc<AccessBarrier>) -> CoreResult<Lookup<E>> {
        if let Some(entry) = self.cache.get(key) {
            return self.typed(entry).map(Lookup::Resident);
        }
        if let Some(entry) = self.cache.detached(key) {
            return self.typed(entry).map(Lookup::Loaded);
        }
        let Some(oid) = self.index.backing_id(key) else {
            return Ok(Lookup::Missing);
        };
        if !oid.is_set() {
            return Err(CoreError::inconsistent(key, "unflushed entity is not resident"));
        }

        let object = self.engine.fetch(oid)?;
        if object.meta.key != key.as_u64() {
            return Err(CoreError::inconsistent(
                key,
                format!("{oid} holds key {}", object.meta.key),
            ));
        }
        let kind = Kind::owned(object.meta.kind);
        self.registry.bind::<E>(&kind)?;
        let value: E = codec::decode(key, &object.payload)?;
        let cell = EntityCell::new(key, kind, value, Arc::clone(barrier), false);
        Ok(Lookup::Loaded(Arc::new(cell)))
    }

    fn resolve_many<E: Entity>(
        &mut self,
        keys: &[EntityKey],
        progress: &dyn Progress,
        barrier: &Arc<AccessBarrier>,
    ) -> CoreResult<Vec<Handle<E>>> {
        let mut handles = Vec::with_capacity(keys.len());
        // Cells materialized by this call, so a repeated key shares one cell.
        let mut loaded: Vec<(EntityKey, Arc<dyn Resident>)> = Vec::new();
        let mut seen: HashMap<EntityKey, Handle<E>> = HashMap::new();
        for &key in keys {
            if progress.is_canceled() {
                debug!(resolved = handles.len(), "batch retrieval canceled");
                break;
            }
            if let Some(handle) = seen.get(&key) {
                handles.push(Arc::clone(handle));
                progress.advance(1);
                continue;
            }
            match self.lookup::<E>(key, barrier)? {
                Lookup::Resident(handle) => handles.push(handle),
                Lookup::Loaded(handle) => {
                    let entry: Arc<dyn Resident> = handle.clone();
                    loaded.push((key, entry));
                    seen.insert(key, Arc::clone(&handle));
                    handles.push(handle);
                }
                Lookup::Missing => {}
            }
            progress.advance(1);
        }

        if !loaded.is_empty() {
            debug!(count = loaded.len(), "loaded entities from store");
            let (cache, mut sink) = self.write_back();
            cache.put_all(loaded, &mut sink)?;
        }
        Ok(handles)
    }

    fn remove_one(&mut self, key: EntityKey) -> CoreResult<bool> {
        let Some(oid) = self.index.backing_id(key) else {
            return Ok(false);
        };
        let stored_kind = if oid.is_set() {
            Some(Kind::owned(self.engine.delete(oid)?.meta.kind))
        } else {
            None
        };
        let cached_kind = self.cache.evict(key);
        let kind = stored_kind
            .or(cached_kind)
            .or_else(|| self.index.kind_of(key).cloned());
        if let Some(kind) = kind {
            self.index.remove(key, &kind);
        }
        debug!(%key, %oid, "removed entity");
        Ok(true)
    }

    fn close(&mut self, barrier: &AccessBarrier, clear_index: bool) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        let committed = if self.active {
            barrier.drain_and_commit(|| -> CoreResult<()> {
                self.flush(&NoProgress, false)?;
                self.cache.clear();
                self.engine.commit()?;
                Ok(())
            })
        } else {
            Ok(())
        };
        if let Err(e) = &committed {
            warn!(error = %e, "final commit failed, rolling back");
        }
        // The engine rolls back whatever transaction is still open.
        let released = self.engine.close().map_err(CoreError::from);

        self.cache.reset();
        self.active = false;
        self.closed = true;
        self.current_added = 0;
        if clear_index {
            self.index.clear();
        }
        info!(clear_index, "session closed");
        committed.and(released)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Session")
            .field("path", &state.engine.path())
            .field("keys", &state.index.len())
            .field("resident", &state.cache.len())
            .field("detached", &state.cache.detached_len())
            .field("capacity", &state.cache.capacity())
            .field("active", &state.active)
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.closed {
            return;
        }
        if let Err(e) = state.close(&self.barrier, false) {
            warn!(error = %e, "failed to close session on drop");
        }
    }
}
