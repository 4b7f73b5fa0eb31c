//! The transactional object engine.

use crate::backend::StorageBackend;
use crate::dir::StoreDir;
use crate::error::{EngineError, EngineResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use crate::record::Record;
use crate::replay::{replay, Location};
use crate::types::{ObjectId, ObjectMeta, SequenceNumber, StoredObject};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

type SharedBackend = Arc<RwLock<Box<dyn StorageBackend>>>;

/// Options for opening an engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,
    /// Whether to delete any existing objects on open.
    pub overwrite: bool,
    /// Whether `commit` syncs the log to disk.
    pub sync_on_commit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            overwrite: false,
            sync_on_commit: true,
        }
    }
}

/// Outcome of [`ObjectEngine::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactStats {
    /// Live objects carried into the new log.
    pub objects: usize,
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
}

impl CompactStats {
    /// Bytes the compaction gave back.
    #[must_use]
    pub fn reclaimed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// State of the open transaction.
#[derive(Debug)]
struct TxnState {
    /// Log size when the transaction began; rollback truncates back to it.
    start_offset: u64,
    /// Identifier allocator position when the transaction began.
    start_next_oid: u64,
    /// Writes not yet committed. `None` marks a deletion.
    overlay: HashMap<ObjectId, Option<Location>>,
}

/// An embedded object store with single-writer transactions.
///
/// Objects are appended to a record log as they are persisted, so a
/// transaction can grow beyond memory. Only committed transactions survive
/// a reopen.
///
/// Overwrites and deletes append too, so the log keeps superseded versions
/// until [`ObjectEngine::compact`] rewrites it.
///
/// # Example
///
/// ```rust
/// use objectsdb_engine::{ObjectEngine, ObjectId, ObjectMeta};
///
/// let mut engine = ObjectEngine::open_in_memory().unwrap();
/// engine.begin().unwrap();
/// let oid = engine
///     .persist(ObjectId::UNSET, ObjectMeta::root(1, "Protein"), b"P12345".to_vec())
///     .unwrap();
/// engine.commit().unwrap();
/// assert_eq!(engine.fetch(oid).unwrap().payload, b"P12345");
/// ```
pub struct ObjectEngine {
    dir: Option<StoreDir>,
    backend: SharedBackend,
    /// Bumped whenever compaction moves objects to new offsets.
    generation: Arc<AtomicU64>,
    committed: BTreeMap<ObjectId, Location>,
    txn: Option<TxnState>,
    next_oid: u64,
    sequence: SequenceNumber,
    sync_on_commit: bool,
    closed: bool,
}

impl ObjectEngine {
    /// Opens the store in directory `path`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `StoreLocked` if another engine has the directory open, or an
    /// I/O error.
    pub fn open_or_create(path: &Path) -> EngineResult<Self> {
        Self::open_with_config(path, EngineConfig::default())
    }

    /// Opens the store in directory `path` with custom options.
    ///
    /// # Errors
    ///
    /// Returns `MissingStore`, `StoreLocked` or an I/O error.
    pub fn open_with_config(path: &Path, config: EngineConfig) -> EngineResult<Self> {
        let dir = StoreDir::open(path, config.create_if_missing)?;
        if config.overwrite && !dir.is_new() {
            info!(path = %path.display(), "overwriting existing store");
            dir.wipe()?;
        }
        let backend = FileBackend::open(&dir.log_path())?;
        let mut engine = Self::with_backend(Box::new(backend), config.sync_on_commit)?;
        engine.dir = Some(dir);
        info!(
            path = %path.display(),
            objects = engine.committed.len(),
            sequence = %engine.sequence,
            "opened object store"
        );
        Ok(engine)
    }

    /// Opens a fresh engine that keeps everything in memory.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other constructors.
    pub fn open_in_memory() -> EngineResult<Self> {
        Self::with_backend(Box::new(InMemoryBackend::new()), false)
    }

    /// Opens an engine over an existing backend, replaying its log.
    ///
    /// A tail that does not end in a commit marker is cut off.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or truncated.
    pub fn with_backend(mut backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> EngineResult<Self> {
        let replayed = replay(&*backend)?;
        let size = backend.size()?;
        if let Some(err) = &replayed.stopped_by {
            warn!(error = %err, offset = replayed.durable_end, "record log ends in a damaged record");
        }
        if replayed.has_uncommitted_tail(size) {
            warn!(
                discarded = size - replayed.durable_end,
                "discarding uncommitted tail of record log"
            );
            backend.truncate(replayed.durable_end)?;
        }

        Ok(Self {
            dir: None,
            backend: Arc::new(RwLock::new(backend)),
            generation: Arc::new(AtomicU64::new(0)),
            committed: replayed.objects,
            txn: None,
            next_oid: replayed.max_oid + 1,
            sequence: replayed.sequence,
            sync_on_commit,
            closed: false,
        })
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    fn txn_mut(&mut self) -> EngineResult<&mut TxnState> {
        self.ensure_open()?;
        self.txn.as_mut().ok_or(EngineError::NoActiveTransaction)
    }

    /// Returns the store directory, `None` for in-memory engines.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(StoreDir::path)
    }

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Returns `TransactionActive` if one is already open, or `Closed`.
    pub fn begin(&mut self) -> EngineResult<()> {
        self.ensure_open()?;
        if self.txn.is_some() {
            return Err(EngineError::TransactionActive);
        }
        let start_offset = self.backend.read().size()?;
        self.txn = Some(TxnState {
            start_offset,
            start_next_oid: self.next_oid,
            overlay: HashMap::new(),
        });
        debug!(offset = start_offset, "transaction started");
        Ok(())
    }

    /// Returns true while a transaction is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.txn.is_some()
    }

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction`, or an I/O error writing the marker. On
    /// error the transaction stays open.
    pub fn commit(&mut self) -> EngineResult<SequenceNumber> {
        self.txn_mut()?;
        let sequence = self.sequence.next();
        let marker = Record::Commit { sequence }.encode()?;
        {
            let mut backend = self.backend.write();
            backend.append(&marker)?;
            if self.sync_on_commit {
                backend.sync()?;
            } else {
                backend.flush()?;
            }
        }

        if let Some(txn) = self.txn.take() {
            let writes = txn.overlay.len();
            for (oid, location) in txn.overlay {
                match location {
                    Some(location) => {
                        self.committed.insert(oid, location);
                    }
                    None => {
                        self.committed.remove(&oid);
                    }
                }
            }
            debug!(%sequence, writes, "transaction committed");
        }
        self.sequence = sequence;
        Ok(sequence)
    }

    /// Discards every write of the open transaction.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction`, or an I/O error truncating the log.
    pub fn rollback(&mut self) -> EngineResult<()> {
        let start_offset = self.txn_mut()?.start_offset;
        self.backend.write().truncate(start_offset)?;
        if let Some(txn) = self.txn.take() {
            self.next_oid = txn.start_next_oid;
            debug!(discarded = txn.overlay.len(), "transaction rolled back");
        }
        Ok(())
    }

    fn locate(&self, oid: ObjectId) -> Option<&Location> {
        if let Some(txn) = &self.txn {
            if let Some(pending) = txn.overlay.get(&oid) {
                return pending.as_ref();
            }
        }
        self.committed.get(&oid)
    }

    /// Writes an object into the open transaction.
    ///
    /// With [`ObjectId::UNSET`] a new identifier is allocated; otherwise the
    /// object with that identifier is overwritten.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction`, `ObjectNotFound` for an unknown
    /// identifier, or an I/O error.
    pub fn persist(&mut self, oid: ObjectId, meta: ObjectMeta, payload: Vec<u8>) -> EngineResult<ObjectId> {
        self.txn_mut()?;
        let oid = if oid.is_set() {
            if self.locate(oid).is_none() {
                return Err(EngineError::ObjectNotFound(oid.as_u64()));
            }
            oid
        } else {
            let fresh = ObjectId::new(self.next_oid);
            self.next_oid += 1;
            fresh
        };

        let bytes = Record::Put {
            oid,
            meta: meta.clone(),
            payload,
        }
        .encode()?;
        let offset = self.backend.write().append(&bytes)?;
        self.txn_mut()?.overlay.insert(oid, Some(Location { offset, meta }));
        Ok(oid)
    }

    /// Reads the current version of an object, including uncommitted writes.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound`, `Closed`, or an error reading the log.
    pub fn fetch(&self, oid: ObjectId) -> EngineResult<StoredObject> {
        self.ensure_open()?;
        let offset = self
            .locate(oid)
            .ok_or(EngineError::ObjectNotFound(oid.as_u64()))?
            .offset;
        read_object(&**self.backend.read(), oid, offset)
    }

    /// Deletes an object in the open transaction and returns its last state.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction`, `ObjectNotFound`, or an I/O error.
    pub fn delete(&mut self, oid: ObjectId) -> EngineResult<StoredObject> {
        self.txn_mut()?;
        let object = self.fetch(oid)?;
        let bytes = Record::Delete { oid }.encode()?;
        self.backend.write().append(&bytes)?;
        self.txn_mut()?.overlay.insert(oid, None);
        Ok(object)
    }

    fn live(&self) -> BTreeMap<ObjectId, &Location> {
        let mut view: BTreeMap<ObjectId, &Location> =
            self.committed.iter().map(|(oid, loc)| (*oid, loc)).collect();
        if let Some(txn) = &self.txn {
            for (oid, pending) in &txn.overlay {
                match pending {
                    Some(loc) => {
                        view.insert(*oid, loc);
                    }
                    None => {
                        view.remove(oid);
                    }
                }
            }
        }
        view
    }

    /// Opens a cursor over every live object of `kind`, in identifier order.
    ///
    /// The set of objects is fixed when the cursor is created; payloads are
    /// read lazily as the cursor advances.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the engine has been closed.
    pub fn query(&self, kind: &str) -> EngineResult<ObjectCursor> {
        self.ensure_open()?;
        let targets: Vec<(ObjectId, u64)> = self
            .live()
            .into_iter()
            .filter(|(_, loc)| loc.meta.kind == kind)
            .map(|(oid, loc)| (oid, loc.offset))
            .collect();
        debug!(kind, matches = targets.len(), "opened object cursor");
        Ok(ObjectCursor {
            backend: Arc::clone(&self.backend),
            generation: Arc::clone(&self.generation),
            opened_at: self.generation.load(Ordering::Acquire),
            targets: targets.into_iter(),
        })
    }

    /// Returns identifier and metadata of every live root object.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the engine has been closed.
    pub fn roots(&self) -> EngineResult<Vec<(ObjectId, ObjectMeta)>> {
        self.ensure_open()?;
        Ok(self
            .live()
            .into_iter()
            .filter(|(_, loc)| loc.meta.root)
            .map(|(oid, loc)| (oid, loc.meta.clone()))
            .collect())
    }

    /// Returns the number of live objects, including uncommitted ones.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.live().len()
    }

    /// Returns the sequence number of the last commit.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Returns the size of the record log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be read.
    pub fn log_size(&self) -> EngineResult<u64> {
        self.backend.read().size()
    }

    /// Rewrites the log so it holds only the live objects, followed by a
    /// single commit marker carrying the current sequence number.
    ///
    /// Superseded versions, deletions and their tombstones are dropped.
    /// Identifiers of live objects do not change; those of deleted objects
    /// may be handed out again once the compacted log is reopened. A store
    /// directory gets its new log through [`StoreDir::replace_log`], any
    /// other backend is rewritten in place. Cursors opened before the
    /// compaction yield `CursorInvalidated` from then on.
    ///
    /// # Errors
    ///
    /// Returns `TransactionActive` while a transaction is open, `Closed`, or
    /// an I/O error. A store directory keeps its old log on error; an
    /// in-place rewrite that fails midway leaves the backend unusable.
    pub fn compact(&mut self) -> EngineResult<CompactStats> {
        self.ensure_open()?;
        if self.txn.is_some() {
            return Err(EngineError::TransactionActive);
        }

        let mut backend = self.backend.write();
        let bytes_before = backend.size()?;
        let mut image = InMemoryBackend::new();
        let mut relocated = BTreeMap::new();
        for (&oid, location) in &self.committed {
            let object = read_object(&**backend, oid, location.offset)?;
            let record = Record::Put {
                oid,
                meta: object.meta,
                payload: object.payload,
            };
            let offset = image.append(&record.encode()?)?;
            relocated.insert(
                oid,
                Location {
                    offset,
                    meta: location.meta.clone(),
                },
            );
        }
        image.append(&Record::Commit { sequence: self.sequence }.encode()?)?;
        let bytes_after = image.size()?;

        match &self.dir {
            Some(dir) => {
                let replacement: Box<dyn StorageBackend> = Box::new(dir.replace_log(&image.data())?);
                *backend = replacement;
            }
            None => {
                backend.truncate(0)?;
                backend.append(&image.data())?;
            }
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        drop(backend);
        self.committed = relocated;

        let stats = CompactStats {
            objects: self.committed.len(),
            bytes_before,
            bytes_after,
        };
        info!(
            objects = stats.objects,
            before = bytes_before,
            after = bytes_after,
            "compacted record log"
        );
        Ok(stats)
    }

    /// Closes the engine and releases the directory lock.
    ///
    /// An open transaction is rolled back. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback or the final sync fails; the engine
    /// is closed regardless.
    pub fn close(&mut self) -> EngineResult<()> {
        if self.closed {
            return Ok(());
        }
        let rollback = if self.txn.is_some() {
            warn!("closing engine with an open transaction, rolling back");
            self.rollback()
        } else {
            Ok(())
        };
        let sync = self.backend.write().sync();
        self.closed = true;
        self.dir = None;
        debug!("engine closed");
        rollback.and(sync)
    }

    /// Returns true once [`ObjectEngine::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl std::fmt::Debug for ObjectEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectEngine")
            .field("path", &self.path())
            .field("objects", &self.committed.len())
            .field("sequence", &self.sequence)
            .field("active", &self.is_active())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn read_object(backend: &dyn StorageBackend, oid: ObjectId, offset: u64) -> EngineResult<StoredObject> {
    match Record::read_from(backend, offset)? {
        (Record::Put { oid: found, meta, payload }, _) if found == oid => Ok(StoredObject { oid, meta, payload }),
        _ => Err(EngineError::corruption(
            offset,
            format!("expected object record for {oid}"),
        )),
    }
}

/// Lazy, forward-only cursor returned by [`ObjectEngine::query`].
///
/// Each step reads one object from the log. A cursor that outlives a
/// rollback of the writes it points at yields read errors for them, and one
/// that outlives a compaction yields `CursorInvalidated`.
pub struct ObjectCursor {
    backend: SharedBackend,
    generation: Arc<AtomicU64>,
    opened_at: u64,
    targets: std::vec::IntoIter<(ObjectId, u64)>,
}

impl ObjectCursor {
    /// Number of objects not yet yielded.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.targets.len()
    }
}

impl Iterator for ObjectCursor {
    type Item = EngineResult<StoredObject>;

    fn next(&mut self) -> Option<Self::Item> {
        let (oid, offset) = self.targets.next()?;
        let guard = self.backend.read();
        if self.generation.load(Ordering::Acquire) != self.opened_at {
            return Some(Err(EngineError::CursorInvalidated));
        }
        Some(read_object(&**guard, oid, offset))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.targets.size_hint()
    }
}

impl std::fmt::Debug for ObjectCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCursor")
            .field("remaining", &self.remaining())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn protein(key: u64) -> ObjectMeta {
        ObjectMeta::root(key, "Protein")
    }

    #[test]
    fn write_requires_transaction() {
        let mut engine = ObjectEngine::open_in_memory().unwrap();
        let err = engine
            .persist(ObjectId::UNSET, protein(1), vec![1])
            .unwrap_err();
        assert!(matches!(err, EngineError::NoActiveTransaction));
    }

    #[test]
    fn double_begin_fails() {
        let mut engine = ObjectEngine::open_in_memory().unwrap();
        engine.begin().unwrap();
        assert!(matches!(engine.begin(), Err(EngineError::TransactionActive)));
    }

    #[test]
    fn persist_allocates_distinct_ids() {
        let mut engine = ObjectEngine::open_in_memory().unwrap();
        engine.begin().unwrap();
        let a = engine.persist(ObjectId::UNSET, protein(1), vec![1]).unwrap();
        let b = engine.persist(ObjectId::UNSET, protein(2), vec![2]).unwrap();
        assert!(a.is_set());
        assert_ne!(a, b);
    }

    #[test]
    fn overwrite_keeps_identifier() {
        let mut engine = ObjectEngine::open_in_memory().unwrap();
        engine.begin().unwrap();
        let oid = engine.persist(ObjectId::UNSET, protein(1), vec![1]).unwrap();
        let again = engine.persist(oid, protein(1), vec![9]).unwrap();

        assert_eq!(again, oid);
        assert_eq!(engine.fetch(oid).unwrap().payload, vec![9]);
        assert_eq!(engine.object_count(), 1);
    }

    #[test]
    fn overwrite_unknown_id_fails() {
        let mut engine = ObjectEngine::open_in_memory().unwrap();
        engine.begin().unwrap();
        let err = engine.persist(ObjectId::new(42), protein(1), vec![]).unwrap_err();
        assert!(matches!(err, EngineError::ObjectNotFound(42)));
    }

    #[test]
    fn rollback_discards_writes() {
        let mut engine = ObjectEngine::open_in_memory().unwrap();
        engine.begin().unwrap();
        let kept = engine.persist(ObjectId::UNSET, protein(1), vec![1]).unwrap();
        engine.commit().unwrap();

        engine.begin().unwrap();
        let dropped = engine.persist(ObjectId::UNSET, protein(2), vec![2]).unwrap();
        engine.delete(kept).unwrap();
        engine.rollback().unwrap();

        assert!(!engine.is_active());
        assert!(engine.fetch(kept).is_ok());
        assert!(matches!(engine.fetch(dropped), Err(EngineError::ObjectNotFound(_))));
    }

    #[test]
    fn delete_returns_last_state() {
        let mut engine = ObjectEngine::open_in_memory().unwrap();
        engine.begin().unwrap();
        let oid = engine.persist(ObjectId::UNSET, protein(5), vec![7, 7]).unwrap();

        let removed = engine.delete(oid).unwrap();
        assert_eq!(removed.meta.key, 5);
        assert_eq!(removed.payload, vec![7, 7]);
        assert!(engine.fetch(oid).is_err());
    }

    #[test]
    fn query_sees_uncommitted_and_filters_kind() {
        let mut engine = ObjectEngine::open_in_memory().unwrap();
        engine.begin().unwrap();
        engine.persist(ObjectId::UNSET, protein(1), vec![1]).unwrap();
        engine
            .persist(ObjectId::UNSET, ObjectMeta::root(2, "Peptide"), vec![2])
            .unwrap();
        engine.persist(ObjectId::UNSET, protein(3), vec![3]).unwrap();

        let keys: Vec<u64> = engine
            .query("Protein")
            .unwrap()
            .map(|o| o.unwrap().meta.key)
            .collect();
        assert_eq!(keys, vec![1, 3]);
    }

    #[test]
    fn cursor_is_a_snapshot() {
        let mut engine = ObjectEngine::open_in_memory().unwrap();
        engine.begin().unwrap();
        engine.persist(ObjectId::UNSET, protein(1), vec![1]).unwrap();

        let cursor = engine.query("Protein").unwrap();
        engine.persist(ObjectId::UNSET, protein(2), vec![2]).unwrap();
        assert_eq!(cursor.count(), 1);
    }

    #[test]
    fn committed_state_survives_reopen() {
        let tmp = tempdir().unwrap();
        let oid;
        {
            let mut engine = ObjectEngine::open_or_create(tmp.path()).unwrap();
            engine.begin().unwrap();
            oid = engine.persist(ObjectId::UNSET, protein(11), b"kept".to_vec()).unwrap();
            engine.commit().unwrap();
            engine.begin().unwrap();
            engine.persist(ObjectId::UNSET, protein(12), b"lost".to_vec()).unwrap();
            engine.close().unwrap();
        }

        let engine = ObjectEngine::open_or_create(tmp.path()).unwrap();
        assert_eq!(engine.object_count(), 1);
        assert_eq!(engine.fetch(oid).unwrap().payload, b"kept");
        assert_eq!(engine.roots().unwrap(), vec![(oid, protein(11))]);
    }

    #[test]
    fn uncommitted_tail_truncated_on_open() {
        let backend = InMemoryBackend::new();
        {
            let mut engine = ObjectEngine::with_backend(Box::new(backend.clone()), false).unwrap();
            engine.begin().unwrap();
            engine.persist(ObjectId::UNSET, protein(1), vec![1]).unwrap();
            engine.commit().unwrap();
            engine.begin().unwrap();
            engine.persist(ObjectId::UNSET, protein(2), vec![2]).unwrap();
        }
        let before = backend.data().len();

        let engine = ObjectEngine::with_backend(Box::new(backend.clone()), false).unwrap();
        assert!(backend.data().len() < before);
        assert_eq!(engine.object_count(), 1);
        assert_eq!(engine.sequence(), SequenceNumber::new(1));
    }

    #[test]
    fn ids_not_reused_after_reopen() {
        let backend = InMemoryBackend::new();
        let first = {
            let mut engine = ObjectEngine::with_backend(Box::new(backend.clone()), false).unwrap();
            engine.begin().unwrap();
            let oid = engine.persist(ObjectId::UNSET, protein(1), vec![1]).unwrap();
            engine.commit().unwrap();
            oid
        };

        let mut engine = ObjectEngine::with_backend(Box::new(backend), false).unwrap();
        engine.begin().unwrap();
        let second = engine.persist(ObjectId::UNSET, protein(2), vec![2]).unwrap();
        assert!(second > first);
    }

    #[test]
    fn overwrite_wipes_existing_store() {
        let tmp = tempdir().unwrap();
        {
            let mut engine = ObjectEngine::open_or_create(tmp.path()).unwrap();
            engine.begin().unwrap();
            engine.persist(ObjectId::UNSET, protein(1), vec![1]).unwrap();
            engine.commit().unwrap();
        }

        let config = EngineConfig {
            overwrite: true,
            ..EngineConfig::default()
        };
        let engine = ObjectEngine::open_with_config(tmp.path(), config).unwrap();
        assert_eq!(engine.object_count(), 0);
    }

    #[test]
    fn closed_engine_rejects_operations() {
        let mut engine = ObjectEngine::open_in_memory().unwrap();
        engine.begin().unwrap();
        engine.close().unwrap();

        assert!(engine.is_closed());
        assert!(!engine.is_active());
        assert!(matches!(engine.begin(), Err(EngineError::Closed)));
        assert!(matches!(engine.query("Protein"), Err(EngineError::Closed)));
        engine.close().unwrap();
    }

    fn churned_engine(backend: InMemoryBackend) -> (ObjectEngine, ObjectId, ObjectId) {
        let mut engine = ObjectEngine::with_backend(Box::new(backend), false).unwrap();
        engine.begin().unwrap();
        let kept = engine.persist(ObjectId::UNSET, protein(1), vec![1; 64]).unwrap();
        let gone = engine.persist(ObjectId::UNSET, protein(2), vec![2; 64]).unwrap();
        engine.commit().unwrap();
        engine.begin().unwrap();
        for round in 0..5 {
            engine.persist(kept, protein(1), vec![round; 64]).unwrap();
        }
        engine.delete(gone).unwrap();
        engine.commit().unwrap();
        (engine, kept, gone)
    }

    #[test]
    fn compaction_drops_dead_records() {
        let backend = InMemoryBackend::new();
        let (mut engine, kept, gone) = churned_engine(backend.clone());

        let stats = engine.compact().unwrap();
        assert_eq!(stats.objects, 1);
        assert!(stats.bytes_after < stats.bytes_before);
        assert_eq!(stats.reclaimed(), stats.bytes_before - stats.bytes_after);
        assert_eq!(backend.data().len() as u64, stats.bytes_after);
        assert_eq!(engine.fetch(kept).unwrap().payload, vec![4; 64]);
        assert!(matches!(engine.fetch(gone), Err(EngineError::ObjectNotFound(_))));

        let reopened = ObjectEngine::with_backend(Box::new(backend), false).unwrap();
        assert_eq!(reopened.object_count(), 1);
        assert_eq!(reopened.sequence(), SequenceNumber::new(2));
        assert_eq!(reopened.fetch(kept).unwrap().payload, vec![4; 64]);
    }

    #[test]
    fn compaction_requires_idle_engine() {
        let (mut engine, _, _) = churned_engine(InMemoryBackend::new());
        engine.begin().unwrap();
        assert!(matches!(engine.compact(), Err(EngineError::TransactionActive)));
    }

    #[test]
    fn writes_continue_after_compaction() {
        let tmp = tempdir().unwrap();
        let (kept, added) = {
            let mut engine = ObjectEngine::open_or_create(tmp.path()).unwrap();
            engine.begin().unwrap();
            let kept = engine.persist(ObjectId::UNSET, protein(1), b"old".to_vec()).unwrap();
            engine.commit().unwrap();
            engine.begin().unwrap();
            engine.persist(kept, protein(1), b"new".to_vec()).unwrap();
            engine.commit().unwrap();

            engine.compact().unwrap();
            engine.begin().unwrap();
            let added = engine.persist(ObjectId::UNSET, protein(2), b"later".to_vec()).unwrap();
            engine.commit().unwrap();
            engine.close().unwrap();
            (kept, added)
        };

        let engine = ObjectEngine::open_or_create(tmp.path()).unwrap();
        assert_eq!(engine.object_count(), 2);
        assert_eq!(engine.sequence(), SequenceNumber::new(3));
        assert_eq!(engine.fetch(kept).unwrap().payload, b"new");
        assert_eq!(engine.fetch(added).unwrap().payload, b"later");
    }

    #[test]
    fn cursor_fails_after_compaction() {
        let (mut engine, _, _) = churned_engine(InMemoryBackend::new());
        let mut cursor = engine.query("Protein").unwrap();
        engine.compact().unwrap();

        assert!(matches!(cursor.next(), Some(Err(EngineError::CursorInvalidated))));
        let mut fresh = engine.query("Protein").unwrap();
        assert!(fresh.next().unwrap().is_ok());
    }
}
