//! Log replay.
//!
//! Rebuilds the committed object table from a record log without modifying
//! it. Records after the last commit marker belong to a transaction that
//! never committed and are ignored, as is a torn or damaged tail.

use crate::backend::StorageBackend;
use crate::error::{EngineError, EngineResult};
use crate::record::{Record, RecordIter};
use crate::types::{ObjectId, ObjectMeta, SequenceNumber};
use std::collections::{BTreeMap, HashMap};

/// Where the latest version of an object lives in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Offset of the object's `Put` record.
    pub offset: u64,
    /// Metadata copied from that record.
    pub meta: ObjectMeta,
}

/// Outcome of replaying a log.
#[derive(Debug, Default)]
pub struct Replay {
    /// Live objects as of the last commit.
    pub objects: BTreeMap<ObjectId, Location>,
    /// Highest object identifier seen in a committed record.
    pub max_oid: u64,
    /// Sequence number of the last commit.
    pub sequence: SequenceNumber,
    /// Offset just past the last commit marker.
    pub durable_end: u64,
    /// Records read, committed or not.
    pub records: usize,
    /// Commit markers read.
    pub commits: usize,
    /// Error that stopped the scan before the end of the log, if any.
    pub stopped_by: Option<EngineError>,
}

impl Replay {
    /// Returns true if bytes past the last commit have to be discarded.
    #[must_use]
    pub fn has_uncommitted_tail(&self, size: u64) -> bool {
        self.durable_end < size
    }

    /// Counts the live objects of each kind.
    #[must_use]
    pub fn kind_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for location in self.objects.values() {
            *counts.entry(location.meta.kind.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Replays every committed transaction in `backend`.
///
/// # Errors
///
/// Returns an error only if the backend size cannot be read. Damaged records
/// end the scan and are reported through [`Replay::stopped_by`].
pub fn replay(backend: &dyn StorageBackend) -> EngineResult<Replay> {
    let mut out = Replay::default();
    let mut pending: HashMap<ObjectId, Option<Location>> = HashMap::new();
    let mut pending_max = 0u64;

    let mut iter = RecordIter::new(backend)?;
    while let Some(item) = iter.next() {
        let (offset, record) = match item {
            Ok(entry) => entry,
            Err(e) => {
                out.stopped_by = Some(e);
                break;
            }
        };
        out.records += 1;

        match record {
            Record::Put { oid, meta, .. } => {
                pending_max = pending_max.max(oid.as_u64());
                pending.insert(oid, Some(Location { offset, meta }));
            }
            Record::Delete { oid } => {
                pending.insert(oid, None);
            }
            Record::Commit { sequence } => {
                for (oid, location) in pending.drain() {
                    match location {
                        Some(location) => {
                            out.objects.insert(oid, location);
                        }
                        None => {
                            out.objects.remove(&oid);
                        }
                    }
                }
                out.max_oid = out.max_oid.max(pending_max);
                out.sequence = out.sequence.max(sequence);
                out.commits += 1;
                out.durable_end = iter.offset();
            }
        }
    }

    Ok(out)
}
