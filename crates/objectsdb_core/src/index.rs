//! Key and kind bookkeeping.
//!
//! The index is the source of truth for which keys exist and how many
//! entities of each kind are live. It maps every live key to its backing
//! identifier ([`ObjectId::UNSET`] until the first flush) and every kind to
//! the set of its live keys.

use crate::entity::{EntityKey, Kind};
use objectsdb_engine::ObjectId;
use std::collections::{BTreeSet, HashMap};

/// Index entry for one live key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    oid: ObjectId,
    kind: Kind,
}

/// Maps keys to backing identifiers and kinds to live key sets.
#[derive(Debug, Default)]
pub struct KeyIndex {
    keys: HashMap<EntityKey, Slot>,
    kinds: HashMap<Kind, BTreeSet<EntityKey>>,
}

impl KeyIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly inserted key.
    ///
    /// Returns false, leaving the index untouched, if the key is already live.
    pub fn insert_new(&mut self, key: EntityKey, kind: &Kind) -> bool {
        self.insert(key, ObjectId::UNSET, kind)
    }

    fn insert(&mut self, key: EntityKey, oid: ObjectId, kind: &Kind) -> bool {
        if self.keys.contains_key(&key) {
            return false;
        }
        self.keys.insert(
            key,
            Slot {
                oid,
                kind: kind.clone(),
            },
        );
        self.kinds.entry(kind.clone()).or_default().insert(key);
        true
    }

    /// Returns the backing identifier of a live key.
    #[must_use]
    pub fn backing_id(&self, key: EntityKey) -> Option<ObjectId> {
        self.keys.get(&key).map(|slot| slot.oid)
    }

    /// Returns the kind a live key was inserted with.
    #[must_use]
    pub fn kind_of(&self, key: EntityKey) -> Option<&Kind> {
        self.keys.get(&key).map(|slot| &slot.kind)
    }

    /// Binds a live key to the identifier the engine assigned it.
    ///
    /// Returns false if the key is not live.
    pub fn bind(&mut self, key: EntityKey, oid: ObjectId) -> bool {
        match self.keys.get_mut(&key) {
            Some(slot) => {
                slot.oid = oid;
                true
            }
            None => false,
        }
    }

    /// Erases a key from both maps, using `kind` to find its kind set.
    ///
    /// `kind` is the tag the caller resolved for the entity; if the key is
    /// not in that set the recorded kind is used instead.
    pub fn remove(&mut self, key: EntityKey, kind: &Kind) -> Option<ObjectId> {
        let slot = self.keys.remove(&key)?;
        if !self.drop_from_kind(kind, key) {
            self.drop_from_kind(&slot.kind, key);
        }
        Some(slot.oid)
    }

    fn drop_from_kind(&mut self, kind: &Kind, key: EntityKey) -> bool {
        let Some(set) = self.kinds.get_mut(kind) else {
            return false;
        };
        let removed = set.remove(&key);
        if set.is_empty() {
            self.kinds.remove(kind);
        }
        removed
    }

    /// Returns true if the key is live.
    #[must_use]
    pub fn contains(&self, key: EntityKey) -> bool {
        self.keys.contains_key(&key)
    }

    /// Number of live keys of `kind`.
    #[must_use]
    pub fn count(&self, kind: &Kind) -> usize {
        self.kinds.get(kind).map_or(0, BTreeSet::len)
    }

    /// Live keys of `kind` in ascending order.
    #[must_use]
    pub fn keys_of(&self, kind: &Kind) -> Vec<EntityKey> {
        self.kinds
            .get(kind)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Kinds with at least one live key.
    #[must_use]
    pub fn kinds(&self) -> Vec<Kind> {
        let mut kinds: Vec<Kind> = self.kinds.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Total number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no key is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Copy of the key → backing identifier map.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<EntityKey, ObjectId> {
        self.keys.iter().map(|(key, slot)| (*key, slot.oid)).collect()
    }

    /// Forgets every key.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.kinds.clear();
    }

    /// Replaces the contents with persisted entries, one per stored root.
    pub fn rebuild(&mut self, entries: impl IntoIterator<Item = (EntityKey, ObjectId, Kind)>) {
        self.clear();
        for (key, oid, kind) in entries {
            if !self.insert(key, oid, &kind) {
                tracing::warn!(%key, %oid, "duplicate key in store, keeping first object");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PROTEIN: Kind = Kind::new("Protein");
    const PEPTIDE: Kind = Kind::new("Peptide");

    fn key(k: u64) -> EntityKey {
        EntityKey::new(k)
    }

    #[test]
    fn insert_and_count() {
        let mut index = KeyIndex::new();
        assert!(index.insert_new(key(1), &PROTEIN));
        assert!(index.insert_new(key(2), &PROTEIN));
        assert!(index.insert_new(key(3), &PEPTIDE));

        assert_eq!(index.count(&PROTEIN), 2);
        assert_eq!(index.count(&PEPTIDE), 1);
        assert_eq!(index.count(&Kind::new("Psm")), 0);
        assert_eq!(index.backing_id(key(1)), Some(ObjectId::UNSET));
    }

    #[test]
    fn duplicate_insert_leaves_index_unchanged() {
        let mut index = KeyIndex::new();
        index.insert_new(key(1), &PROTEIN);
        assert!(!index.insert_new(key(1), &PEPTIDE));

        assert_eq!(index.count(&PROTEIN), 1);
        assert_eq!(index.count(&PEPTIDE), 0);
        assert_eq!(index.kind_of(key(1)), Some(&PROTEIN));
    }

    #[test]
    fn bind_then_remove() {
        let mut index = KeyIndex::new();
        index.insert_new(key(5), &PROTEIN);
        assert!(index.bind(key(5), ObjectId::new(12)));
        assert!(!index.bind(key(6), ObjectId::new(13)));

        assert_eq!(index.remove(key(5), &PROTEIN), Some(ObjectId::new(12)));
        assert!(!index.contains(key(5)));
        assert_eq!(index.count(&PROTEIN), 0);
        assert!(index.kinds().is_empty());
        assert_eq!(index.remove(key(5), &PROTEIN), None);
    }

    #[test]
    fn remove_with_stale_kind_falls_back() {
        let mut index = KeyIndex::new();
        index.insert_new(key(1), &PROTEIN);
        index.remove(key(1), &PEPTIDE);
        assert_eq!(index.count(&PROTEIN), 0);
    }

    #[test]
    fn rebuild_replaces_contents() {
        let mut index = KeyIndex::new();
        index.insert_new(key(99), &PEPTIDE);
        index.rebuild(vec![
            (key(1), ObjectId::new(1), PROTEIN),
            (key(2), ObjectId::new(2), PROTEIN),
        ]);

        assert!(!index.contains(key(99)));
        assert_eq!(index.keys_of(&PROTEIN), vec![key(1), key(2)]);
        assert_eq!(index.snapshot().get(&key(2)), Some(&ObjectId::new(2)));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(u64, bool),
        Remove(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..20, any::<bool>()).prop_map(|(k, protein)| Op::Insert(k, protein)),
            (0u64..20).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn counts_match_live_keys(ops in prop::collection::vec(op(), 0..100)) {
            let mut index = KeyIndex::new();
            let mut model: HashMap<u64, Kind> = HashMap::new();

            for op in ops {
                match op {
                    Op::Insert(k, protein) => {
                        let kind = if protein { PROTEIN } else { PEPTIDE };
                        let fresh = !model.contains_key(&k);
                        prop_assert_eq!(index.insert_new(key(k), &kind), fresh);
                        model.entry(k).or_insert(kind);
                    }
                    Op::Remove(k) => {
                        let kind = model.remove(&k).unwrap_or(PROTEIN);
                        index.remove(key(k), &kind);
                    }
                }

                for kind in [PROTEIN, PEPTIDE] {
                    let expected = model.values().filter(|k| **k == kind).count();
                    prop_assert_eq!(index.count(&kind), expected);
                }
                prop_assert_eq!(index.len(), model.len());
            }
        }
    }
}
