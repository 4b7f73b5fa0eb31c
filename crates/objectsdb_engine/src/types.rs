//! Identifier and metadata types shared by the engine and its callers.

use std::fmt;

/// Engine-assigned identifier of a persisted object.
///
/// Identifiers are allocated on first persist and never reused by one
/// store. [`ObjectId::UNSET`] marks an object that has not been persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Sentinel for "not yet persisted".
    pub const UNSET: Self = Self(0);

    /// Creates an object identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true unless this is [`ObjectId::UNSET`].
    #[must_use]
    pub const fn is_set(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oid:{}", self.0)
    }
}

/// Sequence number of a committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Creates a sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Descriptive fields stored next to every object payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectMeta {
    /// Caller-assigned logical key.
    pub key: u64,
    /// Kind tag the object was stored under.
    pub kind: String,
    /// Whether the object is independently indexed.
    pub root: bool,
}

impl ObjectMeta {
    /// Creates metadata for a root object.
    pub fn root(key: u64, kind: impl Into<String>) -> Self {
        Self {
            key,
            kind: kind.into(),
            root: true,
        }
    }
}

/// An object read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Engine identifier.
    pub oid: ObjectId,
    /// Key, kind and root flag.
    pub meta: ObjectMeta,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_is_zero() {
        assert!(!ObjectId::UNSET.is_set());
        assert!(ObjectId::new(7).is_set());
        assert_eq!(ObjectId::default(), ObjectId::UNSET);
    }

    #[test]
    fn sequence_next() {
        assert_eq!(SequenceNumber::new(4).next(), SequenceNumber::new(5));
        assert_eq!(SequenceNumber::new(4).to_string(), "seq:4");
    }
}
