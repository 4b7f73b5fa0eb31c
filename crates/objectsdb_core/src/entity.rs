//! The identity contract every stored entity satisfies.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Caller-assigned logical key of an entity.
///
/// Keys are unique for the lifetime of a store and never reused after
/// removal within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(pub u64);

impl EntityKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}", self.0)
    }
}

impl From<u64> for EntityKey {
    fn from(key: u64) -> Self {
        Self(key)
    }
}

/// Logical type tag of an entity.
///
/// Kinds are supplied at insertion and drive indexing, counting and
/// iteration. Each kind is bound to exactly one Rust type per session.
///
/// ```rust
/// use objectsdb_core::Kind;
///
/// const PROTEIN: Kind = Kind::new("Protein");
/// assert_eq!(PROTEIN.as_str(), "Protein");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Kind(Cow<'static, str>);

impl Kind {
    /// Creates a kind from a static name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Creates a kind from an owned name, e.g. one read back from the store.
    #[must_use]
    pub fn owned(name: String) -> Self {
        Self(Cow::Owned(name))
    }

    /// Returns the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Kind {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Kind {
    fn from(name: String) -> Self {
        Self::owned(name)
    }
}

/// Identity fields embedded in every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityHeader {
    /// Logical key, set by the session on insertion.
    pub key: EntityKey,
    /// Whether the entity is independently indexed.
    pub root: bool,
}

/// A type the session can store.
///
/// Implementors embed an [`EntityHeader`] and expose it; the key and root
/// accessors are provided on top of it.
///
/// ```rust
/// use objectsdb_core::{Entity, EntityHeader};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct ProteinMatch {
///     header: EntityHeader,
///     accession: String,
/// }
///
/// impl Entity for ProteinMatch {
///     fn header(&self) -> &EntityHeader {
///         &self.header
///     }
///     fn header_mut(&mut self) -> &mut EntityHeader {
///         &mut self.header
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the identity fields.
    fn header(&self) -> &EntityHeader;

    /// Returns the identity fields mutably.
    fn header_mut(&mut self) -> &mut EntityHeader;

    /// Returns the entity key.
    fn key(&self) -> EntityKey {
        self.header().key
    }

    /// Sets the entity key.
    fn set_key(&mut self, key: EntityKey) {
        self.header_mut().key = key;
    }

    /// Returns true if the entity is independently indexed.
    fn is_root(&self) -> bool {
        self.header().root
    }

    /// Sets the root flag.
    fn set_root(&mut self, root: bool) {
        self.header_mut().root = root;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Serialize, Deserialize)]
    struct Probe {
        header: EntityHeader,
    }

    impl Entity for Probe {
        fn header(&self) -> &EntityHeader {
            &self.header
        }
        fn header_mut(&mut self) -> &mut EntityHeader {
            &mut self.header
        }
    }

    #[test]
    fn provided_accessors_use_header() {
        let mut probe = Probe {
            header: EntityHeader::default(),
        };
        probe.set_key(EntityKey::new(9));
        probe.set_root(true);

        assert_eq!(probe.key(), EntityKey::new(9));
        assert!(probe.is_root());
        assert_eq!(probe.header.key.as_u64(), 9);
    }

    #[test]
    fn static_and_owned_kinds_are_equal() {
        let a = Kind::new("Protein");
        let b = Kind::owned("Protein".to_string());
        assert_eq!(a, b);

        let set: HashSet<Kind> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn key_display() {
        assert_eq!(EntityKey::from(42).to_string(), "key:42");
    }
}
