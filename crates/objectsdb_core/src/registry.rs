//! Kind to type dispatch table.

use crate::entity::{Entity, Kind};
use crate::error::{CoreError, CoreResult};
use std::any::{type_name, TypeId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Binding {
    type_id: TypeId,
    type_name: &'static str,
}

/// Binds every kind to the single Rust type its payloads decode into.
///
/// Kinds are bound on first use (insertion, retrieval or iteration) or up
/// front with [`crate::Session::register`].
#[derive(Debug, Default)]
pub struct KindRegistry {
    bindings: HashMap<Kind, Binding>,
}

impl KindRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `kind` to `E`, or checks an existing binding.
    ///
    /// # Errors
    ///
    /// Returns `KindMismatch` if `kind` is already bound to another type.
    pub fn bind<E: Entity>(&mut self, kind: &Kind) -> CoreResult<()> {
        let wanted = Binding {
            type_id: TypeId::of::<E>(),
            type_name: type_name::<E>(),
        };
        let bound = *self.bindings.entry(kind.clone()).or_insert(wanted);
        if bound.type_id == wanted.type_id {
            Ok(())
        } else {
            Err(CoreError::KindMismatch {
                kind: kind.clone(),
                expected: bound.type_name,
                actual: wanted.type_name,
            })
        }
    }

    /// Returns the name of the type `kind` is bound to.
    #[must_use]
    pub fn type_name_of(&self, kind: &Kind) -> Option<&'static str> {
        self.bindings.get(kind).map(|b| b.type_name)
    }

    /// Number of bound kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if no kind is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
