//! Lazy iteration over stored entities.

use crate::codec;
use crate::entity::{Entity, EntityKey};
use crate::error::CoreResult;
use objectsdb_engine::ObjectCursor;
use std::marker::PhantomData;

/// Forward-only iterator over the stored entities of one kind.
///
/// Created by [`crate::Session::iter`]. Each step reads and decodes one
/// object from the store; entities the predicate rejects are skipped. The
/// values are owned copies with no connection to the session's cache, so
/// changing them has no effect on the store.
pub struct EntityIter<E, F> {
    cursor: ObjectCursor,
    predicate: F,
    _entity: PhantomData<fn() -> E>,
}

impl<E, F> EntityIter<E, F> {
    pub(crate) fn new(cursor: ObjectCursor, predicate: F) -> Self {
        Self {
            cursor,
            predicate,
            _entity: PhantomData,
        }
    }

    /// Upper bound on the number of entities still to come.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }
}

impl<E, F> Iterator for EntityIter<E, F>
where
    E: Entity,
    F: FnMut(&E) -> bool,
{
    type Item = CoreResult<E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let object = match self.cursor.next()? {
                Ok(object) => object,
                Err(e) => return Some(Err(e.into())),
            };
            let key = EntityKey::new(object.meta.key);
            match codec::decode::<E>(key, &object.payload) {
                Ok(entity) if (self.predicate)(&entity) => return Some(Ok(entity)),
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.cursor.remaining()))
    }
}

impl<E, F> std::fmt::Debug for EntityIter<E, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityIter")
            .field("remaining", &self.cursor.remaining())
            .finish_non_exhaustive()
    }
}
