//! CBOR encoding of entity payloads.

use crate::entity::EntityKey;
use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes an entity to CBOR bytes.
pub(crate) fn encode<E: Serialize>(key: EntityKey, value: &E) -> CoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::codec(key, e.to_string()))?;
    Ok(buf)
}

/// Decodes an entity from CBOR bytes.
pub(crate) fn decode<E: DeserializeOwned>(key: EntityKey, bytes: &[u8]) -> CoreResult<E> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::codec(key, e.to_string()))
}
