//! Record log format.
//!
//! Every record is framed the same way:
//!
//! ```text
//! magic "OBJR" (4) | version u16 | type u8 | payload len u32 | payload | crc32 u32
//! ```
//!
//! All integers are little-endian. The checksum covers everything before it.

use crate::backend::StorageBackend;
use crate::error::{EngineError, EngineResult};
use crate::types::{ObjectId, ObjectMeta, SequenceNumber};

/// Magic bytes opening every record.
pub const RECORD_MAGIC: [u8; 4] = *b"OBJR";

/// Current record format version.
pub const RECORD_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub const HEADER_SIZE: usize = 11;

/// Trailing checksum size.
pub const CRC_SIZE: usize = 4;

/// Type byte of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Object insert or overwrite.
    Put = 1,
    /// Object deletion.
    Delete = 2,
    /// Transaction commit marker.
    Commit = 3,
}

impl RecordType {
    /// Converts a byte to a record type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            3 => Some(Self::Commit),
            _ => None,
        }
    }
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Writes the full state of an object.
    Put {
        /// Object identifier.
        oid: ObjectId,
        /// Key, kind and root flag.
        meta: ObjectMeta,
        /// Opaque payload.
        payload: Vec<u8>,
    },
    /// Deletes an object.
    Delete {
        /// Object identifier.
        oid: ObjectId,
    },
    /// Makes every record since the previous commit durable.
    Commit {
        /// Sequence number of the transaction.
        sequence: SequenceNumber,
    },
}

impl Record {
    /// Returns the type byte for this record.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Put { .. } => RecordType::Put,
            Self::Delete { .. } => RecordType::Delete,
            Self::Commit { .. } => RecordType::Commit,
        }
    }

    fn encode_payload(&self) -> EngineResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::Put { oid, meta, payload } => {
                let kind_len = u16::try_from(meta.kind.len()).map_err(|_| {
                    EngineError::invalid_argument(format!("kind tag too long: {}", meta.kind))
                })?;
                let data_len = u32::try_from(payload.len()).map_err(|_| {
                    EngineError::invalid_argument(format!(
                        "object payload too large: {} bytes",
                        payload.len()
                    ))
                })?;
                buf.reserve(8 + 8 + 1 + 2 + meta.kind.len() + 4 + payload.len());
                buf.extend_from_slice(&oid.as_u64().to_le_bytes());
                buf.extend_from_slice(&meta.key.to_le_bytes());
                buf.push(u8::from(meta.root));
                buf.extend_from_slice(&kind_len.to_le_bytes());
                buf.extend_from_slice(meta.kind.as_bytes());
                buf.extend_from_slice(&data_len.to_le_bytes());
                buf.extend_from_slice(payload);
            }
            Self::Delete { oid } => buf.extend_from_slice(&oid.as_u64().to_le_bytes()),
            Self::Commit { sequence } => buf.extend_from_slice(&sequence.as_u64().to_le_bytes()),
        }
        Ok(buf)
    }

    fn decode_payload(kind: RecordType, payload: &[u8], offset: u64) -> EngineResult<Self> {
        let mut reader = Reader::new(payload, offset);
        let record = match kind {
            RecordType::Put => {
                let oid = ObjectId::new(reader.u64()?);
                let key = reader.u64()?;
                let root = reader.u8()? != 0;
                let kind_len = reader.u16()? as usize;
                let kind = String::from_utf8(reader.bytes(kind_len)?.to_vec())
                    .map_err(|_| EngineError::corruption(offset, "kind tag is not UTF-8"))?;
                let data_len = reader.u32()? as usize;
                let data = reader.bytes(data_len)?.to_vec();
                Self::Put {
                    oid,
                    meta: ObjectMeta { key, kind, root },
                    payload: data,
                }
            }
            RecordType::Delete => Self::Delete {
                oid: ObjectId::new(reader.u64()?),
            },
            RecordType::Commit => Self::Commit {
                sequence: SequenceNumber::new(reader.u64()?),
            },
        };
        reader.finish()?;
        Ok(record)
    }

    /// Encodes the record with its envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if a field exceeds the size its length prefix allows.
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| EngineError::invalid_argument("record payload too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&RECORD_MAGIC);
        data.extend_from_slice(&RECORD_VERSION.to_le_bytes());
        data.push(self.record_type() as u8);
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);
        let crc = crc32fast::hash(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }

    /// Reads the record starting at `offset`.
    ///
    /// Returns the record and the offset just past it.
    ///
    /// # Errors
    ///
    /// Returns `ReadPastEnd`, `Corruption` or `ChecksumMismatch` if the bytes
    /// at `offset` do not form a complete, valid record.
    pub fn read_from(backend: &dyn StorageBackend, offset: u64) -> EngineResult<(Self, u64)> {
        let header = backend.read_at(offset, HEADER_SIZE)?;
        if header[0..4] != RECORD_MAGIC {
            return Err(EngineError::corruption(offset, "bad record magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != RECORD_VERSION {
            return Err(EngineError::corruption(
                offset,
                format!("unsupported record version {version}"),
            ));
        }
        let kind = RecordType::from_byte(header[6])
            .ok_or_else(|| EngineError::corruption(offset, format!("unknown record type {}", header[6])))?;
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

        let body = backend.read_at(offset + HEADER_SIZE as u64, len + CRC_SIZE)?;
        let (payload, crc_bytes) = body.split_at(len);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header);
        hasher.update(payload);
        let actual = hasher.finalize();
        if actual != expected {
            return Err(EngineError::ChecksumMismatch {
                offset,
                expected,
                actual,
            });
        }

        let record = Self::decode_payload(kind, payload, offset)?;
        let next = offset + (HEADER_SIZE + len + CRC_SIZE) as u64;
        Ok((record, next))
    }
}

/// Streams every record of a backend from offset 0.
///
/// Stops with an error at the first record that cannot be read; the caller
/// decides whether that is a torn tail or real damage.
pub struct RecordIter<'a> {
    backend: &'a dyn StorageBackend,
    offset: u64,
    end: u64,
    failed: bool,
}

impl<'a> RecordIter<'a> {
    /// Creates an iterator over `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be read.
    pub fn new(backend: &'a dyn StorageBackend) -> EngineResult<Self> {
        Ok(Self {
            backend,
            offset: 0,
            end: backend.size()?,
            failed: false,
        })
    }

    /// Offset of the next record to be read.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Iterator for RecordIter<'_> {
    type Item = EngineResult<(u64, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.end {
            return None;
        }
        match Record::read_from(self.backend, self.offset) {
            Ok((record, next)) => {
                let at = self.offset;
                self.offset = next;
                Some(Ok((at, record)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    offset: u64,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], offset: u64) -> Self {
        Self { buf, pos: 0, offset }
    }

    fn bytes(&mut self, n: usize) -> EngineResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| EngineError::corruption(self.offset, "record payload truncated"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> EngineResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> EngineResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> EngineResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> EngineResult<u64> {
        let b = self.bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    fn finish(&self) -> EngineResult<()> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(EngineError::corruption(self.offset, "trailing bytes in record payload"))
        }
    }
}
