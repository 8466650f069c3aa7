//! Record and entry types and their body serialization.
//!
//! ## Record Body Format
//!
//! ```text
//! | kind (1) | checksum (8, LE) | payload (N) |
//! ```
//!
//! The checksum covers the payload only, never the framing bytes. Entry
//! payloads are `| index (8, LE) | data (N) |`; anchor payloads hold the
//! anchored chain value as 8 little-endian bytes.

use crate::error::{WalError, WalResult};

/// Size of the fixed part of a record body: kind (1) + checksum (8).
pub const RECORD_HEADER_SIZE: usize = 9;

/// Size of the fixed part of an entry payload.
const ENTRY_HEADER_SIZE: usize = 8;

/// Discriminates how a record's payload is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Caller metadata, repeated at the head of every segment.
    Metadata = 1,
    /// A log entry.
    Entry = 2,
    /// Chain value carried over from the previous segment.
    ChecksumAnchor = 3,
}

impl RecordKind {
    /// Converts a byte to a record kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Metadata),
            2 => Some(Self::Entry),
            3 => Some(Self::ChecksumAnchor),
            _ => None,
        }
    }

    /// Converts the record kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// The atomic unit of the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// How the payload is interpreted.
    pub kind: RecordKind,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// Chained checksum of the payload, assigned by the encoder.
    pub checksum: u64,
}

impl Record {
    /// Creates a metadata record.
    pub fn metadata(metadata: &[u8]) -> Self {
        Self {
            kind: RecordKind::Metadata,
            payload: metadata.to_vec(),
            checksum: 0,
        }
    }

    /// Creates an entry record.
    pub fn entry(entry: &Entry) -> Self {
        Self {
            kind: RecordKind::Entry,
            payload: entry.encode(),
            checksum: 0,
        }
    }

    /// Creates a checksum anchor for the chain value `prev_crc`.
    pub fn anchor(prev_crc: u64) -> Self {
        Self {
            kind: RecordKind::ChecksumAnchor,
            payload: prev_crc.to_le_bytes().to_vec(),
            checksum: prev_crc,
        }
    }

    /// Returns the serialized body length.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.payload.len()
    }

    /// Appends the serialized body to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.reserve(self.encoded_len());
        buf.push(self.kind.as_byte());
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf.extend_from_slice(&self.payload);
    }

    /// Deserializes a record body.
    pub fn decode(body: &[u8]) -> WalResult<Self> {
        if body.len() < RECORD_HEADER_SIZE {
            return Err(WalError::invalid_record(format!(
                "record body of {} bytes is shorter than its header",
                body.len()
            )));
        }

        let kind = RecordKind::from_byte(body[0]).ok_or_else(|| {
            WalError::invalid_record(format!("unknown record kind {}", body[0]))
        })?;
        let checksum = read_u64(&body[1..RECORD_HEADER_SIZE]);
        let payload = body[RECORD_HEADER_SIZE..].to_vec();

        if kind == RecordKind::ChecksumAnchor && payload.len() != 8 {
            return Err(WalError::invalid_record(format!(
                "checksum anchor payload has {} bytes, expected 8",
                payload.len()
            )));
        }

        Ok(Self {
            kind,
            payload,
            checksum,
        })
    }
}

/// A log entry: caller data plus the index assigned on append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    /// Position in the log, assigned by [`crate::Wal::save`].
    pub index: u64,
    /// Opaque caller data.
    pub data: Vec<u8>,
}

impl Entry {
    /// Creates an entry that has not been assigned an index yet.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            index: 0,
            data: data.into(),
        }
    }

    /// Serializes the entry into a record payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENTRY_HEADER_SIZE + self.data.len());
        buf.extend_from_slice(&self.index.to_le_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Deserializes an entry from a record payload.
    pub fn decode(payload: &[u8]) -> WalResult<Self> {
        if payload.len() < ENTRY_HEADER_SIZE {
            return Err(WalError::invalid_record(format!(
                "entry payload of {} bytes has no index",
                payload.len()
            )));
        }
        Ok(Self {
            index: read_u64(&payload[..ENTRY_HEADER_SIZE]),
            data: payload[ENTRY_HEADER_SIZE..].to_vec(),
        })
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}
