//! Mailbox wire header
//!
//! Every region starts with a fixed 64-byte header followed by the payload
//! area. Fields sit at fixed offsets and are encoded little-endian:
//!
//! | Field             | Offset | Size |
//! |-------------------|--------|------|
//! | `magic`           | 0      | 4    |
//! | `version`         | 4      | 4    |
//! | `data_size`       | 8      | 8    |
//! | `sequence_number` | 16     | 8    |
//! | `timestamp`       | 24     | 8    |
//! | reserved          | 32     | 32   |
//!
//! The reserved bytes are never written by this crate.

use crate::error::{Result, ShmJsonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Magic number marking an initialized region
pub const MAGIC: u32 = 0x534D4A53; // "SMJS"
pub const PROTOCOL_VERSION: u32 = 1;

/// Size of the header; the payload starts right after it
pub const HEADER_SIZE: usize = 64;

/// Field offsets
mod offset {
    pub const MAGIC: usize = 0;
    pub const VERSION: usize = 4;
    pub const DATA_SIZE: usize = 8;
    pub const SEQUENCE: usize = 16;
    pub const TIMESTAMP: usize = 24;
}

/// Decoded copy of a region header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub magic: u32,
    pub version: u32,
    /// Length of the current payload in bytes
    pub data_size: u64,
    /// Number of successful writes so far
    pub sequence_number: u64,
    /// Microseconds since the epoch of the last write (advisory)
    pub timestamp: u64,
}

impl Header {
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: u32::from_le_bytes(field(bytes, offset::MAGIC)),
            version: u32::from_le_bytes(field(bytes, offset::VERSION)),
            data_size: u64::from_le_bytes(field(bytes, offset::DATA_SIZE)),
            sequence_number: u64::from_le_bytes(field(bytes, offset::SEQUENCE)),
            timestamp: u64::from_le_bytes(field(bytes, offset::TIMESTAMP)),
        }
    }

    /// Encode the fields into `bytes`, leaving the reserved area untouched
    pub fn encode_into(&self, bytes: &mut [u8; HEADER_SIZE]) {
        put(bytes, offset::MAGIC, &self.magic.to_le_bytes());
        put(bytes, offset::VERSION, &self.version.to_le_bytes());
        put(bytes, offset::DATA_SIZE, &self.data_size.to_le_bytes());
        put(bytes, offset::SEQUENCE, &self.sequence_number.to_le_bytes());
        put(bytes, offset::TIMESTAMP, &self.timestamp.to_le_bytes());
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.magic == MAGIC
    }

    /// Whether the slot holds a value newer than `last_seq`
    #[inline]
    pub fn has_update_since(&self, last_seq: u64) -> bool {
        self.is_initialized() && self.data_size > 0 && self.sequence_number > last_seq
    }

    /// Header after one more successful write of `data_size` bytes
    pub fn advance(&self, data_size: u64, timestamp: u64) -> Self {
        Self {
            magic: MAGIC,
            version: PROTOCOL_VERSION,
            data_size,
            sequence_number: self.sequence_number.wrapping_add(1),
            timestamp,
        }
    }

    /// Check the header before a read and return the payload length
    pub fn validate(&self, capacity: usize) -> Result<usize> {
        if !self.is_initialized() {
            return Err(ShmJsonError::Uninitialized { got: self.magic });
        }
        if self.version != PROTOCOL_VERSION {
            return Err(ShmJsonError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: self.version,
            });
        }
        if self.data_size == 0 {
            return Err(ShmJsonError::NoData);
        }
        match usize::try_from(self.data_size) {
            Ok(len) if len <= capacity => Ok(len),
            _ => Err(ShmJsonError::Corrupted {
                data_size: self.data_size,
                capacity,
            }),
        }
    }
}

/// Wall-clock microseconds since the Unix epoch
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[inline]
fn field<const N: usize>(bytes: &[u8; HEADER_SIZE], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}

#[inline]
fn put(bytes: &mut [u8; HEADER_SIZE], at: usize, value: &[u8]) {
    bytes[at..at + value.len()].copy_from_slice(value);
}
