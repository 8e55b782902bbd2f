//! Error types for shm_json

use std::io;
use thiserror::Error;

/// Result type for shm_json operations
pub type Result<T> = std::result::Result<T, ShmJsonError>;

/// Errors that can occur in shm_json operations
#[derive(Debug, Error)]
pub enum ShmJsonError {
    /// Owner could not create, size or map the named objects
    #[error("Failed to create shared memory '{name}': {source}")]
    CreationFailure {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Attacher could not find or map the named objects
    #[error("Failed to open shared memory '{name}': {source}")]
    OpenFailure {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Region name cannot be published as a POSIX object name
    #[error("Invalid region name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Waiting on or posting the named lock failed
    #[error("Lock operation on '{name}' failed: {source}")]
    Lock {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Serialized value does not fit the payload area
    #[error("JSON data too large for shared memory region: max {max} bytes, got {got} bytes")]
    PayloadTooLarge { max: usize, got: usize },

    /// Region has never been written
    #[error("Invalid magic number - shared memory not initialized (got 0x{got:08X})")]
    Uninitialized { got: u32 },

    /// Writer speaks a different protocol version
    #[error("Protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    /// Header is valid but the slot is empty
    #[error("No data in shared memory")]
    NoData,

    /// Header claims more payload than the mapping holds
    #[error("Corrupted header: data size {data_size} exceeds capacity {capacity}")]
    Corrupted { data_size: u64, capacity: usize },

    /// Value could not be turned into JSON
    #[error("Failed to serialize value: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Slot bytes are not the expected JSON document
    #[error("Failed to parse JSON payload: {0}")]
    ParseFailure(#[source] serde_json::Error),

    /// No newer value appeared before the deadline
    #[error("Timeout waiting for new data after {waited_ms}ms")]
    Timeout { waited_ms: u64 },
}

impl ShmJsonError {
    /// Whether waiting longer could change the outcome
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ShmJsonError::Timeout { .. } | ShmJsonError::NoData | ShmJsonError::Uninitialized { .. }
        )
    }
}
