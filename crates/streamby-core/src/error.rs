//! Error types for streamby-core

use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Chunk length mismatch: expected {expected}, got {actual}")]
    ChunkLengthMismatch { expected: usize, actual: usize },

    #[error("Chunk is full (capacity {capacity})")]
    ChunkFull { capacity: usize },

    #[error("Invalid field type: expected {expected}, got {actual}")]
    InvalidFieldType { expected: String, actual: String },

    #[error("Row key {key} does not follow previous row key {previous}")]
    NonMonotonicRowKey { previous: u64, key: u64 },

    #[error("No row key follows {last}")]
    RowKeyOverflow { last: u64 },

    #[error("Row key {0} is reserved")]
    ReservedRowKey(u64),

    #[error("Row key not found: {0}")]
    RowKeyNotFound(u64),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
