//! Aggregation error types

use streamby_core::{CoreError, Destination};
use thiserror::Error;

/// Aggregation errors
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("Stream invariant violated in {phase}: {removed} removed rows, {shifted} shifts")]
    StreamInvariant {
        phase: &'static str,
        removed: u64,
        shifted: usize,
    },

    #[error("Destination {destination} beyond capacity {capacity}")]
    CapacityExceeded {
        destination: Destination,
        capacity: usize,
    },

    #[error("Destination {destination} skips unused destination {next}")]
    DestinationGap {
        destination: Destination,
        next: usize,
    },

    #[error("Chunk mismatch: {0}")]
    ChunkMismatch(String),

    #[error("Initial state mismatch: result has {actual} rows, operator has {expected} destinations")]
    InitialStateMismatch { expected: usize, actual: u64 },

    #[error("No active update cycle for {0}")]
    NoActiveCycle(&'static str),

    #[error("Invalid aggregation definition: {0}")]
    InvalidDefinition(String),

    #[error("Materialize error: {0}")]
    Materialize(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for aggregation operations
pub type Result<T> = std::result::Result<T, AggregationError>;
