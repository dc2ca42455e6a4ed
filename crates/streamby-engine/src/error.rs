//! Engine error types

use streamby_aggregation::AggregationError;
use streamby_core::CoreError;
use thiserror::Error;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Table failed: {0}")]
    TableFailed(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Table not initialized")]
    NotInitialized,

    #[error("Table already initialized")]
    AlreadyInitialized,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
