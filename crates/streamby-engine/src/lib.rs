//! streamby Engine - Update cycles over append-only stream tables
//!
//! This crate wires the aggregation operators to concrete collaborators:
//! - `StreamTable`: append-only source assigning increasing row keys
//! - `GroupingEngine`: hashes group keys to destination slots and cuts runs
//! - `ResultTable`: staged, lock-protected aggregation output
//! - `StreamAggregation`: the per-cycle coordinator with sticky failure
//! - `EngineConfig` / `init_logging`: YAML configuration and tracing setup

pub mod config;
pub mod cycle;
pub mod error;
pub mod grouping;
pub mod result;
pub mod table;
pub mod telemetry;

pub use config::{EngineConfig, LoggingSettings};
pub use cycle::{StreamAggregation, TableListener, TableStatus};
pub use error::{EngineError, Result};
pub use grouping::{Assignment, ChunkPlan, GroupingEngine};
pub use result::{ResultTable, StagedWrites};
pub use table::{ColumnDefinition, Schema, StreamBatch, StreamTable};
pub use telemetry::init_logging;
