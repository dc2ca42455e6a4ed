//! streamby Core - Core types for the stream aggregation engine
//!
//! This crate provides the fundamental data types shared by every operator:
//! - `RowKey` / `Destination`: source row keys and output slots
//! - `RowSet` / `RowSetBuilder`: ordered, deduplicated sets of row keys
//! - `Update` / `ShiftData`: the per-cycle change message
//! - `Chunk` / `Run`: typed batch buffers and same-destination sub-ranges
//! - `TotalOrd`: null-aware three-way comparison for value types
//! - `FieldValue` / `ColumnType`: dynamically typed cells for sources and results
//! - `ParallelConfig`: knobs for sharded parallel ingestion

pub mod chunk;
pub mod compare;
pub mod error;
pub mod parallel;
pub mod rowset;
pub mod types;

pub use chunk::{Chunk, DestinationChunk, RowKeyChunk, Run};
pub use compare::TotalOrd;
pub use error::{CoreError, Result};
pub use parallel::ParallelConfig;
pub use rowset::{RowSet, RowSetBuilder, Shift, ShiftData, Update};
pub use types::*;
