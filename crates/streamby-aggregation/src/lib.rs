//! streamby Aggregation - Chunked stream aggregation operators
//!
//! This crate provides:
//! - The update-cycle contract every aggregation operator implements
//! - Sorted first-by / last-by operators for append-only streams
//! - Per-destination state with block-allocated redirections
//! - Implicit and explicit change tracking for combo aggregations
//! - Aggregation definitions

pub mod change;
pub mod definition;
pub mod error;
pub mod materializer;
pub mod operator;
pub mod redirection;
pub mod sorted_first_last;
pub mod state;

pub use change::ChangeTracking;
pub use definition::{AggregationDefinition, SortedByDefinition};
pub use error::{AggregationError, Result};
pub use materializer::ResultMaterializer;
pub use operator::AggregationOperator;
pub use sorted_first_last::{ChunkValue, SortMode, StreamSortedFirstLastOperator};
pub use state::DestinationState;
