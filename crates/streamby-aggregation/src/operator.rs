//! The update-cycle contract every aggregation operator implements
//!
//! ```text
//! Idle --reset_for_step--> Accumulating --add_chunk*--> Accumulating --propagate_updates--> Idle
//! Idle --add_chunk*--> Idle --propagate_initial_state--> Idle      (initial snapshot, once)
//! ```
//!
//! `ensure_capacity` must cover every destination an `add_chunk` call
//! references. Invariant violations are returned as errors; the cycle
//! coordinator turns them into a table-level failure.

use crate::error::Result;
use crate::materializer::ResultMaterializer;
use streamby_core::{Chunk, Destination, DestinationChunk, RowKeyChunk, RowSet, Run, Update};

pub trait AggregationOperator: Send {
    /// Type of the values chunk this operator consumes
    type Value;

    /// Grow state so destinations below `table_size` are addressable.
    fn ensure_capacity(&mut self, table_size: usize);

    /// Begin a new update cycle.
    fn reset_for_step(&mut self, upstream: &Update) -> Result<()>;

    /// Ingest a chunk whose rows are partitioned into same-destination runs.
    ///
    /// `values`, `row_keys` and `destinations` are index-aligned. `modified`
    /// receives one flag per run: whether that group's visible state changed.
    fn add_chunk_bucketed(
        &mut self,
        values: &Chunk<Self::Value>,
        row_keys: &RowKeyChunk,
        destinations: &DestinationChunk,
        runs: &[Run],
        modified: &mut [bool],
    ) -> Result<()>;

    /// Ingest a chunk whose rows all target `destination`.
    fn add_chunk_singleton(
        &mut self,
        values: &Chunk<Self::Value>,
        row_keys: &RowKeyChunk,
        destination: Destination,
    ) -> Result<bool>;

    /// Materialize every destination of the initial snapshot.
    fn propagate_initial_state(
        &mut self,
        result_rows: &RowSet,
        materializer: &mut dyn ResultMaterializer,
    ) -> Result<()>;

    /// Materialize the destinations changed this cycle and release
    /// cycle-scoped state.
    fn propagate_updates(
        &mut self,
        downstream: &Update,
        new_destinations: &RowSet,
        materializer: &mut dyn ResultMaterializer,
    ) -> Result<()>;
}
