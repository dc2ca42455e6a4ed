//! Sorted first-by / last-by over append-only streams
//!
//! For each destination the operator keeps the smallest (first mode) or
//! largest (last mode) value of the sort column seen so far, plus the source
//! row key that produced it. Because a stream only ever appends rows with
//! increasing row keys, scan order within a run is arrival order, and a run
//! can be folded into the existing winner without revisiting history.

use crate::change::ChangeTracking;
use crate::error::{AggregationError, Result};
use crate::materializer::ResultMaterializer;
use crate::operator::AggregationOperator;
use crate::state::{DestinationState, StateShard};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use streamby_core::{
    Chunk, Destination, DestinationChunk, ParallelConfig, RowKey, RowKeyChunk, RowSet, Run,
    TotalOrd, Update,
};
use tracing::{debug, trace, warn};

/// Which extreme of the sort column wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Smallest value wins; ties keep the earliest row
    First,
    /// Largest value wins; ties keep the latest row
    Last,
}

impl SortMode {
    /// Returns true if a candidate comparing `ordering` against the current
    /// winner replaces it
    #[inline]
    pub fn replaces(self, ordering: Ordering) -> bool {
        match self {
            SortMode::First => ordering == Ordering::Less,
            SortMode::Last => ordering != Ordering::Less,
        }
    }
}

/// Values an operator can aggregate
pub trait ChunkValue: TotalOrd + Clone + Default + Send + Sync {}

impl<T: TotalOrd + Clone + Default + Send + Sync> ChunkValue for T {}

/// Stream sorted first/last operator, generic over the sort column type
#[derive(Debug)]
pub struct StreamSortedFirstLastOperator<T> {
    mode: SortMode,
    is_combo: bool,
    parallel: ParallelConfig,
    state: DestinationState<T>,
    tracking: ChangeTracking,
}

impl<T: ChunkValue> StreamSortedFirstLastOperator<T> {
    /// Create an operator. `is_combo` selects explicit change tracking, needed
    /// when sibling operators share the destination space.
    pub fn new(mode: SortMode, is_combo: bool) -> Self {
        Self {
            mode,
            is_combo,
            parallel: ParallelConfig::default(),
            state: DestinationState::new(),
            tracking: ChangeTracking::Idle,
        }
    }

    /// Set the sharded ingestion policy
    pub fn with_parallelism(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn mode(&self) -> SortMode {
        self.mode
    }

    pub fn is_combo(&self) -> bool {
        self.is_combo
    }

    pub fn state(&self) -> &DestinationState<T> {
        &self.state
    }

    pub fn change_tracking(&self) -> &ChangeTracking {
        &self.tracking
    }

    pub fn next_destination(&self) -> usize {
        self.state.next_destination()
    }

    pub fn best_value(&self, destination: Destination) -> Option<&T> {
        self.state.best_value(destination)
    }

    pub fn redirection(&self, destination: Destination) -> Option<RowKey> {
        self.state.redirection(destination)
    }

    fn check_capacity(&self, destination: Destination) -> Result<()> {
        let capacity = self.state.capacity();
        if destination as usize >= capacity {
            return Err(AggregationError::CapacityExceeded {
                destination,
                capacity,
            });
        }
        Ok(())
    }

    fn add_runs_sequential(
        &mut self,
        values: &[T],
        row_keys: &[RowKey],
        destinations: &DestinationChunk,
        runs: &[Run],
        modified: &mut [bool],
    ) {
        let mode = self.mode;
        let tracking = &mut self.tracking;
        self.state.with_full_shard(|shard| {
            for (run, flag) in runs.iter().zip(modified.iter_mut()) {
                if run.is_empty() {
                    *flag = false;
                    continue;
                }
                let destination = *destinations.get(run.start);
                *flag = add_run(shard, mode, values, row_keys, destination, *run);
                if *flag {
                    tracking.record(destination);
                }
            }
        });
    }

    fn add_runs_sharded(
        &mut self,
        values: &[T],
        row_keys: &[RowKey],
        destinations: &DestinationChunk,
        runs: &[Run],
        modified: &mut [bool],
    ) {
        let mode = self.mode;
        let shard_count = self.parallel.effective_shards(self.state.block_count());

        let outcomes: Vec<Vec<(usize, Destination, bool)>> =
            self.state.with_shards(shard_count, |shards| {
                let stride = shards.first().map_or(1, |s| s.span());
                let mut assigned: Vec<Vec<usize>> = vec![Vec::new(); shards.len()];
                for (i, run) in runs.iter().enumerate() {
                    if !run.is_empty() {
                        let destination = *destinations.get(run.start);
                        assigned[destination as usize / stride].push(i);
                    }
                }
                debug!(
                    shards = shards.len(),
                    runs = runs.len(),
                    "Sharded bucketed ingestion"
                );

                shards
                    .par_iter_mut()
                    .zip(assigned.par_iter())
                    .map(|(shard, run_ids)| {
                        run_ids
                            .iter()
                            .map(|&i| {
                                let run = runs[i];
                                let destination = *destinations.get(run.start);
                                debug_assert!(shard.owns(destination));
                                let changed =
                                    add_run(shard, mode, values, row_keys, destination, run);
                                (i, destination, changed)
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect()
            });

        modified.fill(false);
        for (i, destination, changed) in outcomes.into_iter().flatten() {
            modified[i] = changed;
            if changed {
                self.tracking.record(destination);
            }
        }
    }

    fn copy_winners(
        &self,
        destinations: &RowSet,
        materializer: &mut dyn ResultMaterializer,
    ) -> Result<()> {
        for destination in destinations.destinations() {
            match self.state.redirection(destination) {
                Some(key) => materializer.copy(key, destination)?,
                None => trace!(destination, "No redirection, keeping materialized value"),
            }
        }
        Ok(())
    }
}

/// Fold one run into the destination's winner. Returns true if it changed.
#[inline]
fn add_run<T: TotalOrd + Clone>(
    shard: &mut StateShard<'_, T>,
    mode: SortMode,
    values: &[T],
    row_keys: &[RowKey],
    destination: Destination,
    run: Run,
) -> bool {
    if run.length == 0 {
        return false;
    }
    let end = run.end();
    debug_assert!(
        row_keys[run.start..end].windows(2).all(|w| w[0] < w[1]),
        "stream row keys must strictly increase"
    );

    let is_new = shard.is_new(destination);
    if is_new {
        shard.claim(destination);
    }
    let (mut best, mut best_pos, scan_from) = if is_new {
        (&values[run.start], Some(run.start), run.start + 1)
    } else {
        (shard.best_value(destination), None, run.start)
    };

    for (pos, value) in values.iter().enumerate().take(end).skip(scan_from) {
        if mode.replaces(value.compare(best)) {
            best = value;
            best_pos = Some(pos);
        }
    }

    let Some(pos) = best_pos else {
        return false;
    };
    let winner = best.clone();
    shard.commit(destination, row_keys[pos], winner);
    true
}

/// New destinations must be claimed in order: a run may target any used
/// destination or exactly `next`. Returns the next unused destination after
/// the run.
fn check_claim_order(destination: Destination, next: usize) -> Result<usize> {
    let d = destination as usize;
    if d > next {
        return Err(AggregationError::DestinationGap { destination, next });
    }
    Ok(if d == next { next + 1 } else { next })
}

fn check_append_only(update: &Update, phase: &'static str) -> Result<()> {
    if update.is_append_only() {
        return Ok(());
    }
    Err(AggregationError::StreamInvariant {
        phase,
        removed: update.removed.size(),
        shifted: update.shifted.len(),
    })
}

impl<T: ChunkValue> AggregationOperator for StreamSortedFirstLastOperator<T> {
    type Value = T;

    fn ensure_capacity(&mut self, table_size: usize) {
        if table_size > self.state.capacity() {
            self.state.ensure_capacity(table_size);
            trace!(capacity = self.state.capacity(), "Grew destination state");
        }
    }

    fn reset_for_step(&mut self, upstream: &Update) -> Result<()> {
        check_append_only(upstream, "reset_for_step")?;
        if !self.tracking.is_idle() {
            warn!("Previous cycle was never propagated, discarding its change set");
        }
        self.tracking = ChangeTracking::for_step(self.is_combo);
        Ok(())
    }

    fn add_chunk_bucketed(
        &mut self,
        values: &Chunk<T>,
        row_keys: &RowKeyChunk,
        destinations: &DestinationChunk,
        runs: &[Run],
        modified: &mut [bool],
    ) -> Result<()> {
        let size = values.size();
        row_keys.check_size(size)?;
        destinations.check_size(size)?;
        if modified.len() != runs.len() {
            return Err(AggregationError::ChunkMismatch(format!(
                "{} runs but {} modified flags",
                runs.len(),
                modified.len()
            )));
        }
        let mut next = self.state.next_destination();
        for run in runs.iter().filter(|r| !r.is_empty()) {
            if run.end() > size {
                return Err(AggregationError::ChunkMismatch(format!(
                    "run [{}, {}) exceeds chunk size {}",
                    run.start,
                    run.end(),
                    size
                )));
            }
            let destination = *destinations.get(run.start);
            self.check_capacity(destination)?;
            next = check_claim_order(destination, next)?;
        }

        if self.parallel.should_parallelize(runs.len()) && self.state.block_count() > 1 {
            self.add_runs_sharded(
                values.as_slice(),
                row_keys.as_slice(),
                destinations,
                runs,
                modified,
            );
        } else {
            self.add_runs_sequential(
                values.as_slice(),
                row_keys.as_slice(),
                destinations,
                runs,
                modified,
            );
        }
        Ok(())
    }

    fn add_chunk_singleton(
        &mut self,
        values: &Chunk<T>,
        row_keys: &RowKeyChunk,
        destination: Destination,
    ) -> Result<bool> {
        let size = values.size();
        row_keys.check_size(size)?;
        if size == 0 {
            return Ok(false);
        }
        self.check_capacity(destination)?;
        check_claim_order(destination, self.state.next_destination())?;

        let mode = self.mode;
        let (values, row_keys) = (values.as_slice(), row_keys.as_slice());
        let changed = self.state.with_full_shard(|shard| {
            add_run(shard, mode, values, row_keys, destination, Run::new(0, size))
        });
        if changed {
            self.tracking.record(destination);
        }
        Ok(changed)
    }

    fn propagate_initial_state(
        &mut self,
        result_rows: &RowSet,
        materializer: &mut dyn ResultMaterializer,
    ) -> Result<()> {
        let expected = self.state.next_destination();
        if result_rows.size() != expected as u64 {
            return Err(AggregationError::InitialStateMismatch {
                expected,
                actual: result_rows.size(),
            });
        }
        self.copy_winners(result_rows, materializer)?;
        self.state.release_redirections();
        debug!(destinations = expected, "Propagated initial state");
        Ok(())
    }

    fn propagate_updates(
        &mut self,
        downstream: &Update,
        new_destinations: &RowSet,
        materializer: &mut dyn ResultMaterializer,
    ) -> Result<()> {
        check_append_only(downstream, "propagate_updates")?;
        let tracking = std::mem::take(&mut self.tracking);
        let changed = tracking.into_changed(downstream)?;
        self.copy_winners(&changed, materializer)?;
        self.state.release_redirections();
        debug!(
            changed = changed.size(),
            new = new_destinations.size(),
            "Propagated updates"
        );
        Ok(())
    }
}
