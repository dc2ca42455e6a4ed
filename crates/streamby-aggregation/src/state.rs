//! Per-destination operator state
//!
//! `DestinationState` owns the best-value cache and the redirections of one
//! operator. Ingestion never touches it directly: it goes through a
//! `StateShard`, a mutable view over a contiguous, block-aligned destination
//! range. Sequential calls use one shard spanning everything; parallel calls
//! split the state into disjoint shards, so two workers can never address the
//! same slot.

use crate::redirection::{RedirectionWindow, Redirections, BLOCK_SIZE};
use streamby_core::{Destination, RowKey};

/// Best-value cache and redirections for every destination of one operator
#[derive(Debug)]
pub struct DestinationState<T> {
    sort_column_values: Vec<T>,
    redirections: Redirections,
    next_destination: usize,
}

impl<T: Clone + Default> DestinationState<T> {
    /// Create empty state with zero capacity
    pub fn new() -> Self {
        Self {
            sort_column_values: Vec::new(),
            redirections: Redirections::new(),
            next_destination: 0,
        }
    }

    /// Grow so destinations below `size` are addressable. Never shrinks.
    pub fn ensure_capacity(&mut self, size: usize) {
        self.redirections.ensure_capacity(size);
        let capacity = self.redirections.capacity();
        if self.sort_column_values.len() < capacity {
            self.sort_column_values.resize(capacity, T::default());
        }
    }
}

impl<T: Clone + Default> Default for DestinationState<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DestinationState<T> {
    /// Number of addressable destinations
    pub fn capacity(&self) -> usize {
        self.sort_column_values.len()
    }

    /// Smallest destination never used
    pub fn next_destination(&self) -> usize {
        self.next_destination
    }

    /// Winning value of an initialized destination
    pub fn best_value(&self, destination: Destination) -> Option<&T> {
        let d = destination as usize;
        (d < self.next_destination).then(|| &self.sort_column_values[d])
    }

    /// Source row key backing a destination changed since the last release
    pub fn redirection(&self, destination: Destination) -> Option<RowKey> {
        self.redirections.get(destination)
    }

    pub fn redirections(&self) -> &Redirections {
        &self.redirections
    }

    pub fn block_count(&self) -> usize {
        self.redirections.block_count()
    }

    /// Drop all redirection entries
    pub fn release_redirections(&mut self) {
        self.redirections.release();
    }

    /// Run `f` over a single shard covering every destination
    pub(crate) fn with_full_shard<R>(&mut self, f: impl FnOnce(&mut StateShard<'_, T>) -> R) -> R {
        let end = self.sort_column_values.len();
        let mut shard = StateShard {
            begin: 0,
            end,
            next_destination: self.next_destination,
            values: &mut self.sort_column_values,
            redirections: self.redirections.window(),
        };
        let result = f(&mut shard);
        self.next_destination = shard.next_destination;
        result
    }

    /// Split the state into at most `shard_count` disjoint shards and run `f`
    /// over all of them. Shard boundaries are aligned to redirection blocks.
    pub(crate) fn with_shards<R>(
        &mut self,
        shard_count: usize,
        f: impl FnOnce(&mut [StateShard<'_, T>]) -> R,
    ) -> R {
        let blocks_per_shard = self
            .redirections
            .block_count()
            .div_ceil(shard_count.max(1))
            .max(1);
        let span = blocks_per_shard * BLOCK_SIZE;
        let global_next = self.next_destination;

        let mut shards: Vec<StateShard<'_, T>> = self
            .sort_column_values
            .chunks_mut(span)
            .zip(self.redirections.windows(blocks_per_shard))
            .enumerate()
            .map(|(i, (values, redirections))| {
                let begin = i * span;
                let end = begin + values.len();
                StateShard {
                    begin,
                    end,
                    next_destination: global_next.clamp(begin, end),
                    values,
                    redirections,
                }
            })
            .collect();

        let result = f(&mut shards);
        let advanced = shards
            .iter()
            .filter(|s| s.next_destination > s.begin.max(global_next))
            .map(|s| s.next_destination)
            .max();
        if let Some(next) = advanced {
            self.next_destination = self.next_destination.max(next);
        }
        result
    }
}

/// Mutable view over destinations `[begin, end)` of one operator's state
#[derive(Debug)]
pub(crate) struct StateShard<'a, T> {
    begin: usize,
    end: usize,
    next_destination: usize,
    values: &'a mut [T],
    redirections: RedirectionWindow<'a>,
}

impl<T> StateShard<'_, T> {
    /// Span of destinations covered by this shard
    pub(crate) fn span(&self) -> usize {
        self.end - self.begin
    }

    /// Returns true if the destination falls inside this shard
    #[inline]
    pub(crate) fn owns(&self, destination: Destination) -> bool {
        (self.begin..self.end).contains(&(destination as usize))
    }

    /// Returns true if the destination has never been used
    #[inline]
    pub(crate) fn is_new(&self, destination: Destination) -> bool {
        destination as usize >= self.next_destination
    }

    /// Mark a new destination as used. Destinations are claimed in order.
    #[inline]
    pub(crate) fn claim(&mut self, destination: Destination) {
        debug_assert_eq!(destination as usize, self.next_destination);
        self.next_destination = destination as usize + 1;
    }

    #[inline]
    pub(crate) fn best_value(&self, destination: Destination) -> &T {
        &self.values[destination as usize - self.begin]
    }

    /// Record a new winner for the destination
    #[inline]
    pub(crate) fn commit(&mut self, destination: Destination, key: RowKey, value: T) {
        self.values[destination as usize - self.begin] = value;
        self.redirections.set(destination, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_empty() {
        let state: DestinationState<f64> = DestinationState::new();
        assert_eq!(state.capacity(), 0);
        assert_eq!(state.next_destination(), 0);
        assert_eq!(state.best_value(0), None);
    }

    #[test]
    fn test_full_shard_commit() {
        let mut state: DestinationState<i64> = DestinationState::new();
        state.ensure_capacity(4);
        state.with_full_shard(|shard| {
            for d in 0..3 {
                assert!(shard.is_new(d));
                shard.claim(d);
                shard.commit(d, 75 + d as RowKey, 7 + d as i64);
            }
            assert!(!shard.is_new(1));
        });
        assert_eq!(state.next_destination(), 3);
        assert_eq!(state.best_value(2), Some(&9));
        assert_eq!(state.redirection(2), Some(77));
        assert_eq!(state.best_value(3), None);
    }

    #[test]
    fn test_shards_are_block_aligned() {
        let mut state: DestinationState<i64> = DestinationState::new();
        state.ensure_capacity(4 * BLOCK_SIZE);
        state.with_shards(2, |shards| {
            assert_eq!(shards.len(), 2);
            assert_eq!(shards[0].begin, 0);
            assert_eq!(shards[1].begin, 2 * BLOCK_SIZE);
            assert_eq!(shards[1].span(), 2 * BLOCK_SIZE);
        });
    }

    #[test]
    fn test_shards_advance_next_destination() {
        let mut state: DestinationState<i64> = DestinationState::new();
        state.ensure_capacity(4 * BLOCK_SIZE);
        state.with_full_shard(|shard| {
            shard.claim(0);
            shard.commit(0, 1, 1);
        });

        // Shards above the global next start unclaimed at their first slot
        let far = (3 * BLOCK_SIZE) as Destination;
        state.with_shards(4, |shards| {
            assert!(!shards[0].is_new(0));
            assert!(shards[0].is_new(1));
            assert!(shards[3].is_new(far));
            shards[3].claim(far);
            shards[3].commit(far, 99, 5);
        });
        assert_eq!(state.next_destination(), far as usize + 1);
        assert_eq!(state.best_value(far), Some(&5));
        assert_eq!(state.redirection(far), Some(99));
    }

    #[test]
    fn test_untouched_shards_keep_next_destination() {
        let mut state: DestinationState<i64> = DestinationState::new();
        state.ensure_capacity(2 * BLOCK_SIZE);
        state.with_full_shard(|shard| {
            for d in 0..=10 {
                shard.claim(d);
                shard.commit(d, 1, 1);
            }
        });
        state.with_shards(2, |_| {});
        assert_eq!(state.next_destination(), 11);
    }
}
