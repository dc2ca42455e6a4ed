//! Typed batch buffers used for bulk processing calls

use crate::error::{CoreError, Result};
use crate::types::{Destination, RowKey};

/// Fixed-capacity, type-specialized batch of values.
///
/// A chunk is filled once per processing call and handed to an operator
/// alongside index-aligned chunks of row keys and destination slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<T> {
    values: Vec<T>,
    capacity: usize,
}

/// Chunk of source row keys
pub type RowKeyChunk = Chunk<RowKey>;

/// Chunk of destination slots, one per source row
pub type DestinationChunk = Chunk<Destination>;

impl<T> Chunk<T> {
    /// Create an empty chunk able to hold `capacity` values
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Wrap existing values; the chunk's capacity is their length
    pub fn from_vec(values: Vec<T>) -> Self {
        let capacity = values.len();
        Self { values, capacity }
    }

    /// Append a value, failing once the chunk is full
    pub fn push(&mut self, value: T) -> Result<()> {
        if self.values.len() >= self.capacity {
            return Err(CoreError::ChunkFull {
                capacity: self.capacity,
            });
        }
        self.values.push(value);
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at position `i`
    #[inline]
    pub fn get(&self, i: usize) -> &T {
        &self.values[i]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    /// Fail unless this chunk holds exactly `expected` values
    pub fn check_size(&self, expected: usize) -> Result<()> {
        if self.values.len() != expected {
            return Err(CoreError::ChunkLengthMismatch {
                expected,
                actual: self.values.len(),
            });
        }
        Ok(())
    }
}

impl<T> FromIterator<T> for Chunk<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

/// Contiguous sub-range `[start, start + length)` of a chunk whose rows all
/// target the same destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub start: usize,
    pub length: usize,
}

impl Run {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    /// Exclusive end position
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}
