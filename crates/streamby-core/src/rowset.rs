//! Row sets and the per-cycle update message
//!
//! Uses 64-bit Roaring treemaps so both dense runs of row keys and sparse
//! destination sets stay compact.

use crate::types::{Destination, RowKey};
use roaring::RoaringTreemap;
use std::ops::RangeInclusive;

/// Ordered, deduplicated set of row keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    keys: RoaringTreemap,
}

impl RowSet {
    /// Create an empty row set
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a row set holding every key in `range`
    pub fn from_range(range: RangeInclusive<RowKey>) -> Self {
        let mut keys = RoaringTreemap::new();
        keys.insert_range(range);
        Self { keys }
    }

    /// Create a row set from destination slots reinterpreted as row keys
    pub fn from_destinations(destinations: impl IntoIterator<Item = Destination>) -> Self {
        destinations.into_iter().map(RowKey::from).collect()
    }

    /// Number of keys in the set
    pub fn size(&self) -> u64 {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Row key at ordinal `position`
    pub fn get(&self, position: u64) -> Option<RowKey> {
        self.keys.select(position)
    }

    pub fn contains(&self, key: RowKey) -> bool {
        self.keys.contains(key)
    }

    pub fn first_key(&self) -> Option<RowKey> {
        self.keys.min()
    }

    pub fn last_key(&self) -> Option<RowKey> {
        self.keys.max()
    }

    /// Iterate keys in increasing order
    pub fn iter(&self) -> impl Iterator<Item = RowKey> + '_ {
        self.keys.iter()
    }

    /// Union of two row sets
    pub fn union(&self, other: &RowSet) -> RowSet {
        RowSet {
            keys: &self.keys | &other.keys,
        }
    }

    /// Iterate keys as destination slots.
    ///
    /// Keys above `Destination::MAX` are never produced by destination
    /// builders and are skipped.
    pub fn destinations(&self) -> impl Iterator<Item = Destination> + '_ {
        self.keys.iter().filter_map(|k| Destination::try_from(k).ok())
    }
}

impl FromIterator<RowKey> for RowSet {
    fn from_iter<I: IntoIterator<Item = RowKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Random-access row set builder: keys may be added in any order
#[derive(Debug, Default)]
pub struct RowSetBuilder {
    keys: RoaringTreemap,
}

impl RowSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&mut self, key: RowKey) {
        self.keys.insert(key);
    }

    /// Number of distinct keys added so far
    pub fn len(&self) -> u64 {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn build(self) -> RowSet {
        RowSet { keys: self.keys }
    }
}

/// Keys in `[begin, end]` moved by `delta`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    pub begin: RowKey,
    pub end: RowKey,
    pub delta: i64,
}

/// Ordered list of key-space shifts carried by an update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShiftData {
    shifts: Vec<Shift>,
}

impl ShiftData {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, begin: RowKey, end: RowKey, delta: i64) {
        self.shifts.push(Shift { begin, end, delta });
    }

    pub fn len(&self) -> usize {
        self.shifts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shifts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shift> {
        self.shifts.iter()
    }
}

/// Change message delivered once per cycle from a table to its listeners
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub added: RowSet,
    pub removed: RowSet,
    pub modified: RowSet,
    pub shifted: ShiftData,
}

impl Update {
    /// An update carrying only additions, the shape every stream update has
    pub fn from_added(added: RowSet) -> Self {
        Self {
            added,
            ..Default::default()
        }
    }

    /// Returns true if nothing changed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
            && self.shifted.is_empty()
    }

    /// Returns true if the update only grows the row set
    pub fn is_append_only(&self) -> bool {
        self.removed.is_empty() && self.shifted.is_empty()
    }
}
