//! Hash grouping: group keys to destination slots
//!
//! Each distinct group key is assigned the next free destination the first
//! time it is seen, so destinations are dense and never reused. A batch's
//! rows are then stably ordered by destination and cut into chunks of
//! same-destination runs for the operators.

use crate::error::{EngineError, Result};
use crate::table::StreamBatch;
use fxhash::FxHashMap;
use streamby_core::{Chunk, Destination, DestinationChunk, FieldValue, Row, RowKeyChunk, RowSet, Run};
use tracing::trace;

/// Hashable form of one group key cell.
///
/// Floats hash by bit pattern after folding -0.0 into 0.0 and every NaN into
/// one canonical NaN, so values that compare equal share a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    Null,
    Boolean(bool),
    Integer(i64),
    UnsignedInteger(u64),
    Float(u64),
    String(String),
}

impl From<&FieldValue> for KeyPart {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Null => KeyPart::Null,
            FieldValue::Boolean(b) => KeyPart::Boolean(*b),
            FieldValue::Integer(v) => KeyPart::Integer(*v),
            FieldValue::UnsignedInteger(v) => KeyPart::UnsignedInteger(*v),
            FieldValue::Float(v) => {
                let canonical = if v.is_nan() {
                    f64::NAN
                } else if *v == 0.0 {
                    0.0
                } else {
                    *v
                };
                KeyPart::Float(canonical.to_bits())
            }
            FieldValue::String(s) => KeyPart::String(s.clone()),
        }
    }
}

/// Destination of every row of one batch
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    /// Destination per batch row, index-aligned with the batch
    pub destinations: Vec<Destination>,
    /// Destinations first used by this batch
    pub new_destinations: RowSet,
}

/// One `add_chunk` call's worth of rows, ordered by destination
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    /// Batch positions of the chunk's rows
    pub positions: Vec<usize>,
    pub row_keys: RowKeyChunk,
    pub destinations: DestinationChunk,
    pub runs: Vec<Run>,
}

impl ChunkPlan {
    /// The destination every row targets, if the chunk is a single run
    pub fn singleton(&self) -> Option<Destination> {
        match self.runs.as_slice() {
            [run] => Some(*self.destinations.get(run.start)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Destination of run `i`
    pub fn run_destination(&self, i: usize) -> Destination {
        *self.destinations.get(self.runs[i].start)
    }
}

/// Assigns destination slots to group keys
#[derive(Debug)]
pub struct GroupingEngine {
    key_columns: Vec<usize>,
    slots: FxHashMap<Vec<KeyPart>, Destination>,
    group_values: Vec<Row>,
}

impl GroupingEngine {
    /// Group on the given source column positions. No key columns means every
    /// row lands in destination 0.
    pub fn new(key_columns: Vec<usize>) -> Self {
        Self {
            key_columns,
            slots: FxHashMap::default(),
            group_values: Vec::new(),
        }
    }

    /// Number of destinations allocated so far
    pub fn size(&self) -> usize {
        self.group_values.len()
    }

    /// Group key cells of a destination
    pub fn group_values(&self, destination: Destination) -> Option<&Row> {
        self.group_values.get(destination as usize)
    }

    /// Assign every row of `batch` to a destination, allocating slots for
    /// unseen keys
    pub fn assign(&mut self, batch: &StreamBatch) -> Result<Assignment> {
        let first_new = self.size();
        let mut destinations = Vec::with_capacity(batch.len());

        for row in batch.rows() {
            let mut parts = Vec::with_capacity(self.key_columns.len());
            for &c in &self.key_columns {
                let value = row.get(c).ok_or_else(|| {
                    EngineError::InvalidRow(format!("missing group key column {}", c))
                })?;
                parts.push(KeyPart::from(value));
            }

            let next = self.group_values.len();
            let destination = match self.slots.get(&parts) {
                Some(&d) => d,
                None => {
                    let d = Destination::try_from(next).map_err(|_| {
                        EngineError::InvalidRow(format!("too many groups ({})", next))
                    })?;
                    self.slots.insert(parts, d);
                    self.group_values
                        .push(self.key_columns.iter().map(|&c| row[c].clone()).collect());
                    d
                }
            };
            destinations.push(destination);
        }

        let new_destinations = if self.size() > first_new {
            RowSet::from_range(first_new as u64..=self.size() as u64 - 1)
        } else {
            RowSet::empty()
        };
        trace!(
            rows = batch.len(),
            new = new_destinations.size(),
            total = self.size(),
            "Assigned destinations"
        );
        Ok(Assignment {
            destinations,
            new_destinations,
        })
    }

    /// Order rows by destination and cut them into chunks of at most
    /// `chunk_size` rows. Within a destination rows keep batch order, so row
    /// keys inside every run stay increasing.
    pub fn partition(
        &self,
        batch: &StreamBatch,
        assignment: &Assignment,
        chunk_size: usize,
    ) -> Vec<ChunkPlan> {
        let mut order: Vec<usize> = (0..assignment.destinations.len()).collect();
        order.sort_by_key(|&i| assignment.destinations[i]);

        order
            .chunks(chunk_size.max(1))
            .map(|positions| {
                let mut runs = Vec::new();
                let mut start = 0;
                for i in 1..=positions.len() {
                    let boundary = i == positions.len()
                        || assignment.destinations[positions[i]]
                            != assignment.destinations[positions[start]];
                    if boundary {
                        runs.push(Run::new(start, i - start));
                        start = i;
                    }
                }
                ChunkPlan {
                    positions: positions.to_vec(),
                    row_keys: positions.iter().map(|&i| batch.keys()[i]).collect(),
                    destinations: positions
                        .iter()
                        .map(|&i| assignment.destinations[i])
                        .collect(),
                    runs,
                }
            })
            .collect()
    }
}

/// Gather one column of a chunk's rows as typed values
pub(crate) fn gather<T>(
    batch: &StreamBatch,
    plan: &ChunkPlan,
    column: usize,
    convert: impl Fn(&FieldValue) -> streamby_core::Result<T>,
) -> Result<Chunk<T>> {
    let rows = batch.rows();
    let mut values = Chunk::with_capacity(plan.positions.len());
    for &i in &plan.positions {
        values.push(convert(&rows[i][column])?)?;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Schema, StreamTable};
    use streamby_core::ColumnType;

    fn batch(rows: Vec<(&str, f64)>) -> StreamBatch {
        let schema = Schema::new()
            .column("sym", ColumnType::String)
            .column("price", ColumnType::Float);
        let mut table = StreamTable::new(schema);
        let rows = rows
            .into_iter()
            .map(|(s, p)| vec![s.into(), p.into()])
            .collect();
        table.append(rows).unwrap().1
    }

    #[test]
    fn test_destinations_in_first_seen_order() {
        let mut grouping = GroupingEngine::new(vec![0]);
        let b = batch(vec![("B", 1.0), ("A", 2.0), ("B", 3.0)]);
        let assignment = grouping.assign(&b).unwrap();
        assert_eq!(assignment.destinations, vec![0, 1, 0]);
        assert_eq!(assignment.new_destinations.iter().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(grouping.group_values(1), Some(&vec![FieldValue::from("A")]));

        let b = batch(vec![("A", 1.0), ("C", 1.0)]);
        let assignment = grouping.assign(&b).unwrap();
        assert_eq!(assignment.destinations, vec![1, 2]);
        assert_eq!(assignment.new_destinations.iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_no_key_columns_single_group() {
        let mut grouping = GroupingEngine::new(vec![]);
        let b = batch(vec![("A", 1.0), ("B", 2.0)]);
        let assignment = grouping.assign(&b).unwrap();
        assert_eq!(assignment.destinations, vec![0, 0]);
        assert_eq!(grouping.size(), 1);
    }

    #[test]
    fn test_float_keys_fold_zero_and_nan() {
        let mut grouping = GroupingEngine::new(vec![1]);
        let b = batch(vec![("A", 0.0), ("A", -0.0), ("A", f64::NAN), ("A", -f64::NAN)]);
        let assignment = grouping.assign(&b).unwrap();
        assert_eq!(assignment.destinations, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_partition_runs() {
        let mut grouping = GroupingEngine::new(vec![0]);
        let b = batch(vec![("A", 1.0), ("B", 2.0), ("A", 3.0), ("C", 4.0), ("B", 5.0)]);
        let assignment = grouping.assign(&b).unwrap();

        let plans = grouping.partition(&b, &assignment, 4096);
        assert_eq!(plans.len(), 1);
        let plan = &plans[0];
        assert_eq!(plan.positions, vec![0, 2, 1, 4, 3]);
        assert_eq!(plan.row_keys.as_slice(), &[0, 2, 1, 4, 3]);
        assert_eq!(plan.runs, vec![Run::new(0, 2), Run::new(2, 2), Run::new(4, 1)]);
        assert_eq!(plan.singleton(), None);
        assert_eq!(plan.run_destination(2), 2);
    }

    #[test]
    fn test_partition_splits_runs_across_chunks() {
        let mut grouping = GroupingEngine::new(vec![0]);
        let b = batch(vec![("A", 1.0), ("A", 2.0), ("A", 3.0), ("B", 4.0)]);
        let assignment = grouping.assign(&b).unwrap();

        let plans = grouping.partition(&b, &assignment, 2);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].singleton(), Some(0));
        assert_eq!(plans[1].runs, vec![Run::new(0, 1), Run::new(1, 1)]);
        assert_eq!(plans[1].row_keys.as_slice(), &[2, 3]);
    }

    #[test]
    fn test_gather_typed_values() {
        let mut grouping = GroupingEngine::new(vec![0]);
        let b = batch(vec![("A", 1.5), ("B", 2.5), ("A", 3.5)]);
        let assignment = grouping.assign(&b).unwrap();
        let plans = grouping.partition(&b, &assignment, 16);

        let prices: Chunk<f64> =
            gather(&b, &plans[0], 1, <f64 as streamby_core::FromFieldValue>::from_field).unwrap();
        assert_eq!(prices.as_slice(), &[1.5, 3.5, 2.5]);

        let err = gather(&b, &plans[0], 0, <f64 as streamby_core::FromFieldValue>::from_field);
        assert!(err.is_err());
    }
}
