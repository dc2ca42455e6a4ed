//! Aggregation result storage
//!
//! One row per destination. Writes produced during a cycle are collected in
//! `StagedWrites` and applied by `commit` under a single write lock, so
//! readers see either the previous snapshot or the next one, never a mixture.

use crate::table::StreamBatch;
use parking_lot::RwLock;
use streamby_aggregation::{AggregationError, ResultMaterializer};
use streamby_core::{Destination, FieldValue, Row, RowKey};

/// Result table of one aggregation
#[derive(Debug)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: RwLock<Vec<Row>>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Number of destinations materialized
    pub fn size(&self) -> usize {
        self.rows.read().len()
    }

    /// Copy of one destination's row
    pub fn row(&self, destination: Destination) -> Option<Row> {
        self.rows.read().get(destination as usize).cloned()
    }

    /// One cell by destination and column name
    pub fn value(&self, destination: Destination, column: &str) -> Option<FieldValue> {
        let index = self.column_index(column)?;
        self.rows
            .read()
            .get(destination as usize)
            .and_then(|row| row.get(index).cloned())
    }

    /// Copy of every row, in destination order
    pub fn snapshot(&self) -> Vec<Row> {
        self.rows.read().clone()
    }

    /// Start collecting writes for one cycle
    pub fn stage(&self) -> StagedWrites {
        StagedWrites {
            width: self.columns.len(),
            ..Default::default()
        }
    }

    /// Apply staged writes atomically
    pub fn commit(&self, staged: StagedWrites) {
        if staged.is_empty() {
            return;
        }
        let mut rows = self.rows.write();
        if rows.len() < staged.size {
            rows.resize(staged.size, vec![FieldValue::Null; staged.width]);
        }
        for (destination, column, value) in staged.cells {
            rows[destination as usize][column] = value;
        }
    }
}

/// Cell writes of one cycle, not yet visible to readers
#[derive(Debug, Default)]
pub struct StagedWrites {
    width: usize,
    size: usize,
    cells: Vec<(Destination, usize, FieldValue)>,
}

impl StagedWrites {
    /// Make destinations below `size` exist after commit
    pub fn grow(&mut self, size: usize) {
        self.size = self.size.max(size);
    }

    /// Write the cells of `row` starting at `first_column`
    pub fn set_row(&mut self, destination: Destination, first_column: usize, row: &[FieldValue]) {
        for (i, value) in row.iter().enumerate() {
            self.set(destination, first_column + i, value.clone());
        }
    }

    pub fn set(&mut self, destination: Destination, column: usize, value: FieldValue) {
        debug_assert!(column < self.width);
        self.grow(destination as usize + 1);
        self.cells.push((destination, column, value));
    }

    /// Number of cell writes
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.size == 0
    }
}

/// Copies the output columns of winning batch rows into staged writes
pub(crate) struct BatchMaterializer<'a> {
    pub(crate) batch: &'a StreamBatch,
    /// Source column positions, in result order
    pub(crate) source_columns: &'a [usize],
    /// Result column receiving the first source column
    pub(crate) first_column: usize,
    pub(crate) staged: &'a mut StagedWrites,
}

impl ResultMaterializer for BatchMaterializer<'_> {
    fn copy(
        &mut self,
        source: RowKey,
        destination: Destination,
    ) -> streamby_aggregation::Result<()> {
        let row = self.batch.row(source).ok_or_else(|| {
            AggregationError::Materialize(format!("row key {} is not in the current batch", source))
        })?;
        for (i, &c) in self.source_columns.iter().enumerate() {
            let value = row.get(c).cloned().ok_or_else(|| {
                AggregationError::Materialize(format!("row {} has no column {}", source, c))
            })?;
            self.staged.set(destination, self.first_column + i, value);
        }
        Ok(())
    }
}
