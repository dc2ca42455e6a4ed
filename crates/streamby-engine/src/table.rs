//! Append-only stream source
//!
//! A `StreamTable` never retains rows: each `append` hands out the rows of
//! one cycle as a `StreamBatch`, keyed by strictly increasing row keys, along
//! with the `Update` announcing them.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use streamby_core::{ColumnType, CoreError, FieldValue, Row, RowKey, RowSet, Update, NULL_ROW_KEY};
use tracing::trace;

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
}

/// Ordered column definitions of a source table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    columns: Vec<ColumnDefinition>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column
    pub fn column(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDefinition {
            name: name.to_string(),
            column_type,
        });
        self
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column by name
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| EngineError::ColumnNotFound(name.to_string()))
    }

    pub fn column_type(&self, index: usize) -> Option<ColumnType> {
        self.columns.get(index).map(|c| c.column_type)
    }

    /// Check width and cell types of a row
    pub fn check_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EngineError::InvalidRow(format!(
                "expected {} cells, got {}",
                self.columns.len(),
                row.len()
            )));
        }
        for (column, value) in self.columns.iter().zip(row) {
            if !column.column_type.accepts(value) {
                return Err(EngineError::Core(CoreError::InvalidFieldType {
                    expected: format!("{} ({})", column.column_type.type_name(), column.name),
                    actual: value.type_name().to_string(),
                }));
            }
        }
        Ok(())
    }
}

/// Rows added to a stream table in one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamBatch {
    keys: Vec<RowKey>,
    rows: Vec<Row>,
}

impl StreamBatch {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Row keys, strictly increasing
    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Row set of every key in the batch
    pub fn row_set(&self) -> RowSet {
        self.keys.iter().copied().collect()
    }

    /// Look up a row by key
    pub fn row(&self, key: RowKey) -> Option<&Row> {
        self.keys
            .binary_search(&key)
            .ok()
            .map(|i| &self.rows[i])
    }

    /// Single cell by key and column position
    pub fn value(&self, key: RowKey, column: usize) -> Option<&FieldValue> {
        self.row(key).and_then(|row| row.get(column))
    }
}

/// Append-only source table
#[derive(Debug)]
pub struct StreamTable {
    schema: Schema,
    last_key: Option<RowKey>,
    size: u64,
}

impl StreamTable {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            last_key: None,
            size: 0,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Rows appended over the table's lifetime
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn last_key(&self) -> Option<RowKey> {
        self.last_key
    }

    /// Append rows under the next consecutive row keys
    pub fn append(&mut self, rows: Vec<Row>) -> Result<(Update, StreamBatch)> {
        let mut last = self.last_key;
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let key = match last {
                None => 0,
                Some(last) => last
                    .checked_add(1)
                    .ok_or(CoreError::RowKeyOverflow { last })?,
            };
            keyed.push((key, row));
            last = Some(key);
        }
        self.append_keyed(keyed)
    }

    /// Append rows under explicit row keys.
    ///
    /// Keys must strictly increase, within the call and relative to every key
    /// appended before. `NULL_ROW_KEY` is reserved for "no row". Nothing is
    /// appended if any row is rejected.
    pub fn append_keyed(&mut self, rows: Vec<(RowKey, Row)>) -> Result<(Update, StreamBatch)> {
        let mut previous = self.last_key;
        for (key, row) in &rows {
            if *key == NULL_ROW_KEY {
                return Err(CoreError::ReservedRowKey(*key).into());
            }
            if let Some(previous) = previous {
                if *key <= previous {
                    return Err(CoreError::NonMonotonicRowKey {
                        previous,
                        key: *key,
                    }
                    .into());
                }
            }
            self.schema.check_row(row)?;
            previous = Some(*key);
        }

        let (keys, rows): (Vec<RowKey>, Vec<Row>) = rows.into_iter().unzip();
        self.last_key = previous;
        self.size += keys.len() as u64;
        trace!(rows = keys.len(), last_key = ?self.last_key, "Appended to stream table");

        let batch = StreamBatch { keys, rows };
        Ok((Update::from_added(batch.row_set()), batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new()
            .column("sym", ColumnType::String)
            .column("price", ColumnType::Float)
    }

    fn row(sym: &str, price: f64) -> Row {
        vec![sym.into(), price.into()]
    }

    #[test]
    fn test_append_assigns_increasing_keys() {
        let mut table = StreamTable::new(schema());
        let (update, batch) = table.append(vec![row("A", 1.0), row("B", 2.0)]).unwrap();
        assert_eq!(batch.keys(), &[0, 1]);
        assert_eq!(update.added.size(), 2);
        assert!(update.is_append_only());

        let (update, batch) = table.append(vec![row("A", 3.0)]).unwrap();
        assert_eq!(batch.keys(), &[2]);
        assert_eq!(update.added.first_key(), Some(2));
        assert_eq!(table.size(), 3);
    }

    #[test]
    fn test_keyed_append_rejects_non_monotonic_keys() {
        let mut table = StreamTable::new(schema());
        table
            .append_keyed(vec![(10, row("A", 1.0)), (20, row("A", 2.0))])
            .unwrap();

        let err = table.append_keyed(vec![(20, row("A", 3.0))]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::NonMonotonicRowKey { previous: 20, key: 20 })
        ));

        let err = table
            .append_keyed(vec![(30, row("A", 3.0)), (25, row("A", 4.0))])
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::NonMonotonicRowKey { .. })));

        // Rejected calls leave the table untouched
        assert_eq!(table.last_key(), Some(20));
        assert_eq!(table.size(), 2);
    }

    #[test]
    fn test_keys_stop_below_reserved_key() {
        let mut table = StreamTable::new(schema());
        let err = table.append_keyed(vec![(u64::MAX, row("A", 1.0))]).unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::ReservedRowKey(u64::MAX))));
        assert_eq!(table.last_key(), None);

        table.append_keyed(vec![(u64::MAX - 2, row("A", 1.0))]).unwrap();
        let (_, batch) = table.append(vec![row("B", 2.0)]).unwrap();
        assert_eq!(batch.keys(), &[u64::MAX - 1]);

        // The next consecutive key is reserved
        let err = table.append(vec![row("C", 3.0)]).unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::ReservedRowKey(u64::MAX))));
        let err = table.append(vec![row("C", 3.0), row("D", 4.0)]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::RowKeyOverflow { last: u64::MAX })
        ));
        assert_eq!(table.last_key(), Some(u64::MAX - 1));
        assert_eq!(table.size(), 2);
    }

    #[test]
    fn test_schema_checks() {
        let mut table = StreamTable::new(schema());
        assert!(table.append(vec![vec!["A".into()]]).is_err());
        assert!(table.append(vec![vec!["A".into(), 1i64.into()]]).is_err());
        assert!(table.append(vec![vec![FieldValue::Null, FieldValue::Null]]).is_ok());
        assert!(matches!(
            schema().index_of("volume"),
            Err(EngineError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_batch_lookup() {
        let mut table = StreamTable::new(schema());
        let (_, batch) = table
            .append_keyed(vec![(5, row("A", 1.0)), (9, row("B", 2.0))])
            .unwrap();
        assert_eq!(batch.value(9, 1), Some(&FieldValue::Float(2.0)));
        assert_eq!(batch.row(7), None);
    }

    #[test]
    fn test_schema_serde() {
        let json = r#"[{"name": "sym", "column_type": "string"}, {"name": "price", "column_type": "float"}]"#;
        let parsed: Schema = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, schema());
    }
}
