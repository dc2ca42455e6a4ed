//! Aggregation definitions

use crate::error::{AggregationError, Result};
use crate::sorted_first_last::SortMode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One sorted first-by / last-by aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedByDefinition {
    /// Unique name, also the prefix of its result columns
    pub name: String,
    /// Column whose extreme value picks the winning row
    pub sort_column: String,
    /// Smallest (first) or largest (last) value wins
    pub mode: SortMode,
    /// Source columns copied from the winning row
    pub output_columns: Vec<String>,
}

impl SortedByDefinition {
    /// Create a new definition
    pub fn new(name: &str, sort_column: &str, mode: SortMode) -> Self {
        Self {
            name: name.to_string(),
            sort_column: sort_column.to_string(),
            mode,
            output_columns: Vec::new(),
        }
    }

    /// Add a column to copy from the winning row
    pub fn output(mut self, column: &str) -> Self {
        self.output_columns.push(column.to_string());
        self
    }

    /// Result column name for a carried source column
    pub fn result_column(&self, column: &str) -> String {
        format!("{}_{}", self.name, column)
    }
}

/// A grouped aggregation: group-by keys plus one or more sorted aggregations
/// sharing the same destination slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationDefinition {
    /// Unique name
    pub name: String,
    /// Group by columns (empty means one global group)
    #[serde(default)]
    pub group_by: Vec<String>,
    /// Aggregations computed per group
    pub aggregations: Vec<SortedByDefinition>,
}

impl AggregationDefinition {
    /// Create a new definition
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            group_by: Vec::new(),
            aggregations: Vec::new(),
        }
    }

    /// Set group by columns
    pub fn group_by(mut self, columns: &[&str]) -> Self {
        self.group_by = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Add an aggregation
    pub fn aggregate(mut self, aggregation: SortedByDefinition) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    /// Add a first-by aggregation carrying `outputs`
    pub fn first_by(self, name: &str, sort_column: &str, outputs: &[&str]) -> Self {
        let aggregation = outputs.iter().fold(
            SortedByDefinition::new(name, sort_column, SortMode::First),
            |agg, c| agg.output(c),
        );
        self.aggregate(aggregation)
    }

    /// Add a last-by aggregation carrying `outputs`
    pub fn last_by(self, name: &str, sort_column: &str, outputs: &[&str]) -> Self {
        let aggregation = outputs.iter().fold(
            SortedByDefinition::new(name, sort_column, SortMode::Last),
            |agg, c| agg.output(c),
        );
        self.aggregate(aggregation)
    }

    /// Returns true if several operators share the destination space
    pub fn is_combo(&self) -> bool {
        self.aggregations.len() > 1
    }

    /// Result column names: group keys first, then each aggregation's outputs
    pub fn result_columns(&self) -> Vec<String> {
        let mut columns = self.group_by.clone();
        for aggregation in &self.aggregations {
            columns.extend(
                aggregation
                    .output_columns
                    .iter()
                    .map(|c| aggregation.result_column(c)),
            );
        }
        columns
    }

    /// Validate the definition
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(AggregationError::InvalidDefinition(msg));

        if self.name.is_empty() {
            return invalid("Empty name".to_string());
        }
        if self.aggregations.is_empty() {
            return invalid("No aggregations defined".to_string());
        }

        let mut names = HashSet::new();
        for aggregation in &self.aggregations {
            if aggregation.name.is_empty() {
                return invalid("Empty aggregation name".to_string());
            }
            if !names.insert(aggregation.name.as_str()) {
                return invalid(format!("Duplicate aggregation '{}'", aggregation.name));
            }
            if aggregation.sort_column.is_empty() {
                return invalid(format!("Empty sort column in '{}'", aggregation.name));
            }
            if self.group_by.contains(&aggregation.sort_column) {
                return invalid(format!(
                    "Sort column '{}' is also a group by column",
                    aggregation.sort_column
                ));
            }
            if aggregation.output_columns.is_empty() {
                return invalid(format!("No output columns in '{}'", aggregation.name));
            }
        }

        let columns = self.result_columns();
        let mut seen = HashSet::new();
        if let Some(duplicate) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return invalid(format!("Duplicate result column '{}'", duplicate));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_definition() {
        let def = AggregationDefinition::new("trades_by_sym")
            .group_by(&["sym"])
            .first_by("open", "ts", &["price", "size"])
            .last_by("close", "ts", &["price"]);

        assert!(def.validate().is_ok());
        assert!(def.is_combo());
        assert_eq!(
            def.result_columns(),
            vec!["sym", "open_price", "open_size", "close_price"]
        );
    }

    #[test]
    fn test_single_aggregation_is_standalone() {
        let def = AggregationDefinition::new("low").last_by("low", "price", &["price"]);
        assert!(def.validate().is_ok());
        assert!(!def.is_combo());
    }

    #[test]
    fn test_aggregation_validation() {
        // Empty name
        let def = AggregationDefinition::new("").first_by("a", "ts", &["x"]);
        assert!(def.validate().is_err());

        // No aggregations
        let def = AggregationDefinition::new("test");
        assert!(def.validate().is_err());

        // Duplicate aggregation names
        let def = AggregationDefinition::new("test")
            .first_by("a", "ts", &["x"])
            .last_by("a", "ts", &["y"]);
        assert!(def.validate().is_err());

        // Sort column used as group key
        let def = AggregationDefinition::new("test")
            .group_by(&["ts"])
            .first_by("a", "ts", &["x"]);
        assert!(def.validate().is_err());

        // Nothing to carry
        let def = AggregationDefinition::new("test").first_by("a", "ts", &[]);
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_result_column_collision() {
        // "a_b" + "c" and "a" + "b_c" both produce "a_b_c"
        let def = AggregationDefinition::new("test")
            .first_by("a_b", "ts", &["c"])
            .last_by("a", "ts", &["b_c"]);
        let err = def.validate().unwrap_err();
        assert!(err.to_string().contains("a_b_c"));
    }

    #[test]
    fn test_definition_serde() {
        let json = r#"{
            "name": "bars",
            "group_by": ["sym"],
            "aggregations": [
                {"name": "open", "sort_column": "ts", "mode": "first", "output_columns": ["price"]}
            ]
        }"#;
        let def: AggregationDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.aggregations[0].mode, SortMode::First);
        assert!(def.validate().is_ok());
    }
}
