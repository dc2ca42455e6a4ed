//! Core data types for streamby

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// 64-bit key identifying one row of a source table
pub type RowKey = u64;

/// Output slot of one aggregation group
pub type Destination = u32;

/// Sentinel meaning "no row backs this slot"
pub const NULL_ROW_KEY: RowKey = u64::MAX;

/// One row of cells, in schema order
pub type Row = Vec<FieldValue>;

/// Column types supported by sources and results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Float,
    Integer,
    UnsignedInteger,
    String,
    Boolean,
}

impl ColumnType {
    /// Get the type name of this column type
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnType::Float => "float",
            ColumnType::Integer => "integer",
            ColumnType::UnsignedInteger => "unsigned",
            ColumnType::String => "string",
            ColumnType::Boolean => "boolean",
        }
    }

    /// Returns true if the value may be stored in a column of this type.
    /// Null is accepted by every column type.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match value.column_type() {
            None => true,
            Some(t) => t == *self,
        }
    }
}

/// Field value types supported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Missing value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit unsigned integer
    UnsignedInteger(u64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    String(String),
}

impl FieldValue {
    /// Get the type name of this field value
    pub fn type_name(&self) -> &'static str {
        match self.column_type() {
            Some(t) => t.type_name(),
            None => "null",
        }
    }

    /// The column type of this value, `None` for null
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            FieldValue::Null => None,
            FieldValue::Float(_) => Some(ColumnType::Float),
            FieldValue::Integer(_) => Some(ColumnType::Integer),
            FieldValue::UnsignedInteger(_) => Some(ColumnType::UnsignedInteger),
            FieldValue::String(_) => Some(ColumnType::String),
            FieldValue::Boolean(_) => Some(ColumnType::Boolean),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::UnsignedInteger(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::UnsignedInteger(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UnsignedInteger(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

/// Extraction of a typed chunk value from a dynamically typed cell.
///
/// Nulls map to the type's null sentinel (see [`crate::compare`]); types
/// without a sentinel reject them.
pub trait FromFieldValue: Sized {
    /// Column type this value is read from
    const COLUMN_TYPE: ColumnType;

    fn from_field(value: &FieldValue) -> Result<Self>;
}

fn type_error(expected: ColumnType, value: &FieldValue) -> CoreError {
    CoreError::InvalidFieldType {
        expected: expected.type_name().to_string(),
        actual: value.type_name().to_string(),
    }
}

impl FromFieldValue for f64 {
    const COLUMN_TYPE: ColumnType = ColumnType::Float;

    fn from_field(value: &FieldValue) -> Result<Self> {
        match value {
            FieldValue::Null => Ok(crate::compare::NULL_DOUBLE),
            FieldValue::Float(v) => Ok(*v),
            other => Err(type_error(Self::COLUMN_TYPE, other)),
        }
    }
}

impl FromFieldValue for i64 {
    const COLUMN_TYPE: ColumnType = ColumnType::Integer;

    fn from_field(value: &FieldValue) -> Result<Self> {
        match value {
            FieldValue::Null => Ok(crate::compare::NULL_LONG),
            FieldValue::Integer(v) => Ok(*v),
            other => Err(type_error(Self::COLUMN_TYPE, other)),
        }
    }
}

impl FromFieldValue for u64 {
    const COLUMN_TYPE: ColumnType = ColumnType::UnsignedInteger;

    fn from_field(value: &FieldValue) -> Result<Self> {
        match value {
            FieldValue::UnsignedInteger(v) => Ok(*v),
            other => Err(type_error(Self::COLUMN_TYPE, other)),
        }
    }
}

impl FromFieldValue for Option<String> {
    const COLUMN_TYPE: ColumnType = ColumnType::String;

    fn from_field(value: &FieldValue) -> Result<Self> {
        match value {
            FieldValue::Null => Ok(None),
            FieldValue::String(s) => Ok(Some(s.clone())),
            other => Err(type_error(Self::COLUMN_TYPE, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{NULL_DOUBLE, NULL_LONG};

    #[test]
    fn test_field_value_conversions() {
        assert_eq!(FieldValue::from(1.5).as_f64(), Some(1.5));
        assert_eq!(FieldValue::from(7i64).as_i64(), Some(7));
        assert_eq!(FieldValue::from(u64::MAX).as_i64(), None);
        assert_eq!(FieldValue::from("a").as_str(), Some("a"));
        assert_eq!(FieldValue::from(true).as_bool(), Some(true));
        assert_eq!(FieldValue::Null.type_name(), "null");
    }

    #[test]
    fn test_column_type_accepts_null() {
        assert!(ColumnType::Float.accepts(&FieldValue::Null));
        assert!(ColumnType::Float.accepts(&FieldValue::Float(1.0)));
        assert!(!ColumnType::Float.accepts(&FieldValue::Integer(1)));
    }

    #[test]
    fn test_from_field_value_nulls() {
        assert_eq!(f64::from_field(&FieldValue::Null).unwrap(), NULL_DOUBLE);
        assert_eq!(i64::from_field(&FieldValue::Null).unwrap(), NULL_LONG);
        assert_eq!(Option::<String>::from_field(&FieldValue::Null).unwrap(), None);
        assert!(u64::from_field(&FieldValue::Null).is_err());
    }

    #[test]
    fn test_from_field_value_type_mismatch() {
        let err = f64::from_field(&FieldValue::Integer(3)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidFieldType { .. }));
    }

    #[test]
    fn test_field_value_untagged_serde() {
        let row: Row = serde_json::from_str(r#"[null, 1, 2.5, "x", true]"#).unwrap();
        assert_eq!(
            row,
            vec![
                FieldValue::Null,
                FieldValue::Integer(1),
                FieldValue::Float(2.5),
                FieldValue::String("x".to_string()),
                FieldValue::Boolean(true),
            ]
        );
    }
}
