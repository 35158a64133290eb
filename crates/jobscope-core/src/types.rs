//! Values, rows and results exchanged with drivers

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single SQL value.
///
/// `Decimal` keeps the server's text rendering so no precision is lost on
/// salary and ratio columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(String),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Timestamp without time zone
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Integer view of any integer value, or of text that parses as one
    /// (`COUNT(*)` comes back as `int8`, some drivers send `numeric`)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::Decimal(text) | Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => fmt::Display::fmt(v, f),
            Value::Int16(v) => fmt::Display::fmt(v, f),
            Value::Int32(v) => fmt::Display::fmt(v, f),
            Value::Int64(v) => fmt::Display::fmt(v, f),
            Value::Float32(v) => fmt::Display::fmt(v, f),
            Value::Float64(v) => fmt::Display::fmt(v, f),
            Value::Decimal(v) | Value::String(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => fmt::Display::fmt(v, f),
            Value::Date(v) => fmt::Display::fmt(v, f),
            Value::Time(v) => fmt::Display::fmt(v, f),
            Value::DateTime(v) => fmt::Display::fmt(v, f),
            Value::DateTimeUtc(v) => fmt::Display::fmt(v, f),
            Value::Json(v) => fmt::Display::fmt(v, f),
        }
    }
}

/// One result row; values are positional, names shared with the result
#[derive(Debug, Clone)]
pub struct Row {
    pub values: Vec<Value>,
    columns: Vec<String>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|c| c == name)?;
        self.values.get(index)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    /// Driver-specific type name, empty when unknown
    pub data_type: String,
    /// 0-based
    pub ordinal: usize,
}

/// Rows returned by a query
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Untyped result built from column names and positional values
    pub fn from_rows(column_names: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let names: Vec<String> = column_names.iter().map(|c| c.to_string()).collect();
        let columns = names
            .iter()
            .enumerate()
            .map(|(ordinal, name)| ColumnMeta {
                name: name.clone(),
                data_type: String::new(),
                ordinal,
            })
            .collect();
        let rows = rows
            .into_iter()
            .map(|values| Row::new(names.clone(), values))
            .collect();

        Self {
            columns,
            rows,
            execution_time_ms: 0,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// First column of the first row, e.g. for `SELECT version()`
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first()?.get(0)
    }
}

/// Outcome of a statement that returns no rows
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementResult {
    pub affected_rows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_as_i64() {
        assert_eq!(Value::Int16(3).as_i64(), Some(3));
        assert_eq!(Value::Int64(42).as_i64(), Some(42));
        assert_eq!(Value::String("17".into()).as_i64(), Some(17));
        assert_eq!(Value::Decimal(" 9 ".into()).as_i64(), Some(9));
        assert_eq!(Value::Float64(1.0).as_i64(), None);
        assert_eq!(Value::Null.as_i64(), None);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Decimal("1234.50".into()).to_string(), "1234.50");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_string(), "<3 bytes>");
    }

    #[test]
    fn test_query_result_scalar() {
        let result = QueryResult::from_rows(&["version"], vec![vec![Value::String("16.2".into())]]);
        assert_eq!(result.scalar(), Some(&Value::String("16.2".into())));
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.columns[0].name, "version");
        assert!(QueryResult::empty().scalar().is_none());
    }

    #[test]
    fn test_row_lookup_by_name() {
        let row = Row::new(
            vec!["a".into(), "b".into()],
            vec![Value::Int32(1), Value::Bool(true)],
        );
        assert_eq!(row.get_by_name("b"), Some(&Value::Bool(true)));
        assert_eq!(row.get_by_name("c"), None);
    }
}
