//! Table introspection records

use crate::{Row, Value};
use serde::{Deserialize, Serialize};

/// One column of one user table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumnInfo {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    /// 1-based position of the column within its table
    pub ordinal: i64,
}

impl TableColumnInfo {
    /// Build from a row shaped like `DatabaseDriver::table_info_query` output.
    ///
    /// Returns `None` when a required column is missing or has the wrong type.
    pub fn from_row(row: &Row) -> Option<Self> {
        let text = |idx: usize| row.get(idx).and_then(Value::as_str).map(str::to_string);

        let nullable = match row.get(3)? {
            Value::Bool(b) => *b,
            Value::String(s) => s.eq_ignore_ascii_case("yes"),
            _ => return None,
        };

        Some(Self {
            table_name: text(0)?,
            column_name: text(1)?,
            data_type: text(2)?,
            nullable,
            default_value: text(4),
            ordinal: row.get(5).and_then(Value::as_i64)?,
        })
    }
}
