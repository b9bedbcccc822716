//! SQL values bound into statements and read back from rows.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::LogicalType;

/// A single value bound as a statement parameter or read from a result row.
///
/// `Null` keeps the logical type of the column it stands in for, so drivers
/// can encode a typed NULL on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlValue {
    /// NULL with the logical type of its column.
    Null(LogicalType),

    /// Boolean value.
    Bool(bool),

    /// 32-bit signed integer.
    I32(i32),

    /// 64-bit signed integer.
    I64(i64),

    /// Text value (bounded or unbounded string columns).
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

/// One result row, in the order of the statement's select list.
pub type Row = Vec<SqlValue>;

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Logical type this value naturally binds as.
    ///
    /// Text reports [`LogicalType::UnboundedString`]; callers that know the
    /// column is bounded use the column's declared type instead.
    pub fn logical_type(&self) -> LogicalType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => LogicalType::Boolean,
            SqlValue::I32(_) => LogicalType::Int32,
            SqlValue::I64(_) => LogicalType::Int64,
            SqlValue::Text(_) => LogicalType::UnboundedString,
            SqlValue::Bytes(_) => LogicalType::Bytes,
        }
    }

    /// Whether the value can be stored in a column of the given type.
    ///
    /// Integers widen from 32 to 64 bits; NULL fits any column (nullability is
    /// checked by the engine).
    pub fn fits(&self, column: LogicalType) -> bool {
        match (self, column) {
            (SqlValue::Null(_), _) => true,
            (SqlValue::Bool(_), LogicalType::Boolean) => true,
            (SqlValue::I32(_), LogicalType::Int32 | LogicalType::Int64) => true,
            (SqlValue::I64(_), LogicalType::Int64) => true,
            (SqlValue::Text(_), LogicalType::BoundedString | LogicalType::UnboundedString) => true,
            (SqlValue::Bytes(_), LogicalType::Bytes) => true,
            _ => false,
        }
    }

    /// Render as a SQL literal (used for DDL defaults and statement previews).
    ///
    /// Single quotes inside text are doubled; bytes render as a hex literal.
    pub fn to_sql_literal(&self) -> String {
        match self {
            SqlValue::Null(_) => "NULL".to_string(),
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::Text(v) => format!("'{}'", v.replace('\'', "''")),
            SqlValue::Bytes(v) => {
                let hex: String = v.iter().map(|b| format!("{:02x}", b)).collect();
                format!("X'{}'", hex)
            }
        }
    }

    /// Integer value widened to 64 bits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer value if it fits in 32 bits.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            SqlValue::I32(v) => Some(*v),
            SqlValue::I64(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Borrowed text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Borrowed binary value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql_literal())
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_literals() {
        assert_eq!(SqlValue::Bool(false).to_sql_literal(), "false");
        assert_eq!(SqlValue::I32(0).to_sql_literal(), "0");
        assert_eq!(SqlValue::from("O'Brien").to_sql_literal(), "'O''Brien'");
        assert_eq!(SqlValue::Bytes(vec![0xde, 0xad]).to_sql_literal(), "X'dead'");
        assert_eq!(SqlValue::Null(LogicalType::Int64).to_sql_literal(), "NULL");
    }

    #[test]
    fn test_fits_widens_integers() {
        assert!(SqlValue::I32(7).fits(LogicalType::Int64));
        assert!(!SqlValue::I64(7).fits(LogicalType::Int32));
        assert!(SqlValue::from("x").fits(LogicalType::BoundedString));
        assert!(!SqlValue::from("x").fits(LogicalType::Bytes));
        assert!(SqlValue::Null(LogicalType::Bytes).fits(LogicalType::Boolean));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(SqlValue::I32(5).as_i64(), Some(5));
        assert_eq!(SqlValue::I64(i64::MAX).as_i32(), None);
        assert_eq!(SqlValue::I64(12).as_i32(), Some(12));
        assert_eq!(SqlValue::from("abc").as_str(), Some("abc"));
        assert_eq!(SqlValue::Bool(true).as_bool(), Some(true));
        assert!(SqlValue::Null(LogicalType::Boolean).is_null());
    }
}
