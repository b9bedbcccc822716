//! Record identifiers and their persisted representation.
//!
//! Callers identify records with one of several key kinds. Each kind has a
//! [`KeyStrategy`] that converts between the caller-facing [`KeyValue`] and
//! the primitive that is actually stored:
//!
//! | Kind         | Rust type | Persisted as                        |
//! |--------------|-----------|-------------------------------------|
//! | `Int64`      | `i64`     | 64-bit integer                      |
//! | `Int32`      | `i32`     | 32-bit integer                      |
//! | `Text`       | `String`  | bounded string                      |
//! | `Structured` | `Uuid`    | bounded string, 32 lowercase hex    |
//!
//! Structured identifiers are stored in their compact hex form so they sort
//! and compare as plain strings in every dialect.
//!
//! A table resolves its strategy once, at construction, from [`Key::KIND`].

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::LogicalType;
use super::value::SqlValue;
use crate::error::{Result, StoreError};

/// The kind of identifier a table is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Int64,
    Int32,
    Text,
    Structured,
}

impl KeyKind {
    /// Logical type of the persisted form.
    pub fn logical_type(&self) -> LogicalType {
        match self {
            KeyKind::Int64 => LogicalType::Int64,
            KeyKind::Int32 => LogicalType::Int32,
            KeyKind::Text | KeyKind::Structured => LogicalType::BoundedString,
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyKind::Int64 => "int64",
            KeyKind::Int32 => "int32",
            KeyKind::Text => "text",
            KeyKind::Structured => "structured",
        };
        f.write_str(name)
    }
}

/// Caller-facing identifier value, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyValue {
    Int64(i64),
    Int32(i32),
    Text(String),
    Structured(Uuid),
}

impl KeyValue {
    /// Kind of this value.
    pub fn kind(&self) -> KeyKind {
        match self {
            KeyValue::Int64(_) => KeyKind::Int64,
            KeyValue::Int32(_) => KeyKind::Int32,
            KeyValue::Text(_) => KeyKind::Text,
            KeyValue::Structured(_) => KeyKind::Structured,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int64(v) => write!(f, "{}", v),
            KeyValue::Int32(v) => write!(f, "{}", v),
            KeyValue::Text(v) => f.write_str(v),
            KeyValue::Structured(v) => write!(f, "{}", v.simple()),
        }
    }
}

/// A Rust type usable as a record identifier.
pub trait Key: Clone + Send + Sync + 'static {
    /// Kind used to pick the table's [`KeyStrategy`].
    const KIND: KeyKind;

    /// Tag the value with its kind.
    fn to_key_value(&self) -> KeyValue;

    /// Recover a typed key from a tagged value.
    fn from_key_value(value: KeyValue) -> Result<Self>;
}

fn kind_mismatch(expected: KeyKind, got: &KeyValue) -> StoreError {
    StoreError::Usage(format!(
        "Expected a {} key, got {} key '{}'",
        expected,
        got.kind(),
        got
    ))
}

impl Key for i64 {
    const KIND: KeyKind = KeyKind::Int64;

    fn to_key_value(&self) -> KeyValue {
        KeyValue::Int64(*self)
    }

    fn from_key_value(value: KeyValue) -> Result<Self> {
        match value {
            KeyValue::Int64(v) => Ok(v),
            other => Err(kind_mismatch(Self::KIND, &other)),
        }
    }
}

impl Key for i32 {
    const KIND: KeyKind = KeyKind::Int32;

    fn to_key_value(&self) -> KeyValue {
        KeyValue::Int32(*self)
    }

    fn from_key_value(value: KeyValue) -> Result<Self> {
        match value {
            KeyValue::Int32(v) => Ok(v),
            other => Err(kind_mismatch(Self::KIND, &other)),
        }
    }
}

impl Key for String {
    const KIND: KeyKind = KeyKind::Text;

    fn to_key_value(&self) -> KeyValue {
        KeyValue::Text(self.clone())
    }

    fn from_key_value(value: KeyValue) -> Result<Self> {
        match value {
            KeyValue::Text(v) => Ok(v),
            other => Err(kind_mismatch(Self::KIND, &other)),
        }
    }
}

impl Key for Uuid {
    const KIND: KeyKind = KeyKind::Structured;

    fn to_key_value(&self) -> KeyValue {
        KeyValue::Structured(*self)
    }

    fn from_key_value(value: KeyValue) -> Result<Self> {
        match value {
            KeyValue::Structured(v) => Ok(v),
            other => Err(kind_mismatch(Self::KIND, &other)),
        }
    }
}

/// Conversion between a key kind and its persisted primitive.
///
/// Built once per table and shared by every statement the table issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStrategy {
    kind: KeyKind,
}

impl KeyStrategy {
    /// Strategy for a key kind.
    pub fn for_kind(kind: KeyKind) -> Self {
        Self { kind }
    }

    /// Kind this strategy handles.
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Logical type of the identifier column.
    pub fn logical_type(&self) -> LogicalType {
        self.kind.logical_type()
    }

    /// Persisted form of a key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Usage` if the value is of a different kind.
    pub fn normalize(&self, key: &KeyValue) -> Result<SqlValue> {
        match (self.kind, key) {
            (KeyKind::Int64, KeyValue::Int64(v)) => Ok(SqlValue::I64(*v)),
            (KeyKind::Int32, KeyValue::Int32(v)) => Ok(SqlValue::I32(*v)),
            (KeyKind::Text, KeyValue::Text(v)) => Ok(SqlValue::Text(v.clone())),
            (KeyKind::Structured, KeyValue::Structured(v)) => {
                Ok(SqlValue::Text(v.simple().to_string()))
            }
            (expected, other) => Err(kind_mismatch(expected, other)),
        }
    }

    /// Key value from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Storage` if the stored value does not have the
    /// shape this kind persists to, which means the row was not written by a
    /// table with this key kind.
    pub fn denormalize(&self, stored: SqlValue) -> Result<KeyValue> {
        let decoded = match (self.kind, &stored) {
            (KeyKind::Int64, value) => value.as_i64().map(KeyValue::Int64),
            (KeyKind::Int32, value) => value.as_i32().map(KeyValue::Int32),
            (KeyKind::Text, SqlValue::Text(v)) => Some(KeyValue::Text(v.clone())),
            (KeyKind::Structured, SqlValue::Text(v)) => {
                Uuid::parse_str(v).ok().map(KeyValue::Structured)
            }
            _ => None,
        };

        decoded.ok_or_else(|| {
            StoreError::storage(
                format!("decoding {} identifier", self.kind),
                format!("unexpected stored identifier value {}", stored),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_is_deterministic() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let keys = vec![
            KeyValue::Int64(-9),
            KeyValue::Int32(41),
            KeyValue::Text("user-1".to_string()),
            KeyValue::Structured(id),
        ];

        for key in keys {
            let strategy = KeyStrategy::for_kind(key.kind());
            let first = strategy.normalize(&key).unwrap();
            let second = strategy.normalize(&key).unwrap();
            assert_eq!(first, second);
            assert_eq!(strategy.denormalize(first).unwrap(), key);
        }
    }

    #[test]
    fn test_structured_key_compact_form() {
        let id = Uuid::parse_str("67E55044-10B1-426F-9247-BB680E5FE0C8").unwrap();
        let strategy = KeyStrategy::for_kind(KeyKind::Structured);
        let stored = strategy.normalize(&id.to_key_value()).unwrap();
        assert_eq!(
            stored,
            SqlValue::Text("67e5504410b1426f9247bb680e5fe0c8".to_string())
        );
        assert_eq!(strategy.logical_type(), LogicalType::BoundedString);
    }

    #[test]
    fn test_persisted_types_per_kind() {
        assert_eq!(KeyKind::Int64.logical_type(), LogicalType::Int64);
        assert_eq!(KeyKind::Int32.logical_type(), LogicalType::Int32);
        assert_eq!(KeyKind::Text.logical_type(), LogicalType::BoundedString);
        assert_eq!(KeyKind::Structured.logical_type(), LogicalType::BoundedString);
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let strategy = KeyStrategy::for_kind(KeyKind::Int64);
        let err = strategy.normalize(&KeyValue::Text("x".into())).unwrap_err();
        assert!(matches!(err, StoreError::Usage(_)));

        assert!(i32::from_key_value(KeyValue::Int64(1)).is_err());
        assert_eq!(String::from_key_value(KeyValue::Text("a".into())).unwrap(), "a");
    }

    #[test]
    fn test_denormalize_rejects_foreign_values() {
        let strategy = KeyStrategy::for_kind(KeyKind::Structured);
        let err = strategy
            .denormalize(SqlValue::Text("not-a-uuid".into()))
            .unwrap_err();
        assert!(err.is_retryable());

        let int32 = KeyStrategy::for_kind(KeyKind::Int32);
        assert!(int32.denormalize(SqlValue::I64(i64::MAX)).is_err());
        assert_eq!(
            int32.denormalize(SqlValue::I64(3)).unwrap(),
            KeyValue::Int32(3)
        );
    }
}
