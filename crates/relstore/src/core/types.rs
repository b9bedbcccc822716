//! Logical storage types and their dialect-specific names.
//!
//! [`LogicalType`] is the closed, dialect-independent set of column categories
//! a table can declare. A [`TypeMapping`] names every concrete variant for one
//! SQL dialect. Callers obtain one through [`TypeMappingBuilder::build`], which
//! refuses to produce a partial mapping; the built-in dialects use a table with
//! one required field per variant instead.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Dialect-independent storage category of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    /// Opaque byte sequence (serialized record payloads).
    Bytes,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// String with a dialect-defined maximum length, usable in keys.
    BoundedString,
    /// String without a length limit.
    UnboundedString,
    /// Boolean flag.
    Boolean,
    /// Placeholder for the table's identifier column.
    ///
    /// Resolved to the key kind's concrete type when the table is built. It is
    /// not a storage type and has no dialect name.
    Identifier,
}

impl LogicalType {
    /// Every variant that has a dialect name, in declaration order.
    pub const CONCRETE: [LogicalType; 6] = [
        LogicalType::Bytes,
        LogicalType::Int32,
        LogicalType::Int64,
        LogicalType::BoundedString,
        LogicalType::UnboundedString,
        LogicalType::Boolean,
    ];

    /// Whether this variant names a storage type (everything but the placeholder).
    pub fn is_concrete(&self) -> bool {
        !matches!(self, LogicalType::Identifier)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicalType::Bytes => "bytes",
            LogicalType::Int32 => "int32",
            LogicalType::Int64 => "int64",
            LogicalType::BoundedString => "bounded_string",
            LogicalType::UnboundedString => "unbounded_string",
            LogicalType::Boolean => "boolean",
            LogicalType::Identifier => "identifier",
        };
        f.write_str(name)
    }
}

/// Total function from concrete [`LogicalType`] to a dialect type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    names: HashMap<LogicalType, String>,
}

impl TypeMapping {
    /// Start building a mapping.
    pub fn builder() -> TypeMappingBuilder {
        TypeMappingBuilder::default()
    }

    /// Dialect type name for a logical type.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` for [`LogicalType::Identifier`], which must be
    /// resolved against the table's key kind before it can be named.
    pub fn type_name(&self, logical: LogicalType) -> Result<&str> {
        self.names.get(&logical).map(String::as_str).ok_or_else(|| {
            StoreError::config(format!(
                "Logical type '{}' has no dialect name; resolve it against the key kind first",
                logical
            ))
        })
    }
}

/// One name for each concrete logical type.
///
/// Every field is required, so [`TypeMapping::from_names`] cannot leave a
/// variant unnamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TypeNames {
    pub(crate) bytes: &'static str,
    pub(crate) int32: &'static str,
    pub(crate) int64: &'static str,
    pub(crate) bounded_string: &'static str,
    pub(crate) unbounded_string: &'static str,
    pub(crate) boolean: &'static str,
}

impl TypeMapping {
    pub(crate) fn from_names(names: TypeNames) -> Self {
        let names = [
            (LogicalType::Bytes, names.bytes),
            (LogicalType::Int32, names.int32),
            (LogicalType::Int64, names.int64),
            (LogicalType::BoundedString, names.bounded_string),
            (LogicalType::UnboundedString, names.unbounded_string),
            (LogicalType::Boolean, names.boolean),
        ];
        TypeMapping {
            names: names
                .into_iter()
                .map(|(logical, name)| (logical, name.to_string()))
                .collect(),
        }
    }
}

/// Incremental builder for [`TypeMapping`].
///
/// Later calls for the same variant replace earlier ones, so a dialect can
/// start from a shared base and override individual names.
#[derive(Debug, Clone, Default)]
pub struct TypeMappingBuilder {
    names: HashMap<LogicalType, String>,
}

impl TypeMappingBuilder {
    /// Name one logical type.
    pub fn map(mut self, logical: LogicalType, name: impl Into<String>) -> Self {
        self.names.insert(logical, name.into());
        self
    }

    /// Copy every entry of an existing mapping, replacing what was set so far.
    pub fn extend(mut self, base: &TypeMapping) -> Self {
        for (logical, name) in &base.names {
            self.names.insert(*logical, name.clone());
        }
        self
    }

    /// Validate and freeze the mapping.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` if any concrete variant is unnamed (or
    /// named with an empty string), or if the identifier placeholder was given
    /// a name.
    pub fn build(self) -> Result<TypeMapping> {
        if self.names.contains_key(&LogicalType::Identifier) {
            return Err(StoreError::config(
                "Type mapping cannot name the identifier placeholder",
            ));
        }

        let missing: Vec<String> = LogicalType::CONCRETE
            .iter()
            .filter(|t| {
                self.names
                    .get(t)
                    .map(|n| n.trim().is_empty())
                    .unwrap_or(true)
            })
            .map(|t| t.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(StoreError::config(format!(
                "Type mapping is incomplete, missing: {}",
                missing.join(", ")
            )));
        }

        Ok(TypeMapping { names: self.names })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_builder() -> TypeMappingBuilder {
        TypeMapping::builder()
            .map(LogicalType::Bytes, "BLOB")
            .map(LogicalType::Int32, "INTEGER")
            .map(LogicalType::Int64, "BIGINT")
            .map(LogicalType::BoundedString, "VARCHAR(255)")
            .map(LogicalType::UnboundedString, "TEXT")
            .map(LogicalType::Boolean, "BOOLEAN")
    }

    #[test]
    fn test_complete_mapping_names_every_variant() {
        let mapping = base_builder().build().unwrap();
        for logical in LogicalType::CONCRETE {
            assert!(!mapping.type_name(logical).unwrap().is_empty());
        }
    }

    #[test]
    fn test_incomplete_mapping_fails_to_build() {
        let result = TypeMapping::builder()
            .map(LogicalType::Bytes, "BLOB")
            .map(LogicalType::Int32, "INTEGER")
            .build();

        let err = result.unwrap_err().to_string();
        assert!(err.contains("incomplete"));
        assert!(err.contains("int64"));
        assert!(err.contains("boolean"));
    }

    #[test]
    fn test_empty_name_counts_as_missing() {
        let result = base_builder().map(LogicalType::Boolean, "  ").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_later_entries_override_base() {
        let base = base_builder().build().unwrap();
        let narrowed = TypeMapping::builder()
            .extend(&base)
            .map(LogicalType::BoundedString, "VARCHAR(191)")
            .build()
            .unwrap();

        assert_eq!(
            narrowed.type_name(LogicalType::BoundedString).unwrap(),
            "VARCHAR(191)"
        );
        assert_eq!(narrowed.type_name(LogicalType::Int64).unwrap(), "BIGINT");
    }

    #[test]
    fn test_placeholder_has_no_name() {
        let mapping = base_builder().build().unwrap();
        assert!(mapping.type_name(LogicalType::Identifier).is_err());

        let result = base_builder().map(LogicalType::Identifier, "TEXT").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_type_names_cover_every_variant() {
        let names = TypeNames {
            bytes: "BLOB",
            int32: "INTEGER",
            int64: "BIGINT",
            bounded_string: "VARCHAR(255)",
            unbounded_string: "TEXT",
            boolean: "BOOLEAN",
        };
        let mapping = TypeMapping::from_names(names);
        assert_eq!(mapping, base_builder().build().unwrap());
        assert!(mapping.type_name(LogicalType::Identifier).is_err());
    }
}
