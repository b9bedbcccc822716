//! SQL dialects and dialect selection.
//!
//! A [`Dialect`] bundles everything that differs between database products as
//! far as this crate is concerned: the type names of the [`LogicalType`]
//! variants and the parameter placeholder syntax. Statement shapes themselves
//! are portable and live in [`crate::query`].
//!
//! Dialects are chosen once per storage session by [`DialectCatalog::resolve`],
//! which matches the product name and version reported by a live connection
//! against an ordered list of built-in entries.
//!
//! [`LogicalType`]: crate::core::LogicalType

mod builtins;
mod catalog;

pub use builtins::{h2, mysql, mysql_5_6, postgres, sqlite};
pub use catalog::{DialectCatalog, DialectEntry};

use crate::core::types::{LogicalType, TypeMapping};
use crate::error::Result;

/// Parameter placeholder syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ... (PostgreSQL).
    Numbered,
    /// `?` for every parameter (MySQL, SQLite, H2).
    Positional,
}

/// SQL syntax strategy for one database product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    name: String,
    placeholder: PlaceholderStyle,
    mapping: TypeMapping,
}

impl Dialect {
    /// Create a dialect.
    pub fn new(
        name: impl Into<String>,
        placeholder: PlaceholderStyle,
        mapping: TypeMapping,
    ) -> Self {
        Self {
            name: name.into(),
            placeholder,
            mapping,
        }
    }

    /// Get the dialect identifier (e.g., "postgres", "mysql").
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type names for this dialect.
    pub fn type_mapping(&self) -> &TypeMapping {
        &self.mapping
    }

    /// Dialect type name for a concrete logical type.
    pub fn type_name(&self, logical: LogicalType) -> Result<&str> {
        self.mapping.type_name(logical)
    }

    /// Get a parameter placeholder for the given 1-based index.
    ///
    /// - PostgreSQL: `$1`, `$2`, etc.
    /// - Others: `?`
    pub fn param_placeholder(&self, index: usize) -> String {
        match self.placeholder {
            PlaceholderStyle::Numbered => format!("${}", index),
            PlaceholderStyle::Positional => "?".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_placeholder() {
        assert_eq!(postgres().param_placeholder(1), "$1");
        assert_eq!(postgres().param_placeholder(10), "$10");
        assert_eq!(mysql().param_placeholder(3), "?");
    }

    #[test]
    fn test_every_builtin_names_every_concrete_type() {
        for dialect in [postgres(), mysql(), mysql_5_6(), sqlite(), h2()] {
            for logical in LogicalType::CONCRETE {
                let name = dialect.type_name(logical).unwrap();
                assert!(!name.is_empty(), "{} has no name for {}", dialect.name(), logical);
            }
        }
    }
}
