//! Ordered statement parameters keyed by column name.

use indexmap::IndexMap;

use super::ident::validate_name;
use super::types::LogicalType;
use super::value::SqlValue;
use crate::error::{Result, StoreError};

/// One bound column value with the logical type it is stored as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub value: SqlValue,
    pub logical_type: LogicalType,
}

/// Column values for one row, in insertion order.
///
/// Both single-record and bulk write paths build their rows through this type,
/// so every path covers the same columns in the same order. Column names are
/// unique; adding a name twice (directly or through [`Parameters::merge`]) is
/// an error rather than a silent overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    entries: IndexMap<String, Param>,
}

impl Parameters {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Usage` if the column is already present or the
    /// value does not fit the logical type, and `StoreError::Config` if the
    /// name is not a valid SQL name.
    pub fn add(
        &mut self,
        column: impl Into<String>,
        value: SqlValue,
        logical_type: LogicalType,
    ) -> Result<&mut Self> {
        let column = column.into();
        validate_name(&column)?;

        if self.contains(&column) {
            return Err(StoreError::Usage(format!(
                "Parameter '{}' is already bound",
                column
            )));
        }

        if !value.fits(logical_type) {
            return Err(StoreError::Usage(format!(
                "Value {} does not fit column '{}' of type {}",
                value, column, logical_type
            )));
        }

        self.entries.insert(
            column,
            Param {
                value,
                logical_type,
            },
        );
        Ok(self)
    }

    /// Builder-style [`Parameters::add`].
    pub fn with(
        mut self,
        column: impl Into<String>,
        value: SqlValue,
        logical_type: LogicalType,
    ) -> Result<Self> {
        self.add(column, value, logical_type)?;
        Ok(self)
    }

    /// Append every entry of `other`, keeping order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Usage` naming the first column present in both sets;
    /// `self` is left unchanged in that case.
    pub fn merge(&mut self, other: Parameters) -> Result<()> {
        if let Some(dup) = other.entries.keys().find(|k| self.contains(k)) {
            return Err(StoreError::Usage(format!(
                "Parameter '{}' is bound in both parameter sets",
                dup
            )));
        }
        self.entries.extend(other.entries);
        Ok(())
    }

    /// Whether a column is bound (case-insensitive, like unquoted SQL names).
    pub fn contains(&self, column: &str) -> bool {
        self.entries
            .keys()
            .any(|k| k.eq_ignore_ascii_case(column))
    }

    /// Look up a bound column.
    pub fn get(&self, column: &str) -> Option<&Param> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(column))
            .map(|(_, v)| v)
    }

    /// Column names in binding order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Values in binding order.
    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.entries.values().map(|p| &p.value)
    }

    /// `(column, param)` pairs in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Consume into the ordered value list.
    pub fn into_values(self) -> Vec<SqlValue> {
        self.entries.into_values().map(|p| p.value).collect()
    }

    /// Number of bound columns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
