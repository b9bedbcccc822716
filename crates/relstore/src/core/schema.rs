//! Table schema metadata and DDL rendering.
//!
//! A [`TableSchema`] is computed once when a table is constructed and is
//! immutable afterwards. Validation happens in [`TableSchema::new`], so a bad
//! schema never reaches the database.

use serde::{Deserialize, Serialize};

use super::ident::{same_name, validate_name};
use super::key::{KeyKind, KeyStrategy};
use super::types::{LogicalType, TypeMapping};
use super::value::SqlValue;
use crate::error::{Result, StoreError};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Logical storage type.
    #[serde(rename = "type")]
    pub logical_type: LogicalType,

    /// Whether the column allows NULL.
    #[serde(default = "default_true")]
    pub nullable: bool,

    /// Whether the column is part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
}

fn default_true() -> bool {
    true
}

impl Column {
    /// Nullable, non-key column.
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: true,
            primary_key: false,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column as part of the primary key (implies NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }
}

/// Default literals for well-known column names.
///
/// Passed to the table alongside its schema; the table itself never inspects
/// column names to decide on defaults. A default only applies when its value
/// fits the column's logical type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultPolicy {
    defaults: Vec<(String, SqlValue)>,
}

impl DefaultPolicy {
    /// Policy with no defaults.
    pub fn none() -> Self {
        Self::default()
    }

    /// Lifecycle flags default to `false`, the version counter to `0`.
    pub fn standard() -> Self {
        Self::none()
            .with("archived", SqlValue::Bool(false))
            .with("deleted", SqlValue::Bool(false))
            .with("version", SqlValue::I32(0))
    }

    /// Add or replace the default for a column name.
    pub fn with(mut self, column: impl Into<String>, value: SqlValue) -> Self {
        let column = column.into();
        self.defaults.retain(|(name, _)| !same_name(name, &column));
        self.defaults.push((column, value));
        self
    }

    /// Default literal for a column, if the policy has one that fits.
    pub fn default_for(&self, column: &Column) -> Option<&SqlValue> {
        self.defaults
            .iter()
            .find(|(name, value)| {
                same_name(name, &column.name) && !value.is_null() && value.fits(column.logical_type)
            })
            .map(|(_, value)| value)
    }
}

/// Validated, immutable schema of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    id_column: String,
    key: KeyStrategy,
}

impl TableSchema {
    /// Validate columns and resolve the identifier placeholder.
    ///
    /// The column named `id_column` takes the key kind's persisted type if it
    /// was declared with [`LogicalType::Identifier`].
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Schema` if:
    /// - a name is invalid or a column name repeats
    /// - `id_column` is not among the columns
    /// - the identifier column's declared type differs from the key's type
    /// - any other column uses the identifier placeholder
    pub fn new(
        name: impl Into<String>,
        columns: Vec<Column>,
        id_column: impl Into<String>,
        key: KeyStrategy,
    ) -> Result<Self> {
        let name = name.into();
        let id_column = id_column.into();
        let fail = |msg: String| StoreError::schema(name.clone(), msg);

        validate_name(&name).map_err(|e| fail(e.to_string()))?;

        if columns.is_empty() {
            return Err(fail("table has no columns".to_string()));
        }

        let mut resolved = Vec::with_capacity(columns.len());
        for column in columns {
            validate_name(&column.name).map_err(|e| fail(e.to_string()))?;

            if resolved
                .iter()
                .any(|c: &Column| same_name(&c.name, &column.name))
            {
                return Err(fail(format!("duplicate column '{}'", column.name)));
            }

            let is_id = same_name(&column.name, &id_column);
            let column = match (is_id, column.logical_type) {
                (true, LogicalType::Identifier) => Column {
                    logical_type: key.logical_type(),
                    ..column
                },
                (true, declared) if declared != key.logical_type() => {
                    return Err(fail(format!(
                        "identifier column '{}' is declared {} but {} keys persist as {}",
                        column.name,
                        declared,
                        key.kind(),
                        key.logical_type()
                    )));
                }
                (false, LogicalType::Identifier) => {
                    return Err(fail(format!(
                        "column '{}' uses the identifier type but is not the identifier \
                         column '{}'",
                        column.name, id_column
                    )));
                }
                _ => column,
            };
            resolved.push(column);
        }

        if !resolved.iter().any(|c| same_name(&c.name, &id_column)) {
            return Err(fail(format!(
                "identifier column '{}' is not declared",
                id_column
            )));
        }

        Ok(Self {
            name,
            columns: resolved,
            id_column,
            key,
        })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in DDL order, with the identifier type resolved.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Name of the identifier column.
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Key strategy of the identifier column.
    pub fn key(&self) -> KeyStrategy {
        self.key
    }

    /// Key kind of the identifier column.
    pub fn key_kind(&self) -> KeyKind {
        self.key.kind()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| same_name(&c.name, name))
    }

    /// Primary key column names in column order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Render `CREATE TABLE IF NOT EXISTS` for this schema.
    ///
    /// Output is deterministic: columns appear in declaration order, and the
    /// `PRIMARY KEY` clause is present only when a column is key-flagged.
    pub fn create_table_sql(
        &self,
        mapping: &TypeMapping,
        defaults: &DefaultPolicy,
    ) -> Result<String> {
        let mut defs = Vec::with_capacity(self.columns.len() + 1);

        for column in &self.columns {
            let mut def = format!("{} {}", column.name, mapping.type_name(column.logical_type)?);
            if let Some(value) = defaults.default_for(column) {
                def.push_str(" DEFAULT ");
                def.push_str(&value.to_sql_literal());
            }
            if !column.nullable {
                def.push_str(" NOT NULL");
            }
            defs.push(def);
        }

        let pk = self.primary_key();
        if !pk.is_empty() {
            defs.push(format!("PRIMARY KEY({})", pk.join(",")));
        }

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            self.name,
            defs.join(", ")
        ))
    }
}

/// Table definition as written in YAML (used by tooling to preview DDL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,

    /// Identifier column name.
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Kind of key stored in the identifier column.
    pub key: KeyKind,

    /// Columns in DDL order.
    pub columns: Vec<Column>,
}

fn default_id_column() -> String {
    "id".to_string()
}

impl TableDefinition {
    /// Parse a definition from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate into a schema.
    pub fn into_schema(self) -> Result<TableSchema> {
        TableSchema::new(
            self.name,
            self.columns,
            self.id_column,
            KeyStrategy::for_kind(self.key),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> TypeMapping {
        TypeMapping::builder()
            .map(LogicalType::Bytes, "BYTEA")
            .map(LogicalType::Int32, "INTEGER")
            .map(LogicalType::Int64, "BIGINT")
            .map(LogicalType::BoundedString, "VARCHAR(255)")
            .map(LogicalType::UnboundedString, "TEXT")
            .map(LogicalType::Boolean, "BOOLEAN")
            .build()
            .unwrap()
    }

    fn lifecycle_schema() -> TableSchema {
        TableSchema::new(
            "documents",
            vec![
                Column::new("id", LogicalType::Identifier).primary_key(),
                Column::new("archived", LogicalType::Boolean).not_null(),
                Column::new("version", LogicalType::Int32).not_null(),
            ],
            "id",
            KeyStrategy::for_kind(KeyKind::Text),
        )
        .unwrap()
    }

    #[test]
    fn test_ddl_for_lifecycle_columns() {
        let sql = lifecycle_schema()
            .create_table_sql(&mapping(), &DefaultPolicy::standard())
            .unwrap();

        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS documents (id VARCHAR(255) NOT NULL, \
             archived BOOLEAN DEFAULT false NOT NULL, \
             version INTEGER DEFAULT 0 NOT NULL, PRIMARY KEY(id));"
        );
    }

    #[test]
    fn test_ddl_is_deterministic() {
        let schema = lifecycle_schema();
        let a = schema.create_table_sql(&mapping(), &DefaultPolicy::standard()).unwrap();
        let b = schema.create_table_sql(&mapping(), &DefaultPolicy::standard()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ddl_without_defaults_or_primary_key() {
        let schema = TableSchema::new(
            "events",
            vec![
                Column::new("owner", LogicalType::Identifier).not_null(),
                Column::new("payload", LogicalType::Bytes),
            ],
            "owner",
            KeyStrategy::for_kind(KeyKind::Int64),
        )
        .unwrap();

        let sql = schema.create_table_sql(&mapping(), &DefaultPolicy::none()).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS events (owner BIGINT NOT NULL, payload BYTEA);"
        );
    }

    #[test]
    fn test_default_policy_requires_matching_type() {
        let policy = DefaultPolicy::standard();
        assert!(policy
            .default_for(&Column::new("version", LogicalType::Int64))
            .is_some());
        assert!(policy
            .default_for(&Column::new("version", LogicalType::BoundedString))
            .is_none());
        assert!(policy
            .default_for(&Column::new("ARCHIVED", LogicalType::Boolean))
            .is_some());
    }

    #[test]
    fn test_placeholder_on_other_column_is_rejected() {
        let result = TableSchema::new(
            "bad",
            vec![
                Column::new("id", LogicalType::Identifier).primary_key(),
                Column::new("parent", LogicalType::Identifier),
            ],
            "id",
            KeyStrategy::for_kind(KeyKind::Int64),
        );

        let err = result.unwrap_err().to_string();
        assert!(err.contains("parent"));
        assert!(err.contains("identifier type"));
    }

    #[test]
    fn test_identifier_column_must_match_key_type() {
        let result = TableSchema::new(
            "bad",
            vec![Column::new("id", LogicalType::Int32).primary_key()],
            "id",
            KeyStrategy::for_kind(KeyKind::Structured),
        );
        assert!(result.is_err());

        let ok = TableSchema::new(
            "good",
            vec![Column::new("id", LogicalType::BoundedString).primary_key()],
            "id",
            KeyStrategy::for_kind(KeyKind::Structured),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_missing_and_duplicate_columns_rejected() {
        let missing = TableSchema::new(
            "t",
            vec![Column::new("data", LogicalType::Bytes)],
            "id",
            KeyStrategy::for_kind(KeyKind::Int64),
        );
        assert!(missing.unwrap_err().to_string().contains("not declared"));

        let dup = TableSchema::new(
            "t",
            vec![
                Column::new("id", LogicalType::Identifier),
                Column::new("ID", LogicalType::Int64),
            ],
            "id",
            KeyStrategy::for_kind(KeyKind::Int64),
        );
        assert!(dup.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_table_definition_from_yaml() {
        let yaml = r#"
name: documents
key: text
columns:
  - name: id
    type: identifier
    primary_key: true
  - name: archived
    type: boolean
    nullable: false
"#;
        let schema = TableDefinition::from_yaml(yaml)
            .unwrap()
            .into_schema()
            .unwrap();
        assert_eq!(schema.id_column(), "id");
        assert_eq!(
            schema.column("id").unwrap().logical_type,
            LogicalType::BoundedString
        );
        assert_eq!(schema.primary_key(), vec!["id"]);
    }
}
