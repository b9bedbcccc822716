//! SQL text assembly with bound parameters.

use crate::core::filter::{Filter, Operator};
use crate::core::params::Parameters;
use crate::core::schema::TableSchema;
use crate::core::value::SqlValue;
use crate::dialect::Dialect;
use crate::error::{Result, StoreError};

use super::BoundStatement;

/// Appends SQL fragments and binds values as dialect placeholders.
#[derive(Debug)]
pub struct StatementBuilder<'a> {
    dialect: &'a Dialect,
    sql: String,
    params: Vec<SqlValue>,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(dialect: &'a Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Append raw SQL text.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a placeholder bound to `value`.
    pub fn bind(&mut self, value: SqlValue) -> &mut Self {
        self.params.push(value);
        let placeholder = self.dialect.param_placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Append `(?, ?, ...)` for the values of one row.
    pub fn bind_row(&mut self, row: Parameters) -> &mut Self {
        self.push("(");
        for (i, value) in row.into_values().into_iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.bind(value);
        }
        self.push(")")
    }

    /// Append a `WHERE` clause for the filter, if any.
    pub fn push_where(
        &mut self,
        filter: Option<&Filter>,
        schema: &TableSchema,
    ) -> Result<&mut Self> {
        if let Some(filter) = filter {
            self.push(" WHERE ");
            self.push_filter(filter, schema)?;
        }
        Ok(self)
    }

    /// Render a filter tree, checking columns and values against the schema.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidFilter` for unknown columns, values of the
    /// wrong type, ordering comparisons against NULL, or keys of the wrong
    /// kind.
    pub fn push_filter(&mut self, filter: &Filter, schema: &TableSchema) -> Result<&mut Self> {
        match filter {
            Filter::Compare { column, op, value } => {
                let declared = schema.column(column).ok_or_else(|| {
                    StoreError::InvalidFilter(format!(
                        "column '{}' does not exist in table {}",
                        column,
                        schema.name()
                    ))
                })?;
                if !value.fits(declared.logical_type) {
                    return Err(StoreError::InvalidFilter(format!(
                        "value {} does not fit column '{}' of type {}",
                        value, declared.name, declared.logical_type
                    )));
                }
                self.push_comparison(&declared.name, *op, value.clone())?;
            }
            Filter::Key { op, key } => {
                let value = schema
                    .key()
                    .normalize(key)
                    .map_err(|e| StoreError::InvalidFilter(e.to_string()))?;
                self.push_comparison(schema.id_column(), *op, value)?;
            }
            Filter::And(children) => self.push_composite(children, " AND ", "1 = 1", schema)?,
            Filter::Or(children) => self.push_composite(children, " OR ", "1 = 0", schema)?,
        }
        Ok(self)
    }

    fn push_comparison(&mut self, column: &str, op: Operator, value: SqlValue) -> Result<()> {
        self.push(column);
        match (value.is_null(), op) {
            (true, Operator::Eq) => {
                self.push(" IS NULL");
            }
            (true, Operator::Ne) => {
                self.push(" IS NOT NULL");
            }
            (true, op) => {
                return Err(StoreError::InvalidFilter(format!(
                    "'{} {} NULL' is never true; use an equality test for NULL",
                    column, op
                )))
            }
            (false, op) => {
                self.push(" ").push(op.as_sql()).push(" ").bind(value);
            }
        }
        Ok(())
    }

    fn push_composite(
        &mut self,
        children: &[Filter],
        joiner: &str,
        empty: &str,
        schema: &TableSchema,
    ) -> Result<()> {
        match children {
            [] => {
                self.push(empty);
            }
            [only] => {
                self.push_filter(only, schema)?;
            }
            _ => {
                self.push("(");
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        self.push(joiner);
                    }
                    self.push_filter(child, schema)?;
                }
                self.push(")");
            }
        }
        Ok(())
    }

    pub fn build(self) -> BoundStatement {
        BoundStatement::new(self.sql, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::key::{KeyKind, KeyStrategy, KeyValue};
    use crate::core::schema::Column;
    use crate::core::types::LogicalType;
    use crate::dialect;

    fn schema() -> TableSchema {
        TableSchema::new(
            "documents",
            vec![
                Column::new("id", LogicalType::Identifier).primary_key(),
                Column::new("data", LogicalType::Bytes).not_null(),
                Column::new("owner", LogicalType::BoundedString),
                Column::new("version", LogicalType::Int32),
            ],
            "id",
            KeyStrategy::for_kind(KeyKind::Int64),
        )
        .unwrap()
    }

    fn render(filter: &Filter) -> Result<BoundStatement> {
        let dialect = dialect::postgres();
        let mut b = StatementBuilder::new(&dialect);
        b.push("SELECT id FROM documents");
        b.push_where(Some(filter), &schema())?;
        Ok(b.build())
    }

    #[test]
    fn test_null_equality_renders_is_null() {
        let stmt = render(&Filter::is_null("owner", LogicalType::BoundedString)).unwrap();
        assert_eq!(stmt.sql, "SELECT id FROM documents WHERE owner IS NULL");
        assert!(stmt.params.is_empty());

        let not_null = Filter::ne("owner", SqlValue::Null(LogicalType::BoundedString));
        let stmt = render(&not_null).unwrap();
        assert_eq!(stmt.sql, "SELECT id FROM documents WHERE owner IS NOT NULL");
    }

    #[test]
    fn test_ordering_against_null_is_rejected() {
        let err = render(&Filter::lt("version", SqlValue::Null(LogicalType::Int32))).unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilter(_)));
    }

    #[test]
    fn test_nested_composites_are_parenthesized() {
        let filter = Filter::and(vec![
            Filter::ge("version", 2),
            Filter::or(vec![Filter::eq("owner", "ann"), Filter::eq("owner", "bob")]),
            Filter::key(Operator::Ne, KeyValue::Int64(7)),
        ]);
        let stmt = render(&filter).unwrap();
        assert_eq!(
            stmt.sql,
            concat!(
                "SELECT id FROM documents WHERE ",
                "(version >= $1 AND (owner = $2 OR owner = $3) AND id <> $4)"
            )
        );
        assert_eq!(
            stmt.params,
            vec![SqlValue::I32(2), "ann".into(), "bob".into(), SqlValue::I64(7)]
        );
    }

    #[test]
    fn test_empty_composites() {
        assert_eq!(
            render(&Filter::and(vec![])).unwrap().sql,
            "SELECT id FROM documents WHERE 1 = 1"
        );
        assert_eq!(
            render(&Filter::or(vec![])).unwrap().sql,
            "SELECT id FROM documents WHERE 1 = 0"
        );
    }

    #[test]
    fn test_filter_checked_against_schema() {
        assert!(matches!(
            render(&Filter::eq("missing", 1)),
            Err(StoreError::InvalidFilter(_))
        ));
        assert!(matches!(
            render(&Filter::eq("version", "three")),
            Err(StoreError::InvalidFilter(_))
        ));
        assert!(matches!(
            render(&Filter::key(Operator::Eq, KeyValue::Text("x".into()))),
            Err(StoreError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_positional_placeholders() {
        let dialect = dialect::mysql();
        let mut b = StatementBuilder::new(&dialect);
        b.push("DELETE FROM t WHERE id = ").bind(SqlValue::I64(1));
        assert_eq!(b.build().sql, "DELETE FROM t WHERE id = ?");
    }
}
