//! Factories for tables with one row per identifier.

use std::sync::Arc;

use crate::core::filter::Filter;
use crate::core::key::KeyValue;
use crate::core::params::Parameters;
use crate::core::schema::TableSchema;
use crate::dialect::Dialect;
use crate::error::{Result, StoreError};

use super::statement::StatementBuilder;
use super::{BoundStatement, ReadQueryFactory, WriteQueryFactory, DATA_COLUMN};

/// Read statements of a standard table.
#[derive(Debug, Clone)]
pub struct StandardReadFactory {
    schema: Arc<TableSchema>,
    dialect: Arc<Dialect>,
}

impl StandardReadFactory {
    pub fn new(schema: Arc<TableSchema>, dialect: Arc<Dialect>) -> Self {
        Self { schema, dialect }
    }
}

/// `... WHERE <id column> = ?`
pub(super) fn push_id_predicate(
    b: &mut StatementBuilder<'_>,
    schema: &TableSchema,
    id: &KeyValue,
) -> Result<()> {
    let value = schema.key().normalize(id)?;
    b.push(" WHERE ").push(schema.id_column()).push(" = ").bind(value);
    Ok(())
}

impl ReadQueryFactory for StandardReadFactory {
    fn select_by_id(&self, id: &KeyValue) -> Result<BoundStatement> {
        let mut b = StatementBuilder::new(&self.dialect);
        b.push("SELECT ").push(DATA_COLUMN).push(" FROM ").push(self.schema.name());
        push_id_predicate(&mut b, &self.schema, id)?;
        Ok(b.build())
    }

    fn exists(&self, id: &KeyValue) -> Result<BoundStatement> {
        let mut b = StatementBuilder::new(&self.dialect);
        b.push("SELECT COUNT(*) FROM ").push(self.schema.name());
        push_id_predicate(&mut b, &self.schema, id)?;
        Ok(b.build())
    }

    fn index(&self) -> Result<BoundStatement> {
        Ok(BoundStatement::new(
            format!("SELECT {} FROM {}", self.schema.id_column(), self.schema.name()),
            Vec::new(),
        ))
    }

    fn scan(&self, filter: Option<&Filter>) -> Result<BoundStatement> {
        let mut b = StatementBuilder::new(&self.dialect);
        b.push("SELECT ")
            .push(self.schema.id_column())
            .push(", ")
            .push(DATA_COLUMN)
            .push(" FROM ")
            .push(self.schema.name());
        b.push_where(filter, &self.schema)?;
        Ok(b.build())
    }

    fn count(&self) -> Result<BoundStatement> {
        Ok(BoundStatement::new(
            format!("SELECT COUNT(*) FROM {}", self.schema.name()),
            Vec::new(),
        ))
    }
}

/// Write statements of a standard table.
#[derive(Debug, Clone)]
pub struct StandardWriteFactory {
    schema: Arc<TableSchema>,
    dialect: Arc<Dialect>,
}

impl StandardWriteFactory {
    pub fn new(schema: Arc<TableSchema>, dialect: Arc<Dialect>) -> Self {
        Self { schema, dialect }
    }
}

/// `INSERT INTO t (a, b) VALUES (?, ?), ...` for rows already known to share
/// one column list.
pub(super) fn build_insert(
    dialect: &Dialect,
    table: &str,
    rows: Vec<Parameters>,
) -> Result<BoundStatement> {
    let columns: Vec<String> = match rows.first() {
        Some(first) => first.columns().map(str::to_string).collect(),
        None => return Err(StoreError::Usage("nothing to insert".to_string())),
    };
    if columns.is_empty() {
        return Err(StoreError::Usage("cannot insert a row without columns".to_string()));
    }
    for (i, row) in rows.iter().enumerate().skip(1) {
        if !row.columns().eq(columns.iter().map(String::as_str)) {
            return Err(StoreError::Usage(format!(
                "row {} binds columns ({}) but row 0 binds ({})",
                i,
                row.columns().collect::<Vec<_>>().join(", "),
                columns.join(", ")
            )));
        }
    }

    let mut b = StatementBuilder::new(dialect);
    b.push("INSERT INTO ")
        .push(table)
        .push(" (")
        .push(&columns.join(", "))
        .push(") VALUES ");
    for (i, row) in rows.into_iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.bind_row(row);
    }
    Ok(b.build())
}

impl WriteQueryFactory for StandardWriteFactory {
    fn insert(&self, row: Parameters) -> Result<BoundStatement> {
        build_insert(&self.dialect, self.schema.name(), vec![row])
    }

    fn update(&self, row: Parameters) -> Result<BoundStatement> {
        let id_column = self.schema.id_column();
        let id = row
            .get(id_column)
            .map(|p| p.value.clone())
            .ok_or_else(|| StoreError::Usage(format!("update row does not bind '{}'", id_column)))?;

        let mut b = StatementBuilder::new(&self.dialect);
        b.push("UPDATE ").push(self.schema.name()).push(" SET ");
        let mut assigned = 0;
        for (column, param) in row.iter().filter(|(c, _)| !c.eq_ignore_ascii_case(id_column)) {
            if assigned > 0 {
                b.push(", ");
            }
            b.push(column).push(" = ").bind(param.value.clone());
            assigned += 1;
        }
        if assigned == 0 {
            return Err(StoreError::Usage(
                "update row binds no columns besides the identifier".to_string(),
            ));
        }
        b.push(" WHERE ").push(id_column).push(" = ").bind(id);
        Ok(b.build())
    }

    fn delete(&self, id: &KeyValue) -> Result<BoundStatement> {
        let mut b = StatementBuilder::new(&self.dialect);
        b.push("DELETE FROM ").push(self.schema.name());
        push_id_predicate(&mut b, &self.schema, id)?;
        Ok(b.build())
    }

    fn delete_all(&self) -> Result<BoundStatement> {
        Ok(BoundStatement::new(
            format!("DELETE FROM {}", self.schema.name()),
            Vec::new(),
        ))
    }

    fn insert_all(&self, rows: Vec<Parameters>) -> Result<BoundStatement> {
        if rows.is_empty() {
            return Err(StoreError::Usage(format!(
                "bulk insert into {} needs at least one record",
                self.schema.name()
            )));
        }
        build_insert(&self.dialect, self.schema.name(), rows)
    }
}
