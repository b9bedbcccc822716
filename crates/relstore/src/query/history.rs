//! Factories for append-only tables.
//!
//! Rows are keyed by `(id, revision)`. Every insert stamps a fresh revision
//! from a [`RevisionClock`], so writes never replace earlier rows and reads
//! come back newest first.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::core::filter::Filter;
use crate::core::key::KeyValue;
use crate::core::params::Parameters;
use crate::core::schema::TableSchema;
use crate::core::types::LogicalType;
use crate::core::value::SqlValue;
use crate::dialect::Dialect;
use crate::error::{Result, StoreError};

use super::standard::{build_insert, push_id_predicate};
use super::statement::StatementBuilder;
use super::{BoundStatement, ReadQueryFactory, WriteQueryFactory, DATA_COLUMN, REVISION_COLUMN};

/// Strictly increasing revision numbers: microseconds since the epoch, bumped
/// past the previous value when the wall clock stalls or steps back.
#[derive(Debug, Default)]
pub struct RevisionClock {
    last: AtomicI64,
}

impl RevisionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next revision.
    pub fn next(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(current + 1);
            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Read statements of an append-only table.
#[derive(Debug, Clone)]
pub struct HistoryReadFactory {
    schema: Arc<TableSchema>,
    dialect: Arc<Dialect>,
}

impl HistoryReadFactory {
    pub fn new(schema: Arc<TableSchema>, dialect: Arc<Dialect>) -> Self {
        Self { schema, dialect }
    }
}

impl ReadQueryFactory for HistoryReadFactory {
    fn select_by_id(&self, id: &KeyValue) -> Result<BoundStatement> {
        Err(StoreError::Unsupported(format!(
            "{} keeps every revision of {}; read its history instead",
            self.schema.name(),
            id
        )))
    }

    fn exists(&self, id: &KeyValue) -> Result<BoundStatement> {
        let mut b = StatementBuilder::new(&self.dialect);
        b.push("SELECT COUNT(*) FROM ").push(self.schema.name());
        push_id_predicate(&mut b, &self.schema, id)?;
        Ok(b.build())
    }

    fn index(&self) -> Result<BoundStatement> {
        Ok(BoundStatement::new(
            format!("SELECT DISTINCT {} FROM {}", self.schema.id_column(), self.schema.name()),
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
        b.push(" ORDER BY ").push(REVISION_COLUMN).push(" DESC");
        Ok(b.build())
    }

    fn count(&self) -> Result<BoundStatement> {
        Ok(BoundStatement::new(
            format!("SELECT COUNT(*) FROM {}", self.schema.name()),
            Vec::new(),
        ))
    }

    fn select_all_by_id(&self, id: &KeyValue, fetch_size: usize) -> Result<BoundStatement> {
        let mut b = StatementBuilder::new(&self.dialect);
        b.push("SELECT ").push(DATA_COLUMN).push(" FROM ").push(self.schema.name());
        push_id_predicate(&mut b, &self.schema, id)?;
        b.push(" ORDER BY ").push(REVISION_COLUMN).push(" DESC");
        Ok(b.build().with_fetch_size(fetch_size))
    }
}

/// Write statements of an append-only table.
#[derive(Debug)]
pub struct HistoryWriteFactory {
    schema: Arc<TableSchema>,
    dialect: Arc<Dialect>,
    clock: RevisionClock,
}

impl HistoryWriteFactory {
    pub fn new(schema: Arc<TableSchema>, dialect: Arc<Dialect>) -> Self {
        Self {
            schema,
            dialect,
            clock: RevisionClock::new(),
        }
    }

    fn stamp(&self, mut row: Parameters) -> Result<Parameters> {
        let revision = Parameters::new().with(
            REVISION_COLUMN,
            SqlValue::I64(self.clock.next()),
            LogicalType::Int64,
        )?;
        row.merge(revision)?;
        Ok(row)
    }
}

impl WriteQueryFactory for HistoryWriteFactory {
    fn insert(&self, row: Parameters) -> Result<BoundStatement> {
        let row = self.stamp(row)?;
        build_insert(&self.dialect, self.schema.name(), vec![row])
    }

    fn update(&self, row: Parameters) -> Result<BoundStatement> {
        warn!(
            "{} is append-only; writing a new revision instead of updating",
            self.schema.name()
        );
        self.insert(row)
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
        let rows = rows
            .into_iter()
            .map(|row| self.stamp(row))
            .collect::<Result<Vec<_>>>()?;
        build_insert(&self.dialect, self.schema.name(), rows)
    }
}
