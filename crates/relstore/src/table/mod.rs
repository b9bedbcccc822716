//! Typed tables over a storage session.
//!
//! A [`Table`] stores records of one type `R` under identifiers of one type
//! `K`. Its columns are fixed when it is created:
//!
//! | Column     | Type                   | Notes                         |
//! |------------|------------------------|-------------------------------|
//! | `id`       | key kind's persisted   | primary key                   |
//! | `revision` | 64-bit integer         | [`HistoryTable`] only, in key |
//! | `data`     | bytes                  | serialized record             |
//! | extras     | declared by `R`        | appended in declaration order |

mod history;

pub use history::HistoryTable;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, info};

use crate::core::filter::Filter;
use crate::core::key::{Key, KeyStrategy};
use crate::core::params::Parameters;
use crate::core::record::{Projection, Record};
use crate::core::schema::{Column, DefaultPolicy, TableSchema};
use crate::core::types::LogicalType;
use crate::core::value::{Row, SqlValue};
use crate::cursor::Cursor;
use crate::error::{Result, StoreError};
use crate::query::{
    BoundStatement, HistoryReadFactory, HistoryWriteFactory, ReadQueryFactory, StandardReadFactory,
    StandardWriteFactory, WriteQueryFactory, DATA_COLUMN, REVISION_COLUMN,
};
use crate::serializer::Serializer;
use crate::storage::Session;

/// Name of the identifier column.
pub const ID_COLUMN: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TableKind {
    Standard,
    History,
}

/// Records of type `R` keyed by `K`.
pub struct Table<K: Key, R: Record> {
    session: Arc<Session>,
    schema: Arc<TableSchema>,
    fixed_columns: usize,
    defaults: DefaultPolicy,
    reads: Box<dyn ReadQueryFactory>,
    writes: Box<dyn WriteQueryFactory>,
    serializer: Serializer,
    _marker: PhantomData<fn() -> (K, R)>,
}

fn build_schema<K: Key, R: Record>(name: &str, kind: TableKind) -> Result<(TableSchema, usize)> {
    let mut columns = vec![Column::new(ID_COLUMN, LogicalType::Identifier).primary_key()];
    if kind == TableKind::History {
        columns.push(Column::new(REVISION_COLUMN, LogicalType::Int64).primary_key());
    }
    columns.push(Column::new(DATA_COLUMN, LogicalType::Bytes).not_null());
    let fixed = columns.len();

    for extra in R::extra_columns() {
        if extra.primary_key {
            return Err(StoreError::schema(
                name,
                format!("extra column '{}' cannot be part of the primary key", extra.name),
            ));
        }
        columns.push(extra);
    }

    let schema = TableSchema::new(name, columns, ID_COLUMN, KeyStrategy::for_kind(K::KIND))?;
    Ok((schema, fixed))
}

fn decode_payload<R: Record>(
    serializer: Serializer,
    value: Option<SqlValue>,
    projection: Option<&Projection>,
) -> Result<R> {
    match value {
        Some(SqlValue::Bytes(bytes)) => serializer.deserialize(&bytes, projection),
        Some(other) => Err(StoreError::storage(
            "decoding record payload",
            format!("expected bytes, found {}", other),
        )),
        None => Err(StoreError::storage(
            "decoding record payload",
            "row has no payload column",
        )),
    }
}

fn decode_count(row: Row) -> Result<u64> {
    row.first()
        .and_then(SqlValue::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| {
            StoreError::storage("decoding row count", format!("unexpected count row {:?}", row))
        })
}

impl<K: Key, R: Record> Table<K, R> {
    pub(crate) fn new(
        session: Arc<Session>,
        name: &str,
        kind: TableKind,
        defaults: DefaultPolicy,
    ) -> Result<Self> {
        let (schema, fixed_columns) = build_schema::<K, R>(name, kind)?;
        let schema = Arc::new(schema);
        let dialect = session.dialect();

        // Every column must have a type name in this dialect.
        schema
            .create_table_sql(dialect.type_mapping(), &defaults)
            .map_err(|e| StoreError::schema(name, e.to_string()))?;

        let (reads, writes): (Box<dyn ReadQueryFactory>, Box<dyn WriteQueryFactory>) = match kind {
            TableKind::Standard => (
                Box::new(StandardReadFactory::new(schema.clone(), dialect.clone())),
                Box::new(StandardWriteFactory::new(schema.clone(), dialect)),
            ),
            TableKind::History => (
                Box::new(HistoryReadFactory::new(schema.clone(), dialect.clone())),
                Box::new(HistoryWriteFactory::new(schema.clone(), dialect)),
            ),
        };

        debug!("Table {} has {} columns", schema.name(), schema.columns().len());

        Ok(Self {
            session,
            schema,
            fixed_columns,
            defaults,
            reads,
            writes,
            serializer: Serializer::new(),
            _marker: PhantomData,
        })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Resolved schema.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table.
    pub fn ddl(&self) -> Result<String> {
        self.schema
            .create_table_sql(self.session.dialect().type_mapping(), &self.defaults)
    }

    /// Create the table unless it exists. Running it again changes nothing.
    pub async fn create_if_not_exists(&self) -> Result<()> {
        let ddl = self.ddl()?;
        self.session.execute(BoundStatement::new(ddl, Vec::new())).await?;
        info!("Ensured table {}", self.name());
        Ok(())
    }

    /// The record stored under `id`, if any.
    pub async fn read(&self, id: &K) -> Result<Option<R>> {
        let stmt = self.reads.select_by_id(&id.to_key_value())?;
        let serializer = self.serializer;
        self.session
            .query_first(stmt, move |row| {
                decode_payload(serializer, row.into_iter().next(), None)
            })
            .await
    }

    /// Store `record` under `id`, replacing any existing record.
    ///
    /// This checks for the row and then updates or inserts it, as two separate
    /// statements. Concurrent writers of the same identifier can race between
    /// the two; callers that need strict upsert semantics serialize writes per
    /// identifier.
    pub async fn write(&self, id: &K, record: &R) -> Result<()> {
        let row = self.row_for(id, record)?;
        let stmt = if self.contains(id).await? {
            self.writes.update(row)?
        } else {
            self.writes.insert(row)?
        };
        self.session.execute(stmt).await?;
        Ok(())
    }

    /// Insert without checking for an existing row.
    pub(crate) async fn insert(&self, id: &K, record: &R) -> Result<()> {
        let row = self.row_for(id, record)?;
        self.session.execute(self.writes.insert(row)?).await?;
        Ok(())
    }

    /// Delete the rows stored under `id`; returns whether any existed.
    pub async fn delete(&self, id: &K) -> Result<bool> {
        let stmt = self.writes.delete(&id.to_key_value())?;
        Ok(self.session.execute(stmt).await? > 0)
    }

    /// Delete every row; returns how many were removed.
    pub async fn delete_all(&self) -> Result<u64> {
        self.session.execute(self.writes.delete_all()?).await
    }

    /// Whether a row exists under `id`.
    pub async fn contains(&self, id: &K) -> Result<bool> {
        let stmt = self.reads.exists(&id.to_key_value())?;
        let count = self.session.query_first(stmt, decode_count).await?;
        Ok(count.unwrap_or(0) > 0)
    }

    /// Number of rows.
    pub async fn count(&self) -> Result<u64> {
        let count = self.session.query_first(self.reads.count()?, decode_count).await?;
        Ok(count.unwrap_or(0))
    }

    /// Every identifier, in no particular order.
    pub async fn index(&self) -> Result<Cursor<K>> {
        let key = self.schema.key();
        self.session
            .query(self.reads.index()?, move |row| {
                let stored = row.into_iter().next().ok_or_else(|| {
                    StoreError::storage("decoding identifier", "row has no identifier column")
                })?;
                K::from_key_value(key.denormalize(stored)?)
            })
            .await
    }

    /// Identifier and record of every row matching `filter`.
    ///
    /// With a projection, only the listed top-level fields are decoded; the
    /// rest take their serde defaults.
    pub async fn scan(
        &self,
        filter: Option<&Filter>,
        projection: Option<&Projection>,
    ) -> Result<Cursor<(K, R)>> {
        let stmt = self.reads.scan(filter)?;
        let key = self.schema.key();
        let serializer = self.serializer;
        let projection = projection.cloned();
        self.session
            .query(stmt, move |row| {
                let mut values = row.into_iter();
                let stored = values.next().ok_or_else(|| {
                    StoreError::storage("decoding identifier", "row has no identifier column")
                })?;
                let id = K::from_key_value(key.denormalize(stored)?)?;
                let record = decode_payload(serializer, values.next(), projection.as_ref())?;
                Ok((id, record))
            })
            .await
    }

    /// Insert every record with a single statement; returns the row count.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Usage` for an empty slice.
    pub async fn insert_all(&self, records: &[(K, R)]) -> Result<u64> {
        if records.is_empty() {
            return Err(StoreError::Usage(format!(
                "bulk insert into {} needs at least one record",
                self.name()
            )));
        }
        let rows = records
            .iter()
            .map(|(id, record)| self.row_for(id, record))
            .collect::<Result<Vec<_>>>()?;
        self.session.execute(self.writes.insert_all(rows)?).await
    }

    /// Every record stored under `id`, newest first, fetched `batch_size`
    /// rows at a time.
    pub(crate) async fn all_by_id(&self, id: &K, batch_size: usize) -> Result<Cursor<R>> {
        if batch_size == 0 {
            return Err(StoreError::Usage("batch size must be at least 1".to_string()));
        }
        let stmt = self.reads.select_all_by_id(&id.to_key_value(), batch_size)?;
        let serializer = self.serializer;
        self.session
            .query(stmt, move |row| decode_payload(serializer, row.into_iter().next(), None))
            .await
    }

    /// Column values of one record: identifier, payload, then extras.
    fn row_for(&self, id: &K, record: &R) -> Result<Parameters> {
        let key = self.schema.key();
        let mut row = Parameters::new();
        row.add(
            self.schema.id_column(),
            key.normalize(&id.to_key_value())?,
            key.logical_type(),
        )?;
        row.add(
            DATA_COLUMN,
            SqlValue::Bytes(self.serializer.serialize(record)?),
            LogicalType::Bytes,
        )?;

        let mut supplied = record.extra_values();
        for column in &self.schema.columns()[self.fixed_columns..] {
            let value = match supplied
                .iter()
                .position(|(name, _)| name.eq_ignore_ascii_case(&column.name))
            {
                Some(i) => supplied.swap_remove(i).1,
                None => self
                    .defaults
                    .default_for(column)
                    .cloned()
                    .unwrap_or(SqlValue::Null(column.logical_type)),
            };
            row.add(&column.name, value, column.logical_type)?;
        }

        if let Some((name, _)) = supplied.first() {
            return Err(StoreError::Usage(format!(
                "record supplies a value for '{}', which table {} does not declare",
                name,
                self.name()
            )));
        }
        Ok(row)
    }
}

impl<K: Key, R: Record> fmt::Debug for Table<K, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.schema.name())
            .field("key", &self.schema.key_kind())
            .field("columns", &self.schema.columns().len())
            .finish()
    }
}
