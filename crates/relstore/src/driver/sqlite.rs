//! Embedded SQLite backend.
//!
//! Runs every statement on one bundled SQLite handle per database, behind the
//! same [`ConnectionProvider`] seam as a pooled server. Connections handed out
//! by the provider are logical: they share the handle, serialized by a mutex,
//! and each keeps its own prepared statements.
//!
//! Two hooks make resource handling observable in tests:
//!
//! - every connection, statement and cursor transition is appended to an
//!   event log ([`SqliteDatabase::events`])
//! - any driver call can be made to fail once ([`SqliteDatabase::fail_next`])
//!
//! Query results are read out when the cursor opens and handed out in batches
//! of the requested fetch size.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, Type, Value, ValueRef};
use rusqlite::{params_from_iter, ToSql};
use thiserror::Error;
use tracing::{debug, trace};

use super::{
    Connection, ConnectionProvider, DatabaseProduct, DriverResult, RowCursor, StatementHandle,
};
use crate::core::types::LogicalType;
use crate::core::value::{Row, SqlValue};
use crate::error::DriverError;

/// Product name reported by SQLite connections.
pub const PRODUCT_NAME: &str = "SQLite";

/// Errors raised by the SQLite backend.
#[derive(Error, Debug)]
pub enum SqliteError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid SQLite URL: {0}")]
    Url(String),

    #[error("{0}")]
    WrongKind(String),

    #[error("{0} is closed")]
    Closed(String),

    #[error("unknown statement {0}")]
    UnknownStatement(u64),

    #[error("injected failure at {0:?}")]
    Injected(FailPoint),
}

/// Driver call that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Acquire,
    Prepare,
    Execute,
    Query,
    NextRow,
    CloseCursor,
    CloseStatement,
    CloseConnection,
}

/// One resource transition, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    ConnectionAcquired { connection: u64 },
    StatementPrepared { connection: u64, statement: u64 },
    CursorOpened { connection: u64, statement: u64 },
    BatchFetched { connection: u64, statement: u64, rows: usize },
    CursorClosed { connection: u64, statement: u64 },
    StatementClosed { connection: u64, statement: u64 },
    ConnectionClosed { connection: u64 },
    ProviderClosed,
}

#[derive(Debug)]
struct Shared {
    handle: Mutex<rusqlite::Connection>,
    events: Mutex<Vec<LifecycleEvent>>,
    faults: Mutex<HashMap<FailPoint, usize>>,
    next_connection: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// SQLite rejects a prepared text with anything after the statement.
fn statement_text(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

/// Handle to one SQLite database. Clones share the same tables.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    name: String,
    shared: Arc<Shared>,
}

impl SqliteDatabase {
    /// A fresh private in-memory database.
    pub fn in_memory(name: impl Into<String>) -> Result<Self, SqliteError> {
        Ok(Self::from_handle(name.into(), rusqlite::Connection::open_in_memory()?))
    }

    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqliteError> {
        let path = path.as_ref();
        let handle = rusqlite::Connection::open(path)?;
        Ok(Self::from_handle(path.display().to_string(), handle))
    }

    fn from_handle(name: String, handle: rusqlite::Connection) -> Self {
        Self {
            name,
            shared: Arc::new(Shared {
                handle: Mutex::new(handle),
                events: Mutex::new(Vec::new()),
                faults: Mutex::new(HashMap::new()),
                next_connection: AtomicU64::new(0),
            }),
        }
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A new provider over this database.
    pub fn provider(&self) -> SqliteProvider {
        SqliteProvider::new(self.clone())
    }

    /// Snapshot of the lifecycle log.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        lock(&self.shared.events).clone()
    }

    /// Empty the lifecycle log.
    pub fn clear_events(&self) {
        lock(&self.shared.events).clear();
    }

    /// Make the next call at `point` fail. Calls accumulate.
    pub fn fail_next(&self, point: FailPoint) {
        *lock(&self.shared.faults).entry(point).or_insert(0) += 1;
    }

    /// Names of user tables, sorted.
    pub fn table_names(&self) -> Result<Vec<String>, SqliteError> {
        self.with_handle(|handle| {
            let mut stmt = handle.prepare_cached(
                "SELECT name FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
            names.collect()
        })
    }

    /// Row count of a table, or `None` if it does not exist.
    pub fn row_count(&self, table: &str) -> Result<Option<u64>, SqliteError> {
        if !self.table_names()?.iter().any(|t| t == table) {
            return Ok(None);
        }
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", table.replace('"', "\"\""));
        let count =
            self.with_handle(|handle| handle.query_row(&sql, [], |row| row.get::<_, i64>(0)))?;
        Ok(Some(u64::try_from(count).unwrap_or_default()))
    }

    fn with_handle<T>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> rusqlite::Result<T>,
    ) -> Result<T, SqliteError> {
        let handle = lock(&self.shared.handle);
        Ok(f(&handle)?)
    }

    fn record(&self, event: LifecycleEvent) {
        trace!("{}: {:?}", self.name, event);
        lock(&self.shared.events).push(event);
    }

    fn check(&self, point: FailPoint) -> Result<(), SqliteError> {
        let mut faults = lock(&self.shared.faults);
        match faults.get_mut(&point) {
            Some(n) if *n > 0 => {
                *n -= 1;
                Err(SqliteError::Injected(point))
            }
            _ => Ok(()),
        }
    }
}

/// [`ConnectionProvider`] over a [`SqliteDatabase`].
#[derive(Debug)]
pub struct SqliteProvider {
    db: SqliteDatabase,
    name: String,
    closed: AtomicBool,
}

impl SqliteProvider {
    /// Provider named after its database.
    pub fn new(db: SqliteDatabase) -> Self {
        let name = db.name().to_string();
        Self {
            db,
            name,
            closed: AtomicBool::new(false),
        }
    }

    /// Provider from a URL: `memory://<name>` for a fresh in-memory database,
    /// `sqlite://<path>` for a database file.
    pub fn from_url(url: &str) -> Result<Self, SqliteError> {
        if let Some(name) = url.strip_prefix("memory://") {
            let name = if name.is_empty() { "memory" } else { name };
            return Ok(Self::new(SqliteDatabase::in_memory(name)?));
        }
        match url.strip_prefix("sqlite://") {
            Some(path) if !path.is_empty() => Ok(Self::new(SqliteDatabase::open(path)?)),
            Some(_) => Err(SqliteError::Url(format!("{} names no database file", url))),
            None => Err(SqliteError::Url(format!("not a memory:// or sqlite:// URL: {}", url))),
        }
    }

    /// Override the pool name used in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The database behind this provider.
    pub fn database(&self) -> &SqliteDatabase {
        &self.db
    }
}

#[async_trait]
impl ConnectionProvider for SqliteProvider {
    async fn acquire(&self) -> DriverResult<Box<dyn Connection>> {
        if self.is_closed() {
            return Err(SqliteError::Closed(format!("pool {}", self.name)).into());
        }
        self.db.check(FailPoint::Acquire)?;

        let id = self.db.shared.next_connection.fetch_add(1, Ordering::Relaxed) + 1;
        self.db.record(LifecycleEvent::ConnectionAcquired { connection: id });
        debug!("{}: acquired connection {}", self.name, id);

        Ok(Box::new(SqliteConnection {
            id,
            db: self.db.clone(),
            statements: HashMap::new(),
            next_statement: 0,
            closed: false,
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(SqliteError::Closed(format!("pool {}", self.name)).into());
        }
        self.db.record(LifecycleEvent::ProviderClosed);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null(_) => ToSqlOutput::Owned(Value::Null),
            SqlValue::Bool(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            SqlValue::I32(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            SqlValue::I64(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            SqlValue::Bytes(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v.as_slice())),
        })
    }
}

fn read_value(index: usize, value: ValueRef<'_>) -> rusqlite::Result<SqlValue> {
    match value {
        // SQLite NULLs carry no column type.
        ValueRef::Null => Ok(SqlValue::Null(LogicalType::UnboundedString)),
        ValueRef::Integer(v) => Ok(SqlValue::I64(v)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| SqlValue::Text(s.to_string()))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))),
        ValueRef::Blob(bytes) => Ok(SqlValue::Bytes(bytes.to_vec())),
        ValueRef::Real(_) => Err(rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Real,
            "floating point columns are not supported".into(),
        )),
    }
}

struct SqliteConnection {
    id: u64,
    db: SqliteDatabase,
    statements: HashMap<u64, String>,
    next_statement: u64,
    closed: bool,
}

impl SqliteConnection {
    fn ensure_open(&self) -> Result<(), SqliteError> {
        if self.closed {
            Err(SqliteError::Closed(format!("connection {}", self.id)))
        } else {
            Ok(())
        }
    }

    fn statement(&self, handle: &StatementHandle) -> Result<&str, SqliteError> {
        self.statements
            .get(&handle.id())
            .map(String::as_str)
            .ok_or(SqliteError::UnknownStatement(handle.id()))
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn product(&mut self) -> DriverResult<DatabaseProduct> {
        self.ensure_open()?;
        Ok(DatabaseProduct::parse(PRODUCT_NAME, rusqlite::version()))
    }

    async fn prepare(&mut self, sql: &str) -> DriverResult<StatementHandle> {
        self.ensure_open()?;
        self.db.check(FailPoint::Prepare)?;

        let text = statement_text(sql);
        self.db.with_handle(|handle| handle.prepare_cached(text).map(drop))?;

        self.next_statement += 1;
        let id = self.next_statement;
        self.statements.insert(id, text.to_string());
        self.db.record(LifecycleEvent::StatementPrepared {
            connection: self.id,
            statement: id,
        });
        Ok(StatementHandle::new(id, sql))
    }

    async fn execute(&mut self, stmt: &StatementHandle, params: &[SqlValue]) -> DriverResult<u64> {
        self.ensure_open()?;
        let sql = self.statement(stmt)?;
        self.db.check(FailPoint::Execute)?;

        let affected = self.db.with_handle(|handle| {
            handle
                .prepare_cached(sql)?
                .execute(params_from_iter(params.iter()))
        })?;
        Ok(affected as u64)
    }

    async fn query(
        &mut self,
        stmt: &StatementHandle,
        params: &[SqlValue],
        fetch_size: usize,
    ) -> DriverResult<Box<dyn RowCursor>> {
        self.ensure_open()?;
        let sql = self.statement(stmt)?;
        self.db.check(FailPoint::Query)?;

        let rows = self.db.with_handle(|handle| {
            let mut prepared = handle.prepare_cached(sql)?;
            let width = prepared.column_count();
            if width == 0 {
                return Ok(None);
            }
            let mut rows = prepared.query(params_from_iter(params.iter()))?;
            let mut out = VecDeque::new();
            while let Some(row) = rows.next()? {
                let values = (0..width)
                    .map(|i| read_value(i, row.get_ref(i)?))
                    .collect::<rusqlite::Result<Row>>()?;
                out.push_back(values);
            }
            Ok(Some(out))
        })?;
        let Some(rows) = rows else {
            let message = format!("{} returns no rows; use execute", stmt.sql());
            return Err(SqliteError::WrongKind(message).into());
        };

        self.db.record(LifecycleEvent::CursorOpened {
            connection: self.id,
            statement: stmt.id(),
        });

        Ok(Box::new(SqliteRowCursor {
            connection: self.id,
            statement: stmt.id(),
            db: self.db.clone(),
            pending: rows,
            buffer: VecDeque::new(),
            fetch_size: fetch_size.max(1),
            closed: false,
        }))
    }

    async fn close_statement(&mut self, stmt: StatementHandle) -> DriverResult<()> {
        self.ensure_open()?;
        self.db.check(FailPoint::CloseStatement)?;
        if self.statements.remove(&stmt.id()).is_none() {
            return Err(SqliteError::UnknownStatement(stmt.id()).into());
        }
        self.db.record(LifecycleEvent::StatementClosed {
            connection: self.id,
            statement: stmt.id(),
        });
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.ensure_open()?;
        self.closed = true;
        self.statements.clear();
        self.db.check(FailPoint::CloseConnection)?;
        self.db.record(LifecycleEvent::ConnectionClosed { connection: self.id });
        Ok(())
    }
}

struct SqliteRowCursor {
    connection: u64,
    statement: u64,
    db: SqliteDatabase,
    pending: VecDeque<Row>,
    buffer: VecDeque<Row>,
    fetch_size: usize,
    closed: bool,
}

impl SqliteRowCursor {
    fn closed_error(&self) -> DriverError {
        SqliteError::Closed(format!("cursor on statement {}", self.statement)).into()
    }
}

#[async_trait]
impl RowCursor for SqliteRowCursor {
    async fn next_row(&mut self) -> DriverResult<Option<Row>> {
        if self.closed {
            return Err(self.closed_error());
        }
        self.db.check(FailPoint::NextRow)?;

        if self.buffer.is_empty() && !self.pending.is_empty() {
            let take = self.fetch_size.min(self.pending.len());
            self.buffer.extend(self.pending.drain(..take));
            self.db.record(LifecycleEvent::BatchFetched {
                connection: self.connection,
                statement: self.statement,
                rows: take,
            });
        }
        Ok(self.buffer.pop_front())
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Err(self.closed_error());
        }
        self.closed = true;
        self.pending.clear();
        self.buffer.clear();
        self.db.check(FailPoint::CloseCursor)?;
        self.db.record(LifecycleEvent::CursorClosed {
            connection: self.connection,
            statement: self.statement,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_statement_roundtrip_through_connection() {
        let db = SqliteDatabase::in_memory("t").unwrap();
        let provider = db.provider();
        let mut conn = provider.acquire().await.unwrap();

        let create = conn
            .prepare("CREATE TABLE IF NOT EXISTS kv (k INTEGER NOT NULL, v TEXT, PRIMARY KEY(k));")
            .await
            .unwrap();
        conn.execute(&create, &[]).await.unwrap();
        conn.close_statement(create).await.unwrap();

        let insert = conn
            .prepare("INSERT INTO kv (k, v) VALUES (?, ?), (?, ?), (?, ?)")
            .await
            .unwrap();
        let n = conn
            .execute(
                &insert,
                &[
                    SqlValue::I64(1),
                    "a".into(),
                    SqlValue::I32(2),
                    "b".into(),
                    SqlValue::I64(3),
                    SqlValue::Null(LogicalType::UnboundedString),
                ],
            )
            .await
            .unwrap();
        assert_eq!(n, 3);
        conn.close_statement(insert).await.unwrap();

        let select = conn.prepare("SELECT k, v FROM kv ORDER BY k").await.unwrap();
        let mut cursor = conn.query(&select, &[], 2).await.unwrap();
        let mut seen = Vec::new();
        while let Some(row) = cursor.next_row().await.unwrap() {
            seen.push(row);
        }
        assert_eq!(
            seen,
            vec![
                vec![SqlValue::I64(1), "a".into()],
                vec![SqlValue::I64(2), "b".into()],
                vec![SqlValue::I64(3), SqlValue::Null(LogicalType::UnboundedString)],
            ]
        );
        cursor.close().await.unwrap();
        conn.close_statement(select).await.unwrap();
        conn.close().await.unwrap();

        let batches: Vec<usize> = db
            .events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::BatchFetched { rows, .. } => Some(rows),
                _ => None,
            })
            .collect();
        assert_eq!(batches, vec![2, 1]);
        assert_eq!(db.row_count("kv").unwrap(), Some(3));
        assert_eq!(db.row_count("missing").unwrap(), None);
    }

    #[tokio::test]
    async fn test_reports_sqlite_product() {
        let provider = SqliteDatabase::in_memory("t").unwrap().provider();
        let mut conn = provider.acquire().await.unwrap();
        let product = conn.product().await.unwrap();
        assert_eq!(product.name, "SQLite");
        assert_eq!(product.major, 3);
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_sql_fails_at_prepare() {
        let db = SqliteDatabase::in_memory("t").unwrap();
        let mut conn = db.provider().acquire().await.unwrap();
        assert!(conn.prepare("SELEKT 1").await.is_err());
        assert!(conn.prepare("SELECT v FROM nowhere").await.is_err());
        assert!(!db
            .events()
            .iter()
            .any(|e| matches!(e, LifecycleEvent::StatementPrepared { .. })));
    }

    #[tokio::test]
    async fn test_statement_kind_must_match_call() {
        let provider = SqliteDatabase::in_memory("t").unwrap().provider();
        let mut conn = provider.acquire().await.unwrap();
        let create = conn.prepare("CREATE TABLE kv (k INTEGER)").await.unwrap();
        assert!(conn.query(&create, &[], 10).await.is_err());
        let select = conn.prepare("SELECT 1").await.unwrap();
        assert!(conn.execute(&select, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_clones_share_tables() {
        let db = SqliteDatabase::in_memory("shared").unwrap();
        let other = db.clone();
        let mut conn = db.provider().acquire().await.unwrap();
        let create = conn.prepare("CREATE TABLE kv (k INTEGER)").await.unwrap();
        conn.execute(&create, &[]).await.unwrap();
        assert_eq!(other.table_names().unwrap(), vec!["kv".to_string()]);
        assert!(SqliteDatabase::in_memory("shared").unwrap().table_names().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_next_fires_once() {
        let db = SqliteDatabase::in_memory("t").unwrap();
        let provider = db.provider();
        db.fail_next(FailPoint::Acquire);

        assert!(provider.acquire().await.is_err());
        assert!(provider.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_provider_refuses_connections() {
        let provider = SqliteProvider::from_url("memory://closing").unwrap();
        assert_eq!(provider.name(), "closing");
        provider.close().await.unwrap();
        assert!(provider.is_closed());
        assert!(provider.acquire().await.is_err());
        assert!(provider.close().await.is_err());
    }

    #[tokio::test]
    async fn test_double_close_is_reported() {
        let provider = SqliteDatabase::in_memory("t").unwrap().provider();
        let mut conn = provider.acquire().await.unwrap();
        conn.close().await.unwrap();
        assert!(conn.close().await.is_err());
        assert!(conn.prepare("SELECT 1").await.is_err());
    }

    #[test]
    fn test_from_url() {
        assert!(SqliteProvider::from_url("postgres://x").is_err());
        assert!(SqliteProvider::from_url("sqlite://").is_err());
        assert_eq!(SqliteProvider::from_url("memory://").unwrap().name(), "memory");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let url = format!("sqlite://{}", path.display());
        let provider = SqliteProvider::from_url(&url).unwrap();
        assert_eq!(provider.name(), path.display().to_string());
        assert!(path.exists());
    }
}
