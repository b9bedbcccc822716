//! PostgreSQL backend over deadpool-postgres.
//!
//! Pool tuning from [`PoolConfig`] maps onto deadpool as follows:
//!
//! | Setting              | deadpool                                  |
//! |----------------------|-------------------------------------------|
//! | `max_size`           | `PoolBuilder::max_size`                   |
//! | `connection_timeout` | wait and create timeouts                  |
//! | `validation_query`   | `RecyclingMethod::Custom`                 |
//! | `idle_timeout`       | idle objects evicted on acquire           |
//! | `max_lifetime`       | aged objects evicted on acquire           |
//!
//! Queries stream through a server-side portal. Opening a cursor hands the
//! pooled client to a task that runs the query inside its own transaction,
//! binds a portal and fetches `fetch_size` rows per request. Closing the
//! cursor commits, closes the portal and returns the client to the connection
//! before the close completes; dropping it rolls back.

use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use tokio::sync::{mpsc, oneshot};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, info, warn};

use super::{
    Connection, ConnectionProvider, DatabaseProduct, DriverResult, RowCursor, StatementHandle,
};
use crate::config::StoreConfig;
use crate::core::types::LogicalType;
use crate::core::value::{Row, SqlValue};
use crate::error::{DriverError, Result, StoreError};

/// Pooled PostgreSQL [`ConnectionProvider`].
pub struct PostgresProvider {
    pool: Pool,
    name: String,
    auto_commit: bool,
    idle_timeout: Duration,
    max_lifetime: Duration,
}

impl PostgresProvider {
    /// Build the pool described by `config`.
    ///
    /// No connection is opened here; the first [`ConnectionProvider::acquire`]
    /// connects.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let url = config
            .connector
            .url
            .as_deref()
            .ok_or_else(|| StoreError::config("connector.url is required"))?;
        let credentials = config.credentials();
        let pool_config = &config.pool;

        let mut pg_config: PgConfig = url.parse().map_err(|e| {
            StoreError::storage(
                format!("parsing PostgreSQL URL for pool {}", pool_config.get_name()),
                e,
            )
        })?;
        pg_config.user(credentials.user());
        pg_config.password(credentials.password());
        pg_config.application_name("relstore");
        pg_config.keepalives(true);
        pg_config.connect_timeout(pool_config.get_connection_timeout());

        let recycling_method = match &pool_config.validation_query {
            Some(query) => RecyclingMethod::Custom(query.clone()),
            None => RecyclingMethod::Fast,
        };
        let mgr_config = ManagerConfig { recycling_method };

        warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(pool_config.get_max_size())
            .wait_timeout(Some(pool_config.get_connection_timeout()))
            .create_timeout(Some(pool_config.get_connection_timeout()))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::storage("creating PostgreSQL pool", e))?;

        info!(
            "Created PostgreSQL pool {} (max_size={})",
            pool_config.get_name(),
            pool_config.get_max_size()
        );

        Ok(Self {
            pool,
            name: pool_config.get_name().to_string(),
            auto_commit: pool_config.get_auto_commit(),
            idle_timeout: pool_config.get_idle_timeout(),
            max_lifetime: pool_config.get_max_lifetime(),
        })
    }

    /// Underlying deadpool pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    // Drops idle objects past `idle_timeout` or `max_lifetime`; returns how many.
    fn evict_stale(&self) -> usize {
        let (idle, lifetime) = (self.idle_timeout, self.max_lifetime);
        let evicted = self
            .pool
            .retain(|_, metrics| metrics.last_used() < idle && metrics.age() < lifetime)
            .removed
            .len();
        if evicted > 0 {
            debug!("{}: evicted {} idle or expired connections", self.name, evicted);
        }
        evicted
    }
}

#[async_trait]
impl ConnectionProvider for PostgresProvider {
    async fn acquire(&self) -> DriverResult<Box<dyn Connection>> {
        self.evict_stale();
        let client = self.pool.get().await?;
        debug!("{}: acquired connection ({} idle)", self.name, self.pool.status().available);

        Ok(Box::new(PostgresConnection {
            client: Some(client),
            home: Arc::new(StdMutex::new(None)),
            statements: HashMap::new(),
            next_statement: 0,
            auto_commit: self.auto_commit,
            in_transaction: false,
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        if self.pool.is_closed() {
            return Err(format!("pool {} is already closed", self.name).into());
        }
        self.pool.close();
        info!("Closed PostgreSQL pool {}", self.name);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// Where a portal task puts the client back when its cursor ends.
type Home = Arc<StdMutex<Option<Object>>>;

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PostgresConnection {
    client: Option<Object>,
    home: Home,
    statements: HashMap<u64, tokio_postgres::Statement>,
    next_statement: u64,
    auto_commit: bool,
    in_transaction: bool,
}

impl PostgresConnection {
    // Take the client back from a finished portal task.
    fn reclaim(&mut self) {
        if self.client.is_none() {
            self.client = lock(&self.home).take();
        }
    }

    fn client(&self) -> DriverResult<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| DriverError::from("connection is closed or held by an open cursor"))
    }

    fn statement(&self, handle: &StatementHandle) -> DriverResult<&tokio_postgres::Statement> {
        self.statements
            .get(&handle.id())
            .ok_or_else(|| DriverError::from(format!("unknown statement {}", handle.id())))
    }

    // With auto-commit off, the first statement opens a transaction that
    // commits when the connection is closed.
    async fn begin_if_needed(&mut self) -> DriverResult<()> {
        self.reclaim();
        if !self.auto_commit && !self.in_transaction {
            self.client()?.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn product(&mut self) -> DriverResult<DatabaseProduct> {
        self.reclaim();
        let row = self.client()?.query_one("SHOW server_version", &[]).await?;
        let version: String = row.try_get(0)?;
        Ok(DatabaseProduct::parse("PostgreSQL", &version))
    }

    async fn prepare(&mut self, sql: &str) -> DriverResult<StatementHandle> {
        self.reclaim();
        let statement = self.client()?.prepare(sql).await?;
        self.next_statement += 1;
        self.statements.insert(self.next_statement, statement);
        Ok(StatementHandle::new(self.next_statement, sql))
    }

    async fn execute(&mut self, stmt: &StatementHandle, params: &[SqlValue]) -> DriverResult<u64> {
        self.begin_if_needed().await?;
        let statement = self.statement(stmt)?;
        let n = self
            .client()?
            .execute_raw(statement, params.iter().map(PgParam))
            .await?;
        Ok(n)
    }

    async fn query(
        &mut self,
        stmt: &StatementHandle,
        params: &[SqlValue],
        fetch_size: usize,
    ) -> DriverResult<Box<dyn RowCursor>> {
        // A portal needs a transaction of its own.
        if self.in_transaction {
            return Err("cannot stream a query inside the connection's open transaction".into());
        }
        let statement = self.statement(stmt)?.clone();
        self.reclaim();
        let client = self
            .client
            .take()
            .ok_or_else(|| DriverError::from("connection is closed or held by an open cursor"))?;

        let max_rows = i32::try_from(fetch_size.max(1)).unwrap_or(i32::MAX);
        let (ready, bound) = oneshot::channel();
        let (requests, receiver) = mpsc::channel(1);
        tokio::spawn(serve_portal(
            Portal {
                client,
                home: self.home.clone(),
                statement,
                params: params.to_vec(),
                max_rows,
            },
            ready,
            receiver,
        ));

        match bound.await {
            Ok(Ok(())) => Ok(Box::new(PostgresRowCursor {
                requests: Some(requests),
                buffer: VecDeque::new(),
                exhausted: false,
                fetch_size: max_rows as usize,
            })),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err("portal task stopped before the query was bound".into()),
        }
    }

    async fn close_statement(&mut self, stmt: StatementHandle) -> DriverResult<()> {
        // Dropping the last reference to a tokio-postgres statement closes it
        // on the server.
        self.statements
            .remove(&stmt.id())
            .map(drop)
            .ok_or_else(|| DriverError::from(format!("unknown statement {}", stmt.id())))
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.reclaim();
        let client = self
            .client
            .take()
            .ok_or_else(|| DriverError::from("connection is already closed"))?;
        self.statements.clear();
        if self.in_transaction {
            self.in_transaction = false;
            client.batch_execute("COMMIT").await?;
        }
        drop(client);
        Ok(())
    }
}

type PgResult<T> = std::result::Result<T, tokio_postgres::Error>;

enum PortalRequest {
    Fetch(oneshot::Sender<PgResult<Vec<tokio_postgres::Row>>>),
    Close(oneshot::Sender<PgResult<()>>),
}

// Everything a portal task owns until its cursor ends.
struct Portal {
    client: Object,
    home: Home,
    statement: tokio_postgres::Statement,
    params: Vec<SqlValue>,
    max_rows: i32,
}

// How the portal loop ended; replies are sent only after the client is home.
enum Ending {
    NotBound(oneshot::Sender<PgResult<()>>, tokio_postgres::Error),
    Closed(oneshot::Sender<PgResult<()>>, PgResult<()>),
    Dropped,
}

async fn serve_portal(
    mut portal: Portal,
    ready: oneshot::Sender<PgResult<()>>,
    mut requests: mpsc::Receiver<PortalRequest>,
) {
    let ending = run_portal(&mut portal, ready, &mut requests).await;
    let Portal { client, home, .. } = portal;
    *lock(&home) = Some(client);

    match ending {
        Ending::NotBound(ready, e) => {
            let _ = ready.send(Err(e));
        }
        Ending::Closed(reply, result) => {
            let _ = reply.send(result);
        }
        Ending::Dropped => debug!("Portal cursor dropped without close; transaction rolled back"),
    }
}

async fn run_portal(
    portal: &mut Portal,
    ready: oneshot::Sender<PgResult<()>>,
    requests: &mut mpsc::Receiver<PortalRequest>,
) -> Ending {
    let Portal {
        client,
        statement,
        params,
        max_rows,
        ..
    } = portal;
    let client: &mut tokio_postgres::Client = client;

    let transaction = match client.transaction().await {
        Ok(transaction) => transaction,
        Err(e) => return Ending::NotBound(ready, e),
    };
    let bound: Vec<PgParam<'_>> = params.iter().map(PgParam).collect();
    let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
    let rows = match transaction.bind(&*statement, &refs).await {
        Ok(rows) => rows,
        Err(e) => return Ending::NotBound(ready, e),
    };
    if ready.send(Ok(())).is_err() {
        return Ending::Dropped;
    }

    while let Some(request) = requests.recv().await {
        match request {
            PortalRequest::Fetch(reply) => {
                let _ = reply.send(transaction.query_portal(&rows, *max_rows).await);
            }
            PortalRequest::Close(reply) => {
                drop(rows);
                return Ending::Closed(reply, transaction.commit().await);
            }
        }
    }
    Ending::Dropped
}

fn portal_stopped<E>(_: E) -> DriverError {
    DriverError::from("portal task has stopped")
}

struct PostgresRowCursor {
    requests: Option<mpsc::Sender<PortalRequest>>,
    buffer: VecDeque<Row>,
    exhausted: bool,
    fetch_size: usize,
}

#[async_trait]
impl RowCursor for PostgresRowCursor {
    async fn next_row(&mut self) -> DriverResult<Option<Row>> {
        if self.buffer.is_empty() && !self.exhausted {
            let requests = self
                .requests
                .as_ref()
                .ok_or_else(|| DriverError::from("cursor is closed"))?;
            let (reply, batch) = oneshot::channel();
            requests
                .send(PortalRequest::Fetch(reply))
                .await
                .map_err(portal_stopped)?;
            let rows = batch.await.map_err(portal_stopped)??;

            self.exhausted = rows.len() < self.fetch_size;
            for row in &rows {
                self.buffer.push_back(convert_row(row)?);
            }
        }
        Ok(self.buffer.pop_front())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.buffer.clear();
        let requests = self
            .requests
            .take()
            .ok_or_else(|| DriverError::from("cursor is already closed"))?;
        let (reply, done) = oneshot::channel();
        requests
            .send(PortalRequest::Close(reply))
            .await
            .map_err(portal_stopped)?;
        done.await.map_err(portal_stopped)??;
        Ok(())
    }
}

fn convert_row(row: &tokio_postgres::Row) -> DriverResult<Row> {
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(i)?
                .map_or(SqlValue::Null(LogicalType::Boolean), SqlValue::Bool)
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(i)?
                .map_or(SqlValue::Null(LogicalType::Int32), |v| SqlValue::I32(i32::from(v)))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(i)?
                .map_or(SqlValue::Null(LogicalType::Int32), SqlValue::I32)
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(i)?
                .map_or(SqlValue::Null(LogicalType::Int64), SqlValue::I64)
        } else if *ty == Type::BYTEA {
            row.try_get::<_, Option<Vec<u8>>>(i)?
                .map_or(SqlValue::Null(LogicalType::Bytes), SqlValue::Bytes)
        } else if <String as tokio_postgres::types::FromSql>::accepts(ty) {
            row.try_get::<_, Option<String>>(i)?
                .map_or(SqlValue::Null(LogicalType::UnboundedString), SqlValue::Text)
        } else {
            return Err(
                format!("unsupported column type {} for column {}", ty, column.name()).into(),
            );
        };
        values.push(value);
    }
    Ok(values)
}

/// Binds a [`SqlValue`] to whatever integer width or text type the server
/// inferred for the parameter.
#[derive(Debug)]
struct PgParam<'a>(&'a SqlValue);

fn encode<T: ToSql>(
    value: T,
    ty: &Type,
    out: &mut BytesMut,
) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
    if !T::accepts(ty) {
        return Err(format!("cannot bind {:?} as {}", value, ty).into());
    }
    value.to_sql(ty, out)
}

impl ToSql for PgParam<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self.0 {
            SqlValue::Null(_) => Ok(IsNull::Yes),
            SqlValue::Bool(v) => encode(*v, ty, out),
            SqlValue::I32(v) if *ty == Type::INT8 => encode(i64::from(*v), ty, out),
            SqlValue::I32(v) if *ty == Type::INT2 => encode(i16::try_from(*v)?, ty, out),
            SqlValue::I32(v) => encode(*v, ty, out),
            SqlValue::I64(v) if *ty == Type::INT4 => encode(i32::try_from(*v)?, ty, out),
            SqlValue::I64(v) if *ty == Type::INT2 => encode(i16::try_from(*v)?, ty, out),
            SqlValue::I64(v) => encode(*v, ty, out),
            SqlValue::Text(v) => encode(v.as_str(), ty, out),
            SqlValue::Bytes(v) => encode(v.as_slice(), ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        [
            Type::BOOL,
            Type::INT2,
            Type::INT4,
            Type::INT8,
            Type::TEXT,
            Type::VARCHAR,
            Type::BPCHAR,
            Type::NAME,
            Type::BYTEA,
        ]
        .contains(ty)
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(
        value: &SqlValue,
        ty: &Type,
    ) -> std::result::Result<Vec<u8>, Box<dyn Error + Sync + Send>> {
        let mut buf = BytesMut::new();
        match PgParam(value).to_sql_checked(ty, &mut buf)? {
            IsNull::Yes => Ok(Vec::new()),
            IsNull::No => Ok(buf.to_vec()),
        }
    }

    #[test]
    fn test_integer_width_follows_parameter_type() {
        assert_eq!(encoded(&SqlValue::I32(1), &Type::INT8).unwrap(), 1i64.to_be_bytes());
        assert_eq!(encoded(&SqlValue::I64(7), &Type::INT4).unwrap(), 7i32.to_be_bytes());
        assert!(encoded(&SqlValue::I64(i64::MAX), &Type::INT4).is_err());
    }

    #[test]
    fn test_mismatched_value_is_rejected() {
        assert!(encoded(&SqlValue::from("yes"), &Type::BOOL).is_err());
        assert!(encoded(&SqlValue::Bool(true), &Type::TEXT).is_err());
        assert!(encoded(&SqlValue::I32(1), &Type::FLOAT8).is_err());
    }

    #[test]
    fn test_null_binds_for_any_accepted_type() {
        let null = SqlValue::Null(LogicalType::Bytes);
        assert_eq!(encoded(&null, &Type::INT4).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_provider_requires_parsable_url() {
        let config = StoreConfig::from_yaml(concat!(
            "connector:\n  url: postgres://localhost:5432/app\n",
            "credentials:\n  user: app\n  password: pw\n",
        ))
        .unwrap();
        let provider = PostgresProvider::new(&config).unwrap();
        assert_eq!(provider.name(), "relstore");
        assert!(!provider.is_closed());
    }

    #[tokio::test]
    async fn test_eviction_on_empty_pool_removes_nothing() {
        let config = StoreConfig::from_yaml(concat!(
            "connector:\n  url: postgres://localhost:5432/app\n",
            "credentials:\n  user: app\n  password: pw\n",
        ))
        .unwrap();
        let provider = PostgresProvider::new(&config).unwrap();
        assert_eq!(provider.evict_stale(), 0);
        assert_eq!(provider.pool().status().size, 0);
    }

    fn cursor(requests: mpsc::Sender<PortalRequest>) -> PostgresRowCursor {
        PostgresRowCursor {
            requests: Some(requests),
            buffer: VecDeque::new(),
            exhausted: false,
            fetch_size: 10,
        }
    }

    #[tokio::test]
    async fn test_short_batch_ends_the_cursor() {
        let (requests, mut receiver) = mpsc::channel(1);
        let portal = tokio::spawn(async move {
            let mut fetches = 0;
            while let Some(request) = receiver.recv().await {
                match request {
                    PortalRequest::Fetch(reply) => {
                        fetches += 1;
                        let _ = reply.send(Ok(Vec::new()));
                    }
                    PortalRequest::Close(reply) => {
                        let _ = reply.send(Ok(()));
                        break;
                    }
                }
            }
            fetches
        });

        let mut cursor = cursor(requests);
        assert!(cursor.next_row().await.unwrap().is_none());
        assert!(cursor.next_row().await.unwrap().is_none());
        cursor.close().await.unwrap();
        assert!(cursor.close().await.is_err());
        assert_eq!(portal.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stopped_portal_task_is_an_error() {
        let (requests, receiver) = mpsc::channel(1);
        drop(receiver);

        let mut cursor = cursor(requests);
        let err = cursor.next_row().await.unwrap_err();
        assert!(err.to_string().contains("portal task has stopped"));
        assert!(cursor.close().await.is_err());
    }
}
