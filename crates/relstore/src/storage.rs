//! Storage sessions: provider, dialect and open cursors.
//!
//! A [`Storage`] is opened once per database. Opening checks out one
//! connection to learn the product and version, resolves the dialect from the
//! [`DialectCatalog`], and returns the connection. Tables created from the
//! storage share its session and run every statement on the caller's task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::core::key::Key;
use crate::core::record::Record;
use crate::core::schema::DefaultPolicy;
use crate::core::value::Row;
use crate::cursor::{Cursor, CursorRegistry, OpenResources};
use crate::dialect::{Dialect, DialectCatalog};
use crate::driver::sqlite::SqliteProvider;
use crate::driver::{Connection, ConnectionProvider, StatementHandle};
use crate::error::{Result, StoreError};
use crate::query::BoundStatement;
use crate::table::{HistoryTable, Table, TableKind};

/// Rows per round trip when neither the statement nor the options set one.
pub const DEFAULT_FETCH_SIZE: usize = 100;

/// Options for [`Storage::with_provider`].
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Dialects to match the connected product against.
    pub catalog: DialectCatalog,
    /// Column defaults rendered into DDL and bound for missing extra values.
    pub defaults: DefaultPolicy,
    /// Default rows per round trip for queries.
    pub fetch_size: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            catalog: DialectCatalog::with_builtins(),
            defaults: DefaultPolicy::standard(),
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }
}

/// State shared by a storage and every table created from it.
pub(crate) struct Session {
    provider: Arc<dyn ConnectionProvider>,
    dialect: Arc<Dialect>,
    registry: Arc<CursorRegistry>,
    fetch_size: usize,
    closed: AtomicBool,
}

impl Session {
    pub(crate) fn dialect(&self) -> Arc<Dialect> {
        self.dialect.clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed(format!(
                "storage on pool {} is closed",
                self.provider.name()
            )))
        } else {
            Ok(())
        }
    }

    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        self.provider.acquire().await.map_err(|e| {
            StoreError::storage(
                format!("acquiring connection from pool {}", self.provider.name()),
                e,
            )
        })
    }

    /// Run a statement that returns no rows; returns the affected row count.
    pub(crate) async fn execute(&self, stmt: BoundStatement) -> Result<u64> {
        self.ensure_open()?;
        debug!("Executing: {}", stmt.sql);

        let mut connection = self.acquire().await?;
        let executed = match connection.prepare(&stmt.sql).await {
            Ok(statement) => {
                let executed = connection
                    .execute(&statement, &stmt.params)
                    .await
                    .map_err(|e| StoreError::storage(format!("executing {}", stmt.sql), e));
                let closed = connection
                    .close_statement(statement)
                    .await
                    .map_err(|e| StoreError::storage("closing statement", e));
                match (executed, closed) {
                    (Ok(n), Ok(())) => Ok(n),
                    (Err(e), closed) => {
                        if let Err(extra) = closed {
                            warn!("Additional failure during teardown: {}", extra);
                        }
                        Err(e)
                    }
                    (Ok(_), Err(e)) => Err(e),
                }
            }
            Err(e) => Err(StoreError::storage(format!("preparing {}", stmt.sql), e)),
        };

        let released = connection
            .close()
            .await
            .map_err(|e| StoreError::storage("releasing connection", e));
        match (executed, released) {
            (Ok(n), Ok(())) => Ok(n),
            (Err(e), released) => {
                if let Err(extra) = released {
                    warn!("Additional failure during teardown: {}", extra);
                }
                Err(e)
            }
            (Ok(_), Err(e)) => Err(e),
        }
    }

    /// Run a query and stream its rows through `decode`.
    pub(crate) async fn query<T>(
        &self,
        stmt: BoundStatement,
        decode: impl Fn(Row) -> Result<T> + Send + Sync + 'static,
    ) -> Result<Cursor<T>> {
        self.ensure_open()?;
        let fetch_size = stmt.fetch_size.unwrap_or(self.fetch_size);
        debug!("Querying (fetch size {}): {}", fetch_size, stmt.sql);

        let mut connection = self.acquire().await?;
        let statement = match connection.prepare(&stmt.sql).await {
            Ok(statement) => statement,
            Err(e) => {
                abandon(connection, None).await;
                return Err(StoreError::storage(format!("preparing {}", stmt.sql), e));
            }
        };
        let rows = match connection.query(&statement, &stmt.params, fetch_size).await {
            Ok(rows) => rows,
            Err(e) => {
                abandon(connection, Some(statement)).await;
                return Err(StoreError::storage(format!("querying {}", stmt.sql), e));
            }
        };

        let resources = OpenResources {
            rows,
            statement: Some(statement),
            connection,
        };
        Cursor::open(self.registry.clone(), resources, decode).await
    }

    /// First decoded row of a query, releasing the cursor either way.
    pub(crate) async fn query_first<T>(
        &self,
        stmt: BoundStatement,
        decode: impl Fn(Row) -> Result<T> + Send + Sync + 'static,
    ) -> Result<Option<T>> {
        let mut cursor = self.query(stmt, decode).await?;
        let first = cursor.next().await;
        let closed = cursor.close().await;
        let first = first?;
        closed?;
        Ok(first)
    }
}

// Release a connection whose statement never produced a cursor.
async fn abandon(mut connection: Box<dyn Connection>, statement: Option<StatementHandle>) {
    if let Some(statement) = statement {
        if let Err(e) = connection.close_statement(statement).await {
            warn!("Failed to close statement after error: {}", e);
        }
    }
    if let Err(e) = connection.close().await {
        warn!("Failed to release connection after error: {}", e);
    }
}

/// Entry point: one pooled database with its resolved dialect.
pub struct Storage {
    session: Arc<Session>,
    defaults: DefaultPolicy,
}

impl Storage {
    /// Open storage from configuration.
    ///
    /// The connector URL scheme picks the backend: `postgres://` or
    /// `postgresql://` for PostgreSQL, `sqlite://<path>` for a SQLite file and
    /// `memory://<name>` for a fresh in-memory SQLite database.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let url = config.connector.url.as_deref().unwrap_or_default();
        let scheme = url.split("://").next().unwrap_or_default().to_ascii_lowercase();

        let provider: Arc<dyn ConnectionProvider> = match scheme.as_str() {
            "memory" | "sqlite" => {
                let mut provider = SqliteProvider::from_url(url)
                    .map_err(|e| StoreError::config(e.to_string()))?;
                if let Some(name) = &config.pool.name {
                    provider = provider.with_name(name.clone());
                }
                Arc::new(provider)
            }
            #[cfg(feature = "postgres")]
            "postgres" | "postgresql" => {
                Arc::new(crate::driver::postgres::PostgresProvider::new(config)?)
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" | "postgresql" => {
                return Err(StoreError::config(
                    "relstore was built without the postgres feature",
                ))
            }
            other => {
                return Err(StoreError::config(format!(
                    "unsupported connector scheme '{}'",
                    other
                )))
            }
        };

        let options = StorageOptions {
            fetch_size: config.get_fetch_size(),
            ..StorageOptions::default()
        };
        Self::with_provider(provider, options).await
    }

    /// Open storage over an externally supplied provider.
    pub async fn with_provider(
        provider: Arc<dyn ConnectionProvider>,
        options: StorageOptions,
    ) -> Result<Self> {
        if options.fetch_size == 0 {
            return Err(StoreError::config("fetch_size must be at least 1"));
        }

        let mut connection = provider.acquire().await.map_err(|e| {
            StoreError::storage(format!("acquiring connection from pool {}", provider.name()), e)
        })?;
        let product = connection.product().await;
        let released = connection.close().await;
        let product = product.map_err(|e| StoreError::storage("reading database product", e))?;
        released.map_err(|e| StoreError::storage("releasing connection", e))?;

        let dialect = options.catalog.resolve(&product);
        info!("Connected to {} via pool {}", product, provider.name());

        Ok(Self {
            session: Arc::new(Session {
                provider,
                dialect,
                registry: Arc::new(CursorRegistry::new()),
                fetch_size: options.fetch_size,
                closed: AtomicBool::new(false),
            }),
            defaults: options.defaults,
        })
    }

    /// Dialect resolved for this storage.
    pub fn dialect(&self) -> &Dialect {
        &self.session.dialect
    }

    /// Table keeping one row per identifier.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Schema` if the record's extra columns clash with
    /// the fixed columns or cannot be named in this dialect.
    pub fn table<K: Key, R: Record>(&self, name: &str) -> Result<Table<K, R>> {
        self.session.ensure_open()?;
        Table::new(self.session.clone(), name, TableKind::Standard, self.defaults.clone())
    }

    /// Append-only table keeping every revision of each identifier.
    pub fn history_table<K: Key, R: Record>(&self, name: &str) -> Result<HistoryTable<K, R>> {
        self.session.ensure_open()?;
        Table::new(self.session.clone(), name, TableKind::History, self.defaults.clone())
            .map(HistoryTable::new)
    }

    /// Cursors that still hold a connection.
    pub fn open_cursors(&self) -> usize {
        self.session.registry.open_count()
    }

    /// Whether [`Storage::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.session.closed.load(Ordering::SeqCst)
    }

    /// Force-close every open cursor, then close the pool.
    ///
    /// Both steps run even if the first fails; the first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Usage` when called a second time.
    pub async fn close(&self) -> Result<()> {
        if self.session.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Usage("storage is already closed".to_string()));
        }

        let cursors = self.session.registry.close_all().await;
        let name = self.session.provider.name();
        let pool = self
            .session
            .provider
            .close()
            .await
            .map_err(|e| StoreError::storage(format!("closing pool {}", name), e));
        info!("Closed storage on pool {}", name);

        match (cursors, pool) {
            (Ok(()), pool) => pool,
            (Err(e), pool) => {
                if let Err(extra) = pool {
                    warn!("Additional failure while closing storage: {}", extra);
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("pool", &self.session.provider.name())
            .field("dialect", &self.session.dialect.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}
