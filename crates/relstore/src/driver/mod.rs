//! Driver seam between the storage layer and a database engine.
//!
//! The storage layer talks to engines exclusively through three traits:
//!
//! - [`ConnectionProvider`]: a pool that hands out connections
//! - [`Connection`]: prepares and runs statements
//! - [`RowCursor`]: streams rows of one query
//!
//! Statements are referenced by a [`StatementHandle`] owned by the caller and
//! executed through the connection that prepared them, so a streaming read can
//! own its cursor, statement and connection together without borrowing.
//!
//! Every method returns [`DriverError`]; only the layer above converts it into
//! [`StoreError`](crate::StoreError).
//!
//! # Backends
//!
//! - [`postgres`]: PostgreSQL over deadpool-postgres (feature `postgres`)
//! - [`sqlite`]: embedded SQLite, in memory or on disk

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sqlite;

use std::fmt;

use async_trait::async_trait;

use crate::core::value::{Row, SqlValue};
use crate::error::DriverError;

/// Result type for driver operations.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Product name and version reported by a connected engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseProduct {
    /// Product name (e.g. "PostgreSQL", "MySQL").
    pub name: String,
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl DatabaseProduct {
    /// Build from a product name and a version string such as
    /// `"16.2 (Debian 16.2-1.pgdg120+2)"` or `"8.0.36"`.
    ///
    /// Missing or unparsable components read as 0.
    pub fn parse(name: impl Into<String>, version: &str) -> Self {
        let numeric: String = version
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = numeric.split('.').map(|p| p.parse::<u32>().unwrap_or(0));

        Self {
            name: name.into(),
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
        }
    }
}

impl fmt::Display for DatabaseProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.name, self.major, self.minor)
    }
}

/// Handle to a statement prepared on one connection.
///
/// Not `Clone`: closing consumes the handle, so a statement is closed at most
/// once.
#[derive(Debug, PartialEq, Eq)]
pub struct StatementHandle {
    id: u64,
    sql: String,
}

impl StatementHandle {
    /// Create a handle (for driver implementations).
    pub fn new(id: u64, sql: impl Into<String>) -> Self {
        Self {
            id,
            sql: sql.into(),
        }
    }

    /// Driver-assigned statement id, unique per connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Statement text.
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Pooling provider of connections.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Check out a connection, waiting up to the pool's acquisition timeout.
    async fn acquire(&self) -> DriverResult<Box<dyn Connection>>;

    /// Close the pool. Connections already checked out stay usable until they
    /// are closed.
    async fn close(&self) -> DriverResult<()>;

    /// Whether [`ConnectionProvider::close`] has been called.
    fn is_closed(&self) -> bool;

    /// Pool name for logging.
    fn name(&self) -> &str;
}

/// One checked-out connection.
#[async_trait]
pub trait Connection: Send {
    /// Product name and version of the connected engine.
    async fn product(&mut self) -> DriverResult<DatabaseProduct>;

    /// Prepare a statement.
    async fn prepare(&mut self, sql: &str) -> DriverResult<StatementHandle>;

    /// Run a statement that returns no rows; returns the affected row count.
    async fn execute(&mut self, stmt: &StatementHandle, params: &[SqlValue]) -> DriverResult<u64>;

    /// Run a query and stream its rows, buffering at most `fetch_size` rows
    /// per round trip.
    async fn query(
        &mut self,
        stmt: &StatementHandle,
        params: &[SqlValue],
        fetch_size: usize,
    ) -> DriverResult<Box<dyn RowCursor>>;

    /// Release a prepared statement.
    async fn close_statement(&mut self, stmt: StatementHandle) -> DriverResult<()>;

    /// Return the connection to its pool.
    async fn close(&mut self) -> DriverResult<()>;
}

/// Forward-only stream of result rows.
#[async_trait]
pub trait RowCursor: Send {
    /// Next row, or `None` when the result is exhausted.
    async fn next_row(&mut self) -> DriverResult<Option<Row>>;

    /// Release the server-side result.
    async fn close(&mut self) -> DriverResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_product_versions() {
        let pg = DatabaseProduct::parse("PostgreSQL", "16.2 (Debian 16.2-1.pgdg120+2)");
        assert_eq!((pg.major, pg.minor), (16, 2));

        let mysql = DatabaseProduct::parse("MySQL", "8.0.36");
        assert_eq!((mysql.major, mysql.minor), (8, 0));

        let bare = DatabaseProduct::parse("H2", "2");
        assert_eq!((bare.major, bare.minor), (2, 0));

        let junk = DatabaseProduct::parse("X", "beta");
        assert_eq!((junk.major, junk.minor), (0, 0));
    }

    #[test]
    fn test_product_display() {
        let p = DatabaseProduct::parse("PostgreSQL", "15.4");
        assert_eq!(p.to_string(), "PostgreSQL 15.4");
    }
}
