//! Statement construction.
//!
//! Tables never write SQL themselves. They ask a [`ReadQueryFactory`] or
//! [`WriteQueryFactory`] for a [`BoundStatement`] and hand it to the session
//! for execution. Two factory pairs exist:
//!
//! - [`standard`]: one row per identifier
//! - [`history`]: append-only rows ordered by a `revision` column
//!
//! Every write path builds its row through [`Parameters`], so single and bulk
//! writes bind the same columns in the same order.
//!
//! [`Parameters`]: crate::core::Parameters

pub mod history;
pub mod standard;
mod statement;

pub use history::{HistoryReadFactory, HistoryWriteFactory, RevisionClock};
pub use standard::{StandardReadFactory, StandardWriteFactory};
pub use statement::StatementBuilder;

use crate::core::filter::Filter;
use crate::core::key::KeyValue;
use crate::core::params::Parameters;
use crate::core::value::SqlValue;
use crate::error::{Result, StoreError};

/// Name of the payload column.
pub const DATA_COLUMN: &str = "data";

/// Name of the ordering column of append-only tables.
pub const REVISION_COLUMN: &str = "revision";

/// SQL text with its parameters, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundStatement {
    /// Statement text with dialect placeholders.
    pub sql: String,
    /// Parameter values in placeholder order.
    pub params: Vec<SqlValue>,
    /// Rows per round trip for queries; the session default applies if unset.
    pub fetch_size: Option<usize>,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
            fetch_size: None,
        }
    }

    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }
}

/// Builds the read statements of one table.
pub trait ReadQueryFactory: Send + Sync {
    /// Payload of one record: `SELECT data ... WHERE id = ?`.
    fn select_by_id(&self, id: &KeyValue) -> Result<BoundStatement>;

    /// Single-row count of rows with the identifier.
    fn exists(&self, id: &KeyValue) -> Result<BoundStatement>;

    /// Every identifier in the table.
    fn index(&self) -> Result<BoundStatement>;

    /// Identifier and payload of every row matching the filter.
    fn scan(&self, filter: Option<&Filter>) -> Result<BoundStatement>;

    /// Single-row count of all rows.
    fn count(&self) -> Result<BoundStatement>;

    /// Every payload stored under one identifier.
    fn select_all_by_id(&self, id: &KeyValue, fetch_size: usize) -> Result<BoundStatement> {
        let _ = (id, fetch_size);
        Err(StoreError::Unsupported(
            "this table keeps one row per identifier".to_string(),
        ))
    }
}

/// Builds the write statements of one table.
pub trait WriteQueryFactory: Send + Sync {
    /// Insert one row.
    fn insert(&self, row: Parameters) -> Result<BoundStatement>;

    /// Replace the non-identifier columns of the row with the same identifier.
    fn update(&self, row: Parameters) -> Result<BoundStatement>;

    /// Delete every row with the identifier.
    fn delete(&self, id: &KeyValue) -> Result<BoundStatement>;

    /// Delete every row.
    fn delete_all(&self) -> Result<BoundStatement>;

    /// Insert all rows with one multi-row `INSERT`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Usage` if `rows` is empty or the rows do not bind
    /// the same columns in the same order.
    fn insert_all(&self, rows: Vec<Parameters>) -> Result<BoundStatement>;
}
