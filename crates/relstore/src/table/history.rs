//! Append-only tables.

use std::ops::Deref;

use crate::core::key::Key;
use crate::core::record::Record;
use crate::cursor::Cursor;
use crate::error::Result;

use super::Table;

/// Table that keeps every revision written under an identifier.
///
/// Writes never replace rows: [`Table::write`] and [`HistoryTable::append`]
/// both add a revision. [`Table::read`] is unsupported; use
/// [`HistoryTable::history`]. Every other [`Table`] operation is available
/// through `Deref`.
#[derive(Debug)]
pub struct HistoryTable<K: Key, R: Record> {
    inner: Table<K, R>,
}

impl<K: Key, R: Record> HistoryTable<K, R> {
    pub(crate) fn new(inner: Table<K, R>) -> Self {
        Self { inner }
    }

    /// Add a revision of `id`.
    pub async fn append(&self, id: &K, record: &R) -> Result<()> {
        self.inner.insert(id, record).await
    }

    /// Every revision of `id`, newest first, fetched `batch_size` rows per
    /// round trip.
    pub async fn history(&self, id: &K, batch_size: usize) -> Result<Cursor<R>> {
        self.inner.all_by_id(id, batch_size).await
    }
}

impl<K: Key, R: Record> Deref for HistoryTable<K, R> {
    type Target = Table<K, R>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
