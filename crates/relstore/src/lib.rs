//! # relstore
//!
//! Typed record storage over relational databases.
//!
//! This library stores serializable records in SQL tables with support for:
//!
//! - **Dialect resolution** from the connected product and version
//! - **Schema derivation** from the key kind and the record's extra columns
//! - **Append-only tables** that keep every revision of an identifier
//! - **Filtered scans** with field projections
//! - **Streaming cursors** that release their connection exactly once
//!
//! ## Example
//!
//! ```rust,no_run
//! use relstore::{Filter, KeyValue, Operator, Record, StoreConfig, Storage};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Person {
//!     name: String,
//! }
//!
//! impl Record for Person {}
//!
//! #[tokio::main]
//! async fn main() -> relstore::Result<()> {
//!     let config = StoreConfig::load("relstore.yaml")?;
//!     let storage = Storage::open(&config).await?;
//!
//!     let people = storage.table::<i64, Person>("people")?;
//!     people.create_if_not_exists().await?;
//!     people.write(&1, &Person { name: "Ada".into() }).await?;
//!
//!     let filter = Filter::key(Operator::Ge, KeyValue::Int64(1));
//!     let mut cursor = people.scan(Some(&filter), None).await?;
//!     while let Some((id, person)) = cursor.next().await? {
//!         println!("{}: {}", id, person.name);
//!     }
//!
//!     storage.close().await
//! }
//! ```

pub mod config;
pub mod core;
pub mod cursor;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod query;
pub mod serializer;
pub mod storage;
pub mod table;

// Re-exports for convenient access
pub use crate::config::{ConnectorConfig, Credentials, PoolConfig, StoreConfig};
pub use crate::core::{
    Column, DefaultPolicy, Filter, Key, KeyKind, KeyValue, LogicalType, Operator, Projection,
    Record, SqlValue, TableDefinition, TableSchema, TypeMapping,
};
pub use crate::cursor::Cursor;
pub use crate::dialect::{Dialect, DialectCatalog, DialectEntry};
pub use crate::driver::sqlite::{SqliteDatabase, SqliteProvider};
pub use crate::error::{Result, StoreError};
pub use crate::serializer::Serializer;
pub use crate::storage::{Storage, StorageOptions};
pub use crate::table::{HistoryTable, Table};
