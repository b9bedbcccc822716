//! Core value types shared by every layer.
//!
//! - [`types`]: logical column types and dialect type mappings
//! - [`key`]: identifier kinds and their persisted forms
//! - [`value`]: SQL values bound into statements and read from rows
//! - [`params`]: ordered per-row column values
//! - [`schema`]: columns, default policy and DDL rendering
//! - [`filter`]: predicate trees
//! - [`record`]: the record trait and field projections

pub mod filter;
pub mod ident;
pub mod key;
pub mod params;
pub mod record;
pub mod schema;
pub mod types;
pub mod value;

pub use filter::{Filter, Operator};
pub use key::{Key, KeyKind, KeyStrategy, KeyValue};
pub use params::{Param, Parameters};
pub use record::{Projection, Record};
pub use schema::{Column, DefaultPolicy, TableDefinition, TableSchema};
pub use types::{LogicalType, TypeMapping, TypeMappingBuilder};
pub use value::{Row, SqlValue};
