//! Records stored in tables.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::schema::Column;
use super::value::SqlValue;

/// A domain record persisted as an opaque payload plus optional extra columns.
///
/// Extra columns are declared once per type and filled per value. The table
/// appends them to its schema without interpreting them; they exist so that
/// filters and external tooling can see selected fields without decoding the
/// payload.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Extra columns appended after the payload column, in DDL order.
    fn extra_columns() -> Vec<Column> {
        Vec::new()
    }

    /// Values for the extra columns. Columns left out are bound as their
    /// policy default, or NULL when there is none.
    fn extra_values(&self) -> Vec<(String, SqlValue)> {
        Vec::new()
    }
}

/// Selection of top-level record fields to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    fields: Vec<String>,
}

impl Projection {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}
