//! Predicate trees over table columns.
//!
//! A [`Filter`] is pure data; it is rendered into a `WHERE` clause (and
//! checked against the table schema) by the query layer.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::key::KeyValue;
use super::types::LogicalType;
use super::value::SqlValue;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    /// SQL spelling.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    /// Whether the operator orders values (as opposed to testing equality).
    pub fn is_ordering(&self) -> bool {
        !matches!(self, Operator::Eq | Operator::Ne)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Filter tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `column op value`.
    Compare {
        column: String,
        op: Operator,
        value: SqlValue,
    },
    /// Comparison on the identifier column, using the table's key strategy.
    Key { op: Operator, key: KeyValue },
    /// Every child holds (an empty list is always true).
    And(Vec<Filter>),
    /// Some child holds (an empty list is always false).
    Or(Vec<Filter>),
}

impl Filter {
    pub fn compare(column: impl Into<String>, op: Operator, value: impl Into<SqlValue>) -> Self {
        Filter::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, Operator::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, Operator::Ne, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, Operator::Lt, value)
    }

    pub fn le(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, Operator::Le, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, Operator::Gt, value)
    }

    pub fn ge(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, Operator::Ge, value)
    }

    /// `column IS NULL`.
    pub fn is_null(column: impl Into<String>, value_type: LogicalType) -> Self {
        Self::compare(column, Operator::Eq, SqlValue::Null(value_type))
    }

    /// Identifier comparison.
    pub fn key(op: Operator, key: KeyValue) -> Self {
        Filter::Key { op, key }
    }

    pub fn and(children: Vec<Filter>) -> Self {
        Filter::And(children)
    }

    pub fn or(children: Vec<Filter>) -> Self {
        Filter::Or(children)
    }
}
