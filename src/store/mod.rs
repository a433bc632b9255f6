//! SQL executors
//!
//! The posts connector speaks SQL through the [`SqlExecutor`] trait and never
//! touches a driver directly. Each executor owns its connection resources and
//! scopes a connection to a single statement.

pub mod mysql;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;

/// A single SQL parameter or column value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// Render the value as text. Numbers are formatted, NULL is `None`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(b.to_string()),
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::Real(f) => Some(f.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Int(i)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One result row, columns in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub Vec<SqlValue>);

impl Row {
    pub fn get(&self, idx: usize) -> Option<&SqlValue> {
        self.0.get(idx)
    }

    /// Column as text; NULL and missing columns are `None`
    pub fn text(&self, idx: usize) -> Option<String> {
        self.get(idx).and_then(SqlValue::as_text)
    }
}

/// Executes parameterized statements using `?` placeholders.
///
/// Implementations acquire a connection per call and release it before
/// returning, whatever the outcome.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a statement that returns rows
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>>;

    /// Run a statement that modifies rows, returning the affected count
    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64>;

    /// Release every connection held by the executor.
    ///
    /// Calls made after `close` fail with `PostFsError::Connection`.
    async fn close(&self) -> Result<()>;

    /// Short backend name for logging
    fn backend(&self) -> &'static str;
}
