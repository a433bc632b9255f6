//! SQLite executor
//!
//! Holds a single connection behind a mutex. The lock guard lives only for
//! the statement being run.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, Value as SqliteValue};
use rusqlite::{ffi, params_from_iter, Connection, ErrorCode, ToSql};
use tracing::{info, trace};

use crate::error::{PostFsError, Result};
use crate::store::{Row, SqlExecutor, SqlValue};

/// Schema for the posts table, usable by SQLite and MySQL alike
pub const POSTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS Posts (
    lang VARCHAR(16) NOT NULL,
    slug VARCHAR(255) NOT NULL,
    createdAt VARCHAR(32),
    updatedAt VARCHAR(32),
    published BOOLEAN NOT NULL DEFAULT FALSE,
    title TEXT,
    description TEXT,
    content TEXT,
    PRIMARY KEY (lang, slug)
)
"#;

/// SQLite executor
pub struct SqliteExecutor {
    conn: Mutex<Option<Connection>>,
}

impl SqliteExecutor {
    /// Open (or create) a database file
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            PostFsError::Connection(format!("cannot open {:?}: {}", path, e))
        })?;
        info!("Opened SQLite database {:?}", path);
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| PostFsError::Connection(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }

    /// Create the posts table if it does not exist
    pub fn create_schema(&self) -> Result<()> {
        self.with_conn(|conn| conn.execute_batch(POSTS_SCHEMA).map_err(map_error))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| PostFsError::Connection("executor is closed".to_string()))?;
        f(conn)
    }
}

#[async_trait]
impl SqlExecutor for SqliteExecutor {
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>> {
        trace!("sqlite query: {} ({} params)", sql, params.len());
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(map_error)?;
            let columns = stmt.column_count();
            let rows = stmt
                .query_map(params_from_iter(params.iter()), |row| {
                    (0..columns)
                        .map(|idx| row.get::<_, SqliteValue>(idx).map(from_sqlite))
                        .collect::<rusqlite::Result<Vec<_>>>()
                })
                .map_err(map_error)?;

            let collected: Result<Vec<Row>> =
                rows.map(|r| r.map(Row).map_err(map_error)).collect();
            collected
        })
    }

    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64> {
        trace!("sqlite execute: {} ({} params)", sql, params.len());
        self.with_conn(|conn| {
            conn.execute(sql, params_from_iter(params.iter()))
                .map(|n| n as u64)
                .map_err(map_error)
        })
    }

    async fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().take() {
            info!("Closing SQLite connection");
            conn.close()
                .map_err(|(_, e)| PostFsError::Connection(e.to_string()))?;
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            SqlValue::Null => SqliteValue::Null,
            SqlValue::Bool(b) => SqliteValue::Integer(*b as i64),
            SqlValue::Int(i) => SqliteValue::Integer(*i),
            SqlValue::Real(f) => SqliteValue::Real(*f),
            SqlValue::Text(s) => SqliteValue::Text(s.clone()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

fn from_sqlite(value: SqliteValue) -> SqlValue {
    match value {
        SqliteValue::Null => SqlValue::Null,
        SqliteValue::Integer(i) => SqlValue::Int(i),
        SqliteValue::Real(f) => SqlValue::Real(f),
        SqliteValue::Text(s) => SqlValue::Text(s),
        SqliteValue::Blob(b) => SqlValue::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn map_error(e: rusqlite::Error) -> PostFsError {
    // Only key collisions mean the post exists; NOT NULL and CHECK failures do not
    if let rusqlite::Error::SqliteFailure(ref failure, _) = e {
        if matches!(
            failure.extended_code,
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE
        ) {
            return PostFsError::AlreadyExists(e.to_string());
        }
    }

    match e.sqlite_error_code() {
        Some(ErrorCode::CannotOpen) | Some(ErrorCode::NotADatabase) => {
            PostFsError::Connection(e.to_string())
        }
        _ => PostFsError::Query(e.to_string()),
    }
}
