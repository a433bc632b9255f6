//! MySQL executor backed by a `mysql_async` connection pool
//!
//! Every statement checks a connection out of the pool and hands it back
//! when the `Conn` guard drops, so no statement ever sees a connection
//! released by another one.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, DriverError, OptsBuilder, Params, Pool, Value};
use tracing::{debug, info, trace};

use crate::config::MysqlConnectorConfig;
use crate::error::{PostFsError, Result};
use crate::store::{Row, SqlExecutor, SqlValue};

/// Server error code for a duplicate key on insert
const ER_DUP_ENTRY: u16 = 1062;

/// MySQL executor
pub struct MysqlExecutor {
    pool: Pool,
    closed: AtomicBool,
}

impl MysqlExecutor {
    /// Build the pool and verify that one connection can be established
    pub async fn connect(config: &MysqlConnectorConfig) -> Result<Self> {
        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.username.clone()))
            .pass(Some(config.password.clone()))
            .db_name(config.database.clone());

        let pool = Pool::new(opts);

        {
            let mut conn = pool.get_conn().await.map_err(|e| {
                PostFsError::Connection(format!(
                    "cannot connect to {}:{}: {}",
                    config.host, config.port, e
                ))
            })?;
            conn.ping()
                .await
                .map_err(|e| PostFsError::Connection(format!("ping failed: {}", e)))?;
        }

        info!(
            "MySQL pool ready for {}@{}:{}",
            config.username, config.host, config.port
        );

        Ok(Self {
            pool,
            closed: AtomicBool::new(false),
        })
    }

    async fn conn(&self) -> Result<Conn> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PostFsError::Connection("executor is closed".to_string()));
        }
        self.pool.get_conn().await.map_err(map_error)
    }
}

#[async_trait]
impl SqlExecutor for MysqlExecutor {
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>> {
        trace!("mysql query: {} ({} params)", sql, params.len());
        let mut conn = self.conn().await?;
        let rows: Vec<mysql_async::Row> = conn
            .exec(sql, to_params(params))
            .await
            .map_err(map_error)?;

        Ok(rows
            .into_iter()
            .map(|row| Row(mysql_async::Row::unwrap(row).into_iter().map(from_mysql).collect()))
            .collect())
    }

    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64> {
        trace!("mysql execute: {} ({} params)", sql, params.len());
        let mut conn = self.conn().await?;
        conn.exec_drop(sql, to_params(params))
            .await
            .map_err(map_error)?;
        Ok(conn.affected_rows())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("MySQL pool already closed");
            return Ok(());
        }
        info!("Disconnecting MySQL pool");
        self.pool
            .clone()
            .disconnect()
            .await
            .map_err(|e| PostFsError::Connection(e.to_string()))
    }

    fn backend(&self) -> &'static str {
        "mysql"
    }
}

fn to_params(params: Vec<SqlValue>) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.into_iter().map(to_mysql).collect())
    }
}

fn map_error(e: mysql_async::Error) -> PostFsError {
    match e {
        mysql_async::Error::Server(ref server) if server.code == ER_DUP_ENTRY => {
            PostFsError::AlreadyExists(server.message.clone())
        }
        mysql_async::Error::Io(_) | mysql_async::Error::Driver(DriverError::PoolDisconnected) => {
            PostFsError::Connection(e.to_string())
        }
        other => PostFsError::Query(other.to_string()),
    }
}

fn to_mysql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::Int(b as i64),
        SqlValue::Int(i) => Value::Int(i),
        SqlValue::Real(f) => Value::Double(f),
        SqlValue::Text(s) => Value::Bytes(s.into_bytes()),
    }
}

fn from_mysql(value: Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Bytes(bytes) => SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
        Value::Int(i) => SqlValue::Int(i),
        Value::UInt(u) => i64::try_from(u)
            .map(SqlValue::Int)
            .unwrap_or_else(|_| SqlValue::Text(u.to_string())),
        Value::Float(f) => SqlValue::Real(f as f64),
        Value::Double(d) => SqlValue::Real(d),
        // Binary protocol dates; render them the way the text protocol would
        Value::Date(year, month, day, 0, 0, 0, 0) => {
            SqlValue::Text(format!("{:04}-{:02}-{:02}", year, month, day))
        }
        Value::Date(year, month, day, hour, minute, second, _) => SqlValue::Text(format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            year, month, day, hour, minute, second
        )),
        Value::Time(negative, days, hours, minutes, seconds, _) => {
            let hours = days * 24 + hours as u32;
            SqlValue::Text(format!(
                "{}{:02}:{:02}:{:02}",
                if negative { "-" } else { "" },
                hours,
                minutes,
                seconds
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_mysql_dates() {
        assert_eq!(
            from_mysql(Value::Date(2024, 3, 9, 0, 0, 0, 0)),
            SqlValue::Text("2024-03-09".to_string())
        );
        assert_eq!(
            from_mysql(Value::Date(2024, 3, 9, 14, 5, 0, 0)),
            SqlValue::Text("2024-03-09 14:05:00".to_string())
        );
        assert_eq!(
            from_mysql(Value::Time(true, 1, 2, 3, 4, 0)),
            SqlValue::Text("-26:03:04".to_string())
        );
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(from_mysql(Value::NULL), SqlValue::Null);
        assert_eq!(
            from_mysql(Value::Bytes(b"en".to_vec())),
            SqlValue::Text("en".to_string())
        );
        assert_eq!(from_mysql(Value::UInt(5)), SqlValue::Int(5));
        assert_eq!(to_mysql(SqlValue::Bool(true)), Value::Int(1));
        assert_eq!(to_mysql(SqlValue::from("x")), Value::Bytes(b"x".to_vec()));
    }

    #[test]
    fn test_empty_params() {
        assert!(matches!(to_params(vec![]), Params::Empty));
        assert!(matches!(
            to_params(vec![SqlValue::Int(1)]),
            Params::Positional(ref v) if v.len() == 1
        ));
    }
}
