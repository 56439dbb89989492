//! MySQL-protocol driver built on mysql_async.
//!
//! Each [`MysqlConn`] owns one server session; the export never shares a
//! session between tasks, so no pool is involved.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Row, SslOpts, Value};
use tracing::{debug, warn};

use super::apply_session_params;
use crate::config::SourceConfig;
use crate::core::traits::{ConnectionFactory, ResultSet, SessionParams, SqlConn};
use crate::error::{DbError, DumpError, Result};

/// TLS options for an `ssl_mode` setting.
fn ssl_opts_for(ssl_mode: &str) -> Option<SslOpts> {
    match ssl_mode.to_lowercase().as_str() {
        "disable" => {
            warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
            None
        }
        "prefer" | "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
        "verify-ca" | "verify_ca" => Some(SslOpts::default()),
        "verify-full" | "verify_identity" => Some(SslOpts::default()),
        other => {
            warn!("Unknown ssl_mode '{}', defaulting to Preferred", other);
            Some(SslOpts::default().with_danger_accept_invalid_certs(true))
        }
    }
}

fn db_error(e: mysql_async::Error) -> DbError {
    match e {
        mysql_async::Error::Server(server) => DbError::server(server.code, server.message),
        other => DbError::client(other.to_string()),
    }
}

/// Text form of a protocol value; `None` for NULL.
///
/// Text-protocol results arrive as bytes already. Prepared statements return
/// typed values, which are printed the way the server would print them.
fn value_to_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(bytes.clone()),
        Value::Int(v) => Some(v.to_string().into_bytes()),
        Value::UInt(v) => Some(v.to_string().into_bytes()),
        Value::Float(v) => Some(v.to_string().into_bytes()),
        Value::Double(v) => Some(v.to_string().into_bytes()),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let mut s = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            );
            if *micros > 0 {
                s.push_str(&format!(".{:06}", micros));
            }
            Some(s.into_bytes())
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            let mut s = format!(
                "{}{:02}:{:02}:{:02}",
                if *negative { "-" } else { "" },
                total_hours,
                minutes,
                seconds
            );
            if *micros > 0 {
                s.push_str(&format!(".{:06}", micros));
            }
            Some(s.into_bytes())
        }
    }
}

fn rows_to_result_set(columns: Vec<String>, rows: Vec<Row>) -> ResultSet {
    let rows = rows
        .iter()
        .map(|row| {
            (0..row.len())
                .map(|i| row.as_ref(i).and_then(value_to_bytes))
                .collect()
        })
        .collect();
    ResultSet::new(columns, rows)
}

/// One MySQL-protocol session.
pub struct MysqlConn {
    conn: Conn,
}

impl MysqlConn {
    pub fn new(conn: Conn) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SqlConn for MysqlConn {
    async fn query(&mut self, sql: &str) -> Result<ResultSet> {
        let fail = |e| DumpError::query(sql, &[], db_error(e));
        let mut result = self.conn.query_iter(sql).await.map_err(fail)?;
        let columns = result
            .columns()
            .map(|cols| cols.iter().map(|c| c.name_str().into_owned()).collect())
            .unwrap_or_default();
        let rows: Vec<Row> = result.collect().await.map_err(fail)?;
        Ok(rows_to_result_set(columns, rows))
    }

    async fn query_with_args(&mut self, sql: &str, args: &[String]) -> Result<ResultSet> {
        let fail = |e| DumpError::query(sql, args, db_error(e));
        let params = Params::Positional(args.iter().map(|a| Value::from(a.as_str())).collect());
        let mut result = self.conn.exec_iter(sql, params).await.map_err(fail)?;
        let columns = result
            .columns()
            .map(|cols| cols.iter().map(|c| c.name_str().into_owned()).collect())
            .unwrap_or_default();
        let rows: Vec<Row> = result.collect().await.map_err(fail)?;
        Ok(rows_to_result_set(columns, rows))
    }

    async fn exec(&mut self, sql: &str) -> Result<()> {
        self.conn
            .query_drop(sql)
            .await
            .map_err(|e| DumpError::query(sql, &[], db_error(e)))
    }
}

/// Opens [`MysqlConn`] sessions against the configured source.
pub struct MysqlConnectionFactory {
    opts: Opts,
    address: String,
}

impl MysqlConnectionFactory {
    pub fn new(config: &SourceConfig) -> Self {
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            // Use utf8mb4 for full Unicode support
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = ssl_opts_for(&config.ssl_mode) {
            builder = builder.ssl_opts(ssl);
        }

        Self {
            opts: builder.into(),
            address: config.address(),
        }
    }
}

#[async_trait]
impl ConnectionFactory for MysqlConnectionFactory {
    async fn connect(&self, session: &SessionParams) -> Result<Box<dyn SqlConn>> {
        let conn = Conn::new(self.opts.clone()).await.map_err(|e| {
            DumpError::connection(db_error(e), format!("connecting to {}", self.address))
        })?;
        let mut conn = MysqlConn::new(conn);
        apply_session_params(&mut conn, session).await?;
        debug!("Opened session to {}", self.address);
        Ok(Box::new(conn))
    }
}
