//! Database driver implementations of the connection traits.
//!
//! - [`mysql`]: MySQL, MariaDB and TiDB over the MySQL wire protocol
//!
//! Drivers share [`apply_session_params`] so that every session starts the
//! same way regardless of transport.

pub mod mysql;

pub use mysql::{MysqlConn, MysqlConnectionFactory};

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::core::traits::{SessionParams, SqlConn};
use crate::error::{DumpError, Result, ServerErrorKind};

/// Session variable names are interpolated unquoted, so only plain names pass.
fn session_variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]{0,63}$").expect("static regex"))
}

/// Apply session variables with `SET SESSION k = ?`.
///
/// Variables the server does not know are skipped; any other failure aborts.
pub async fn apply_session_params(conn: &mut dyn SqlConn, params: &SessionParams) -> Result<()> {
    for (name, value) in params {
        if !session_variable_re().is_match(name) {
            return Err(DumpError::Config(format!("invalid session variable name '{}'", name)));
        }
        let sql = format!("SET SESSION {} = ?", name);
        match conn.query_with_args(&sql, &[value.clone()]).await {
            Ok(_) => debug!("Session variable {} set", name),
            Err(e) if e.server_error_kind() == Some(ServerErrorKind::UnknownSystemVariable) => {
                info!("Session variable {} is not supported by the server, skipping", name);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::Script;
    use crate::error::DbError;

    #[tokio::test]
    async fn test_apply_session_params_skips_unknown_variables() {
        let script = Script::new();
        script
            .expect_query_error(
                "SET SESSION tidb_mem_quota_query = ?",
                DbError::server(1193, "Unknown system variable 'tidb_mem_quota_query'"),
            )
            .expect_query("SET SESSION tidb_snapshot = ?", Default::default());
        let mut conn = script.conn();
        let mut params = SessionParams::new();
        params.insert("tidb_snapshot".into(), "418139474493440000".into());
        params.insert("tidb_mem_quota_query".into(), "1024".into());
        apply_session_params(&mut conn, &params).await.unwrap();
        assert_eq!(
            script.executed(),
            vec![
                "SET SESSION tidb_mem_quota_query = ? -- [\"1024\"]",
                "SET SESSION tidb_snapshot = ? -- [\"418139474493440000\"]",
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_session_params_propagates_other_errors() {
        let script = Script::new();
        script.expect_query_error(
            "SET SESSION sql_mode",
            DbError::server(1231, "Variable 'sql_mode' can't be set to the value of 'x'"),
        );
        let mut conn = script.conn();
        let mut params = SessionParams::new();
        params.insert("sql_mode".into(), "x".into());
        let err = apply_session_params(&mut conn, &params).await.unwrap_err();
        assert!(matches!(err, DumpError::Query { .. }));
    }

    #[tokio::test]
    async fn test_apply_session_params_rejects_bad_names() {
        let script = Script::new();
        let mut conn = script.conn();
        let mut params = SessionParams::new();
        params.insert("a = 1; DROP TABLE t".into(), "x".into());
        assert!(matches!(
            apply_session_params(&mut conn, &params).await,
            Err(DumpError::Config(_))
        ));
        assert!(script.executed().is_empty());
    }
}
