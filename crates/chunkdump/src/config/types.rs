//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source server connection settings.
    pub source: SourceConfig,

    /// Export planning behavior.
    #[serde(default)]
    pub export: ExportConfig,
}

/// Source server (MySQL, MariaDB or TiDB) connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Server host.
    pub host: String,

    /// Server port (default: 4000).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Databases to export. Empty means every non-system database.
    #[serde(default)]
    pub databases: Vec<String>,

    /// TLS mode: disable, prefer, require, verify-ca, verify-full (default: prefer).
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    /// Extra session variables set on every connection.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub session_params: BTreeMap<String, String>,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("databases", &self.databases)
            .field("ssl_mode", &self.ssl_mode)
            .field("session_params", &self.session_params)
            .finish()
    }
}

/// How a consistent view is shared across the export connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyKind {
    /// Snapshot when the server supports it, flush otherwise.
    #[default]
    Auto,
    /// No coordination between connections.
    None,
    /// Global read lock while transactions start.
    Flush,
    /// Per-table read locks while transactions start.
    Lock,
    /// Point-in-time snapshot session variable.
    Snapshot,
}

impl fmt::Display for ConsistencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsistencyKind::Auto => "auto",
            ConsistencyKind::None => "none",
            ConsistencyKind::Flush => "flush",
            ConsistencyKind::Lock => "lock",
            ConsistencyKind::Snapshot => "snapshot",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ConsistencyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ConsistencyKind::Auto),
            "none" => Ok(ConsistencyKind::None),
            "flush" => Ok(ConsistencyKind::Flush),
            "lock" => Ok(ConsistencyKind::Lock),
            "snapshot" => Ok(ConsistencyKind::Snapshot),
            other => Err(format!(
                "unknown consistency '{}', expected auto, none, flush, lock or snapshot",
                other
            )),
        }
    }
}

/// Export planning behavior.
/// Optional fields distinguish "not set" (derived default) from "explicitly set".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Consistency strategy (default: auto).
    #[serde(default)]
    pub consistency: ConsistencyKind,

    /// Snapshot position: a TSO or a 'YYYY-MM-DD HH:MM:SS' time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,

    /// Continue without consistency when it cannot be established (default: false).
    #[serde(default)]
    pub fallback_to_inconsistent: bool,

    /// Rows per chunk. Derived from the table's average row length if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,

    /// Filter applied to every chunk query.
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,

    /// Order chunk rows by the ordering key (default: true).
    #[serde(default = "default_true")]
    pub sort_by_key: bool,

    /// Select an explicit column list instead of `*` (default: false).
    #[serde(default)]
    pub complete_insert: bool,

    /// Worker connections opened for chunk execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,

    /// Capacity of the chunk task queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_queue_size: Option<usize>,

    /// Tables excluded from export and locking, as `db.table`.
    #[serde(default)]
    pub block_list: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            consistency: ConsistencyKind::default(),
            snapshot: None,
            fallback_to_inconsistent: false,
            rows: None,
            where_clause: None,
            sort_by_key: true,
            complete_insert: false,
            threads: None,
            task_queue_size: None,
            block_list: Vec::new(),
        }
    }
}

impl ExportConfig {
    pub fn get_threads(&self) -> usize {
        self.threads.unwrap_or(4)
    }

    pub fn get_task_queue_size(&self) -> usize {
        self.task_queue_size.unwrap_or(128)
    }

    /// Configured filter, ignoring blank values.
    pub fn filter(&self) -> Option<&str> {
        self.where_clause
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
    }

    /// True when `database.table` is listed in the block list.
    pub fn is_blocked(&self, database: &str, table: &str) -> bool {
        self.block_list.iter().any(|entry| {
            entry
                .split_once('.')
                .map(|(db, tbl)| db == database && tbl == table)
                .unwrap_or(false)
        })
    }
}

// Default value functions for serde
fn default_port() -> u16 {
    4000
}

fn default_ssl_mode() -> String {
    "prefer".to_string()
}

fn default_true() -> bool {
    true
}
