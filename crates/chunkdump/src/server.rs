//! Server identification and the capability flags derived from it.
//!
//! The version string is parsed once at startup. Everything downstream branches
//! on [`ServerCapabilities`] instead of looking at version strings again.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Server product family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerType {
    Unknown,
    MySQL,
    MariaDB,
    TiDB,
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerType::Unknown => "Unknown",
            ServerType::MySQL => "MySQL",
            ServerType::MariaDB => "MariaDB",
            ServerType::TiDB => "TiDB",
        };
        f.write_str(s)
    }
}

/// Product family and version reported by `SELECT version()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_type: ServerType,
    pub version: Option<Version>,
    /// TiDB only: whether the cluster stores data in TiKV (and so has regions).
    pub has_tikv: bool,
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d+\.\d+\.\d+([0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*)?").expect("static regex")
    })
}

fn tidb_version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"-v?\d+\.\d+\.\d+([0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*)?").expect("static regex")
    })
}

impl ServerInfo {
    /// Classify a `version()` string such as `5.7.25-TiDB-v4.0.0-alpha-1263-g635f2e1af`.
    ///
    /// TiDB reports a MySQL compatibility version first; its own version follows
    /// the `-TiDB-` marker and is the one kept.
    pub fn parse(version_str: &str) -> Self {
        let lower = version_str.to_lowercase();
        let server_type = if lower.contains("tidb") {
            ServerType::TiDB
        } else if lower.contains("mariadb") {
            ServerType::MariaDB
        } else if version_regex().is_match(&lower) {
            ServerType::MySQL
        } else {
            ServerType::Unknown
        };

        let raw = match server_type {
            ServerType::TiDB => tidb_version_regex()
                .find(version_str)
                .map(|m| m.as_str()[1..].trim_start_matches('v').to_string()),
            _ => version_regex()
                .find(version_str)
                .map(|m| m.as_str().to_string()),
        };

        let version = raw.and_then(|v| match Version::parse(&v) {
            Ok(version) => Some(version),
            Err(e) => {
                warn!("Cannot parse server version '{}': {}", v, e);
                None
            }
        });

        info!("Detected server: {} {:?}", server_type, version.as_ref().map(|v| v.to_string()));

        Self {
            server_type,
            version,
            has_tikv: false,
        }
    }

    pub fn with_tikv(mut self, has_tikv: bool) -> Self {
        self.has_tikv = has_tikv;
        self
    }

    fn version_at_least(&self, min: &str) -> bool {
        match (&self.version, Version::parse(min)) {
            (Some(v), Ok(min)) => *v >= min,
            _ => false,
        }
    }
}

/// TiDB release that introduced `TABLESAMPLE REGIONS()`.
const TABLE_SAMPLE_VERSION: &str = "5.0.0-nightly";
/// TiDB release that introduced `tidb_decode_key` and partition region listings.
const DECODE_REGION_VERSION: &str = "4.0.0";
/// Oldest TiDB release whose region status table is usable for chunking.
const REGION_SCAN_VERSION: &str = "3.0.0";

/// Feature flags resolved once per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Server can return sampled key tuples for a table.
    pub supports_table_sample: bool,
    /// Server exposes storage region boundaries.
    pub supports_region_scan: bool,
    /// Region keys can be decoded server-side; otherwise they are decoded locally
    /// and attributed through statistics histograms.
    pub decodes_region_keys: bool,
    /// Server accepts a point-in-time snapshot session variable.
    pub supports_explicit_snapshot: bool,
}

impl ServerCapabilities {
    pub fn resolve(info: &ServerInfo) -> Self {
        if info.server_type != ServerType::TiDB {
            return Self::default();
        }
        Self {
            supports_table_sample: info.version_at_least(TABLE_SAMPLE_VERSION),
            supports_region_scan: info.has_tikv && info.version_at_least(REGION_SCAN_VERSION),
            decodes_region_keys: info.version_at_least(DECODE_REGION_VERSION),
            supports_explicit_snapshot: true,
        }
    }
}
