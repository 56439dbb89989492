//! Configuration validation.

use super::{Config, ConsistencyKind};
use crate::core::identifier::validate_identifier;
use crate::error::{DumpError, Result};

/// Validate one configured identifier, naming the setting it came from.
fn check_identifier(setting: &str, name: &str) -> Result<()> {
    validate_identifier(name).map_err(|e| match e {
        DumpError::Config(msg) => DumpError::Config(format!("{}: {}", setting, msg)),
        other => other,
    })
}

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(DumpError::Config("source.host is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(DumpError::Config("source.user is required".into()));
    }
    for db in &config.source.databases {
        check_identifier("source.databases", db)?;
    }
    let ssl_mode = config.source.ssl_mode.to_lowercase();
    if !matches!(
        ssl_mode.as_str(),
        "disable" | "prefer" | "require" | "verify-ca" | "verify_ca" | "verify-full" | "verify_identity"
    ) {
        return Err(DumpError::Config(format!(
            "source.ssl_mode must be one of disable, prefer, require, verify-ca, verify-full, got '{}'",
            config.source.ssl_mode
        )));
    }

    // Export config validation - only check if explicitly set
    let export = &config.export;
    if let Some(0) = export.threads {
        return Err(DumpError::Config("export.threads must be at least 1".into()));
    }
    if let Some(0) = export.rows {
        return Err(DumpError::Config("export.rows must be at least 1".into()));
    }
    if let Some(0) = export.task_queue_size {
        return Err(DumpError::Config(
            "export.task_queue_size must be at least 1".into(),
        ));
    }
    if let Some(w) = &export.where_clause {
        if w.trim().is_empty() {
            return Err(DumpError::Config(
                "export.where must not be blank when set".into(),
            ));
        }
    }
    if export.snapshot.is_some()
        && !matches!(
            export.consistency,
            ConsistencyKind::Auto | ConsistencyKind::Snapshot
        )
    {
        return Err(DumpError::Config(format!(
            "export.snapshot requires consistency 'snapshot' or 'auto', got '{}'",
            export.consistency
        )));
    }
    for entry in &export.block_list {
        match entry.split_once('.') {
            Some((db, table)) => {
                check_identifier("export.block_list", db)?;
                check_identifier("export.block_list", table)?;
            }
            None => {
                return Err(DumpError::Config(format!(
                    "export.block_list entry '{}' must have the form db.table",
                    entry
                )))
            }
        }
    }

    Ok(())
}
