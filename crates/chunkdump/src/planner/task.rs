//! Units of work handed to export workers.

use serde::{Deserialize, Serialize};

use crate::config::ExportConfig;
use crate::core::schema::TableIdentity;

/// One independently executable chunk query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkTask {
    /// Table the rows come from; carries the partition when the query is
    /// restricted to one.
    pub table: TableIdentity,
    pub query: String,
    /// Position of this chunk in key order, from 0.
    pub chunk_index: usize,
    /// Chunks planned for the table, across all of its partitions.
    pub total_chunks: usize,
}

/// Planner knobs taken from [`ExportConfig`].
#[derive(Debug, Clone, Default)]
pub struct PlannerSettings {
    /// Rows per chunk; derived per table from its average row length when unset.
    pub rows: Option<u64>,
    pub filter: Option<String>,
    pub sort_by_key: bool,
    pub complete_insert: bool,
}

impl PlannerSettings {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            rows: config.rows,
            filter: config.filter().map(str::to_string),
            sort_by_key: config.sort_by_key,
            complete_insert: config.complete_insert,
        }
    }
}
