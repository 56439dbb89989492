//! Chunk sizing from row-length statistics and planner row estimates.

use tracing::{debug, warn};

use crate::core::schema::TableIdentity;
use crate::core::traits::{ResultSet, SqlConn};
use crate::query::build_explain_query;

/// Rows per chunk when the table reports no average row length.
const DEFAULT_ROWS: u64 = 200_000;
/// Upper bound on rows per chunk.
const MAX_ROWS: u64 = 1_000_000;
/// Target bytes per chunk.
const BYTES_PER_CHUNK: u64 = 128 * 1024 * 1024;

/// Plan columns that carry the estimated row count, across server families.
///
/// MySQL and MariaDB report `rows`; TiDB reports `estRows` (`count` before 4.0).
const ESTIMATE_FIELDS: &[&str] = &["rows", "estRows", "count"];

/// Rows per chunk for a table whose average row length is `avg_row_length` bytes.
pub fn suitable_rows_per_chunk(avg_row_length: u64) -> u64 {
    if avg_row_length == 0 {
        return DEFAULT_ROWS;
    }
    (BYTES_PER_CHUNK / avg_row_length).min(MAX_ROWS)
}

/// Estimated row count from the first row of an `EXPLAIN` result.
///
/// Returns 0 ("unknown") when the plan has no rows, no estimate column or an
/// unparsable estimate.
pub fn detect_estimate_rows(plan: &ResultSet) -> u64 {
    let Some(index) = plan.columns.iter().position(|c| {
        ESTIMATE_FIELDS
            .iter()
            .any(|field| c.eq_ignore_ascii_case(field))
    }) else {
        warn!("Cannot find estimate column in plan columns {:?}", plan.columns);
        return 0;
    };

    let Some(value) = plan.text(0, index) else {
        warn!("Plan has no estimate value");
        return 0;
    };

    match value.trim().parse::<f64>() {
        Ok(rows) if rows.is_finite() && rows > 0.0 => rows as u64,
        Ok(_) => 0,
        Err(e) => {
            warn!("Cannot parse estimated rows '{}': {}", value, e);
            0
        }
    }
}

/// Planner row estimate for `identity`, honouring the user filter.
///
/// Failures are logged and reported as 0.
pub async fn estimate_count(
    conn: &mut dyn SqlConn,
    identity: &TableIdentity,
    field: &str,
    filter: Option<&str>,
) -> u64 {
    let query = build_explain_query(identity, field, filter);
    match conn.query(&query).await {
        Ok(plan) => {
            let rows = detect_estimate_rows(&plan);
            debug!("{}: estimated {} rows", identity, rows);
            rows
        }
        Err(e) => {
            warn!("{}: cannot estimate row count: {}", identity, e);
            0
        }
    }
}

/// Number of chunks `count` rows split into at `rows_per_chunk` rows each.
pub fn estimated_chunk_count(count: u64, rows_per_chunk: u64) -> u64 {
    if rows_per_chunk == 0 {
        return 0;
    }
    count / rows_per_chunk
}
