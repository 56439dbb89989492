//! Boundaries sampled from one row per storage region.

use tracing::debug;

use crate::core::schema::{BoundaryTuple, OrderingKey, TableIdentity};
use crate::core::traits::SqlConn;
use crate::error::{DumpError, Result};
use crate::query::build_sample_query;

/// Sorted key tuples, one per sampled region.
///
/// Rows with a NULL in any key column are dropped. Values are rendered as
/// literals of their column's type family.
pub async fn sample_boundaries(
    conn: &mut dyn SqlConn,
    identity: &TableIdentity,
    key: &OrderingKey,
) -> Result<Vec<BoundaryTuple>> {
    let query = build_sample_query(identity, key);
    let rs = conn
        .query(&query)
        .await
        .map_err(|e| DumpError::boundary(identity.full_name(), e))?;

    if rs.columns.len() != key.len() {
        return Err(DumpError::boundary(
            identity.full_name(),
            format!(
                "sample returned {} columns for a {}-column key",
                rs.columns.len(),
                key.len()
            ),
        ));
    }

    let families = key.families();
    let mut tuples = Vec::with_capacity(rs.rows.len());
    let mut dropped = 0usize;
    for row in &rs.rows {
        let tuple: Option<BoundaryTuple> = row
            .iter()
            .zip(&families)
            .map(|(cell, family)| cell.as_deref().map(|raw| family.render(raw)))
            .collect();
        match tuple {
            Some(tuple) => tuples.push(tuple),
            None => dropped += 1,
        }
    }
    debug!(
        "{}: sampled {} boundaries ({} with NULL keys dropped)",
        identity,
        tuples.len(),
        dropped
    );
    Ok(tuples)
}
