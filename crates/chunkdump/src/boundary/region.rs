//! Boundaries from storage region start keys on servers that decode them.

use tracing::debug;

use super::region_key::{parse_decoded_key, parse_show_regions_key, RegionKey};
use crate::core::identifier::quote;
use crate::core::schema::{BoundaryTuple, TableIdentity};
use crate::core::traits::SqlConn;
use crate::error::{DumpError, Result};

const TABLE_REGION_SQL: &str = "SELECT START_KEY,tidb_decode_key(START_KEY) from INFORMATION_SCHEMA.TIKV_REGION_STATUS s WHERE s.DB_NAME = ? AND s.TABLE_NAME = ? AND IS_INDEX = 0 ORDER BY START_KEY";

/// Row handles at which the regions of an unpartitioned table start.
///
/// The first region's start key belongs to the table start (or a preceding
/// table) and is skipped. When `table_id` is known, keys decoded for another
/// table are dropped.
pub async fn decoded_table_boundaries(
    conn: &mut dyn SqlConn,
    identity: &TableIdentity,
    table_id: Option<i64>,
) -> Result<Vec<BoundaryTuple>> {
    let rs = conn
        .query_with_args(
            TABLE_REGION_SQL,
            &[identity.database.clone(), identity.table.clone()],
        )
        .await
        .map_err(|e| DumpError::boundary(identity.full_name(), e))?;

    let mut tuples = Vec::new();
    for row in 1..rs.rows.len() {
        if rs.cell(row, 0).is_none() {
            debug!("{}: region {} has no start key", identity, row);
            continue;
        }
        let Some(decoded) = rs.text(row, 1) else {
            debug!("{}: region {} start key cannot be decoded", identity, row);
            continue;
        };
        let Some((key_table, handle)) = parse_decoded_key(&decoded) else {
            debug!("{}: skipping region start key {}", identity, decoded);
            continue;
        };
        if let (Some(expected), Some(actual)) = (table_id, key_table) {
            if expected != actual {
                debug!("{}: region key of table {} ignored", identity, actual);
                continue;
            }
        }
        tuples.push(vec![handle]);
    }
    debug!("{}: {} region boundaries", identity, tuples.len());
    Ok(tuples)
}

/// Row handles at which the regions of one partition start.
///
/// `identity` must name the partition. The partition's physical table is the
/// one most start keys belong to (the first on a tie); keys of any other table
/// are dropped, as is the first region's start key.
pub async fn partition_region_boundaries(
    conn: &mut dyn SqlConn,
    identity: &TableIdentity,
) -> Result<Vec<BoundaryTuple>> {
    let partition = identity.partition.as_deref().ok_or_else(|| {
        DumpError::boundary(identity.full_name(), "partition region scan without a partition")
    })?;
    let query = format!(
        "SHOW TABLE {} PARTITION({}) REGIONS",
        identity.qualified(),
        quote(partition)
    );
    let start_keys = conn
        .query(&query)
        .await
        .and_then(|rs| rs.specified_columns(&["START_KEY"]))
        .map_err(|e| DumpError::boundary(identity.full_name(), e))?;

    let keys: Vec<Option<RegionKey>> = start_keys
        .iter()
        .map(|row| parse_show_regions_key(&row[0]))
        .collect();
    let Some(table_id) = dominant_table_id(keys.iter().flatten()) else {
        debug!("{}: no table keys among regions", identity);
        return Ok(Vec::new());
    };

    let mut tuples = Vec::new();
    for key in keys.iter().skip(1).flatten() {
        if key.table_id != table_id {
            debug!("{}: region key of table {} ignored", identity, key.table_id);
            continue;
        }
        if let Some(handle) = key.handle {
            tuples.push(vec![handle.to_string()]);
        }
    }
    debug!("{}: {} region boundaries of table {}", identity, tuples.len(), table_id);
    Ok(tuples)
}

fn dominant_table_id<'a>(keys: impl Iterator<Item = &'a RegionKey>) -> Option<i64> {
    let mut counts: Vec<(i64, usize)> = Vec::new();
    for key in keys {
        match counts.iter_mut().find(|(id, _)| *id == key.table_id) {
            Some((_, n)) => *n += 1,
            None => counts.push((key.table_id, 1)),
        }
    }
    counts
        .iter()
        .fold(None, |best: Option<(i64, usize)>, &(id, n)| match best {
            Some((_, top)) if top >= n => best,
            _ => Some((id, n)),
        })
        .map(|(id, _)| id)
}
