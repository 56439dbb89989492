//! Region handles for servers that cannot decode region keys themselves.
//!
//! All region start keys are read once, decoded locally and grouped by the
//! physical IDs of each requested table (the table ID plus its partition IDs).

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use super::region_key::decode_region_start_key;
use crate::core::schema::{BoundaryTuple, DatabaseTables, TableIdentity};
use crate::error::Result;
use crate::metadata::{MetadataCollector, PhysicalTableIds};

const REGIONS_SQL: &str =
    "SELECT REGION_ID,START_KEY,END_KEY FROM INFORMATION_SCHEMA.TIKV_REGION_STATUS ORDER BY START_KEY;";

/// Sorted region handles per table, per database.
#[derive(Debug, Clone, Default)]
pub struct LegacyRegionMap {
    handles: BTreeMap<String, BTreeMap<String, Vec<i64>>>,
}

impl LegacyRegionMap {
    /// Read physical IDs and regions for `tables` and build the map.
    pub async fn load(collector: &mut MetadataCollector, tables: &DatabaseTables) -> Result<Self> {
        let ids = collector.physical_table_ids(tables).await?;
        let regions = collector
            .conn_mut()
            .query(REGIONS_SQL)
            .await?
            .specified_columns(&["REGION_ID", "START_KEY", "END_KEY"])?;
        let start_keys: Vec<String> = regions.into_iter().map(|mut row| row.swap_remove(1)).collect();
        let map = Self::build(&ids, &start_keys);
        info!(
            "Decoded {} region keys for {} tables",
            start_keys.len(),
            map.handles.values().map(BTreeMap::len).sum::<usize>()
        );
        Ok(map)
    }

    /// Group decoded handles of `start_keys` under the tables owning them.
    ///
    /// Undecodable keys and table sentinels are skipped.
    pub fn build(ids: &PhysicalTableIds, start_keys: &[String]) -> Self {
        let mut by_physical_id: HashMap<i64, Vec<i64>> = HashMap::new();
        for key in start_keys {
            match decode_region_start_key(key) {
                Ok(Some(region)) => {
                    if let Some(handle) = region.handle {
                        by_physical_id.entry(region.table_id).or_default().push(handle);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Skipping region start key {}: {}", key, e),
            }
        }

        let mut handles: BTreeMap<String, BTreeMap<String, Vec<i64>>> = BTreeMap::new();
        for (db, tables) in ids {
            for (table, table_ids) in tables {
                let mut collected: Vec<i64> = table_ids
                    .all()
                    .iter()
                    .filter_map(|id| by_physical_id.get(id))
                    .flatten()
                    .copied()
                    .collect();
                collected.sort_unstable();
                collected.dedup();
                handles
                    .entry(db.clone())
                    .or_default()
                    .insert(table.clone(), collected);
            }
        }
        Self { handles }
    }

    /// Boundaries of a table; empty when no region handles were found.
    pub fn boundaries(&self, identity: &TableIdentity) -> Vec<BoundaryTuple> {
        self.handles
            .get(&identity.database)
            .and_then(|tables| tables.get(&identity.table))
            .map(|handles| handles.iter().map(|h| vec![h.to_string()]).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TableIds;

    const SIGN_MASK: u64 = 1 << 63;

    /// Memcomparable-encode `t{table_id}[_r{handle}]` as hex.
    fn encode_key(table_id: i64, handle: Option<i64>) -> String {
        let mut raw = vec![b't'];
        raw.extend_from_slice(&((table_id as u64) ^ SIGN_MASK).to_be_bytes());
        if let Some(h) = handle {
            raw.extend_from_slice(b"_r");
            raw.extend_from_slice(&((h as u64) ^ SIGN_MASK).to_be_bytes());
        }
        let mut encoded = Vec::new();
        let mut chunks = raw.chunks_exact(8);
        for chunk in chunks.by_ref() {
            encoded.extend_from_slice(chunk);
            encoded.push(0xFF);
        }
        let rest = chunks.remainder();
        let mut last = rest.to_vec();
        last.resize(8, 0);
        encoded.extend_from_slice(&last);
        encoded.push(0xFF - (8 - rest.len()) as u8);
        hex::encode_upper(encoded)
    }

    fn ids() -> PhysicalTableIds {
        let mut tables = BTreeMap::new();
        tables.insert(
            "t1".to_string(),
            TableIds { table_id: Some(41), partitions: BTreeMap::new() },
        );
        tables.insert(
            "t2".to_string(),
            TableIds {
                table_id: Some(2127),
                partitions: [("p0".to_string(), 2128), ("p1".to_string(), 2129)]
                    .into_iter()
                    .collect(),
            },
        );
        let mut ids = PhysicalTableIds::new();
        ids.insert("test".to_string(), tables);
        ids
    }

    #[test]
    fn test_encode_key_matches_server_format() {
        assert_eq!(encode_key(51, None), "7480000000000000FF3300000000000000F8");
        assert_eq!(
            encode_key(51, Some(960001)),
            "7480000000000000FF335F728000000000FF0EA6010000000000FA"
        );
    }

    #[test]
    fn test_build_groups_partitions_under_table() {
        let keys = vec![
            encode_key(41, None),
            encode_key(41, Some(5000)),
            encode_key(41, Some(10000)),
            encode_key(2128, None),
            encode_key(2128, Some(700)),
            encode_key(2129, None),
            encode_key(2129, Some(300)),
            encode_key(2129, Some(1200)),
            encode_key(3000, Some(1)),
            "not-hex".to_string(),
        ];
        let map = LegacyRegionMap::build(&ids(), &keys);

        let t1 = map.boundaries(&TableIdentity::new("test", "t1"));
        assert_eq!(t1, vec![vec!["5000".to_string()], vec!["10000".to_string()]]);

        let t2 = map.boundaries(&TableIdentity::new("test", "t2"));
        assert_eq!(
            t2,
            vec![vec!["300".to_string()], vec!["700".to_string()], vec!["1200".to_string()]]
        );

        assert!(map.boundaries(&TableIdentity::new("test", "t9")).is_empty());
    }
}
