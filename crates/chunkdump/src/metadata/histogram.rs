//! Physical table and partition IDs for servers without partition catalogs.
//!
//! Older TiDB releases do not expose partition IDs directly. They can be
//! recovered by matching the per-partition rows of `SHOW STATS_HISTOGRAMS`
//! against `mysql.stats_histograms` on (update time, distinct count).

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::core::schema::DatabaseTables;

/// Partition name to physical ID, per table, per database.
pub type PartitionIds = BTreeMap<String, BTreeMap<String, BTreeMap<String, i64>>>;

/// Physical IDs of one logical table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableIds {
    pub table_id: Option<i64>,
    pub partitions: BTreeMap<String, i64>,
}

impl TableIds {
    /// The table ID followed by every partition ID.
    pub fn all(&self) -> Vec<i64> {
        self.table_id
            .into_iter()
            .chain(self.partitions.values().copied())
            .collect()
    }
}

/// [`TableIds`] per table, per database.
pub type PhysicalTableIds = BTreeMap<String, BTreeMap<String, TableIds>>;

#[derive(Debug, Clone)]
struct PartitionRef {
    database: String,
    table: String,
    partition: String,
}

/// Histogram rows of requested, partitioned tables keyed by (update time, distinct count).
///
/// `histograms` rows are `[db, table, partition, update_time, distinct_count]`.
/// When several partitions share a key the last one listed wins.
fn partition_stat_keys(
    tables: &DatabaseTables,
    histograms: &[Vec<String>],
) -> HashMap<(String, String), PartitionRef> {
    let mut keys = HashMap::new();
    for row in histograms {
        let [db, table, partition, update_time, distinct_count] = row.as_slice() else {
            continue;
        };
        if partition.is_empty() {
            continue;
        }
        let requested = tables
            .get(db)
            .map_or(false, |infos| infos.iter().any(|t| &t.name == table));
        if !requested {
            continue;
        }
        keys.insert(
            (update_time.clone(), distinct_count.clone()),
            PartitionRef {
                database: db.clone(),
                table: table.clone(),
                partition: partition.clone(),
            },
        );
    }
    keys
}

/// Recover partition IDs of requested tables.
///
/// `stats` rows are `[table_id, update_time, distinct_count]`. Rows that match
/// no partition or carry an unparsable ID are ignored.
pub fn join_partition_ids(
    tables: &DatabaseTables,
    histograms: &[Vec<String>],
    stats: &[Vec<String>],
) -> PartitionIds {
    let keys = partition_stat_keys(tables, histograms);
    let mut ids = PartitionIds::new();
    if keys.is_empty() {
        return ids;
    }

    for row in stats {
        let [table_id, update_time, distinct_count] = row.as_slice() else {
            continue;
        };
        let Some(part) = keys.get(&(update_time.clone(), distinct_count.clone())) else {
            continue;
        };
        let Ok(table_id) = table_id.trim().parse::<i64>() else {
            debug!("Skipping stats row with table id '{}'", table_id);
            continue;
        };
        ids.entry(part.database.clone())
            .or_default()
            .entry(part.table.clone())
            .or_default()
            .insert(part.partition.clone(), table_id);
    }
    ids
}

/// True when any requested table has a partitioned histogram row.
pub(super) fn has_partition_rows(tables: &DatabaseTables, histograms: &[Vec<String>]) -> bool {
    !partition_stat_keys(tables, histograms).is_empty()
}

/// Combine table IDs (`[schema, table, id]` rows) with recovered partition IDs.
pub(super) fn collect_physical_ids(
    tables: &DatabaseTables,
    rows: &[Vec<String>],
    mut partitions: PartitionIds,
) -> PhysicalTableIds {
    let mut ids = PhysicalTableIds::new();
    for row in rows {
        let [db, table, table_id] = row.as_slice() else {
            continue;
        };
        let requested = tables
            .get(db)
            .map_or(false, |infos| infos.iter().any(|t| &t.name == table));
        if !requested {
            continue;
        }
        let partitions = partitions
            .get_mut(db)
            .and_then(|by_table| by_table.remove(table))
            .unwrap_or_default();
        ids.entry(db.clone()).or_default().insert(
            table.clone(),
            TableIds {
                table_id: table_id.trim().parse().ok(),
                partitions,
            },
        );
    }
    ids
}
