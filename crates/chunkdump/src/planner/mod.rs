//! Chunk planning: from table metadata to a stream of [`ChunkTask`]s.
//!
//! For each table the planner loads metadata, picks a key, obtains boundaries
//! from the source matching the server's capabilities, turns them into range
//! predicates and sends one task per predicate, in key order. Whenever too few
//! boundaries are available the table (or partition) becomes a single chunk.

mod task;

pub use task::{ChunkTask, PlannerSettings};

use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::boundary::{
    self, decoded_table_boundaries, integer_range_boundaries, partition_region_boundaries,
    sample_boundaries, BoundaryMode, LegacyRegionMap,
};
use crate::core::cancel::cancellable;
use crate::core::identifier::quote;
use crate::core::schema::{
    BoundaryTuple, DatabaseTables, IndexEntry, TableIdentity, TableInfo, TableMeta, TableType,
    IMPLICIT_ROW_ID,
};
use crate::error::{DumpError, Result};
use crate::estimate::{estimate_count, suitable_rows_per_chunk};
use crate::keys::{region_row_key, sample_row_key, select_ordering_key};
use crate::metadata::MetadataCollector;
use crate::partition::{build_where_clauses, first_out_of_order};
use crate::query::{build_order_by_clause, build_select_query, build_where_condition};

/// Predicates for one table or one of its partitions.
///
/// No predicates means the whole segment is one chunk.
struct Segment {
    identity: TableIdentity,
    predicates: Vec<String>,
}

impl Segment {
    fn whole(identity: TableIdentity) -> Self {
        Self {
            identity,
            predicates: Vec::new(),
        }
    }

    fn chunk_count(&self) -> usize {
        self.predicates.len().max(1)
    }
}

/// Run a boundary fetch; acquisition failures are logged and yield no tuples.
async fn absorb_boundary_errors<F>(
    cancel: &CancellationToken,
    identity: &TableIdentity,
    fetch: F,
) -> Result<Vec<BoundaryTuple>>
where
    F: Future<Output = Result<Vec<BoundaryTuple>>>,
{
    match cancellable(cancel, fetch).await {
        Ok(tuples) => Ok(tuples),
        Err(DumpError::Cancelled) => Err(DumpError::Cancelled),
        Err(e) => {
            warn!("{}: {}, dumping as a single chunk", identity, e);
            Ok(Vec::new())
        }
    }
}

/// Columns chunk queries are ordered by: the implicit row identity, else the primary key.
fn order_columns(meta: &TableMeta, pk_columns: &[String]) -> Vec<String> {
    if meta.has_implicit_row_id {
        vec![IMPLICIT_ROW_ID.to_string()]
    } else {
        pk_columns.to_vec()
    }
}

/// Plans every table over one metadata session and feeds the task queue.
pub struct ChunkPlanner {
    metadata: MetadataCollector,
    mode: BoundaryMode,
    probe_row_id: bool,
    settings: PlannerSettings,
    legacy: Option<LegacyRegionMap>,
    tx: mpsc::Sender<ChunkTask>,
    cancel: CancellationToken,
}

impl ChunkPlanner {
    /// `probe_row_id` enables the implicit row identity probe, which only
    /// makes sense on servers that synthesize that column.
    pub fn new(
        metadata: MetadataCollector,
        mode: BoundaryMode,
        probe_row_id: bool,
        settings: PlannerSettings,
        tx: mpsc::Sender<ChunkTask>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            metadata,
            mode,
            probe_row_id,
            settings,
            legacy: None,
            tx,
            cancel,
        }
    }

    /// Region handles used in [`BoundaryMode::RegionLegacy`].
    pub fn with_legacy_regions(mut self, map: LegacyRegionMap) -> Self {
        self.legacy = Some(map);
        self
    }

    /// Plan every table in order; returns the number of tasks sent.
    ///
    /// The task channel closes when the planner is dropped at the end.
    pub async fn run(mut self, tables: DatabaseTables) -> Result<usize> {
        info!("Planning chunks with {} boundaries", self.mode);
        let mut total = 0;
        for (database, infos) in &tables {
            for info in infos {
                if self.cancel.is_cancelled() {
                    return Err(DumpError::Cancelled);
                }
                total += self.plan_table(database, info).await?;
            }
        }
        info!("Planned {} chunks", total);
        Ok(total)
    }

    /// Plan one table and send its tasks; returns how many were sent.
    ///
    /// Views carry no rows of their own and are skipped.
    pub async fn plan_table(&mut self, database: &str, info: &TableInfo) -> Result<usize> {
        let identity = TableIdentity::new(database, info.name.as_str());
        if info.table_type == TableType::View {
            debug!("{}: view, no data chunks", identity);
            return Ok(0);
        }

        let meta = cancellable(
            &self.cancel,
            self.metadata.load_table_meta(
                &identity,
                info,
                self.settings.complete_insert,
                self.probe_row_id,
            ),
        )
        .await?;
        // Integer ranges may pick a unique key, so they need every index entry.
        let (pk_columns, index_entries) = if self.mode == BoundaryMode::IntegerRange {
            let entries =
                cancellable(&self.cancel, self.metadata.index_entries(&identity)).await?;
            (IndexEntry::primary_columns(&entries), entries)
        } else {
            let pk = cancellable(&self.cancel, self.metadata.primary_key_columns(&identity))
                .await?;
            (pk, Vec::new())
        };

        let segments = match self.mode {
            BoundaryMode::TableSample => self.sample_segments(&meta, &pk_columns).await?,
            BoundaryMode::RegionDecoded => self.region_segments(&meta, &pk_columns).await?,
            BoundaryMode::RegionLegacy => self.legacy_segments(&meta, &pk_columns)?,
            BoundaryMode::IntegerRange => self.range_segments(&meta, &index_entries).await?,
        };

        let order_by = if self.settings.sort_by_key {
            build_order_by_clause(&order_columns(&meta, &pk_columns))
        } else {
            String::new()
        };
        let filter = self.settings.filter.clone();
        let total_chunks: usize = segments.iter().map(Segment::chunk_count).sum();

        let mut chunk_index = 0;
        for segment in &segments {
            let predicates: Vec<&str> = if segment.predicates.is_empty() {
                vec![""]
            } else {
                segment.predicates.iter().map(String::as_str).collect()
            };
            for predicate in predicates {
                let query = build_select_query(
                    &segment.identity,
                    &meta.selected_field,
                    &build_where_condition(filter.as_deref(), predicate),
                    &order_by,
                );
                self.send(ChunkTask {
                    table: segment.identity.clone(),
                    query,
                    chunk_index,
                    total_chunks,
                })
                .await?;
                chunk_index += 1;
            }
        }

        info!("{}: {} chunks", identity, total_chunks);
        Ok(total_chunks)
    }

    async fn send(&mut self, task: ChunkTask) -> Result<()> {
        let tx = &self.tx;
        cancellable(&self.cancel, async move {
            tx.send(task).await.map_err(|_| DumpError::TaskQueueClosed)
        })
        .await
    }

    async fn sample_segments(
        &mut self,
        meta: &TableMeta,
        pk_columns: &[String],
    ) -> Result<Vec<Segment>> {
        let identity = meta.identity.clone();
        let key = sample_row_key(meta, pk_columns);
        if key.is_empty() {
            debug!("{}: no row key to sample", identity);
            return Ok(vec![Segment::whole(identity)]);
        }
        let tuples = absorb_boundary_errors(
            &self.cancel,
            &identity,
            sample_boundaries(self.metadata.conn_mut(), &identity, &key),
        )
        .await?;
        segment_from(identity, &key.columns, tuples)
    }

    async fn region_segments(
        &mut self,
        meta: &TableMeta,
        pk_columns: &[String],
    ) -> Result<Vec<Segment>> {
        let identity = meta.identity.clone();
        let Some(key) = region_row_key(meta, pk_columns) else {
            debug!("{}: no integer row handle, single chunk", identity);
            return Ok(vec![Segment::whole(identity)]);
        };

        if meta.partitions.is_empty() {
            let table_id = match cancellable(&self.cancel, self.metadata.table_id(&identity)).await
            {
                Ok(id) => id,
                Err(DumpError::Cancelled) => return Err(DumpError::Cancelled),
                Err(e) => {
                    debug!("{}: table id unavailable: {}", identity, e);
                    None
                }
            };
            let tuples = absorb_boundary_errors(
                &self.cancel,
                &identity,
                decoded_table_boundaries(self.metadata.conn_mut(), &identity, table_id),
            )
            .await?;
            return segment_from(identity, &key.columns, tuples);
        }

        let mut segments = Vec::with_capacity(meta.partitions.len());
        for partition in &meta.partitions {
            let part = identity.with_partition(partition.as_str());
            let tuples = absorb_boundary_errors(
                &self.cancel,
                &part,
                partition_region_boundaries(self.metadata.conn_mut(), &part),
            )
            .await?;
            segments.extend(segment_from(part, &key.columns, tuples)?);
        }
        Ok(segments)
    }

    fn legacy_segments(&self, meta: &TableMeta, pk_columns: &[String]) -> Result<Vec<Segment>> {
        let identity = meta.identity.clone();
        let Some(key) = region_row_key(meta, pk_columns) else {
            debug!("{}: no integer row handle, single chunk", identity);
            return Ok(vec![Segment::whole(identity)]);
        };
        let tuples = self
            .legacy
            .as_ref()
            .map(|map| map.boundaries(&identity))
            .unwrap_or_default();
        segment_from(identity, &key.columns, tuples)
    }

    async fn range_segments(
        &mut self,
        meta: &TableMeta,
        index_entries: &[IndexEntry],
    ) -> Result<Vec<Segment>> {
        let identity = meta.identity.clone();
        let Some(field) = select_ordering_key(meta, index_entries) else {
            debug!("{}: no numeric key, single chunk", identity);
            return Ok(vec![Segment::whole(identity)]);
        };
        let rows_per_chunk = self
            .settings
            .rows
            .unwrap_or_else(|| suitable_rows_per_chunk(meta.avg_row_length));
        let filter = self.settings.filter.as_deref();

        let conn = self.metadata.conn_mut();
        let count = cancellable(&self.cancel, async {
            Ok(estimate_count(conn, &identity, &field, filter).await)
        })
        .await?;
        let tuples = absorb_boundary_errors(
            &self.cancel,
            &identity,
            integer_range_boundaries(
                self.metadata.conn_mut(),
                &identity,
                &field,
                count,
                rows_per_chunk,
                filter,
            ),
        )
        .await?;
        if tuples.is_empty() {
            return Ok(vec![Segment::whole(identity)]);
        }

        let mut predicates = build_where_clauses(&[field.as_str()], &tuples)?;
        if meta.is_nullable(&field) {
            predicates[0] = format!("{} IS NULL or({})", quote(&field), predicates[0]);
        }
        Ok(vec![Segment {
            identity,
            predicates,
        }])
    }
}

/// A segment split at `tuples`, or whole when too few are usable.
///
/// Tuples come from the server, so a misordered sequence is not fatal: the
/// segment is dumped whole.
fn segment_from(
    identity: TableIdentity,
    columns: &[String],
    tuples: Vec<BoundaryTuple>,
) -> Result<Vec<Segment>> {
    let Some(tuples) = boundary::usable(tuples) else {
        debug!("{}: too few boundaries, single chunk", identity);
        return Ok(vec![Segment::whole(identity)]);
    };
    if let Some(i) = first_out_of_order(&tuples) {
        warn!(
            "{}: boundaries {:?} and {:?} are out of order, dumping as a single chunk",
            identity,
            tuples[i],
            tuples[i + 1]
        );
        return Ok(vec![Segment::whole(identity)]);
    }
    let predicates = build_where_clauses(columns, &tuples)?;
    Ok(vec![Segment {
        identity,
        predicates,
    }])
}
