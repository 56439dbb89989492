//! Export orchestrator - ties detection, consistency and planning together.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::boundary::{BoundaryMode, LegacyRegionMap};
use crate::config::{Config, ConsistencyKind};
use crate::consistency::ConsistencyController;
use crate::core::cancel::cancellable;
use crate::core::schema::{DatabaseTables, TableType};
use crate::core::traits::{ConnectionFactory, SessionParams, SqlConn};
use crate::error::{DumpError, Result};
use crate::metadata::MetadataCollector;
use crate::planner::{ChunkPlanner, ChunkTask, PlannerSettings};
use crate::server::{ServerCapabilities, ServerInfo, ServerType};

/// Export orchestrator.
pub struct Orchestrator {
    config: Config,
    factory: Arc<dyn ConnectionFactory>,
}

/// Result of a connection health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Overall status.
    pub healthy: bool,

    /// Whether a session could be opened.
    pub source_connected: bool,

    /// Time to connect and identify the server.
    pub source_latency_ms: u64,

    /// Failure reported while connecting or identifying the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<ServerCapabilities>,
}

/// A prepared export: the task stream plus the connections that execute it.
///
/// Every worker connection reads the same consistent view. Tasks arrive in
/// key order per table; the stream ends when planning finishes.
pub struct ExportSession {
    /// Unique run identifier.
    pub run_id: String,

    /// Chunk queries, in planning order.
    pub tasks: mpsc::Receiver<ChunkTask>,

    /// Worker connections, one per configured thread.
    pub workers: Vec<Box<dyn SqlConn>>,

    pub server: ServerInfo,
    pub capabilities: ServerCapabilities,
    pub boundary_mode: BoundaryMode,

    /// Consistency kind actually in effect (`none` after a fallback).
    pub consistency: ConsistencyKind,

    /// TSO every worker reads at, for snapshot consistency.
    pub snapshot: Option<String>,

    planner: JoinHandle<Result<usize>>,
}

impl ExportSession {
    /// Wait for planning to end; returns the number of tasks planned.
    ///
    /// Drain or drop [`tasks`](Self::tasks) first, or a full queue will
    /// keep the planner waiting.
    pub async fn finish(self) -> Result<usize> {
        match self.planner.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(DumpError::Cancelled),
            Err(e) => Err(DumpError::UnexpectedResult(format!(
                "planner task panicked: {}",
                e
            ))),
        }
    }
}

/// Result of a dry-run plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResult {
    /// Unique run identifier.
    pub run_id: String,

    /// When planning started.
    pub started_at: DateTime<Utc>,

    /// When planning completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub server_type: ServerType,
    pub boundary_mode: String,
    pub consistency: ConsistencyKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,

    /// Chunk count per `db.table`.
    pub tables: BTreeMap<String, usize>,

    /// Every planned chunk, in planning order.
    pub tasks: Vec<ChunkTask>,
}

impl PlanResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Create a new orchestrator over an injected connection factory.
    pub fn new(config: Config, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self { config, factory }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connect once and identify the server.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let base = self.config.source.base_session();

        let detected = async {
            let mut metadata = MetadataCollector::connect(self.factory.as_ref(), &base)
                .await
                .map_err(|e| (false, e))?;
            metadata.detect_server().await.map_err(|e| (true, e))
        }
        .await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let result = match detected {
            Ok(server) => {
                info!(
                    "Source {} is {} ({}ms)",
                    self.config.source.address(),
                    server.server_type,
                    source_latency_ms
                );
                HealthCheckResult {
                    healthy: true,
                    source_connected: true,
                    source_latency_ms,
                    source_error: None,
                    capabilities: Some(ServerCapabilities::resolve(&server)),
                    server: Some(server),
                }
            }
            Err((connected, e)) => {
                warn!("Health check failed: {}", e);
                HealthCheckResult {
                    healthy: false,
                    source_connected: connected,
                    source_latency_ms,
                    source_error: Some(e.to_string()),
                    server: None,
                    capabilities: None,
                }
            }
        };
        Ok(result)
    }

    /// Establish a consistent view and start planning.
    ///
    /// The lock (if any) is released before this returns, once every worker
    /// connection has started its transaction.
    pub async fn prepare(&self, cancel: CancellationToken) -> Result<ExportSession> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let export = &self.config.export;
        let factory = self.factory.as_ref();
        let base = self.config.source.base_session();
        info!("Starting export run: {}", run_id);

        // Phase 1: Identify the server
        info!("Phase 1: Detecting server at {}", self.config.source.address());
        let mut metadata =
            cancellable(&cancel, MetadataCollector::connect(factory, &base)).await?;
        let server = cancellable(&cancel, metadata.detect_server()).await?;
        let capabilities = ServerCapabilities::resolve(&server);
        let boundary_mode = BoundaryMode::resolve(&capabilities);
        info!(
            "Server: {} {}, boundaries: {}",
            server.server_type,
            server
                .version
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            boundary_mode
        );

        // Phase 2: List tables
        info!("Phase 2: Listing tables");
        let tables = self.list_tables(&mut metadata, &server, &cancel).await?;

        // Phase 3: Consistency
        info!("Phase 3: Establishing {} consistency", export.consistency);
        let mut consistency = ConsistencyController::setup(
            export,
            &capabilities,
            factory,
            &base,
            &mut metadata,
            &tables,
            &cancel,
        )
        .await?;
        drop(metadata);

        // Phase 4: Open connections sharing the view, then drop the lock
        let threads = export.get_threads();
        info!("Phase 4: Opening {} worker connections", threads);
        let opened = open_connections(&consistency, factory, &base, threads, &cancel).await;
        let released = consistency.release().await;
        let (workers, planner_conn) = opened?;
        released?;

        let mut planner_meta = MetadataCollector::new(planner_conn);
        let legacy = if boundary_mode == BoundaryMode::RegionLegacy {
            match cancellable(&cancel, LegacyRegionMap::load(&mut planner_meta, &tables)).await {
                Ok(map) => Some(map),
                Err(DumpError::Cancelled) => return Err(DumpError::Cancelled),
                Err(e) => {
                    warn!("Cannot load region map, tables will not be split: {}", e);
                    None
                }
            }
        } else {
            None
        };

        // Phase 5: Plan in the background
        info!("Phase 5: Planning chunks");
        let (tx, rx) = mpsc::channel(export.get_task_queue_size());
        let mut planner = ChunkPlanner::new(
            planner_meta,
            boundary_mode,
            server.server_type == ServerType::TiDB,
            PlannerSettings::from_config(export),
            tx,
            cancel,
        );
        if let Some(map) = legacy {
            planner = planner.with_legacy_regions(map);
        }
        let handle = tokio::spawn(planner.run(tables));

        Ok(ExportSession {
            run_id,
            tasks: rx,
            workers,
            server,
            capabilities,
            boundary_mode,
            consistency: consistency.kind(),
            snapshot: consistency.snapshot().map(str::to_string),
            planner: handle,
        })
    }

    /// Dry run: plan every table and collect the tasks without executing them.
    pub async fn plan(&self, cancel: CancellationToken) -> Result<PlanResult> {
        let started_at = Utc::now();
        let mut session = self.prepare(cancel).await?;

        let mut tasks = Vec::new();
        while let Some(task) = session.tasks.recv().await {
            tasks.push(task);
        }
        let run_id = session.run_id.clone();
        let server_type = session.server.server_type;
        let boundary_mode = session.boundary_mode.to_string();
        let consistency = session.consistency;
        let snapshot = session.snapshot.clone();
        let planned = session.finish().await?;

        let mut tables: BTreeMap<String, usize> = BTreeMap::new();
        for task in &tasks {
            *tables.entry(task.table.full_name()).or_default() += 1;
        }
        let completed_at = Utc::now();
        info!("Planned {} chunks over {} tables", planned, tables.len());

        Ok(PlanResult {
            run_id,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            server_type,
            boundary_mode,
            consistency,
            snapshot,
            tables,
            tasks,
        })
    }

    async fn list_tables(
        &self,
        metadata: &mut MetadataCollector,
        server: &ServerInfo,
        cancel: &CancellationToken,
    ) -> Result<DatabaseTables> {
        let databases = if self.config.source.databases.is_empty() {
            cancellable(cancel, metadata.user_databases()).await?
        } else {
            self.config.source.databases.clone()
        };
        let asap = server.server_type == ServerType::TiDB;
        let mut tables = cancellable(
            cancel,
            metadata.list_all_databases_tables(
                &databases,
                asap,
                &[TableType::Base, TableType::View],
            ),
        )
        .await?;

        let export = &self.config.export;
        for (database, infos) in tables.iter_mut() {
            infos.retain(|info| {
                let blocked = export.is_blocked(database, &info.name);
                if blocked {
                    info!("Skipping blocked table {}.{}", database, info.name);
                }
                !blocked
            });
        }
        Ok(tables)
    }
}

/// `threads` worker connections plus one for the planner, all reading the shared view.
async fn open_connections(
    consistency: &ConsistencyController,
    factory: &dyn ConnectionFactory,
    base: &SessionParams,
    threads: usize,
    cancel: &CancellationToken,
) -> Result<(Vec<Box<dyn SqlConn>>, Box<dyn SqlConn>)> {
    let mut workers = Vec::with_capacity(threads);
    for _ in 0..threads {
        workers.push(consistency.open_conn(factory, base, cancel).await?);
    }
    let planner_conn = consistency.open_conn(factory, base, cancel).await?;
    Ok((workers, planner_conn))
}
