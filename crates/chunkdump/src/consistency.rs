//! Consistent view shared by every export connection.
//!
//! Two families of strategy exist:
//!
//! - snapshot: a point-in-time position applied to each session as
//!   `tidb_snapshot`; nothing is held on the server
//! - lock (`flush`, `lock`): a read lock held on a dedicated connection while
//!   each participating connection starts a consistent-snapshot transaction,
//!   released once they all have
//!
//! The controller moves `Uninitialized -> SnapshotEstablished -> Released`.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConsistencyKind, ExportConfig};
use crate::core::cancel::cancellable;
use crate::core::schema::DatabaseTables;
use crate::core::traits::{ConnectionFactory, SessionParams, SqlConn};
use crate::error::{DumpError, Result};
use crate::metadata::MetadataCollector;
use crate::query::build_lock_tables_sql;
use crate::server::ServerCapabilities;

/// Session variable that pins reads to a snapshot.
pub const SNAPSHOT_VARIABLE: &str = "tidb_snapshot";

const FLUSH_SQL: &str = "FLUSH TABLES WITH READ LOCK";
const UNLOCK_SQL: &str = "UNLOCK TABLES";
const ISOLATION_SQL: &str = "SET SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ";
const START_TRANSACTION_SQL: &str = "START TRANSACTION /*!40108 WITH CONSISTENT SNAPSHOT */";

/// Physical bits of a TSO below the millisecond timestamp.
const TSO_LOGICAL_BITS: u32 = 18;

/// Lifecycle of the shared view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyState {
    Uninitialized,
    SnapshotEstablished,
    Released,
}

/// Establishes, shares and releases the consistent view of one export run.
pub struct ConsistencyController {
    kind: ConsistencyKind,
    state: ConsistencyState,
    lock_conn: Option<Box<dyn SqlConn>>,
    snapshot: Option<String>,
}

impl std::fmt::Debug for ConsistencyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyController")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("holds_lock", &self.lock_conn.is_some())
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

/// Concrete kind for `kind` on a server with `caps`; `auto` never survives.
pub fn resolve_kind(kind: ConsistencyKind, caps: &ServerCapabilities) -> ConsistencyKind {
    match kind {
        ConsistencyKind::Auto if caps.supports_explicit_snapshot => ConsistencyKind::Snapshot,
        ConsistencyKind::Auto => ConsistencyKind::Flush,
        other => other,
    }
}

/// Normalize a snapshot position to a TSO.
///
/// A number is taken as a TSO already. Anything else is handed to the server
/// as a `YYYY-MM-DD HH:MM:SS` time and converted with `(ts << 18) * 1000`.
pub async fn parse_snapshot_to_tso(conn: &mut dyn SqlConn, snapshot: &str) -> Result<String> {
    let snapshot = snapshot.trim();
    if snapshot.parse::<u64>().is_ok() {
        return Ok(snapshot.to_string());
    }

    let rs = conn
        .query_with_args("SELECT unix_timestamp(?)", &[snapshot.to_string()])
        .await?;
    let unsupported = || {
        DumpError::Consistency(format!(
            "snapshot {} format not supported. please use tso or '2006-01-02 15:04:05' format time",
            snapshot
        ))
    };
    let ts = rs.text(0, 0).ok_or_else(unsupported)?;
    let ts: u64 = match ts.trim().parse::<u64>() {
        Ok(ts) => ts,
        Err(_) => ts
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64)
            .ok_or_else(unsupported)?,
    };
    ts.checked_mul(1000)
        .and_then(|ms| ms.checked_shl(TSO_LOGICAL_BITS))
        .filter(|tso| tso >> TSO_LOGICAL_BITS == ts * 1000)
        .map(|tso| tso.to_string())
        .ok_or_else(unsupported)
}

impl ConsistencyController {
    /// A controller for the concrete `kind` that has not acted yet.
    pub fn new(kind: ConsistencyKind) -> Self {
        Self {
            kind,
            state: ConsistencyState::Uninitialized,
            lock_conn: None,
            snapshot: None,
        }
    }

    /// Resolve the configured kind and establish it.
    ///
    /// With `fallback_to_inconsistent` an establishment failure is logged and
    /// the run continues without coordination; otherwise it is a
    /// [`DumpError::Consistency`]. Cancellation always propagates.
    pub async fn setup(
        config: &ExportConfig,
        caps: &ServerCapabilities,
        factory: &dyn ConnectionFactory,
        base_session: &SessionParams,
        metadata: &mut MetadataCollector,
        tables: &DatabaseTables,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let kind = resolve_kind(config.consistency, caps);
        let mut controller = Self::new(kind);
        let result = controller
            .establish(config, caps, factory, base_session, metadata, tables, cancel)
            .await;
        match result {
            Ok(()) => {
                info!("Consistency established: {}", kind);
                Ok(controller)
            }
            Err(DumpError::Cancelled) => Err(DumpError::Cancelled),
            Err(e) if config.fallback_to_inconsistent => {
                warn!(
                    "Cannot establish {} consistency, continuing without it: {}",
                    kind, e
                );
                let mut fallback = Self::new(ConsistencyKind::None);
                fallback.state = ConsistencyState::SnapshotEstablished;
                Ok(fallback)
            }
            Err(DumpError::Consistency(msg)) => Err(DumpError::Consistency(msg)),
            Err(e) => Err(DumpError::Consistency(format!(
                "cannot establish {} consistency: {}",
                kind, e
            ))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn establish(
        &mut self,
        config: &ExportConfig,
        caps: &ServerCapabilities,
        factory: &dyn ConnectionFactory,
        base_session: &SessionParams,
        metadata: &mut MetadataCollector,
        tables: &DatabaseTables,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.state != ConsistencyState::Uninitialized {
            return Err(DumpError::Consistency(format!(
                "consistency already in state {:?}",
                self.state
            )));
        }

        match self.kind {
            ConsistencyKind::None | ConsistencyKind::Auto => {}
            ConsistencyKind::Flush => {
                self.hold_lock(factory, base_session, FLUSH_SQL, cancel).await?;
            }
            ConsistencyKind::Lock => {
                let sql = build_lock_tables_sql(tables, |db, t| config.is_blocked(db, t));
                if sql.is_empty() {
                    warn!("No tables to lock, continuing without table locks");
                } else {
                    self.hold_lock(factory, base_session, &sql, cancel).await?;
                }
            }
            ConsistencyKind::Snapshot => {
                if !caps.supports_explicit_snapshot {
                    return Err(DumpError::Consistency(
                        "snapshot consistency is not supported by this server".to_string(),
                    ));
                }
                let position = match &config.snapshot {
                    Some(position) => position.clone(),
                    None => cancellable(cancel, metadata.snapshot_position()).await?,
                };
                let tso =
                    cancellable(cancel, parse_snapshot_to_tso(metadata.conn_mut(), &position))
                        .await?;
                info!("Using snapshot {}", tso);
                self.snapshot = Some(tso);
            }
        }
        self.state = ConsistencyState::SnapshotEstablished;
        Ok(())
    }

    async fn hold_lock(
        &mut self,
        factory: &dyn ConnectionFactory,
        base_session: &SessionParams,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut conn = cancellable(cancel, factory.connect(base_session)).await?;
        cancellable(cancel, conn.exec(sql)).await?;
        debug!("Lock acquired: {}", sql);
        self.lock_conn = Some(conn);
        Ok(())
    }

    pub fn kind(&self) -> ConsistencyKind {
        self.kind
    }

    pub fn state(&self) -> ConsistencyState {
        self.state
    }

    /// TSO every session reads at, for snapshot consistency.
    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    /// True while a read lock is held on the server.
    pub fn holds_lock(&self) -> bool {
        self.lock_conn.is_some()
    }

    /// `base` plus the snapshot variable when one is in effect.
    pub fn session_params(&self, base: &SessionParams) -> SessionParams {
        let mut params = base.clone();
        if let Some(tso) = &self.snapshot {
            params.insert(SNAPSHOT_VARIABLE.to_string(), tso.clone());
        }
        params
    }

    /// Open a connection that reads the shared view.
    ///
    /// For lock kinds this starts the connection's consistent-snapshot
    /// transaction, so it must happen before [`release`](Self::release).
    pub async fn open_conn(
        &self,
        factory: &dyn ConnectionFactory,
        base_session: &SessionParams,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn SqlConn>> {
        if self.state != ConsistencyState::SnapshotEstablished {
            return Err(DumpError::Consistency(format!(
                "cannot open a connection in state {:?}",
                self.state
            )));
        }
        let session = self.session_params(base_session);
        let mut conn = cancellable(cancel, factory.connect(&session)).await?;
        if matches!(self.kind, ConsistencyKind::Flush | ConsistencyKind::Lock) {
            cancellable(cancel, conn.exec(ISOLATION_SQL)).await?;
            cancellable(cancel, conn.exec(START_TRANSACTION_SQL)).await?;
        }
        Ok(conn)
    }

    /// Release the read lock, if any. Further calls are no-ops.
    pub async fn release(&mut self) -> Result<()> {
        if self.state == ConsistencyState::Released {
            return Ok(());
        }
        if let Some(mut conn) = self.lock_conn.take() {
            conn.exec(UNLOCK_SQL)
                .await
                .map_err(|e| DumpError::Consistency(format!("cannot release lock: {}", e)))?;
            info!("Lock released");
        }
        self.state = ConsistencyState::Released;
        Ok(())
    }
}
