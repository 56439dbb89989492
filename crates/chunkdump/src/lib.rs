//! # chunkdump
//!
//! Consistent, chunked logical export planning for MySQL-protocol databases.
//!
//! This library turns a set of tables into independent chunk queries that can
//! be executed in parallel while reading one consistent view:
//!
//! - **Server detection** of MySQL, MariaDB and TiDB, resolved once into
//!   capability flags
//! - **Boundary sources** from table sampling, storage regions or integer
//!   `MIN`/`MAX` ranges, whichever the server supports
//! - **Range partitioning** of boundary tuples into disjoint, gapless predicates
//! - **Consistency** through snapshots, a global read lock or table locks
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chunkdump::{Config, MysqlConnectionFactory, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> chunkdump::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let factory = Arc::new(MysqlConnectionFactory::new(&config.source));
//!     let orchestrator = Orchestrator::new(config, factory);
//!     let plan = orchestrator.plan(CancellationToken::new()).await?;
//!     for task in &plan.tasks {
//!         println!("{}", task.query);
//!     }
//!     Ok(())
//! }
//! ```

pub mod boundary;
pub mod config;
pub mod consistency;
pub mod core;
pub mod drivers;
pub mod error;
pub mod estimate;
pub mod keys;
pub mod metadata;
pub mod orchestrator;
pub mod partition;
pub mod planner;
pub mod query;
pub mod server;

// Re-exports for convenient access
pub use boundary::{BoundaryMode, LegacyRegionMap};
pub use config::{Config, ConsistencyKind, ExportConfig, SourceConfig};
pub use consistency::{ConsistencyController, ConsistencyState};
pub use crate::core::{
    ConnectionFactory, OrderingKey, ResultSet, SessionParams, SqlConn, TableIdentity, TableInfo,
    TableMeta, TableType,
};
pub use drivers::{MysqlConn, MysqlConnectionFactory};
pub use error::{DbError, DumpError, Result};
pub use metadata::MetadataCollector;
pub use orchestrator::{ExportSession, HealthCheckResult, Orchestrator, PlanResult};
pub use partition::build_where_clauses;
pub use planner::{ChunkPlanner, ChunkTask, PlannerSettings};
pub use server::{ServerCapabilities, ServerInfo, ServerType};
