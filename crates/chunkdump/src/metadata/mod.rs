//! Read-only metadata queries against the source server.
//!
//! [`MetadataCollector`] owns one session and answers every question the
//! planner asks about databases, tables, columns, keys and partitions. Failures
//! carry the statement text (see [`DumpError::Query`]); the implicit row
//! identity probe is the only query whose failure is interpreted.

mod histogram;

pub use histogram::{join_partition_ids, PartitionIds, PhysicalTableIds, TableIds};

use tracing::{debug, info, warn};

use crate::core::identifier::{qualify, quote};
use crate::core::schema::{
    Column, DatabaseTables, IndexEntry, TableIdentity, TableInfo, TableMeta, TableType,
};
use crate::core::traits::{ConnectionFactory, SessionParams, SqlConn};
use crate::error::{DumpError, Result, ServerErrorKind};
use crate::server::{ServerInfo, ServerType};

/// Schemas that never hold user data.
const SYSTEM_SCHEMAS: &[&str] = &[
    "mysql",
    "information_schema",
    "performance_schema",
    "sys",
    "metrics_schema",
    "inspection_schema",
];

/// Field of `SHOW MASTER STATUS` that carries the snapshot position.
const SNAPSHOT_FIELD_INDEX: usize = 1;

/// Metadata queries over one owned session.
pub struct MetadataCollector {
    conn: Box<dyn SqlConn>,
}

impl MetadataCollector {
    pub fn new(conn: Box<dyn SqlConn>) -> Self {
        Self { conn }
    }

    /// Open a dedicated metadata session.
    pub async fn connect(factory: &dyn ConnectionFactory, session: &SessionParams) -> Result<Self> {
        Ok(Self::new(factory.connect(session).await?))
    }

    pub fn conn_mut(&mut self) -> &mut dyn SqlConn {
        self.conn.as_mut()
    }

    pub async fn show_databases(&mut self) -> Result<Vec<String>> {
        Ok(self.conn.query("SHOW DATABASES").await?.first_column())
    }

    /// Databases that hold user data.
    pub async fn user_databases(&mut self) -> Result<Vec<String>> {
        Ok(self
            .show_databases()
            .await?
            .into_iter()
            .filter(|db| !is_system_schema(db))
            .collect())
    }

    pub async fn show_tables(&mut self) -> Result<Vec<String>> {
        Ok(self.conn.query("SHOW TABLES").await?.first_column())
    }

    /// Tables of `databases` restricted to `table_types`.
    ///
    /// With `asap` a single `INFORMATION_SCHEMA.TABLES` query is used; otherwise
    /// one `SHOW TABLE STATUS` per database, which is cheaper on MySQL-family
    /// servers with many tables.
    pub async fn list_all_databases_tables(
        &mut self,
        databases: &[String],
        asap: bool,
        table_types: &[TableType],
    ) -> Result<DatabaseTables> {
        let mut db_tables = DatabaseTables::new();
        for db in databases {
            db_tables.insert(db.clone(), Vec::new());
        }
        if table_types.is_empty() {
            return Ok(db_tables);
        }

        if asap {
            let conditions = table_types
                .iter()
                .map(|t| format!("TABLE_TYPE='{}'", t.as_str()))
                .collect::<Vec<_>>()
                .join(" OR ");
            let query = format!(
                "SELECT TABLE_SCHEMA,TABLE_NAME,TABLE_TYPE,AVG_ROW_LENGTH FROM INFORMATION_SCHEMA.TABLES WHERE {}",
                conditions
            );
            let rows = self.conn.query(&query).await?.specified_columns(&[
                "TABLE_SCHEMA",
                "TABLE_NAME",
                "TABLE_TYPE",
                "AVG_ROW_LENGTH",
            ])?;
            for row in rows {
                let (schema, table, table_type, avg) = (&row[0], &row[1], &row[2], &row[3]);
                let Some(tables) = db_tables.get_mut(schema) else {
                    continue;
                };
                let table_type = TableType::parse(table_type)?;
                tables.push(TableInfo::new(table.clone(), parse_avg_row_length(avg, &query)?, table_type));
            }
        } else {
            for db in databases {
                let query = format!("SHOW TABLE STATUS FROM {}", quote(db));
                let rows = self
                    .conn
                    .query(&query)
                    .await?
                    .specified_columns(&["NAME", "ENGINE", "AVG_ROW_LENGTH", "COMMENT"])?;
                let tables = db_tables.entry(db.clone()).or_default();
                for row in rows {
                    let (table, engine, avg, comment) = (&row[0], &row[1], &row[2], &row[3]);
                    let table_type = if !engine.is_empty() {
                        TableType::Base
                    } else if comment.is_empty() || comment == TableType::View.as_str() {
                        TableType::View
                    } else {
                        warn!("Invalid table without engine found: {}.{}", db, table);
                        continue;
                    };
                    if !table_types.contains(&table_type) {
                        continue;
                    }
                    tables.push(TableInfo::new(
                        table.clone(),
                        parse_avg_row_length(avg, &query)?,
                        table_type,
                    ));
                }
            }
        }

        let total: usize = db_tables.values().map(Vec::len).sum();
        info!("Listed {} tables in {} databases", total, db_tables.len());
        Ok(db_tables)
    }

    pub async fn server_version(&mut self) -> Result<String> {
        let rs = self.conn.query("SELECT version()").await?;
        rs.text(0, 0)
            .map(|v| v.into_owned())
            .ok_or_else(|| DumpError::UnexpectedResult("SELECT version() returned no rows".into()))
    }

    /// True when the TiDB cluster stores data in TiKV.
    pub async fn check_tidb_with_tikv(&mut self) -> Result<bool> {
        let rs = self
            .conn
            .query("SELECT COUNT(1) as c FROM MYSQL.TiDB WHERE VARIABLE_NAME='tikv_gc_safe_point'")
            .await?;
        let count: u64 = rs
            .text(0, 0)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        Ok(count > 0)
    }

    /// Classify the server; TiDB servers are additionally checked for TiKV.
    pub async fn detect_server(&mut self) -> Result<ServerInfo> {
        let version = self.server_version().await?;
        let info = ServerInfo::parse(&version);
        if info.server_type == ServerType::TiDB {
            let has_tikv = self.check_tidb_with_tikv().await?;
            debug!("TiDB has TiKV: {}", has_tikv);
            return Ok(info.with_tikv(has_tikv));
        }
        Ok(info)
    }

    /// Rows of `SHOW INDEX` in server order.
    pub async fn index_entries(&mut self, identity: &TableIdentity) -> Result<Vec<IndexEntry>> {
        let query = format!("SHOW INDEX FROM {}", identity.qualified());
        let rows = self
            .conn
            .query(&query)
            .await?
            .specified_columns(&["NON_UNIQUE", "KEY_NAME", "COLUMN_NAME"])?;
        Ok(rows
            .into_iter()
            .map(|row| IndexEntry {
                non_unique: row[0] != "0",
                key_name: row[1].clone(),
                column_name: row[2].clone(),
            })
            .collect())
    }

    /// Primary key columns in ordinal order; empty when there is none.
    pub async fn primary_key_columns(&mut self, identity: &TableIdentity) -> Result<Vec<String>> {
        let entries = self.index_entries(identity).await?;
        Ok(IndexEntry::primary_columns(&entries))
    }

    /// Column names, upper-cased data types and nullability in ordinal order.
    pub async fn columns(&mut self, identity: &TableIdentity) -> Result<Vec<Column>> {
        let query = "SELECT COLUMN_NAME,DATA_TYPE,IS_NULLABLE FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION";
        let rows = self
            .conn
            .query_with_args(query, &[identity.database.clone(), identity.table.clone()])
            .await?
            .specified_columns(&["COLUMN_NAME", "DATA_TYPE", "IS_NULLABLE"])?;
        Ok(rows
            .into_iter()
            .map(|row| Column {
                name: row[0].clone(),
                data_type: row[1].to_ascii_uppercase(),
                nullable: row[2].eq_ignore_ascii_case("YES"),
            })
            .collect())
    }

    /// Projection for chunk queries and the number of columns it yields.
    ///
    /// Generated columns cannot be re-inserted, so when any exist the writable
    /// columns are listed explicitly. The list is empty if every column is
    /// generated.
    pub async fn build_select_field(
        &mut self,
        identity: &TableIdentity,
        complete_insert: bool,
    ) -> Result<(String, usize)> {
        let query = format!("SHOW COLUMNS FROM {}", identity.qualified());
        let rows = self
            .conn
            .query(&query)
            .await?
            .specified_columns(&["FIELD", "EXTRA"])?;

        let mut has_generated = false;
        let mut fields = Vec::with_capacity(rows.len());
        for row in rows {
            match row[1].as_str() {
                "STORED GENERATED" | "VIRTUAL GENERATED" => has_generated = true,
                _ => fields.push(quote(&row[0])),
            }
        }
        let len = fields.len();
        if complete_insert || has_generated {
            Ok((fields.join(","), len))
        } else {
            Ok(("*".to_string(), len))
        }
    }

    /// Partition names in definition order; empty for unpartitioned tables.
    pub async fn partition_names(&mut self, identity: &TableIdentity) -> Result<Vec<String>> {
        let query = "SELECT PARTITION_NAME from INFORMATION_SCHEMA.PARTITIONS WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?";
        Ok(self
            .conn
            .query_with_args(query, &[identity.database.clone(), identity.table.clone()])
            .await?
            .first_column())
    }

    /// Whether the table exposes the implicit row identity column.
    ///
    /// An unknown-column error means it does not; any other failure is a
    /// [`DumpError::SchemaProbe`].
    pub async fn has_implicit_row_id(&mut self, identity: &TableIdentity) -> Result<bool> {
        let query = format!(
            "SELECT _tidb_rowid from {} LIMIT 0",
            qualify(&identity.database, &identity.table)
        );
        match self.conn.exec(&query).await {
            Ok(()) => Ok(true),
            Err(e) if e.server_error_kind() == Some(ServerErrorKind::UnknownColumn) => Ok(false),
            Err(e) => Err(DumpError::schema_probe(identity.full_name(), e)),
        }
    }

    /// Every field of the first `SHOW MASTER STATUS` row.
    pub async fn show_master_status(&mut self) -> Result<Vec<String>> {
        let rs = self.conn.query("SHOW MASTER STATUS").await?;
        if rs.is_empty() {
            return Err(DumpError::UnexpectedResult(
                "SHOW MASTER STATUS returned no rows".into(),
            ));
        }
        Ok((0..rs.columns.len())
            .map(|i| rs.text(0, i).map(|v| v.into_owned()).unwrap_or_default())
            .collect())
    }

    /// Current snapshot position of the server.
    pub async fn snapshot_position(&mut self) -> Result<String> {
        let status = self.show_master_status().await?;
        status.get(SNAPSHOT_FIELD_INDEX).cloned().ok_or_else(|| {
            DumpError::UnexpectedResult(format!(
                "SHOW MASTER STATUS returned {} fields, expected at least {}",
                status.len(),
                SNAPSHOT_FIELD_INDEX + 1
            ))
        })
    }

    /// Physical table ID, when the server reports one.
    pub async fn table_id(&mut self, identity: &TableIdentity) -> Result<Option<i64>> {
        let query = "SELECT TIDB_TABLE_ID FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?";
        let rs = self
            .conn
            .query_with_args(query, &[identity.database.clone(), identity.table.clone()])
            .await?;
        Ok(rs.text(0, 0).and_then(|v| v.trim().parse().ok()))
    }

    /// Partition physical IDs recovered from statistics histograms.
    ///
    /// See [`join_partition_ids`] for the matching rule.
    pub async fn partition_table_ids(
        &mut self,
        tables: &DatabaseTables,
    ) -> Result<PartitionIds> {
        let histograms = self
            .conn
            .query("SHOW STATS_HISTOGRAMS")
            .await?
            .specified_columns(&[
                "DB_NAME",
                "TABLE_NAME",
                "PARTITION_NAME",
                "UPDATE_TIME",
                "DISTINCT_COUNT",
            ])?;
        if !histogram::has_partition_rows(tables, &histograms) {
            return Ok(PartitionIds::new());
        }
        let stats = self
            .conn
            .query("SELECT TABLE_ID,FROM_UNIXTIME(VERSION DIV 262144 DIV 1000,'%Y-%m-%d %H:%i:%s') AS UPDATE_TIME,DISTINCT_COUNT FROM mysql.stats_histograms")
            .await?
            .specified_columns(&["TABLE_ID", "UPDATE_TIME", "DISTINCT_COUNT"])?;
        Ok(join_partition_ids(tables, &histograms, &stats))
    }

    /// Table and partition physical IDs of every listed table.
    pub async fn physical_table_ids(&mut self, tables: &DatabaseTables) -> Result<PhysicalTableIds> {
        let partitions = self.partition_table_ids(tables).await?;
        let rows = self
            .conn
            .query("SELECT TABLE_SCHEMA,TABLE_NAME,TIDB_TABLE_ID FROM INFORMATION_SCHEMA.TABLES ORDER BY TABLE_SCHEMA")
            .await?
            .specified_columns(&["TABLE_SCHEMA", "TABLE_NAME", "TIDB_TABLE_ID"])?;
        Ok(histogram::collect_physical_ids(tables, &rows, partitions))
    }

    /// Everything the planner needs about one table.
    ///
    /// The implicit row identity probe only runs when `probe_row_id` is set,
    /// since only TiDB synthesizes that column.
    pub async fn load_table_meta(
        &mut self,
        identity: &TableIdentity,
        info: &TableInfo,
        complete_insert: bool,
        probe_row_id: bool,
    ) -> Result<TableMeta> {
        let columns = self.columns(identity).await?;
        let (selected_field, selected_len) =
            self.build_select_field(identity, complete_insert).await?;
        let partitions = self.partition_names(identity).await?;
        let has_implicit_row_id = if probe_row_id {
            self.has_implicit_row_id(identity).await?
        } else {
            false
        };
        debug!(
            "{}: {} columns, {} partitions, implicit row id: {}",
            identity,
            columns.len(),
            partitions.len(),
            has_implicit_row_id
        );
        Ok(TableMeta {
            identity: identity.clone(),
            table_type: info.table_type,
            columns,
            selected_field,
            selected_len,
            has_implicit_row_id,
            avg_row_length: info.avg_row_length,
            partitions,
        })
    }
}

/// True for schemas that are never exported.
pub fn is_system_schema(name: &str) -> bool {
    SYSTEM_SCHEMAS.iter().any(|s| s.eq_ignore_ascii_case(name))
}

fn parse_avg_row_length(raw: &str, query: &str) -> Result<u64> {
    if raw.is_empty() {
        return Ok(0);
    }
    raw.trim().parse().map_err(|e| {
        DumpError::UnexpectedResult(format!(
            "invalid AVG_ROW_LENGTH '{}' from {}: {}",
            raw, query, e
        ))
    })
}
