//! Table, column and key metadata used while planning chunks.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::identifier::{qualify, quote, quote_all};
use super::value::TypeFamily;
use crate::error::{DumpError, Result};

/// Name of the server-synthesized row identity column.
pub const IMPLICIT_ROW_ID: &str = "_tidb_rowid";

/// A database table, optionally narrowed to one partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdentity {
    pub database: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

impl TableIdentity {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            partition: None,
        }
    }

    /// Same table, narrowed to `partition`.
    pub fn with_partition(&self, partition: impl Into<String>) -> Self {
        Self {
            database: self.database.clone(),
            table: self.table.clone(),
            partition: Some(partition.into()),
        }
    }

    /// `` `db`.`table` `` with escaping applied.
    pub fn qualified(&self) -> String {
        qualify(&self.database, &self.table)
    }

    /// Unquoted `db.table` name used in logs and block lists.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.partition {
            Some(p) => write!(f, "{}.{}:{}", self.database, self.table, p),
            None => write!(f, "{}.{}", self.database, self.table),
        }
    }
}

/// Kind of relation listed in a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableType {
    Base,
    View,
}

impl TableType {
    /// Value of `INFORMATION_SCHEMA.TABLES.TABLE_TYPE` for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            TableType::Base => "BASE TABLE",
            TableType::View => "VIEW",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "BASE TABLE" => Ok(TableType::Base),
            "VIEW" => Ok(TableType::View),
            other => Err(DumpError::UnexpectedResult(format!(
                "unknown table type '{}'",
                other
            ))),
        }
    }
}

/// One entry of a database's table listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub avg_row_length: u64,
    pub table_type: TableType,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, avg_row_length: u64, table_type: TableType) -> Self {
        Self {
            name: name.into(),
            avg_row_length,
            table_type,
        }
    }
}

/// Tables grouped by database, in database name order.
pub type DatabaseTables = BTreeMap<String, Vec<TableInfo>>;

/// Column definition as reported by `INFORMATION_SCHEMA.COLUMNS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Upper-cased `DATA_TYPE`, e.g. `BIGINT`.
    pub data_type: String,
    pub nullable: bool,
}

/// One row of `SHOW INDEX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub non_unique: bool,
    pub key_name: String,
    pub column_name: String,
}

impl IndexEntry {
    pub fn is_primary(&self) -> bool {
        self.key_name == "PRIMARY"
    }

    /// Primary key columns of `entries`, in the order given.
    pub fn primary_columns(entries: &[IndexEntry]) -> Vec<String> {
        entries
            .iter()
            .filter(|e| e.is_primary())
            .map(|e| e.column_name.clone())
            .collect()
    }
}

/// Everything the planner needs to know about one table.
#[derive(Debug, Clone)]
pub struct TableMeta {
    pub identity: TableIdentity,
    pub table_type: TableType,
    pub columns: Vec<Column>,
    /// Projection used in chunk queries: `*`, an explicit column list or empty.
    pub selected_field: String,
    pub selected_len: usize,
    pub has_implicit_row_id: bool,
    pub avg_row_length: u64,
    pub partitions: Vec<String>,
}

impl TableMeta {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Declared type of `name`, or an empty string if the column is unknown.
    pub fn column_type(&self, name: &str) -> &str {
        self.column(name).map(|c| c.data_type.as_str()).unwrap_or("")
    }

    pub fn is_nullable(&self, name: &str) -> bool {
        self.column(name).map(|c| c.nullable).unwrap_or(false)
    }
}

/// Ordered column set that imposes the total order used for chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingKey {
    pub columns: Vec<String>,
    /// Declared type per column, parallel to `columns`.
    pub types: Vec<String>,
}

impl OrderingKey {
    pub fn new(columns: Vec<String>, types: Vec<String>) -> Self {
        Self { columns, types }
    }

    /// The implicit row identity column on its own.
    pub fn implicit_row_id() -> Self {
        Self {
            columns: vec![IMPLICIT_ROW_ID.to_string()],
            types: vec!["BIGINT".to_string()],
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn quoted_columns(&self) -> Vec<String> {
        quote_all(&self.columns)
    }

    pub fn families(&self) -> Vec<TypeFamily> {
        self.types.iter().map(|t| TypeFamily::of(t)).collect()
    }

    /// `` `a`,`b` `` as used in projections and ORDER BY.
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// One candidate split point: a rendered literal per ordering-key column.
pub type BoundaryTuple = Vec<String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_identity_display() {
        let id = TableIdentity::new("test", "t1");
        assert_eq!(id.to_string(), "test.t1");
        assert_eq!(id.with_partition("p0").to_string(), "test.t1:p0");
        assert_eq!(id.qualified(), "`test`.`t1`");
    }

    #[test]
    fn test_table_type_parse() {
        assert_eq!(TableType::parse("BASE TABLE").unwrap(), TableType::Base);
        assert_eq!(TableType::parse("VIEW").unwrap(), TableType::View);
        assert!(TableType::parse("SEQUENCE").is_err());
    }

    #[test]
    fn test_ordering_key_column_list() {
        let key = OrderingKey::new(
            vec!["a".into(), "b`c".into()],
            vec!["INT".into(), "VARCHAR".into()],
        );
        assert_eq!(key.column_list(), "`a`,`b``c`");
        assert_eq!(key.families(), vec![TypeFamily::Number, TypeFamily::String]);
        assert_eq!(OrderingKey::implicit_row_id().column_list(), "`_tidb_rowid`");
    }
}
