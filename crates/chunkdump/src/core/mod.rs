//! Core abstractions shared by every planning stage.
//!
//! - [`schema`]: table identities, metadata and ordering keys
//! - [`value`]: column type families and literal rendering
//! - [`traits`]: the connection and connection-factory seams
//! - [`identifier`]: backtick quoting
//! - [`cancel`]: cancellation-aware network calls

pub mod cancel;
pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::cancellable;
pub use schema::{
    BoundaryTuple, Column, DatabaseTables, IndexEntry, OrderingKey, TableIdentity, TableInfo,
    TableMeta, TableType, IMPLICIT_ROW_ID,
};
pub use traits::{ConnectionFactory, ResultSet, SessionParams, SqlConn};
pub use value::TypeFamily;
