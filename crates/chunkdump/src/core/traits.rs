//! Connection abstractions consumed by the export core.
//!
//! - [`SqlConn`]: run a query and collect its rows, or execute a statement
//! - [`ConnectionFactory`]: open a new session with a set of session variables
//!
//! The MySQL driver in `drivers::mysql` implements both. Tests substitute a
//! scripted connection so planning logic runs without a server.

use std::borrow::Cow;
use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{DumpError, Result};

/// Session variables applied to every connection a factory opens.
pub type SessionParams = BTreeMap<String, String>;

/// Fully materialized result of one query.
///
/// Cells are the raw bytes returned by the server; `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<Vec<u8>>>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<Vec<u8>>>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the column named `name`, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Raw cell at (`row`, `col`); `None` for NULL or out of range.
    pub fn cell(&self, row: usize, col: usize) -> Option<&[u8]> {
        self.rows.get(row)?.get(col)?.as_deref()
    }

    /// Cell decoded as text; `None` for NULL.
    pub fn text(&self, row: usize, col: usize) -> Option<Cow<'_, str>> {
        self.cell(row, col).map(String::from_utf8_lossy)
    }

    /// Values of the named columns for every row, NULL rendered as an empty string.
    ///
    /// Fails when any requested column is missing from the result.
    pub fn specified_columns(&self, names: &[&str]) -> Result<Vec<Vec<String>>> {
        let indexes = names
            .iter()
            .map(|name| {
                self.column_index(name).ok_or_else(|| {
                    DumpError::UnexpectedResult(format!(
                        "column {} not found in result columns {:?}",
                        name, self.columns
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((0..self.rows.len())
            .map(|row| {
                indexes
                    .iter()
                    .map(|&col| {
                        self.text(row, col)
                            .map(Cow::into_owned)
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect())
    }

    /// Non-NULL values of the first column.
    pub fn first_column(&self) -> Vec<String> {
        (0..self.rows.len())
            .filter_map(|row| self.text(row, 0).map(Cow::into_owned))
            .collect()
    }
}

/// A live SQL session.
///
/// Implementations annotate every failure with the statement text and
/// arguments (see [`DumpError::Query`]).
#[async_trait]
pub trait SqlConn: Send {
    /// Run a statement and collect its result set.
    async fn query(&mut self, sql: &str) -> Result<ResultSet>;

    /// Run a parameterized statement (`?` placeholders) and collect its result set.
    async fn query_with_args(&mut self, sql: &str, args: &[String]) -> Result<ResultSet>;

    /// Execute a statement, discarding any result.
    async fn exec(&mut self, sql: &str) -> Result<()>;
}

/// Opens new sessions against the source server.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a session and apply `session` variables to it.
    ///
    /// Variables the server does not recognize are skipped.
    async fn connect(&self, session: &SessionParams) -> Result<Box<dyn SqlConn>>;
}
