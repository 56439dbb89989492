//! Error types for the export library.

use thiserror::Error;

/// MySQL server error code for an unknown column reference.
const ER_BAD_FIELD_ERROR: u16 = 1054;

/// MySQL server error code for an unknown system variable.
const ER_UNKNOWN_SYSTEM_VARIABLE: u16 = 1193;

/// Driver-level failure reported by a [`SqlConn`](crate::core::SqlConn).
///
/// `code` carries the server error number when the failure came from the server
/// itself; client-side failures (I/O, protocol) leave it empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    pub code: Option<u16>,
    pub message: String,
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "Error {}: {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DbError {}

impl DbError {
    pub fn server(code: u16, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Classify this failure.
    ///
    /// This is the only place that inspects server codes or message text.
    pub fn kind(&self) -> ServerErrorKind {
        match self.code {
            Some(ER_BAD_FIELD_ERROR) => ServerErrorKind::UnknownColumn,
            Some(ER_UNKNOWN_SYSTEM_VARIABLE) => ServerErrorKind::UnknownSystemVariable,
            Some(_) => ServerErrorKind::Other,
            None => {
                // Some proxies forward server errors as plain text.
                if self.message.contains("Unknown system variable") {
                    ServerErrorKind::UnknownSystemVariable
                } else if self.message.contains("Unknown column") {
                    ServerErrorKind::UnknownColumn
                } else {
                    ServerErrorKind::Other
                }
            }
        }
    }
}

/// Structured classification of server failures the export logic reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    UnknownColumn,
    UnknownSystemVariable,
    Other,
}

/// Main error type for export operations.
#[derive(Error, Debug)]
pub enum DumpError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not open or initialize a connection
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// A statement failed; carries the SQL text and arguments
    #[error("Query failed: {source}\n  SQL: {sql}{}", format_args_suffix(.args))]
    Query {
        sql: String,
        args: Vec<String>,
        #[source]
        source: DbError,
    },

    /// Metadata probe failed for a reason other than expected absence
    #[error("Schema probe failed for table {table}: {message}")]
    SchemaProbe { table: String, message: String },

    /// Sampling or region query failed; the table falls back to one chunk
    #[error("Boundary acquisition failed for table {table}: {message}")]
    BoundaryAcquisition { table: String, message: String },

    /// Planner or row-length estimation failed
    #[error("Estimation failed: {0}")]
    Estimation(String),

    /// Snapshot or lock establishment failed
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Boundary tuples were malformed or unsorted
    #[error("Partitioner invariant violated: {0}")]
    PartitionerInvariant(String),

    /// A result set did not have the expected shape
    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),

    /// The chunk task consumer went away
    #[error("Chunk task queue closed by consumer")]
    TaskQueueClosed,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Export was cancelled (SIGINT, etc.)
    #[error("Export cancelled")]
    Cancelled,
}

fn format_args_suffix(args: &[String]) -> String {
    if args.is_empty() {
        String::new()
    } else {
        format!("\n  Args: {:?}", args)
    }
}

impl DumpError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        DumpError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Query error annotated with the statement that failed
    pub fn query(sql: impl Into<String>, args: &[String], source: DbError) -> Self {
        DumpError::Query {
            sql: sql.into(),
            args: args.to_vec(),
            source,
        }
    }

    /// Create a SchemaProbe error
    pub fn schema_probe(table: impl Into<String>, message: impl ToString) -> Self {
        DumpError::SchemaProbe {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a BoundaryAcquisition error
    pub fn boundary(table: impl Into<String>, message: impl ToString) -> Self {
        DumpError::BoundaryAcquisition {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Server classification of the underlying failure, if this is a query error.
    pub fn server_error_kind(&self) -> Option<ServerErrorKind> {
        match self {
            DumpError::Query { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            DumpError::Config(_) | DumpError::Yaml(_) => 1,
            DumpError::Connection { .. } => 2,
            DumpError::Query { .. }
            | DumpError::SchemaProbe { .. }
            | DumpError::UnexpectedResult(_) => 3,
            DumpError::Consistency(_) => 4,
            DumpError::Cancelled => 5,
            DumpError::Io(_) => 7,
            _ => 6,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, DumpError>;
