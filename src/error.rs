//! Error taxonomy for translation-group maintenance.
//!
//! Configuration errors are rejected synchronously. Missing tracking columns
//! are never an error (callers get a skip or an empty result instead).
//! Storage errors carry their SQLite code so the task layer can tell a
//! transient failure (busy, locked, I/O) from a permanent one.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid locale format: '{0}'. Use ISO format (e.g. 'en', 'fr', 'en-US')")]
    InvalidLocale(String),

    #[error("Language '{0}' is not configured")]
    UnconfiguredLanguage(String),

    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: &'static str },

    #[error("Unknown model: '{0}'")]
    UnknownModel(String),

    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("Table '{table}' is not supported: {reason}")]
    UnsupportedTable { table: String, reason: String },

    #[error("Unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("No model set. Bind one with for_model() first")]
    NoModelSet,

    #[error("Record {id} not found in '{table}'")]
    RecordNotFound { table: String, id: i64 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unique value for {columns:?} on '{table}' could not be resolved: {reason}")]
    UniqueConflict {
        table: String,
        columns: Vec<String>,
        reason: String,
    },

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A failure the task queue should retry (e.g. a transient per-language
    /// insert failure surfaced from an otherwise completed replication).
    #[error("Retryable failure: {0}")]
    Retryable(String),

    #[error("Task queue error: {0}")]
    Queue(String),
}

impl Error {
    /// Whether retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Storage(err) => is_transient_sqlite(err),
            Error::Retryable(_) => true,
            _ => false,
        }
    }

    /// Whether this is a UNIQUE constraint violation reported by storage.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Error::Storage(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    }

    /// Columns named by a UNIQUE violation.
    ///
    /// SQLite reports `UNIQUE constraint failed: products.slug, products.code`;
    /// violations of expression indexes name the index instead and yield an
    /// empty list.
    pub fn violated_columns(&self) -> Vec<String> {
        let Error::Storage(rusqlite::Error::SqliteFailure(_, Some(message))) = self else {
            return Vec::new();
        };
        if !self.is_unique_violation() {
            return Vec::new();
        }

        message
            .split_once("constraint failed:")
            .map(|(_, columns)| {
                columns
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.starts_with("index "))
                    .map(|part| part.rsplit('.').next().unwrap_or(part).to_string())
                    .filter(|column| !column.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn is_transient_sqlite(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => matches!(
            failure.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::SchemaChanged
                | ErrorCode::OperationInterrupted
        ),
        _ => false,
    }
}
