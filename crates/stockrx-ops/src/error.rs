// crates/stockrx-ops/src/error.rs
// Standardized error types for StockRx maintenance tooling

use thiserror::Error;

/// Main error type for the StockRx maintenance library
#[derive(Error, Debug)]
pub enum StockrxError {
    /// An option value failed validation. Surfaced to the operator verbatim.
    #[error("invalid option {option}: {expected}")]
    InvalidOption { option: String, expected: String },

    #[error("missing required option {0}")]
    MissingOption(String),

    #[error("malformed option '{0}': expected KEY=VALUE")]
    MalformedOption(String),

    #[error("unknown patch '{name}'. Registered patches: {}", format_available(.available))]
    UnknownPatch {
        name: String,
        available: Vec<String>,
    },

    #[error("patch '{0}' is already registered")]
    DuplicatePatch(String),

    #[error("invalid patch metadata for '{name}': {reason}")]
    InvalidMetadata { name: String, reason: String },

    #[error("no progress: batch at offset {offset} processed 0 records with targets remaining")]
    Stalled { offset: usize },

    #[error("timeout: run exceeded {limit_secs}s budget after {elapsed_secs}s")]
    Timeout { limit_secs: u64, elapsed_secs: u64 },

    #[error("run cancelled")]
    Cancelled,

    #[error("patch '{name}' is already running (lock held by {holder} since {acquired_at})")]
    LockHeld {
        name: String,
        holder: String,
        acquired_at: String,
    },

    #[error("{kind} #{id} not found")]
    EntityNotFound { kind: String, id: i64 },

    #[error("counter column {table}.{column} does not exist")]
    MissingCounterColumn { table: String, column: String },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using StockrxError
pub type Result<T> = std::result::Result<T, StockrxError>;

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        "(none)".to_string()
    } else {
        available.join(", ")
    }
}

impl StockrxError {
    /// Shorthand for building an `InvalidOption` error.
    pub fn invalid_option(option: impl Into<String>, expected: impl Into<String>) -> Self {
        StockrxError::InvalidOption {
            option: option.into(),
            expected: expected.into(),
        }
    }

    /// True for errors raised while validating options, before any data access.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StockrxError::InvalidOption { .. }
                | StockrxError::MissingOption(_)
                | StockrxError::MalformedOption(_)
        )
    }

    /// True for errors that abort a patch run after it started.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            StockrxError::Stalled { .. }
                | StockrxError::Timeout { .. }
                | StockrxError::Cancelled
                | StockrxError::UnknownPatch { .. }
                | StockrxError::LockHeld { .. }
        )
    }
}

impl From<String> for StockrxError {
    fn from(s: String) -> Self {
        StockrxError::Other(s)
    }
}

impl From<tokio::task::JoinError> for StockrxError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            StockrxError::Cancelled
        } else {
            StockrxError::Other(err.to_string())
        }
    }
}
