//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record or object serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record or object not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency check failed; re-read and retry.
    #[error("conflict on {name}: {detail}")]
    Conflict { name: String, detail: String },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn conflict(name: impl Into<String>, detail: impl Into<String>) -> Self {
        StoreError::Conflict {
            name: name.into(),
            detail: detail.into(),
        }
    }

    /// Whether the caller should re-read and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
