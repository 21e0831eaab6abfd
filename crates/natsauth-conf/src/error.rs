//! Error types for configuration rendering.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while rendering or writing broker configuration.
#[derive(Debug, Error)]
pub enum ConfError {
    /// An account id is not a valid account public key.
    #[error("invalid account id {id:?}: {reason}")]
    InvalidAccountId { id: String, reason: String },

    /// Filesystem error in the resolver directory.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for rendering operations.
pub type Result<T> = std::result::Result<T, ConfError>;
