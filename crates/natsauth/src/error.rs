//! Error types for reconciliation.

use std::time::Duration;

use natsauth_conf::ConfError;
use natsauth_core::CoreError;
use natsauth_store::StoreError;
use thiserror::Error;

use crate::config::EngineConfig;

/// Errors that can end a reconcile.
///
/// Every variant is recoverable: the engine records it in status and
/// schedules another attempt.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Key material is malformed or has the wrong role.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// A token could not be produced.
    #[error("signing failed: {0}")]
    Signing(String),

    /// A parent or referenced record is not available yet.
    #[error("dependency not ready: {0}")]
    DependencyNotReady(String),

    /// A concurrent writer got there first; re-read and retry.
    #[error("store conflict: {0}")]
    StoreConflict(String),

    /// The declared combination is not implemented.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// The declared state fails schema constraints.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Storage error other than a conflict.
    #[error("storage error: {0}")]
    Store(StoreError),

    /// Configuration rendering or resolver directory error.
    #[error("render error: {0}")]
    Render(#[from] ConfError),
}

/// When a failed reconcile should run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Right away, with a fresh read.
    Immediately,
    /// After the short dependency interval.
    Soon,
    /// After the fixed error interval.
    Later,
}

impl ReconcileError {
    /// Machine-readable reason recorded in status conditions.
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::InvalidSeed(_) => "InvalidSeed",
            ReconcileError::Signing(_) => "SigningError",
            ReconcileError::DependencyNotReady(_) => "DependencyNotReady",
            ReconcileError::StoreConflict(_) => "StoreConflict",
            ReconcileError::UnsupportedConfiguration(_) => "UnsupportedConfiguration",
            ReconcileError::Validation(_) => "ValidationError",
            ReconcileError::Store(_) => "StoreError",
            ReconcileError::Render(_) => "RenderError",
        }
    }

    pub fn retry(&self) -> Retry {
        match self {
            ReconcileError::StoreConflict(_) => Retry::Immediately,
            ReconcileError::DependencyNotReady(_) => Retry::Soon,
            _ => Retry::Later,
        }
    }

    /// Delay before the next attempt under `config`.
    pub fn requeue_after(&self, config: &EngineConfig) -> Duration {
        match self.retry() {
            Retry::Immediately => Duration::ZERO,
            Retry::Soon => config.not_ready_interval(),
            Retry::Later => config.error_interval(),
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { name, detail } => {
                ReconcileError::StoreConflict(format!("{name}: {detail}"))
            }
            other => ReconcileError::Store(other),
        }
    }
}

impl From<CoreError> for ReconcileError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSeed(msg) => ReconcileError::InvalidSeed(msg),
            CoreError::InvalidPublicKey(msg) => ReconcileError::InvalidSeed(msg),
            other => ReconcileError::Signing(other.to_string()),
        }
    }
}

/// Result type for reconcile operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_and_retry() {
        let conflict: ReconcileError = StoreError::conflict("r", "stale").into();
        assert_eq!(conflict.reason(), "StoreConflict");
        assert_eq!(conflict.retry(), Retry::Immediately);

        let other: ReconcileError = StoreError::NotFound("r".into()).into();
        assert_eq!(other.reason(), "StoreError");
        assert_eq!(other.retry(), Retry::Later);

        let seed: ReconcileError = CoreError::InvalidSeed("bad".into()).into();
        assert_eq!(seed.reason(), "InvalidSeed");

        let config = EngineConfig::default();
        assert_eq!(
            ReconcileError::DependencyNotReady("x".into()).requeue_after(&config),
            Duration::from_secs(10)
        );
        assert_eq!(
            ReconcileError::Validation("x".into()).requeue_after(&config),
            Duration::from_secs(60)
        );
    }
}
