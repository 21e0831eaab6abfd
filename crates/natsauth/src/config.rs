//! Engine configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! drift_interval_secs = 300
//! error_interval_secs = 60
//! not_ready_interval_secs = 10
//! conflict_retries = 5
//! password_bytes = 24
//! mirror_resolver_dir = false
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use natsauth_core::secret::DEFAULT_PASSWORD_BYTES;

use crate::error::{ReconcileError, Result};

/// Configuration for the [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Requeue delay after a successful reconcile (drift correction).
    pub drift_interval_secs: u64,
    /// Requeue delay after a failed reconcile.
    pub error_interval_secs: u64,
    /// Requeue delay while a parent is not ready.
    pub not_ready_interval_secs: u64,
    /// Attempts at the aggregate read-modify-write before giving up.
    pub conflict_retries: u32,
    /// Random bytes behind each generated flat-user password.
    pub password_bytes: usize,
    /// Also write tokens into the resolver directory when an operator
    /// uses the directory form.
    pub mirror_resolver_dir: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drift_interval_secs: 300,
            error_interval_secs: 60,
            not_ready_interval_secs: 10,
            conflict_retries: 5,
            password_bytes: DEFAULT_PASSWORD_BYTES,
            mirror_resolver_dir: false,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = toml::from_str(text).context("parsing engine config")?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.conflict_retries == 0 {
            return Err(ReconcileError::Validation(
                "conflict_retries must be at least 1".into(),
            ));
        }
        if self.password_bytes < 16 {
            return Err(ReconcileError::Validation(format!(
                "password_bytes must be at least 16, got {}",
                self.password_bytes
            )));
        }
        if self.error_interval_secs == 0
            || self.drift_interval_secs == 0
            || self.not_ready_interval_secs == 0
        {
            return Err(ReconcileError::Validation(
                "requeue intervals must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn drift_interval(&self) -> Duration {
        Duration::from_secs(self.drift_interval_secs)
    }

    pub fn error_interval(&self) -> Duration {
        Duration::from_secs(self.error_interval_secs)
    }

    pub fn not_ready_interval(&self) -> Duration {
        Duration::from_secs(self.not_ready_interval_secs)
    }
}
