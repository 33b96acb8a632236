//! Processor and task runner configuration.
//!
//! Every field has a default, so a config file only needs the keys it
//! overrides:
//!
//! ```json
//! { "runner": { "max_attempts": 5 } }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of attempts per side-effect task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry; later retries back off linearly.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

/// Default number of lock entries kept before idle ones are pruned.
pub const DEFAULT_LOCK_PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl RunnerConfig {
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(attempt as u64))
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Lock map size that triggers pruning of idle group locks.
    pub lock_prune_threshold: usize,
    pub runner: RunnerConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            lock_prune_threshold: DEFAULT_LOCK_PRUNE_THRESHOLD,
            runner: RunnerConfig::default(),
        }
    }
}

impl ProcessorConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
