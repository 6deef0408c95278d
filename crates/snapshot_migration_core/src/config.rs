use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::contract::{DEFAULT_KEY_ALIAS, DEFAULT_TARGET_SUFFIX};
use crate::naming::is_valid_suffix;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_STUCK_WARNING_AFTER_MS: u64 = 6 * 60 * 60 * 1_000;
pub const DEFAULT_WORKER_THREADS: usize = 8;
pub const DEFAULT_TRANSIENT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    #[serde(default = "default_key_alias")]
    pub key_alias: String,
    #[serde(default = "default_target_suffix")]
    pub target_suffix: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Unbounded when absent; copy duration is outside our control.
    #[serde(default)]
    pub max_wait_ms: Option<u64>,
    #[serde(default = "default_stuck_warning_after_ms")]
    pub stuck_warning_after_ms: u64,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_transient_retry_attempts")]
    pub transient_retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_true")]
    pub retain_completed: bool,
    #[serde(default = "default_true")]
    pub copy_tags: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            key_alias: default_key_alias(),
            target_suffix: default_target_suffix(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_ms: None,
            stuck_warning_after_ms: default_stuck_warning_after_ms(),
            worker_threads: default_worker_threads(),
            transient_retry_attempts: default_transient_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retain_completed: true,
            copy_tags: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

impl MigrationConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ValidationError> {
        let contents = fs::read_to_string(path).map_err(|error| {
            ValidationError::new(format!(
                "failed to read config file '{}': {error}",
                path.display()
            ))
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|error| {
            ValidationError::new(format!(
                "invalid config file '{}': {error}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key_alias.trim().is_empty() {
            return Err(ValidationError::new("key_alias cannot be empty"));
        }
        if !is_valid_suffix(&self.target_suffix) {
            return Err(ValidationError::new(format!(
                "target_suffix '{}' must be non-empty and use only letters, digits and single hyphens",
                self.target_suffix
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::new(
                "poll_interval_ms must be a positive integer",
            ));
        }
        if let Some(0) = self.max_wait_ms {
            return Err(ValidationError::new(
                "max_wait_ms must be a positive integer when set",
            ));
        }
        if self.worker_threads == 0 {
            return Err(ValidationError::new(
                "worker_threads must be a positive integer",
            ));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ValidationError::new(
                "retry_max_delay_ms must not be below retry_base_delay_ms",
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }

    pub fn stuck_warning_after(&self) -> Duration {
        Duration::from_millis(self.stuck_warning_after_ms)
    }
}

pub fn default_key_alias() -> String {
    DEFAULT_KEY_ALIAS.to_string()
}

pub fn default_target_suffix() -> String {
    DEFAULT_TARGET_SUFFIX.to_string()
}

pub fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

pub fn default_stuck_warning_after_ms() -> u64 {
    DEFAULT_STUCK_WARNING_AFTER_MS
}

pub fn default_worker_threads() -> usize {
    DEFAULT_WORKER_THREADS
}

pub fn default_transient_retry_attempts() -> u32 {
    DEFAULT_TRANSIENT_RETRY_ATTEMPTS
}

pub fn default_retry_base_delay_ms() -> u64 {
    DEFAULT_RETRY_BASE_DELAY_MS
}

pub fn default_retry_max_delay_ms() -> u64 {
    DEFAULT_RETRY_MAX_DELAY_MS
}

fn default_true() -> bool {
    true
}
