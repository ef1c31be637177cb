//! Rules applied to a loaded [`AppConfig`] before anything is built from it.

use crate::config::AppConfig;
use thiserror::Error;

const MIN_TIMEOUT_MS: u64 = 100;
const MAX_TIMEOUT_MS: u64 = 5 * 60 * 1000;
const MAX_QUEUE_RETENTION_HOURS: u64 = 24 * 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid { field: field.to_string(), reason: reason.into() }
    }

    /// Name of the offending field, when there is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::LoadFailed(_) => None,
            ConfigError::Invalid { field, .. } | ConfigError::Missing { field, .. } => Some(field),
        }
    }
}

impl AppConfig {
    /// Check loaded values.
    ///
    /// `base_url` must be present and http(s). Cache capacity must be
    /// non-zero, queue retention within 1h..=1 year, the timeout within
    /// 100ms..=5min, and a default stale window shorter than the default max age.
    ///
    /// A zero retry ceiling is allowed but logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::Missing {
                field: "base_url".into(),
                hint: "set FREIGHTDESK_BASE_URL or base_url in the config file".into(),
            });
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::invalid("base_url", "must be an http:// or https:// URL"));
        }

        if self.cache_capacity == 0 {
            return Err(ConfigError::invalid("cache_capacity", "must be greater than 0"));
        }

        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ConfigError::invalid(
                "timeout_ms",
                format!("must be between {}ms and {}ms", MIN_TIMEOUT_MS, MAX_TIMEOUT_MS),
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::invalid("user_agent", "must not be empty"));
        }

        if !(1..=MAX_QUEUE_RETENTION_HOURS).contains(&self.queue_retention_hours) {
            return Err(ConfigError::invalid(
                "queue_retention_hours",
                format!("must be between 1 and {} hours", MAX_QUEUE_RETENTION_HOURS),
            ));
        }

        if let Some(stale_ms) = self.default_stale_ms
            && stale_ms >= self.default_max_age_ms
        {
            return Err(ConfigError::invalid("default_stale_ms", "must be shorter than default_max_age_ms"));
        }

        if self.max_retries == 0 {
            tracing::warn!("max_retries is 0; queued writes are abandoned without being replayed");
        }

        Ok(())
    }
}
