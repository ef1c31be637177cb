//! Client configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (FREIGHTDESK_*)
//! 2. TOML config file (if FREIGHTDESK_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Client configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FREIGHTDESK_*)
/// 2. TOML config file (if FREIGHTDESK_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL every relative request path is joined onto.
    ///
    /// Set via FREIGHTDESK_BASE_URL environment variable.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-call transport timeout in milliseconds.
    ///
    /// Set via FREIGHTDESK_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum number of entries held by the response cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Default freshness budget for cached reads, in milliseconds.
    #[serde(default = "default_max_age_ms")]
    pub default_max_age_ms: u64,

    /// Default stale-while-revalidate window, in milliseconds.
    ///
    /// Unset means reads hard-expire at `default_max_age_ms`.
    #[serde(default)]
    pub default_stale_ms: Option<u64>,

    /// Replay attempts before a queued write is abandoned.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Queued writes older than this are dropped on load without replay.
    #[serde(default = "default_queue_retention_hours")]
    pub queue_retention_hours: u64,

    /// Path to the SQLite database backing the offline queue.
    ///
    /// Set via FREIGHTDESK_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_base_url() -> String {
    "http://localhost:3000/api".into()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    "freightdesk/0.1".into()
}

fn default_cache_capacity() -> usize {
    100
}

fn default_max_age_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_max_retries() -> u32 {
    3
}

fn default_queue_retention_hours() -> u64 {
    24
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./freightdesk-queue.sqlite")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            cache_capacity: default_cache_capacity(),
            default_max_age_ms: default_max_age_ms(),
            default_stale_ms: None,
            max_retries: default_max_retries(),
            queue_retention_hours: default_queue_retention_hours(),
            db_path: default_db_path(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Default max age for cached reads.
    pub fn default_max_age(&self) -> Duration {
        Duration::from_millis(self.default_max_age_ms)
    }

    /// Default stale window for cached reads, if any.
    pub fn default_stale_window(&self) -> Option<Duration> {
        self.default_stale_ms.map(Duration::from_millis)
    }

    /// Retention window for queued writes. Saturates rather than overflowing.
    pub fn queue_retention(&self) -> Duration {
        Duration::from_secs(self.queue_retention_hours.saturating_mul(60 * 60))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `FREIGHTDESK_`
    /// 2. TOML file from `FREIGHTDESK_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FREIGHTDESK_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FREIGHTDESK_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.base_url, "http://localhost:3000/api");
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.user_agent, "freightdesk/0.1");
        assert_eq!(config.cache_capacity, 100);
        assert_eq!(config.default_max_age_ms, 300_000);
        assert!(config.default_stale_ms.is_none());
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.queue_retention_hours, 24);
        assert_eq!(config.db_path, PathBuf::from("./freightdesk-queue.sqlite"));
    }

    #[test]
    fn test_durations() {
        let config = AppConfig { default_stale_ms: Some(30_000), ..Default::default() };
        assert_eq!(config.timeout(), Duration::from_millis(10_000));
        assert_eq!(config.default_max_age(), Duration::from_secs(300));
        assert_eq!(config.default_stale_window(), Some(Duration::from_secs(30)));
        assert_eq!(config.queue_retention(), Duration::from_secs(86_400));

        let huge = AppConfig { queue_retention_hours: u64::MAX / 60, ..Default::default() };
        assert_eq!(huge.queue_retention(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_load_from_toml_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("freightdesk.toml", "cache_capacity = 250\nmax_retries = 5\n")?;
            jail.set_env("FREIGHTDESK_CONFIG_FILE", "freightdesk.toml");
            jail.set_env("FREIGHTDESK_MAX_RETRIES", "7");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.cache_capacity, 250);
            assert_eq!(config.max_retries, 7);
            assert_eq!(config.timeout_ms, 10_000);
            Ok(())
        });
    }
}
