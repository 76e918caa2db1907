use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the external store address
pub const REDIS_URL_ENV: &str = "REDIS_URL";

/// Main cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub external: ExternalConfig,
    pub local: LocalConfig,
    pub logging: LoggingConfig,
}

/// External shared store (Redis) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    /// Connection URL; `None` leaves the external store disabled
    pub url: Option<String>,
    pub connect_timeout_ms: u64,
    pub command_timeout_ms: u64,
    /// COUNT hint for SCAN during pattern deletes
    pub scan_count: usize,
}

/// Process-local store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout_ms: 2000,
            command_timeout_ms: 500,
            scan_count: 100,
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl ExternalConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Configured URL, ignoring blank values
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

impl CacheConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: CacheConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults plus `REDIS_URL` from the environment
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `REDIS_URL` on top of this configuration when it is set
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(REDIS_URL_ENV) {
            self.external.url = Some(url);
        }
        self
    }

    /// Set the external store URL
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.external.url = Some(url.into());
        self
    }
}
