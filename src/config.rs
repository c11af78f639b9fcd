//! Client configuration.
//!
//! Settings come from compiled-in defaults, optionally overlaid by an
//! `[api_client]` table in a TOML file, and finally by the `SNYK_API`
//! environment variable.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SnykError};

/// Default Snyk API host.
pub const DEFAULT_BASE_URL: &str = "https://api.snyk.io";

/// REST API version sent with every request.
pub const DEFAULT_API_VERSION: &str = "2024-10-15";

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Settings consumed by [`SnykClient`](crate::SnykClient) and the pagination layer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the API host.
    pub base_url: String,
    /// Total attempts per request, the first one included.
    pub max_attempts: u32,
    /// Exponential backoff factor in seconds.
    pub backoff_factor: f64,
    /// Statuses that trigger a retry.
    pub retryable_statuses: Vec<u16>,
    /// Seconds to wait after a 429 that carries no usable `Retry-After`.
    pub default_rate_limit_wait: f64,
    /// Items requested per page when the caller sets no `limit`.
    pub page_size: u32,
    /// Per-attempt deadline in seconds.
    pub request_timeout: f64,
    /// Concurrent transport calls; `None` sizes the pool from the CPU count.
    pub max_workers: Option<usize>,
    /// Value of the `version` query parameter.
    pub api_version: String,
    /// Log level used by the binary's subscriber.
    pub logging_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_attempts: 15,
            backoff_factor: 0.5,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            default_rate_limit_wait: 5.0,
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: 30.0,
            max_workers: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            logging_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    api_client: ClientConfig,
}

impl ClientConfig {
    /// Parse a TOML document containing an `[api_client]` table.
    ///
    /// Keys missing from the table keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(source)?;
        file.api_client.validate()?;
        Ok(file.api_client)
    }

    /// Read and parse a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// holds out-of-range values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Apply `SNYK_API` on top of the current settings.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("SNYK_API") {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
        self
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SnykError::Config("max_attempts must be at least 1".into()));
        }
        if self.page_size == 0 {
            return Err(SnykError::Config("page_size must be at least 1".into()));
        }
        for (name, value) in [
            ("backoff_factor", self.backoff_factor),
            ("default_rate_limit_wait", self.default_rate_limit_wait),
        ] {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(SnykError::Config(format!(
                    "{name} must be a non-negative number of seconds, got {value}"
                )));
            }
        }
        if self.request_timeout <= 0.0 || Duration::try_from_secs_f64(self.request_timeout).is_err()
        {
            return Err(SnykError::Config("request_timeout must be positive".into()));
        }
        if self.max_workers == Some(0) {
            return Err(SnykError::Config("max_workers must be at least 1".into()));
        }
        if !LOG_LEVELS.contains(&self.logging_level.to_ascii_lowercase().as_str()) {
            return Err(SnykError::Config(format!(
                "unknown logging_level '{}'",
                self.logging_level
            )));
        }
        Ok(())
    }

    /// Worker pool size.
    pub fn worker_count(&self) -> usize {
        self.max_workers.unwrap_or_else(|| {
            let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
            (cpus + 4).min(32)
        })
    }

    /// Per-attempt deadline.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout).unwrap_or(Duration::MAX)
    }
}
