//! Pipeline configuration loaded via OrthoConfig.
//!
//! Values come from `SQLVIEW_*` environment variables and configuration
//! files. `max_rows` carries its default in the loader; every other field is
//! optional and falls back to the defaults below.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::{DEFAULT_CACHE_EXPIRY_MINUTES, SqlViewExecutorConfig};

const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_BACKOFF_MILLIS: u64 = 500;

/// Configuration values for executing SQL views against one DHIS2 server.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "SQLVIEW")]
pub struct PipelineSettings {
    /// DHIS2 API base URL, e.g. `https://play.dhis2.org/api`.
    pub base_url: Option<String>,
    /// Row cap for one execution.
    #[ortho_config(default = 100_000)]
    pub max_rows: usize,
    /// Minutes a cached result stays fresh.
    pub cache_expiry_minutes: Option<u32>,
    /// Per-request timeout in seconds.
    pub request_timeout_seconds: Option<u64>,
    /// Initial retry backoff in milliseconds.
    pub retry_backoff_millis: Option<u64>,
    /// Username for HTTP Basic authentication.
    pub username: Option<String>,
    /// Password for HTTP Basic authentication.
    pub password: Option<String>,
    /// Personal access token; preferred over username and password.
    pub token: Option<String>,
}

impl PipelineSettings {
    /// Return the configured base URL, falling back to a local server.
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Return the configured cache lifetime in minutes.
    pub fn cache_expiry_minutes(&self) -> u32 {
        self.cache_expiry_minutes.unwrap_or(DEFAULT_CACHE_EXPIRY_MINUTES)
    }

    /// Return the configured request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_seconds
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS)
                .max(1),
        )
    }

    /// Build executor tuning from these settings.
    pub fn executor_config(&self) -> SqlViewExecutorConfig {
        SqlViewExecutorConfig {
            max_rows: self.max_rows,
            initial_backoff: Duration::from_millis(
                self.retry_backoff_millis.unwrap_or(DEFAULT_RETRY_BACKOFF_MILLIS),
            ),
            ..SqlViewExecutorConfig::default()
        }
    }
}
