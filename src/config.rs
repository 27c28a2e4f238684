//! Configuration system for xcollect.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/xcollect/config.toml` (or `--config`)
//! 3. **Environment variables** - `XCOLLECT_*` prefix, plus `RAPID_API_KEY`
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [provider]
//! base_url = "https://twitter283.p.rapidapi.com"
//! requests_per_second = 3
//!
//! [fetch]
//! max_attempts = 3
//!
//! [backfill]
//! batch_size = 20
//! max_in_flight = 10
//!
//! [paths]
//! output_dir = "~/twitter_post_analysis"
//! ```

use crate::error::{CollectError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Largest number of ids one lookup request may carry.
pub const MAX_BATCH_SIZE: usize = 20;

/// Largest number of lookup batches in flight at once.
pub const MAX_IN_FLIGHT: usize = 10;

/// Main configuration structure for xcollect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider endpoint and credentials.
    pub provider: ProviderConfig,
    /// Pagination behavior.
    pub fetch: FetchConfig,
    /// Reference backfill behavior.
    pub backfill: BackfillConfig,
    /// Output locations.
    pub paths: PathsConfig,
}

/// Provider connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the timeline API.
    /// Environment variable: `XCOLLECT_BASE_URL`
    pub base_url: String,

    /// Value of the `x-rapidapi-host` header.
    pub host: String,

    /// API key. Environment variable: `XCOLLECT_API_KEY` or `RAPID_API_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Request ceiling shared by every call.
    /// Environment variable: `XCOLLECT_RPS`
    pub requests_per_second: u32,

    /// Per-request timeout.
    pub timeout_secs: u64,

    /// Extra wait after an HTTP 429 before the next attempt.
    pub rate_limit_cooldown_ms: u64,
}

/// Pagination settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Attempts per page before a retryable failure becomes fatal.
    pub max_attempts: u32,

    /// Base delay between attempts, doubled each retry.
    pub backoff_ms: u64,

    /// Stop after this many pages (unbounded when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
}

/// Backfill settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    /// Ids per lookup request (capped at 20).
    pub batch_size: usize,

    /// Concurrent lookup requests (capped at 10).
    pub max_in_flight: usize,

    /// Attempts per batch before it is skipped.
    pub max_attempts: u32,

    /// Base delay between attempts, doubled each retry.
    pub backoff_ms: u64,
}

/// Path configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for raw page files and outputs.
    /// Environment variable: `XCOLLECT_OUTPUT_DIR`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://twitter283.p.rapidapi.com".to_string(),
            host: "twitter283.p.rapidapi.com".to_string(),
            api_key: None,
            requests_per_second: 3,
            timeout_secs: 30,
            rate_limit_cooldown_ms: 2000,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
            max_pages: None,
        }
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            max_in_flight: MAX_IN_FLIGHT,
            max_attempts: 3,
            backoff_ms: 500,
        }
    }
}

impl ProviderConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Minimum spacing between two requests.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.requests_per_second.max(1)))
    }
}

impl BackfillConfig {
    /// Batch size clamped to `1..=20`.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    /// In-flight limit clamped to `1..=10`.
    #[must_use]
    pub fn effective_max_in_flight(&self) -> usize {
        self.max_in_flight.clamp(1, MAX_IN_FLIGHT)
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file (`explicit`, else ~/.config/xcollect/config.toml)
    /// 3. Compiled defaults
    ///
    /// # Errors
    ///
    /// Returns an error only when an explicitly requested file is missing or
    /// unparsable; a broken user config file is logged and ignored.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_user_config().unwrap_or_default(),
        };

        config.apply_env_overrides();

        debug!("Configuration loaded: {:?}", config.redacted());
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::ConfigError`] if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CollectError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = toml::from_str(&content).map_err(|e| CollectError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    fn load_user_config() -> Option<Self> {
        let path = Self::user_config_path()?;
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }
        match Self::load_from_file(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("xcollect").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup (the process environment in practice).
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("XCOLLECT_API_KEY").or_else(|| lookup("RAPID_API_KEY")) {
            if !key.trim().is_empty() {
                self.provider.api_key = Some(key.trim().to_string());
            }
        }
        if let Some(url) = lookup("XCOLLECT_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(rps) = lookup("XCOLLECT_RPS") {
            match rps.parse() {
                Ok(n) => self.provider.requests_per_second = n,
                Err(_) => warn!("Ignoring invalid XCOLLECT_RPS value: {rps}"),
            }
        }
        if let Some(dir) = lookup("XCOLLECT_OUTPUT_DIR") {
            self.paths.output_dir = Some(PathBuf::from(dir));
        }
    }

    /// The directory where raw files and outputs go.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.paths
            .output_dir
            .clone()
            .unwrap_or_else(crate::default_output_dir)
    }

    /// API key, required for any mode that talks to the provider.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::MissingConfig`] when no key is configured.
    pub fn require_api_key(&self) -> Result<&str> {
        self.provider
            .api_key
            .as_deref()
            .ok_or(CollectError::MissingConfig {
                setting: "provider.api_key",
            })
    }

    /// Copy of the config safe to print or log.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.provider.api_key.is_some() {
            copy.provider.api_key = Some("********".to_string());
        }
        copy
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}
