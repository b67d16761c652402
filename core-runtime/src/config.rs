//! # Core Configuration
//!
//! Runtime configuration for the mirror and sync engine.
//!
//! Configuration can be assembled in code through [`CoreConfig::builder`] or
//! loaded from a TOML document with [`CoreConfig::from_toml_str`] /
//! [`CoreConfig::load`]. Both paths end in [`CoreConfig::validate`], so an
//! invalid configuration fails at startup rather than mid-run.
//!
//! ## Example
//!
//! ```toml
//! database_path = "/var/lib/djlib/mirror.db"
//! cache_dir = "/var/cache/djlib"
//! refresh_concurrency = 4
//!
//! [sync]
//! export_concurrency = 2
//! import_concurrency = 2
//! lock_window_secs = 10
//!
//! [retry]
//! max_attempts = 10
//! base_delay_ms = 1000
//! max_delay_ms = 60000
//!
//! [retry_overrides.spotify]
//! base_delay_ms = 5000
//!
//! [logging]
//! format = "json"
//! level = "info"
//! ```

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for any concurrency knob.
const MAX_CONCURRENCY: usize = 64;

/// Sync pipeline tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Maximum number of exports in flight against the source library
    pub export_concurrency: usize,
    /// Maximum number of imports in flight against the target library
    pub import_concurrency: usize,
    /// Seconds every export waits once a rate limit is hit
    pub lock_window_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            export_concurrency: 2,
            import_concurrency: 2,
            lock_window_secs: 10,
        }
    }
}

impl SyncSettings {
    pub fn lock_window(&self) -> Duration {
        Duration::from_secs(self.lock_window_secs)
    }
}

/// Retry/backoff settings applied to one library's adapter calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Base delay for exponential backoff and the jitter range
    pub base_delay_ms: u64,
    /// Cap applied to every computed delay
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    fn validate(&self, scope: &str) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(format!(
                "{}: max_attempts must be at least 1",
                scope
            )));
        }
        if self.base_delay_ms == 0 {
            return Err(Error::Config(format!(
                "{}: base_delay_ms must be greater than 0",
                scope
            )));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::Config(format!(
                "{}: max_delay_ms ({}) must not be below base_delay_ms ({})",
                scope, self.max_delay_ms, self.base_delay_ms
            )));
        }
        Ok(())
    }
}

/// Core configuration shared by every service component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Path to the SQLite mirror database
    pub database_path: PathBuf,

    /// Directory holding per-run export folders
    pub cache_dir: PathBuf,

    /// Maximum playlists fetched concurrently during one refresh
    #[serde(default = "default_refresh_concurrency")]
    pub refresh_concurrency: usize,

    #[serde(default)]
    pub sync: SyncSettings,

    /// Retry settings for libraries without an override
    #[serde(default)]
    pub retry: RetrySettings,

    /// Per-library retry settings keyed by library id
    #[serde(default)]
    pub retry_overrides: HashMap<String, RetrySettings>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_refresh_concurrency() -> usize {
    4
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use core_runtime::config::CoreConfig;
    ///
    /// let config = CoreConfig::builder()
    ///     .database_path("/path/to/mirror.db")
    ///     .cache_dir("/path/to/cache")
    ///     .build()?;
    /// # Ok::<(), core_runtime::Error>(())
    /// ```
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CoreConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Retry settings for `library`, falling back to the global section.
    pub fn retry_for(&self, library: &str) -> &RetrySettings {
        self.retry_overrides.get(library).unwrap_or(&self.retry)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path and cache directory are not empty
    /// - Every concurrency limit is within 1..=64
    /// - Retry settings (global and per library) are usable
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        for (name, value) in [
            ("refresh_concurrency", self.refresh_concurrency),
            ("sync.export_concurrency", self.sync.export_concurrency),
            ("sync.import_concurrency", self.sync.import_concurrency),
        ] {
            if value == 0 || value > MAX_CONCURRENCY {
                return Err(Error::Config(format!(
                    "{} must be between 1 and {} (got {})",
                    name, MAX_CONCURRENCY, value
                )));
            }
        }

        self.retry.validate("retry")?;
        for (library, settings) in &self.retry_overrides {
            settings.validate(&format!("retry_overrides.{}", library))?;
        }

        Ok(())
    }
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Call [`build()`](CoreConfigBuilder::build) to validate and produce the
/// final config.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    refresh_concurrency: Option<usize>,
    sync: SyncSettings,
    retry: RetrySettings,
    retry_overrides: HashMap<String, RetrySettings>,
    logging: LoggingConfig,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/mirror.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the cache directory that receives exported media.
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Sets how many playlists one refresh fetches concurrently.
    ///
    /// Default: 4
    pub fn refresh_concurrency(mut self, limit: usize) -> Self {
        self.refresh_concurrency = Some(limit);
        self
    }

    /// Sets the export concurrency limit.
    ///
    /// Default: 2
    pub fn export_concurrency(mut self, limit: usize) -> Self {
        self.sync.export_concurrency = limit;
        self
    }

    /// Sets the import concurrency limit.
    ///
    /// Default: 2
    pub fn import_concurrency(mut self, limit: usize) -> Self {
        self.sync.import_concurrency = limit;
        self
    }

    /// Sets how long exports pause after a rate-limit response.
    ///
    /// Default: 10 seconds
    pub fn lock_window(mut self, window: Duration) -> Self {
        self.sync.lock_window_secs = window.as_secs();
        self
    }

    /// Sets the default retry settings.
    pub fn retry(mut self, settings: RetrySettings) -> Self {
        self.retry = settings;
        self
    }

    /// Overrides retry settings for one library.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::{CoreConfig, RetrySettings};
    ///
    /// let builder = CoreConfig::builder().retry_for(
    ///     "spotify",
    ///     RetrySettings { base_delay_ms: 5_000, ..Default::default() },
    /// );
    /// ```
    pub fn retry_for(mut self, library: impl Into<String>, settings: RetrySettings) -> Self {
        self.retry_overrides.insert(library.into(), settings);
        self
    }

    /// Sets logging configuration.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Builds the final [`CoreConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing or validation fails.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let config = CoreConfig {
            database_path,
            cache_dir,
            refresh_concurrency: self
                .refresh_concurrency
                .unwrap_or_else(default_refresh_concurrency),
            sync: self.sync,
            retry: self.retry,
            retry_overrides: self.retry_overrides,
            logging: self.logging,
        };

        config.validate()?;

        Ok(config)
    }
}
