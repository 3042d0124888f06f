//! Configuration for the layered cache

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a `LayeredCache`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Memory-tier TTL used when a query does not pass its own
    pub default_memory_ttl: Duration,

    /// Namespace for keys written to session and local backing stores
    pub key_prefix: String,

    /// File backing the local tier; `None` keeps the local tier in memory
    pub local_store_path: Option<PathBuf>,

    /// Upper bound on memory-tier entries; `None` is unbounded
    pub max_memory_entries: Option<usize>,

    /// TTL jitter factor (0.0 - 1.0) applied to written TTLs
    /// Spreads expiry of entries written together
    pub ttl_jitter: f64,

    /// Enable the background sweep of expired entries
    pub enable_auto_cleanup: bool,

    /// Interval between background sweeps
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_memory_ttl: Duration::from_secs(300),
            key_prefix: "layercache:".to_string(),
            local_store_path: None,
            max_memory_entries: None,
            ttl_jitter: 0.0,
            enable_auto_cleanup: false,
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Load configuration from `LAYERCACHE_*` environment variables
    ///
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    ///
    /// Unset variables keep their defaults; set but unparsable ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, "LAYERCACHE_MEMORY_TTL_MS")? {
            config.default_memory_ttl = Duration::from_millis(ms);
        }
        if let Some(prefix) = lookup("LAYERCACHE_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        if let Some(path) = lookup("LAYERCACHE_LOCAL_PATH") {
            config.local_store_path = Some(PathBuf::from(path));
        }
        if let Some(max) = parse_var::<usize, _>(&lookup, "LAYERCACHE_MAX_MEMORY_ENTRIES")? {
            config.max_memory_entries = Some(max);
        }
        if let Some(jitter) = parse_var::<f64, _>(&lookup, "LAYERCACHE_TTL_JITTER")? {
            config.ttl_jitter = jitter;
        }
        if let Some(enabled) = parse_var::<bool, _>(&lookup, "LAYERCACHE_AUTO_CLEANUP")? {
            config.enable_auto_cleanup = enabled;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "LAYERCACHE_CLEANUP_INTERVAL_MS")? {
            config.cleanup_interval = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.is_empty() {
            return Err(CacheError::Config("key_prefix must not be empty".to_string()));
        }

        if self.default_memory_ttl.is_zero() {
            return Err(CacheError::Config(
                "default_memory_ttl must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(CacheError::Config(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.max_memory_entries == Some(0) {
            return Err(CacheError::Config(
                "max_memory_entries must be greater than 0".to_string(),
            ));
        }

        if self.cleanup_interval.is_zero() {
            return Err(CacheError::Config(
                "cleanup_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply jitter to a TTL about to be written
    pub fn ttl_with_jitter(&self, ttl: Duration) -> Duration {
        if self.ttl_jitter == 0.0 {
            return ttl;
        }

        let base_ms = ttl.as_secs_f64() * 1000.0;
        let jitter_range = base_ms * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_ms = (base_ms + jitter).max(1.0);

        Duration::from_secs_f64(final_ms / 1000.0)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CacheError::Config(format!("invalid {}={:?}: {}", name, raw, e))),
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    default_memory_ttl: Option<Duration>,
    key_prefix: Option<String>,
    local_store_path: Option<PathBuf>,
    max_memory_entries: Option<usize>,
    ttl_jitter: Option<f64>,
    enable_auto_cleanup: Option<bool>,
    cleanup_interval: Option<Duration>,
}

impl CacheConfigBuilder {
    /// Set the default memory-tier TTL
    pub fn default_memory_ttl(mut self, ttl: Duration) -> Self {
        self.default_memory_ttl = Some(ttl);
        self
    }

    /// Set the key namespace used in persistent stores
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Persist the local tier to a file
    pub fn local_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_store_path = Some(path.into());
        self
    }

    /// Bound the number of memory-tier entries
    pub fn max_memory_entries(mut self, max: usize) -> Self {
        self.max_memory_entries = Some(max);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Enable or disable the background sweep
    pub fn enable_auto_cleanup(mut self, enable: bool) -> Self {
        self.enable_auto_cleanup = Some(enable);
        self
    }

    /// Set sweep interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            default_memory_ttl: self
                .default_memory_ttl
                .unwrap_or(defaults.default_memory_ttl),
            key_prefix: self.key_prefix.unwrap_or(defaults.key_prefix),
            local_store_path: self.local_store_path.or(defaults.local_store_path),
            max_memory_entries: self.max_memory_entries.or(defaults.max_memory_entries),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            enable_auto_cleanup: self
                .enable_auto_cleanup
                .unwrap_or(defaults.enable_auto_cleanup),
            cleanup_interval: self.cleanup_interval.unwrap_or(defaults.cleanup_interval),
        }
    }
}
