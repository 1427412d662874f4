//! Cache configuration
//!
//! Configuration can be loaded from a TOML file, from environment variables,
//! or created programmatically. Values that are not specified fall back to
//! the defaults in [`TieredCacheConfig::default`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};
use crate::pressure::{BatchFraction, PressureLevel};

/// Environment variable for the maximum entry count
pub const ENV_CAPACITY: &str = "TIERED_CACHE_CAPACITY";
/// Environment variable for the persistent reclaim threshold
pub const ENV_RECLAIM_THRESHOLD: &str = "TIERED_CACHE_RECLAIM_THRESHOLD";
/// Environment variable for the batch reclaim fraction
pub const ENV_BATCH_FRACTION: &str = "TIERED_CACHE_BATCH_FRACTION";
/// Environment variable for the pressure level a new cache starts at
pub const ENV_INITIAL_PRESSURE: &str = "TIERED_CACHE_INITIAL_PRESSURE";

/// Configuration for a [`TieredCache`](crate::TieredCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TieredCacheConfig {
    /// Maximum number of live entries
    pub capacity: usize,
    /// Minimum pressure level at which persistent entries become reclaimable
    pub persistent_reclaim_threshold: PressureLevel,
    /// Fraction of persistent entries reclaimed per eligible sweep when no
    /// relief estimator is supplied
    pub reclaim_batch_fraction: f64,
    /// Pressure level the cache starts at
    pub initial_pressure: PressureLevel,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            persistent_reclaim_threshold: PressureLevel::High,
            reclaim_batch_fraction: BatchFraction::DEFAULT,
            initial_pressure: PressureLevel::Low,
        }
    }
}

impl TieredCacheConfig {
    /// Creates a configuration with the given capacity and default settings otherwise.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Sets the maximum entry count.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the persistent reclaim threshold.
    pub fn with_threshold(mut self, threshold: PressureLevel) -> Self {
        self.persistent_reclaim_threshold = threshold;
        self
    }

    /// Sets the batch reclaim fraction.
    pub fn with_batch_fraction(mut self, fraction: f64) -> Self {
        self.reclaim_batch_fraction = fraction;
        self
    }

    /// Sets the starting pressure level.
    pub fn with_initial_pressure(mut self, level: PressureLevel) -> Self {
        self.initial_pressure = level;
        self
    }

    /// Checks that the configuration describes a usable cache.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidConfiguration`] if the capacity is zero or
    /// the batch fraction is outside `(0.0, 1.0]`.
    pub fn validate(&self) -> CacheResult<()> {
        if self.capacity == 0 {
            return Err(CacheError::InvalidConfiguration(
                "capacity must be greater than zero".to_string(),
            ));
        }
        let fraction = self.reclaim_batch_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(CacheError::InvalidConfiguration(format!(
                "reclaim_batch_fraction must be in (0, 1], got {fraction}"
            )));
        }
        Ok(())
    }

    /// Batch reclaim budget derived from this configuration
    pub fn batch_fraction(&self) -> BatchFraction {
        BatchFraction::new(self.reclaim_batch_fraction)
    }

    /// Returns the default configuration file path for the current platform.
    ///
    /// - macOS: ~/Library/Application Support/tiered-cache/cache.toml
    /// - Linux: ~/.config/tiered-cache/cache.toml
    /// - Windows: %APPDATA%\tiered-cache\cache.toml
    pub fn default_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("tiered-cache").join("cache.toml")
        } else {
            // Fallback to current directory if config dir unavailable
            PathBuf::from("tiered-cache.toml")
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TIERED_CACHE_CAPACITY`: maximum entry count (default: 1024)
    /// - `TIERED_CACHE_RECLAIM_THRESHOLD`: `low`, `medium` or `high` (default: high)
    /// - `TIERED_CACHE_BATCH_FRACTION`: fraction reclaimed per sweep (default: 0.25)
    /// - `TIERED_CACHE_INITIAL_PRESSURE`: starting pressure level (default: low)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(capacity) = env_value(ENV_CAPACITY)? {
            config.capacity = capacity;
        }
        if let Some(threshold) = env_value(ENV_RECLAIM_THRESHOLD)? {
            config.persistent_reclaim_threshold = threshold;
        }
        if let Some(fraction) = env_value(ENV_BATCH_FRACTION)? {
            config.reclaim_batch_fraction = fraction;
        }
        if let Some(level) = env_value(ENV_INITIAL_PRESSURE)? {
            config.initial_pressure = level;
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// capacity = 512
    /// persistent_reclaim_threshold = "medium"
    /// reclaim_batch_fraction = 0.5
    /// initial_pressure = "low"
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Saves configuration to a TOML file, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Converts configuration to TOML format.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for configuration key {key}")]
    InvalidValue { key: String, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
