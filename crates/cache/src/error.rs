//! Error types for cache construction

use crate::config::ConfigError;

/// Errors returned when building or reconfiguring a cache
///
/// Lookups never fail: a miss is `None`, not an error.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type CacheResult<T> = Result<T, CacheError>;
