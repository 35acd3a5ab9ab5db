use std::time::Duration;

use serde::Deserialize;

/// Optimization cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of cached plans before LRU eviction
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Age after which an entry is treated as a miss (e.g. "24h")
    #[serde(default = "default_ttl", deserialize_with = "crate::duration::deserialize")]
    pub ttl: Duration,
    /// Minimum savings percentage a plan needs to be cached
    #[serde(default = "default_min_savings_threshold")]
    pub min_savings_threshold: f64,
    /// How often the background task purges expired entries
    #[serde(default = "default_cleanup_interval", deserialize_with = "crate::duration::deserialize")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            ttl: default_ttl(),
            min_savings_threshold: default_min_savings_threshold(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_size() -> usize {
    1000
}

#[allow(clippy::missing_const_for_fn)]
fn default_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

#[allow(clippy::missing_const_for_fn)]
fn default_min_savings_threshold() -> f64 {
    30.0
}

#[allow(clippy::missing_const_for_fn)]
fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60 * 60)
}
