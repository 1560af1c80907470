//! Cache configuration.
//!
//! Resolved from the `[cache]` section of `taskdeck.toml` (see `crate::config`).

use std::time::Duration;

use super::keys::{DEFAULT_RESOURCE_TYPE, DEFAULT_VERSION, KeySpace};

// Default values for cache configuration
pub(crate) const DEFAULT_TTL_SECS: u64 = 300;
pub(crate) const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;
pub(crate) const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 1000;
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
pub(crate) const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Which store backs the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Serve reads from the cache and invalidate on writes.
    pub enabled: bool,
    pub backend: CacheBackend,
    pub redis_url: String,
    /// Expiry applied to every populated entry.
    pub ttl: Duration,
    /// Upper bound on each store round-trip.
    pub operation_timeout: Duration,
    /// Bodies larger than this are forwarded but not cached.
    pub max_body_bytes: usize,
    pub default_version: String,
    pub resource_type: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Redis,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            default_version: DEFAULT_VERSION.to_string(),
            resource_type: DEFAULT_RESOURCE_TYPE.to_string(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            redis_url: settings.redis_url.clone(),
            ttl: settings.ttl,
            operation_timeout: settings.operation_timeout,
            max_body_bytes: settings.max_body_bytes.get(),
            default_version: settings.default_version.clone(),
            resource_type: settings.resource_type.clone(),
        }
    }
}

impl CacheConfig {
    pub fn key_space(&self) -> KeySpace {
        KeySpace {
            default_version: self.default_version.clone(),
            resource_type: self.resource_type.clone(),
        }
    }
}
