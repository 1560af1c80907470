//! Taskdeck response cache
//!
//! A read-through overlay for the task API:
//!
//! - **Keys**: `GET` requests map to `version:resource[:scope][:id][:query]`
//! - **Patterns**: writes drop every key a read of the same collection could
//!   have produced, across all scopes
//! - **Store**: Redis in deployment, an in-process map for tests and single
//!   instances
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `taskdeck.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379"
//! ttl_seconds = 300
//! # ... see config.rs for all options
//! ```

mod config;
pub mod entry;
mod keys;
mod middleware;
mod patterns;
mod redis;
mod store;

pub use self::config::{CacheBackend, CacheConfig};
pub use keys::{
    CACHEABLE_PARAMS, CacheKey, CacheKeyBuilder, KeySpace, RequestParts, SCOPE_HEADER,
    is_cacheable_param, normalized_query,
};
pub use middleware::{CACHE_STATUS_HEADER, CacheState, response_cache_layer};
pub use patterns::{InvalidationPattern, InvalidationPatternBuilder, escape_glob, glob_match};
pub use self::redis::RedisStore;
pub use store::{CacheStore, MemoryStore, StoreError};

pub(crate) use self::config::{
    DEFAULT_MAX_BODY_BYTES, DEFAULT_OPERATION_TIMEOUT_MS, DEFAULT_REDIS_URL, DEFAULT_TTL_SECS,
    MAX_TTL_SECS,
};
pub(crate) use keys::{DEFAULT_RESOURCE_TYPE, DEFAULT_VERSION};
pub(crate) use middleware::{
    METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATED, METRIC_CACHE_MISS, METRIC_CACHE_STORE,
    METRIC_CACHE_STORE_ERROR,
};
