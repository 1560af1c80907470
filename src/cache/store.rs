//! Cache store contract and the in-process implementation.
//!
//! `keys_matching` is a scan over live keys, O(matching keys) on Redis and
//! O(all keys) in memory. That is fine for the small key space of one service;
//! a larger deployment would keep a set of keys per tag instead, without
//! changing what the overlay asks of the store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

use super::patterns::glob_match;

type Entries = HashMap<String, MemoryEntry>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is absent or expired. Routine, not a failure.
    #[error("cache key not found")]
    NotFound,
    #[error("cache store unavailable: {message}")]
    Unavailable { message: String },
    #[error("invalid ttl {0:?}: must be greater than zero")]
    InvalidTtl(Duration),
    #[error("cached value could not be decoded: {message}")]
    Serialization { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Networked key-value store used by the response cache.
///
/// Every call is a single independent operation; no call is retried.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Returns the exact bytes last written, or [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Unconditionally overwrites `key`. A zero `ttl` is rejected.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// All live keys matching a glob pattern; an empty result is not an error.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Idempotent: deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Removes every key.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;
}

struct MemoryEntry {
    value: Bytes,
    /// `None` when the ttl reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// In-process store with per-entry expiry. Expired entries are invisible to
/// reads and are swept on the next write.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoned locks are recovered; entries carry their own expiry.
    fn read_entries(&self, op: &'static str) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!(op, store = "memory", "recovered poisoned cache entries lock");
            PoisonError::into_inner(poisoned)
        })
    }

    fn write_entries(&self, op: &'static str) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!(op, store = "memory", "recovered poisoned cache entries lock");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.read_entries("len")
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let now = Instant::now();
        self.read_entries("get")
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return Err(StoreError::InvalidTtl(ttl));
        }
        let now = Instant::now();
        let mut entries = self.write_entries("set");
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: now.checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        Ok(self.read_entries("keys_matching")
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.write_entries("delete").remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.write_entries("clear").clear();
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
