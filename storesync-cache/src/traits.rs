//! Cache store trait definition.

use crate::error::CacheResult;
use async_trait::async_trait;
use std::time::Duration;

/// Key/value store with per-key expiry.
///
/// Every operation is atomic per key; callers need no extra locking.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value from the store.
    ///
    /// Returns `Ok(None)` when the key is missing or has expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete a key from the store.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Check if a live key exists.
    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Remaining time-to-live of a key.
    ///
    /// Returns `Ok(None)` if the key has no expiration or doesn't exist.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Clear all keys from the store.
    ///
    /// **Warning:** on Redis this flushes the selected database.
    async fn clear(&self) -> CacheResult<()>;
}
