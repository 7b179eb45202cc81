//! In-process cache store.

use crate::error::CacheResult;
use crate::traits::CacheStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// In-memory store, used when no Redis URL is configured and in tests.
///
/// Expiry uses `tokio::time::Instant`, so paused test clocks apply.
#[derive(Clone)]
pub struct InMemoryCache {
    data: Arc<RwLock<HashMap<String, CacheEntry>>>,
    default_ttl: Option<Duration>,
}

#[derive(Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|exp| exp > now)
    }
}

impl InMemoryCache {
    /// Create new in-memory cache
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            default_ttl: None,
        }
    }

    /// Apply `ttl` to writes that don't carry one.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) -> usize {
        let mut data = self.data.write().await;
        let now = Instant::now();
        let before = data.len();
        data.retain(|_, entry| entry.is_live(now));
        before - data.len()
    }

    /// Number of stored entries, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let data = self.data.read().await;
        Ok(data
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.or(self.default_ttl).map(|d| Instant::now() + d);
        let entry = CacheEntry { value, expires_at };
        self.data.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let data = self.data.read().await;
        let now = Instant::now();
        Ok(data
            .get(key)
            .and_then(|entry| entry.expires_at)
            .filter(|expires_at| *expires_at > now)
            .map(|expires_at| expires_at - now))
    }

    async fn clear(&self) -> CacheResult<()> {
        self.data.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = InMemoryCache::new();
        cache.set("key", "1".to_string(), None).await.unwrap();

        assert_eq!(cache.get("key").await.unwrap(), Some("1".to_string()));
        assert!(cache.exists("key").await.unwrap());
        assert_eq!(cache.ttl("key").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires() {
        let cache = InMemoryCache::new();
        cache
            .set("key", "1".to_string(), Some(Duration::from_secs(3)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.exists("key").await.unwrap());
        assert_eq!(cache.ttl("key").await.unwrap(), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cache.exists("key").await.unwrap());
        assert_eq!(cache.ttl("key").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl_and_purge() {
        let cache = InMemoryCache::new().with_default_ttl(Duration::from_secs(1));
        cache.set("a", "1".to_string(), None).await.unwrap();
        cache
            .set("b", "1".to_string(), Some(Duration::from_secs(10)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = InMemoryCache::new();
        cache.set("a", "1".to_string(), None).await.unwrap();
        cache.set("b", "1".to_string(), None).await.unwrap();

        cache.delete("a").await.unwrap();
        assert!(!cache.exists("a").await.unwrap());

        cache.clear().await.unwrap();
        assert!(cache.is_empty().await);
    }
}
