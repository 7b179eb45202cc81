//! Redis cache implementation.

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::traits::CacheStore;
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::time::Duration;
use tracing::debug;

/// Redis-backed store, shared by every process instance of the sync engine.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    config: CacheConfig,
}

impl RedisCache {
    /// Connect to the configured Redis server.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use storesync_cache::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), CacheError> {
    ///     let config = CacheConfig::redis("redis://localhost:6379")?;
    ///     let cache = RedisCache::new(config).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| CacheError::Connection(e.to_string()))?;

        let connection = tokio::time::timeout(
            config.connection_timeout,
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| CacheError::Connection(format!("timed out connecting to {}", config.url)))?
        .map_err(|e| CacheError::Connection(e.to_string()))?;

        debug!(url = %config.url, "Connected to redis");
        Ok(Self { connection, config })
    }

    fn build_key(&self, key: &str) -> String {
        self.config.build_key(key)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();

        let value: Option<String> = conn.get(&key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();

        match ttl.or(self.config.default_ttl) {
            // SET EX rejects zero, round sub-second TTLs up
            Some(ttl) => {
                let seconds = ttl.as_secs().max(1);
                let _: () = conn.set_ex(&key, value, seconds).await?;
            }
            None => {
                let _: () = conn.set(&key, value).await?;
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();
        let _: () = conn.del(&key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(&key).await?;
        Ok(exists)
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let key = self.build_key(key);
        let mut conn = self.connection.clone();

        let ttl_seconds: i64 = conn.ttl(&key).await?;

        match ttl_seconds {
            seconds if seconds > 0 => Ok(Some(Duration::from_secs(seconds as u64))),
            // -2: missing, -1: no expiration
            _ => Ok(None),
        }
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }
}
