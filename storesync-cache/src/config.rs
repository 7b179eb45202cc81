//! Cache configuration types.

use crate::error::{CacheError, CacheResult};
use std::time::Duration;

/// Cache backend type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    /// Process-local map
    Memory,
    /// Redis backend
    Redis,
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::Memory => write!(f, "Memory"),
            CacheBackend::Redis => write!(f, "Redis"),
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache backend type
    pub backend: CacheBackend,

    /// Connection URL, empty for the memory backend
    pub url: String,

    /// Key prefix for all cache keys
    pub key_prefix: Option<String>,

    /// TTL applied when a write does not carry one
    pub default_ttl: Option<Duration>,

    /// Connection timeout
    pub connection_timeout: Duration,
}

impl CacheConfig {
    /// Configuration for the in-process backend.
    pub fn memory() -> Self {
        Self {
            backend: CacheBackend::Memory,
            url: String::new(),
            key_prefix: None,
            default_ttl: None,
            connection_timeout: Duration::from_secs(5),
        }
    }

    /// Create a new Redis cache configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use storesync_cache::CacheConfig;
    ///
    /// let config = CacheConfig::redis("redis://localhost:6379").unwrap();
    /// ```
    pub fn redis(url: impl Into<String>) -> CacheResult<Self> {
        let url = url.into();
        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(CacheError::Config(format!(
                "unsupported redis url: {}",
                url
            )));
        }

        Ok(Self {
            backend: CacheBackend::Redis,
            url,
            key_prefix: None,
            default_ttl: None,
            connection_timeout: Duration::from_secs(5),
        })
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Build the final key with prefix if configured.
    pub fn build_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::memory()
    }
}
