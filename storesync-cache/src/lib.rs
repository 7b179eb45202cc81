//! Short-lived key/value storage for the sync engine.
//!
//! The sync engine keeps a handful of tiny markers (for example the
//! "ignore the echo of my own write" entries) that must expire on their
//! own. This crate provides the storage seam for them.
//!
//! # Features
//!
//! - `redis` - Enable the Redis backend, for deployments running several
//!   instances that must share markers
//!
//! # Examples
//!
//! ```
//! use storesync_cache::*;
//! use std::time::Duration;
//!
//! # async fn example() -> CacheResult<()> {
//! let cache = InMemoryCache::new();
//! cache.set("prod_1_ignore_strapi", "1".to_string(), Some(Duration::from_secs(3))).await?;
//! assert!(cache.exists("prod_1_ignore_strapi").await?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod traits;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use config::{CacheBackend, CacheConfig};
pub use error::{CacheError, CacheResult};
pub use memory::InMemoryCache;
pub use traits::CacheStore;

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

use std::sync::Arc;

/// Build a shared store for `config`.
///
/// Falls back to an error when Redis is requested without the `redis`
/// feature compiled in.
pub async fn connect(config: CacheConfig) -> CacheResult<Arc<dyn CacheStore>> {
    match config.backend {
        CacheBackend::Memory => {
            let mut cache = InMemoryCache::new();
            if let Some(ttl) = config.default_ttl {
                cache = cache.with_default_ttl(ttl);
            }
            Ok(Arc::new(cache))
        }
        #[cfg(feature = "redis")]
        CacheBackend::Redis => Ok(Arc::new(RedisCache::new(config).await?)),
        #[cfg(not(feature = "redis"))]
        CacheBackend::Redis => Err(CacheError::Config(
            "redis backend requested but the `redis` feature is disabled".to_string(),
        )),
    }
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CacheBackend, CacheConfig};
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::memory::InMemoryCache;
    pub use crate::traits::CacheStore;

    #[cfg(feature = "redis")]
    pub use crate::redis_cache::RedisCache;
}
