//! Echo suppression markers.
//!
//! When the engine writes an entity to one side, the other side usually
//! answers with a change event for the same entity. A short-lived marker
//! `(id, side)` records "this side just wrote it" so that the inbound
//! handler for the echo can skip it. Markers expire on their own and are
//! never deleted explicitly.

use crate::error::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use storesync_cache::CacheStore;
use tracing::debug;

/// The system a write originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The commerce backend
    Medusa,
    /// The CMS
    Strapi,
}

impl Side {
    /// Lowercase name used in ledger keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Medusa => "medusa",
            Side::Strapi => "strapi",
        }
    }

    /// The other side.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Medusa => Side::Strapi,
            Side::Strapi => Side::Medusa,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TTL-bound marker store keyed by `(entity id, side)`.
#[derive(Clone)]
pub struct IgnoreLedger {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl IgnoreLedger {
    /// Create a ledger over `store` whose markers live for `ttl`.
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Marker lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Storage key for a marker.
    pub fn key(id: &str, side: Side) -> String {
        format!("{id}_ignore_{side}")
    }

    /// Record that `side` just wrote entity `id`.
    pub async fn mark(&self, id: &str, side: Side) -> Result<()> {
        let key = Self::key(id, side);
        debug!(key = %key, ttl_secs = self.ttl.as_secs(), "Setting ignore marker");
        self.store.set(&key, "1".to_string(), Some(self.ttl)).await?;
        Ok(())
    }

    /// Whether a live marker exists for `(id, side)`.
    pub async fn is_ignored(&self, id: &str, side: Side) -> Result<bool> {
        Ok(self.store.exists(&Self::key(id, side)).await?)
    }
}

impl fmt::Debug for IgnoreLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnoreLedger").field("ttl", &self.ttl).finish()
    }
}
