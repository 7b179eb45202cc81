//! Base payload lookup

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Builds the base payload for an event, typically by loading the entity
/// the event refers to.
#[async_trait]
pub trait EventDataFetcher: Send + Sync {
    async fn fetch(&self, event: &str, data: &Value) -> Result<Value>;
}

/// Uses the event data as the payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFetcher;

#[async_trait]
impl EventDataFetcher for PassthroughFetcher {
    async fn fetch(&self, _event: &str, data: &Value) -> Result<Value> {
        Ok(data.clone())
    }
}
