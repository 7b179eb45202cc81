//! Webhook subscription storage

use crate::model::{EventWebhook, Transformation};
use crate::{Result, WebhookError};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Persistence seam for subscriptions and transformations.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Active subscriptions for exactly `event`, with their transformation loaded.
    async fn active_for_event(&self, event: &str) -> Result<Vec<EventWebhook>>;

    async fn create_webhook(&self, webhook: EventWebhook) -> Result<EventWebhook>;

    async fn get_webhook(&self, id: &str) -> Result<EventWebhook>;

    async fn update_webhook(&self, webhook: EventWebhook) -> Result<EventWebhook>;

    async fn delete_webhook(&self, id: &str) -> Result<EventWebhook>;

    async fn list_webhooks(&self) -> Result<Vec<EventWebhook>>;

    async fn create_transformation(&self, transformation: Transformation) -> Result<Transformation>;

    async fn get_transformation(&self, id: &str) -> Result<Transformation>;

    async fn delete_transformation(&self, id: &str) -> Result<Transformation>;
}

#[derive(Debug, Default)]
struct Tables {
    webhooks: HashMap<String, EventWebhook>,
    transformations: HashMap<String, Transformation>,
}

/// Store keeping everything in memory.
///
/// Webhook URLs and access keys are unique across subscriptions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWebhookStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored subscriptions
    pub fn count(&self) -> usize {
        self.tables.read().webhooks.len()
    }

    fn check_unique(tables: &Tables, webhook: &EventWebhook) -> Result<()> {
        for other in tables.webhooks.values().filter(|w| w.id != webhook.id) {
            if other.webhook_url == webhook.webhook_url {
                return Err(WebhookError::Duplicate {
                    field: "webhook_url",
                    value: webhook.webhook_url.clone(),
                });
            }
            if other.access_key == webhook.access_key {
                return Err(WebhookError::Duplicate {
                    field: "access_key",
                    value: storesync_log::REDACTED.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_transformation(tables: &Tables, webhook: &EventWebhook) -> Result<()> {
        match &webhook.transformation_id {
            Some(id) if !tables.transformations.contains_key(id) => {
                Err(WebhookError::TransformationNotFound(id.clone()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn active_for_event(&self, event: &str) -> Result<Vec<EventWebhook>> {
        let tables = self.tables.read();
        let mut webhooks: Vec<EventWebhook> = tables
            .webhooks
            .values()
            .filter(|w| w.matches(event))
            .map(|w| {
                let mut webhook = w.clone();
                webhook.transformation = webhook
                    .transformation_id
                    .as_ref()
                    .and_then(|id| tables.transformations.get(id))
                    .cloned();
                webhook
            })
            .collect();
        webhooks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(webhooks)
    }

    async fn create_webhook(&self, mut webhook: EventWebhook) -> Result<EventWebhook> {
        let mut tables = self.tables.write();
        if tables.webhooks.contains_key(&webhook.id) {
            return Err(WebhookError::Duplicate {
                field: "id",
                value: webhook.id,
            });
        }
        Self::check_unique(&tables, &webhook)?;
        Self::check_transformation(&tables, &webhook)?;

        webhook.transformation = None;
        tables.webhooks.insert(webhook.id.clone(), webhook.clone());
        Ok(webhook)
    }

    async fn get_webhook(&self, id: &str) -> Result<EventWebhook> {
        self.tables
            .read()
            .webhooks
            .get(id)
            .cloned()
            .ok_or_else(|| WebhookError::WebhookNotFound(id.to_string()))
    }

    async fn update_webhook(&self, mut webhook: EventWebhook) -> Result<EventWebhook> {
        let mut tables = self.tables.write();
        if !tables.webhooks.contains_key(&webhook.id) {
            return Err(WebhookError::WebhookNotFound(webhook.id));
        }
        Self::check_unique(&tables, &webhook)?;
        Self::check_transformation(&tables, &webhook)?;

        webhook.transformation = None;
        webhook.updated_at = Utc::now();
        tables.webhooks.insert(webhook.id.clone(), webhook.clone());
        Ok(webhook)
    }

    async fn delete_webhook(&self, id: &str) -> Result<EventWebhook> {
        self.tables
            .write()
            .webhooks
            .remove(id)
            .ok_or_else(|| WebhookError::WebhookNotFound(id.to_string()))
    }

    async fn list_webhooks(&self) -> Result<Vec<EventWebhook>> {
        Ok(self.tables.read().webhooks.values().cloned().collect())
    }

    async fn create_transformation(&self, transformation: Transformation) -> Result<Transformation> {
        let mut tables = self.tables.write();
        if tables.transformations.contains_key(&transformation.id) {
            return Err(WebhookError::Duplicate {
                field: "id",
                value: transformation.id,
            });
        }
        tables
            .transformations
            .insert(transformation.id.clone(), transformation.clone());
        Ok(transformation)
    }

    async fn get_transformation(&self, id: &str) -> Result<Transformation> {
        self.tables
            .read()
            .transformations
            .get(id)
            .cloned()
            .ok_or_else(|| WebhookError::TransformationNotFound(id.to_string()))
    }

    /// Subscriptions pointing at the transformation lose the reference.
    async fn delete_transformation(&self, id: &str) -> Result<Transformation> {
        let mut tables = self.tables.write();
        let removed = tables
            .transformations
            .remove(id)
            .ok_or_else(|| WebhookError::TransformationNotFound(id.to_string()))?;
        for webhook in tables.webhooks.values_mut() {
            if webhook.transformation_id.as_deref() == Some(id) {
                webhook.transformation_id = None;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_active_for_event_loads_transformation() {
        let store = InMemoryWebhookStore::new();
        let transformation = store
            .create_transformation(Transformation::new("order.placed", "flat"))
            .await
            .unwrap();
        store
            .create_webhook(
                EventWebhook::new("https://a.example.com", "a")
                    .for_event("order.placed")
                    .with_transformation(&transformation.id),
            )
            .await
            .unwrap();
        store
            .create_webhook(EventWebhook::new("https://b.example.com", "b").for_event("order.placed").inactive())
            .await
            .unwrap();
        store
            .create_webhook(EventWebhook::new("https://c.example.com", "c").for_event("order.updated"))
            .await
            .unwrap();

        let found = store.active_for_event("order.placed").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].webhook_url, "https://a.example.com");
        assert_eq!(found[0].transformation.as_ref().unwrap().id, transformation.id);
    }

    #[tokio::test]
    async fn test_unique_url_and_access_key() {
        let store = InMemoryWebhookStore::new();
        store
            .create_webhook(EventWebhook::new("https://a.example.com", "a"))
            .await
            .unwrap();

        let same_url = store
            .create_webhook(EventWebhook::new("https://a.example.com", "other"))
            .await;
        assert!(matches!(
            same_url,
            Err(WebhookError::Duplicate { field: "webhook_url", .. })
        ));

        let same_key = store
            .create_webhook(EventWebhook::new("https://b.example.com", "a"))
            .await;
        assert!(matches!(
            same_key,
            Err(WebhookError::Duplicate { field: "access_key", .. })
        ));
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_transformation_rejected() {
        let store = InMemoryWebhookStore::new();
        let result = store
            .create_webhook(EventWebhook::new("https://a.example.com", "a").with_transformation("trf_missing"))
            .await;
        assert!(matches!(result, Err(WebhookError::TransformationNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_transformation_detaches_webhooks() {
        let store = InMemoryWebhookStore::new();
        let transformation = store
            .create_transformation(Transformation::new("order.placed", "flat"))
            .await
            .unwrap();
        let webhook = store
            .create_webhook(EventWebhook::new("https://a.example.com", "a").with_transformation(&transformation.id))
            .await
            .unwrap();

        store.delete_transformation(&transformation.id).await.unwrap();
        let reloaded = store.get_webhook(&webhook.id).await.unwrap();
        assert!(reloaded.transformation_id.is_none());
    }
}
