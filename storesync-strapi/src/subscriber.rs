//! Domain event routing into the sync orchestrator.

use crate::error::{Result, StrapiError};
use crate::sync::StrapiSync;
use crate::transport::{StrapiResult, id_string};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Entity family of a subscribed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Product,
    ProductVariant,
    ProductType,
    Region,
    Collection,
    Category,
    SalesChannel,
}

/// What happened to the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Created,
    Updated,
    Deleted,
    ProductsAdded,
    ProductsRemoved,
}

/// A domain event the subscriber acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncEvent {
    pub subject: Subject,
    pub action: Action,
}

impl SyncEvent {
    /// Every event name the subscriber handles.
    pub const NAMES: &'static [&'static str] = &[
        "product.created",
        "product.updated",
        "product.deleted",
        "product-variant.created",
        "product-variant.updated",
        "product-variant.deleted",
        "product-type.created",
        "product-type.deleted",
        "region.created",
        "region.updated",
        "region.deleted",
        "product-collection.created",
        "product-collection.updated",
        "product-collection.deleted",
        "product-collection.products-added",
        "product-collection.products-removed",
        "product-category.created",
        "product-category.updated",
        "product-category.deleted",
        "product-category.products-added",
        "product-category.products-removed",
        "sales-channel.created",
        "sales-channel.updated",
        "sales-channel.deleted",
    ];

    /// Parse `{subject}.{action}`; `None` for events nobody syncs.
    pub fn parse(name: &str) -> Option<Self> {
        let (subject, action) = name.split_once('.')?;
        let subject = match subject {
            "product" => Subject::Product,
            "product-variant" => Subject::ProductVariant,
            "product-type" => Subject::ProductType,
            "region" => Subject::Region,
            "product-collection" => Subject::Collection,
            "product-category" => Subject::Category,
            "sales-channel" => Subject::SalesChannel,
            _ => return None,
        };
        let action = match action {
            "created" => Action::Created,
            "updated" => Action::Updated,
            "deleted" => Action::Deleted,
            "products-added" => Action::ProductsAdded,
            "products-removed" => Action::ProductsRemoved,
            _ => return None,
        };

        let supported = match (subject, action) {
            (Subject::ProductType, Action::Updated) => false,
            (Subject::Collection | Subject::Category, _) => true,
            (_, Action::ProductsAdded | Action::ProductsRemoved) => false,
            _ => true,
        };
        supported.then_some(Self { subject, action })
    }
}

/// Routes domain events to [`StrapiSync`].
#[derive(Debug, Clone)]
pub struct SyncSubscriber {
    sync: StrapiSync,
}

impl SyncSubscriber {
    pub fn new(sync: StrapiSync) -> Self {
        Self { sync }
    }

    pub fn sync(&self) -> &StrapiSync {
        &self.sync
    }

    /// Handle one event. Unknown names return `Ok(None)`.
    pub async fn handle(&self, name: &str, data: &Value) -> Result<Option<StrapiResult>> {
        let Some(event) = SyncEvent::parse(name) else {
            debug!(event = name, "Ignoring unsubscribed event");
            return Ok(None);
        };
        debug!(event = name, "Handling domain event");
        self.dispatch(event, data).await.map(Some)
    }

    async fn dispatch(&self, event: SyncEvent, data: &Value) -> Result<StrapiResult> {
        let sync = &self.sync;
        match (event.subject, event.action) {
            (_, Action::Deleted) => {
                let id = entity_id(data)?;
                match event.subject {
                    Subject::Product => sync.delete_product(&id).await,
                    Subject::ProductVariant => sync.delete_product_variant(&id).await,
                    Subject::ProductType => sync.delete_product_type(&id).await,
                    Subject::Region => sync.delete_region(&id).await,
                    Subject::Collection => sync.delete_collection(&id).await,
                    Subject::Category => sync.delete_category(&id).await,
                    Subject::SalesChannel => sync.delete_sales_channel(&id).await,
                }
            }
            (Subject::Collection, Action::ProductsAdded | Action::ProductsRemoved) => {
                sync.update_products_within_collection(&products(data)).await
            }
            (Subject::Category, Action::ProductsAdded | Action::ProductsRemoved) => {
                sync.update_products_within_category(&products(data)).await
            }
            (Subject::Product, Action::Created) => sync.create_product(data).await,
            (Subject::Product, _) => sync.update_product(data).await,
            (Subject::ProductVariant, Action::Created) => sync.create_product_variant(data).await,
            (Subject::ProductVariant, _) => sync.update_product_variant(data).await,
            (Subject::ProductType, _) => sync.create_product_type(data).await,
            (Subject::Region, Action::Created) => sync.create_region(data).await,
            (Subject::Region, _) => sync.update_region(data).await,
            (Subject::Collection, Action::Created) => sync.create_collection(data).await,
            (Subject::Collection, _) => sync.update_collection(data).await,
            (Subject::Category, Action::Created) => sync.create_category(data).await,
            (Subject::Category, _) => sync.update_category(data).await,
            (Subject::SalesChannel, Action::Created) => sync.create_sales_channel(data).await,
            (Subject::SalesChannel, _) => sync.update_sales_channel(data).await,
        }
    }

    /// Consume events until the sender side closes.
    ///
    /// Failures are logged per event; the loop keeps going.
    pub async fn run(&self, mut events: mpsc::Receiver<(String, Value)>) {
        while let Some((name, data)) = events.recv().await {
            if let Err(e) = self.handle(&name, &data).await {
                warn!(event = %name, error = %e, "Failed to sync event");
            }
        }
    }
}

fn entity_id(data: &Value) -> Result<String> {
    data.get("id")
        .and_then(id_string)
        .ok_or_else(|| StrapiError::InvalidRequest("event payload has no id".to_string()))
}

fn products(data: &Value) -> Vec<Value> {
    data.get("products")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_name_parses() {
        for name in SyncEvent::NAMES {
            assert!(SyncEvent::parse(name).is_some(), "{name}");
        }
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        assert!(SyncEvent::parse("order.placed").is_none());
        assert!(SyncEvent::parse("product-type.updated").is_none());
        assert!(SyncEvent::parse("product.products-added").is_none());
        assert!(SyncEvent::parse("product").is_none());
    }

    #[test]
    fn test_parse_membership_event() {
        assert_eq!(
            SyncEvent::parse("product-category.products-removed"),
            Some(SyncEvent {
                subject: Subject::Category,
                action: Action::ProductsRemoved,
            })
        );
    }
}
