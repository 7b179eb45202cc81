//! Collaborator seams.
//!
//! The engine never owns the commerce data. It reads and patches entities
//! through [`EntityRepository`], pages through seed data with [`SeedSource`],
//! and announces CMS signals on an [`EventBus`].

use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

/// Commerce entity types that accept inbound CMS changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Product,
    ProductVariant,
    Region,
}

impl EntityKind {
    /// Name used by CMS signals (`product`, `productVariant`, `region`).
    pub fn signal_name(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::ProductVariant => "productVariant",
            EntityKind::Region => "region",
        }
    }

    /// Parse a signal type name.
    pub fn from_signal_name(name: &str) -> Option<Self> {
        match name {
            "product" => Some(EntityKind::Product),
            "productVariant" => Some(EntityKind::ProductVariant),
            "region" => Some(EntityKind::Region),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.signal_name())
    }
}

/// Read and patch access to commerce entities.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Load one entity.
    async fn retrieve(&self, kind: EntityKind, id: &str) -> Result<Value>;

    /// Apply `patch` to one entity and return the updated record.
    async fn update(&self, kind: EntityKind, id: &str, patch: Map<String, Value>) -> Result<Value>;
}

/// Collections included in a seed export, in response order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeedCollection {
    ProductCollections,
    Products,
    Regions,
    PaymentProviders,
    FulfillmentProviders,
    ShippingOptions,
    ShippingProfiles,
    Stores,
}

impl SeedCollection {
    pub const ALL: [SeedCollection; 8] = [
        SeedCollection::ProductCollections,
        SeedCollection::Products,
        SeedCollection::Regions,
        SeedCollection::PaymentProviders,
        SeedCollection::FulfillmentProviders,
        SeedCollection::ShippingOptions,
        SeedCollection::ShippingProfiles,
        SeedCollection::Stores,
    ];

    /// Key in the seed response.
    pub fn key(&self) -> &'static str {
        match self {
            SeedCollection::ProductCollections => "productCollections",
            SeedCollection::Products => "products",
            SeedCollection::Regions => "regions",
            SeedCollection::PaymentProviders => "paymentProviders",
            SeedCollection::FulfillmentProviders => "fulfillmentProviders",
            SeedCollection::ShippingOptions => "shippingOptions",
            SeedCollection::ShippingProfiles => "shippingProfiles",
            SeedCollection::Stores => "stores",
        }
    }

    /// Whether the response reports `hasMore` for this collection.
    pub fn reports_has_more(&self) -> bool {
        !matches!(self, SeedCollection::Stores)
    }
}

/// A page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub take: u64,
}

impl Page {
    /// Window for 1-based `page_number` of size `limit`.
    pub fn numbered(page_number: u64, limit: u64) -> Self {
        Self {
            skip: page_number.saturating_sub(1) * limit,
            take: limit,
        }
    }
}

/// Paged access to seed data.
#[async_trait]
pub trait SeedSource: Send + Sync {
    async fn list(&self, collection: SeedCollection, page: Page) -> Result<Vec<Value>>;
}

/// Named event sink.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn emit(&self, name: &str, data: Value) -> Result<()>;
}
