//! Commerce-to-CMS propagation.
//!
//! Every write follows the same path: check the ignore ledger, translate,
//! send, then mark the entity as just written by the commerce side so the
//! CMS echo is suppressed.

use crate::error::{Result, StrapiError};
use crate::ledger::{IgnoreLedger, Side};
use crate::session::Credentials;
use crate::transport::{DEFAULT_LOOKUP_QUERY, SendRequest, StrapiClient, StrapiResult, id_string};
use crate::translate::{adjust_product_keys, variant_for_create};
use futures::future::try_join_all;
use serde_json::Value;
use tracing::{error, info, warn};

/// CMS resource type names.
pub mod resource {
    pub const PRODUCTS: &str = "products";
    pub const PRODUCT_VARIANTS: &str = "product-variants";
    pub const PRODUCT_TYPES: &str = "product-types";
    pub const PRODUCT_COLLECTIONS: &str = "product-collections";
    pub const PRODUCT_CATEGORIES: &str = "product-categories";
    pub const PRODUCT_METAFIELDS: &str = "product-metafields";
    pub const REGIONS: &str = "regions";
    pub const SALES_CHANNELS: &str = "sales-channels";
    pub const IMAGES: &str = "images";
}

/// Region fields the CMS stores; updates touching none of them are skipped.
const REGION_UPDATE_FIELDS: [&str; 5] = [
    "name",
    "currency_code",
    "countries",
    "payment_providers",
    "fulfillment_providers",
];

fn entity_id(entity: &Value) -> Result<String> {
    entity
        .get("id")
        .and_then(id_string)
        .ok_or_else(|| StrapiError::InvalidRequest("entity has no id".to_string()))
}

fn require_object(entity: &Value) -> Result<()> {
    if entity.is_object() {
        Ok(())
    } else {
        Err(StrapiError::InvalidRequest("entity must be an object".to_string()))
    }
}

/// Whether `data` touches any of `fields`, either as a key or through its
/// `fields` list.
fn contains_any_field(data: &Value, fields: &[&str]) -> bool {
    let Some(object) = data.as_object().filter(|o| !o.is_empty()) else {
        return false;
    };
    let listed = object
        .get("fields")
        .and_then(Value::as_array)
        .is_some_and(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .any(|f| fields.contains(&f))
        });
    listed || object.keys().any(|k| fields.contains(&k.as_str()))
}

/// Entity-level create, update and delete against the CMS.
#[derive(Debug, Clone)]
pub struct StrapiSync {
    client: StrapiClient,
    ledger: IgnoreLedger,
    creds: Credentials,
}

impl StrapiSync {
    /// Orchestrator writing as the service account `creds`.
    pub fn new(client: StrapiClient, ledger: IgnoreLedger, creds: Credentials) -> Self {
        Self {
            client,
            ledger,
            creds,
        }
    }

    pub fn client(&self) -> &StrapiClient {
        &self.client
    }

    pub fn ledger(&self) -> &IgnoreLedger {
        &self.ledger
    }

    /// Use other credentials for subsequent writes.
    pub fn with_credentials(&self, creds: Credentials) -> Self {
        Self {
            creds,
            ..self.clone()
        }
    }

    async fn is_echo(&self, id: &str) -> Result<bool> {
        self.ledger.is_ignored(id, Side::Strapi).await
    }

    async fn mark_written(&self, id: &str, result: &StrapiResult) -> Result<()> {
        if result.is_success() {
            self.ledger.mark(id, Side::Medusa).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Generic operations
    // ------------------------------------------------------------------

    /// Create `entity` unless it already exists (status `302`).
    pub async fn create_entity(&self, resource: &str, entity: &Value) -> Result<StrapiResult> {
        require_object(entity)?;
        let result = self.client.create_entry(resource, entity, &self.creds).await;

        if let Some(id) = entity.get("id").and_then(id_string) {
            self.mark_written(&id, &result).await?;
        }
        info!(resource, status = result.status, "Created CMS entry");
        Ok(result)
    }

    /// Update the entry for `entity.id` unless the change is a CMS echo.
    pub async fn update_entity(&self, resource: &str, entity: &Value) -> Result<StrapiResult> {
        let id = entity_id(entity)?;
        if self.is_echo(&id).await? {
            info!(resource, id = %id, "Change originated in the CMS, ignoring");
            return Ok(StrapiResult::skipped());
        }
        self.write_update(resource, &id, entity).await
    }

    /// Delete the entry for `id` unless the change is a CMS echo.
    pub async fn delete_entity(&self, resource: &str, id: &str) -> Result<StrapiResult> {
        if self.is_echo(id).await? {
            info!(resource, id, "Deletion originated in the CMS, ignoring");
            return Ok(StrapiResult::skipped());
        }
        let result = self.client.delete_entry(resource, id, &self.creds).await;
        self.mark_written(id, &result).await?;
        Ok(result)
    }

    async fn write_update(&self, resource: &str, id: &str, entity: &Value) -> Result<StrapiResult> {
        let result = self.client.update_entry(resource, entity, &self.creds).await;
        self.mark_written(id, &result).await?;
        info!(resource, id, status = result.status, "Updated CMS entry");
        Ok(result)
    }

    /// Whether the CMS knows `resource`.
    pub async fn check_type(&self, resource: &str) -> bool {
        match self.client.send(&SendRequest::get(resource), &self.creds).await {
            Ok(result) => result.is_success(),
            Err(e) => {
                error!(resource, error = %e, "Type not found in CMS");
                false
            }
        }
    }

    /// Soft lookup of entries; `404` when the call fails.
    ///
    /// Without an id or query, only `id` and `medusa_id` are requested.
    pub async fn get_entities(
        &self,
        resource: &str,
        id: Option<&str>,
        query: Option<&str>,
    ) -> StrapiResult {
        let mut request = SendRequest::get(resource);
        request.id = id.map(str::to_string);
        request.query = match (query, id) {
            (Some(query), _) => Some(query.to_string()),
            (None, Some(_)) => None,
            (None, None) => Some(DEFAULT_LOOKUP_QUERY.to_string()),
        };

        match self.client.send(&request, &self.creds).await {
            Ok(result) => StrapiResult {
                id: None,
                medusa_id: None,
                query: None,
                ..result
            },
            Err(e) => {
                error!(resource, id = id.unwrap_or("any"), error = %e, "Unable to retrieve entries");
                StrapiResult::with_status(404)
            }
        }
    }

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    pub async fn create_product(&self, product: &Value) -> Result<StrapiResult> {
        require_object(product)?;
        self.create_entity(resource::PRODUCTS, &adjust_product_keys(product))
            .await
    }

    /// Update a product; a non-200 answer is retried once.
    pub async fn update_product(&self, product: &Value) -> Result<StrapiResult> {
        let id = entity_id(product)?;
        if self.is_echo(&id).await? {
            info!(id = %id, "Product change originated in the CMS, ignoring");
            return Ok(StrapiResult::skipped());
        }

        let adjusted = adjust_product_keys(product);
        let result = self.write_update(resource::PRODUCTS, &id, &adjusted).await?;
        if result.status == 200 {
            return Ok(result);
        }
        warn!(id = %id, status = result.status, "Product update failed, retrying");
        self.write_update(resource::PRODUCTS, &id, &adjusted).await
    }

    pub async fn delete_product(&self, id: &str) -> Result<StrapiResult> {
        self.delete_entity(resource::PRODUCTS, id).await
    }

    /// Create one image entry per product image other than the thumbnail.
    pub async fn create_image_assets(&self, product: &Value) -> Result<StrapiResult> {
        let Some(images) = product.get("images").and_then(Value::as_array) else {
            return Ok(StrapiResult::skipped());
        };
        let thumbnail = product.get("thumbnail");

        let uploads = images
            .iter()
            .filter(|image| image.get("url") != thumbnail)
            .map(|image| self.create_entity(resource::IMAGES, image));
        let results = try_join_all(uploads).await?;

        Ok(StrapiResult {
            status: 200,
            data: Some(Value::Array(
                results
                    .into_iter()
                    .map(|r| r.data.unwrap_or(Value::Null))
                    .collect(),
            )),
            ..StrapiResult::default()
        })
    }

    // ------------------------------------------------------------------
    // Product types, variants and metafields
    // ------------------------------------------------------------------

    pub async fn create_product_type(&self, product_type: &Value) -> Result<StrapiResult> {
        self.create_entity(resource::PRODUCT_TYPES, product_type).await
    }

    pub async fn delete_product_type(&self, id: &str) -> Result<StrapiResult> {
        self.delete_entity(resource::PRODUCT_TYPES, id).await
    }

    /// Create a variant with `prices` as `money_amount` and `options` as
    /// `product_option_value`.
    pub async fn create_product_variant(&self, variant: &Value) -> Result<StrapiResult> {
        require_object(variant)?;
        self.create_entity(resource::PRODUCT_VARIANTS, &variant_for_create(variant))
            .await
    }

    pub async fn update_product_variant(&self, variant: &Value) -> Result<StrapiResult> {
        self.update_entity(resource::PRODUCT_VARIANTS, variant).await
    }

    pub async fn delete_product_variant(&self, id: &str) -> Result<StrapiResult> {
        self.delete_entity(resource::PRODUCT_VARIANTS, id).await
    }

    /// Metafields share the product id; skipped when the CMS lacks the type.
    pub async fn create_product_metafield(&self, product: &Value) -> Result<StrapiResult> {
        if !self.check_type(resource::PRODUCT_METAFIELDS).await {
            return Ok(StrapiResult::skipped());
        }
        self.create_entity(resource::PRODUCT_METAFIELDS, product).await
    }

    pub async fn update_product_metafield(&self, product: &Value) -> Result<StrapiResult> {
        if !self.check_type(resource::PRODUCT_METAFIELDS).await {
            return Ok(StrapiResult::skipped());
        }
        let id = entity_id(product)?;
        let mut data = product.clone();
        if let Some(object) = data.as_object_mut() {
            object.insert("medusa_id".to_string(), Value::String(id));
        }
        self.update_entity(resource::PRODUCT_METAFIELDS, &data).await
    }

    pub async fn delete_product_metafield(&self, id: &str) -> Result<StrapiResult> {
        self.delete_entity(resource::PRODUCT_METAFIELDS, id).await
    }

    // ------------------------------------------------------------------
    // Regions and sales channels
    // ------------------------------------------------------------------

    pub async fn create_region(&self, region: &Value) -> Result<StrapiResult> {
        self.create_entity(resource::REGIONS, region).await
    }

    /// Update a region when the patch touches a field the CMS stores.
    pub async fn update_region(&self, region: &Value) -> Result<StrapiResult> {
        if !contains_any_field(region, &REGION_UPDATE_FIELDS) {
            return Ok(StrapiResult::skipped());
        }
        self.update_entity(resource::REGIONS, region).await
    }

    pub async fn delete_region(&self, id: &str) -> Result<StrapiResult> {
        self.delete_entity(resource::REGIONS, id).await
    }

    pub async fn create_sales_channel(&self, channel: &Value) -> Result<StrapiResult> {
        self.create_entity(resource::SALES_CHANNELS, channel).await
    }

    /// Update a sales channel, creating it when the update is not a 200.
    pub async fn update_sales_channel(&self, channel: &Value) -> Result<StrapiResult> {
        let id = entity_id(channel)?;
        if self.is_echo(&id).await? {
            return Ok(StrapiResult::skipped());
        }

        let result = self.write_update(resource::SALES_CHANNELS, &id, channel).await?;
        if result.status == 200 {
            return Ok(result);
        }
        self.create_sales_channel(channel).await
    }

    pub async fn delete_sales_channel(&self, id: &str) -> Result<StrapiResult> {
        self.delete_entity(resource::SALES_CHANNELS, id).await
    }

    // ------------------------------------------------------------------
    // Collections and categories
    // ------------------------------------------------------------------

    pub async fn create_collection(&self, collection: &Value) -> Result<StrapiResult> {
        self.create_entity(resource::PRODUCT_COLLECTIONS, collection).await
    }

    pub async fn update_collection(&self, collection: &Value) -> Result<StrapiResult> {
        self.update_entity(resource::PRODUCT_COLLECTIONS, collection).await
    }

    pub async fn delete_collection(&self, id: &str) -> Result<StrapiResult> {
        self.delete_entity(resource::PRODUCT_COLLECTIONS, id).await
    }

    pub async fn create_category(&self, category: &Value) -> Result<StrapiResult> {
        self.create_entity(resource::PRODUCT_CATEGORIES, category).await
    }

    pub async fn update_category(&self, category: &Value) -> Result<StrapiResult> {
        self.update_entity(resource::PRODUCT_CATEGORIES, category).await
    }

    pub async fn delete_category(&self, id: &str) -> Result<StrapiResult> {
        self.delete_entity(resource::PRODUCT_CATEGORIES, id).await
    }

    /// Push products whose collection membership changed.
    pub async fn update_products_within_collection(&self, products: &[Value]) -> Result<StrapiResult> {
        self.update_members(products, "collection").await
    }

    /// Push products whose category membership changed.
    pub async fn update_products_within_category(&self, products: &[Value]) -> Result<StrapiResult> {
        self.update_members(products, "category").await
    }

    // Sequential: the CMS deadlocks on concurrent product writes.
    // A failing product is logged and the rest still go through.
    async fn update_members(&self, products: &[Value], group: &str) -> Result<StrapiResult> {
        for product in products {
            let Some(id) = product.get("id").and_then(id_string) else {
                continue;
            };
            if let Err(e) = self.update_member(&id, product, group).await {
                warn!(id = %id, group, error = %e, "Membership update failed, continuing");
            }
        }
        Ok(StrapiResult::with_status(200))
    }

    async fn update_member(&self, id: &str, product: &Value, group: &str) -> Result<()> {
        if self.is_echo(id).await? {
            info!(id, group, "CMS just changed this membership, ignoring");
            return Ok(());
        }
        self.write_update(resource::PRODUCTS, id, &adjust_product_keys(product))
            .await?;
        Ok(())
    }
}
