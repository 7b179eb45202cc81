//! CMS-to-commerce propagation.

use crate::error::{Result, StrapiError};
use crate::ledger::{IgnoreLedger, Side};
use crate::traits::{EntityKind, EntityRepository};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Outcome of applying one inbound CMS change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "entity", rename_all = "snake_case")]
pub enum ReverseSync {
    /// The change is the echo of a commerce-side write
    Skipped,
    /// Nothing differed; carries the stored entity
    Unchanged(Value),
    /// The patch was applied; carries the updated entity
    Updated(Value),
}

impl ReverseSync {
    /// The entity carried by the outcome, if any.
    pub fn entity(&self) -> Option<&Value> {
        match self {
            ReverseSync::Skipped => None,
            ReverseSync::Unchanged(entity) | ReverseSync::Updated(entity) => Some(entity),
        }
    }
}

/// Differences in top-level scalar fields.
///
/// Objects, arrays, `id` and `medusa_id` are never compared. A field
/// missing from `stored` compares equal to `null`.
pub fn scalar_diff(stored: &Value, incoming: &Value) -> Map<String, Value> {
    let mut patch = Map::new();
    let Some(incoming) = incoming.as_object() else {
        return patch;
    };

    for (key, value) in incoming {
        if value.is_object() || value.is_array() || key == "id" || key == "medusa_id" {
            continue;
        }
        let current = stored.get(key).unwrap_or(&Value::Null);
        if current != value {
            patch.insert(key.clone(), value.clone());
        }
    }
    patch
}

fn field_diff(stored: &Value, incoming: &Value, field: &str) -> Map<String, Value> {
    let mut patch = Map::new();
    let value = incoming.get(field).unwrap_or(&Value::Null);
    if stored.get(field).unwrap_or(&Value::Null) != value {
        patch.insert(field.to_string(), value.clone());
    }
    patch
}

fn normalized_handle(entity: &Value) -> String {
    entity
        .get("handle")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Applies CMS edits to commerce entities.
#[derive(Clone)]
pub struct MedusaSync {
    repository: Arc<dyn EntityRepository>,
    ledger: IgnoreLedger,
}

impl MedusaSync {
    pub fn new(repository: Arc<dyn EntityRepository>, ledger: IgnoreLedger) -> Self {
        Self { repository, ledger }
    }

    /// Apply an inbound change of `kind` to entity `id`.
    pub async fn apply(&self, kind: EntityKind, id: &str, entry: &Value) -> Result<ReverseSync> {
        match kind {
            EntityKind::Product => self.update_product(id, entry).await,
            EntityKind::ProductVariant => self.update_variant(id, entry).await,
            EntityKind::Region => self.update_region(id, entry).await,
        }
    }

    /// Product: every differing top-level scalar field.
    ///
    /// Fails with a synchronization error when the handles disagree.
    pub async fn update_product(&self, id: &str, entry: &Value) -> Result<ReverseSync> {
        if self.is_echo(id).await? {
            return Ok(ReverseSync::Skipped);
        }

        let product = self.repository.retrieve(EntityKind::Product, id).await?;
        if normalized_handle(&product) != normalized_handle(entry) {
            error!(id, "Product handle differs between commerce and CMS");
            return Err(StrapiError::Synchronization(
                "handles mismatched, please resync with the CMS after dumping its database"
                    .to_string(),
            ));
        }

        debug!(id, stored = %product, incoming = %entry, "Diffing product");
        let patch = scalar_diff(&product, entry);
        self.apply_patch(EntityKind::Product, id, product, patch).await
    }

    /// Variant: `title` only.
    pub async fn update_variant(&self, id: &str, entry: &Value) -> Result<ReverseSync> {
        if self.is_echo(id).await? {
            return Ok(ReverseSync::Skipped);
        }
        let variant = self.repository.retrieve(EntityKind::ProductVariant, id).await?;
        let patch = field_diff(&variant, entry, "title");
        self.apply_patch(EntityKind::ProductVariant, id, variant, patch).await
    }

    /// Region: `name` only.
    pub async fn update_region(&self, id: &str, entry: &Value) -> Result<ReverseSync> {
        if self.is_echo(id).await? {
            return Ok(ReverseSync::Skipped);
        }
        let region = self.repository.retrieve(EntityKind::Region, id).await?;
        let patch = field_diff(&region, entry, "name");
        self.apply_patch(EntityKind::Region, id, region, patch).await
    }

    async fn is_echo(&self, id: &str) -> Result<bool> {
        let ignored = self.ledger.is_ignored(id, Side::Medusa).await?;
        if ignored {
            info!(id, "Change originated on the commerce side, ignoring");
        }
        Ok(ignored)
    }

    async fn apply_patch(
        &self,
        kind: EntityKind,
        id: &str,
        stored: Value,
        patch: Map<String, Value>,
    ) -> Result<ReverseSync> {
        if patch.is_empty() {
            return Ok(ReverseSync::Unchanged(stored));
        }

        info!(kind = %kind, id, fields = ?patch.keys().collect::<Vec<_>>(), "Applying CMS change");
        let updated = self.repository.update(kind, id, patch).await?;
        self.ledger.mark(id, Side::Strapi).await?;
        Ok(ReverseSync::Updated(updated))
    }
}

impl std::fmt::Debug for MedusaSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MedusaSync").field("ledger", &self.ledger).finish()
    }
}
