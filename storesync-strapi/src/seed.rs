//! Paginated bulk export used by the CMS to seed itself.

use crate::error::Result;
use crate::traits::{Page, SeedCollection, SeedSource};
use crate::translate::{ids_to_medusa_ids, seed_product};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Page metadata of a seed response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedMeta {
    pub page_number: u64,
    pub page_limit: u64,
    /// Per collection: whether the page came back full
    pub has_more: BTreeMap<&'static str, bool>,
}

/// One seed page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedPage {
    pub meta: SeedMeta,
    pub data: Value,
}

/// Builds seed pages from a [`SeedSource`].
#[derive(Clone)]
pub struct SeedExporter {
    source: Arc<dyn SeedSource>,
    page_limit: u64,
}

impl SeedExporter {
    pub fn new(source: Arc<dyn SeedSource>, page_limit: u64) -> Self {
        Self {
            source,
            page_limit: page_limit.max(1),
        }
    }

    pub fn page_limit(&self) -> u64 {
        self.page_limit
    }

    /// Export 1-based page `page_number` of every seed collection.
    ///
    /// `hasMore` is true when a collection filled the page. A last page
    /// that is exactly full therefore reports more, and the caller reads
    /// one extra, empty page.
    pub async fn export(&self, page_number: u64) -> Result<SeedPage> {
        let page_number = page_number.max(1);
        let page = Page::numbered(page_number, self.page_limit);
        info!(page_number, page_limit = self.page_limit, "Building seed page");

        let mut data = Map::new();
        let mut has_more = BTreeMap::new();

        for collection in SeedCollection::ALL {
            let mut items = self.source.list(collection, page).await?;
            if collection.reports_has_more() {
                has_more.insert(collection.key(), items.len() as u64 == self.page_limit);
            }
            if collection == SeedCollection::Products {
                items = items.iter().map(seed_product).collect();
            }
            data.insert(collection.key().to_string(), Value::Array(items));
        }

        Ok(SeedPage {
            meta: SeedMeta {
                page_number,
                page_limit: self.page_limit,
                has_more,
            },
            data: ids_to_medusa_ids(&Value::Object(data)),
        })
    }
}

impl std::fmt::Debug for SeedExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedExporter")
            .field("page_limit", &self.page_limit)
            .finish()
    }
}
