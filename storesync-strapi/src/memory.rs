//! In-process collaborators for tests and single-binary setups.

use crate::error::{Result, StrapiError};
use crate::traits::{EntityKind, EntityRepository, EventBus, Page, SeedCollection, SeedSource};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Entity repository over a map.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    entities: RwLock<HashMap<(EntityKind, String), Value>>,
    patches: RwLock<Vec<(EntityKind, String, Map<String, Value>)>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entity under its `id` field.
    pub fn insert(&self, kind: EntityKind, entity: Value) -> Result<()> {
        let id = entity
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| StrapiError::Repository("entity has no string id".to_string()))?
            .to_string();
        self.entities.write().insert((kind, id), entity);
        Ok(())
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<Value> {
        self.entities.read().get(&(kind, id.to_string())).cloned()
    }

    /// Every patch applied so far, oldest first.
    pub fn patches(&self) -> Vec<(EntityKind, String, Map<String, Value>)> {
        self.patches.read().clone()
    }
}

#[async_trait]
impl EntityRepository for InMemoryRepository {
    async fn retrieve(&self, kind: EntityKind, id: &str) -> Result<Value> {
        self.get(kind, id)
            .ok_or_else(|| StrapiError::Repository(format!("{kind} {id} not found")))
    }

    async fn update(&self, kind: EntityKind, id: &str, patch: Map<String, Value>) -> Result<Value> {
        let mut entities = self.entities.write();
        let entity = entities
            .get_mut(&(kind, id.to_string()))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| StrapiError::Repository(format!("{kind} {id} not found")))?;

        for (key, value) in &patch {
            entity.insert(key.clone(), value.clone());
        }
        let updated = Value::Object(entity.clone());
        drop(entities);

        self.patches.write().push((kind, id.to_string(), patch));
        Ok(updated)
    }
}

/// Seed source over fixed lists.
#[derive(Debug, Default)]
pub struct InMemorySeedSource {
    collections: HashMap<SeedCollection, Vec<Value>>,
}

impl InMemorySeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, collection: SeedCollection, items: Vec<Value>) -> Self {
        self.collections.insert(collection, items);
        self
    }
}

#[async_trait]
impl SeedSource for InMemorySeedSource {
    async fn list(&self, collection: SeedCollection, page: Page) -> Result<Vec<Value>> {
        Ok(self
            .collections
            .get(&collection)
            .map(|items| {
                items
                    .iter()
                    .skip(page.skip as usize)
                    .take(page.take as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Event bus that records what was emitted.
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    events: RwLock<Vec<(String, Value)>>,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.read().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events.read().iter().map(|(name, _)| name.clone()).collect()
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn emit(&self, name: &str, data: Value) -> Result<()> {
        self.events.write().push((name.to_string(), data));
        Ok(())
    }
}
