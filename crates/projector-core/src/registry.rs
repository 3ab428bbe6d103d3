//! Device registry interface exposed by the hub
//!
//! The hub owns entity state. The driver registers entity definitions,
//! pushes partial attribute maps and reads back the last known state.

use crate::entity::EntityDefinition;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

/// Partial or complete attribute map of an entity
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Status codes returned to the hub for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    ServerError,
    BadRequest,
    NotImplemented,
    Conflict,
}

/// Stored state of one entity
#[derive(Debug, Clone, Serialize)]
pub struct EntityState {
    pub entity_id: String,
    pub attributes: Attributes,
}

/// Entity storage and attribute sink
pub trait EntityRegistry: Send + Sync {
    /// Add or replace an entity definition
    fn register_entity(&self, definition: EntityDefinition);

    fn contains(&self, entity_id: &str) -> bool;

    /// Merge `attributes` into the entity. Returns false if the entity is unknown.
    fn update_attributes(&self, entity_id: &str, attributes: Attributes) -> bool;

    fn get_states(&self) -> Vec<EntityState>;

    /// Current attributes of one entity
    fn attributes(&self, entity_id: &str) -> Option<Attributes> {
        self.get_states()
            .into_iter()
            .find(|state| state.entity_id == entity_id)
            .map(|state| state.attributes)
    }
}

/// Registry events
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    EntityRegistered { entity_id: String },
    AttributesUpdated {
        entity_id: String,
        attributes: Attributes,
    },
}

struct StoredEntity {
    definition: EntityDefinition,
    attributes: Attributes,
}

/// Process-local registry used by the standalone binary and tests
pub struct InMemoryRegistry {
    entities: DashMap<String, StoredEntity>,
    updates: AtomicUsize,
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            entities: DashMap::new(),
            updates: AtomicUsize::new(0),
            event_tx,
        }
    }

    /// Subscribe to registry events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }

    /// Number of successful attribute pushes so far
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Definition of a registered entity
    #[must_use]
    pub fn definition(&self, entity_id: &str) -> Option<EntityDefinition> {
        self.entities
            .get(entity_id)
            .map(|entry| entry.definition.clone())
    }
}

impl EntityRegistry for InMemoryRegistry {
    fn register_entity(&self, definition: EntityDefinition) {
        let entity_id = definition.id.clone();
        let attributes = definition.attributes.clone();
        self.entities.insert(
            entity_id.clone(),
            StoredEntity {
                definition,
                attributes,
            },
        );
        tracing::debug!("Registered entity {}", entity_id);
        let _ = self
            .event_tx
            .send(RegistryEvent::EntityRegistered { entity_id });
    }

    fn contains(&self, entity_id: &str) -> bool {
        self.entities.contains_key(entity_id)
    }

    fn update_attributes(&self, entity_id: &str, attributes: Attributes) -> bool {
        let Some(mut entry) = self.entities.get_mut(entity_id) else {
            return false;
        };
        for (key, value) in &attributes {
            entry.attributes.insert(key.clone(), value.clone());
        }
        drop(entry);

        self.updates.fetch_add(1, Ordering::SeqCst);
        let _ = self.event_tx.send(RegistryEvent::AttributesUpdated {
            entity_id: entity_id.to_string(),
            attributes,
        });
        true
    }

    fn get_states(&self) -> Vec<EntityState> {
        self.entities
            .iter()
            .map(|entry| EntityState {
                entity_id: entry.key().clone(),
                attributes: entry.attributes.clone(),
            })
            .collect()
    }

    fn attributes(&self, entity_id: &str) -> Option<Attributes> {
        self.entities
            .get(entity_id)
            .map(|entry| entry.attributes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity;
    use serde_json::json;

    #[test]
    fn test_update_unknown_entity() {
        let registry = InMemoryRegistry::new();
        let mut attributes = Attributes::new();
        attributes.insert("state".into(), json!("ON"));
        assert!(!registry.update_attributes("missing", attributes));
        assert_eq!(registry.update_count(), 0);
    }

    #[test]
    fn test_update_merges_attributes() {
        let registry = InMemoryRegistry::new();
        registry.register_entity(entity::media_player("VPL-1", "Sony VPL"));

        let mut attributes = Attributes::new();
        attributes.insert("muted".into(), json!(true));
        assert!(registry.update_attributes("VPL-1", attributes));

        let stored = registry.attributes("VPL-1").unwrap();
        assert_eq!(stored["muted"], json!(true));
        assert_eq!(stored["state"], json!("UNKNOWN"));
        assert_eq!(registry.update_count(), 1);
    }

    #[test]
    fn test_status_code_serialization() {
        assert_eq!(
            serde_json::to_string(&StatusCode::NotImplemented).unwrap(),
            "\"NOT_IMPLEMENTED\""
        );
    }
}
