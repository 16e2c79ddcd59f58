//! Authoritative storage for type definitions and connector sync state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use ontograph_core::{
    ConnectorState, EntityTypeDef, EntityTypeId, Lifecycle, NewEntityType, NewRelationshipType,
    OntologyError, RelationshipTypeDef, RelationshipTypeId, Result,
};

/// Persistence for the ontology's type records.
///
/// Inserts enforce name uniqueness across active and deactivated records.
/// Saves are optimistic: they succeed only if the stored version still equals
/// `expected_version`, otherwise they fail with `Conflict`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert_entity_type(&self, new: NewEntityType) -> Result<EntityTypeDef>;

    async fn entity_type(&self, id: EntityTypeId) -> Result<Option<EntityTypeDef>>;

    async fn entity_type_by_name(&self, name: &str) -> Result<Option<EntityTypeDef>>;

    async fn save_entity_type(&self, def: &EntityTypeDef, expected_version: i64) -> Result<()>;

    /// Active records only, ordered by id.
    async fn list_entity_types(&self, offset: u64, limit: u64) -> Result<Vec<EntityTypeDef>>;

    async fn insert_relationship_type(
        &self,
        new: NewRelationshipType,
    ) -> Result<RelationshipTypeDef>;

    async fn relationship_type(&self, id: RelationshipTypeId)
        -> Result<Option<RelationshipTypeDef>>;

    async fn relationship_type_by_name(&self, name: &str) -> Result<Option<RelationshipTypeDef>>;

    async fn save_relationship_type(
        &self,
        def: &RelationshipTypeDef,
        expected_version: i64,
    ) -> Result<()>;

    /// Active records only, ordered by id.
    async fn list_relationship_types(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RelationshipTypeDef>>;

    async fn load_connector_state(&self, connector_id: &str) -> Result<Option<ConnectorState>>;

    async fn save_connector_state(&self, state: &ConnectorState) -> Result<()>;
}

// ── In-memory implementation ─────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    entity_types: Vec<EntityTypeDef>,
    relationship_types: Vec<RelationshipTypeDef>,
    connectors: HashMap<String, ConnectorState>,
    next_entity_id: i64,
    next_relationship_id: i64,
}

/// In-process metadata store for development and tests.
#[derive(Clone, Default)]
pub struct MemoryMetadataStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T: Clone>(items: impl Iterator<Item = T>, offset: u64, limit: u64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    items.skip(offset).take(limit).collect()
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert_entity_type(&self, new: NewEntityType) -> Result<EntityTypeDef> {
        let mut state = self.state.lock().await;
        if state.entity_types.iter().any(|t| t.name == new.name) {
            return Err(OntologyError::conflict("entity type", new.name));
        }

        state.next_entity_id += 1;
        let def = EntityTypeDef {
            id: EntityTypeId(state.next_entity_id),
            name: new.name,
            label: new.label,
            description: new.description,
            icon: new.icon,
            color: new.color,
            property_schema: new.property_schema,
            version: 1,
            lifecycle: Lifecycle::Active,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.entity_types.push(def.clone());
        Ok(def)
    }

    async fn entity_type(&self, id: EntityTypeId) -> Result<Option<EntityTypeDef>> {
        let state = self.state.lock().await;
        Ok(state.entity_types.iter().find(|t| t.id == id).cloned())
    }

    async fn entity_type_by_name(&self, name: &str) -> Result<Option<EntityTypeDef>> {
        let state = self.state.lock().await;
        Ok(state.entity_types.iter().find(|t| t.name == name).cloned())
    }

    async fn save_entity_type(&self, def: &EntityTypeDef, expected_version: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .entity_types
            .iter_mut()
            .find(|t| t.id == def.id)
            .ok_or_else(|| OntologyError::not_found("entity type", def.id))?;
        if stored.version != expected_version {
            return Err(OntologyError::conflict("entity type version", def.name.clone()));
        }
        *stored = def.clone();
        Ok(())
    }

    async fn list_entity_types(&self, offset: u64, limit: u64) -> Result<Vec<EntityTypeDef>> {
        let state = self.state.lock().await;
        let active = state
            .entity_types
            .iter()
            .filter(|t| t.lifecycle.is_active())
            .cloned();
        Ok(page(active, offset, limit))
    }

    async fn insert_relationship_type(
        &self,
        new: NewRelationshipType,
    ) -> Result<RelationshipTypeDef> {
        let mut state = self.state.lock().await;
        if state.relationship_types.iter().any(|t| t.name == new.name) {
            return Err(OntologyError::conflict("relationship type", new.name));
        }

        state.next_relationship_id += 1;
        let def = RelationshipTypeDef {
            id: RelationshipTypeId(state.next_relationship_id),
            name: new.name,
            label: new.label,
            description: new.description,
            from_type: new.from_type,
            to_type: new.to_type,
            property_schema: new.property_schema,
            directed: new.directed,
            version: 1,
            lifecycle: Lifecycle::Active,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.relationship_types.push(def.clone());
        Ok(def)
    }

    async fn relationship_type(
        &self,
        id: RelationshipTypeId,
    ) -> Result<Option<RelationshipTypeDef>> {
        let state = self.state.lock().await;
        Ok(state.relationship_types.iter().find(|t| t.id == id).cloned())
    }

    async fn relationship_type_by_name(&self, name: &str) -> Result<Option<RelationshipTypeDef>> {
        let state = self.state.lock().await;
        Ok(state
            .relationship_types
            .iter()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn save_relationship_type(
        &self,
        def: &RelationshipTypeDef,
        expected_version: i64,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .relationship_types
            .iter_mut()
            .find(|t| t.id == def.id)
            .ok_or_else(|| OntologyError::not_found("relationship type", def.id))?;
        if stored.version != expected_version {
            return Err(OntologyError::conflict(
                "relationship type version",
                def.name.clone(),
            ));
        }
        *stored = def.clone();
        Ok(())
    }

    async fn list_relationship_types(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RelationshipTypeDef>> {
        let state = self.state.lock().await;
        let active = state
            .relationship_types
            .iter()
            .filter(|t| t.lifecycle.is_active())
            .cloned();
        Ok(page(active, offset, limit))
    }

    async fn load_connector_state(&self, connector_id: &str) -> Result<Option<ConnectorState>> {
        Ok(self.state.lock().await.connectors.get(connector_id).cloned())
    }

    async fn save_connector_state(&self, state: &ConnectorState) -> Result<()> {
        self.state
            .lock()
            .await
            .connectors
            .insert(state.connector_id.clone(), state.clone());
        Ok(())
    }
}
