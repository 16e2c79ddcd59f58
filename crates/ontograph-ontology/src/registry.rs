//! Registry of entity and relationship type definitions.
//!
//! Writes go straight to the [`MetadataStore`]. Listings are read through the
//! cache under a per-scope generation token: every write drops the token, so
//! all cached pages of that scope become unreachable at once regardless of
//! their `(offset, limit)`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use ontograph_core::{
    EntityTypeDef, EntityTypeId, EntityTypePatch, Identifier, Lifecycle, NewEntityType,
    NewRelationshipType, OntologyError, RelationshipTypeDef, RelationshipTypeId,
    RelationshipTypePatch, Result,
};
use ontograph_graph::GraphStore;

use crate::cache::Cache;
use crate::metadata::MetadataStore;

/// How long a cached listing page stays valid.
pub const LISTING_TTL: Duration = Duration::from_secs(300);

const CACHE_PREFIX: &str = "ontograph";
const ENTITY_SCOPE: &str = "entity_types";
const RELATIONSHIP_SCOPE: &str = "relationship_types";

pub struct TypeRegistry {
    store: Arc<dyn MetadataStore>,
    graph: Arc<dyn GraphStore>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl TypeRegistry {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        graph: Arc<dyn GraphStore>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            store,
            graph,
            cache,
            ttl: LISTING_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    // ── Entity types ─────────────────────────────────────────────

    /// Register a new entity type.
    ///
    /// The name doubles as the graph label, so it must be an identifier. A
    /// uniqueness constraint on instance ids is requested best-effort.
    pub async fn create_entity_type(&self, mut new: NewEntityType) -> Result<EntityTypeDef> {
        let label = Identifier::parse(&new.name)?;
        if new.label.is_empty() {
            new.label = new.name.clone();
        }

        let def = self.store.insert_entity_type(new).await?;
        self.invalidate(ENTITY_SCOPE).await;

        if let Err(e) = self.graph.ensure_uniqueness_constraint(&label).await {
            tracing::warn!(
                entity_type = %def.name,
                error = %e,
                "Failed to create uniqueness constraint"
            );
        }

        tracing::info!(entity_type = %def.name, id = %def.id, "Created entity type");
        Ok(def)
    }

    pub async fn get_entity_type(&self, id: EntityTypeId) -> Result<EntityTypeDef> {
        self.store
            .entity_type(id)
            .await?
            .ok_or_else(|| OntologyError::not_found("entity type", id))
    }

    /// Look up an active entity type by name. Deactivated and unknown names
    /// are both `NotFound`.
    pub async fn resolve_entity_type(&self, name: &str) -> Result<EntityTypeDef> {
        match self.store.entity_type_by_name(name).await? {
            Some(def) if def.lifecycle.is_active() => Ok(def),
            _ => Err(OntologyError::not_found("entity type", name)),
        }
    }

    /// Apply a partial update and bump the version. The lifecycle is left as
    /// it is, so updating a deactivated type does not bring it back.
    pub async fn update_entity_type(
        &self,
        id: EntityTypeId,
        patch: EntityTypePatch,
    ) -> Result<EntityTypeDef> {
        let mut def = self.get_entity_type(id).await?;
        let expected = def.version;

        patch.apply(&mut def);
        def.version += 1;
        def.updated_at = Some(Utc::now());

        self.store.save_entity_type(&def, expected).await?;
        self.invalidate(ENTITY_SCOPE).await;

        tracing::info!(entity_type = %def.name, version = def.version, "Updated entity type");
        Ok(def)
    }

    /// Soft-delete an entity type. Existing graph instances are untouched.
    pub async fn deactivate_entity_type(&self, id: EntityTypeId) -> Result<EntityTypeDef> {
        let mut def = self.get_entity_type(id).await?;
        if def.lifecycle == Lifecycle::Deactivated {
            return Ok(def);
        }

        def.lifecycle = Lifecycle::Deactivated;
        def.updated_at = Some(Utc::now());
        self.store.save_entity_type(&def, def.version).await?;
        self.invalidate(ENTITY_SCOPE).await;

        tracing::info!(entity_type = %def.name, "Deactivated entity type");
        Ok(def)
    }

    /// Active entity types, ordered by id.
    pub async fn list_entity_types(&self, offset: u64, limit: u64) -> Result<Vec<EntityTypeDef>> {
        let key = self.listing_key(ENTITY_SCOPE, offset, limit).await;
        if let Some(hit) = self.cached::<Vec<EntityTypeDef>>(&key).await {
            return Ok(hit);
        }

        let page = self.store.list_entity_types(offset, limit).await?;
        self.store_cached(&key, &page).await;
        Ok(page)
    }

    // ── Relationship types ───────────────────────────────────────

    /// Register a relationship type between two active entity types.
    pub async fn create_relationship_type(
        &self,
        mut new: NewRelationshipType,
    ) -> Result<RelationshipTypeDef> {
        Identifier::parse(&new.name)?;
        self.resolve_entity_type(&new.from_type).await?;
        self.resolve_entity_type(&new.to_type).await?;
        if new.label.is_empty() {
            new.label = new.name.clone();
        }

        let def = self.store.insert_relationship_type(new).await?;
        self.invalidate(RELATIONSHIP_SCOPE).await;

        tracing::info!(
            relationship_type = %def.name,
            from = %def.from_type,
            to = %def.to_type,
            "Created relationship type"
        );
        Ok(def)
    }

    pub async fn get_relationship_type(&self, id: RelationshipTypeId) -> Result<RelationshipTypeDef> {
        self.store
            .relationship_type(id)
            .await?
            .ok_or_else(|| OntologyError::not_found("relationship type", id))
    }

    pub async fn resolve_relationship_type(&self, name: &str) -> Result<RelationshipTypeDef> {
        match self.store.relationship_type_by_name(name).await? {
            Some(def) if def.lifecycle.is_active() => Ok(def),
            _ => Err(OntologyError::not_found("relationship type", name)),
        }
    }

    pub async fn update_relationship_type(
        &self,
        id: RelationshipTypeId,
        patch: RelationshipTypePatch,
    ) -> Result<RelationshipTypeDef> {
        let mut def = self.get_relationship_type(id).await?;
        let expected = def.version;

        patch.apply(&mut def);
        def.version += 1;
        def.updated_at = Some(Utc::now());

        self.store.save_relationship_type(&def, expected).await?;
        self.invalidate(RELATIONSHIP_SCOPE).await;

        tracing::info!(
            relationship_type = %def.name,
            version = def.version,
            "Updated relationship type"
        );
        Ok(def)
    }

    pub async fn deactivate_relationship_type(
        &self,
        id: RelationshipTypeId,
    ) -> Result<RelationshipTypeDef> {
        let mut def = self.get_relationship_type(id).await?;
        if def.lifecycle == Lifecycle::Deactivated {
            return Ok(def);
        }

        def.lifecycle = Lifecycle::Deactivated;
        def.updated_at = Some(Utc::now());
        self.store.save_relationship_type(&def, def.version).await?;
        self.invalidate(RELATIONSHIP_SCOPE).await;

        tracing::info!(relationship_type = %def.name, "Deactivated relationship type");
        Ok(def)
    }

    pub async fn list_relationship_types(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RelationshipTypeDef>> {
        let key = self.listing_key(RELATIONSHIP_SCOPE, offset, limit).await;
        if let Some(hit) = self.cached::<Vec<RelationshipTypeDef>>(&key).await {
            return Ok(hit);
        }

        let page = self.store.list_relationship_types(offset, limit).await?;
        self.store_cached(&key, &page).await;
        Ok(page)
    }

    // ── Cache plumbing ───────────────────────────────────────────

    fn generation_key(scope: &str) -> String {
        format!("{CACHE_PREFIX}:{scope}:generation")
    }

    async fn listing_key(&self, scope: &str, offset: u64, limit: u64) -> String {
        let gen_key = Self::generation_key(scope);
        let generation = match self.cache.get(&gen_key).await {
            Some(generation) => generation,
            None => {
                let fresh = Uuid::new_v4().simple().to_string();
                self.cache.set(&gen_key, &fresh, self.ttl).await;
                fresh
            }
        };
        format!("{CACHE_PREFIX}:{scope}:{generation}:{offset}:{limit}")
    }

    async fn invalidate(&self, scope: &str) {
        self.cache.delete(&Self::generation_key(scope)).await;
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.cache.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    async fn store_cached<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.cache.set(key, &raw, self.ttl).await,
            Err(e) => tracing::warn!(key, error = %e, "Failed to encode listing for cache"),
        }
    }
}
