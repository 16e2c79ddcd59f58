//! The single write path into the graph.

use std::sync::Arc;

use ontograph_core::{
    EntityInstance, Identifier, OntologyError, Properties, RelationshipInstance, Result,
};
use ontograph_graph::{EqualityFilter, GraphStore};
use ontograph_notify::ChangeNotifier;

use crate::registry::TypeRegistry;

/// Creates and reads typed graph instances.
///
/// Only names registered as active types ever reach the graph as labels or
/// relationship types. Each successful create is announced on the notifier;
/// announcement is best-effort and never fails the write.
pub struct GraphMutationService {
    registry: Arc<TypeRegistry>,
    graph: Arc<dyn GraphStore>,
    notifier: ChangeNotifier,
}

impl GraphMutationService {
    pub fn new(
        registry: Arc<TypeRegistry>,
        graph: Arc<dyn GraphStore>,
        notifier: ChangeNotifier,
    ) -> Self {
        Self {
            registry,
            graph,
            notifier,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub async fn create_entity(
        &self,
        type_name: &str,
        properties: Properties,
    ) -> Result<EntityInstance> {
        let def = self.registry.resolve_entity_type(type_name).await?;
        let label = Identifier::parse(&def.name)?;
        def.property_schema.validate(&properties)?;

        let node = self
            .graph
            .create_node(&label, properties)
            .await
            .map_err(OntologyError::store)?;

        let instance = EntityInstance {
            id: node.id,
            entity_type: def.name,
            properties: node.properties,
        };
        tracing::info!(entity_type = %instance.entity_type, id = %instance.id, "Created entity");

        let payload = serde_json::to_value(&instance).unwrap_or_default();
        self.notifier
            .entity_created(&instance.entity_type, payload)
            .await;
        Ok(instance)
    }

    pub async fn get_entity(&self, id: &str) -> Result<EntityInstance> {
        let node = self
            .graph
            .find_node_by_id(id)
            .await
            .map_err(OntologyError::store)?
            .ok_or_else(|| OntologyError::not_found("entity", id))?;

        Ok(EntityInstance {
            id: node.id,
            entity_type: node.label,
            properties: node.properties,
        })
    }

    /// Instances of a type matching every `key = value` pair in `filters`.
    /// Keys must be identifiers; an empty filter set matches all instances.
    pub async fn search_entities(
        &self,
        type_name: &str,
        filters: &Properties,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<EntityInstance>> {
        let def = self.registry.resolve_entity_type(type_name).await?;
        let label = Identifier::parse(&def.name)?;

        let filters = filters
            .iter()
            .map(|(key, value)| {
                Ok(EqualityFilter {
                    key: Identifier::parse(key)?,
                    value: value.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let nodes = self
            .graph
            .find_nodes_by_label(&label, &filters, offset, limit)
            .await
            .map_err(OntologyError::store)?;

        Ok(nodes
            .into_iter()
            .map(|node| EntityInstance {
                id: node.id,
                entity_type: def.name.clone(),
                properties: node.properties,
            })
            .collect())
    }

    /// Connect two existing entities. Endpoint existence is decided by the
    /// same statement that writes the edge, so a missing endpoint leaves the
    /// graph untouched.
    pub async fn create_relationship(
        &self,
        type_name: &str,
        from_id: &str,
        to_id: &str,
        properties: Properties,
    ) -> Result<RelationshipInstance> {
        let def = self.registry.resolve_relationship_type(type_name).await?;
        let rel_type = Identifier::parse(&def.name)?;
        def.property_schema.validate(&properties)?;

        let edge = self
            .graph
            .create_relationship(&rel_type, from_id, to_id, properties)
            .await
            .map_err(OntologyError::store)?
            .ok_or_else(|| OntologyError::not_found("entity", format!("{from_id} or {to_id}")))?;

        let instance = RelationshipInstance {
            id: edge.id,
            relationship_type: def.name,
            from_id: edge.from_id,
            to_id: edge.to_id,
            properties: edge.properties,
        };
        tracing::info!(
            relationship_type = %instance.relationship_type,
            from = %instance.from_id,
            to = %instance.to_id,
            "Created relationship"
        );

        let payload = serde_json::to_value(&instance).unwrap_or_default();
        self.notifier.relationship_created(payload).await;
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::metadata::MemoryMetadataStore;
    use ontograph_core::{
        NewEntityType, NewRelationshipType, PropertyDef, PropertyKind, PropertySchema,
    };
    use ontograph_core::events::GRAPH_UPDATES_CHANNEL;
    use ontograph_graph::MemoryGraph;
    use ontograph_notify::ChannelSubscriber;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    struct Fixture {
        service: GraphMutationService,
        graph: MemoryGraph,
        events: mpsc::Receiver<Value>,
    }

    async fn fixture() -> Fixture {
        let graph = MemoryGraph::new();
        let registry = Arc::new(TypeRegistry::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(graph.clone()),
            Arc::new(MemoryCache::new()),
        ));

        let mut person = NewEntityType::named("Person");
        person.property_schema = PropertySchema::new()
            .with("name", PropertyDef::required(PropertyKind::String))
            .with("age", PropertyDef::optional(PropertyKind::Integer));
        registry.create_entity_type(person).await.unwrap();
        registry
            .create_entity_type(NewEntityType::named("Company"))
            .await
            .unwrap();
        registry
            .create_relationship_type(NewRelationshipType::between("WORKS_AT", "Person", "Company"))
            .await
            .unwrap();

        let notifier = ChangeNotifier::new();
        let (subscriber, events) = ChannelSubscriber::new(16);
        notifier
            .subscribe(Arc::new(subscriber), GRAPH_UPDATES_CHANNEL)
            .await;

        Fixture {
            service: GraphMutationService::new(registry, Arc::new(graph.clone()), notifier),
            graph,
            events,
        }
    }

    fn props(value: Value) -> Properties {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_entity_materializes_and_announces() {
        let mut fx = fixture().await;
        let ann = fx
            .service
            .create_entity("Person", props(json!({"name": "Ann", "age": 40})))
            .await
            .unwrap();

        assert_eq!(ann.entity_type, "Person");
        assert_eq!(ann.properties["name"], "Ann");
        assert!(ann.properties.contains_key("created_at"));

        let fetched = fx.service.get_entity(&ann.id).await.unwrap();
        assert_eq!(fetched, ann);

        let event = fx.events.try_recv().unwrap();
        assert_eq!(event["event"], "entity_created");
        assert_eq!(event["entity_type"], "Person");
        assert_eq!(event["data"]["id"], json!(ann.id));
    }

    #[tokio::test]
    async fn unregistered_type_writes_nothing() {
        let mut fx = fixture().await;
        let err = fx
            .service
            .create_entity("Robot", props(json!({"name": "R2"})))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fx.graph.node_count().await, 0);
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn properties_are_checked_against_schema() {
        let fx = fixture().await;

        let missing = fx
            .service
            .create_entity("Person", props(json!({"age": 40})))
            .await
            .unwrap_err();
        assert!(matches!(missing, OntologyError::Validation(_)));

        let wrong_kind = fx
            .service
            .create_entity("Person", props(json!({"name": "Ann", "age": "forty"})))
            .await
            .unwrap_err();
        assert!(matches!(wrong_kind, OntologyError::Validation(_)));

        fx.service
            .create_entity("Person", props(json!({"name": "Ann", "nickname": "A"})))
            .await
            .unwrap();
        assert_eq!(fx.graph.node_count().await, 1);
    }

    #[tokio::test]
    async fn get_unknown_entity_is_not_found() {
        let fx = fixture().await;
        assert!(fx.service.get_entity("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn search_filters_by_equality() {
        let fx = fixture().await;
        for (name, age) in [("Ann", 40), ("Bob", 31), ("Cid", 40)] {
            fx.service
                .create_entity("Person", props(json!({"name": name, "age": age})))
                .await
                .unwrap();
        }

        let forty = fx
            .service
            .search_entities("Person", &props(json!({"age": 40})), 0, 100)
            .await
            .unwrap();
        assert_eq!(forty.len(), 2);
        assert!(forty.iter().all(|e| e.entity_type == "Person"));

        let everyone = fx
            .service
            .search_entities("Person", &Properties::new(), 0, 100)
            .await
            .unwrap();
        assert_eq!(everyone.len(), 3);
    }

    #[tokio::test]
    async fn search_rejects_unsafe_filter_keys() {
        let fx = fixture().await;
        let err = fx
            .service
            .search_entities("Person", &props(json!({"name) DELETE n //": "x"})), 0, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, OntologyError::Validation(_)));

        let unknown = fx
            .service
            .search_entities("Robot", &Properties::new(), 0, 10)
            .await
            .unwrap_err();
        assert!(unknown.is_not_found());
    }

    #[tokio::test]
    async fn relationship_to_missing_entity_is_not_found_and_writes_nothing() {
        let mut fx = fixture().await;
        let ann = fx
            .service
            .create_entity("Person", props(json!({"name": "Ann"})))
            .await
            .unwrap();
        fx.events.try_recv().unwrap();

        let err = fx
            .service
            .create_relationship("WORKS_AT", &ann.id, "missing", Properties::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fx.graph.edge_count().await, 0);
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn relationship_is_created_and_announced() {
        let mut fx = fixture().await;
        let ann = fx
            .service
            .create_entity("Person", props(json!({"name": "Ann"})))
            .await
            .unwrap();
        let acme = fx
            .service
            .create_entity("Company", props(json!({"name": "Acme"})))
            .await
            .unwrap();
        fx.events.try_recv().unwrap();
        fx.events.try_recv().unwrap();

        let rel = fx
            .service
            .create_relationship("WORKS_AT", &ann.id, &acme.id, props(json!({"since": 2020})))
            .await
            .unwrap();
        assert_eq!(rel.relationship_type, "WORKS_AT");
        assert_eq!(rel.from_id, ann.id);
        assert_eq!(rel.to_id, acme.id);

        let event = fx.events.try_recv().unwrap();
        assert_eq!(event["event"], "relationship_created");
        assert_eq!(event["data"]["id"], json!(rel.id));
    }

    #[tokio::test]
    async fn unregistered_relationship_type_is_not_found() {
        let fx = fixture().await;
        let err = fx
            .service
            .create_relationship("OWNS", "a", "b", Properties::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn mutation_succeeds_with_no_subscribers() {
        let graph = MemoryGraph::new();
        let registry = Arc::new(TypeRegistry::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(graph.clone()),
            Arc::new(MemoryCache::new()),
        ));
        registry
            .create_entity_type(NewEntityType::named("Person"))
            .await
            .unwrap();
        let service = GraphMutationService::new(registry, Arc::new(graph), ChangeNotifier::new());

        service
            .create_entity("Person", Properties::new())
            .await
            .unwrap();
    }
}
