use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use ontograph_core::{Identifier, Properties};

use crate::client::GraphError;
use crate::store::{EdgeRecord, EqualityFilter, GraphStore, NodeRecord};

/// In-memory graph store for local development and unit tests.
///
/// Semantics mirror the Neo4j client: ids are assigned by the store, nodes
/// keep insertion order, and relationship creation writes nothing when an
/// endpoint is missing.
#[derive(Clone, Default)]
pub struct MemoryGraph {
    state: Arc<Mutex<MemoryState>>,
    reject_constraints: bool,
}

#[derive(Default)]
struct MemoryState {
    nodes: BTreeMap<u64, NodeRecord>,
    edges: Vec<EdgeRecord>,
    constraints: HashSet<String>,
    next_seq: u64,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose constraint primitive always fails, for exercising the
    /// best-effort path.
    pub fn without_constraint_support() -> Self {
        Self {
            reject_constraints: true,
            ..Self::default()
        }
    }

    pub async fn node_count(&self) -> usize {
        self.state.lock().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.state.lock().await.edges.len()
    }

    /// Labels that have a uniqueness constraint.
    pub async fn constrained_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.state.lock().await.constraints.iter().cloned().collect();
        labels.sort();
        labels
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn create_node(
        &self,
        label: &Identifier,
        mut properties: Properties,
    ) -> Result<NodeRecord, GraphError> {
        let id = Uuid::new_v4().to_string();
        properties.retain(|_, v| !v.is_null());
        properties.insert("id".to_string(), Value::String(id.clone()));
        properties.insert(
            "created_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let record = NodeRecord {
            id,
            label: label.to_string(),
            properties,
        };

        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.nodes.insert(seq, record.clone());
        Ok(record)
    }

    async fn find_node_by_id(&self, id: &str) -> Result<Option<NodeRecord>, GraphError> {
        let state = self.state.lock().await;
        Ok(state.nodes.values().find(|n| n.id == id).cloned())
    }

    async fn find_nodes_by_label(
        &self,
        label: &Identifier,
        filters: &[EqualityFilter],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        let state = self.state.lock().await;
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);

        Ok(state
            .nodes
            .values()
            .filter(|n| n.label == label.as_str())
            .filter(|n| {
                filters
                    .iter()
                    .all(|f| n.properties.get(f.key.as_str()) == Some(&f.value))
            })
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_relationship(
        &self,
        rel_type: &Identifier,
        from_id: &str,
        to_id: &str,
        mut properties: Properties,
    ) -> Result<Option<EdgeRecord>, GraphError> {
        let mut state = self.state.lock().await;
        let has = |id: &str| state.nodes.values().any(|n| n.id == id);
        if !has(from_id) || !has(to_id) {
            return Ok(None);
        }

        let id = Uuid::new_v4().to_string();
        properties.retain(|_, v| !v.is_null());
        properties.insert("id".to_string(), Value::String(id.clone()));
        properties.insert(
            "created_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let record = EdgeRecord {
            id,
            rel_type: rel_type.to_string(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            properties,
        };
        state.edges.push(record.clone());
        Ok(Some(record))
    }

    async fn ensure_uniqueness_constraint(&self, label: &Identifier) -> Result<(), GraphError> {
        if self.reject_constraints {
            return Err(GraphError::Unsupported(format!(
                "uniqueness constraint on {label}"
            )));
        }
        self.state.lock().await.constraints.insert(label.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn label(name: &str) -> Identifier {
        Identifier::parse(name).unwrap()
    }

    fn props(value: Value) -> Properties {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn created_node_gets_id_and_timestamp() {
        let graph = MemoryGraph::new();
        let node = graph
            .create_node(&label("Person"), props(json!({"name": "Ann"})))
            .await
            .unwrap();

        assert_eq!(node.label, "Person");
        assert_eq!(node.properties["id"], json!(node.id));
        assert!(node.properties.contains_key("created_at"));

        let found = graph.find_node_by_id(&node.id).await.unwrap().unwrap();
        assert_eq!(found, node);
    }

    #[tokio::test]
    async fn label_search_filters_and_paginates() {
        let graph = MemoryGraph::new();
        for (name, city) in [("Ann", "Oslo"), ("Bob", "Oslo"), ("Cid", "Rome")] {
            graph
                .create_node(&label("Person"), props(json!({"name": name, "city": city})))
                .await
                .unwrap();
        }
        graph
            .create_node(&label("Company"), props(json!({"city": "Oslo"})))
            .await
            .unwrap();

        let oslo = [EqualityFilter {
            key: label("city"),
            value: json!("Oslo"),
        }];
        let all = graph
            .find_nodes_by_label(&label("Person"), &oslo, 0, 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let page = graph
            .find_nodes_by_label(&label("Person"), &oslo, 1, 10)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].properties["name"], "Bob");

        let unfiltered = graph
            .find_nodes_by_label(&label("Person"), &[], 0, 2)
            .await
            .unwrap();
        assert_eq!(unfiltered.len(), 2);
    }

    #[tokio::test]
    async fn relationship_with_missing_endpoint_writes_nothing() {
        let graph = MemoryGraph::new();
        let a = graph
            .create_node(&label("Person"), Properties::new())
            .await
            .unwrap();

        let created = graph
            .create_relationship(&label("KNOWS"), &a.id, "missing", Properties::new())
            .await
            .unwrap();
        assert!(created.is_none());
        assert_eq!(graph.edge_count().await, 0);
    }

    #[tokio::test]
    async fn constraint_support_can_be_disabled() {
        let graph = MemoryGraph::without_constraint_support();
        assert!(graph
            .ensure_uniqueness_constraint(&label("Person"))
            .await
            .is_err());
        assert!(graph.constrained_labels().await.is_empty());
    }
}
