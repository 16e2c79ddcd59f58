//! The narrow graph-store interface the ontology layer writes through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ontograph_core::{Identifier, Properties};

use crate::client::{GraphClient, GraphError};

/// A node as returned by the store: its id, primary label, and properties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub id: String,
    pub label: String,
    pub properties: Properties,
}

/// A relationship as returned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeRecord {
    pub id: String,
    pub rel_type: String,
    pub from_id: String,
    pub to_id: String,
    pub properties: Properties,
}

/// One conjunctive equality filter. The key sits in a structural position
/// of the query and is therefore an [`Identifier`]; the value is always bound
/// as a parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualityFilter {
    pub key: Identifier,
    pub value: Value,
}

/// Operations the ontology layer needs from a graph database.
///
/// Labels and relationship types are [`Identifier`]s so no unchecked string
/// ever reaches query text.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create one node and return it with its store-assigned id.
    async fn create_node(
        &self,
        label: &Identifier,
        properties: Properties,
    ) -> Result<NodeRecord, GraphError>;

    async fn find_node_by_id(&self, id: &str) -> Result<Option<NodeRecord>, GraphError>;

    async fn find_nodes_by_label(
        &self,
        label: &Identifier,
        filters: &[EqualityFilter],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<NodeRecord>, GraphError>;

    /// Create one relationship. Returns `None`, having written nothing, when
    /// either endpoint does not exist.
    async fn create_relationship(
        &self,
        rel_type: &Identifier,
        from_id: &str,
        to_id: &str,
        properties: Properties,
    ) -> Result<Option<EdgeRecord>, GraphError>;

    /// Ensure instance ids are unique per label. Callers treat failure as
    /// non-fatal.
    async fn ensure_uniqueness_constraint(&self, label: &Identifier) -> Result<(), GraphError>;
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn create_node(
        &self,
        label: &Identifier,
        properties: Properties,
    ) -> Result<NodeRecord, GraphError> {
        self.create_labeled_node(label, properties).await
    }

    async fn find_node_by_id(&self, id: &str) -> Result<Option<NodeRecord>, GraphError> {
        self.get_node(id).await
    }

    async fn find_nodes_by_label(
        &self,
        label: &Identifier,
        filters: &[EqualityFilter],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        self.list_nodes(label, filters, offset, limit).await
    }

    async fn create_relationship(
        &self,
        rel_type: &Identifier,
        from_id: &str,
        to_id: &str,
        properties: Properties,
    ) -> Result<Option<EdgeRecord>, GraphError> {
        self.create_edge(rel_type, from_id, to_id, properties).await
    }

    async fn ensure_uniqueness_constraint(&self, label: &Identifier) -> Result<(), GraphError> {
        self.create_id_constraint(label).await
    }
}
