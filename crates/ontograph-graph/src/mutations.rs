//! Write operations for the knowledge graph.
//!
//! Every write creates exactly one node or one relationship in a single
//! statement. Labels and relationship types are interpolated only as
//! validated [`Identifier`]s; every value travels as a bound parameter.

use chrono::Utc;
use neo4rs::{query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType};
use serde_json::Value;

use ontograph_core::{Identifier, Properties};

use crate::client::{GraphClient, GraphError};
use crate::queries::{edge_from_row, node_from_row};
use crate::store::{EdgeRecord, NodeRecord};

impl GraphClient {
    // ── Nodes ────────────────────────────────────────────────────

    /// Create a node under `label`, letting the server assign its id.
    pub async fn create_labeled_node(
        &self,
        label: &Identifier,
        properties: Properties,
    ) -> Result<NodeRecord, GraphError> {
        let cypher = format!(
            "CREATE (n:`{label}` $props)
             SET n.id = randomUUID(), n.created_at = $now
             RETURN n.id AS id, labels(n) AS labels, properties(n) AS props"
        );

        let q = query(&cypher)
            .param("props", property_map(&properties))
            .param("now", Utc::now().to_rfc3339());

        match self.query_one(q).await? {
            Some(row) => node_from_row(&row),
            None => Err(GraphError::Serialization(format!(
                "CREATE on label {label} returned no row"
            ))),
        }
    }

    // ── Relationships ────────────────────────────────────────────

    /// Create a relationship between two existing nodes.
    ///
    /// Endpoint resolution and creation happen in one statement: when either
    /// MATCH finds nothing the CREATE never runs and no row comes back.
    pub async fn create_edge(
        &self,
        rel_type: &Identifier,
        from_id: &str,
        to_id: &str,
        properties: Properties,
    ) -> Result<Option<EdgeRecord>, GraphError> {
        let cypher = format!(
            "MATCH (a {{id: $from_id}})
             MATCH (b {{id: $to_id}})
             WITH a, b LIMIT 1
             CREATE (a)-[r:`{rel_type}` $props]->(b)
             SET r.id = randomUUID(), r.created_at = $now
             RETURN r.id AS id, type(r) AS rel_type, a.id AS from_id, b.id AS to_id,
                    properties(r) AS props"
        );

        let q = query(&cypher)
            .param("from_id", from_id.to_string())
            .param("to_id", to_id.to_string())
            .param("props", property_map(&properties))
            .param("now", Utc::now().to_rfc3339());

        match self.query_one(q).await? {
            Some(row) => Ok(Some(edge_from_row(&row)?)),
            None => Ok(None),
        }
    }

    // ── Schema ───────────────────────────────────────────────────

    /// Create a uniqueness constraint on `id` for a label.
    ///
    /// Idempotent: the constraint is created with IF NOT EXISTS.
    pub async fn create_id_constraint(&self, label: &Identifier) -> Result<(), GraphError> {
        let cypher = format!(
            "CREATE CONSTRAINT ontograph_{label}_id IF NOT EXISTS
             FOR (n:`{label}`) REQUIRE n.id IS UNIQUE"
        );
        self.run(query(&cypher)).await?;
        tracing::debug!(label = %label, "Ensured id uniqueness constraint");
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Convert a property bag into a Bolt map parameter.
pub(crate) fn property_map(properties: &Properties) -> BoltType {
    let mut map = BoltMap::new();
    for (key, value) in properties {
        map.put(BoltString::new(key), property_value(value));
    }
    BoltType::Map(map)
}

/// Convert one JSON value into a storable Bolt value.
///
/// Graph properties hold scalars or flat lists of scalars; anything nested
/// is stored as its JSON text.
pub(crate) fn property_value(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or_default())),
        },
        Value::String(s) => BoltType::String(BoltString::new(s)),
        Value::Array(items) if items.iter().all(is_scalar) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(property_value(item));
            }
            BoltType::List(list)
        }
        nested => BoltType::String(BoltString::new(&nested.to_string())),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}
