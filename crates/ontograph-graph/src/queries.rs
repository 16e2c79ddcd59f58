//! Read operations for the knowledge graph.

use neo4rs::query;
use serde_json::Value;

use ontograph_core::{Identifier, Properties};

use crate::client::{GraphClient, GraphError};
use crate::mutations::property_value;
use crate::store::{EdgeRecord, EqualityFilter, NodeRecord};

impl GraphClient {
    // ── Single Node Lookups ──────────────────────────────────────

    /// Get a node by its store-assigned id, whatever its label.
    pub async fn get_node(&self, id: &str) -> Result<Option<NodeRecord>, GraphError> {
        let q = query(
            "MATCH (n {id: $id})
             RETURN n.id AS id, labels(n) AS labels, properties(n) AS props
             LIMIT 1",
        )
        .param("id", id.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(Some(node_from_row(&row)?)),
            None => Ok(None),
        }
    }

    // ── List Queries ─────────────────────────────────────────────

    /// List nodes of a label matching every equality filter.
    ///
    /// Filter values are bound as `$f0`, `$f1`, ... so neither keys nor values
    /// of caller input ever name a parameter.
    pub async fn list_nodes(
        &self,
        label: &Identifier,
        filters: &[EqualityFilter],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        let cypher = format!(
            "MATCH (n:`{label}`)
             {where_clause}
             RETURN n.id AS id, labels(n) AS labels, properties(n) AS props
             SKIP $offset LIMIT $limit",
            where_clause = where_clause(filters),
        );

        let mut q = query(&cypher)
            .param("offset", clamp_i64(offset))
            .param("limit", clamp_i64(limit));
        for (i, filter) in filters.iter().enumerate() {
            q = q.param(&format!("f{i}"), property_value(&filter.value));
        }

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(node_from_row(&row)?);
        }
        Ok(results)
    }
}

/// Render `WHERE n.`k0` = $f0 AND ...`, or nothing for an empty filter set.
pub(crate) fn where_clause(filters: &[EqualityFilter]) -> String {
    if filters.is_empty() {
        return String::new();
    }
    let predicates: Vec<String> = filters
        .iter()
        .enumerate()
        .map(|(i, filter)| format!("n.`{}` = $f{i}", filter.key))
        .collect();
    format!("WHERE {}", predicates.join(" AND "))
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Decode a `RETURN n.id AS id, labels(n) AS labels, properties(n) AS props` row.
pub(crate) fn node_from_row(row: &neo4rs::Row) -> Result<NodeRecord, GraphError> {
    let id: String = row
        .get("id")
        .map_err(|e| GraphError::Serialization(format!("Failed to read node id: {e}")))?;
    let labels: Vec<String> = row.get("labels").unwrap_or_default();
    let properties = props_from_row(row)?;

    Ok(NodeRecord {
        id,
        label: labels.into_iter().next().unwrap_or_default(),
        properties,
    })
}

/// Decode the row returned by relationship creation.
pub(crate) fn edge_from_row(row: &neo4rs::Row) -> Result<EdgeRecord, GraphError> {
    let read = |key: &str| -> Result<String, GraphError> {
        row.get::<String>(key)
            .map_err(|e| GraphError::Serialization(format!("Failed to read {key}: {e}")))
    };

    Ok(EdgeRecord {
        id: read("id")?,
        rel_type: read("rel_type")?,
        from_id: read("from_id")?,
        to_id: read("to_id")?,
        properties: props_from_row(row)?,
    })
}

fn props_from_row(row: &neo4rs::Row) -> Result<Properties, GraphError> {
    let props: Value = row
        .get("props")
        .map_err(|e| GraphError::Serialization(format!("Failed to read properties: {e}")))?;
    match props {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Properties::new()),
        other => Err(GraphError::Serialization(format!(
            "Expected property map, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(key: &str, value: Value) -> EqualityFilter {
        EqualityFilter {
            key: Identifier::parse(key).unwrap(),
            value,
        }
    }

    #[test]
    fn empty_filters_render_no_where_clause() {
        assert_eq!(where_clause(&[]), "");
    }

    #[test]
    fn filters_bind_positional_parameters() {
        let clause = where_clause(&[filter("name", json!("Ann")), filter("age", json!(40))]);
        assert_eq!(clause, "WHERE n.`name` = $f0 AND n.`age` = $f1");
        assert!(!clause.contains("Ann"));
    }

    #[test]
    fn oversized_pagination_is_clamped() {
        assert_eq!(clamp_i64(u64::MAX), i64::MAX);
        assert_eq!(clamp_i64(25), 25);
    }
}
