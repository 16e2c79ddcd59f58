//! Bolt-backed [`GraphStore`](crate::GraphStore) client.
//!
//! Cypher building lives in `mutations` and `queries`; this module only owns
//! the connection settings, the shared pool and row collection.

use std::fmt;

use neo4rs::{query, Config, ConfigBuilder, Graph, Query, Row};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    /// A row came back in a shape the caller could not decode.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backing store cannot express the requested operation.
    #[error("Unsupported by graph store: {0}")]
    Unsupported(String),
}

/// Settings of the `[neo4j]` config section (env: `ONTOGRAPH__NEO4J__*`).
/// Missing keys fall back to a local development server.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "ontograph-dev".to_string(),
            database: "neo4j".to_string(),
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

impl fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConfig")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("fetch_size", &self.fetch_size)
            .finish()
    }
}

impl GraphConfig {
    fn to_neo4rs(&self) -> Result<Config, GraphError> {
        ConfigBuilder::default()
            .uri(&self.uri)
            .user(&self.user)
            .password(&self.password)
            .db(self.database.as_str())
            .max_connections(self.max_connections as usize)
            .fetch_size(self.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(format!("invalid settings: {e}")))
    }
}

/// Pooled handle to one Neo4j database. Clones share the pool.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Open the pool. Fails fast when the server rejects the handshake.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let graph = Graph::connect(config.to_neo4rs()?)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, database = %config.database, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Run a statement whose result rows, if any, are discarded.
    pub async fn run(&self, statement: Query) -> Result<(), GraphError> {
        Ok(self.graph.run(statement).await?)
    }

    pub async fn query_rows(&self, statement: Query) -> Result<Vec<Row>, GraphError> {
        let mut rows = Vec::new();
        let mut results = self.graph.execute(statement).await?;
        while let Some(row) = results.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// First row of the result; the rest are not pulled.
    pub async fn query_one(&self, statement: Query) -> Result<Option<Row>, GraphError> {
        Ok(self.graph.execute(statement).await?.next().await?)
    }

    pub async fn health_check(&self) -> bool {
        let answer = self.query_one(query("RETURN 1 AS health")).await;
        match answer {
            Ok(row) => row
                .and_then(|r| r.get::<i64>("health").ok())
                .is_some_and(|health| health == 1),
            Err(e) => {
                tracing::error!(error = %e, "Neo4j health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_section_keeps_local_defaults() {
        let config: GraphConfig = serde_json::from_value(json!({
            "uri": "bolt://graph.internal:7687",
            "database": "ontology"
        }))
        .unwrap();

        assert_eq!(config.uri, "bolt://graph.internal:7687");
        assert_eq!(config.database, "ontology");
        assert_eq!(config.user, "neo4j");
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.fetch_size, 256);
    }

    #[test]
    fn debug_output_hides_password() {
        let config = GraphConfig {
            password: "correct horse".to_string(),
            ..GraphConfig::default()
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("correct horse"));
        assert!(printed.contains("bolt://localhost:7687"));
    }
}
