//! The interface every data source implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;

use ontograph_core::ConnectorConfig;

use crate::error::{SourceError, SyncError};
use crate::postgres::PostgresConnector;

/// One page of raw source records.
pub type Batch = Vec<Value>;

/// Finite, lazily produced sequence of batches. An `Err` item that is fatal
/// ends the run; a malformed-batch item is counted and skipped.
pub type BatchStream<'a> = BoxStream<'a, Result<Batch, SourceError>>;

/// Parameters of one extraction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub full_sync: bool,
    pub batch_size: usize,
    /// Lower bound (exclusive) on the change column for incremental runs.
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DetectedColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Structure of a source as reported by the source itself.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DetectedSchema {
    pub table: String,
    pub columns: Vec<DetectedColumn>,
}

/// A data source the engine can sync from.
///
/// The engine serializes access per connector, so implementations do not
/// need interior locking. Connectors that cannot extract incrementally
/// ignore `since` and return everything.
#[async_trait]
pub trait Connector: Send + Sync {
    fn source_kind(&self) -> &str;

    async fn connect(&mut self) -> Result<(), SourceError>;

    async fn disconnect(&mut self) -> Result<(), SourceError>;

    /// Open and close a throwaway connection without touching the live one.
    async fn test_connection(&self) -> Result<(), SourceError>;

    async fn detect_schema(&self) -> Result<DetectedSchema, SourceError>;

    fn fetch_data(&self, request: FetchRequest) -> BatchStream<'_>;
}

/// Instantiate the connector for a config's `source_kind`.
pub fn build_connector(config: &ConnectorConfig) -> Result<Box<dyn Connector>, SyncError> {
    match config.source_kind.to_ascii_lowercase().as_str() {
        "postgresql" | "postgres" => Ok(Box::new(PostgresConnector::from_config(config)?)),
        other => Err(SyncError::UnsupportedSource(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(kind: &str) -> ConnectorConfig {
        serde_json::from_value(json!({
            "connector_id": "crm",
            "source_kind": kind,
            "connection_params": {"host": "db", "database": "crm", "user": "sync"},
            "source_table": "customers",
            "field_mapping": {"target_entity_type": "Customer"}
        }))
        .unwrap()
    }

    #[test]
    fn postgres_aliases_build() {
        for kind in ["postgresql", "postgres", "PostgreSQL"] {
            let connector = build_connector(&config(kind)).unwrap();
            assert_eq!(connector.source_kind(), "postgresql");
        }
    }

    #[test]
    fn unknown_source_kind_is_rejected() {
        let err = build_connector(&config("mongodb")).err().unwrap();
        assert!(matches!(err, SyncError::UnsupportedSource(kind) if kind == "mongodb"));
    }
}
