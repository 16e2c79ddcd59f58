//! Shared fixtures for engine and scheduler tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio::sync::Notify;

use ontograph_core::{ConnectorConfig, NewEntityType};
use ontograph_graph::{GraphStore, MemoryGraph};
use ontograph_notify::ChangeNotifier;
use ontograph_ontology::{GraphMutationService, MemoryCache, MemoryMetadataStore, TypeRegistry};

use crate::config::SyncConfig;
use crate::connector::{Batch, BatchStream, Connector, DetectedColumn, DetectedSchema, FetchRequest};
use crate::engine::ConnectorEngine;
use crate::error::SourceError;

pub type Script = VecDeque<std::result::Result<Batch, SourceError>>;

/// A connector that replays scripted batches and records what it was asked.
#[derive(Default)]
pub struct ScriptedConnector {
    pub script: Arc<Mutex<Script>>,
    pub requests: Arc<Mutex<Vec<FetchRequest>>>,
    pub refuse_connect: bool,
    pub connects: Arc<Mutex<u32>>,
    /// When set, the stream signals `started` and then waits on `release`
    /// before yielding anything.
    pub gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedConnector {
    pub fn with_batches(batches: Vec<std::result::Result<Batch, SourceError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(batches.into())),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn source_kind(&self) -> &str {
        "scripted"
    }

    async fn connect(&mut self) -> std::result::Result<(), SourceError> {
        *self.connects.lock().unwrap() += 1;
        if self.refuse_connect {
            return Err(SourceError::Connect("connection refused".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> std::result::Result<(), SourceError> {
        Ok(())
    }

    async fn test_connection(&self) -> std::result::Result<(), SourceError> {
        if self.refuse_connect {
            Err(SourceError::Connect("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    async fn detect_schema(&self) -> std::result::Result<DetectedSchema, SourceError> {
        Ok(DetectedSchema {
            table: "public.customers".to_string(),
            columns: vec![DetectedColumn {
                name: "full_name".to_string(),
                data_type: "text".to_string(),
                nullable: false,
            }],
        })
    }

    fn fetch_data(&self, request: FetchRequest) -> BatchStream<'_> {
        self.requests.lock().unwrap().push(request);
        let items: Vec<_> = self.script.lock().unwrap().drain(..).collect();
        let batches = stream::iter(items);
        match self.gate.clone() {
            Some((started, release)) => stream::once(async move {
                started.notify_one();
                release.notified().await;
            })
            .filter_map(|()| async { None })
            .chain(batches)
            .boxed(),
            None => batches.boxed(),
        }
    }
}

pub struct Harness {
    pub engine: Arc<ConnectorEngine>,
    pub graph: MemoryGraph,
    pub metadata: MemoryMetadataStore,
}

pub async fn harness() -> Harness {
    let graph = MemoryGraph::new();
    let metadata = MemoryMetadataStore::new();
    let graph_store: Arc<dyn GraphStore> = Arc::new(graph.clone());
    let registry = Arc::new(TypeRegistry::new(
        Arc::new(metadata.clone()),
        graph_store.clone(),
        Arc::new(MemoryCache::new()),
    ));
    registry
        .create_entity_type(NewEntityType::named("Customer"))
        .await
        .unwrap();

    let mutations = Arc::new(GraphMutationService::new(
        registry,
        graph_store,
        ChangeNotifier::new(),
    ));
    let engine = Arc::new(ConnectorEngine::new(
        mutations,
        Arc::new(metadata.clone()),
        &SyncConfig::default(),
    ));
    Harness {
        engine,
        graph,
        metadata,
    }
}

pub fn connector_config(id: &str, change_column: Option<&str>) -> ConnectorConfig {
    serde_json::from_value(json!({
        "connector_id": id,
        "source_kind": "scripted",
        "connection_params": {"host": "db", "password": "hunter2", "api_secret": "s"},
        "field_mapping": {
            "target_entity_type": "Customer",
            "field_mappings": {"name": "full_name"},
            "change_column": change_column
        }
    }))
    .unwrap()
}

pub fn customers(names: &[&str]) -> Batch {
    names.iter().map(|n| json!({"full_name": n, "age": 40})).collect()
}

