//! Connector sync engine.
//!
//! Each registered connector gets a slot holding its configuration, the
//! connector itself behind an async lock, and its observable state. A sync
//! run holds the connector lock for its whole duration, so one connector never
//! runs two syncs at once; a semaphore bounds runs across connectors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{RwLock, Semaphore};

use ontograph_core::{ConnectorConfig, ConnectorState, ConnectorStatus, FieldMapping, SyncResult};
use ontograph_ontology::{GraphMutationService, MetadataStore};

use crate::config::SyncConfig;
use crate::connector::{Batch, Connector, DetectedSchema, FetchRequest};
use crate::error::{Result, SourceError, SyncError};
use crate::transform::{change_value, transform_batch};

/// Connection parameter keys containing any of these are never reported.
const SECRET_MARKERS: [&str; 2] = ["password", "secret"];

struct ConnectorSlot {
    config: ConnectorConfig,
    connector: tokio::sync::Mutex<Box<dyn Connector>>,
    state: Mutex<ConnectorState>,
}

impl ConnectorSlot {
    fn state(&self) -> ConnectorState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut ConnectorState)) -> ConnectorState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
        state.clone()
    }

    fn set_status(&self, status: ConnectorStatus) {
        self.update(|s| s.status = status);
    }
}

/// Externally visible view of one connector.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorReport {
    pub connector_id: String,
    pub source_kind: String,
    pub status: ConnectorStatus,
    pub enabled: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    /// Connection parameters with secret-looking values masked.
    pub config: Map<String, Value>,
}

/// Running counters of one sync run.
#[derive(Debug, Default)]
struct Tally {
    processed: u64,
    failed: u64,
    /// Largest change-column value among fetched records.
    high_water: Option<DateTime<Utc>>,
}

pub struct ConnectorEngine {
    connectors: RwLock<HashMap<String, Arc<ConnectorSlot>>>,
    mutations: Arc<GraphMutationService>,
    metadata: Arc<dyn MetadataStore>,
    concurrency: Arc<Semaphore>,
    batch_size: usize,
}

impl ConnectorEngine {
    pub fn new(
        mutations: Arc<GraphMutationService>,
        metadata: Arc<dyn MetadataStore>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            connectors: RwLock::new(HashMap::new()),
            mutations,
            metadata,
            concurrency: Arc::new(Semaphore::new(config.max_concurrent_syncs.max(1))),
            batch_size: config.batch_size.max(1),
        }
    }

    /// Add a connector. Any persisted watermark and last error for its id are
    /// restored; the status always starts at `Idle`.
    pub async fn register(&self, config: ConnectorConfig, connector: Box<dyn Connector>) -> Result<()> {
        let id = config.connector_id.clone();
        if self.connectors.read().await.contains_key(&id) {
            return Err(SyncError::DuplicateConnector(id));
        }

        let persisted = match self.metadata.load_connector_state(&id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(connector_id = %id, error = %e, "Failed to load connector state");
                None
            }
        };
        let state = ConnectorState {
            connector_id: id.clone(),
            status: ConnectorStatus::Idle,
            last_sync_at: persisted
                .as_ref()
                .and_then(|s| s.last_sync_at)
                .or(config.last_sync_at),
            last_sync_error: persisted.and_then(|s| s.last_sync_error),
        };

        let slot = Arc::new(ConnectorSlot {
            config,
            connector: tokio::sync::Mutex::new(connector),
            state: Mutex::new(state),
        });

        let mut connectors = self.connectors.write().await;
        if connectors.contains_key(&id) {
            return Err(SyncError::DuplicateConnector(id));
        }
        connectors.insert(id.clone(), slot);
        tracing::info!(connector_id = %id, "Registered connector");
        Ok(())
    }

    pub async fn connector_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connectors.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Enabled connectors with a sync interval, as `(id, seconds)`.
    pub async fn scheduled(&self) -> Vec<(String, u64)> {
        let connectors = self.connectors.read().await;
        let mut scheduled: Vec<(String, u64)> = connectors
            .values()
            .filter(|slot| slot.config.enabled)
            .filter_map(|slot| {
                slot.config
                    .sync_interval_secs
                    .filter(|secs| *secs > 0)
                    .map(|secs| (slot.config.connector_id.clone(), secs))
            })
            .collect();
        scheduled.sort();
        scheduled
    }

    async fn slot(&self, connector_id: &str) -> Result<Arc<ConnectorSlot>> {
        self.connectors
            .read()
            .await
            .get(connector_id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownConnector(connector_id.to_string()))
    }

    // ── Sync ─────────────────────────────────────────────────────

    /// Run one sync for a connector.
    ///
    /// Every outcome of the run itself is reported in the [`SyncResult`];
    /// `Err` means only that the connector id is unknown.
    pub async fn sync(&self, connector_id: &str, full_sync: bool) -> Result<SyncResult> {
        let slot = self.slot(connector_id).await?;
        let started = Instant::now();
        let started_at = Utc::now();

        let Ok(mut connector) = slot.connector.try_lock() else {
            tracing::warn!(connector_id, "Sync already in progress, rejecting");
            return Ok(SyncResult::failed(
                0,
                0,
                started.elapsed().as_secs_f64(),
                "sync already in progress",
            ));
        };

        let Ok(_permit) = self.concurrency.acquire().await else {
            return Ok(SyncResult::failed(0, 0, 0.0, "sync engine is shutting down"));
        };

        let mode = if full_sync { "full" } else { "incremental" };
        tracing::info!(connector_id, mode, "Starting sync");

        if slot.state().status != ConnectorStatus::Connected {
            slot.set_status(ConnectorStatus::Connecting);
            if let Err(e) = connector.connect().await {
                let elapsed = started.elapsed().as_secs_f64();
                tracing::error!(connector_id, error = %e, "Failed to connect to source");
                self.finish(&slot, ConnectorStatus::Error, None, Some(e.to_string()))
                    .await;
                return Ok(SyncResult::failed(0, 0, elapsed, e));
            }
            slot.set_status(ConnectorStatus::Connected);
        }

        let previous = slot.update(|s| s.status = ConnectorStatus::Syncing);
        let mapping = &slot.config.field_mapping;
        let since = if full_sync || mapping.change_column.is_none() {
            None
        } else {
            previous.last_sync_at
        };
        let request = FetchRequest {
            full_sync: full_sync || since.is_none(),
            batch_size: slot.config.batch_size.unwrap_or(self.batch_size).max(1),
            since,
        };

        let mut tally = Tally::default();
        let mut fatal: Option<SourceError> = None;
        {
            let mut batches = connector.fetch_data(request);
            while let Some(item) = batches.next().await {
                match item {
                    Ok(batch) => self.load_batch(connector_id, mapping, batch, &mut tally).await,
                    Err(SourceError::MalformedBatch { size, reason }) => {
                        tracing::warn!(connector_id, size, reason = %reason, "Skipping malformed batch");
                        tally.failed += size;
                    }
                    Err(e) => {
                        fatal = Some(e);
                        break;
                    }
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        match fatal {
            Some(e) => {
                tracing::error!(
                    connector_id,
                    processed = tally.processed,
                    failed = tally.failed,
                    error = %e,
                    "Sync aborted"
                );
                self.finish(&slot, ConnectorStatus::Error, None, Some(e.to_string()))
                    .await;
                Ok(SyncResult::failed(tally.processed, tally.failed, elapsed, e))
            }
            None => {
                tracing::info!(
                    connector_id,
                    processed = tally.processed,
                    failed = tally.failed,
                    duration_secs = elapsed,
                    "Sync completed"
                );
                // Change-tracked sources advance to the newest row actually
                // read, never to local clock time, and never backwards.
                let synced_at = if mapping.change_column.is_some() {
                    tally.high_water.max(previous.last_sync_at)
                } else {
                    Some(started_at)
                };
                self.finish(&slot, ConnectorStatus::Connected, synced_at, None)
                    .await;
                Ok(SyncResult::succeeded(tally.processed, tally.failed, elapsed))
            }
        }
    }

    /// Transform and load one batch. Every record ends up counted exactly
    /// once, as processed or failed.
    async fn load_batch(
        &self,
        connector_id: &str,
        mapping: &FieldMapping,
        batch: Batch,
        tally: &mut Tally,
    ) {
        let size = batch.len() as u64;
        if let Some(column) = &mapping.change_column {
            let newest = batch.iter().filter_map(|r| change_value(r, column)).max();
            tally.high_water = tally.high_water.max(newest);
        }
        let transformed = match transform_batch(mapping, &batch) {
            Ok(transformed) => transformed,
            Err(e) => {
                tracing::error!(connector_id, size, error = %e, "Failed to transform batch");
                tally.failed += size;
                return;
            }
        };
        tally.failed += transformed.failed;

        let mut loaded = 0u64;
        for properties in transformed.records {
            match self
                .mutations
                .create_entity(&mapping.target_entity_type, properties)
                .await
            {
                Ok(_) => loaded += 1,
                Err(e) => {
                    tracing::debug!(connector_id, error = %e, "Failed to load record");
                    tally.failed += 1;
                }
            }
        }
        tally.processed += loaded;
        tracing::debug!(connector_id, loaded, size, "Processed batch");
    }

    /// Record the end state of a run and persist it. Persistence failures
    /// are logged; the in-memory state is authoritative for this process.
    async fn finish(
        &self,
        slot: &ConnectorSlot,
        status: ConnectorStatus,
        synced_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) {
        let state = slot.update(|s| {
            s.status = status;
            if synced_at.is_some() {
                s.last_sync_at = synced_at;
            }
            s.last_sync_error = error;
        });
        self.persist(&state).await;
    }

    async fn persist(&self, state: &ConnectorState) {
        if let Err(e) = self.metadata.save_connector_state(state).await {
            tracing::warn!(
                connector_id = %state.connector_id,
                error = %e,
                "Failed to persist connector state"
            );
        }
    }

    /// Sync every enabled connector concurrently, within the engine's
    /// concurrency bound. Results are returned in connector-id order.
    pub async fn sync_all(self: &Arc<Self>, full_sync: bool) -> Vec<(String, SyncResult)> {
        let ids: Vec<String> = {
            let connectors = self.connectors.read().await;
            let mut ids: Vec<String> = connectors
                .values()
                .filter(|slot| slot.config.enabled)
                .map(|slot| slot.config.connector_id.clone())
                .collect();
            ids.sort();
            ids
        };

        let mut handles = Vec::with_capacity(ids.len());
        for id in ids {
            let engine = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let result = engine.sync(&id, full_sync).await;
                (id, result)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok((id, Ok(result))) => results.push((id, result)),
                Ok((id, Err(e))) => tracing::error!(connector_id = %id, error = %e, "Sync not started"),
                Err(e) => tracing::error!(error = %e, "Sync task panicked"),
            }
        }
        results
    }

    // ── Connection management ────────────────────────────────────

    /// Close a connector's source connection. Waits for a running sync.
    pub async fn disconnect(&self, connector_id: &str) -> Result<()> {
        let slot = self.slot(connector_id).await?;
        let mut connector = slot.connector.lock().await;
        connector.disconnect().await?;
        let state = slot.update(|s| s.status = ConnectorStatus::Disconnected);
        self.persist(&state).await;
        Ok(())
    }

    /// Check the source with a throwaway connection.
    pub async fn test_connection(&self, connector_id: &str) -> Result<bool> {
        let slot = self.slot(connector_id).await?;
        let connector = slot.connector.lock().await;
        match connector.test_connection().await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(connector_id, error = %e, "Connection test failed");
                Ok(false)
            }
        }
    }

    /// Ask the source to describe itself, connecting first if needed.
    pub async fn detect_schema(&self, connector_id: &str) -> Result<DetectedSchema> {
        let slot = self.slot(connector_id).await?;
        let mut connector = slot.connector.lock().await;

        if slot.state().status != ConnectorStatus::Connected {
            slot.set_status(ConnectorStatus::Connecting);
            if let Err(e) = connector.connect().await {
                tracing::error!(connector_id, error = %e, "Failed to connect for schema detection");
                self.finish(&slot, ConnectorStatus::Error, None, Some(e.to_string()))
                    .await;
                return Err(e.into());
            }
            slot.set_status(ConnectorStatus::Connected);
        }
        Ok(connector.detect_schema().await?)
    }

    // ── Status ───────────────────────────────────────────────────

    pub async fn status(&self, connector_id: &str) -> Result<ConnectorReport> {
        let slot = self.slot(connector_id).await?;
        Ok(report(&slot))
    }

    pub async fn statuses(&self) -> Vec<ConnectorReport> {
        let connectors = self.connectors.read().await;
        let mut reports: Vec<ConnectorReport> = connectors.values().map(|s| report(s)).collect();
        reports.sort_by(|a, b| a.connector_id.cmp(&b.connector_id));
        reports
    }
}

fn report(slot: &ConnectorSlot) -> ConnectorReport {
    let state = slot.state();
    ConnectorReport {
        connector_id: slot.config.connector_id.clone(),
        source_kind: slot.config.source_kind.clone(),
        status: state.status,
        enabled: slot.config.enabled,
        last_sync_at: state.last_sync_at,
        last_sync_error: state.last_sync_error,
        config: redact(&slot.config.connection_params),
    }
}

fn redact(params: &Map<String, Value>) -> Map<String, Value> {
    params
        .iter()
        .map(|(key, value)| {
            let lower = key.to_ascii_lowercase();
            if SECRET_MARKERS.iter().any(|marker| lower.contains(marker)) {
                (key.clone(), Value::String("***".to_string()))
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}
