//! Periodic sync scheduling.
//!
//! Spawns one tokio task per enabled connector that declares a sync
//! interval. Each task runs incremental syncs on its own ticker; the engine's
//! semaphore bounds how many run at once.

use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::engine::ConnectorEngine;

pub struct SyncScheduler {
    engine: Arc<ConnectorEngine>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<ConnectorEngine>) -> Self {
        Self { engine }
    }

    /// Run the scheduler until every connector task ends, which in practice
    /// means until the runtime shuts down.
    pub async fn run(&self) {
        let mut handles = Vec::new();

        for (connector_id, every_secs) in self.engine.scheduled().await {
            let engine = self.engine.clone();
            handles.push(tokio::spawn(async move {
                run_connector_loop(engine, connector_id, every_secs).await;
            }));
        }

        if handles.is_empty() {
            tracing::warn!("No connectors have a sync interval; nothing to schedule");
            return;
        }
        tracing::info!(connector_count = handles.len(), "Scheduler started");

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Connector sync task panicked");
            }
        }
    }
}

async fn run_connector_loop(engine: Arc<ConnectorEngine>, connector_id: String, every_secs: u64) {
    let mut ticker = interval(Duration::from_secs(every_secs));
    // A run longer than the interval delays the next one instead of bunching.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        tracing::info!(connector_id = %connector_id, "Scheduled sync triggered");

        match engine.sync(&connector_id, false).await {
            Ok(result) if result.success => {}
            Ok(result) => tracing::warn!(
                connector_id = %connector_id,
                error = result.error_message.as_deref().unwrap_or("unknown"),
                "Scheduled sync failed"
            ),
            Err(e) => {
                tracing::error!(connector_id = %connector_id, error = %e, "Connector vanished, stopping schedule");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{connector_config, harness, ScriptedConnector};

    #[tokio::test(start_paused = true)]
    async fn runs_each_scheduled_connector_on_its_interval() {
        let h = harness().await;

        let mut every_minute = connector_config("minutely", None);
        every_minute.sync_interval_secs = Some(60);
        let minutely = ScriptedConnector::default();
        let minutely_requests = minutely.requests.clone();

        let manual = ScriptedConnector::default();
        let manual_requests = manual.requests.clone();

        h.engine.register(every_minute, Box::new(minutely)).await.unwrap();
        h.engine
            .register(connector_config("manual", None), Box::new(manual))
            .await
            .unwrap();

        let scheduler = SyncScheduler::new(h.engine.clone());
        let task = tokio::spawn(async move { scheduler.run().await });

        // Ticks at 0s, 60s and 120s.
        tokio::time::sleep(Duration::from_secs(150)).await;
        task.abort();

        assert_eq!(minutely_requests.lock().unwrap().len(), 3);
        assert!(manual_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn returns_immediately_with_nothing_to_schedule() {
        let h = harness().await;
        h.engine
            .register(connector_config("manual", None), Box::new(ScriptedConnector::default()))
            .await
            .unwrap();
        SyncScheduler::new(h.engine.clone()).run().await;
    }
}
