//! CLI entry point for the ontograph-sync daemon.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use ontograph_core::config::{load_layered, section};
use ontograph_graph::{GraphClient, GraphConfig, GraphStore};
use ontograph_notify::ChangeNotifier;
use ontograph_ontology::{
    Cache, GraphMutationService, NoopCache, PgMetadataStore, PostgresSettings, RedisCache,
    RedisSettings, TypeRegistry,
};

use ontograph_sync::config::SyncConfig;
use ontograph_sync::scheduler::SyncScheduler;
use ontograph_sync::{build_connector, ConnectorEngine};

#[derive(Parser)]
#[command(name = "ontograph-sync")]
#[command(about = "Sync external data sources into the Ontograph knowledge graph")]
struct Cli {
    /// Run one sync pass and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon with scheduled syncs.
    #[arg(long)]
    daemon: bool,

    /// Restrict a one-shot run to a single connector.
    #[arg(long)]
    connector: Option<String>,

    /// Ignore watermarks and re-read every record.
    #[arg(long)]
    full: bool,

    /// Check that each connector can reach its source.
    #[arg(long)]
    test_connections: bool,

    /// Print the detected source schema of `--connector`.
    #[arg(long)]
    detect_schema: bool,

    /// Config file prefix (default: ontograph).
    #[arg(short, long, default_value = "ontograph")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let cfg = load_layered(&cli.config)?;
    let sync_config: SyncConfig = section(&cfg, "sync")?;
    let graph_config: GraphConfig = section(&cfg, "neo4j")?;
    let postgres_settings: PostgresSettings = section(&cfg, "postgres")?;

    let graph: Arc<dyn GraphStore> = Arc::new(GraphClient::connect(&graph_config).await?);

    let metadata = PgMetadataStore::connect(&postgres_settings).await?;
    metadata.migrate().await?;
    let metadata = Arc::new(metadata);

    let cache: Arc<dyn Cache> = match cfg.get::<RedisSettings>("redis") {
        Ok(settings) => match RedisCache::connect(&settings).await {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, running without listing cache");
                Arc::new(NoopCache)
            }
        },
        Err(_) => Arc::new(NoopCache),
    };

    let registry = Arc::new(TypeRegistry::new(metadata.clone(), graph.clone(), cache));
    let mutations = Arc::new(GraphMutationService::new(
        registry,
        graph,
        ChangeNotifier::new(),
    ));
    let engine = Arc::new(ConnectorEngine::new(mutations, metadata, &sync_config));

    for connector_config in &sync_config.connectors {
        let connector = build_connector(connector_config)?;
        engine.register(connector_config.clone(), connector).await?;
    }
    tracing::info!(connectors = sync_config.connectors.len(), "Connectors registered");

    if cli.test_connections {
        for id in engine.connector_ids().await {
            let reachable = engine.test_connection(&id).await?;
            println!("{id}: {}", if reachable { "ok" } else { "unreachable" });
        }
    } else if cli.detect_schema {
        let id = cli
            .connector
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--connector is required with --detect-schema"))?;
        let schema = engine.detect_schema(id).await?;
        println!("{}", serde_json::to_string_pretty(&schema)?);
        engine.disconnect(id).await?;
    } else if cli.once {
        let results = match cli.connector.as_deref() {
            Some(id) => vec![(id.to_string(), engine.sync(id, cli.full).await?)],
            None => engine.sync_all(cli.full).await,
        };
        let failed = results.iter().filter(|(_, r)| !r.success).count();
        for (id, result) in &results {
            tracing::info!(
                connector_id = %id,
                success = result.success,
                processed = result.records_processed,
                failed = result.records_failed,
                "Sync finished"
            );
        }
        println!("{}", serde_json::to_string_pretty(&engine.statuses().await)?);
        if failed > 0 {
            anyhow::bail!("{failed} of {} syncs failed", results.len());
        }
    } else if cli.daemon {
        SyncScheduler::new(engine).run().await;
    } else {
        anyhow::bail!("Specify --once (one-shot sync), --daemon (scheduled syncs), --test-connections or --detect-schema");
    }

    Ok(())
}
