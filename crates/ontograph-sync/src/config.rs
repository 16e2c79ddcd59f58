//! Configuration for the sync engine.

use serde::Deserialize;

use ontograph_core::ConnectorConfig;

/// Loaded from the `[sync]` section of `ontograph.toml` or `ONTOGRAPH__SYNC__*`.
///
/// Connectors are declared as `[[sync.connectors]]` tables.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Maximum sync runs in flight across all connectors.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_syncs: usize,

    /// Records per extraction batch unless a connector overrides it.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub connectors: Vec<ConnectorConfig>,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_batch_size() -> usize {
    1000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_syncs: default_max_concurrent(),
            batch_size: default_batch_size(),
            connectors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontograph_core::config::{load_layered, section};
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.max_concurrent_syncs, 4);
        assert_eq!(config.batch_size, 1000);
        assert!(config.connectors.is_empty());
    }

    #[test]
    fn test_connectors_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ontograph.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            br#"
[sync]
batch_size = 250

[[sync.connectors]]
connector_id = "crm"
source_kind = "postgresql"
source_table = "public.customers"
sync_interval_secs = 600

[sync.connectors.connection_params]
host = "crm-db"
port = 5433
database = "crm"
user = "sync"

[sync.connectors.field_mapping]
target_entity_type = "Customer"
change_column = "updated_at"

[sync.connectors.field_mapping.field_mappings]
name = "full_name"
"#,
        )
        .unwrap();

        let prefix = dir.path().join("ontograph").display().to_string();
        let cfg = load_layered(&prefix).unwrap();
        let sync: SyncConfig = section(&cfg, "sync").unwrap();

        assert_eq!(sync.batch_size, 250);
        assert_eq!(sync.max_concurrent_syncs, 4);
        assert_eq!(sync.connectors.len(), 1);

        let crm = &sync.connectors[0];
        assert!(crm.enabled);
        assert_eq!(crm.sync_interval_secs, Some(600));
        assert_eq!(crm.connection_params["port"], 5433);
        assert_eq!(crm.field_mapping.field_mappings["name"], "full_name");
        assert_eq!(crm.field_mapping.change_column.as_deref(), Some("updated_at"));
    }
}
