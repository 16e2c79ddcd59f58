//! Configuration management for Ontograph services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`ONTOGRAPH__SECTION__KEY`)
//! 2. Config file (`ontograph.toml`, or any prefix passed on the command line)
//! 3. Defaults declared on each settings struct

use config::{Config, ConfigError, Environment, File};
use serde::de::DeserializeOwned;

/// Environment variable prefix shared by every Ontograph process.
pub const ENV_PREFIX: &str = "ONTOGRAPH";

/// Default config file prefix (`ontograph.toml`, `ontograph.yaml`, ...).
pub const DEFAULT_FILE_PREFIX: &str = "ontograph";

/// Build the layered configuration: optional file, then environment.
pub fn load_layered(file_prefix: &str) -> Result<Config, ConfigError> {
    Config::builder()
        .add_source(File::with_name(file_prefix).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
}

/// Deserialize one section, falling back to defaults when it is absent.
///
/// A section that is present but malformed is an error rather than a
/// silent fallback.
pub fn section<T>(cfg: &Config, key: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    match cfg.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(ConfigError::NotFound(_)) => {
            tracing::debug!(section = key, "Config section absent, using defaults");
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        uri: String,
        #[serde(default = "default_limit")]
        limit: u32,
    }

    fn default_limit() -> u32 {
        7
    }

    fn write_config(contents: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ontograph.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let prefix = dir.path().join("ontograph").display().to_string();
        (dir, prefix)
    }

    #[test]
    fn reads_section_from_file() {
        let (_dir, prefix) = write_config("[sample]\nuri = \"bolt://graph:7687\"\n");
        let cfg = load_layered(&prefix).unwrap();
        let sample: Sample = section(&cfg, "sample").unwrap();
        assert_eq!(sample.uri, "bolt://graph:7687");
        assert_eq!(sample.limit, 7);
    }

    #[test]
    fn missing_file_and_section_yield_defaults() {
        let cfg = load_layered("/nonexistent/ontograph-test-config").unwrap();
        let sample: Sample = section(&cfg, "sample").unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn malformed_section_is_an_error() {
        let (_dir, prefix) = write_config("[sample]\nlimit = \"not a number\"\n");
        let cfg = load_layered(&prefix).unwrap();
        assert!(section::<Sample>(&cfg, "sample").is_err());
    }
}
