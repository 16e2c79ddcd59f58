//! Error types for the ontograph-sync crate.

use thiserror::Error;

/// Failures raised by a data source.
///
/// Only [`SourceError::MalformedBatch`] is survivable mid-run; every other
/// variant ends the sync it occurs in.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to connect to source: {0}")]
    Connect(String),

    #[error("Source is not connected")]
    NotConnected,

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Malformed batch of {size} records: {reason}")]
    MalformedBatch { size: u64, reason: String },

    #[error("Invalid connector configuration: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SourceError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::MalformedBatch { .. })
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Unknown connector: {0}")]
    UnknownConnector(String),

    #[error("Connector already registered: {0}")]
    DuplicateConnector(String),

    #[error("Unsupported source kind: {0}")]
    UnsupportedSource(String),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Ontology error: {0}")]
    Ontology(#[from] ontograph_core::OntologyError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
