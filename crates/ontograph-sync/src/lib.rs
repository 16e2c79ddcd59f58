//! ontograph-sync: Data-connector synchronization for the Ontograph knowledge graph.
//!
//! Pulls records from external sources in batches, maps them onto entity
//! types via each connector's field mapping, and loads them through the
//! typed graph-mutation layer. Runs on demand or on a per-connector schedule.

pub mod config;
pub mod connector;
pub mod engine;
pub mod error;
pub mod postgres;
pub mod scheduler;
pub mod transform;

#[cfg(test)]
mod testing;

pub use connector::{build_connector, BatchStream, Connector, DetectedSchema, FetchRequest};
pub use engine::{ConnectorEngine, ConnectorReport};
pub use error::{SourceError, SyncError};
