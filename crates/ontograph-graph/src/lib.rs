//! Graph store interface for Ontograph, with Neo4j and in-memory backends.
//!
//! All instance reads and writes of the ontology flow through the
//! [`GraphStore`] trait. [`GraphClient`] implements it against Neo4j;
//! [`MemoryGraph`] implements it in-process for development and tests.

pub mod client;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use memory::MemoryGraph;
pub use store::{EdgeRecord, EqualityFilter, GraphStore, NodeRecord};
