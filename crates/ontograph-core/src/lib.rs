//! ontograph-core: Shared types, configuration, and error handling for Ontograph.
//!
//! This crate provides the foundational types used across all Ontograph components:
//! - Entity and relationship type definitions (the ontology)
//! - Entity and relationship instances materialized in the graph
//! - Connector configuration and sync accounting
//! - Mutation events for real-time fan-out
//! - Layered configuration loading
//! - The typed error taxonomy

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::{OntologyError, Result};
pub use events::MutationEvent;
pub use types::{
    ConnectorConfig, ConnectorState, ConnectorStatus, EntityInstance, EntityTypeDef,
    EntityTypeId, EntityTypePatch, FieldMapping, Identifier, Lifecycle, NewEntityType,
    NewRelationshipType, Properties, PropertyDef, PropertyKind, PropertySchema,
    RelationshipInstance, RelationshipTypeDef, RelationshipTypeId, RelationshipTypePatch,
    SyncResult,
};
