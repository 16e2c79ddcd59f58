//! Ontograph Ontology: the typed layer over the knowledge graph.
//!
//! - [`TypeRegistry`] owns entity and relationship type definitions, persisted
//!   through a [`MetadataStore`] and listed through a read-through [`Cache`].
//! - [`GraphMutationService`] is the only write path into the graph. It checks
//!   every type name against the registry, validates properties against the
//!   type's schema, and publishes a mutation event for each successful create.

pub mod cache;
pub mod metadata;
pub mod mutations;
pub mod postgres;
pub mod registry;

pub use cache::{Cache, MemoryCache, NoopCache, RedisCache, RedisSettings};
pub use metadata::{MemoryMetadataStore, MetadataStore};
pub use mutations::GraphMutationService;
pub use postgres::{PgMetadataStore, PostgresSettings};
pub use registry::TypeRegistry;
