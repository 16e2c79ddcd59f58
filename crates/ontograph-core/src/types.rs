//! Core domain types for the ontology: type definitions, instances,
//! connector configuration, and sync accounting.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OntologyError, Result};

/// Free-form property bag carried by instances and source records.
pub type Properties = serde_json::Map<String, Value>;

// ── Identifiers ───────────────────────────────────────────────────

/// A name that is safe to place in a structural position of a graph query
/// (node label, relationship type, property key).
///
/// Only `[A-Za-z_][A-Za-z0-9_]*` up to 255 characters is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub const MAX_LEN: usize = 255;

    pub fn parse(raw: &str) -> Result<Self> {
        let mut chars = raw.chars();
        let valid_head = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
        let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_head || !valid_tail || raw.len() > Self::MAX_LEN {
            return Err(OntologyError::Validation(format!(
                "'{raw}' is not a valid identifier"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Identifier::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Metadata-store key of an entity type record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityTypeId(pub i64);

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata-store key of a relationship type record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipTypeId(pub i64);

impl fmt::Display for RelationshipTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────

/// Type definitions are never physically removed; deactivation hides them
/// from listings and write-time validation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    Active,
    Deactivated,
}

impl Lifecycle {
    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deactivated => "deactivated",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "deactivated" => Some(Self::Deactivated),
            _ => None,
        }
    }
}

// ── Property Schema ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    #[default]
    Any,
}

impl PropertyKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

/// Declared type and constraints of one property.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertyDef {
    #[serde(rename = "type", default)]
    pub kind: PropertyKind,
    #[serde(default)]
    pub required: bool,
}

impl PropertyDef {
    pub fn required(kind: PropertyKind) -> Self {
        Self {
            kind,
            required: true,
        }
    }

    pub fn optional(kind: PropertyKind) -> Self {
        Self {
            kind,
            required: false,
        }
    }
}

/// Property name → declaration. Undeclared properties are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PropertySchema(pub BTreeMap<String, PropertyDef>);

impl PropertySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, def: PropertyDef) -> Self {
        self.0.insert(name.to_string(), def);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check required keys and declared kinds. Null counts as absent.
    pub fn validate(&self, properties: &Properties) -> Result<()> {
        let mut problems = Vec::new();

        for (name, def) in &self.0 {
            match properties.get(name) {
                None | Some(Value::Null) => {
                    if def.required {
                        problems.push(format!("missing required property '{name}'"));
                    }
                }
                Some(value) if !def.kind.accepts(value) => {
                    problems.push(format!("property '{name}' must be of type {:?}", def.kind));
                }
                Some(_) => {}
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(OntologyError::Validation(problems.join("; ")))
        }
    }
}

// ── Entity Types ──────────────────────────────────────────────────

/// Schema-level definition of a node kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityTypeDef {
    pub id: EntityTypeId,
    pub name: String,
    pub label: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub property_schema: PropertySchema,
    pub version: i64,
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for creating an entity type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEntityType {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub property_schema: PropertySchema,
}

impl NewEntityType {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            ..Self::default()
        }
    }
}

/// Partial update of an entity type. `None` fields are left untouched;
/// the name is immutable and lifecycle changes go through deactivation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityTypePatch {
    pub label: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub property_schema: Option<PropertySchema>,
}

impl EntityTypePatch {
    pub fn apply(self, def: &mut EntityTypeDef) {
        if let Some(label) = self.label {
            def.label = label;
        }
        if let Some(description) = self.description {
            def.description = Some(description);
        }
        if let Some(icon) = self.icon {
            def.icon = Some(icon);
        }
        if let Some(color) = self.color {
            def.color = Some(color);
        }
        if let Some(schema) = self.property_schema {
            def.property_schema = schema;
        }
    }
}

// ── Relationship Types ────────────────────────────────────────────

/// Schema-level definition of an edge kind between two entity types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipTypeDef {
    pub id: RelationshipTypeId,
    pub name: String,
    pub label: String,
    pub description: Option<String>,
    pub from_type: String,
    pub to_type: String,
    pub property_schema: PropertySchema,
    pub directed: bool,
    pub version: i64,
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelationshipType {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    pub from_type: String,
    pub to_type: String,
    #[serde(default)]
    pub property_schema: PropertySchema,
    #[serde(default = "default_directed")]
    pub directed: bool,
}

fn default_directed() -> bool {
    true
}

impl NewRelationshipType {
    pub fn between(name: &str, from_type: &str, to_type: &str) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            description: None,
            from_type: from_type.to_string(),
            to_type: to_type.to_string(),
            property_schema: PropertySchema::default(),
            directed: true,
        }
    }
}

/// Partial update of a relationship type. Endpoints cannot be changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipTypePatch {
    pub label: Option<String>,
    pub description: Option<String>,
    pub property_schema: Option<PropertySchema>,
    pub directed: Option<bool>,
}

impl RelationshipTypePatch {
    pub fn apply(self, def: &mut RelationshipTypeDef) {
        if let Some(label) = self.label {
            def.label = label;
        }
        if let Some(description) = self.description {
            def.description = Some(description);
        }
        if let Some(schema) = self.property_schema {
            def.property_schema = schema;
        }
        if let Some(directed) = self.directed {
            def.directed = directed;
        }
    }
}

// ── Instances ─────────────────────────────────────────────────────

/// A node materialized in the graph store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityInstance {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub properties: Properties,
}

/// An edge materialized in the graph store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipInstance {
    pub id: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub from_id: String,
    pub to_id: String,
    pub properties: Properties,
}

// ── Connectors ────────────────────────────────────────────────────

/// Lifecycle of a data connector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Syncing,
    Error,
    Disconnected,
}

impl ConnectorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Syncing => "syncing",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "idle" => Some(Self::Idle),
            "connecting" => Some(Self::Connecting),
            "connected" => Some(Self::Connected),
            "syncing" => Some(Self::Syncing),
            "error" => Some(Self::Error),
            "disconnected" => Some(Self::Disconnected),
            _ => None,
        }
    }
}

/// Declares how source records map onto one entity type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldMapping {
    pub target_entity_type: String,
    /// Target property → source field.
    #[serde(default)]
    pub field_mappings: BTreeMap<String, String>,
    /// Column used to detect records changed since the last sync.
    #[serde(default)]
    pub change_column: Option<String>,
}

/// Configuration and last-known sync state of one connector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectorConfig {
    pub connector_id: String,
    pub source_kind: String,
    /// Opaque to the engine; interpreted by the connector implementation.
    #[serde(default)]
    pub connection_params: serde_json::Map<String, Value>,
    pub field_mapping: FieldMapping,
    /// Source table for relational connectors, optionally schema-qualified.
    #[serde(default)]
    pub source_table: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Scheduler period; `None` means manual syncs only.
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,
    /// Overrides the engine-wide batch size.
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub status: ConnectorStatus,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sync_error: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// The persisted slice of a connector's state, kept across restarts so
/// incremental syncs can resume from the last watermark.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectorState {
    pub connector_id: String,
    pub status: ConnectorStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
}

/// Outcome of one sync run. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncResult {
    pub success: bool,
    pub records_processed: u64,
    pub records_failed: u64,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
}

impl SyncResult {
    pub fn succeeded(records_processed: u64, records_failed: u64, duration_seconds: f64) -> Self {
        Self {
            success: true,
            records_processed,
            records_failed,
            duration_seconds,
            error_message: None,
        }
    }

    pub fn failed(
        records_processed: u64,
        records_failed: u64,
        duration_seconds: f64,
        error: impl ToString,
    ) -> Self {
        Self {
            success: false,
            records_processed,
            records_failed,
            duration_seconds,
            error_message: Some(error.to_string()),
        }
    }
}
