//! Mutation events fanned out to real-time subscribers.
//!
//! Events are pre-shaped messages on the `graph_updates` channel; the
//! transport layer forwards them verbatim (e.g. as WebSocket JSON frames).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel carrying graph mutation events.
pub const GRAPH_UPDATES_CHANNEL: &str = "graph_updates";

/// Channel carrying general system notifications.
pub const NOTIFICATIONS_CHANNEL: &str = "notifications";

/// A successful mutation of the graph, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MutationEvent {
    EntityCreated {
        entity_type: String,
        data: Value,
    },
    EntityUpdated {
        entity_type: String,
        entity_id: String,
        data: Value,
    },
    RelationshipCreated {
        data: Value,
    },
}

impl MutationEvent {
    /// The channel this event is broadcast on.
    pub fn channel(&self) -> &'static str {
        GRAPH_UPDATES_CHANNEL
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::EntityCreated { .. } => "entity_created",
            Self::EntityUpdated { .. } => "entity_updated",
            Self::RelationshipCreated { .. } => "relationship_created",
        }
    }

    /// Render the wire message delivered to subscribers.
    pub fn to_message(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
