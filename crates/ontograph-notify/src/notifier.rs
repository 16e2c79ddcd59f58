//! Channel registry and fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;

use ontograph_core::MutationEvent;

use crate::subscriber::{Subscriber, SubscriberId};

struct Member {
    handle: Arc<dyn Subscriber>,
    channels: HashSet<String>,
}

#[derive(Default)]
struct Registry {
    channels: HashMap<String, HashSet<SubscriberId>>,
    members: HashMap<SubscriberId, Member>,
}

impl Registry {
    /// Drop a subscriber from both indexes, pruning channels left empty.
    fn remove(&mut self, id: SubscriberId) -> bool {
        let Some(member) = self.members.remove(&id) else {
            return false;
        };
        for channel in member.channels {
            if let Some(ids) = self.channels.get_mut(&channel) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.channels.remove(&channel);
                }
            }
        }
        true
    }

    fn snapshot(&self, channel: &str) -> Vec<Arc<dyn Subscriber>> {
        self.channels
            .get(channel)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.members.get(id))
                    .map(|m| Arc::clone(&m.handle))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Channel-scoped subscriber registry with best-effort fan-out.
///
/// The two indexes (`channel → subscribers` and `subscriber → channels`) sit
/// behind one lock and every operation updates both under it. Deliveries
/// happen outside the lock on a snapshot of the channel's members.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    registry: Arc<Mutex<Registry>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber to a channel. Subscribing twice is a no-op.
    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>, channel: &str) {
        let id = subscriber.id();
        let mut registry = self.registry.lock().await;

        registry
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(id);
        registry
            .members
            .entry(id)
            .or_insert_with(|| Member {
                handle: subscriber,
                channels: HashSet::new(),
            })
            .channels
            .insert(channel.to_string());

        tracing::info!(
            subscriber = %id,
            channel,
            connections = registry.members.len(),
            "Subscriber joined channel"
        );
    }

    /// Remove a subscriber from every channel it belongs to.
    pub async fn unsubscribe_all(&self, id: SubscriberId) {
        let mut registry = self.registry.lock().await;
        if registry.remove(id) {
            tracing::info!(
                subscriber = %id,
                connections = registry.members.len(),
                "Subscriber disconnected"
            );
        }
    }

    /// Deliver `message` to every current member of `channel`.
    ///
    /// A failed delivery does not stop the others; the failing subscriber is
    /// evicted from all channels afterward. Unknown or empty channels are a
    /// no-op. Returns the number of successful deliveries.
    pub async fn broadcast(&self, channel: &str, message: &Value) -> usize {
        let targets = self.registry.lock().await.snapshot(channel);
        if targets.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        let mut dead = Vec::new();
        for target in targets {
            match target.deliver(message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        subscriber = %target.id(),
                        channel,
                        error = %e,
                        "Broadcast delivery failed, evicting subscriber"
                    );
                    dead.push(target.id());
                }
            }
        }

        if !dead.is_empty() {
            let mut registry = self.registry.lock().await;
            for id in dead {
                registry.remove(id);
            }
        }
        delivered
    }

    /// Deliver a message to one subscriber, evicting it on failure.
    /// Returns whether the message was delivered.
    pub async fn send_to(&self, id: SubscriberId, message: &Value) -> bool {
        let handle = {
            let registry = self.registry.lock().await;
            match registry.members.get(&id) {
                Some(member) => Arc::clone(&member.handle),
                None => return false,
            }
        };

        match handle.deliver(message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(subscriber = %id, error = %e, "Personal message failed");
                self.unsubscribe_all(id).await;
                false
            }
        }
    }

    /// Broadcast a mutation event on its channel.
    pub async fn publish(&self, event: &MutationEvent) -> usize {
        let delivered = self.broadcast(event.channel(), &event.to_message()).await;
        tracing::debug!(event = event.kind(), delivered, "Published mutation event");
        delivered
    }

    pub async fn entity_created(&self, entity_type: &str, data: Value) -> usize {
        self.publish(&MutationEvent::EntityCreated {
            entity_type: entity_type.to_string(),
            data,
        })
        .await
    }

    pub async fn entity_updated(&self, entity_type: &str, entity_id: &str, data: Value) -> usize {
        self.publish(&MutationEvent::EntityUpdated {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
        })
        .await
    }

    pub async fn relationship_created(&self, data: Value) -> usize {
        self.publish(&MutationEvent::RelationshipCreated { data }).await
    }

    /// Number of distinct live subscribers.
    pub async fn connection_count(&self) -> usize {
        self.registry.lock().await.members.len()
    }

    /// Current members of a channel, sorted.
    pub async fn channel_members(&self, channel: &str) -> Vec<SubscriberId> {
        let registry = self.registry.lock().await;
        let mut ids: Vec<SubscriberId> = registry
            .channels
            .get(channel)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Channels a subscriber belongs to, sorted.
    pub async fn channels_of(&self, id: SubscriberId) -> Vec<String> {
        let registry = self.registry.lock().await;
        let mut channels: Vec<String> = registry
            .members
            .get(&id)
            .map(|m| m.channels.iter().cloned().collect())
            .unwrap_or_default();
        channels.sort();
        channels
    }

    /// Broadcast an `{event, data}` message that is not a graph mutation.
    pub async fn notify(&self, channel: &str, kind: &str, data: Value) -> usize {
        self.broadcast(channel, &json!({"event": kind, "data": data}))
            .await
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier").finish_non_exhaustive()
    }
}
