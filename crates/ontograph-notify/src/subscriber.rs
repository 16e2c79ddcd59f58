//! Subscriber handles.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::DeliveryError;

/// Opaque identity of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something that can receive notifier messages.
///
/// Implementations must not block for long inside `deliver`; the notifier
/// awaits each delivery in turn.
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn id(&self) -> SubscriberId;

    async fn deliver(&self, message: &Value) -> Result<(), DeliveryError>;
}

/// A subscriber backed by a bounded queue that a transport task drains.
///
/// A full queue counts as a failed delivery, so a slow consumer is evicted
/// rather than stalling the broadcast.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Value>,
}

impl ChannelSubscriber {
    /// Create a subscriber and the receiving half its transport reads from.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: SubscriberId::new(),
                tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    async fn deliver(&self, message: &Value) -> Result<(), DeliveryError> {
        self.tx.try_send(message.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn delivered_messages_reach_the_receiver() {
        let (sub, mut rx) = ChannelSubscriber::new(4);
        sub.deliver(&json!({"n": 1})).await.unwrap();
        assert_eq!(rx.recv().await, Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn full_queue_is_a_delivery_failure() {
        let (sub, _rx) = ChannelSubscriber::new(1);
        sub.deliver(&json!(1)).await.unwrap();
        assert_eq!(sub.deliver(&json!(2)).await, Err(DeliveryError::QueueFull));
    }

    #[tokio::test]
    async fn dropped_receiver_is_a_delivery_failure() {
        let (sub, rx) = ChannelSubscriber::new(4);
        drop(rx);
        assert_eq!(sub.deliver(&json!(1)).await, Err(DeliveryError::Closed));
    }
}
