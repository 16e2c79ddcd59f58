use thiserror::Error;

/// A message could not be handed to a subscriber. The subscriber is
/// considered dead and is evicted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("subscriber queue is full")]
    QueueFull,

    #[error("subscriber has disconnected")]
    Closed,

    #[error("delivery failed: {0}")]
    Transport(String),
}
