//! Ontograph Notify: real-time fan-out of graph changes.
//!
//! A [`ChangeNotifier`] keeps a registry of live subscribers grouped into
//! named channels and delivers JSON messages to every member of a channel.
//! Subscribers whose delivery fails are dropped from every channel.

pub mod error;
pub mod notifier;
pub mod subscriber;

pub use error::DeliveryError;
pub use notifier::ChangeNotifier;
pub use subscriber::{ChannelSubscriber, Subscriber, SubscriberId};
