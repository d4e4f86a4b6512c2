//! The broker: topic registry, per-topic fan-out and subscriber channels.
//!
//! Public types:
//! - `Broker`: create topics, subscribe, unsubscribe, publish.
//! - `SubscriberHandle`: the receiving end of one subscription.
//! - `ChannelConfig` / `OverflowPolicy`: per-subscription queue settings.

pub mod channel;
pub mod engine;
pub mod topic;

pub use channel::{ChannelConfig, ChannelState, OverflowPolicy, SubscriberHandle, TryRecvError};
pub use engine::{Broker, BrokerEvent, PublishReport};
pub use topic::SubscriberId;
