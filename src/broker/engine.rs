//! Broker engine
//!
//! This module contains the topic registry and the public broker facade:
//! - creating topics (exactly once per name)
//! - subscribing and unsubscribing channels on a topic
//! - publishing a message to every current subscriber of a topic
//!
//! Concurrency and usage notes:
//! - The broker is shared as `Arc<Broker>`; every method takes `&self`.
//! - The topic map sits behind a `RwLock` that is held only to create or look
//!   up a topic, never across fan-out. Fan-out is serialised per topic (see
//!   `topic.rs`), so publishing to one topic never waits on another.
//! - Overflowing subscribers are reported as `BrokerEvent::SlowConsumerDropped`
//!   on the event channel and in the logs, never as publish errors.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::broker::channel::{ChannelConfig, OverflowPolicy, SubscriberHandle};
use crate::broker::topic::{SubscriberId, Topic};
use crate::utils::error::BrokerError;

/// Buffered events per `events()` receiver before it starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Signals emitted for observers; none of them is a failure of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    SlowConsumerDropped {
        topic: String,
        subscriber_id: SubscriberId,
    },
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Debug)]
pub struct Broker {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    config: ChannelConfig,
    events: broadcast::Sender<BrokerEvent>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

impl Broker {
    pub fn new(config: ChannelConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            topics: RwLock::new(HashMap::new()),
            config,
            events,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Register an empty topic. Only the first caller for a name succeeds.
    pub fn create_topic(&self, name: &str) -> Result<(), BrokerError> {
        if name.is_empty() {
            return Err(BrokerError::InvalidArgument(
                "topic name is required".to_string(),
            ));
        }

        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        match topics.entry(name.to_string()) {
            Entry::Occupied(_) => Err(BrokerError::AlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Topic::new(name)));
                info!(topic = %name, "topic created");
                Ok(())
            }
        }
    }

    pub fn subscribe(
        &self,
        topic: &str,
        subscriber_id: &str,
    ) -> Result<SubscriberHandle, BrokerError> {
        let topic = self.require_topic(topic)?;
        let handle = topic.subscribe(subscriber_id, &self.config)?;
        debug!(topic = %topic.name(), subscriber = %subscriber_id, "subscribed");
        Ok(handle)
    }

    /// Close and remove a subscription. Unknown topics and ids are ignored.
    pub fn unsubscribe(&self, topic: &str, subscriber_id: &str) -> bool {
        let Some(topic) = self.topic(topic) else {
            return false;
        };
        let removed = topic.unsubscribe(subscriber_id);
        if removed {
            debug!(topic = %topic.name(), subscriber = %subscriber_id, "unsubscribed");
        }
        removed
    }

    /// Release the subscription behind `handle`. Unlike `unsubscribe`, this
    /// never touches a later subscription registered under the same id.
    pub fn release(&self, handle: &SubscriberHandle) -> bool {
        let Some(topic) = self.topic(handle.topic()) else {
            return false;
        };
        let removed = topic.unsubscribe_owned(handle.id(), handle.mailbox());
        if removed {
            debug!(topic = %topic.name(), subscriber = %handle.id(), "released");
        }
        removed
    }

    /// Fan `message` out to every subscriber registered when the fan-out
    /// starts. Under `OverflowPolicy::Block` this can wait on the calling
    /// thread; async code should use `publish_async`.
    pub fn publish(&self, topic: &str, message: &str) -> Result<PublishReport, BrokerError> {
        let topic = self.require_topic(topic)?;
        if message.is_empty() {
            return Err(BrokerError::InvalidArgument(
                "message is required".to_string(),
            ));
        }

        let fan_out = topic.fan_out(message, &self.config);
        for subscriber_id in &fan_out.dropped {
            warn!(
                topic = %topic.name(),
                subscriber = %subscriber_id,
                "slow consumer, message dropped"
            );
            // No receivers is fine.
            let _ = self.events.send(BrokerEvent::SlowConsumerDropped {
                topic: topic.name().to_string(),
                subscriber_id: subscriber_id.clone(),
            });
        }

        debug!(
            topic = %topic.name(),
            delivered = fan_out.delivered,
            dropped = fan_out.dropped.len(),
            "published"
        );

        Ok(PublishReport {
            delivered: fan_out.delivered,
            dropped: fan_out.dropped.len(),
        })
    }

    /// `publish` for async callers. Under `OverflowPolicy::Block` the fan-out
    /// can wait on full channels, so it runs on the blocking pool and the
    /// calling worker stays free to drive the sessions that drain them.
    pub async fn publish_async(
        self: &Arc<Self>,
        topic: &str,
        message: &str,
    ) -> Result<PublishReport, BrokerError> {
        if !matches!(self.config.overflow, OverflowPolicy::Block { .. }) {
            return self.publish(topic, message);
        }

        let broker = Arc::clone(self);
        let (topic, message) = (topic.to_string(), message.to_string());
        match tokio::task::spawn_blocking(move || broker.publish(&topic, &message)).await {
            Ok(report) => report,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(BrokerError::Unavailable(e.to_string())),
        }
    }

    /// Receive `BrokerEvent`s emitted from now on.
    pub fn events(&self) -> broadcast::Receiver<BrokerEvent> {
        self.events.subscribe()
    }

    pub fn topic_names(&self) -> Vec<String> {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = topics.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn subscriber_count(&self, topic: &str) -> Option<usize> {
        self.topic(topic).map(|t| t.subscriber_count())
    }

    pub(crate) fn topic(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn require_topic(&self, name: &str) -> Result<Arc<Topic>, BrokerError> {
        if name.is_empty() {
            return Err(BrokerError::InvalidArgument(
                "topic name is required".to_string(),
            ));
        }
        self.topic(name)
            .ok_or_else(|| BrokerError::NotFound(name.to_string()))
    }
}
