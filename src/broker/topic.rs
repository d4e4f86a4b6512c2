//! Topic management
//!
//! A `Topic` owns the live subscriber map for one topic name. Two locks are
//! involved:
//! - `subscribers` guards the map and is only held for short, non-blocking
//!   work (register, remove, snapshot);
//! - `publishing` serialises fan-out, so two publishes to the same topic
//!   never interleave.
//!
//! Fan-out pushes into a snapshot of the map taken under `publishing`. A
//! channel closed mid fan-out simply refuses the message, and a publisher
//! waiting on a full channel never keeps subscribe or unsubscribe waiting.
//! Topics never share a lock: work on one topic cannot stall another.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::broker::channel::{ChannelConfig, Mailbox, PushOutcome, SubscriberHandle};
use crate::utils::error::BrokerError;

pub type SubscriberId = String;

/// Result of one fan-out pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOut {
    /// Subscribers the message was queued for (including after an eviction).
    pub delivered: usize,
    /// Subscribers whose queue overflowed while handling this message.
    pub dropped: Vec<SubscriberId>,
}

#[derive(Debug)]
pub struct Topic {
    name: String,
    subscribers: Mutex<HashMap<SubscriberId, Arc<Mailbox>>>,
    publishing: Mutex<()>,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: Mutex::new(HashMap::new()),
            publishing: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Arc<Mailbox>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber. Fails if the id is empty or already taken.
    pub fn subscribe(
        &self,
        id: &str,
        config: &ChannelConfig,
    ) -> Result<SubscriberHandle, BrokerError> {
        if id.is_empty() {
            return Err(BrokerError::InvalidArgument(
                "subscriber id is required".to_string(),
            ));
        }

        match self.lock().entry(id.to_string()) {
            Entry::Occupied(_) => Err(BrokerError::InvalidArgument(format!(
                "subscriber '{id}' is already registered on topic '{}'",
                self.name
            ))),
            Entry::Vacant(slot) => {
                let mailbox = Arc::new(Mailbox::new(config.capacity));
                slot.insert(mailbox.clone());
                Ok(SubscriberHandle::new(
                    id.to_string(),
                    self.name.clone(),
                    mailbox,
                ))
            }
        }
    }

    /// Remove a subscriber and close its channel. Removing an unknown id is a
    /// no-op; returns whether anything was removed.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let mut subscribers = self.lock();
        match subscribers.remove(id) {
            Some(mailbox) => {
                mailbox.close();
                true
            }
            None => false,
        }
    }

    /// Remove `id` only while it is still bound to `mailbox`. A newer
    /// subscription that reused the id stays registered.
    pub(crate) fn unsubscribe_owned(&self, id: &str, mailbox: &Arc<Mailbox>) -> bool {
        let mut subscribers = self.lock();
        match subscribers.get(id) {
            Some(current) if Arc::ptr_eq(current, mailbox) => {
                subscribers.remove(id);
                mailbox.close();
                true
            }
            _ => false,
        }
    }

    /// Offer `message` to every subscriber currently registered.
    pub fn fan_out(&self, message: &str, config: &ChannelConfig) -> FanOut {
        let _publishing = self
            .publishing
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let subscribers: Vec<(SubscriberId, Arc<Mailbox>)> = self
            .lock()
            .iter()
            .map(|(id, mailbox)| (id.clone(), mailbox.clone()))
            .collect();
        let mut report = FanOut::default();

        for (id, mailbox) in subscribers {
            let outcome = mailbox.push(message.to_string(), config.overflow);
            if outcome.dropped() {
                report.dropped.push(id);
            }
            if matches!(outcome, PushOutcome::Queued | PushOutcome::DroppedOldest) {
                report.delivered += 1;
            }
        }

        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub fn has_subscriber(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Channels still reachable from the map that are no longer `Active`.
    #[cfg(test)]
    pub(crate) fn closed_subscribers(&self) -> usize {
        use crate::broker::channel::ChannelState;

        self.lock()
            .values()
            .filter(|mailbox| mailbox.status() == ChannelState::Closed)
            .count()
    }
}
