//! Subscriber channels
//!
//! Every subscription owns a bounded mailbox. The topic side pushes into it
//! during fan-out; the consuming session pulls from it through a
//! [`SubscriberHandle`].
//!
//! The mailbox never blocks a publisher indefinitely. When the queue is full
//! the configured [`OverflowPolicy`] decides what happens:
//! - `DropOldest` evicts the head of the queue and appends the new message;
//! - `Block { timeout }` waits up to `timeout` for the receiver to make room
//!   and drops the new message if it does not.
//!
//! Once a mailbox is `Closed` nothing more is enqueued. Messages buffered
//! before the close are still handed out, then the receiver sees the end of
//! the stream.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::broker::topic::SubscriberId;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    #[default]
    DropOldest,
    Block { timeout: Duration },
}

/// Per-subscription mailbox settings shared by every topic of a broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl ChannelConfig {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity: capacity.max(1),
            overflow,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY, OverflowPolicy::DropOldest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Active,
    Closed,
}

/// What happened to a message offered to one mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest buffered message.
    DroppedOldest,
    /// The queue stayed full for the whole block timeout; the new message was discarded.
    DroppedNewest,
    Closed,
}

impl PushOutcome {
    pub(crate) fn dropped(self) -> bool {
        matches!(self, PushOutcome::DroppedOldest | PushOutcome::DroppedNewest)
    }
}

#[derive(Debug)]
struct MailboxState {
    queue: VecDeque<String>,
    status: ChannelState,
}

#[derive(Debug)]
pub(crate) struct Mailbox {
    state: Mutex<MailboxState>,
    capacity: usize,
    /// Wakes the async receiver.
    ready: Notify,
    /// Wakes a publisher waiting under `OverflowPolicy::Block`.
    space: Condvar,
}

enum Take {
    Message(String),
    Empty,
    Closed,
}

impl Mailbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MailboxState {
                queue: VecDeque::with_capacity(capacity.min(1024)),
                status: ChannelState::Active,
            }),
            capacity: capacity.max(1),
            ready: Notify::new(),
            space: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, message: String, policy: OverflowPolicy) -> PushOutcome {
        let mut state = self.lock();
        if state.status == ChannelState::Closed {
            return PushOutcome::Closed;
        }

        let outcome = if state.queue.len() < self.capacity {
            state.queue.push_back(message);
            PushOutcome::Queued
        } else {
            match policy {
                OverflowPolicy::DropOldest => {
                    state.queue.pop_front();
                    state.queue.push_back(message);
                    PushOutcome::DroppedOldest
                }
                OverflowPolicy::Block { timeout } => {
                    let capacity = self.capacity;
                    let (guard, _) = self
                        .space
                        .wait_timeout_while(state, timeout, |s| {
                            s.status == ChannelState::Active && s.queue.len() >= capacity
                        })
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                    if state.status == ChannelState::Closed {
                        return PushOutcome::Closed;
                    }
                    if state.queue.len() < capacity {
                        state.queue.push_back(message);
                        PushOutcome::Queued
                    } else {
                        return PushOutcome::DroppedNewest;
                    }
                }
            }
        };

        drop(state);
        self.ready.notify_one();
        outcome
    }

    /// Transitions to `Closed`. Returns `false` if it already was.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.lock();
        if state.status == ChannelState::Closed {
            return false;
        }
        state.status = ChannelState::Closed;
        drop(state);

        self.ready.notify_one();
        self.space.notify_all();
        true
    }

    pub(crate) fn status(&self) -> ChannelState {
        self.lock().status
    }

    fn take(&self) -> Take {
        let mut state = self.lock();
        match state.queue.pop_front() {
            Some(message) => {
                drop(state);
                self.space.notify_one();
                Take::Message(message)
            }
            None if state.status == ChannelState::Closed => Take::Closed,
            None => Take::Empty,
        }
    }

    fn len(&self) -> usize {
        self.lock().queue.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    Empty,
    Closed,
}

/// Receiving end of a subscription, returned by `Broker::subscribe`.
///
/// Dropping the handle does not unsubscribe; the owning session is
/// responsible for calling `Broker::unsubscribe`.
#[derive(Debug)]
pub struct SubscriberHandle {
    id: SubscriberId,
    topic: String,
    mailbox: Arc<Mailbox>,
}

impl SubscriberHandle {
    pub(crate) fn new(id: SubscriberId, topic: String, mailbox: Arc<Mailbox>) -> Self {
        Self { id, topic, mailbox }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub(crate) fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    /// Waits for the next message. Returns `None` once the channel is closed
    /// and its buffer has been drained.
    ///
    /// Cancel safe: dropping the future before it resolves loses nothing.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.mailbox.take() {
                Take::Message(message) => return Some(message),
                Take::Closed => return None,
                Take::Empty => self.mailbox.ready.notified().await,
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<String, TryRecvError> {
        match self.mailbox.take() {
            Take::Message(message) => Ok(message),
            Take::Empty => Err(TryRecvError::Empty),
            Take::Closed => Err(TryRecvError::Closed),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.mailbox.status()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ChannelState::Closed
    }

    /// Number of messages waiting in the buffer.
    pub fn pending(&self) -> usize {
        self.mailbox.len()
    }
}
