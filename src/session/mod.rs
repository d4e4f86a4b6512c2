//! Streaming sessions
//!
//! A `StreamingSession` owns one `SubscriberHandle` and forwards every message
//! it receives to a transport [`MessageSink`]. It keeps going until one of:
//! - the cancellation future resolves (the connection went away),
//! - the sink reports a failure,
//! - the channel is closed by an explicit unsubscribe.
//!
//! Whatever the reason, the session releases its own subscription exactly
//! once when it ends. A newer subscription that reuses the same id is never
//! touched. Dropping a session that never ran to completion (an aborted
//! task, for example) unsubscribes as well.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::broker::{Broker, SubscriberHandle};
use crate::utils::error::DeliveryError;

/// Writes messages to a live connection.
#[async_trait]
pub trait MessageSink: Send {
    async fn deliver(&mut self, topic: &str, message: String) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Cancelled,
    SinkFailed,
    ChannelClosed,
}

pub struct StreamingSession {
    broker: Arc<Broker>,
    handle: SubscriberHandle,
    finished: bool,
}

impl StreamingSession {
    pub fn new(broker: Arc<Broker>, handle: SubscriberHandle) -> Self {
        Self {
            broker,
            handle,
            finished: false,
        }
    }

    pub fn subscriber_id(&self) -> &str {
        self.handle.id()
    }

    pub fn topic(&self) -> &str {
        self.handle.topic()
    }

    pub async fn run<S, C>(mut self, mut sink: S, cancel: C) -> SessionEnd
    where
        S: MessageSink,
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        let end = loop {
            let message = tokio::select! {
                biased;
                _ = &mut cancel => break SessionEnd::Cancelled,
                next = self.handle.recv() => match next {
                    Some(message) => message,
                    None => break SessionEnd::ChannelClosed,
                },
            };

            let topic = self.handle.topic().to_string();
            tokio::select! {
                biased;
                _ = &mut cancel => break SessionEnd::Cancelled,
                delivered = sink.deliver(&topic, message) => {
                    if let Err(e) = delivered {
                        warn!(
                            topic = %topic,
                            subscriber = %self.handle.id(),
                            "delivery failed: {e}"
                        );
                        break SessionEnd::SinkFailed;
                    }
                }
            }
        };

        self.finish();
        debug!(
            topic = %self.handle.topic(),
            subscriber = %self.handle.id(),
            reason = ?end,
            "session ended"
        );
        end
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.broker.release(&self.handle);
        }
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.finish();
    }
}
