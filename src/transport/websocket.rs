//! WebSocket transport
//!
//! A minimal WebSocket server that translates protocol JSON messages into
//! broker operations. Responsibilities:
//! - Accept TCP/WebSocket connections, refusing any beyond `max_connections`
//! - Give every connection an id (`client-<uuid>`) used as the default
//!   subscriber id
//! - Run one `StreamingSession` per subscription, writing into the
//!   connection's outbound queue
//! - Cancel every session of a connection when it goes away
//!
//! Each connection has a single writer task draining an unbounded outbound
//! queue into the socket. Replies and delivered messages share that queue,
//! so a reply is always written before anything sent after it.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::broker::Broker;
use crate::session::{MessageSink, StreamingSession};
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::DeliveryError;

pub async fn start_websocket_server(
    addr: &str,
    broker: Arc<Broker>,
    max_connections: usize,
) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    serve_websocket(listener, broker, max_connections).await
}

/// Accept loop over an already-bound listener.
pub async fn serve_websocket(
    listener: TcpListener,
    broker: Arc<Broker>,
    max_connections: usize,
) -> io::Result<()> {
    let active = Arc::new(AtomicUsize::new(0));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {e}");
                continue;
            }
        };

        if active.load(Ordering::SeqCst) >= max_connections {
            warn!(%peer, max_connections, "connection limit reached, refusing client");
            drop(stream);
            continue;
        }

        let slot = ConnectionSlot::acquire(active.clone());
        let broker = broker.clone();
        spawn(async move {
            let _slot = slot;
            handle_connection(stream, peer, broker).await;
        });
    }
}

/// Counts a live connection until dropped.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, broker: Arc<Broker>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake error: {e}");
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let mut connection = Connection::new(broker, tx);
    let client_id = connection.id().to_string();
    info!(client = %client_id, %peer, "client connected");

    {
        let client_id = client_id.clone();
        spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    warn!("Failed to send message to {client_id}: {e}");
                    break;
                }
            }
            debug!("Send loop closed for {client_id}");
        });
    }

    while let Some(frame) = ws_receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Read error from {client_id}: {e}");
                break;
            }
        };
        if frame.is_close() {
            break;
        }
        if !frame.is_text() {
            continue;
        }
        match frame.to_text() {
            Ok(text) => connection.handle_text(text).await,
            Err(e) => warn!("Unreadable frame from {client_id}: {e}"),
        }
    }

    connection.close();
    info!(client = %client_id, "client disconnected");
}

struct ActiveSubscription {
    subscriber_id: String,
    cancel: oneshot::Sender<()>,
}

/// Protocol state of one WebSocket connection.
pub(crate) struct Connection {
    id: String,
    broker: Arc<Broker>,
    outbound: mpsc::UnboundedSender<WsMessage>,
    /// topic -> subscription opened by this connection
    subscriptions: HashMap<String, ActiveSubscription>,
}

impl Connection {
    pub(crate) fn new(broker: Arc<Broker>, outbound: mpsc::UnboundedSender<WsMessage>) -> Self {
        Self {
            id: format!("client-{}", Uuid::new_v4()),
            broker,
            outbound,
            subscriptions: HashMap::new(),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle(msg).await,
            Err(err) => {
                warn!(
                    "Invalid client message from {}: {err} | {}",
                    self.id,
                    &text.chars().take(100).collect::<String>()
                );
                self.reply(&ServerMessage::Error {
                    code: "invalid_argument".to_string(),
                    message: format!("invalid message: {err}"),
                });
            }
        }
    }

    /// Requests are handled one at a time, so replies go out in request order.
    pub(crate) async fn handle(&mut self, msg: ClientMessage) {
        let op = msg.op();
        match msg {
            ClientMessage::CreateTopic { topic } => match self.broker.create_topic(&topic) {
                Ok(()) => self.reply(&ServerMessage::ack(op, &topic)),
                Err(e) => self.reply(&ServerMessage::from(&e)),
            },
            ClientMessage::Subscribe {
                topic,
                subscriber_id,
            } => self.subscribe(topic, subscriber_id),
            ClientMessage::Unsubscribe { topic } => {
                if let Some(sub) = self.subscriptions.remove(&topic) {
                    self.broker.unsubscribe(&topic, &sub.subscriber_id);
                    let _ = sub.cancel.send(());
                    debug!("{} unsubscribed from {topic}", self.id);
                }
                self.reply(&ServerMessage::ack(op, &topic));
            }
            ClientMessage::Publish { topic, payload } => {
                match self.broker.publish_async(&topic, &payload).await {
                    Ok(report) => {
                        debug!(
                            "{} published to {topic} ({} delivered)",
                            self.id, report.delivered
                        );
                        self.reply(&ServerMessage::ack(op, &topic));
                    }
                    Err(e) => self.reply(&ServerMessage::from(&e)),
                }
            }
        }
    }

    fn subscribe(&mut self, topic: String, subscriber_id: Option<String>) {
        if self.subscriptions.contains_key(&topic) {
            self.reply(&ServerMessage::Error {
                code: "already_exists".to_string(),
                message: format!("already subscribed to {topic} on this connection"),
            });
            return;
        }

        let subscriber_id = subscriber_id.unwrap_or_else(|| self.id.clone());
        let handle = match self.broker.subscribe(&topic, &subscriber_id) {
            Ok(handle) => handle,
            Err(e) => {
                self.reply(&ServerMessage::from(&e));
                return;
            }
        };

        // ack goes out before any delivered message
        self.reply(&ServerMessage::ack("subscribe", &topic));

        let (cancel, cancelled) = oneshot::channel::<()>();
        let session = StreamingSession::new(self.broker.clone(), handle);
        let sink = WsSink {
            outbound: self.outbound.clone(),
        };
        spawn(session.run(sink, async move {
            // fires on explicit cancel and when the sender is dropped
            let _ = cancelled.await;
        }));

        debug!("{} subscribed to {topic} as {subscriber_id}", self.id);
        self.subscriptions.insert(
            topic,
            ActiveSubscription {
                subscriber_id,
                cancel,
            },
        );
    }

    /// Cancel every session opened by this connection.
    pub(crate) fn close(&mut self) {
        for (topic, sub) in self.subscriptions.drain() {
            let _ = sub.cancel.send(());
            debug!("{} dropped subscription to {topic}", self.id);
        }
    }

    fn reply(&self, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => {
                let _ = self.outbound.send(WsMessage::text(json));
            }
            Err(e) => warn!("Failed to encode reply for {}: {e}", self.id),
        }
    }
}

/// Forwards delivered messages into a connection's outbound queue.
struct WsSink {
    outbound: mpsc::UnboundedSender<WsMessage>,
}

#[async_trait]
impl MessageSink for WsSink {
    async fn deliver(&mut self, topic: &str, message: String) -> Result<(), DeliveryError> {
        let frame = ServerMessage::Message {
            topic: topic.to_string(),
            payload: message,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let json = serde_json::to_string(&frame)?;
        self.outbound
            .send(WsMessage::text(json))
            .map_err(|_| DeliveryError::Closed)
    }
}
