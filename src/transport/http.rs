//! HTTP + Server-Sent Events transport, built with Axum.
//!
//! # Endpoints
//! - `POST /topic` (form `TopicName`) - create a topic
//! - `GET /subto?TopicName=..[&SubscriberId=..]` - subscribe; the response is
//!   an SSE stream with one `data:` event per published message
//! - `POST /pushto` (form `TopicName`, `Message`) - publish
//!
//! Errors are returned as `{"error": "..."}` with 400 for invalid input, 404
//! for unknown topics, 409 for duplicate topics and 503 if a publish cannot
//! finish while the server shuts down.
//!
//! A subscriber that does not name itself gets a fresh UUID, so two streams
//! from the same client never collapse into one subscription. When the
//! client disconnects the SSE body is dropped, which closes the event queue
//! and cancels the streaming session.

use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures_util::{Stream, stream};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::Broker;
use crate::session::{MessageSink, StreamingSession};
use crate::utils::error::{BrokerError, DeliveryError};

/// Events buffered between a session and the HTTP body.
const SSE_BUFFER: usize = 16;

pub fn build_router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/topic", post(create_topic))
        .route("/subto", get(subscribe))
        .route("/pushto", post(push_to_topic))
        .layer(TraceLayer::new_for_http())
        .with_state(broker)
}

pub async fn start_http_server(addr: &str, broker: Arc<Broker>) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on http://{}", listener.local_addr()?);
    serve_http(listener, broker).await
}

pub async fn serve_http(listener: TcpListener, broker: Arc<Broker>) -> io::Result<()> {
    axum::serve(listener, build_router(broker)).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TopicForm {
    #[serde(default)]
    pub topic_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushForm {
    #[serde(default)]
    pub topic_name: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscribeQuery {
    #[serde(default)]
    pub topic_name: String,
    pub subscriber_id: Option<String>,
}

/// Broker failures mapped onto HTTP status codes.
#[derive(Debug)]
pub struct ApiError(pub BrokerError);

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BrokerError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            BrokerError::NotFound(_) => StatusCode::NOT_FOUND,
            BrokerError::AlreadyExists(_) => StatusCode::CONFLICT,
            BrokerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        debug!(code = self.0.code(), status = %status, "request rejected: {}", self.0);

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn create_topic(
    State(broker): State<Arc<Broker>>,
    Form(form): Form<TopicForm>,
) -> Result<impl IntoResponse, ApiError> {
    broker.create_topic(&form.topic_name)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": format!("Topic created: {}", form.topic_name) })),
    ))
}

async fn push_to_topic(
    State(broker): State<Arc<Broker>>,
    Form(form): Form<PushForm>,
) -> Result<impl IntoResponse, ApiError> {
    broker.publish_async(&form.topic_name, &form.message).await?;
    Ok(Json(json!({ "message": "Message pushed to topic" })))
}

async fn subscribe(
    State(broker): State<Arc<Broker>>,
    Query(query): Query<SubscribeQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscriber_id = query
        .subscriber_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let handle = broker.subscribe(&query.topic_name, &subscriber_id)?;
    info!(topic = %query.topic_name, subscriber = %subscriber_id, "SSE subscriber connected");

    let (events, rx) = mpsc::channel::<Event>(SSE_BUFFER);
    let disconnected = events.clone();
    let session = StreamingSession::new(broker.clone(), handle);
    tokio::spawn(session.run(SseSink { events }, async move {
        disconnected.closed().await;
    }));

    let body = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });
    Ok(Sse::new(body).keep_alive(KeepAlive::default()))
}

struct SseSink {
    events: mpsc::Sender<Event>,
}

#[async_trait]
impl MessageSink for SseSink {
    async fn deliver(&mut self, _topic: &str, message: String) -> Result<(), DeliveryError> {
        // SSE fields cannot carry carriage returns; newlines become extra data lines
        let event = Event::default().data(message.replace('\r', ""));
        self.events
            .send(event)
            .await
            .map_err(|_| DeliveryError::Closed)
    }
}
