use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tower::ServiceExt;
use tungstenite::protocol::Message as WsMessage;

use super::http::build_router;
use super::message::{ClientMessage, ServerMessage};
use super::websocket::Connection;
use crate::broker::{Broker, ChannelConfig, OverflowPolicy};

fn connection() -> (
    Arc<Broker>,
    Connection,
    mpsc::UnboundedReceiver<WsMessage>,
) {
    let broker = Arc::new(Broker::default());
    let (tx, rx) = mpsc::unbounded_channel();
    let connection = Connection::new(broker.clone(), tx);
    (broker, connection, rx)
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<WsMessage>) -> ServerMessage {
    let msg = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no frame within a second")
        .expect("outbound queue closed");
    if let WsMessage::Text(text) = msg {
        serde_json::from_str(&text).unwrap()
    } else {
        panic!("Expected a text message");
    }
}

async fn wait_for_subscribers(broker: &Broker, topic: &str, expected: usize) {
    for _ in 0..100 {
        if broker.subscriber_count(topic) == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("topic {topic} never reached {expected} subscribers");
}

fn form_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn test_client_message_wire_format() {
    let msg: ClientMessage =
        serde_json::from_value(json!({ "type": "subscribe", "topic": "news" })).unwrap();
    assert_eq!(
        msg,
        ClientMessage::Subscribe {
            topic: "news".to_string(),
            subscriber_id: None,
        }
    );

    let ack = serde_json::to_value(ServerMessage::ack("publish", "news")).unwrap();
    assert_eq!(
        ack,
        json!({ "type": "ack", "op": "publish", "topic": "news" })
    );
}

#[tokio::test]
async fn test_handle_create_topic() {
    let (broker, mut connection, mut rx) = connection();

    connection
        .handle_text(&json!({ "type": "create_topic", "topic": "news" }).to_string())
        .await;
    assert_eq!(next_frame(&mut rx).await, ServerMessage::ack("create_topic", "news"));
    assert_eq!(broker.topic_names(), vec!["news".to_string()]);

    connection
        .handle_text(&json!({ "type": "create_topic", "topic": "news" }).to_string())
        .await;
    match next_frame(&mut rx).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "already_exists"),
        other => panic!("Expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handle_subscribe_and_publish() {
    let (broker, mut connection, mut rx) = connection();
    broker.create_topic("news").unwrap();

    connection
        .handle(ClientMessage::Subscribe {
            topic: "news".to_string(),
            subscriber_id: None,
        })
        .await;
    assert_eq!(next_frame(&mut rx).await, ServerMessage::ack("subscribe", "news"));
    // the connection id doubles as the subscriber id
    assert!(broker.topic("news").unwrap().has_subscriber(connection.id()));

    connection
        .handle(ClientMessage::Publish {
            topic: "news".to_string(),
            payload: "hello".to_string(),
        })
        .await;

    let mut saw_ack = false;
    let mut saw_message = false;
    for _ in 0..2 {
        match next_frame(&mut rx).await {
            ServerMessage::Ack { op, .. } => {
                assert_eq!(op, "publish");
                saw_ack = true;
            }
            ServerMessage::Message { topic, payload, .. } => {
                assert_eq!(topic, "news");
                assert_eq!(payload, "hello");
                saw_message = true;
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
    assert!(saw_ack && saw_message);
}

#[tokio::test]
async fn test_handle_subscribe_to_missing_topic() {
    let (_broker, mut connection, mut rx) = connection();

    connection
        .handle(ClientMessage::Subscribe {
            topic: "missing".to_string(),
            subscriber_id: Some("a".to_string()),
        })
        .await;
    match next_frame(&mut rx).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "not_found"),
        other => panic!("Expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handle_duplicate_subscription_on_one_connection() {
    let (broker, mut connection, mut rx) = connection();
    broker.create_topic("news").unwrap();

    let subscribe = json!({ "type": "subscribe", "topic": "news", "subscriber_id": "a" });
    connection.handle_text(&subscribe.to_string()).await;
    next_frame(&mut rx).await;
    connection.handle_text(&subscribe.to_string()).await;
    match next_frame(&mut rx).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "already_exists"),
        other => panic!("Expected Error, got {other:?}"),
    }
    assert_eq!(broker.subscriber_count("news"), Some(1));
}

#[tokio::test]
async fn test_handle_unsubscribe() {
    let (broker, mut connection, mut rx) = connection();
    broker.create_topic("news").unwrap();

    connection
        .handle(ClientMessage::Subscribe {
            topic: "news".to_string(),
            subscriber_id: Some("a".to_string()),
        })
        .await;
    next_frame(&mut rx).await;

    connection
        .handle(ClientMessage::Unsubscribe {
            topic: "news".to_string(),
        })
        .await;
    assert_eq!(next_frame(&mut rx).await, ServerMessage::ack("unsubscribe", "news"));
    assert_eq!(broker.subscriber_count("news"), Some(0));

    // unsubscribing again is still acknowledged
    connection
        .handle(ClientMessage::Unsubscribe {
            topic: "news".to_string(),
        })
        .await;
    assert_eq!(next_frame(&mut rx).await, ServerMessage::ack("unsubscribe", "news"));
}

#[tokio::test]
async fn test_resubscribe_survives_old_session_teardown() {
    let (broker, mut connection, mut rx) = connection();
    broker.create_topic("news").unwrap();
    let subscribe = || ClientMessage::Subscribe {
        topic: "news".to_string(),
        subscriber_id: Some("a".to_string()),
    };

    connection.handle(subscribe()).await;
    next_frame(&mut rx).await;
    tokio::task::yield_now().await;

    connection
        .handle(ClientMessage::Unsubscribe {
            topic: "news".to_string(),
        })
        .await;
    next_frame(&mut rx).await;
    connection.handle(subscribe()).await;
    assert_eq!(next_frame(&mut rx).await, ServerMessage::ack("subscribe", "news"));

    // give the first session time to wind down
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(broker.subscriber_count("news"), Some(1));

    connection
        .handle(ClientMessage::Publish {
            topic: "news".to_string(),
            payload: "hello".to_string(),
        })
        .await;
    let mut payloads = Vec::new();
    for _ in 0..2 {
        if let ServerMessage::Message { payload, .. } = next_frame(&mut rx).await {
            payloads.push(payload);
        }
    }
    assert_eq!(payloads, vec!["hello".to_string()]);
}

#[tokio::test]
async fn test_publish_under_block_policy_reaches_slow_subscriber() {
    let broker = Arc::new(Broker::new(ChannelConfig::new(
        1,
        OverflowPolicy::Block {
            timeout: Duration::from_secs(2),
        },
    )));
    broker.create_topic("news").unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut connection = Connection::new(broker.clone(), tx);

    connection
        .handle(ClientMessage::Subscribe {
            topic: "news".to_string(),
            subscriber_id: None,
        })
        .await;
    next_frame(&mut rx).await;

    for i in 0..3 {
        connection
            .handle(ClientMessage::Publish {
                topic: "news".to_string(),
                payload: format!("m{i}"),
            })
            .await;
    }

    let mut payloads = Vec::new();
    let mut acks = 0;
    while payloads.len() < 3 || acks < 3 {
        match next_frame(&mut rx).await {
            ServerMessage::Ack { .. } => acks += 1,
            ServerMessage::Message { payload, .. } => payloads.push(payload),
            other => panic!("unexpected frame {other:?}"),
        }
    }
    assert_eq!(payloads, vec!["m0", "m1", "m2"]);
}

#[tokio::test]
async fn test_handle_invalid_message() {
    let (_broker, mut connection, mut rx) = connection();

    connection.handle_text("{\"type\": \"teleport\"}").await;
    match next_frame(&mut rx).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "invalid_argument"),
        other => panic!("Expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_close_cancels_sessions() {
    let (broker, mut connection, mut rx) = connection();
    broker.create_topic("a").unwrap();
    broker.create_topic("b").unwrap();

    for topic in ["a", "b"] {
        connection
            .handle(ClientMessage::Subscribe {
                topic: topic.to_string(),
                subscriber_id: None,
            })
            .await;
        next_frame(&mut rx).await;
    }

    connection.close();
    wait_for_subscribers(&broker, "a", 0).await;
    wait_for_subscribers(&broker, "b", 0).await;
}

#[tokio::test]
async fn test_http_create_topic() {
    let broker = Arc::new(Broker::default());

    let response = build_router(broker.clone())
        .oneshot(form_post("/topic", "TopicName=news"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        json_body(response).await,
        json!({ "message": "Topic created: news" })
    );

    let response = build_router(broker.clone())
        .oneshot(form_post("/topic", "TopicName=news"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = build_router(broker)
        .oneshot(form_post("/topic", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn test_http_push_errors() {
    let broker = Arc::new(Broker::default());

    let response = build_router(broker.clone())
        .oneshot(form_post("/pushto", "TopicName=nowhere&Message=hi"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    broker.create_topic("news").unwrap();
    let response = build_router(broker.clone())
        .oneshot(form_post("/pushto", "TopicName=news"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = build_router(broker)
        .oneshot(form_post("/pushto", "TopicName=news&Message=hi"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "message": "Message pushed to topic" })
    );
}

#[tokio::test]
async fn test_http_subscribe_streams_events_until_disconnect() {
    let broker = Arc::new(Broker::default());
    broker.create_topic("news").unwrap();

    let response = build_router(broker.clone())
        .oneshot(
            Request::get("/subto?TopicName=news&SubscriberId=a")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(broker.subscriber_count("news"), Some(1));

    broker.publish("news", "hello").unwrap();

    let mut body = response.into_body().into_data_stream();
    let chunk = timeout(Duration::from_secs(1), body.next())
        .await
        .expect("no event within a second")
        .expect("stream ended")
        .unwrap();
    assert_eq!(std::str::from_utf8(&chunk).unwrap(), "data: hello\n\n");

    drop(body);
    wait_for_subscribers(&broker, "news", 0).await;
}

#[tokio::test]
async fn test_http_subscribe_to_missing_topic() {
    let broker = Arc::new(Broker::default());

    let response = build_router(broker)
        .oneshot(
            Request::get("/subto?TopicName=missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
