//! JSON protocol spoken over the WebSocket transport.
//!
//! Every frame is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::utils::error::BrokerError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "create_topic")]
    CreateTopic { topic: String },
    #[serde(rename = "subscribe")]
    Subscribe {
        topic: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscriber_id: Option<String>,
    },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { topic: String },
    #[serde(rename = "publish")]
    Publish { topic: String, payload: String },
}

impl ClientMessage {
    pub fn op(&self) -> &'static str {
        match self {
            ClientMessage::CreateTopic { .. } => "create_topic",
            ClientMessage::Subscribe { .. } => "subscribe",
            ClientMessage::Unsubscribe { .. } => "unsubscribe",
            ClientMessage::Publish { .. } => "publish",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "ack")]
    Ack { op: String, topic: String },
    #[serde(rename = "error")]
    Error { code: String, message: String },
    #[serde(rename = "message")]
    Message {
        topic: String,
        payload: String,
        /// Milliseconds since the UNIX epoch, stamped at delivery.
        timestamp: i64,
    },
}

impl ServerMessage {
    pub fn ack(op: &str, topic: &str) -> Self {
        ServerMessage::Ack {
            op: op.to_string(),
            topic: topic.to_string(),
        }
    }
}

impl From<&BrokerError> for ServerMessage {
    fn from(err: &BrokerError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
