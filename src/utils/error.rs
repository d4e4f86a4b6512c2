//! The `error` module defines the error types used within `topicast`.
//!
//! Broker operations return [`BrokerError`]. Apart from `Unavailable`, which
//! only shows up while the runtime shuts down, every variant is a caller
//! error, and none of them is fatal to the process. Transport-side delivery failures
//! are reported as [`DeliveryError`] and stay local to the session that hit
//! them. The interactive client wraps its own failures in [`ClientError`].

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Empty or malformed input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The named topic has never been created.
    #[error("topic not found: {0}")]
    NotFound(String),

    /// A topic with that name is already registered.
    #[error("topic already exists: {0}")]
    AlreadyExists(String),

    /// The broker could not run the operation to completion.
    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

impl BrokerError {
    /// Stable machine-readable code, used by the transports.
    pub fn code(&self) -> &'static str {
        match self {
            BrokerError::InvalidArgument(_) => "invalid_argument",
            BrokerError::NotFound(_) => "not_found",
            BrokerError::AlreadyExists(_) => "already_exists",
            BrokerError::Unavailable(_) => "unavailable",
        }
    }
}

/// Failure to hand a message to a live connection.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}
