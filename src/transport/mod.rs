//! The `transport` module exposes the broker over the network.
//!
//! - `http`: the HTTP endpoints, streaming subscriptions as Server-Sent Events.
//! - `websocket`: a JSON protocol over WebSockets, used by the interactive client.
//! - `message`: the WebSocket protocol types.

pub mod http;
pub mod message;
pub mod websocket;

pub use http::{build_router, start_http_server};
pub use message::{ClientMessage, ServerMessage};
pub use websocket::start_websocket_server;

#[cfg(test)]
mod tests;
