//! # topicast
//!
//! `topicast` is a minimal, in-memory publish/subscribe broker. Clients
//! create named topics, subscribe to them and receive a live push of every
//! message published afterwards. Delivery is best effort to whoever is
//! connected at publish time: nothing is persisted or replayed.
//!
//! ## Core Modules
//!
//! - `broker`: the topic registry, per-topic fan-out and bounded subscriber channels.
//! - `session`: drives one subscription into a live connection and cleans it up.
//! - `transport`: HTTP/SSE and WebSocket front-ends over the broker.
//! - `client`: the interactive command-line client.
//! - `config`: layered configuration (defaults, file, environment).
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod session;
pub mod transport;
pub mod utils;

pub use broker::Broker;
