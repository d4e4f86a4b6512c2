use std::time::Duration;

use serde::Deserialize;

use crate::broker::{ChannelConfig, OverflowPolicy};

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub log: LogSettings,
}

/// Where the two listeners bind.
///
/// `port` serves the WebSocket protocol, `http_port` the HTTP/SSE endpoints.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub http_port: u16,
}

impl ServerSettings {
    pub fn websocket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowMode {
    DropOldest,
    Block,
}

/// Configuration settings for the broker.
///
/// Controls the connection limit and the shape of every subscriber queue.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub max_connections: usize,
    pub channel_capacity: usize,
    pub overflow_policy: OverflowMode,
    pub block_timeout_ms: u64,
}

impl From<&BrokerSettings> for ChannelConfig {
    fn from(settings: &BrokerSettings) -> Self {
        let overflow = match settings.overflow_policy {
            OverflowMode::DropOldest => OverflowPolicy::DropOldest,
            OverflowMode::Block => OverflowPolicy::Block {
                timeout: Duration::from_millis(settings.block_timeout_ms),
            },
        };
        ChannelConfig::new(settings.channel_capacity, overflow)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub http_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub max_connections: Option<usize>,
    pub channel_capacity: Option<usize>,
    pub overflow_policy: Option<OverflowMode>,
    pub block_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                http_port: 8000,
            },
            broker: BrokerSettings {
                max_connections: 1000,
                channel_capacity: 64,
                overflow_policy: OverflowMode::DropOldest,
                block_timeout_ms: 100,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Overlay whatever was provided onto the defaults.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server;
        let broker = self.broker;
        let log = self.log;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
                http_port: server
                    .as_ref()
                    .and_then(|s| s.http_port)
                    .unwrap_or(default.server.http_port),
            },
            broker: BrokerSettings {
                max_connections: broker
                    .as_ref()
                    .and_then(|b| b.max_connections)
                    .unwrap_or(default.broker.max_connections),
                channel_capacity: broker
                    .as_ref()
                    .and_then(|b| b.channel_capacity)
                    .unwrap_or(default.broker.channel_capacity),
                overflow_policy: broker
                    .as_ref()
                    .and_then(|b| b.overflow_policy)
                    .unwrap_or(default.broker.overflow_policy),
                block_timeout_ms: broker
                    .as_ref()
                    .and_then(|b| b.block_timeout_ms)
                    .unwrap_or(default.broker.block_timeout_ms),
            },
            log: LogSettings {
                level: log
                    .and_then(|l| l.level)
                    .unwrap_or(default.log.level),
            },
        }
    }
}
