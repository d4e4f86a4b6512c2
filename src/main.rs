//! CLI for topicast
//!
//! Subcommands:
//! - `server`: run the WebSocket and HTTP/SSE servers
//! - `client`: run the interactive client against a WebSocket server

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use topicast::broker::{Broker, ChannelConfig};
use topicast::client;
use topicast::config::{Settings, load_config};
use topicast::transport::{start_http_server, start_websocket_server};
use topicast::utils::logging;

#[derive(Parser)]
#[command(name = "topicast", version, about)]
enum Command {
    /// Start the WebSocket and HTTP servers
    Server,
    /// Run the interactive client
    Client {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            return;
        }
    };
    logging::init(&settings.log.level);

    match cmd {
        Command::Server => {
            if let Err(e) = run_server(settings).await {
                error!("Server failed: {e}");
            }
        }
        Command::Client { url } => {
            if let Err(e) = client::run(&url).await {
                error!("Client failed: {e}");
            }
        }
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let broker = Arc::new(Broker::new(ChannelConfig::from(&settings.broker)));
    let ws_addr = settings.server.websocket_addr();
    let http_addr = settings.server.http_addr();

    tokio::select! {
        res = start_websocket_server(&ws_addr, broker.clone(), settings.broker.max_connections) => {
            res?;
            error!("WebSocket server exited unexpectedly.");
        }
        res = start_http_server(&http_addr, broker) => {
            res?;
            error!("HTTP server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}
