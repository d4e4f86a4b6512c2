//! The `client` module is the interactive command-line client.
//!
//! It connects to the WebSocket transport, shows a numbered menu on stdin and
//! prints everything the server pushes back, including messages for topics
//! it subscribed to.

pub mod menu;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_tungstenite::connect_async;
use tracing::{info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::transport::message::ServerMessage;
use crate::utils::error::ClientError;

pub use menu::{MENU, MenuChoice};

pub async fn run(url: &str) -> Result<(), ClientError> {
    let (ws_stream, _response) = connect_async(url).await?;
    info!("Connected to {url}");
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let printer = tokio::spawn(async move {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => print_server_message(&text),
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Connection error: {e}");
                    break;
                }
            }
        }
        println!("Connection closed by server");
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        println!("{MENU}");
        let Some(input) = lines.next_line().await? else {
            break;
        };

        let Some(choice) = MenuChoice::parse(&input) else {
            println!("Invalid input. Please try again.");
            continue;
        };
        if choice == MenuChoice::Exit {
            println!("Exiting...");
            break;
        }

        let Some(answers) = ask(&mut lines, choice.prompts()).await? else {
            break;
        };
        let Some(request) = choice.request(&answers) else {
            println!("Invalid input. Please try again.");
            continue;
        };

        let json = serde_json::to_string(&request)?;
        ws_sender.send(WsMessage::text(json)).await?;
    }

    let _ = ws_sender.close().await;
    printer.abort();
    Ok(())
}

/// Returns `None` on end of input.
async fn ask(
    lines: &mut Lines<BufReader<Stdin>>,
    prompts: &[&str],
) -> Result<Option<Vec<String>>, ClientError> {
    let mut answers = Vec::with_capacity(prompts.len());
    for prompt in prompts {
        println!("{prompt}");
        match lines.next_line().await? {
            Some(line) => answers.push(line),
            None => return Ok(None),
        }
    }
    Ok(Some(answers))
}

fn print_server_message(text: &str) {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(ServerMessage::Message { topic, payload, .. }) => {
            println!("Received event: {payload} (topic {topic})")
        }
        Ok(ServerMessage::Ack { op, topic }) => println!("OK: {op} {topic}"),
        Ok(ServerMessage::Error { code, message }) => println!("Error ({code}): {message}"),
        Err(_) => println!("Received: {text}"),
    }
}

#[cfg(test)]
mod tests;
