//! Companion server for trying out the client against a live endpoint.
//!
//! Listens on `127.0.0.1:8392` and, for every connected client:
//! - sends a protocol-level ping every 3 seconds
//! - answers the text message `ping` with `pong`
//! - broadcasts every other text message to all clients as `{"type":"echoMessage","data":...}`
//!
//! Every 5 seconds all clients also receive `{"type":"serverMessage","data":"current time: ..."}`.
//!
//! ```sh
//! RUST_LOG=info cargo run --example broadcast_server
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use chrono::Local;
use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::interval;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

const ADDRESS: &str = "127.0.0.1:8392";
const PING_INTERVAL: Duration = Duration::from_secs(3);
const CLOCK_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind(ADDRESS).await?;
    info!(address = ADDRESS, "Broadcast server listening");

    let (broadcast_tx, _) = broadcast::channel::<String>(256);

    let clock_tx = broadcast_tx.clone();
    tokio::spawn(async move {
        let mut clock = interval(CLOCK_INTERVAL);
        clock.tick().await;
        loop {
            clock.tick().await;
            let message = json!({
                "type": "serverMessage",
                "data": format!("current time: {}", Local::now().format("%H:%M:%S")),
            });
            drop(clock_tx.send(message.to_string()));
        }
    });

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(serve(stream, peer, broadcast_tx.clone()));
    }
}

async fn serve(stream: TcpStream, peer: SocketAddr, broadcast_tx: broadcast::Sender<String>) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!(%peer, error = %e, "Handshake failed");
            return;
        }
    };
    info!(%peer, "Client connected");

    let (mut write, mut read) = ws_stream.split();
    let mut broadcast_rx = broadcast_tx.subscribe();
    let mut ping = interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) if text.as_str() == "ping" => {
                    debug!(%peer, "Heartbeat probe");
                    if write.send(Message::Text("pong".into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    info!(%peer, message = %text, "Broadcasting");
                    let echo = json!({ "type": "echoMessage", "data": text.as_str() });
                    drop(broadcast_tx.send(echo.to_string()));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%peer, error = %e, "Connection error");
                    break;
                }
            },

            outgoing = broadcast_rx.recv() => match outgoing {
                Ok(text) => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(%peer, skipped, "Client is lagging behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            _ = ping.tick() => {
                if write.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(%peer, "Client disconnected");
}
