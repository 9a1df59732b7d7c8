//! Connects to the `broadcast_server` demo and prints everything it receives.
//!
//! Start the server first, then:
//! ```sh
//! RUST_LOG=info,resilient_ws=debug cargo run --example client
//! ```
//!
//! Stop and restart the server to watch the client reconnect.

use std::time::Duration;

use resilient_ws::types::json;
use resilient_ws::ws::config::{Config, HeartbeatConfig, ReconnectConfig};
use resilient_ws::ws::{ConnectionState, ResilientSocket};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::builder()
        .query(json!({ "client": "demo" }))
        .heartbeat(
            HeartbeatConfig::builder()
                .interval(Duration::from_secs(3))
                .pong_match("pong")
                .timeout(Duration::from_secs(1))
                .timeout_count(3)
                .build(),
        )
        .reconnect(
            ReconnectConfig::builder()
                .interval(Duration::from_secs(2))
                .build(),
        )
        .build();
    let socket = ResilientSocket::new("http://localhost:8392", config)?;

    socket.on_state(|state| info!(%state, "State changed"));
    socket.on_message(|payload| info!(?payload, "Received"));
    socket.on_error(|error| warn!(%error, "Transport error"));

    let sender = socket.clone();
    socket.on_open(move || {
        if let Err(e) = sender.send_json(&json!({ "hello": "from the demo client" })) {
            warn!(error = %e, "Unable to greet the server");
        }
    });

    let mut state_rx = socket.state_receiver();
    while state_rx.changed().await.is_ok() {
        if *state_rx.borrow() == ConnectionState::Closed {
            break;
        }
    }

    socket.dispose().await;
    Ok(())
}
