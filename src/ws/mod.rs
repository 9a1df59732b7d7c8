//! Self-healing WebSocket client.
//!
//! # Architecture
//!
//! - [`ResilientSocket`]: Cloneable handle applications talk to
//! - [`connection`]: Background task owning the transport, the reconnect timer and the heartbeat
//! - [`Connector`] / [`Transport`]: Seam between the socket and the wire, implemented for
//!   `tokio-tungstenite` by [`TungsteniteConnector`]
//! - [`events`]: Listener registry notifications are published through
//!
//! # Example
//!
//! ```no_run
//! use resilient_ws::ws::{ConnectionState, ResilientSocket};
//! use resilient_ws::ws::config::Config;
//!
//! # async fn run() -> resilient_ws::Result<()> {
//! let socket = ResilientSocket::new("ws://localhost:8392", Config::default())?;
//!
//! socket.on_state(|state| {
//!     if state == ConnectionState::Reconnect {
//!         println!("connection lost, retrying");
//!     }
//! });
//! socket.on_message(|payload| println!("{payload:?}"));
//! # Ok(())
//! # }
//! ```

mod address;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
mod heartbeat;
pub mod message;
mod reconnect;
mod socket;
pub mod traits;
pub mod transport;

pub use connection::{ConnectionState, Diagnostics, TransportInfo};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use events::{Event, EventKind, ListenerId};
pub use message::{Frame, Outgoing, Payload};
pub use socket::ResilientSocket;
pub use traits::*;
pub use transport::{TungsteniteConnector, TungsteniteTransport};
