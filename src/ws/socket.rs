use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};

use super::config::Config;
use super::connection::{Command, ConnectionManager, ConnectionState, Diagnostics, TransportInfo};
use super::error::WsError;
use super::events::{Event, EventBus, EventKind, ListenerId};
use super::message::{Outgoing, Payload};
use super::traits::{BinaryType, CloseInfo, Connector};
use super::transport::TungsteniteConnector;
use crate::Result;

/// A WebSocket client that keeps itself connected.
///
/// The socket reconnects after unexpected disconnects, probes the server with an
/// application-level heartbeat, and publishes everything that happens to registered
/// listeners. All of that runs on a background task; this handle only sends it requests,
/// so every method returns immediately and the effect follows shortly after.
///
/// Handles are cheap to clone and all talk to the same connection.
///
/// # Example
///
/// ```no_run
/// use resilient_ws::ws::ResilientSocket;
/// use resilient_ws::ws::config::{Config, HeartbeatConfig};
///
/// # async fn run() -> resilient_ws::Result<()> {
/// let config = Config::builder()
///     .heartbeat(HeartbeatConfig::builder().pong_match("pong").build())
///     .build();
/// let socket = ResilientSocket::new("https://example.com/feed", config)?;
///
/// socket.on_message(|payload| println!("{payload:?}"));
/// socket.send("hello")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ResilientSocket {
    url: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    bus: Arc<EventBus>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ResilientSocket {
    /// Create a socket backed by `tokio-tungstenite`.
    ///
    /// Must be called from within a Tokio runtime. Connects right away unless
    /// [`Config::immediate`] is unset.
    pub fn new(url: &str, config: Config) -> Result<Self> {
        Self::with_connector(url, config, TungsteniteConnector)
    }

    /// Create a socket that opens its transports through `connector`.
    pub fn with_connector<C: Connector>(url: &str, config: Config, connector: C) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| WsError::Unsupported(format!("no Tokio runtime available: {e}")))?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Initial);
        let bus = Arc::new(EventBus::new());
        let immediate = config.immediate;

        let manager = ConnectionManager::new(
            url.to_owned(),
            config,
            connector,
            Arc::clone(&bus),
            state_tx,
            events_tx,
        );
        runtime.spawn(manager.run(commands_rx, events_rx));

        let socket = Self {
            url: url.into(),
            commands: commands_tx,
            bus,
            state_rx,
        };
        if immediate {
            socket.connect()?;
        }
        Ok(socket)
    }

    /// Open a transport unless one is already connecting or open.
    ///
    /// A transport that cannot be created is logged and leaves the socket unchanged.
    pub fn connect(&self) -> Result<()> {
        self.command(Command::Connect)
    }

    /// Close the connection and suppress reconnection until the next [`connect`](Self::connect).
    pub fn close(&self) -> Result<()> {
        self.command(Command::Close)
    }

    /// Send a message. Dropped with a warning unless the connection is open.
    ///
    /// JSON values are sent as their serialized text; everything else goes out verbatim.
    pub fn send<D: Into<Outgoing>>(&self, data: D) -> Result<()> {
        self.command(Command::Send(data.into()))
    }

    /// Serialize `value` to JSON and send it as text.
    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
        self.command(Command::Send(Outgoing::json(value)?))
    }

    /// Change how incoming binary frames are represented, now and for future transports.
    pub fn set_binary_type(&self, binary_type: BinaryType) -> Result<()> {
        self.command(Command::SetBinaryType(binary_type))
    }

    /// Properties of the current transport, or `None` before the first connect.
    pub async fn transport(&self) -> Option<TransportInfo> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Transport(tx)).ok()?;
        rx.await.ok().flatten()
    }

    pub async fn binary_type(&self) -> Option<BinaryType> {
        self.transport().await.map(|info| info.binary_type)
    }

    pub async fn buffered_amount(&self) -> Option<usize> {
        self.transport().await.map(|info| info.buffered_amount)
    }

    pub async fn extensions(&self) -> Option<String> {
        self.transport().await.map(|info| info.extensions)
    }

    pub async fn protocol(&self) -> Option<String> {
        self.transport().await.map(|info| info.protocol)
    }

    /// Inspect reconnect and heartbeat bookkeeping.
    ///
    /// The reply is produced after every transport event queued before the call was handled.
    pub async fn diagnostics(&self) -> Result<Diagnostics> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Diagnostics(tx))?;
        Ok(rx.await.map_err(|_e| WsError::ConnectionClosed)?)
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// The URL as given at construction, before any rewriting.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Register a listener for every event of `kind`.
    ///
    /// Listeners run on the connection task and must not block.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.bus.on(kind, handler)
    }

    /// Remove one listener, or every listener of `kind` when `id` is `None`.
    pub fn off(&self, kind: EventKind, id: Option<ListenerId>) -> usize {
        self.bus.off(kind, id)
    }

    pub fn on_state<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.on(EventKind::State, move |event| {
            if let Event::State(state) = event {
                handler(*state);
            }
        })
    }

    pub fn on_open<F>(&self, handler: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventKind::Open, move |_| handler())
    }

    pub fn on_close<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&CloseInfo) + Send + Sync + 'static,
    {
        self.on(EventKind::Close, move |event| {
            if let Event::Close(info) = event {
                handler(info);
            }
        })
    }

    pub fn on_error<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&WsError) + Send + Sync + 'static,
    {
        self.on(EventKind::Error, move |event| {
            if let Event::Error(error) = event {
                handler(error);
            }
        })
    }

    pub fn on_message<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.on(EventKind::Message, move |event| {
            if let Event::Message(payload) = event {
                handler(payload);
            }
        })
    }

    /// Remove every listener, close the connection and stop the background task.
    ///
    /// Other clones of this handle keep existing but every request they make fails with
    /// [`WsError::ConnectionClosed`].
    pub async fn dispose(self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Dispose(tx)).is_ok() {
            _ = rx.await;
        }
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }
}
