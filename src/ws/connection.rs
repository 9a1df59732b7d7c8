#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::Arc;

use serde_repr::{Deserialize_repr, Serialize_repr};
use tokio::sync::{mpsc, oneshot, watch};

use super::address;
use super::config::Config;
use super::error::WsError;
use super::events::{Event, EventBus};
use super::heartbeat::{HeartbeatEvent, HeartbeatMonitor};
use super::message::{Frame, Outgoing, Payload};
use super::reconnect::{ReconnectPolicy, Schedule};
use super::traits::{
    BinaryType, CloseInfo, Connector, EventSink, ReadyState, Transport, TransportEvent,
};

/// Application-level connection state.
///
/// Tracked by the socket on top of the transport's own [`ReadyState`]: it additionally knows
/// whether a reconnect is pending and whether the last thing that happened was an error.
#[non_exhaustive]
#[repr(u8)]
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize_repr,
    Deserialize_repr,
    strum_macros::Display,
)]
pub enum ConnectionState {
    /// Created, never connected
    #[default]
    Initial = 0,
    /// A transport is being opened
    Connecting = 1,
    /// The transport is open
    Open = 2,
    /// Waiting for the reconnect timer
    Reconnect = 3,
    /// A close was requested and is in progress
    Closing = 4,
    /// The transport is closed
    Closed = 5,
    /// The transport reported an error
    Error = 6,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Snapshot of the connection task's internals.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostics {
    pub state: ConnectionState,
    /// Ready state of the current transport, if there is one
    pub ready_state: Option<ReadyState>,
    /// Reconnect attempts made since the connection was last open
    pub reconnect_attempts: u32,
    /// Whether a reconnect timer is running
    pub reconnect_pending: bool,
    /// Whether an unexpected disconnect would trigger a reconnect
    pub reconnect_enabled: bool,
    pub heartbeat_running: bool,
    /// Unanswered probes since the last inbound frame
    pub heartbeat_misses: u32,
    /// Probe timeouts armed since the last inbound frame
    pub outstanding_probes: u32,
}

/// Properties of the current transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportInfo {
    pub ready_state: ReadyState,
    pub binary_type: BinaryType,
    pub buffered_amount: usize,
    pub extensions: String,
    pub protocol: String,
}

/// Requests from a socket handle to its connection task.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Close,
    Send(Outgoing),
    SetBinaryType(BinaryType),
    Transport(oneshot::Sender<Option<TransportInfo>>),
    Diagnostics(oneshot::Sender<Diagnostics>),
    Dispose(oneshot::Sender<()>),
}

/// Owns one socket's transport, timers and state.
///
/// Runs as a single task, so transport events, timer expirations and handle commands are
/// handled strictly one after another and never observe each other half-done.
pub(crate) struct ConnectionManager<C: Connector> {
    url: String,
    config: Config,
    connector: C,
    transport: Option<C::Transport>,
    /// Identifies the current transport; events tagged with any other value are stale
    generation: u64,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    bus: Arc<EventBus>,
    events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    reconnect: ReconnectPolicy,
    heartbeat: HeartbeatMonitor,
}

impl<C: Connector> ConnectionManager<C> {
    pub(crate) fn new(
        url: String,
        config: Config,
        connector: C,
        bus: Arc<EventBus>,
        state_tx: watch::Sender<ConnectionState>,
        events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    ) -> Self {
        let reconnect = ReconnectPolicy::new(&config.reconnect);
        let heartbeat = HeartbeatMonitor::new(&config.heartbeat);

        Self {
            url,
            config,
            connector,
            transport: None,
            generation: 0,
            state: ConnectionState::Initial,
            state_tx,
            bus,
            events_tx,
            reconnect,
            heartbeat,
        }
    }

    /// Process commands, transport events and timers until disposed.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    ) {
        loop {
            tokio::select! {
                biased;

                Some((generation, event)) = events.recv() => {
                    self.handle_transport_event(generation, event);
                }

                command = commands.recv() => match command {
                    Some(Command::Dispose(done)) => {
                        self.dispose();
                        _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Every socket handle was dropped, shutting down");
                        self.dispose();
                        break;
                    }
                },

                () = self.reconnect.expired() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt = self.reconnect.attempts(), "Reconnecting");
                    self.connect();
                }

                event = self.heartbeat.next_event() => self.handle_heartbeat(event),
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Close => self.close(),
            Command::Send(message) => self.send(message),
            Command::SetBinaryType(binary_type) => self.set_binary_type(binary_type),
            Command::Transport(reply) => {
                _ = reply.send(self.transport_info());
            }
            Command::Diagnostics(reply) => {
                _ = reply.send(self.diagnostics());
            }
            Command::Dispose(done) => {
                self.dispose();
                _ = done.send(());
            }
        }
    }

    fn handle_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation {
            #[cfg(feature = "tracing")]
            tracing::trace!(?event, "Ignoring event from a superseded transport");
            return;
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(frame) => self.receive(frame),
            TransportEvent::Close(info) => self.on_close(info),
            TransportEvent::Error(error) => self.on_error(error),
        }
    }

    fn handle_heartbeat(&mut self, event: HeartbeatEvent) {
        match event {
            HeartbeatEvent::Probe => {
                let ping = self.config.heartbeat.ping.next();
                self.send(ping);
                self.heartbeat.arm_timeout();
            }
            HeartbeatEvent::Miss => {
                if !self.heartbeat.record_miss() {
                    return;
                }

                #[cfg(feature = "tracing")]
                tracing::warn!(
                    misses = self.heartbeat.misses(),
                    "Heartbeat timed out, dropping connection"
                );
                // Closed at the transport only: the resulting close event still reconnects.
                if let Some(transport) = self.transport.as_mut() {
                    transport.close();
                }
                self.heartbeat.stop();
            }
        }
    }

    fn connect(&mut self) {
        if let Some(transport) = &self.transport
            && matches!(
                transport.ready_state(),
                ReadyState::Connecting | ReadyState::Open
            )
        {
            return;
        }

        let address = match address::build(&self.url, &self.config) {
            Ok(address) => address,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(url = %self.url, error = %e, "Unable to build connection address");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                return;
            }
        };

        let generation = self.generation.wrapping_add(1);
        let sink = EventSink::new(generation, self.events_tx.clone());
        let mut transport = match self.connector.open(&address, &self.config.protocols, sink) {
            Ok(transport) => transport,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%address, error = %e, "Unable to create transport");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                return;
            }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(%address, generation, "Connecting");

        if let Some(binary_type) = self.config.binary_type {
            transport.set_binary_type(binary_type);
        }
        self.generation = generation;
        self.transport = Some(transport);
        self.reconnect.enable();
        self.set_state(ConnectionState::Connecting);
    }

    fn close(&mut self) {
        let closed = self
            .transport
            .as_ref()
            .is_none_or(|transport| transport.ready_state() == ReadyState::Closed);

        if !closed {
            self.set_state(ConnectionState::Closing);
        }
        self.reconnect.clear();
        self.heartbeat.stop();
        self.reconnect.disable();

        match self.transport.as_mut() {
            Some(transport) if !closed => transport.close(),
            _ => self.set_state(ConnectionState::Closed),
        }
    }

    fn dispose(&mut self) {
        self.bus.clear();
        self.close();
        self.transport = None;
        self.generation = self.generation.wrapping_add(1);
    }

    fn send(&mut self, message: Outgoing) {
        match self.transport.as_mut() {
            Some(transport) if transport.ready_state() == ReadyState::Open => {
                transport.send(message.into_frame());
            }
            _ => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    state = %self.state,
                    "The connection has not been established yet, dropping message"
                );
            }
        }
    }

    fn set_binary_type(&mut self, binary_type: BinaryType) {
        self.config.binary_type = Some(binary_type);
        if let Some(transport) = self.transport.as_mut() {
            transport.set_binary_type(binary_type);
        }
    }

    fn on_open(&mut self) {
        self.heartbeat.start();
        self.reconnect.reset_attempts();
        self.set_state(ConnectionState::Open);
        self.publish(&Event::Open);
    }

    fn receive(&mut self, frame: Frame) {
        let binary_type = self
            .transport
            .as_ref()
            .map_or_else(BinaryType::default, Transport::binary_type);
        let payload = Payload::from_frame(frame, binary_type);

        self.heartbeat.reset();

        let heartbeat = &self.config.heartbeat;
        if heartbeat.ignore && heartbeat.is_pong(&payload) {
            #[cfg(feature = "tracing")]
            tracing::trace!("Heartbeat reply received");
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(?payload, "Received message");
        self.publish(&Event::Message(payload));
    }

    fn on_close(&mut self, info: CloseInfo) {
        #[cfg(feature = "tracing")]
        tracing::debug!(code = info.code, reason = %info.reason, "Connection closed");

        self.set_state(ConnectionState::Closed);
        self.publish(&Event::Close(info));
        self.heartbeat.stop();
        self.schedule_reconnect();
    }

    fn on_error(&mut self, error: WsError) {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %error, "Transport error");

        self.set_state(ConnectionState::Error);
        self.publish(&Event::Error(error));
    }

    fn schedule_reconnect(&mut self) {
        if self.state == ConnectionState::Reconnect || !self.reconnect.is_enabled() {
            return;
        }

        match self.reconnect.schedule() {
            Schedule::Armed { attempt, delay } => {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, ?delay, "Scheduling reconnect");
                #[cfg(not(feature = "tracing"))]
                let _ = (attempt, delay);
                self.set_state(ConnectionState::Reconnect);
            }
            Schedule::Exhausted => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Reconnect attempts exhausted, closing");
                self.close();
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(from = %self.state, to = %state, "Connection state changed");

        self.state = state;
        self.state_tx.send_replace(state);
        self.publish(&Event::State(state));
    }

    fn publish(&self, event: &Event) {
        self.bus.emit(event);
    }

    fn transport_info(&self) -> Option<TransportInfo> {
        self.transport.as_ref().map(|transport| TransportInfo {
            ready_state: transport.ready_state(),
            binary_type: transport.binary_type(),
            buffered_amount: transport.buffered_amount(),
            extensions: transport.extensions(),
            protocol: transport.protocol(),
        })
    }

    fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            state: self.state,
            ready_state: self.transport.as_ref().map(Transport::ready_state),
            reconnect_attempts: self.reconnect.attempts(),
            reconnect_pending: self.reconnect.is_pending(),
            reconnect_enabled: self.reconnect.is_enabled(),
            heartbeat_running: self.heartbeat.is_running(),
            heartbeat_misses: self.heartbeat.misses(),
            outstanding_probes: self.heartbeat.armed(),
        }
    }
}
