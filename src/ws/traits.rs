//! Core traits for plugging a transport into the resilient socket.
//!
//! A [`Connector`] creates one [`Transport`] per connection attempt. The transport reports
//! everything that happens on the wire as [`TransportEvent`]s through the [`EventSink`] it was
//! created with, and the socket reads its [`ReadyState`] directly when deciding what to do.

use serde_repr::{Deserialize_repr, Serialize_repr};
use tokio::sync::mpsc;
use url::Url;

use super::error::WsError;
use super::message::Frame;
use crate::Result;

/// Native ready-state of a transport.
///
/// This is the low-level signal reported by the socket primitive itself and is never the
/// same thing as [`ConnectionState`](super::ConnectionState).
#[non_exhaustive]
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr, strum_macros::Display,
)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    /// Decode a ready-state stored as its numeric code. Unknown codes read as `Closed`.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Preferred representation for incoming binary frames.
#[non_exhaustive]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum BinaryType {
    /// Deliver binary frames as raw bytes
    #[default]
    Bytes,
    /// Read binary frames holding valid UTF-8 as text, so they are JSON-parsed and can match
    /// text heartbeat replies. Anything else is still delivered as raw bytes.
    Utf8,
}

/// Details of a closed connection.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code sent by the peer, or 1006 when the connection dropped without one
    pub code: u16,
    pub reason: String,
    /// Whether the closing handshake completed
    pub was_clean: bool,
}

impl CloseInfo {
    /// Status code used when no close frame was received.
    pub const ABNORMAL: u16 = 1006;

    #[must_use]
    pub fn new<S: Into<String>>(code: u16, reason: S, was_clean: bool) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean,
        }
    }

    /// A connection that went away without a closing handshake.
    #[must_use]
    pub fn abnormal() -> Self {
        Self::new(Self::ABNORMAL, "", false)
    }
}

/// Notification emitted by a transport.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportEvent {
    Open,
    Message(Frame),
    Close(CloseInfo),
    Error(WsError),
}

/// Channel a transport reports its [`TransportEvent`]s through.
///
/// Every sink is bound to the connection attempt that created it. Once the socket moves on
/// to a newer transport, or is disposed, events from older sinks are discarded.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    /// Deliver an event to the socket.
    ///
    /// Returns `false` once nobody is listening anymore.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }

    /// Whether the socket that created this sink has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A bidirectional message socket.
///
/// Methods must not block: `send` and `close` only hand work over to whatever drives the
/// connection, and the outcome is reported later through the [`EventSink`].
pub trait Transport: Send + 'static {
    fn ready_state(&self) -> ReadyState;

    /// Queue a frame for transmission.
    fn send(&mut self, frame: Frame);

    /// Begin the closing handshake. A [`TransportEvent::Close`] follows once it completes.
    fn close(&mut self);

    fn binary_type(&self) -> BinaryType;

    fn set_binary_type(&mut self, binary_type: BinaryType);

    /// Bytes queued by `send` that have not reached the network yet.
    fn buffered_amount(&self) -> usize;

    /// Extensions negotiated with the server.
    fn extensions(&self) -> String;

    /// Sub-protocol selected by the server.
    fn protocol(&self) -> String;
}

/// Creates transports.
///
/// # Example
///
/// ```ignore
/// impl Connector for MyConnector {
///     type Transport = MyTransport;
///
///     fn open(&self, address: &Url, protocols: &[String], sink: EventSink) -> Result<MyTransport> {
///         MyTransport::spawn(address.clone(), protocols.to_vec(), sink)
///     }
/// }
/// ```
pub trait Connector: Send + 'static {
    type Transport: Transport;

    /// Start connecting to `address`.
    ///
    /// Must return immediately with a transport in the [`ReadyState::Connecting`] state. An
    /// `Err` means no transport can be created at all, in which case the socket stays as it is.
    fn open(&self, address: &Url, protocols: &[String], sink: EventSink)
    -> Result<Self::Transport>;
}
