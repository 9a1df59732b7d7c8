//! [`Connector`] backed by `tokio-tungstenite`.
//!
//! Each transport owns a spawned I/O task. The transport itself only holds a channel into that
//! task plus the state it shares with it, so none of its methods block.

use std::future::pending;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use tokio::sync::mpsc;
use tokio::time::{Sleep, sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::handshake::client::{Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{
    HeaderName, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_PROTOCOL,
};
use url::Url;

use super::error::WsError;
use super::message::Frame;
use super::traits::{
    BinaryType, CloseInfo, Connector, EventSink, ReadyState, Transport, TransportEvent,
};
use crate::Result;
use crate::error::Error;

/// How long the peer gets to answer our close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Close code reported when the peer's close frame carried no status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens WebSocket connections with `tokio-tungstenite`.
#[non_exhaustive]
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    type Transport = TungsteniteTransport;

    fn open(
        &self,
        address: &Url,
        protocols: &[String],
        sink: EventSink,
    ) -> Result<TungsteniteTransport> {
        if !matches!(address.scheme(), "ws" | "wss") {
            return Err(WsError::Unsupported(format!(
                "unsupported scheme `{}`",
                address.scheme()
            ))
            .into());
        }

        let mut request = address.as_str().into_client_request()?;
        if !protocols.is_empty() {
            let value = HeaderValue::from_str(&protocols.join(", "))
                .map_err(|e| Error::validation(format!("invalid sub-protocol list: {e}")))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        let shared = Arc::new(Shared::default());
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(request, Arc::clone(&shared), outbound_rx, sink));

        Ok(TungsteniteTransport {
            shared,
            outbound: outbound_tx,
            binary_type: BinaryType::default(),
        })
    }
}

/// One `tokio-tungstenite` connection. Dropping it closes the connection.
#[derive(Debug)]
pub struct TungsteniteTransport {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Outbound>,
    binary_type: BinaryType,
}

impl Transport for TungsteniteTransport {
    fn ready_state(&self) -> ReadyState {
        self.shared.ready_state()
    }

    fn send(&mut self, frame: Frame) {
        let len = frame.len();
        self.shared.buffered.fetch_add(len, Ordering::AcqRel);
        if self.outbound.send(Outbound::Frame(frame)).is_err() {
            self.shared.buffered.fetch_sub(len, Ordering::AcqRel);
        }
    }

    fn close(&mut self) {
        if !self
            .shared
            .transition(ReadyState::Connecting, ReadyState::Closing)
        {
            self.shared.transition(ReadyState::Open, ReadyState::Closing);
        }
        _ = self.outbound.send(Outbound::Close);
    }

    fn binary_type(&self) -> BinaryType {
        self.binary_type
    }

    fn set_binary_type(&mut self, binary_type: BinaryType) {
        self.binary_type = binary_type;
    }

    fn buffered_amount(&self) -> usize {
        self.shared.buffered.load(Ordering::Acquire)
    }

    fn extensions(&self) -> String {
        self.shared.extensions.get().cloned().unwrap_or_default()
    }

    fn protocol(&self) -> String {
        self.shared.protocol.get().cloned().unwrap_or_default()
    }
}

/// State written by the I/O task and read by the transport.
#[derive(Debug, Default)]
struct Shared {
    ready_state: AtomicU8,
    buffered: AtomicUsize,
    protocol: OnceLock<String>,
    extensions: OnceLock<String>,
}

impl Shared {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_code(self.ready_state.load(Ordering::Acquire))
    }

    fn set_ready_state(&self, state: ReadyState) {
        self.ready_state.store(state.code(), Ordering::Release);
    }

    fn transition(&self, from: ReadyState, to: ReadyState) -> bool {
        self.ready_state
            .compare_exchange(from.code(), to.code(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug)]
enum Outbound {
    Frame(Frame),
    Close,
}

async fn drive(
    request: Request,
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    sink: EventSink,
) {
    let connecting = connect_async(request);
    tokio::pin!(connecting);

    let (stream, response) = loop {
        tokio::select! {
            biased;

            command = outbound.recv() => match command {
                Some(Outbound::Frame(frame)) => {
                    shared.buffered.fetch_sub(frame.len(), Ordering::AcqRel);
                }
                Some(Outbound::Close) | None => {
                    shared.set_ready_state(ReadyState::Closed);
                    sink.emit(TransportEvent::Close(CloseInfo::abnormal()));
                    return;
                }
            },

            result = &mut connecting => match result {
                Ok(connected) => break connected,
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Unable to connect");
                    shared.set_ready_state(ReadyState::Closed);
                    sink.emit(TransportEvent::Error(WsError::Connection(e)));
                    sink.emit(TransportEvent::Close(CloseInfo::abnormal()));
                    return;
                }
            },
        }
    };

    if let Some(protocol) = header(&response, &SEC_WEBSOCKET_PROTOCOL) {
        _ = shared.protocol.set(protocol);
    }
    if let Some(extensions) = header(&response, &SEC_WEBSOCKET_EXTENSIONS) {
        _ = shared.extensions.set(extensions);
    }

    let (mut write, mut read) = stream.split();
    let mut deadline: Option<Pin<Box<Sleep>>> = None;
    let mut peer_close: Option<CloseInfo> = None;

    // A close requested while the handshake was in flight wins over the open.
    let mut closing = !shared.transition(ReadyState::Connecting, ReadyState::Open);
    if closing {
        deadline = Some(Box::pin(sleep(CLOSE_HANDSHAKE_TIMEOUT)));
        if write.send(Message::Close(None)).await.is_err() {
            shared.set_ready_state(ReadyState::Closed);
            sink.emit(TransportEvent::Close(CloseInfo::abnormal()));
            return;
        }
    } else {
        sink.emit(TransportEvent::Open);
    }

    let info = loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    sink.emit(TransportEvent::Message(Frame::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Binary(data))) => {
                    sink.emit(TransportEvent::Message(Frame::Binary(data)));
                }
                Some(Ok(Message::Close(frame))) => {
                    shared.set_ready_state(ReadyState::Closing);
                    closing = true;
                    peer_close = Some(frame.map_or_else(
                        || CloseInfo::new(NO_STATUS_RECEIVED, "", true),
                        |frame| CloseInfo::new(u16::from(frame.code), frame.reason.as_str(), true),
                    ));
                }
                Some(Ok(_)) => {
                    // Protocol-level ping/pong is answered by tungstenite itself.
                }
                Some(Err(e)) => {
                    if let Some(info) = peer_close.take() {
                        break info;
                    }
                    #[cfg(feature = "tracing")]
                    tracing::debug!(error = %e, "Connection failed");
                    sink.emit(TransportEvent::Error(WsError::Connection(e)));
                    break CloseInfo::abnormal();
                }
                None => break peer_close.take().unwrap_or_else(CloseInfo::abnormal),
            },

            command = outbound.recv(), if !closing => match command {
                Some(Outbound::Frame(frame)) => {
                    let len = frame.len();
                    let result = write.send(into_message(frame)).await;
                    shared.buffered.fetch_sub(len, Ordering::AcqRel);
                    if let Err(e) = result {
                        sink.emit(TransportEvent::Error(WsError::Connection(e)));
                        break CloseInfo::abnormal();
                    }
                }
                Some(Outbound::Close) | None => {
                    shared.set_ready_state(ReadyState::Closing);
                    closing = true;
                    deadline = Some(Box::pin(sleep(CLOSE_HANDSHAKE_TIMEOUT)));
                    if write.send(Message::Close(None)).await.is_err() {
                        break CloseInfo::abnormal();
                    }
                }
            },

            () = elapsed(&mut deadline) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Peer did not finish the closing handshake");
                sink.emit(TransportEvent::Error(WsError::Timeout));
                break CloseInfo::abnormal();
            }
        }
    };

    shared.set_ready_state(ReadyState::Closed);
    sink.emit(TransportEvent::Close(info));
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data),
    }
}

fn header(response: &Response, name: &HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

async fn elapsed(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(deadline) => deadline.as_mut().await,
        None => pending().await,
    }
}
