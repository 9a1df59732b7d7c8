#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Each test binary only uses part of the shared helpers"
)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use resilient_ws::Result;
use resilient_ws::types::Url;
use resilient_ws::ws::config::Config;
use resilient_ws::ws::{
    BinaryType, CloseInfo, ConnectionState, Connector, Diagnostics, Event, EventKind, EventSink,
    Frame, ReadyState, ResilientSocket, Transport, TransportEvent, WsError,
};

pub const URL: &str = "http://localhost:8392/feed";

#[derive(Debug)]
struct MockState {
    ready_state: ReadyState,
    binary_type: BinaryType,
    sent: Vec<Frame>,
    close_calls: usize,
}

/// Test-side view of one transport created by [`MockConnector`].
#[derive(Clone)]
pub struct MockHandle {
    pub address: Url,
    pub protocols: Vec<String>,
    state: Arc<Mutex<MockState>>,
    sink: EventSink,
}

impl MockHandle {
    /// Finish the opening handshake.
    pub fn open(&self) {
        self.state.lock().unwrap().ready_state = ReadyState::Open;
        self.sink.emit(TransportEvent::Open);
    }

    pub fn text(&self, text: &str) {
        self.sink
            .emit(TransportEvent::Message(Frame::Text(text.to_owned())));
    }

    pub fn binary(&self, data: &'static [u8]) {
        self.sink
            .emit(TransportEvent::Message(Frame::Binary(Bytes::from_static(data))));
    }

    /// Report an error without closing.
    pub fn error(&self) {
        self.sink
            .emit(TransportEvent::Error(WsError::InvalidMessage("boom".to_owned())));
    }

    /// The peer went away without a closing handshake.
    pub fn drop_connection(&self) {
        self.state.lock().unwrap().ready_state = ReadyState::Closed;
        self.sink.emit(TransportEvent::Close(CloseInfo::abnormal()));
    }

    /// The connection attempt failed.
    pub fn fail(&self) {
        self.state.lock().unwrap().ready_state = ReadyState::Closed;
        self.sink.emit(TransportEvent::Error(WsError::ConnectionClosed));
        self.sink.emit(TransportEvent::Close(CloseInfo::abnormal()));
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.lock().unwrap().ready_state
    }

    pub fn binary_type(&self) -> BinaryType {
        self.state.lock().unwrap().binary_type
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_text(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }
}

/// In-memory [`Connector`] driven by the test through [`MockHandle`]s.
#[derive(Clone, Default)]
pub struct MockConnector {
    handles: Arc<Mutex<Vec<MockHandle>>>,
    reject: Arc<AtomicBool>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open` fail until called again with `false`.
    pub fn reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.handles.lock().unwrap().len()
    }

    pub fn handle(&self, index: usize) -> MockHandle {
        self.handles.lock().unwrap()[index].clone()
    }

    pub fn last(&self) -> MockHandle {
        self.handles.lock().unwrap().last().cloned().unwrap()
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn open(&self, address: &Url, protocols: &[String], sink: EventSink) -> Result<MockTransport> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(WsError::Unsupported("rejected by test".to_owned()).into());
        }

        let state = Arc::new(Mutex::new(MockState {
            ready_state: ReadyState::Connecting,
            binary_type: BinaryType::default(),
            sent: Vec::new(),
            close_calls: 0,
        }));
        self.handles.lock().unwrap().push(MockHandle {
            address: address.clone(),
            protocols: protocols.to_vec(),
            state: Arc::clone(&state),
            sink: sink.clone(),
        });

        Ok(MockTransport {
            state,
            sink,
            protocol: protocols.first().cloned().unwrap_or_default(),
        })
    }
}

pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    sink: EventSink,
    protocol: String,
}

impl Transport for MockTransport {
    fn ready_state(&self) -> ReadyState {
        self.state.lock().unwrap().ready_state
    }

    fn send(&mut self, frame: Frame) {
        self.state.lock().unwrap().sent.push(frame);
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.close_calls += 1;
        if state.ready_state != ReadyState::Closed {
            state.ready_state = ReadyState::Closed;
            self.sink
                .emit(TransportEvent::Close(CloseInfo::new(1000, "", true)));
        }
    }

    fn binary_type(&self) -> BinaryType {
        self.state.lock().unwrap().binary_type
    }

    fn set_binary_type(&mut self, binary_type: BinaryType) {
        self.state.lock().unwrap().binary_type = binary_type;
    }

    fn buffered_amount(&self) -> usize {
        0
    }

    fn extensions(&self) -> String {
        String::new()
    }

    fn protocol(&self) -> String {
        self.protocol.clone()
    }
}

pub fn socket(config: Config) -> (ResilientSocket, MockConnector) {
    let connector = MockConnector::new();
    let socket = ResilientSocket::with_connector(URL, config, connector.clone()).unwrap();
    (socket, connector)
}

/// Wait until the socket has handled every transport event emitted so far.
pub async fn settle(socket: &ResilientSocket) -> Diagnostics {
    socket.diagnostics().await.unwrap()
}

/// Create a socket and complete its first connection.
pub async fn open_socket(config: Config) -> (ResilientSocket, MockConnector) {
    let (socket, connector) = socket(config);
    settle(&socket).await;
    connector.last().open();
    settle(&socket).await;
    assert_eq!(socket.state(), ConnectionState::Open, "socket should be open");
    (socket, connector)
}

/// Record every state the socket publishes.
pub fn record_states(socket: &ResilientSocket) -> Arc<Mutex<Vec<ConnectionState>>> {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    socket.on_state(move |state| sink.lock().unwrap().push(state));
    states
}

/// Count the events of `kind` the socket publishes.
pub fn count_events(socket: &ResilientSocket, kind: EventKind) -> Arc<Mutex<usize>> {
    let count = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&count);
    socket.on(kind, move |_event: &Event| *sink.lock().unwrap() += 1);
    count
}

/// Route library logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    drop(
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init(),
    );
}

pub async fn sleep_ms(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
