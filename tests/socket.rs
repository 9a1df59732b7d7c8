#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::sync::{Arc, Mutex};

use common::{URL, count_events, open_socket, record_states, settle, socket};
use resilient_ws::error::Kind;
use resilient_ws::types::json;
use resilient_ws::ws::config::Config;
use resilient_ws::ws::{BinaryType, ConnectionState, EventKind, Frame, Payload, WsError};

mod connect {
    use super::*;

    #[tokio::test]
    async fn immediate_socket_connects_on_creation() {
        let (socket, connector) = socket(Config::default());
        let states = record_states(&socket);

        settle(&socket).await;

        assert_eq!(connector.count(), 1);
        assert_eq!(socket.state(), ConnectionState::Connecting);
        assert_eq!(*states.lock().unwrap(), vec![ConnectionState::Connecting]);
    }

    #[tokio::test]
    async fn deferred_socket_waits_for_connect() {
        let config = Config::builder().immediate(false).build();
        let (socket, connector) = socket(config);

        settle(&socket).await;
        assert_eq!(connector.count(), 0);
        assert_eq!(socket.state(), ConnectionState::Initial);

        socket.connect().unwrap();
        settle(&socket).await;
        assert_eq!(connector.count(), 1);
    }

    #[tokio::test]
    async fn address_is_rewritten_and_extended_with_query() {
        let config = Config::builder()
            .query(json!({ "token": "abc", "empty": "" }))
            .protocols(vec!["chat".to_owned()])
            .build();
        let (socket, connector) = socket(config);

        settle(&socket).await;

        let handle = connector.last();
        assert_eq!(handle.address.as_str(), "ws://localhost:8392/feed?token=abc");
        assert_eq!(handle.protocols, vec!["chat".to_owned()]);
        assert_eq!(socket.protocol().await.as_deref(), Some("chat"));
        assert_eq!(socket.url(), URL);
    }

    #[tokio::test]
    async fn open_publishes_open_and_state() {
        let (socket, connector) = socket(Config::default());
        let states = record_states(&socket);
        let opens = count_events(&socket, EventKind::Open);

        settle(&socket).await;
        connector.last().open();
        settle(&socket).await;

        assert_eq!(socket.state(), ConnectionState::Open);
        assert_eq!(*opens.lock().unwrap(), 1);
        assert_eq!(
            *states.lock().unwrap(),
            vec![ConnectionState::Connecting, ConnectionState::Open]
        );
    }

    #[tokio::test]
    async fn connect_is_ignored_while_connecting_or_open() {
        let (socket, connector) = socket(Config::default());

        socket.connect().unwrap();
        settle(&socket).await;
        assert_eq!(connector.count(), 1, "second connect while connecting");

        connector.last().open();
        socket.connect().unwrap();
        settle(&socket).await;
        assert_eq!(connector.count(), 1, "connect while open");
    }

    #[tokio::test]
    async fn rejected_transport_leaves_socket_untouched() {
        let connector = common::MockConnector::new();
        connector.reject(true);
        let socket =
            resilient_ws::ws::ResilientSocket::with_connector(URL, Config::default(), connector.clone())
                .unwrap();

        let diagnostics = settle(&socket).await;

        assert_eq!(connector.count(), 0);
        assert_eq!(diagnostics.state, ConnectionState::Initial);
        assert_eq!(diagnostics.ready_state, None);
        assert!(!diagnostics.reconnect_pending, "nothing to reconnect");
    }

    #[tokio::test]
    async fn invalid_url_is_not_connected() {
        let connector = common::MockConnector::new();
        let socket = resilient_ws::ws::ResilientSocket::with_connector(
            "not a url",
            Config::default(),
            connector.clone(),
        )
        .unwrap();

        settle(&socket).await;

        assert_eq!(connector.count(), 0);
        assert_eq!(socket.state(), ConnectionState::Initial);
    }

    #[test]
    fn creation_outside_runtime_fails() {
        let error = resilient_ws::ws::ResilientSocket::with_connector(
            URL,
            Config::default(),
            common::MockConnector::new(),
        )
        .unwrap_err();

        assert_eq!(error.kind(), Kind::WebSocket);
    }

    #[tokio::test]
    async fn events_from_superseded_transport_are_ignored() {
        let (socket, connector) = socket(Config::default());
        settle(&socket).await;
        let first = connector.last();

        socket.close().unwrap();
        socket.connect().unwrap();
        settle(&socket).await;
        assert_eq!(connector.count(), 2);

        first.open();
        first.text("late");
        let diagnostics = settle(&socket).await;

        assert_eq!(diagnostics.state, ConnectionState::Connecting);
        assert!(!diagnostics.heartbeat_running, "stale open must not start the heartbeat");
    }
}

mod messaging {
    use super::*;

    fn collect_messages(socket: &resilient_ws::ws::ResilientSocket) -> Arc<Mutex<Vec<Payload>>> {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&messages);
        socket.on_message(move |payload| sink.lock().unwrap().push(payload.clone()));
        messages
    }

    #[tokio::test]
    async fn send_before_open_is_dropped() {
        let (socket, connector) = socket(Config::default());

        socket.send("too early").unwrap();
        settle(&socket).await;

        assert!(connector.last().sent().is_empty());
    }

    #[tokio::test]
    async fn send_passes_data_through() {
        let (socket, connector) = open_socket(Config::default()).await;

        socket.send("hello").unwrap();
        socket.send("").unwrap();
        socket.send(vec![1_u8, 2, 3]).unwrap();
        socket.send(json!({ "type": "subscribe" })).unwrap();
        socket.send_json(&vec!["a", "b"]).unwrap();
        settle(&socket).await;

        assert_eq!(
            connector.last().sent(),
            vec![
                Frame::Text("hello".to_owned()),
                Frame::Text(String::new()),
                Frame::Binary(vec![1_u8, 2, 3].into()),
                Frame::Text(r#"{"type":"subscribe"}"#.to_owned()),
                Frame::Text(r#"["a","b"]"#.to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn inbound_text_is_json_parsed_with_raw_fallback() {
        let (socket, connector) = open_socket(Config::default()).await;
        let messages = collect_messages(&socket);

        connector.last().text(r#"{"type":"echoMessage","data":"hi"}"#);
        connector.last().text("abc{");
        connector.last().text("42");
        settle(&socket).await;

        assert_eq!(
            *messages.lock().unwrap(),
            vec![
                Payload::Json(json!({ "type": "echoMessage", "data": "hi" })),
                Payload::Text("abc{".to_owned()),
                Payload::Json(json!(42)),
            ]
        );
    }

    #[tokio::test]
    async fn binary_type_controls_binary_delivery() {
        let (socket, connector) = open_socket(Config::default()).await;
        let messages = collect_messages(&socket);

        connector.last().binary(b"\"raw\"");
        socket.set_binary_type(BinaryType::Utf8).unwrap();
        settle(&socket).await;
        connector.last().binary(b"\"raw\"");
        settle(&socket).await;

        assert_eq!(connector.last().binary_type(), BinaryType::Utf8);
        assert_eq!(socket.binary_type().await, Some(BinaryType::Utf8));
        assert_eq!(
            *messages.lock().unwrap(),
            vec![
                Payload::Binary(b"\"raw\"".to_vec().into()),
                Payload::Json(json!("raw")),
            ]
        );
    }

    #[tokio::test]
    async fn configured_binary_type_is_applied_to_new_transports() {
        let config = Config::builder().binary_type(BinaryType::Utf8).build();
        let (socket, connector) = socket(config);

        settle(&socket).await;

        assert_eq!(connector.last().binary_type(), BinaryType::Utf8);
    }

    #[tokio::test]
    async fn transport_passthroughs_are_empty_before_connecting() {
        let config = Config::builder().immediate(false).build();
        let (socket, _connector) = socket(config);

        assert_eq!(socket.transport().await, None);
        assert_eq!(socket.buffered_amount().await, None);
        assert_eq!(socket.extensions().await, None);
    }
}

mod errors_and_close {
    use super::*;

    #[tokio::test]
    async fn transport_error_is_published_without_closing() {
        let (socket, connector) = open_socket(Config::default()).await;
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        socket.on_error(move |error| sink.lock().unwrap().push(error.to_string()));

        connector.last().error();
        let diagnostics = settle(&socket).await;

        assert_eq!(diagnostics.state, ConnectionState::Error);
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert_eq!(connector.last().close_calls(), 0);
        assert!(!diagnostics.reconnect_pending, "errors alone do not reconnect");
    }

    #[tokio::test]
    async fn close_walks_through_closing_to_closed() {
        let (socket, connector) = open_socket(Config::default()).await;
        let states = record_states(&socket);
        let closes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&closes);
        socket.on_close(move |info| sink.lock().unwrap().push(info.code));

        socket.close().unwrap();
        let diagnostics = settle(&socket).await;

        assert_eq!(
            *states.lock().unwrap(),
            vec![ConnectionState::Closing, ConnectionState::Closed]
        );
        assert_eq!(*closes.lock().unwrap(), vec![1000]);
        assert_eq!(connector.last().close_calls(), 1);
        assert!(!diagnostics.reconnect_enabled, "explicit close disables reconnection");
        assert!(!diagnostics.heartbeat_running, "explicit close stops the heartbeat");
    }

    #[tokio::test]
    async fn close_without_transport_goes_straight_to_closed() {
        let config = Config::builder().immediate(false).build();
        let (socket, _connector) = socket(config);
        let states = record_states(&socket);

        socket.close().unwrap();
        settle(&socket).await;

        assert_eq!(*states.lock().unwrap(), vec![ConnectionState::Closed]);
    }

    #[tokio::test]
    async fn off_removes_listeners() {
        let (socket, connector) = open_socket(Config::default()).await;
        let messages = count_events(&socket, EventKind::Message);
        let removed = socket.on_message(|_| panic!("removed listener was called"));

        assert_eq!(socket.off(EventKind::Message, Some(removed)), 1);
        connector.last().text("still counted");
        settle(&socket).await;
        assert_eq!(*messages.lock().unwrap(), 1);

        assert_eq!(socket.off(EventKind::Message, None), 1);
        connector.last().text("not counted");
        settle(&socket).await;
        assert_eq!(*messages.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn dispose_silences_listeners_and_stops_the_socket() {
        let (socket, connector) = open_socket(Config::default()).await;
        let states = record_states(&socket);
        let other = socket.clone();

        socket.dispose().await;

        assert!(states.lock().unwrap().is_empty(), "no notifications after dispose");
        assert_eq!(connector.last().close_calls(), 1);

        let error = other.send("after dispose").unwrap_err();
        assert!(
            matches!(error.downcast_ref::<WsError>(), Some(WsError::ConnectionClosed)),
            "{error}"
        );
        assert!(other.diagnostics().await.is_err(), "task is gone");
    }

    #[tokio::test]
    async fn dropping_every_handle_closes_the_transport() {
        let (socket, connector) = open_socket(Config::default()).await;

        drop(socket);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(connector.last().close_calls(), 1);
    }
}
