//! Typed publish/subscribe for socket notifications.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::connection::ConnectionState;
use super::error::WsError;
use super::message::Payload;
use super::traits::CloseInfo;

/// The kinds of notification a socket publishes.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    State,
    Open,
    Close,
    Error,
    Message,
}

impl EventKind {
    pub const ALL: [Self; 5] = [
        Self::State,
        Self::Open,
        Self::Close,
        Self::Error,
        Self::Message,
    ];
}

/// A notification published by a socket.
#[non_exhaustive]
#[derive(Debug)]
pub enum Event {
    /// The connection state changed
    State(ConnectionState),
    /// The transport finished opening
    Open,
    /// The transport closed
    Close(CloseInfo),
    /// The transport reported an error
    Error(WsError),
    /// A message arrived that is not a heartbeat reply
    Message(Payload),
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::State(_) => EventKind::State,
            Self::Open => EventKind::Open,
            Self::Close(_) => EventKind::Close,
            Self::Error(_) => EventKind::Error,
            Self::Message(_) => EventKind::Message,
        }
    }
}

/// Identifies a registered listener so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Listener registry shared between a socket handle and its connection task.
///
/// Handlers run on the connection task, in registration order. They may register or remove
/// listeners themselves; such changes apply from the next publication on.
#[derive(Default)]
pub struct EventBus {
    handlers: DashMap<EventKind, Vec<(ListenerId, Handler)>>,
    next_id: AtomicU64,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove one listener, or every listener of `kind` when `id` is `None`.
    ///
    /// Returns how many listeners were removed.
    pub fn off(&self, kind: EventKind, id: Option<ListenerId>) -> usize {
        let Some(mut handlers) = self.handlers.get_mut(&kind) else {
            return 0;
        };
        let before = handlers.len();
        match id {
            Some(id) => handlers.retain(|(listener, _)| *listener != id),
            None => handlers.clear(),
        }
        before - handlers.len()
    }

    /// Remove every listener of every kind.
    pub fn clear(&self) {
        for kind in EventKind::ALL {
            self.off(kind, None);
        }
    }

    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, |handlers| handlers.len())
    }

    pub fn emit(&self, event: &Event) {
        // Snapshot first: a handler calling `on`/`off` must not run into the map's shard lock.
        let handlers: Vec<Handler> = match self.handlers.get(&event.kind()) {
            Some(handlers) => handlers
                .iter()
                .map(|(_, handler)| Arc::clone(handler))
                .collect(),
            None => return,
        };

        for handler in handlers {
            handler(event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in EventKind::ALL {
            map.entry(&kind, &self.listener_count(kind));
        }
        map.finish()
    }
}
