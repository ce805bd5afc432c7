//! One accepted connection and its event listeners.
//!
//! Transport events for a connection are pumped, in order, into a small
//! listener hub. Listeners are registered per event kind and removed by the
//! token returned at registration.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};

use fbws_core::codec::encode;
use fbws_core::error::{FbwsError, FbwsResult};
use fbws_core::messages::Message;
use fbws_core::transport::{Outbound, TransportEvent};

/// Process-unique connection identifier.
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// An event delivered to connection listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Message(String),
    Close { code: u16, reason: String },
    Error(String),
}

impl ConnectionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ConnectionEvent::Message(_) => EventKind::Message,
            ConnectionEvent::Close { .. } => EventKind::Close,
            ConnectionEvent::Error(_) => EventKind::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Close,
    Error,
}

/// Handle for removing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken {
    kind: EventKind,
    id: u64,
}

impl ListenerToken {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

pub type Listener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

#[derive(Default)]
struct HubInner {
    next_id: u64,
    listeners: Vec<(ListenerToken, Listener)>,
}

/// Listener table for one connection.
#[derive(Default)]
pub struct EventHub {
    inner: Mutex<HubInner>,
}

impl EventHub {
    /// Register a listener for one kind of event.
    pub fn on(&self, kind: EventKind, listener: Listener) -> ListenerToken {
        let mut inner = self.lock();
        inner.next_id += 1;
        let token = ListenerToken {
            kind,
            id: inner.next_id,
        };
        inner.listeners.push((token, listener));
        token
    }

    /// Remove a listener. Returns true if it was registered.
    pub fn off(&self, token: &ListenerToken) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(t, _)| t != token);
        inner.listeners.len() < before
    }

    /// Deliver an event to every listener of its kind.
    pub fn emit(&self, event: &ConnectionEvent) {
        let kind = event.kind();
        // Listeners may call back into the hub (a close listener unregisters).
        let targets: Vec<Listener> = self
            .lock()
            .listeners
            .iter()
            .filter(|(t, _)| t.kind == kind)
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in targets {
            listener(event);
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock()
            .listeners
            .iter()
            .filter(|(t, _)| t.kind == kind)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An accepted connection.
pub struct Connection {
    id: ConnectionId,
    remote: Option<SocketAddr>,
    outbound: mpsc::UnboundedSender<Outbound>,
    hub: EventHub,
    /// Flips to true once the transport has finished.
    closed: watch::Sender<bool>,
}

impl Connection {
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>, remote: Option<SocketAddr>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            remote,
            outbound,
            hub: EventHub::default(),
            closed: watch::Sender::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Encode and send one message.
    pub fn send(&self, msg: &Message) -> FbwsResult<()> {
        self.send_text(encode(msg)?)
    }

    /// Send an already-encoded frame.
    pub fn send_text(&self, text: String) -> FbwsResult<()> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| FbwsError::ConnectionClosed)
    }

    /// Ask the transport to close. Listeners hear about it through the
    /// transport's own close event.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }

    /// Raise a protocol error on this connection's error listeners.
    pub fn raise_error(&self, message: impl Into<String>) {
        self.hub.emit(&ConnectionEvent::Error(message.into()));
    }

    /// Resolves once the transport has reported its close (or vanished).
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Forward transport events to the listeners until the transport closes.
    pub async fn pump(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let mut saw_close = false;
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Open => {}
                TransportEvent::Message(text) => self.hub.emit(&ConnectionEvent::Message(text)),
                TransportEvent::Error(e) => self.hub.emit(&ConnectionEvent::Error(e)),
                TransportEvent::Closed { code, reason } => {
                    self.hub.emit(&ConnectionEvent::Close { code, reason });
                    saw_close = true;
                    break;
                }
            }
        }
        if !saw_close {
            tracing::debug!(conn = self.id, "transport ended without a close event");
        }
        self.closed.send_replace(true);
    }
}
