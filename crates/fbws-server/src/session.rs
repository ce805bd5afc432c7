//! Per-connection session state.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::connection::{Connection, ConnectionId, EventKind, Listener, ListenerToken};

/// What authentication and authorization strategies get to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: ConnectionId,
    pub remote: Option<SocketAddr>,
}

/// A connection plus its authentication flag and listener registrations.
pub struct Session {
    info: SessionInfo,
    conn: Arc<Connection>,
    authenticated: AtomicBool,
    tokens: Mutex<Vec<ListenerToken>>,
}

impl Session {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self {
            info: SessionInfo {
                id: conn.id(),
                remote: conn.remote(),
            },
            conn,
            authenticated: AtomicBool::new(false),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.info.id
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Flip the session to authenticated. Returns false if it already was.
    pub fn mark_authenticated(&self) -> bool {
        !self.authenticated.swap(true, Ordering::SeqCst)
    }

    /// Attach a listener to the connection, remembering its token.
    pub fn listen(&self, kind: EventKind, listener: Listener) -> ListenerToken {
        let token = self.conn.hub().on(kind, listener);
        self.lock_tokens().push(token);
        token
    }

    /// Detach every listener this session attached. Returns how many.
    pub fn revoke_listeners(&self) -> usize {
        let tokens: Vec<ListenerToken> = self.lock_tokens().drain(..).collect();
        tokens.iter().filter(|t| self.conn.hub().off(t)).count()
    }

    fn lock_tokens(&self) -> MutexGuard<'_, Vec<ListenerToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
