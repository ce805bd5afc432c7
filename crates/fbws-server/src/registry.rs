//! Registry of live sessions.
//!
//! At most one session per connection id. Removing a session detaches every
//! listener it registered, so a closed connection can no longer reach the
//! server.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::connection::ConnectionId;
use crate::session::Session;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<Vec<Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Returns false if its connection is already registered.
    pub fn register(&self, session: Arc<Session>) -> bool {
        let mut sessions = self.lock();
        if sessions.iter().any(|s| s.id() == session.id()) {
            return false;
        }
        sessions.push(session);
        true
    }

    /// Remove a session and revoke its listeners. Returns false if absent.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = {
            let mut sessions = self.lock();
            sessions
                .iter()
                .position(|s| s.id() == id)
                .map(|idx| sessions.remove(idx))
        };
        match removed {
            Some(session) => {
                let revoked = session.revoke_listeners();
                tracing::debug!(conn = id, revoked, "session unregistered");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Session>> {
        self.lock().iter().find(|s| s.id() == id).cloned()
    }

    /// Current sessions, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.lock().clone()
    }

    /// Remove every session, revoking their listeners, and return them.
    pub fn drain(&self) -> Vec<Arc<Session>> {
        let drained: Vec<Arc<Session>> = self.lock().drain(..).collect();
        for session in &drained {
            session.revoke_listeners();
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
