//! The fbws responder.
//!
//! `FbwsServer` accepts links from a listener, runs the authentication
//! handshake on each, dispatches requests from authenticated sessions, and
//! fans backing-system events out as indications.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use fbws_core::catalog::lookup;
use fbws_core::codec::decode;
use fbws_core::error::{FbwsError, FbwsResult};
use fbws_core::messages::{
    Envelope, Handshake, Message, SERVER_STOP_CLOSE_CODE, SERVER_STOP_REASON,
};
use fbws_core::transport::Link;

use crate::auth::{Authenticator, Authorizer};
use crate::connection::{Connection, ConnectionEvent, EventKind};
use crate::dispatch;
use crate::handshake;
use crate::indication;
use crate::operations::OperationRegistry;
use crate::registry::SessionRegistry;
use crate::session::Session;

/// A link handed to the server by a listener.
pub struct Accepted {
    pub link: Link,
    pub remote: Option<SocketAddr>,
}

struct Inner {
    running: AtomicBool,
    sessions: SessionRegistry,
    operations: Arc<dyn OperationRegistry>,
    authenticator: Arc<dyn Authenticator>,
    authorizer: Arc<dyn Authorizer>,
}

/// The fbws server.
pub struct FbwsServer {
    inner: Arc<Inner>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl FbwsServer {
    pub fn new(
        operations: Arc<dyn OperationRegistry>,
        authenticator: Arc<dyn Authenticator>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                running: AtomicBool::new(false),
                sessions: SessionRegistry::new(),
                operations,
                authenticator,
                authorizer,
            }),
            accept_task: Mutex::new(None),
        }
    }

    /// Start accepting links. Returns false if already running.
    pub fn start(&self, mut listener: mpsc::Receiver<Accepted>) -> bool {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let inner = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(accepted) = listener.recv().await {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }
                Inner::init_session(&inner, accepted);
            }
            tracing::debug!("accept loop ended");
        });

        *self.lock_task() = Some(task);
        tracing::info!("fbws server started");
        true
    }

    /// Stop the server. Returns false if it was not running.
    ///
    /// Every session is unregistered and its connection closed with 1001
    /// "Server stopped.". The close frames are queued, not flushed; use
    /// [`FbwsServer::shutdown`] to wait for them.
    pub fn stop(&self) -> bool {
        self.halt().is_some()
    }

    /// Stop the server and wait, up to `grace`, for every closed
    /// connection's transport to finish. Returns false if it was not running.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let Some(sessions) = self.halt() else {
            return false;
        };

        let closing = join_all(sessions.iter().map(|s| s.connection().closed()));
        if time::timeout(grace, closing).await.is_err() {
            let open = sessions.iter().filter(|s| !s.connection().is_closed()).count();
            tracing::warn!(open, "connections still open after shutdown grace period");
        }
        true
    }

    fn halt(&self) -> Option<Vec<Arc<Session>>> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return None;
        }

        if let Some(task) = self.lock_task().take() {
            task.abort();
        }

        let sessions = self.inner.sessions.drain();
        for session in &sessions {
            session
                .connection()
                .close(SERVER_STOP_CLOSE_CODE, SERVER_STOP_REASON);
        }
        tracing::info!(closed = sessions.len(), "fbws server stopped");
        Some(sessions)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Number of registered sessions, authenticated or not.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Push a backing-system event to every authenticated, authorized session.
    ///
    /// Returns how many sessions the indication was sent to. Fails for event
    /// names outside the catalog, non-object payloads, and a stopped server.
    pub async fn dispatch_external_event(&self, event: &str, payload: Value) -> FbwsResult<usize> {
        let Some(entry) = lookup(event) else {
            tracing::error!(event, "unsupported event");
            return Err(FbwsError::UnsupportedEvent(event.to_string()));
        };
        if !payload.is_object() {
            return Err(FbwsError::InvalidArgument(format!(
                "payload of {event} must be an object"
            )));
        }
        if !self.is_running() {
            tracing::error!(event, "cannot send indication, server is stopped");
            return Err(FbwsError::NotRunning);
        }

        let sessions = self.inner.sessions.snapshot();
        let delivered = indication::fan_out(
            self.inner.authorizer.as_ref(),
            &sessions,
            entry.indication(&payload),
        )
        .await?;

        tracing::debug!(event, subsys = entry.subsys, ind_type = entry.ind_type, delivered, "indication sent");
        Ok(delivered)
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.accept_task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FbwsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    /// Register a new session, attach its listeners, and start its pump.
    fn init_session(inner: &Arc<Self>, accepted: Accepted) {
        let Link { outbound, events } = accepted.link;
        let conn = Arc::new(Connection::new(outbound, accepted.remote));
        let session = Arc::new(Session::new(Arc::clone(&conn)));

        if !inner.sessions.register(Arc::clone(&session)) {
            return;
        }

        // One worker per session handles its frames in arrival order.
        let (inbox, frames) = mpsc::unbounded_channel::<String>();
        session.listen(
            EventKind::Message,
            Arc::new(move |event: &ConnectionEvent| {
                if let ConnectionEvent::Message(text) = event {
                    let _ = inbox.send(text.clone());
                }
            }),
        );
        tokio::spawn(Inner::session_worker(
            Arc::downgrade(inner),
            Arc::downgrade(&session),
            frames,
        ));

        let server: Weak<Inner> = Arc::downgrade(inner);
        let id = conn.id();
        session.listen(
            EventKind::Close,
            Arc::new(move |event: &ConnectionEvent| {
                if let ConnectionEvent::Close { code, reason } = event {
                    tracing::info!(conn = id, code, reason = %reason, "connection closed");
                }
                if let Some(server) = server.upgrade() {
                    server.sessions.unregister(id);
                }
            }),
        );

        session.listen(
            EventKind::Error,
            Arc::new(move |event: &ConnectionEvent| {
                if let ConnectionEvent::Error(e) = event {
                    tracing::warn!(conn = id, error = %e, "connection error");
                }
            }),
        );

        tracing::info!(conn = id, remote = ?accepted.remote, "connection accepted");
        tokio::spawn(conn.pump(events));
    }

    /// Drain one session's frames in order. Ends when the session's message
    /// listener is revoked or the server is gone.
    async fn session_worker(
        server: Weak<Inner>,
        session: Weak<Session>,
        mut frames: mpsc::UnboundedReceiver<String>,
    ) {
        while let Some(text) = frames.recv().await {
            let (Some(server), Some(session)) = (server.upgrade(), session.upgrade()) else {
                break;
            };
            server.handle_message(&session, &text).await;
        }
    }

    async fn handle_message(&self, session: &Session, text: &str) {
        let msg = match decode(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(conn = session.id(), error = %e, "dropping malformed frame");
                return;
            }
        };

        match msg {
            Message::Handshake(Handshake::Authenticate { data }) => {
                handshake::authenticate(self.authenticator.as_ref(), session, data).await;
            }
            Message::Envelope(Envelope::Req(req)) => {
                if !session.is_authenticated() {
                    tracing::debug!(
                        conn = session.id(),
                        subsys = %req.subsys,
                        cmd = %req.cmd,
                        "dropping request from unauthenticated session"
                    );
                    return;
                }
                dispatch::handle_request(
                    self.operations.as_ref(),
                    self.authorizer.as_ref(),
                    session,
                    req,
                )
                .await;
            }
            other => {
                tracing::debug!(conn = session.id(), ?other, "ignoring unexpected message");
            }
        }
    }
}
