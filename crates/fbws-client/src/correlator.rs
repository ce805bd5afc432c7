//! Request/response correlation.
//!
//! Every outgoing request is parked under its `(subsys, cmd, seq)` key with a
//! single-shot sender. Whoever removes the sender from the table (a matching
//! response, or the timeout) owns the resolution, so a request resolves
//! exactly once and leaves nothing behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time;

use fbws_core::error::{FbwsError, FbwsResult};
use fbws_core::messages::{Response, RspCode};

/// Requests allowed in flight on one connection (the size of the seq space).
pub const MAX_IN_FLIGHT: usize = 256;

/// Default time to wait for a response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifies one in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub subsys: String,
    pub cmd: String,
    pub seq: u8,
}

/// What the caller of `send` gets back: a status and its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: RspCode,
    pub data: Value,
}

impl Reply {
    /// The reply synthesized when no response arrives in time.
    pub fn timeout() -> Self {
        Self {
            status: RspCode::Timeout,
            data: Value::Object(Default::default()),
        }
    }
}

struct Inner {
    next_seq: u8,
    pending: HashMap<RequestKey, oneshot::Sender<Reply>>,
}

/// Table of in-flight requests for one connection.
pub struct Correlator {
    inner: Mutex<Inner>,
    timeout: Duration,
}

impl Correlator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_seq: 0,
                pending: HashMap::new(),
            }),
            timeout,
        }
    }

    /// Allocate the next sequence number, wrapping 255 → 0.
    pub fn next_seq(&self) -> u8 {
        let mut inner = self.lock();
        Self::alloc(&mut inner)
    }

    fn alloc(inner: &mut Inner) -> u8 {
        let seq = inner.next_seq;
        inner.next_seq = seq.wrapping_add(1);
        seq
    }

    /// Allocate a seq and park a new pending request under it.
    ///
    /// Rejected with [`FbwsError::Busy`] when [`MAX_IN_FLIGHT`] requests are
    /// outstanding, or when the allocated key is still in flight. The seq is
    /// consumed either way.
    pub fn register(self: &Arc<Self>, subsys: &str, cmd: &str) -> FbwsResult<PendingRequest> {
        let mut inner = self.lock();
        let seq = Self::alloc(&mut inner);

        if inner.pending.len() >= MAX_IN_FLIGHT {
            return Err(FbwsError::Busy(format!(
                "{MAX_IN_FLIGHT} requests already in flight"
            )));
        }

        let key = RequestKey {
            subsys: subsys.to_string(),
            cmd: cmd.to_string(),
            seq,
        };
        if inner.pending.contains_key(&key) {
            return Err(FbwsError::Busy(format!(
                "{subsys}.{cmd} seq {seq} is still in flight"
            )));
        }

        let (tx, rx) = oneshot::channel();
        inner.pending.insert(key.clone(), tx);

        Ok(PendingRequest {
            key,
            rx: Some(rx),
            correlator: Arc::clone(self),
        })
    }

    /// Deliver a response to its pending request.
    ///
    /// Returns false (and does nothing) if no request is waiting on that key.
    pub fn resolve(&self, rsp: Response) -> bool {
        let key = RequestKey {
            subsys: rsp.subsys,
            cmd: rsp.cmd,
            seq: rsp.seq,
        };
        let tx = self.lock().pending.remove(&key);
        match tx {
            Some(tx) => {
                let _ = tx.send(Reply {
                    status: rsp.status,
                    data: rsp.data,
                });
                true
            }
            None => false,
        }
    }

    /// Drop a pending request without resolving it.
    fn expire(&self, key: &RequestKey) -> bool {
        self.lock().pending.remove(key).is_some()
    }

    /// Number of requests currently waiting.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A registered request waiting for its response.
///
/// Dropping it before it resolves removes the registration.
pub struct PendingRequest {
    key: RequestKey,
    rx: Option<oneshot::Receiver<Reply>>,
    correlator: Arc<Correlator>,
}

impl PendingRequest {
    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    /// Wait for the response, or synthesize a TIMEOUT reply.
    pub async fn wait(mut self) -> Reply {
        let reply = match self.rx.as_mut() {
            None => Reply::timeout(),
            Some(rx) => match time::timeout(self.correlator.timeout, &mut *rx).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(_)) => Reply::timeout(),
                Err(_) => {
                    if self.correlator.expire(&self.key) {
                        tracing::debug!(
                            subsys = %self.key.subsys,
                            cmd = %self.key.cmd,
                            seq = self.key.seq,
                            "request timed out"
                        );
                        Reply::timeout()
                    } else {
                        // A response won the race between the timer and the lock.
                        rx.try_recv().unwrap_or_else(|_| Reply::timeout())
                    }
                }
            },
        };
        self.rx = None;
        reply
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if self.rx.is_some() {
            self.correlator.expire(&self.key);
        }
    }
}
