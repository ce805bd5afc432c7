//! The fbws initiator.
//!
//! `FbwsClient` owns at most one connection at a time. Opening a connection
//! sends the credentials first; requests are accepted only once the server
//! has answered `authenticated: true`. Every request resolves exactly once,
//! with the server's response, a synthesized TIMEOUT, or a local error.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use fbws_core::codec::{decode, encode};
use fbws_core::error::{FbwsError, FbwsResult};
use fbws_core::messages::{
    Envelope, Handshake, Indication, Message, Request, USER_CLOSE_CODE, USER_CLOSE_REASON,
};
use fbws_core::transport::{Link, Outbound, TransportEvent};

use crate::correlator::{Correlator, PendingRequest, Reply, DEFAULT_REQUEST_TIMEOUT};
use crate::transport;

/// Close code put on the wire when the client closes its own connection.
const NORMAL_CLOSE_CODE: u16 = 1000;

/// Capacity of the event broadcast; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 256;

/// Configuration for an fbws client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a request waits for its response before resolving as TIMEOUT.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Lifecycle and indication events published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The server accepted our credentials.
    Open,
    /// The connection closed. Code 100 means we closed it ourselves.
    Close { code: u16, reason: String },
    /// A transport failure.
    Error(String),
    /// A server-pushed indication.
    Indication(Indication),
}

struct Shared {
    connected: AtomicBool,
    authenticated: AtomicBool,
    events: broadcast::Sender<ClientEvent>,
}

impl Shared {
    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// One open connection.
struct Active {
    outbound: mpsc::UnboundedSender<Outbound>,
    correlator: Arc<Correlator>,
    task: JoinHandle<()>,
}

/// The fbws client.
pub struct FbwsClient {
    config: ClientConfig,
    shared: Arc<Shared>,
    active: Mutex<Option<Active>>,
}

impl FbwsClient {
    pub fn new(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            shared: Arc::new(Shared {
                connected: AtomicBool::new(false),
                authenticated: AtomicBool::new(false),
                events,
            }),
            active: Mutex::new(None),
        }
    }

    /// Connect to `url` and authenticate with `credentials`.
    ///
    /// Returns `Ok(false)` if the client is already running. The result of
    /// authentication arrives later as [`ClientEvent::Open`] or a close.
    pub async fn open(&self, url: &str, credentials: Map<String, Value>) -> FbwsResult<bool> {
        if self.is_running() {
            return Ok(false);
        }
        let link = transport::connect(url).await?;
        Ok(self.open_link(link, credentials))
    }

    /// Start the client over an already-established link.
    ///
    /// Returns false (and drops `link`) if the client is already running.
    pub fn open_link(&self, link: Link, credentials: Map<String, Value>) -> bool {
        let mut active = self.lock();
        if active.is_some() {
            return false;
        }

        // Sequence numbers start over with every connection.
        let correlator = Arc::new(Correlator::new(self.config.request_timeout));
        let Link { outbound, events } = link;

        let task = tokio::spawn(event_loop(
            events,
            outbound.clone(),
            Arc::clone(&correlator),
            Arc::clone(&self.shared),
            credentials,
        ));

        *active = Some(Active {
            outbound,
            correlator,
            task,
        });
        true
    }

    /// Close the connection.
    ///
    /// Emits a local [`ClientEvent::Close`] with code 100. Returns false if
    /// the client was not running. Pending requests run out their timeout.
    pub fn close(&self) -> bool {
        let Some(active) = self.lock().take() else {
            return false;
        };

        let _ = active.outbound.send(Outbound::Close {
            code: NORMAL_CLOSE_CODE,
            reason: USER_CLOSE_REASON.to_string(),
        });
        active.task.abort();

        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.authenticated.store(false, Ordering::SeqCst);
        self.shared.emit(ClientEvent::Close {
            code: USER_CLOSE_CODE,
            reason: USER_CLOSE_REASON.to_string(),
        });
        tracing::info!("client closed");
        true
    }

    /// Send a request.
    ///
    /// Argument errors are returned immediately. Everything else resolves
    /// through the returned future: the server's reply, a TIMEOUT reply, or
    /// an error when the client is not running, not connected, not yet
    /// authenticated, or has too many requests in flight.
    pub fn send(
        &self,
        subsys: &str,
        cmd: &str,
        args: Value,
    ) -> FbwsResult<impl Future<Output = FbwsResult<Reply>> + Send + 'static> {
        if subsys.is_empty() {
            return Err(FbwsError::InvalidArgument("subsys must be a non-empty string".into()));
        }
        if cmd.is_empty() {
            return Err(FbwsError::InvalidArgument("cmd must be a non-empty string".into()));
        }
        let Value::Object(args) = args else {
            return Err(FbwsError::InvalidArgument("args must be an object".into()));
        };

        let prepared = self.transmit(subsys, cmd, args);
        Ok(async move {
            let pending = prepared?;
            Ok(pending.wait().await)
        })
    }

    fn transmit(
        &self,
        subsys: &str,
        cmd: &str,
        args: Map<String, Value>,
    ) -> FbwsResult<PendingRequest> {
        let active = self.lock();
        let Some(active) = active.as_ref() else {
            return Err(FbwsError::NotRunning);
        };
        if !self.is_connected() {
            return Err(FbwsError::ConnectionClosed);
        }
        if !self.is_authenticated() {
            return Err(FbwsError::NotAuthenticated);
        }

        let pending = active.correlator.register(subsys, cmd)?;
        let req = Request::new(subsys, cmd, pending.key().seq, args);
        let text = encode(&Envelope::Req(req).into())?;
        active
            .outbound
            .send(Outbound::Text(text))
            .map_err(|_| FbwsError::ConnectionClosed)?;

        tracing::debug!(subsys, cmd, seq = pending.key().seq, "request sent");
        Ok(pending)
    }

    /// Subscribe to lifecycle and indication events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// True between a successful `open` and `close`, even if the server
    /// dropped the connection in between.
    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn is_authenticated(&self) -> bool {
        self.shared.authenticated.load(Ordering::SeqCst)
    }

    /// Requests currently waiting on this connection.
    pub fn pending_requests(&self) -> usize {
        self.lock()
            .as_ref()
            .map(|a| a.correlator.pending())
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FbwsClient {
    fn drop(&mut self) {
        if let Some(active) = self.lock().take() {
            active.task.abort();
        }
    }
}

async fn event_loop(
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<Outbound>,
    correlator: Arc<Correlator>,
    shared: Arc<Shared>,
    credentials: Map<String, Value>,
) {
    let mut credentials = Some(credentials);

    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Open => {
                shared.connected.store(true, Ordering::SeqCst);
                let Some(data) = credentials.take() else {
                    continue;
                };
                let hello = Handshake::Authenticate {
                    data: Value::Object(data),
                };
                match encode(&hello.into()) {
                    Ok(text) => {
                        let _ = outbound.send(Outbound::Text(text));
                    }
                    Err(e) => tracing::error!("failed to encode credentials: {}", e),
                }
            }
            TransportEvent::Message(text) => {
                handle_frame(&text, &correlator, &shared);
            }
            TransportEvent::Error(e) => {
                tracing::warn!(error = %e, "transport error");
                shared.emit(ClientEvent::Error(e));
            }
            TransportEvent::Closed { code, reason } => {
                tracing::info!(code, reason = %reason, "connection closed");
                shared.connected.store(false, Ordering::SeqCst);
                shared.authenticated.store(false, Ordering::SeqCst);
                shared.emit(ClientEvent::Close { code, reason });
                return;
            }
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    shared.authenticated.store(false, Ordering::SeqCst);
}

fn handle_frame(text: &str, correlator: &Correlator, shared: &Shared) {
    let msg = match decode(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed frame");
            return;
        }
    };

    match msg {
        Message::Handshake(Handshake::Authenticated { data: true }) => {
            if !shared.authenticated.swap(true, Ordering::SeqCst) {
                tracing::info!("authenticated");
                shared.emit(ClientEvent::Open);
            }
        }
        Message::Handshake(Handshake::Authenticated { data: false }) => {
            tracing::warn!("server rejected credentials");
        }
        Message::Envelope(Envelope::Rsp(rsp)) => {
            let (subsys, cmd, seq) = (rsp.subsys.clone(), rsp.cmd.clone(), rsp.seq);
            if !correlator.resolve(rsp) {
                tracing::debug!(%subsys, %cmd, seq, "no request waiting for response");
            }
        }
        Message::Envelope(Envelope::Ind(ind)) => {
            shared.emit(ClientEvent::Indication(ind));
        }
        other => {
            tracing::debug!(?other, "ignoring unexpected message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbws_core::messages::{Response, RspCode};
    use fbws_core::transport::memory_pair;
    use serde_json::json;

    fn credentials() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("token".into(), json!("secret"));
        m
    }

    async fn next_message(server: &mut Link) -> Message {
        loop {
            match server.events.recv().await {
                Some(TransportEvent::Message(text)) => return decode(&text).unwrap(),
                Some(TransportEvent::Open) => continue,
                other => panic!("expected a message, got {other:?}"),
            }
        }
    }

    fn push(server: &Link, msg: Message) {
        server
            .outbound
            .send(Outbound::Text(encode(&msg).unwrap()))
            .unwrap();
    }

    /// Open `client` over an in-memory link, answer the handshake, and hand
    /// back the server end.
    async fn authenticated(client: &FbwsClient) -> Link {
        let mut events = client.subscribe();
        let (client_end, mut server_end) = memory_pair();
        assert!(client.open_link(client_end, credentials()));

        match next_message(&mut server_end).await {
            Message::Handshake(Handshake::Authenticate { data }) => {
                assert_eq!(data, json!({ "token": "secret" }));
            }
            other => panic!("expected authenticate, got {other:?}"),
        }

        push(&server_end, Handshake::Authenticated { data: true }.into());
        assert_eq!(events.recv().await.unwrap(), ClientEvent::Open);
        assert!(client.is_authenticated());
        server_end
    }

    #[tokio::test]
    async fn request_and_response() {
        let client = FbwsClient::new(ClientConfig::default());
        let mut server = authenticated(&client).await;

        let reply = client
            .send("dev", "read", json!({ "id": 3, "attrName": "onOff" }))
            .unwrap();

        let req = match next_message(&mut server).await {
            Message::Envelope(Envelope::Req(req)) => req,
            other => panic!("expected REQ, got {other:?}"),
        };
        assert_eq!(req.seq, 0);
        assert_eq!(req.id, Some(json!(3)));
        assert_eq!(req.args["attrName"], json!("onOff"));

        let rsp = Response::to_request(req, RspCode::Success, json!(true));
        push(&server, Envelope::Rsp(rsp).into());

        let reply = reply.await.unwrap();
        assert_eq!(reply.status, RspCode::Success);
        assert_eq!(reply.data, json!(true));
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn argument_errors_are_immediate() {
        let client = FbwsClient::new(ClientConfig::default());
        assert!(matches!(
            client.send("", "read", json!({})),
            Err(FbwsError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.send("dev", "", json!({})),
            Err(FbwsError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.send("dev", "read", json!([1, 2])),
            Err(FbwsError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn send_before_open_fails_through_the_future() {
        let client = FbwsClient::new(ClientConfig::default());
        let fut = client.send("dev", "read", json!({})).unwrap();
        assert!(matches!(fut.await, Err(FbwsError::NotRunning)));
    }

    #[tokio::test]
    async fn send_before_authentication_fails_without_traffic() {
        let client = FbwsClient::new(ClientConfig::default());
        let (client_end, mut server_end) = memory_pair();
        assert!(client.open_link(client_end, credentials()));

        // Wait until the credentials went out, so the link counts as connected.
        assert!(matches!(
            next_message(&mut server_end).await,
            Message::Handshake(Handshake::Authenticate { .. })
        ));

        let fut = client.send("dev", "read", json!({})).unwrap();
        assert!(matches!(fut.await, Err(FbwsError::NotAuthenticated)));
        assert!(server_end.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_after_server_close_fails_through_the_future() {
        let client = FbwsClient::new(ClientConfig::default());
        let server = authenticated(&client).await;
        let mut events = client.subscribe();

        server
            .outbound
            .send(Outbound::Close {
                code: 3001,
                reason: String::new(),
            })
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            ClientEvent::Close {
                code: 3001,
                reason: String::new()
            }
        );

        assert!(client.is_running());
        assert!(!client.is_connected());
        let fut = client.send("dev", "read", json!({})).unwrap();
        assert!(matches!(fut.await, Err(FbwsError::ConnectionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let client = FbwsClient::new(ClientConfig {
            request_timeout: Duration::from_secs(10),
        });
        let _server = authenticated(&client).await;

        let reply = client.send("net", "permitJoin", json!({ "time": 60 })).unwrap();
        let reply = reply.await.unwrap();
        assert_eq!(reply.status, RspCode::Timeout);
        assert_eq!(reply.data, json!({}));
    }

    #[tokio::test]
    async fn indications_are_published() {
        let client = FbwsClient::new(ClientConfig::default());
        let server = authenticated(&client).await;
        let mut events = client.subscribe();

        let ind = Indication {
            subsys: "net".into(),
            ind_type: "permitJoining".into(),
            id: None,
            data: json!({ "timeLeft": 60 }),
        };
        push(&server, Envelope::Ind(ind.clone()).into());
        assert_eq!(events.recv().await.unwrap(), ClientEvent::Indication(ind));
    }

    #[tokio::test]
    async fn close_emits_user_close() {
        let client = FbwsClient::new(ClientConfig::default());
        let _server = authenticated(&client).await;
        let mut events = client.subscribe();

        assert!(client.close());
        assert_eq!(
            events.recv().await.unwrap(),
            ClientEvent::Close {
                code: 100,
                reason: "User closed.".into()
            }
        );
        assert!(!client.is_running());
        assert!(!client.is_authenticated());
        assert!(!client.close());
    }

    #[tokio::test]
    async fn second_open_is_refused() {
        let client = FbwsClient::new(ClientConfig::default());
        let (a, _b) = memory_pair();
        let (c, _d) = memory_pair();
        assert!(client.open_link(a, credentials()));
        assert!(!client.open_link(c, credentials()));
    }

    #[tokio::test]
    async fn reconnect_restarts_sequence_numbers() {
        let client = FbwsClient::new(ClientConfig::default());

        let mut server = authenticated(&client).await;
        let _first = client.send("dev", "read", json!({})).unwrap();
        let _second = client.send("dev", "read", json!({})).unwrap();
        for expected in 0..2u8 {
            match next_message(&mut server).await {
                Message::Envelope(Envelope::Req(req)) => assert_eq!(req.seq, expected),
                other => panic!("expected REQ, got {other:?}"),
            }
        }
        assert!(client.close());

        let mut server = authenticated(&client).await;
        let _again = client.send("dev", "read", json!({})).unwrap();
        match next_message(&mut server).await {
            Message::Envelope(Envelope::Req(req)) => assert_eq!(req.seq, 0),
            other => panic!("expected REQ, got {other:?}"),
        }
    }
}
