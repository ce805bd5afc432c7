//! WebSocket listener using tokio-tungstenite.
//!
//! Every accepted socket is wrapped into a [`Link`]: a writer task drains
//! outbound frames into the socket, a reader task turns incoming text frames
//! into transport events.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use fbws_core::error::{FbwsError, FbwsResult};
use fbws_core::transport::{Link, Outbound, TransportEvent, ABNORMAL_CLOSE_CODE, MAX_FRAME_SIZE};

use crate::server::Accepted;

/// Upgraded links waiting for the server to pick them up.
const ACCEPT_BACKLOG: usize = 64;

/// Bind `addr` and start accepting WebSocket connections.
///
/// Returns a receiver that yields one [`Accepted`] link per upgraded socket.
/// The accept loop ends once that receiver is dropped.
pub async fn start_listener(addr: SocketAddr) -> FbwsResult<mpsc::Receiver<Accepted>> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| FbwsError::Transport(format!("cannot listen on {addr}: {e}")))?;
    info!(%addr, "listening for fbws connections");

    let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
    tokio::spawn(accept_loop(listener, tx));
    Ok(rx)
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<Accepted>) {
    while !tx.is_closed() {
        let (stream, remote) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "accept failed");
                continue;
            }
        };
        // Upgrade off the accept path.
        tokio::spawn(upgrade(stream, remote, tx.clone()));
    }
    debug!("listener channel dropped, accept loop ended");
}

async fn upgrade(stream: TcpStream, remote: SocketAddr, tx: mpsc::Sender<Accepted>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%remote, error = %e, "websocket upgrade failed");
            return;
        }
    };
    debug!(%remote, "websocket upgraded");

    let accepted = Accepted {
        link: into_link(ws),
        remote: Some(remote),
    };
    if tx.send(accepted).await.is_err() {
        debug!(%remote, "server no longer accepting, dropping connection");
    }
}

/// Split an upgraded socket into reader and writer tasks joined by a [`Link`].
fn into_link(ws_stream: WebSocketStream<TcpStream>) -> Link {
    let (mut ws_sink, mut ws_read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<TransportEvent>();

    let _ = evt_tx.send(TransportEvent::Open);

    tokio::spawn(async move {
        while let Some(out) = out_rx.recv().await {
            let msg = match out {
                Outbound::Text(text) => Message::Text(text.into()),
                Outbound::Close { code, reason } => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = ws_sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            };
            if let Err(e) = ws_sink.send(msg).await {
                debug!(error = %e, "WebSocket write failed");
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    tokio::spawn(async move {
        let mut close = None;
        while let Some(msg) = ws_read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if text.len() > MAX_FRAME_SIZE {
                        warn!(len = text.len(), max = MAX_FRAME_SIZE, "dropping oversized frame");
                        continue;
                    }
                    if evt_tx.send(TransportEvent::Message(text.to_string())).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(frame)) => {
                    close = frame.map(|f| (u16::from(f.code), f.reason.to_string()));
                    break;
                }
                // Pongs are queued by tungstenite itself.
                Ok(_) => continue,
                Err(e) => {
                    let _ = evt_tx.send(TransportEvent::Error(e.to_string()));
                    break;
                }
            }
        }

        let (code, reason) = close.unwrap_or((ABNORMAL_CLOSE_CODE, String::new()));
        let _ = evt_tx.send(TransportEvent::Closed { code, reason });
    });

    Link {
        outbound: out_tx,
        events: evt_rx,
    }
}
