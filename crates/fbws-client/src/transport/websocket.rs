//! WebSocket transport for the fbws client.
//!
//! Each protocol message travels as one text frame. The socket is split into
//! a writer task draining [`Outbound`] frames and a reader task turning
//! incoming frames into [`TransportEvent`]s.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use fbws_core::error::{FbwsError, FbwsResult};
use fbws_core::transport::{Link, Outbound, TransportEvent, ABNORMAL_CLOSE_CODE, MAX_FRAME_SIZE};

/// Connect to an fbws server and return the client end of the link.
pub async fn connect(url: &str) -> FbwsResult<Link> {
    let (ws_stream, _response) = connect_async(url)
        .await
        .map_err(|e| FbwsError::Transport(format!("WebSocket connect error: {e}")))?;

    tracing::info!("WebSocket connected to {}", url);

    let (mut ws_sink, mut ws_read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<TransportEvent>();

    let _ = evt_tx.send(TransportEvent::Open);

    tokio::spawn(async move {
        while let Some(out) = out_rx.recv().await {
            match out {
                Outbound::Text(text) => {
                    if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                        tracing::warn!("WebSocket write error: {}", e);
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = ws_sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
        let _ = ws_sink.close().await;
        tracing::debug!("WebSocket writer ended");
    });

    tokio::spawn(async move {
        let mut close = None;
        while let Some(msg) = ws_read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if text.len() > MAX_FRAME_SIZE {
                        tracing::warn!(len = text.len(), "dropping oversized frame");
                        continue;
                    }
                    if evt_tx.send(TransportEvent::Message(text.to_string())).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!("WebSocket close frame received");
                    close = frame.map(|f| (u16::from(f.code), f.reason.to_string()));
                    break;
                }
                Ok(_) => continue, // binary frames carry nothing for us; pings are answered by tungstenite
                Err(e) => {
                    tracing::error!("WebSocket read error: {}", e);
                    let _ = evt_tx.send(TransportEvent::Error(e.to_string()));
                    break;
                }
            }
        }

        let (code, reason) = close.unwrap_or((ABNORMAL_CLOSE_CODE, String::new()));
        let _ = evt_tx.send(TransportEvent::Closed { code, reason });
        tracing::debug!("WebSocket reader ended");
    });

    Ok(Link {
        outbound: out_tx,
        events: evt_rx,
    })
}
