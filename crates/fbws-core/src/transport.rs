//! Abstract message transport for fbws.
//!
//! A transport hands the protocol layer a [`Link`]: a stream of
//! [`TransportEvent`]s coming in and a sender for [`Outbound`] frames going
//! out. WebSocket implementations live in the client and server crates;
//! [`memory_pair`] wires two links together in-process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Close code reported when a peer disappears without a close frame.
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Largest text frame a transport delivers (1 MiB); bigger frames are dropped.
pub const MAX_FRAME_SIZE: usize = 1_048_576;

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established and can carry frames.
    Open,
    /// One complete text frame.
    Message(String),
    /// The connection is gone. Always the last event.
    Closed { code: u16, reason: String },
    /// A transport-level failure; a `Closed` usually follows.
    Error(String),
}

/// Something the protocol layer wants the transport to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// One end of a duplex connection.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Create two connected in-memory links.
///
/// Both ends see `Open` first. Text sent on one end arrives as a `Message`
/// on the other; a `Close` is reported to both ends, after which no more
/// frames flow. Dropping an end's outbound sender closes the pair with
/// [`ABNORMAL_CLOSE_CODE`]. Must be called inside a tokio runtime.
pub fn memory_pair() -> (Link, Link) {
    let (a_out_tx, a_out_rx) = mpsc::unbounded_channel();
    let (b_out_tx, b_out_rx) = mpsc::unbounded_channel();
    let (a_evt_tx, a_evt_rx) = mpsc::unbounded_channel();
    let (b_evt_tx, b_evt_rx) = mpsc::unbounded_channel();

    let _ = a_evt_tx.send(TransportEvent::Open);
    let _ = b_evt_tx.send(TransportEvent::Open);

    let closed = Arc::new(AtomicBool::new(false));
    tokio::spawn(relay(a_out_rx, a_evt_tx.clone(), b_evt_tx.clone(), closed.clone()));
    tokio::spawn(relay(b_out_rx, b_evt_tx, a_evt_tx, closed));

    (
        Link {
            outbound: a_out_tx,
            events: a_evt_rx,
        },
        Link {
            outbound: b_out_tx,
            events: b_evt_rx,
        },
    )
}

async fn relay(
    mut from: mpsc::UnboundedReceiver<Outbound>,
    local: mpsc::UnboundedSender<TransportEvent>,
    remote: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
) {
    while let Some(out) = from.recv().await {
        if closed.load(Ordering::SeqCst) {
            break;
        }
        match out {
            Outbound::Text(text) => {
                let _ = remote.send(TransportEvent::Message(text));
            }
            Outbound::Close { code, reason } => {
                if !closed.swap(true, Ordering::SeqCst) {
                    tracing::trace!(code, reason = %reason, "memory link closed");
                    let _ = remote.send(TransportEvent::Closed {
                        code,
                        reason: reason.clone(),
                    });
                    let _ = local.send(TransportEvent::Closed { code, reason });
                }
                break;
            }
        }
    }

    if !closed.swap(true, Ordering::SeqCst) {
        tracing::debug!("memory link end dropped without a close");
        let abnormal = TransportEvent::Closed {
            code: ABNORMAL_CLOSE_CODE,
            reason: String::new(),
        };
        let _ = remote.send(abnormal.clone());
        let _ = local.send(abnormal);
    }
}
