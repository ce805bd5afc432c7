//! `fbws watch [--type T]`: print indications as they arrive.
//!
//! One JSON object per line, until the server closes the connection or the
//! user hits Ctrl+C.

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use fbws_client::ClientEvent;
use fbws_core::messages::{Envelope, Indication};

use crate::config::Settings;

/// Whether an indication passes the `--type` filter.
pub fn matches(ind: &Indication, ind_type: Option<&str>) -> bool {
    ind_type.map_or(true, |t| ind.ind_type == t)
}

pub async fn run(settings: &Settings, ind_type: Option<&str>) -> Result<()> {
    let (client, mut events) = super::connect(settings).await?;
    info!(url = %settings.url, "watching indications");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ClientEvent::Indication(ind)) => {
                    if matches(&ind, ind_type) {
                        println!("{}", serde_json::to_string(&Envelope::Ind(ind))?);
                    }
                }
                Ok(ClientEvent::Close { code, reason }) => {
                    info!(code, reason = %reason, "connection closed");
                    break;
                }
                Ok(ClientEvent::Error(e)) => warn!(error = %e, "connection error"),
                Ok(ClientEvent::Open) => {}
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "fell behind, indications dropped"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                client.close();
                break;
            }
        }
    }

    Ok(())
}
