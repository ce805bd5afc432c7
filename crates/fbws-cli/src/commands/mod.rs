//! CLI subcommand implementations.

pub mod call;
pub mod watch;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast;
use tokio::time;
use tracing::debug;

use fbws_client::{ClientConfig, ClientEvent, FbwsClient};

use crate::config::Settings;

/// Connect and wait until the server has accepted our credentials.
pub async fn connect(settings: &Settings) -> Result<(FbwsClient, broadcast::Receiver<ClientEvent>)> {
    let client = FbwsClient::new(ClientConfig {
        request_timeout: settings.timeout,
    });
    let mut events = client.subscribe();

    client
        .open(&settings.url, settings.credentials())
        .await
        .with_context(|| format!("failed to connect to {}", settings.url))?;

    let outcome = time::timeout(settings.timeout, async {
        loop {
            match events.recv().await {
                Ok(ClientEvent::Open) => return Ok(()),
                Ok(ClientEvent::Close { code, reason }) => {
                    bail!("connection closed during authentication (code {code}) {reason}")
                }
                Ok(other) => debug!(?other, "event before authentication"),
                Err(e) => bail!("event stream failed: {e}"),
            }
        }
    })
    .await;

    match outcome {
        Ok(Ok(())) => Ok((client, events)),
        Ok(Err(e)) => Err(e),
        Err(_) => bail!("timed out waiting for authentication"),
    }
}
