//! Transport selection for the fbws client.
//!
//! Only WebSocket is supported: `ws://` for plain connections, `wss://` for TLS.

pub mod websocket;

use fbws_core::error::{FbwsError, FbwsResult};
use fbws_core::transport::Link;

/// Check that a URL names a transport the client can open.
pub fn check_url(url: &str) -> FbwsResult<()> {
    let lower = url.to_lowercase();
    let rest = lower
        .strip_prefix("ws://")
        .or_else(|| lower.strip_prefix("wss://"))
        .ok_or_else(|| {
            FbwsError::InvalidArgument(format!(
                "unsupported URL scheme: {url} (expected ws:// or wss://)"
            ))
        })?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(FbwsError::InvalidArgument(format!("missing host in URL: {url}")));
    }
    Ok(())
}

/// Connect to a server and return the client end of the link.
pub async fn connect(url: &str) -> FbwsResult<Link> {
    check_url(url)?;
    websocket::connect(url).await
}
