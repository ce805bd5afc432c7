//! fbws-client: Rust client library for fbws.
//!
//! Connects to an fbws server over WebSocket, authenticates with a credential
//! object, sends correlated requests, and publishes server indications.
//!
//! # Quick Start
//!
//! ```no_run
//! use fbws_client::{ClientConfig, ClientEvent, FbwsClient};
//! use serde_json::json;
//!
//! # async fn example() -> fbws_core::FbwsResult<()> {
//! let client = FbwsClient::new(ClientConfig::default());
//! let mut events = client.subscribe();
//!
//! let creds = json!({ "token": "s3cret" }).as_object().cloned().unwrap_or_default();
//! client.open("ws://127.0.0.1:3030", creds).await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if event == ClientEvent::Open {
//!         break;
//!     }
//! }
//!
//! let reply = client.send("dev", "read", json!({ "id": 3, "attrName": "onOff" }))?.await?;
//! println!("{:?} {}", reply.status, reply.data);
//!
//! client.close();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod correlator;
pub mod transport;

// Re-export primary public types.
pub use client::{ClientConfig, ClientEvent, FbwsClient};
pub use correlator::{Reply, DEFAULT_REQUEST_TIMEOUT};

// Re-export fbws-core error types for convenience.
pub use fbws_core::{FbwsError, FbwsResult};
