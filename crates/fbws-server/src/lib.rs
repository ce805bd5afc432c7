//! fbws-server: the responder side of fbws.
//!
//! Accepts connections, authenticates each session once, dispatches requests
//! to registered operations, and fans backing-system events out to every
//! authorized session as indications.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fbws_server::auth::PermitAll;
//! use fbws_server::operations::OperationTable;
//! use fbws_server::{transport, FbwsServer};
//! use serde_json::json;
//!
//! # async fn example() -> fbws_core::FbwsResult<()> {
//! let mut ops = OperationTable::new();
//! ops.register("dev", "read", |_args| async { Ok(json!(21)) });
//!
//! let server = FbwsServer::new(Arc::new(ops), Arc::new(PermitAll), Arc::new(PermitAll));
//! let listener = transport::websocket::start_listener("127.0.0.1:3030".parse().unwrap()).await?;
//! server.start(listener);
//!
//! server.dispatch_external_event("permitJoin", json!({ "timeLeft": 60 })).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod handshake;
pub mod indication;
pub mod operations;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

pub use server::{Accepted, FbwsServer};
