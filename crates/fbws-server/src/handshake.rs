//! Server-side authentication handshake.
//!
//! The first `authenticate` message on a session is checked by the configured
//! [`Authenticator`]:
//!
//! - accepted: the session is marked authenticated and told `true`;
//! - rejected: told `false`, an error is raised, the connection closes 3001;
//! - authenticator error: the error is raised and the connection closes 3001.

use serde_json::Value;

use fbws_core::messages::{Handshake, AUTH_FAILURE_CLOSE_CODE};

use crate::auth::Authenticator;
use crate::session::Session;

/// Process one `authenticate` message.
pub async fn authenticate(authenticator: &dyn Authenticator, session: &Session, credentials: Value) {
    if session.is_authenticated() {
        tracing::debug!(conn = session.id(), "ignoring repeated authenticate");
        return;
    }

    let conn = session.connection();
    match authenticator.authenticate(session.info(), &credentials).await {
        Ok(true) => {
            if !session.mark_authenticated() {
                return;
            }
            tracing::info!(conn = session.id(), remote = ?session.info().remote, "session authenticated");
            if let Err(e) = conn.send(&Handshake::Authenticated { data: true }.into()) {
                tracing::debug!(conn = session.id(), error = %e, "could not confirm authentication");
            }
        }
        Ok(false) => {
            tracing::warn!(conn = session.id(), remote = ?session.info().remote, "authentication rejected");
            let _ = conn.send(&Handshake::Authenticated { data: false }.into());
            conn.raise_error("Authentication failure");
            conn.close(AUTH_FAILURE_CLOSE_CODE, "");
        }
        Err(e) => {
            tracing::error!(conn = session.id(), error = %e, "authenticator failed");
            conn.raise_error(e.to_string());
            conn.close(AUTH_FAILURE_CLOSE_CODE, "");
        }
    }
}
