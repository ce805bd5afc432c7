//! Shared-token authentication.
//!
//! Clients send `{ "token": "<secret>" }` as their credentials. The server
//! keeps only SHA-256 digests (lowercase hex) of the accepted tokens.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use fbws_core::error::FbwsResult;

use super::Authenticator;
use crate::session::SessionInfo;

/// Hex-encoded SHA-256 of a token, as stored in the server config.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Debug, Clone, Default)]
pub struct TokenAuthenticator {
    digests: HashSet<String>,
}

impl TokenAuthenticator {
    /// Build from hex digests. Case is ignored.
    pub fn from_digests<I, S>(digests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            digests: digests
                .into_iter()
                .map(|d| d.as_ref().trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, session: &SessionInfo, credentials: &Value) -> FbwsResult<bool> {
        let Some(token) = credentials.get("token").and_then(Value::as_str) else {
            tracing::debug!(conn = session.id, "credentials carry no token");
            return Ok(false);
        };
        Ok(self.digests.contains(&token_digest(token)))
    }
}
