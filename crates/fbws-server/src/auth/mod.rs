//! Authentication and authorization strategies.
//!
//! The server never decides on its own who may connect or call operations;
//! it asks an [`Authenticator`] once per session and an [`Authorizer`] for
//! every request and every indication.

pub mod rate_limit;
pub mod token;

use async_trait::async_trait;
use serde_json::Value;

use fbws_core::error::FbwsResult;

use crate::session::SessionInfo;

pub use rate_limit::{RateLimitedAuthenticator, RateLimiter};
pub use token::TokenAuthenticator;

/// Decides whether a session's credentials are acceptable.
///
/// `Ok(false)` is an explicit rejection; `Err` means the decision could not
/// be made. Both end the session.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, session: &SessionInfo, credentials: &Value) -> FbwsResult<bool>;
}

/// Decides whether an authenticated session may act right now.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, session: &SessionInfo) -> FbwsResult<bool>;
}

/// Accepts everyone. For tests and trusted local setups only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAll;

#[async_trait]
impl Authenticator for PermitAll {
    async fn authenticate(&self, _session: &SessionInfo, _credentials: &Value) -> FbwsResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl Authorizer for PermitAll {
    async fn authorize(&self, _session: &SessionInfo) -> FbwsResult<bool> {
        Ok(true)
    }
}
