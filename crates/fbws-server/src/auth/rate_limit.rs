//! Sliding-window rate limiting for authentication attempts.
//!
//! Each key (the peer IP, or the connection id when the transport has no
//! address) may make `max_attempts` attempts per rolling window.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use fbws_core::error::FbwsResult;

use super::Authenticator;
use crate::session::SessionInfo;

/// Per-key attempt counter over a rolling window.
#[derive(Debug)]
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    /// key → timestamps of recent attempts
    entries: HashMap<String, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window_secs: u64) -> Self {
        Self {
            max_attempts,
            window: Duration::from_secs(window_secs),
            entries: HashMap::new(),
        }
    }

    /// Record an attempt for `key` if it is allowed.
    ///
    /// Returns `false` (and records nothing) once the window is full.
    pub fn check_and_record(&mut self, key: &str) -> bool {
        let now = Instant::now();
        let window = self.window;

        let attempts = self.entries.entry(key.to_string()).or_default();
        attempts.retain(|t| now.duration_since(*t) < window);

        if attempts.len() as u32 >= self.max_attempts {
            return false;
        }

        attempts.push(now);
        true
    }

    /// Drop keys whose attempts have all expired.
    pub fn gc(&mut self) {
        let now = Instant::now();
        let window = self.window;

        self.entries.retain(|_, attempts| {
            attempts.retain(|t| now.duration_since(*t) < window);
            !attempts.is_empty()
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}

/// Wraps another authenticator, refusing peers that try too often.
pub struct RateLimitedAuthenticator<A> {
    inner: A,
    limiter: Mutex<RateLimiter>,
}

impl<A: Authenticator> RateLimitedAuthenticator<A> {
    pub fn new(inner: A, max_attempts: u32, window_secs: u64) -> Self {
        Self {
            inner,
            limiter: Mutex::new(RateLimiter::new(max_attempts, window_secs)),
        }
    }

    fn allow(&self, session: &SessionInfo) -> bool {
        let key = match session.remote {
            Some(addr) => addr.ip().to_string(),
            None => format!("conn-{}", session.id),
        };
        let mut limiter = self.limiter.lock().unwrap_or_else(PoisonError::into_inner);
        limiter.gc();
        limiter.check_and_record(&key)
    }
}

#[async_trait]
impl<A: Authenticator> Authenticator for RateLimitedAuthenticator<A> {
    async fn authenticate(&self, session: &SessionInfo, credentials: &Value) -> FbwsResult<bool> {
        if !self.allow(session) {
            tracing::warn!(
                conn = session.id,
                remote = ?session.remote,
                "authentication rate limit exceeded"
            );
            return Ok(false);
        }
        self.inner.authenticate(session, credentials).await
    }
}
