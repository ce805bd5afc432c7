//! Client configuration at `~/.fbws/config.toml`.
//!
//! Provides the default server URL, token and request timeout.
//! CLI flags always override config file values.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,
}

/// Default connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Server URL (`ws://` or `wss://`).
    #[serde(default = "default_url")]
    pub url: String,

    /// Token sent as credentials (empty = none).
    #[serde(default)]
    pub token: String,

    /// Seconds a request may wait for its response.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:3030".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &str) -> Result<Self> {
        let path = Path::new(path);
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Connection settings after CLI overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Settings {
    pub fn resolve(
        cfg: &Config,
        url: Option<String>,
        token: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Self {
        let token = token
            .or_else(|| Some(cfg.default.token.clone()))
            .filter(|t| !t.is_empty());
        Self {
            url: url.unwrap_or_else(|| cfg.default.url.clone()),
            token,
            timeout: Duration::from_secs(timeout_secs.unwrap_or(cfg.default.timeout_secs)),
        }
    }

    /// The credential object sent in the handshake.
    pub fn credentials(&self) -> Map<String, Value> {
        let mut creds = Map::new();
        if let Some(token) = &self.token {
            creds.insert("token".into(), Value::String(token.clone()));
        }
        creds
    }
}
