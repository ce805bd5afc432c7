//! Server configuration: TOML file + CLI overrides.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use fbws_core::{FbwsError, FbwsResult};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// How clients prove who they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Credentials must carry a token whose digest is listed in `tokens`.
    #[default]
    Token,
    /// Any credentials are accepted.
    Open,
}

/// `[auth]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub mode: AuthMode,
    /// SHA-256 hex digests of accepted tokens.
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            tokens: Vec::new(),
            max_attempts: default_max_attempts(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3030
}
fn default_max_attempts() -> u32 {
    5
}
fn default_window_secs() -> u64 {
    60
}

/// Resolved server configuration (CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub auth_mode: AuthMode,
    pub tokens: Vec<String>,
    pub max_attempts: u32,
    pub window_secs: u64,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_bind: Option<&str>,
        cli_port: Option<u16>,
        cli_open: bool,
    ) -> FbwsResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| FbwsError::Other(format!("config parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        let bind_str = cli_bind
            .map(|s| s.to_string())
            .unwrap_or(file_config.server.bind);
        let bind: IpAddr = bind_str
            .parse()
            .map_err(|e| FbwsError::Other(format!("invalid bind address {bind_str:?}: {e}")))?;

        let auth_mode = if cli_open {
            AuthMode::Open
        } else {
            file_config.auth.mode
        };

        Ok(Self {
            bind,
            port: cli_port.unwrap_or(file_config.server.port),
            auth_mode,
            tokens: file_config.auth.tokens,
            max_attempts: file_config.auth.max_attempts,
            window_secs: file_config.auth.window_secs,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Expand `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_file() {
        let cfg = ServerConfig::load(None, None, None, false).unwrap();
        assert_eq!(cfg.socket_addr(), "0.0.0.0:3030".parse().unwrap());
        assert_eq!(cfg.auth_mode, AuthMode::Token);
        assert!(cfg.tokens.is_empty());
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.window_secs, 60);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = ServerConfig::load(
            Some(Path::new("/nonexistent/fbws/server.toml")),
            None,
            None,
            false,
        )
        .unwrap();
        assert_eq!(cfg.port, 3030);
    }

    #[test]
    fn file_values_and_overrides() {
        let file = write_config(
            r#"
[server]
bind = "127.0.0.1"
port = 4000

[auth]
mode = "token"
tokens = ["ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"]
max_attempts = 3
"#,
        );

        let cfg = ServerConfig::load(Some(file.path()), None, None, false).unwrap();
        assert_eq!(cfg.socket_addr(), "127.0.0.1:4000".parse().unwrap());
        assert_eq!(cfg.tokens.len(), 1);
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.window_secs, 60);

        let cfg = ServerConfig::load(Some(file.path()), Some("::1"), Some(5000), true).unwrap();
        assert_eq!(cfg.socket_addr(), "[::1]:5000".parse().unwrap());
        assert_eq!(cfg.auth_mode, AuthMode::Open);
    }

    #[test]
    fn open_mode_from_file() {
        let file = write_config("[auth]\nmode = \"open\"\n");
        let cfg = ServerConfig::load(Some(file.path()), None, None, false).unwrap();
        assert_eq!(cfg.auth_mode, AuthMode::Open);
    }

    #[test]
    fn bad_bind_address_is_an_error() {
        assert!(ServerConfig::load(None, Some("not-an-ip"), None, false).is_err());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let file = write_config("[server]\nport = \"many\"\n");
        assert!(ServerConfig::load(Some(file.path()), None, None, false).is_err());
    }

    #[test]
    fn tilde_expansion() {
        let expanded = expand_tilde(Path::new("~/.fbws/server.toml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".fbws/server.toml"));
        }
        assert_eq!(expand_tilde(Path::new("/etc/fbws.toml")), PathBuf::from("/etc/fbws.toml"));
    }
}
