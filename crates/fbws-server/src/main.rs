//! fbws-server: standalone fbws responder.
//!
//! Listens for WebSocket connections, authenticates clients with shared
//! tokens (or lets everyone in with `--open`), and answers the built-in
//! `sys` operations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info, warn};

use fbws_server::auth::{
    Authenticator, PermitAll, RateLimitedAuthenticator, TokenAuthenticator,
};
use fbws_server::config::{AuthMode, ServerConfig};
use fbws_server::operations::{register_builtins, OperationTable};
use fbws_server::transport::websocket;
use fbws_server::FbwsServer;

/// How long shutdown waits for clients to receive their close frames.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// fbws-server: authenticated request/indication server
#[derive(Parser, Debug)]
#[command(name = "fbws-server", version, about = "fbws WebSocket server")]
struct Cli {
    /// Address to bind
    #[arg(short, long)]
    bind: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path
    #[arg(long, default_value = "~/.fbws/server.toml")]
    config: String,

    /// Accept any credentials (development only)
    #[arg(long)]
    open: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config_path = PathBuf::from(&cli.config);
    let config = match ServerConfig::load(
        Some(&config_path),
        cli.bind.as_deref(),
        cli.port,
        cli.open,
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.socket_addr(),
        auth = ?config.auth_mode,
        "starting fbws-server"
    );

    let authenticator: Arc<dyn Authenticator> = match config.auth_mode {
        AuthMode::Open => {
            warn!("authentication disabled, every client is accepted");
            Arc::new(PermitAll)
        }
        AuthMode::Token => {
            let tokens = TokenAuthenticator::from_digests(&config.tokens);
            if tokens.is_empty() {
                warn!("no tokens configured, every client will be rejected");
            }
            Arc::new(RateLimitedAuthenticator::new(
                tokens,
                config.max_attempts,
                config.window_secs,
            ))
        }
    };

    let mut operations = OperationTable::new();
    register_builtins(&mut operations, Instant::now());

    let server = FbwsServer::new(Arc::new(operations), authenticator, Arc::new(PermitAll));

    let listener = match websocket::start_listener(config.socket_addr()).await {
        Ok(rx) => rx,
        Err(e) => {
            error!(error = %e, "failed to start listener");
            std::process::exit(1);
        }
    };
    server.start(listener);

    shutdown_signal().await;
    info!("received shutdown signal");

    server.shutdown(SHUTDOWN_GRACE).await;
    info!("fbws-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
