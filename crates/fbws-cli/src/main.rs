//! fbws: command-line client for fbws servers.
//!
//! Calls remote operations and watches indications.

mod commands;
mod config;

use clap::{Parser, Subcommand};

use crate::config::{Config, Settings};

/// fbws: talk to an fbws server
#[derive(Parser)]
#[command(name = "fbws", version, about = "Call fbws operations and watch indications")]
struct Cli {
    /// Server URL (ws:// or wss://)
    #[arg(short, long, global = true)]
    url: Option<String>,

    /// Authentication token
    #[arg(short, long, global = true, env = "FBWS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one request and print the reply
    Call {
        /// Subsystem (net, dev, gad, sys, ...)
        subsys: String,
        /// Command name
        cmd: String,
        /// Arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
    },

    /// Print indications until the connection closes
    Watch {
        /// Only print indications of this type
        #[arg(long = "type")]
        ind_type: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("fbws=debug,fbws_cli=debug,fbws_client=debug,fbws_core=debug")
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("fbws=warn,fbws_cli=warn,fbws_client=warn")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.clone().unwrap_or_else(|| {
        let home = dirs::home_dir().unwrap_or_default();
        home.join(".fbws").join("config.toml").to_string_lossy().to_string()
    });
    let cfg = match Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("fbws: {e:#}");
            std::process::exit(1);
        }
    };
    let settings = Settings::resolve(&cfg, cli.url, cli.token, cli.timeout);

    let result = match cli.command {
        Command::Call { subsys, cmd, args } => {
            commands::call::run(&settings, &subsys, &cmd, args.as_deref()).await
        }
        Command::Watch { ind_type } => commands::watch::run(&settings, ind_type.as_deref()).await,
    };

    if let Err(e) = result {
        eprintln!("fbws: {e:#}");
        std::process::exit(1);
    }
}
