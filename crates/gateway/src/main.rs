//! sshgate
//!
//! Browser-facing gateway to remote SSH shells.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gateway::config::{parse_origins, Config};
use gateway::{Gateway, SshConnector};
use tracing_subscriber::EnvFilter;

/// sshgate - relay browser terminals to remote SSH shells.
#[derive(Parser, Debug)]
#[command(name = "sshgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Listen address
    #[arg(long)]
    pub address: Option<String>,

    /// Listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// SSH connect timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum number of pending sessions
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Output chunk size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Comma-separated list of allowed CORS origins
    #[arg(long)]
    pub origins: Option<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Applies command-line overrides on top of file and environment values.
    fn apply_to(&self, config: &mut Config) {
        if let Some(address) = &self.address {
            config.server.address = address.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(timeout) = self.timeout {
            config.ssh.timeout_secs = timeout;
        }
        if let Some(max) = self.max_sessions {
            config.ssh.max_sessions = max;
        }
        if let Some(buffer) = self.buffer_size {
            config.ssh.buffer_size = buffer;
        }
        if let Some(origins) = &self.origins {
            config.server.allowed_origins = parse_origins(origins);
        }
        if self.verbose {
            config.daemon.debug = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Apply environment variable overrides, then flags
    let env_overrides = config.apply_env_overrides();
    cli.apply_to(&mut config);

    // Validate configuration
    config.validate()?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.effective_log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("sshgate {} starting...", env!("CARGO_PKG_VERSION"));
    for env_override in &env_overrides {
        env_override.log();
    }
    if let Some(path) = &cli.config {
        tracing::info!("Using config file: {:?}", path);
    }

    let listen_addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;

    let gateway = Arc::new(Gateway::start(config.settings(), Arc::new(SshConnector::new())));

    let signals = Arc::clone(&gateway);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signals.shutdown().await;
    });

    gateway.serve(listener).await.context("HTTP server failed")?;
    gateway.shutdown().await;

    tracing::info!("sshgate stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl-C"),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to register SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl-C");
    }
}
