//! CLI module for the entry node.
//!
//! All settings are env-sourced with CLI overrides; a `.env` file is loaded
//! by the binary before parsing.

use std::io;
use std::net::IpAddr;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wsbridge_core::defaults;

use crate::config::EntryConfig;
use crate::{run_with_shutdown, CancellationToken};

/// Entry node CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "wsbridge-entry",
    version,
    about = "wsbridge entry node: local TCP listener tunneling to a WebSocket exit"
)]
pub struct EntryArgs {
    /// TCP listen host for tunnel clients.
    #[arg(long, env = "LISTEN_HOST", default_value = defaults::DEFAULT_LISTEN_HOST)]
    pub listen_host: IpAddr,

    /// TCP listen port for tunnel clients.
    #[arg(long, env = "LISTEN_PORT", default_value_t = defaults::DEFAULT_LISTEN_PORT)]
    pub listen_port: u16,

    /// WebSocket URL of the exit node.
    #[arg(long, env = "WS_URL", default_value = "wss://hyp.example.com/tunnel")]
    pub ws_url: String,

    /// Shared-secret token presented in the X-Auth-Token header.
    #[arg(long, env = "AUTH_TOKEN", default_value = "zzyss666", hide_env_values = true)]
    pub auth_token: String,

    /// Keepalive ping interval in seconds.
    #[arg(long, env = "PING_INTERVAL", default_value_t = defaults::DEFAULT_PING_INTERVAL_SECS)]
    pub ping_interval: u64,

    /// Grace period in seconds after a ping before the peer is considered gone.
    #[arg(long, env = "PING_TIMEOUT", default_value_t = defaults::DEFAULT_PING_TIMEOUT_SECS)]
    pub ping_timeout: u64,

    /// WebSocket connect timeout in seconds.
    #[arg(long, env = "CONNECT_TIMEOUT", default_value_t = defaults::DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout: u64,

    /// Relay chunk cap in bytes.
    #[arg(long, env = "CHUNK", default_value_t = defaults::DEFAULT_CHUNK_SIZE)]
    pub chunk: usize,

    /// Hostname pinned to a fixed address for this process's own lookups.
    #[arg(long, env = "FORCE_HOST", default_value = "hyp.example.com")]
    pub force_host: String,

    /// Fixed address answered for the pinned hostname.
    #[arg(long, env = "FORCE_IP", default_value = "104.18.34.2")]
    pub force_ip: IpAddr,
}

/// Run the entry node with the given arguments.
pub async fn run(args: EntryArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = EntryConfig::from_args(&args)?;

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal_handler().await;
        tracing::info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    run_with_shutdown(config, shutdown).await?;
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}
