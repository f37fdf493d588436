//! CLI module for the exit node.

use std::io;
use std::net::IpAddr;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wsbridge_core::defaults;

use crate::config::ExitConfig;
use crate::{run_with_shutdown, CancellationToken};

/// Exit node CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "wsbridge-exit",
    version,
    about = "wsbridge exit node: WebSocket listener relaying to the backend TCP target"
)]
pub struct ExitArgs {
    /// WebSocket listen host.
    #[arg(long, env = "WS_LISTEN_HOST", default_value = defaults::DEFAULT_WS_LISTEN_HOST)]
    pub ws_listen_host: IpAddr,

    /// WebSocket listen port.
    #[arg(long, env = "WS_LISTEN_PORT", default_value_t = defaults::DEFAULT_WS_LISTEN_PORT)]
    pub ws_listen_port: u16,

    /// Backend target host.
    #[arg(long, env = "MC_TARGET_HOST", default_value = "127.0.0.1")]
    pub target_host: String,

    /// Backend target port.
    #[arg(long, env = "MC_TARGET_PORT", default_value_t = 25565)]
    pub target_port: u16,

    /// Shared-secret token required in the X-Auth-Token handshake header.
    #[arg(long, env = "AUTH_TOKEN", default_value = "zzyss666", hide_env_values = true)]
    pub auth_token: String,

    /// Keepalive ping interval in seconds.
    #[arg(long, env = "PING_INTERVAL", default_value_t = defaults::DEFAULT_PING_INTERVAL_SECS)]
    pub ping_interval: u64,

    /// Grace period in seconds after a ping before the peer is considered gone.
    #[arg(long, env = "PING_TIMEOUT", default_value_t = defaults::DEFAULT_PING_TIMEOUT_SECS)]
    pub ping_timeout: u64,

    /// Target TCP connect timeout in seconds.
    #[arg(long, env = "TCP_CONNECT_TIMEOUT", default_value_t = defaults::DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub tcp_connect_timeout: u64,

    /// Relay chunk cap in bytes.
    #[arg(long, env = "CHUNK", default_value_t = defaults::DEFAULT_CHUNK_SIZE)]
    pub chunk: usize,
}

/// Run the exit node with the given arguments.
pub async fn run(args: ExitArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = ExitConfig::from_args(&args)?;

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
