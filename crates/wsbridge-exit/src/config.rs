//! Exit node configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::cli::ExitArgs;
use crate::error::ExitError;

/// Resolved exit node settings.
#[derive(Debug, Clone)]
pub struct ExitConfig {
    /// WebSocket listen address.
    pub listen: SocketAddr,
    /// Backend target host (hostname or IP).
    pub target_host: String,
    /// Backend target port.
    pub target_port: u16,
    /// Shared-secret token; empty disables the handshake check.
    pub auth_token: String,
    /// Keepalive ping interval on the WebSocket leg.
    pub ping_interval: Duration,
    /// Grace period after a ping before the peer is considered gone.
    pub ping_timeout: Duration,
    /// Target TCP connect timeout.
    pub connect_timeout: Duration,
    /// Relay chunk cap in bytes.
    pub chunk_size: usize,
}

impl ExitConfig {
    pub fn from_args(args: &ExitArgs) -> Result<Self, ExitError> {
        if args.chunk == 0 {
            return Err(ExitError::Config("CHUNK must be positive".into()));
        }
        if args.target_host.is_empty() {
            return Err(ExitError::Config("MC_TARGET_HOST must not be empty".into()));
        }
        Ok(Self {
            listen: SocketAddr::new(args.ws_listen_host, args.ws_listen_port),
            target_host: args.target_host.clone(),
            target_port: args.target_port,
            auth_token: args.auth_token.clone(),
            ping_interval: Duration::from_secs(args.ping_interval),
            ping_timeout: Duration::from_secs(args.ping_timeout),
            connect_timeout: Duration::from_secs(args.tcp_connect_timeout),
            chunk_size: args.chunk,
        })
    }

    /// Target as a displayable `host:port` string.
    pub fn target(&self) -> String {
        format!("{}:{}", self.target_host, self.target_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_match_the_documented_surface() {
        let args = ExitArgs::parse_from(["wsbridge-exit"]);
        let config = ExitConfig::from_args(&args).unwrap();

        assert_eq!(config.listen, "0.0.0.0:8765".parse().unwrap());
        assert_eq!(config.target(), "127.0.0.1:25565");
        assert_eq!(config.ping_interval, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.chunk_size, 16384);
    }

    #[test]
    fn env_overrides_are_wired() {
        let args = ExitArgs::parse_from([
            "wsbridge-exit",
            "--ws-listen-port",
            "9001",
            "--target-host",
            "backend.internal",
            "--target-port",
            "7777",
        ]);
        let config = ExitConfig::from_args(&args).unwrap();
        assert_eq!(config.listen.port(), 9001);
        assert_eq!(config.target(), "backend.internal:7777");
    }
}
