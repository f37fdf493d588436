//! Entry node configuration.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::cli::EntryArgs;
use crate::error::EntryError;

/// Resolved entry node settings.
#[derive(Debug, Clone)]
pub struct EntryConfig {
    /// TCP listen address for tunnel clients.
    pub listen: SocketAddr,
    /// WebSocket URL of the exit node.
    pub ws_url: String,
    /// Shared-secret token for the exit handshake; empty disables the header.
    pub auth_token: String,
    /// Keepalive ping interval on the WebSocket leg.
    pub ping_interval: Duration,
    /// Grace period after a ping before the peer is considered gone.
    pub ping_timeout: Duration,
    /// WebSocket connect timeout.
    pub connect_timeout: Duration,
    /// Relay chunk cap in bytes.
    pub chunk_size: usize,
    /// Optional `{hostname -> fixed address}` pin for outbound lookups.
    pub pin: Option<(String, IpAddr)>,
}

impl EntryConfig {
    pub fn from_args(args: &EntryArgs) -> Result<Self, EntryError> {
        if args.chunk == 0 {
            return Err(EntryError::Config("CHUNK must be positive".into()));
        }
        if !args.ws_url.starts_with("ws://") && !args.ws_url.starts_with("wss://") {
            return Err(EntryError::Config(format!(
                "WS_URL must be a ws:// or wss:// url, got {}",
                args.ws_url
            )));
        }
        Ok(Self {
            listen: SocketAddr::new(args.listen_host, args.listen_port),
            ws_url: args.ws_url.clone(),
            auth_token: args.auth_token.clone(),
            ping_interval: Duration::from_secs(args.ping_interval),
            ping_timeout: Duration::from_secs(args.ping_timeout),
            connect_timeout: Duration::from_secs(args.connect_timeout),
            chunk_size: args.chunk,
            pin: Some((args.force_host.clone(), args.force_ip)),
        })
    }
}
