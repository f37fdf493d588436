//! Default configuration values.
//!
//! Centralized default constants for use across both node crates.

// ============================================================================
// Listener Defaults
// ============================================================================

/// Default entry TCP listen host.
pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";
/// Default entry TCP listen port.
pub const DEFAULT_LISTEN_PORT: u16 = 25565;
/// Default exit WebSocket listen host.
pub const DEFAULT_WS_LISTEN_HOST: &str = "0.0.0.0";
/// Default exit WebSocket listen port.
pub const DEFAULT_WS_LISTEN_PORT: u16 = 8765;

// ============================================================================
// Timeout Defaults
// ============================================================================

/// Default WebSocket keepalive ping interval in seconds.
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 60;
/// Default grace period after a ping before the peer is considered gone.
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 20;
/// Default second-leg connect timeout in seconds (both nodes).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Relay Defaults
// ============================================================================

/// Default relay chunk cap in bytes (one chunk in flight per pump).
pub const DEFAULT_CHUNK_SIZE: usize = 16384;

// ============================================================================
// Close Codes
// ============================================================================

/// Normal closure: the source side reached end-of-stream.
pub const CLOSE_NORMAL: u16 = 1000;
/// Internal error: target unreachable or mid-relay transport failure.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// Authentication failure on the exit handshake.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

// ============================================================================
// Handshake Headers
// ============================================================================

/// Shared-secret header checked by the exit node.
pub const AUTH_HEADER: &str = "x-auth-token";
/// User-Agent presented by the entry node's WebSocket client.
pub const ENTRY_USER_AGENT: &str = "Mozilla/5.0 MEOW/1.3";
