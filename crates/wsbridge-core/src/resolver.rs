//! Hostname resolution with a single pinned override.
//!
//! The entry node may need to reach its upstream through an address that
//! differs from what public DNS answers (hijacked or blocked records). The
//! resolver is an explicit, injectable strategy rather than a global patch:
//! exactly one hostname can be pinned to a fixed address, and every other
//! lookup passes through to the system resolver unchanged.

use std::io;
use std::net::{IpAddr, SocketAddr};

use tokio::net::lookup_host;
use tracing::{debug, info};

/// Resolver with at most one `{hostname -> fixed address}` override.
///
/// Build once before the listener starts and share read-only.
#[derive(Debug, Clone)]
pub struct PinnedResolver {
    pin: Option<(String, IpAddr)>,
}

impl PinnedResolver {
    /// Resolver with no override: every lookup goes to the system resolver.
    pub fn system() -> Self {
        Self { pin: None }
    }

    /// Resolver that answers `host` with `addr` and passes everything else
    /// through.
    pub fn with_pin(host: impl Into<String>, addr: IpAddr) -> Self {
        let host = host.into();
        info!(host = %host, addr = %addr, "dns pin installed (process-only)");
        Self {
            pin: Some((host, addr)),
        }
    }

    /// Resolve `host:port` to a socket address.
    ///
    /// Only an exact hostname match hits the pin. IP literals and all other
    /// hostnames resolve exactly as the system resolver would.
    pub async fn resolve(&self, host: &str, port: u16) -> io::Result<SocketAddr> {
        if let Some((pinned, addr)) = &self.pin {
            if host == pinned {
                let sa = SocketAddr::new(*addr, port);
                debug!(host = %host, resolved = %sa, "pinned resolve");
                return Ok(sa);
            }
        }

        // Fast path: host is already an IP literal.
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }

        let mut addrs = lookup_host((host, port)).await?;
        addrs.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for {host}:{port}"),
            )
        })
    }
}
