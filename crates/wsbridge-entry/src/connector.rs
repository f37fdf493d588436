//! Outbound WebSocket connection establishment to the exit node.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::{client_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use wsbridge_core::defaults::{AUTH_HEADER, ENTRY_USER_AGENT};
use wsbridge_core::endpoint::tunnel_ws_config;
use wsbridge_core::PinnedResolver;

use crate::config::EntryConfig;
use crate::error::EntryError;

/// Tunnel transport stream on the entry side.
pub type EntryWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Shared connector state for opening the second leg of a session.
pub struct WsConnector {
    url: String,
    auth_token: String,
    connect_timeout: Duration,
    resolver: PinnedResolver,
}

impl WsConnector {
    pub fn new(config: &EntryConfig) -> Self {
        let resolver = match &config.pin {
            Some((host, addr)) => PinnedResolver::with_pin(host.clone(), *addr),
            None => PinnedResolver::system(),
        };
        Self {
            url: config.ws_url.clone(),
            auth_token: config.auth_token.clone(),
            connect_timeout: config.connect_timeout,
            resolver,
        }
    }

    /// Establish a WebSocket connection to the exit node.
    ///
    /// The TCP address comes from the pinned resolver; for `wss://` the TLS
    /// server name is still the URL hostname, so certificate validation is
    /// unaffected by the pin.
    pub async fn connect(&self) -> Result<EntryWs, EntryError> {
        let mut request = self.url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(header::USER_AGENT, HeaderValue::from_static(ENTRY_USER_AGENT));
        if !self.auth_token.is_empty() {
            let value = HeaderValue::from_str(&self.auth_token)
                .map_err(|_| EntryError::Config("AUTH_TOKEN is not a valid header value".into()))?;
            request.headers_mut().insert(AUTH_HEADER, value);
        }

        let uri = request.uri().clone();
        let host = uri
            .host()
            .ok_or_else(|| EntryError::Config(format!("WS_URL has no host: {}", self.url)))?;
        let port = uri.port_u16().unwrap_or(match uri.scheme_str() {
            Some("wss") => 443,
            _ => 80,
        });

        let connect = async {
            let addr = self.resolver.resolve(host, port).await?;
            debug!(url = %self.url, addr = %addr, "connecting to exit");
            let tcp = TcpStream::connect(addr).await?;
            tcp.set_nodelay(true)?;
            let (ws, _response) =
                client_async_tls_with_config(request, tcp, Some(tunnel_ws_config()), None).await?;
            Ok::<_, EntryError>(ws)
        };

        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(result) => result,
            Err(_) => Err(EntryError::ConnectTimeout),
        }
    }
}
