//! Per-connection handling: handshake, auth, target dial, relay.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tracing::{debug, info, warn};
use wsbridge_core::defaults::{AUTH_HEADER, CLOSE_INTERNAL_ERROR, CLOSE_UNAUTHORIZED};
use wsbridge_core::endpoint::tunnel_ws_config;
use wsbridge_core::session::{run_pumps, PumpSpec, Session, SessionState};
use wsbridge_core::{PumpEnd, TcpSink, TcpSource, WsSink, WsSource};

use crate::config::ExitConfig;
use crate::error::ExitError;

/// Handle one accepted WebSocket connection end to end.
///
/// All failures are contained here; nothing escapes to the accept loop.
pub async fn handle_conn(tcp: TcpStream, peer: SocketAddr, config: Arc<ExitConfig>) {
    if let Err(err) = handle_conn_inner(tcp, peer, config).await {
        debug!(peer = %peer, error = %err, "connection error");
    }
}

async fn handle_conn_inner(
    tcp: TcpStream,
    peer: SocketAddr,
    config: Arc<ExitConfig>,
) -> Result<(), ExitError> {
    tcp.set_nodelay(true)?;

    let mut session = Session::accepted(peer);

    // Complete the handshake unconditionally so an unauthorized peer can be
    // told why with a proper close code; capture the headers on the way.
    let mut token: Option<String> = None;
    let mut path = String::new();
    let callback = |req: &Request, resp: Response| {
        token = req
            .headers()
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        path = req.uri().path().to_string();
        Ok(resp)
    };
    let ws = accept_hdr_async_with_config(tcp, callback, Some(tunnel_ws_config())).await?;
    info!(peer = %peer, path = %path, "ws client connected");

    if !config.auth_token.is_empty() && token.as_deref() != Some(config.auth_token.as_str()) {
        warn!(peer = %peer, "auth failed, closing");
        close_ws(ws, CLOSE_UNAUTHORIZED, "unauthorized").await;
        session.finish();
        return Ok(());
    }

    session.advance(SessionState::Connecting);
    let target = (config.target_host.as_str(), config.target_port);
    let tcp = match tokio::time::timeout(config.connect_timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => {
            warn!(peer = %peer, target = %config.target(), error = %err, "target connect failed");
            session.advance(SessionState::Failed);
            close_ws(ws, CLOSE_INTERNAL_ERROR, "target connect failed").await;
            session.finish();
            return Ok(());
        }
        Err(_) => {
            warn!(peer = %peer, target = %config.target(), "target connect timed out");
            session.advance(SessionState::Failed);
            close_ws(ws, CLOSE_INTERNAL_ERROR, "target connect timed out").await;
            session.finish();
            return Ok(());
        }
    };
    tcp.set_nodelay(true)?;
    info!(peer = %peer, target = %config.target(), "connected to target");

    session.advance(SessionState::Relaying);
    let (ws_sink, ws_stream) = ws.split();
    let (tcp_read, tcp_write) = tcp.into_split();

    let downlink = PumpSpec {
        source: WsSource::new(ws_stream)
            .with_recv_deadline(config.ping_interval + config.ping_timeout),
        sink: TcpSink::new(tcp_write),
        label: "ws_to_tcp",
        keepalive: None,
    };
    let uplink = PumpSpec {
        source: TcpSource::new(tcp_read, config.chunk_size),
        sink: WsSink::new(ws_sink),
        label: "tcp_to_ws",
        keepalive: Some(config.ping_interval),
    };

    let end = run_pumps(peer, downlink, uplink).await;
    if matches!(end, PumpEnd::TransportFailure | PumpEnd::ProtocolViolation) {
        session.advance(SessionState::Failed);
    }
    session.finish();
    Ok(())
}

/// Best-effort close with a specific code before any pump exists.
async fn close_ws(mut ws: WebSocketStream<TcpStream>, code: u16, reason: &str) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_string().into(),
    };
    let _ = ws.close(Some(frame)).await;
}
