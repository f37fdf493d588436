//! Entry accept loop and per-session handling.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wsbridge_core::session::{run_pumps, PumpSpec, Session, SessionState};
use wsbridge_core::{
    ConnectionGuard, ConnectionTracker, PumpEnd, TcpSink, TcpSource, WsSink, WsSource,
};

use crate::config::EntryConfig;
use crate::connector::WsConnector;
use crate::error::EntryError;

/// Run the entry node until the shutdown token fires, then drain.
pub async fn run_with_shutdown(
    config: EntryConfig,
    shutdown: CancellationToken,
) -> Result<(), EntryError> {
    let connector = Arc::new(WsConnector::new(&config));
    let config = Arc::new(config);

    let listener = TcpListener::bind(config.listen).await?;
    info!(address = %config.listen, upstream = %config.ws_url, "entry listening");

    let tracker = ConnectionTracker::new();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }

            result = listener.accept() => {
                let (tcp, peer) = match result {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                };

                let connector = connector.clone();
                let config = config.clone();
                let guard = ConnectionGuard::new(tracker.clone());
                tokio::spawn(async move {
                    let _guard = guard;
                    handle_client(tcp, peer, connector, config).await;
                });
            }
        }
    }

    // Release the listening socket; in-flight sessions drain on their own.
    drop(listener);
    let active = tracker.count();
    if active > 0 {
        info!(active, "waiting for in-flight sessions to drain");
    }
    tracker.drained().await;
    info!("entry stopped");
    Ok(())
}

/// Handle one accepted client connection end to end.
///
/// All failures are contained here; nothing escapes to the accept loop.
async fn handle_client(
    tcp: TcpStream,
    peer: SocketAddr,
    connector: Arc<WsConnector>,
    config: Arc<EntryConfig>,
) {
    let mut session = Session::accepted(peer);
    info!(peer = %peer, "client connected");

    if let Err(err) = tcp.set_nodelay(true) {
        debug!(peer = %peer, error = %err, "failed to set nodelay");
    }

    session.advance(SessionState::Connecting);
    let ws = match connector.connect().await {
        Ok(ws) => ws,
        Err(err) => {
            warn!(peer = %peer, error = %err, "websocket connect failed");
            session.advance(SessionState::Failed);
            // The client leg is the only one open; dropping it closes it.
            drop(tcp);
            session.finish();
            return;
        }
    };
    debug!(peer = %peer, url = %config.ws_url, "websocket connected");

    session.advance(SessionState::Relaying);
    let (ws_sink, ws_stream) = ws.split();
    let (tcp_read, tcp_write) = tcp.into_split();

    let uplink = PumpSpec {
        source: TcpSource::new(tcp_read, config.chunk_size),
        sink: WsSink::new(ws_sink),
        label: "tcp_to_ws",
        keepalive: Some(config.ping_interval),
    };
    let downlink = PumpSpec {
        source: WsSource::new(ws_stream)
            .with_recv_deadline(config.ping_interval + config.ping_timeout),
        sink: TcpSink::new(tcp_write),
        label: "ws_to_tcp",
        keepalive: None,
    };

    let end = run_pumps(peer, uplink, downlink).await;
    if matches!(end, PumpEnd::TransportFailure | PumpEnd::ProtocolViolation) {
        session.advance(SessionState::Failed);
    }
    session.finish();
}
