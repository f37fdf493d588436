//! Exit accept loop.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wsbridge_core::{ConnectionGuard, ConnectionTracker};

use crate::config::ExitConfig;
use crate::error::ExitError;
use crate::handler::handle_conn;

/// Run the exit node until the shutdown token fires, then drain.
pub async fn run_with_shutdown(
    config: ExitConfig,
    shutdown: CancellationToken,
) -> Result<(), ExitError> {
    let config = Arc::new(config);

    let listener = TcpListener::bind(config.listen).await?;
    info!(address = %config.listen, target = %config.target(), "exit listening");

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

                let config = config.clone();
                let guard = ConnectionGuard::new(tracker.clone());
                tokio::spawn(async move {
                    let _guard = guard;
                    handle_conn(tcp, peer, config).await;
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
    info!("exit stopped");
    Ok(())
}
