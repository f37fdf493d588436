//! Session lifecycle: state machine and paired-pump execution.
//!
//! A session is one end-to-end tunneled connection. Its two pumps are always
//! started together and torn down together: the session waits for whichever
//! pump settles first, cancels the other, and blocks until the loser has run
//! its cancellation cleanup. No pump outlives its session.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::defaults::{CLOSE_INTERNAL_ERROR, CLOSE_NORMAL};
use crate::endpoint::{ChunkSink, ChunkSource};
use crate::pump::{pump, PumpEnd, Teardown};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// First leg accepted.
    Init,
    /// Establishing the second leg.
    Connecting,
    /// Both legs up, pumps running.
    Relaying,
    /// Second leg failed or a pump hit a failure.
    Failed,
    /// Best-effort close of both endpoints.
    Closing,
    /// Terminal: resources released.
    Closed,
}

impl SessionState {
    /// Whether `next` is a legal transition from this state.
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Init, Connecting)
                | (Init, Closing)
                | (Connecting, Relaying)
                | (Connecting, Failed)
                | (Relaying, Failed)
                | (Relaying, Closing)
                | (Failed, Closing)
                | (Closing, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::Connecting => "connecting",
            SessionState::Relaying => "relaying",
            SessionState::Failed => "failed",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Per-connection session record. Logs every transition with the peer that
/// opened the first leg; nothing persists outside this value.
pub struct Session {
    peer: SocketAddr,
    state: SessionState,
}

impl Session {
    /// Start tracking a freshly accepted connection.
    pub fn accepted(peer: SocketAddr) -> Self {
        debug!(peer = %peer, state = %SessionState::Init, "session accepted");
        Self {
            peer,
            state: SessionState::Init,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`, logging the transition. Illegal transitions are a
    /// programming error and are logged loudly but not fatal.
    pub fn advance(&mut self, next: SessionState) {
        if !self.state.can_transition(next) {
            warn!(peer = %self.peer, from = %self.state, to = %next, "illegal session transition");
        }
        debug!(peer = %self.peer, from = %self.state, to = %next, "session transition");
        self.state = next;
    }

    /// Terminal log line with the original peer identity.
    pub fn finish(mut self) {
        if self.state != SessionState::Closing {
            self.advance(SessionState::Closing);
        }
        self.advance(SessionState::Closed);
        info!(peer = %self.peer, "session closed");
    }
}

/// One direction of a session, ready to be pumped.
pub struct PumpSpec<S, K> {
    pub source: S,
    pub sink: K,
    /// Direction label for logs, e.g. `"tcp_to_ws"`.
    pub label: &'static str,
    /// Keepalive ping interval; set on the direction whose sink is the
    /// WebSocket leg, `None` elsewhere.
    pub keepalive: Option<Duration>,
}

/// Run both pumps of a session and tear them down together.
///
/// Spawns the two pumps under a fresh teardown signal, waits for the first
/// to settle, cancels the other with a close code matching how the first
/// ended, and awaits its cleanup before returning. Returns how the winning
/// pump ended.
pub async fn run_pumps<S1, K1, S2, K2>(
    peer: SocketAddr,
    a: PumpSpec<S1, K1>,
    b: PumpSpec<S2, K2>,
) -> PumpEnd
where
    S1: ChunkSource + 'static,
    K1: ChunkSink + 'static,
    S2: ChunkSource + 'static,
    K2: ChunkSink + 'static,
{
    let teardown = Teardown::new();
    let mut pump_a = tokio::spawn(pump(a.source, a.sink, teardown.clone(), a.label, a.keepalive));
    let mut pump_b = tokio::spawn(pump(b.source, b.sink, teardown.clone(), b.label, b.keepalive));

    let (first, first_label, loser) = tokio::select! {
        end = &mut pump_a => (end, a.label, &mut pump_b),
        end = &mut pump_b => (end, b.label, &mut pump_a),
    };

    let end = match first {
        Ok(end) => {
            debug!(peer = %peer, pump = first_label, end = ?end, "first pump settled");
            end
        }
        Err(err) => {
            warn!(peer = %peer, pump = first_label, error = %err, "pump task panicked");
            PumpEnd::TransportFailure
        }
    };

    let code = match end {
        PumpEnd::SourceEof | PumpEnd::Cancelled => CLOSE_NORMAL,
        PumpEnd::TransportFailure | PumpEnd::ProtocolViolation => CLOSE_INTERNAL_ERROR,
    };
    teardown.trigger(code);
    let _ = loser.await;

    end
}
