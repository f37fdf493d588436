//! Unidirectional relay pump.
//!
//! One pump forwards chunks from a source half to a sink half. Two pumps run
//! per session, one per direction. The pump keeps exactly one chunk in
//! flight: a send must be accepted before the next receive, so a slow sink
//! stalls the reads and bounds memory to one chunk.
//!
//! All failures are contained here. The pump never returns an error — it
//! best-effort closes its sink and reports how it ended, which keeps the
//! sibling pump's cancellation path deterministic.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::defaults::{CLOSE_INTERNAL_ERROR, CLOSE_NORMAL};
use crate::endpoint::{Chunk, ChunkSink, ChunkSource};

/// Shared teardown signal for the two pumps of a session.
///
/// Carries the close code the surviving pump should put on the wire, so a
/// failure in one direction is not reported to the peer as a normal close.
#[derive(Clone)]
pub struct Teardown {
    token: CancellationToken,
    code: Arc<AtomicU16>,
}

impl Teardown {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            code: Arc::new(AtomicU16::new(CLOSE_NORMAL)),
        }
    }

    /// Cancel both pumps; the survivor closes its sink with `code`.
    pub fn trigger(&self, code: u16) {
        self.code.store(code, Ordering::SeqCst);
        self.token.cancel();
    }

    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    fn close_args(&self) -> (u16, &'static str) {
        match self.code.load(Ordering::SeqCst) {
            CLOSE_INTERNAL_ERROR => (CLOSE_INTERNAL_ERROR, "session failed"),
            _ => (CLOSE_NORMAL, "session finished"),
        }
    }
}

impl Default for Teardown {
    fn default() -> Self {
        Self::new()
    }
}

/// How a pump finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// The source reached end-of-stream; the sink was closed gracefully.
    SourceEof,
    /// Cancelled by the session after the sibling pump finished.
    Cancelled,
    /// A receive or send failed mid-relay.
    TransportFailure,
    /// A non-binary frame arrived where only opaque payload is allowed.
    ProtocolViolation,
}

/// Run one relay direction until EOF, failure, or cancellation.
///
/// `keepalive` makes the pump emit a transport ping on that interval while
/// it waits for the next chunk; pass it on the pump whose sink is the
/// WebSocket leg. Cancellation is cooperative: it is observed at the next
/// suspension point and the sink is still closed before the pump returns.
pub async fn pump<S, K>(
    mut source: S,
    mut sink: K,
    teardown: Teardown,
    label: &'static str,
    keepalive: Option<Duration>,
) -> PumpEnd
where
    S: ChunkSource,
    K: ChunkSink,
{
    let mut ticker = keepalive.map(|period| interval_at(Instant::now() + period, period));

    loop {
        let chunk = tokio::select! {
            biased;

            _ = teardown.triggered() => {
                let (code, reason) = teardown.close_args();
                let _ = sink.close(code, reason).await;
                debug!(pump = label, "cancelled");
                return PumpEnd::Cancelled;
            }

            _ = tick(&mut ticker) => {
                if let Err(err) = sink.ping().await {
                    debug!(pump = label, error = %err, "keepalive ping failed");
                    let _ = sink.close(CLOSE_INTERNAL_ERROR, "transport failure").await;
                    return PumpEnd::TransportFailure;
                }
                continue;
            }

            received = source.recv() => received,
        };

        match chunk {
            Ok(Chunk::Binary(data)) => {
                let sent = tokio::select! {
                    biased;

                    _ = teardown.triggered() => {
                        let (code, reason) = teardown.close_args();
                        let _ = sink.close(code, reason).await;
                        debug!(pump = label, "cancelled");
                        return PumpEnd::Cancelled;
                    }

                    sent = sink.send(data) => sent,
                };
                if let Err(err) = sent {
                    debug!(pump = label, error = %err, "send failed");
                    let _ = sink.close(CLOSE_INTERNAL_ERROR, "transport failure").await;
                    return PumpEnd::TransportFailure;
                }
            }
            Ok(Chunk::Text(_)) => {
                warn!(pump = label, "received non-binary frame; closing");
                let _ = sink.close(CLOSE_INTERNAL_ERROR, "binary frames only").await;
                return PumpEnd::ProtocolViolation;
            }
            Ok(Chunk::Eof) => {
                let _ = sink.close(CLOSE_NORMAL, "eof").await;
                debug!(pump = label, "source eof");
                return PumpEnd::SourceEof;
            }
            Err(err) => {
                debug!(pump = label, error = %err, "receive failed");
                let _ = sink.close(CLOSE_INTERNAL_ERROR, "transport failure").await;
                return PumpEnd::TransportFailure;
            }
        }
    }
}

/// Wait for the next keepalive tick; pends forever when keepalive is off.
async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use async_trait::async_trait;
    use bytes::Bytes;

    /// Source that yields a scripted sequence of chunks.
    struct ScriptedSource {
        script: Vec<io::Result<Chunk>>,
    }

    impl ScriptedSource {
        fn new(mut script: Vec<io::Result<Chunk>>) -> Self {
            script.reverse();
            Self { script }
        }
    }

    #[async_trait]
    impl ChunkSource for ScriptedSource {
        async fn recv(&mut self) -> io::Result<Chunk> {
            match self.script.pop() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }
    }

    /// Sink that records everything it is handed.
    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<std::sync::Mutex<Vec<Bytes>>>,
        closes: Arc<std::sync::Mutex<Vec<(u16, String)>>>,
        pings: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChunkSink for RecordingSink {
        async fn send(&mut self, data: Bytes) -> io::Result<()> {
            self.sent.lock().unwrap().push(data);
            Ok(())
        }

        async fn close(&mut self, code: u16, reason: &str) -> io::Result<()> {
            self.closes
                .lock()
                .unwrap()
                .push((code, reason.to_string()));
            Ok(())
        }

        async fn ping(&mut self) -> io::Result<()> {
            self.pings.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    #[tokio::test]
    async fn pump_forwards_in_order_and_closes_on_eof() {
        let source = ScriptedSource::new(vec![
            Ok(Chunk::Binary(Bytes::from_static(b"one"))),
            Ok(Chunk::Binary(Bytes::from_static(b"two"))),
            Ok(Chunk::Eof),
        ]);
        let sink = RecordingSink::default();

        let end = pump(source, sink.clone(), Teardown::new(), "test", None).await;

        assert_eq!(end, PumpEnd::SourceEof);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.as_slice(), &[Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        let closes = sink.closes.lock().unwrap();
        assert_eq!(closes.as_slice(), &[(CLOSE_NORMAL, "eof".to_string())]);
    }

    #[tokio::test]
    async fn pump_treats_text_as_protocol_violation() {
        let source = ScriptedSource::new(vec![Ok(Chunk::Text("nope".to_string()))]);
        let sink = RecordingSink::default();

        let end = pump(source, sink.clone(), Teardown::new(), "test", None).await;

        assert_eq!(end, PumpEnd::ProtocolViolation);
        assert!(sink.sent.lock().unwrap().is_empty());
        assert_eq!(sink.closes.lock().unwrap()[0].0, CLOSE_INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn pump_contains_receive_errors() {
        let source = ScriptedSource::new(vec![Err(io::Error::other("boom"))]);
        let sink = RecordingSink::default();

        let end = pump(source, sink.clone(), Teardown::new(), "test", None).await;

        assert_eq!(end, PumpEnd::TransportFailure);
        assert_eq!(sink.closes.lock().unwrap()[0].0, CLOSE_INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn pump_cancellation_still_closes_sink() {
        // Empty script: the source pends forever, so the pump sits at its
        // suspension point until cancelled.
        let source = ScriptedSource::new(vec![]);
        let sink = RecordingSink::default();
        let teardown = Teardown::new();

        let handle = tokio::spawn(pump(source, sink.clone(), teardown.clone(), "test", None));
        tokio::time::sleep(Duration::from_millis(20)).await;
        teardown.trigger(CLOSE_NORMAL);

        let end = handle.await.unwrap();
        assert_eq!(end, PumpEnd::Cancelled);
        let closes = sink.closes.lock().unwrap();
        assert_eq!(closes.as_slice(), &[(CLOSE_NORMAL, "session finished".to_string())]);
    }

    #[tokio::test]
    async fn pump_cancellation_carries_the_failure_close_code() {
        let source = ScriptedSource::new(vec![]);
        let sink = RecordingSink::default();
        let teardown = Teardown::new();

        let handle = tokio::spawn(pump(source, sink.clone(), teardown.clone(), "test", None));
        tokio::time::sleep(Duration::from_millis(20)).await;
        teardown.trigger(CLOSE_INTERNAL_ERROR);

        let end = handle.await.unwrap();
        assert_eq!(end, PumpEnd::Cancelled);
        assert_eq!(sink.closes.lock().unwrap()[0].0, CLOSE_INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn pump_sends_keepalive_pings_while_idle() {
        let source = ScriptedSource::new(vec![]);
        let sink = RecordingSink::default();
        let teardown = Teardown::new();

        let handle = tokio::spawn(pump(
            source,
            sink.clone(),
            teardown.clone(),
            "test",
            Some(Duration::from_millis(10)),
        ));
        tokio::time::sleep(Duration::from_millis(60)).await;
        teardown.trigger(CLOSE_NORMAL);
        handle.await.unwrap();

        assert!(sink.pings.load(Ordering::Relaxed) >= 2);
    }
}
