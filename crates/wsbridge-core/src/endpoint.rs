//! Transport endpoint halves.
//!
//! A session leg is either a raw TCP stream or a WebSocket channel. Each leg
//! is split into a receive half (`ChunkSource`) and a send half (`ChunkSink`)
//! so that the two pumps of a session can own opposite halves of both legs.
//!
//! The receive side is modeled as a tagged variant rather than a byte stream:
//! the pump matches on it explicitly and treats anything that is not binary
//! payload as a protocol violation.

use std::borrow::Cow;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

/// Tunnel frames are opaque chunks: unbounded message size, no compression.
pub fn tunnel_ws_config() -> WebSocketConfig {
    let mut cfg = WebSocketConfig::default();
    cfg.max_message_size = None;
    cfg.max_frame_size = None;
    cfg
}

/// One received unit from a transport endpoint.
#[derive(Debug)]
pub enum Chunk {
    /// Opaque payload bytes.
    Binary(Bytes),
    /// A text frame — never valid on the tunnel, reported for diagnostics.
    Text(String),
    /// End of stream: TCP EOF, WebSocket close frame, or channel end.
    Eof,
}

/// Receive half of a transport endpoint.
#[async_trait]
pub trait ChunkSource: Send {
    /// Receive the next chunk, or `Chunk::Eof` when the peer is done.
    async fn recv(&mut self) -> io::Result<Chunk>;
}

/// Send half of a transport endpoint.
#[async_trait]
pub trait ChunkSink: Send {
    /// Send one chunk and wait until the transport has accepted it.
    async fn send(&mut self, data: Bytes) -> io::Result<()>;

    /// Close the endpoint. `code`/`reason` apply to WebSocket legs only.
    async fn close(&mut self, code: u16, reason: &str) -> io::Result<()>;

    /// Send a transport-level keepalive probe. No-op for TCP.
    async fn ping(&mut self) -> io::Result<()>;
}

// ============================================================================
// TCP halves
// ============================================================================

/// Receive half of a raw TCP leg. Reads at most `chunk_size` bytes per recv.
pub struct TcpSource {
    half: OwnedReadHalf,
    buf: Vec<u8>,
}

impl TcpSource {
    pub fn new(half: OwnedReadHalf, chunk_size: usize) -> Self {
        Self {
            half,
            buf: vec![0u8; chunk_size],
        }
    }
}

#[async_trait]
impl ChunkSource for TcpSource {
    async fn recv(&mut self) -> io::Result<Chunk> {
        let n = self.half.read(&mut self.buf).await?;
        if n == 0 {
            Ok(Chunk::Eof)
        } else {
            Ok(Chunk::Binary(Bytes::copy_from_slice(&self.buf[..n])))
        }
    }
}

/// Send half of a raw TCP leg.
pub struct TcpSink {
    half: OwnedWriteHalf,
}

impl TcpSink {
    pub fn new(half: OwnedWriteHalf) -> Self {
        Self { half }
    }
}

#[async_trait]
impl ChunkSink for TcpSink {
    async fn send(&mut self, data: Bytes) -> io::Result<()> {
        self.half.write_all(&data).await?;
        self.half.flush().await
    }

    async fn close(&mut self, _code: u16, _reason: &str) -> io::Result<()> {
        self.half.shutdown().await
    }

    async fn ping(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// WebSocket halves
// ============================================================================

/// Receive half of a WebSocket leg.
///
/// Ping/pong frames are skipped (tungstenite answers pings internally); a
/// close frame or stream end maps to `Chunk::Eof`. When a receive deadline is
/// set, silence past it is reported as a timed-out transport failure — this
/// is how the keepalive ping timeout surfaces.
pub struct WsSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
    recv_deadline: Option<Duration>,
}

impl<S> WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: SplitStream<WebSocketStream<S>>) -> Self {
        Self {
            stream,
            recv_deadline: None,
        }
    }

    /// Fail the next receive if no frame at all arrives within `deadline`.
    pub fn with_recv_deadline(mut self, deadline: Duration) -> Self {
        self.recv_deadline = Some(deadline);
        self
    }

    async fn next_message(&mut self) -> Option<Result<Message, WsError>> {
        match self.recv_deadline {
            Some(deadline) => match tokio::time::timeout(deadline, self.stream.next()).await {
                Ok(next) => next,
                Err(_) => Some(Err(WsError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "websocket receive deadline exceeded",
                )))),
            },
            None => self.stream.next().await,
        }
    }
}

#[async_trait]
impl<S> ChunkSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> io::Result<Chunk> {
        loop {
            match self.next_message().await {
                Some(Ok(Message::Binary(data))) => return Ok(Chunk::Binary(Bytes::from(data))),
                Some(Ok(Message::Text(text))) => return Ok(Chunk::Text(text)),
                Some(Ok(Message::Close(_))) | None => return Ok(Chunk::Eof),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    return Ok(Chunk::Eof);
                }
                Some(Err(err)) => return Err(ws_err(err)),
            }
        }
    }
}

/// Send half of a WebSocket leg. Payload goes out as binary frames.
pub struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(sink: SplitSink<WebSocketStream<S>, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl<S> ChunkSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, data: Bytes) -> io::Result<()> {
        self.sink
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(ws_err)
    }

    async fn close(&mut self, code: u16, reason: &str) -> io::Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        match self.sink.send(Message::Close(Some(frame))).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(err) => Err(ws_err(err)),
        }
    }

    async fn ping(&mut self) -> io::Result<()> {
        self.sink.send(Message::Ping(Vec::new())).await.map_err(ws_err)
    }
}

fn ws_err(err: WsError) -> io::Error {
    match err {
        WsError::Io(io) => io,
        other => io::Error::other(other),
    }
}
