use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{client_async, WebSocketStream};
use wsbridge_exit::{run_with_shutdown, CancellationToken, ExitConfig};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .try_init();
}

async fn wait_for_tcp(addr: SocketAddr) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                drop(stream);
                break;
            }
            Err(_) => {
                if tokio::time::Instant::now() >= deadline {
                    panic!("timeout waiting for {addr}");
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

async fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

struct TcpEchoServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl TcpEchoServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let shutdown_task = shutdown.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = listener.accept() => {
                        if let Ok((mut stream, _)) = res {
                            tokio::spawn(async move {
                                let mut buf = [0u8; 4096];
                                loop {
                                    match stream.read(&mut buf).await {
                                        Ok(0) => break,
                                        Ok(n) => {
                                            if stream.write_all(&buf[..n]).await.is_err() {
                                                break;
                                            }
                                        }
                                        Err(_) => break,
                                    }
                                }
                            });
                        }
                    }
                    _ = shutdown_task.cancelled() => break,
                }
            }
        });
        Self {
            addr,
            shutdown,
            handle,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}

/// A listener that only records whether anyone ever dialed it.
struct DialProbe {
    addr: SocketAddr,
    dialed: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl DialProbe {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dialed = Arc::new(AtomicBool::new(false));
        let dialed_task = dialed.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                dialed_task.store(true, Ordering::SeqCst);
                drop(stream);
            }
        });
        Self {
            addr,
            dialed,
            handle,
        }
    }

    fn was_dialed(&self) -> bool {
        self.dialed.load(Ordering::SeqCst)
    }

    fn stop(self) {
        self.handle.abort();
    }
}

struct TestExit {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl TestExit {
    async fn start(target: SocketAddr, auth_token: &str) -> Self {
        let addr = free_addr().await;
        let config = ExitConfig {
            listen: addr,
            target_host: target.ip().to_string(),
            target_port: target.port(),
            auth_token: auth_token.to_string(),
            ping_interval: Duration::from_secs(60),
            ping_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(2),
            chunk_size: 16384,
        };
        let shutdown = CancellationToken::new();
        let shutdown_task = shutdown.clone();
        let handle = tokio::spawn(async move {
            let _ = run_with_shutdown(config, shutdown_task).await;
        });
        wait_for_tcp(addr).await;
        Self {
            addr,
            shutdown,
            handle,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}

async fn ws_connect(
    addr: SocketAddr,
    token: Option<&str>,
) -> WebSocketStream<TcpStream> {
    let mut request = format!("ws://{addr}/tunnel").into_client_request().unwrap();
    if let Some(token) = token {
        request
            .headers_mut()
            .insert("x-auth-token", HeaderValue::from_str(token).unwrap());
    }
    let tcp = TcpStream::connect(addr).await.unwrap();
    let (ws, _response) = client_async(request, tcp).await.unwrap();
    ws
}

async fn expect_close_code(ws: &mut WebSocketStream<TcpStream>, code: u16) {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for close frame")
            .expect("stream ended without a close frame")
            .expect("websocket error before close frame");
        match msg {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, CloseCode::from(code));
                return;
            }
            Message::Close(None) => panic!("close frame carried no code"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected close, got {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wrong_token_is_closed_with_4001_before_any_target_dial() {
    init_tracing();

    let probe = DialProbe::start().await;
    let exit = TestExit::start(probe.addr, "right-token").await;

    let mut ws = ws_connect(exit.addr, Some("wrong-token")).await;
    expect_close_code(&mut ws, 4001).await;

    // Give the handler a moment to misbehave if it were going to.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!probe.was_dialed(), "unauthorized session reached the target");

    drop(ws);
    exit.stop().await;
    probe.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_token_is_closed_with_4001() {
    init_tracing();

    let probe = DialProbe::start().await;
    let exit = TestExit::start(probe.addr, "secret").await;

    let mut ws = ws_connect(exit.addr, None).await;
    expect_close_code(&mut ws, 4001).await;
    assert!(!probe.was_dialed());

    drop(ws);
    exit.stop().await;
    probe.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_target_is_closed_with_1011() {
    init_tracing();

    let target = free_addr().await;
    let exit = TestExit::start(target, "secret").await;

    let mut ws = ws_connect(exit.addr, Some("secret")).await;
    expect_close_code(&mut ws, 1011).await;

    drop(ws);
    exit.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn authorized_session_relays_binary_to_target_and_back() {
    init_tracing();

    let echo = TcpEchoServer::start().await;
    let exit = TestExit::start(echo.addr, "secret").await;

    let mut ws = ws_connect(exit.addr, Some("secret")).await;
    ws.send(Message::Binary(b"ping over ws".to_vec()))
        .await
        .unwrap();

    let reply = loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for echo")
            .unwrap()
            .unwrap();
        match msg {
            Message::Binary(data) => break data,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected binary echo, got {other:?}"),
        }
    };
    assert_eq!(reply, b"ping over ws");

    ws.close(None).await.unwrap();
    drop(ws);

    echo.stop().await;
    exit.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn text_frame_tears_the_session_down_with_1011() {
    init_tracing();

    let echo = TcpEchoServer::start().await;
    let exit = TestExit::start(echo.addr, "secret").await;

    let mut ws = ws_connect(exit.addr, Some("secret")).await;
    ws.send(Message::Text("not allowed".to_string()))
        .await
        .unwrap();

    expect_close_code(&mut ws, 1011).await;

    drop(ws);
    echo.stop().await;
    exit.stop().await;
}
