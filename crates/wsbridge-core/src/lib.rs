//! Core relay machinery shared by the entry and exit nodes.
//!
//! This crate provides:
//! - The tagged chunk model and transport endpoint halves (TCP + WebSocket)
//! - The unidirectional relay pump and the paired-pump session runner
//! - The session state machine
//! - The pinned hostname resolver used by the entry node
//! - Default configuration values and the connection tracker

pub mod defaults;
pub mod endpoint;
pub mod pump;
pub mod resolver;
pub mod session;
pub mod tracker;

pub use endpoint::{Chunk, ChunkSink, ChunkSource, TcpSink, TcpSource, WsSink, WsSource};
pub use pump::{pump, PumpEnd, Teardown};
pub use resolver::PinnedResolver;
pub use session::{run_pumps, PumpSpec, Session, SessionState};
pub use tracker::{ConnectionGuard, ConnectionTracker};
pub use tokio_util::sync::CancellationToken;

/// Project name.
pub const PROJECT_NAME: &str = "wsbridge";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
