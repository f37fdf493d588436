//! Entry node library.
//!
//! Exposes the server implementation for integration tests and embedding.

pub mod cli;
pub mod config;
pub mod connector;
mod error;
mod server;

pub use config::EntryConfig;
pub use connector::WsConnector;
pub use error::EntryError;
pub use server::run_with_shutdown;
pub use tokio_util::sync::CancellationToken;
