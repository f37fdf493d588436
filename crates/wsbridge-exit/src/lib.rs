//! Exit node library.
//!
//! Exposes the server implementation for integration tests and embedding.

pub mod cli;
pub mod config;
mod error;
mod handler;
mod server;

pub use config::ExitConfig;
pub use error::ExitError;
pub use server::run_with_shutdown;
pub use tokio_util::sync::CancellationToken;
