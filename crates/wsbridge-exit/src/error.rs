//! Exit node error types.

/// Errors that can occur in the exit node.
#[derive(Debug, thiserror::Error)]
pub enum ExitError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("config: {0}")]
    Config(String),
}
