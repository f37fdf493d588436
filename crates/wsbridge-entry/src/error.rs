//! Entry node error types.

/// Errors that can occur in the entry node.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("websocket connect timed out")]
    ConnectTimeout,

    #[error("config: {0}")]
    Config(String),
}
