// Transport errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload encoding error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("request to {addr} timed out")]
    Timeout { addr: String },
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
    #[error("remote error: {0}")]
    Remote(String),
}

impl NetworkError {
    /// Peer hung up between two requests
    pub fn is_disconnect(&self) -> bool {
        matches!(self, NetworkError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}
