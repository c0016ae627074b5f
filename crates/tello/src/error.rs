use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelloError {
    /// The local endpoint could not be bound, or an address was invalid.
    #[error("Bind failed: {0}")]
    Bind(String),

    /// The `command` handshake did not resolve to `ok`.
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TelloError {
    /// Timeouts leave the session usable; every other error is terminal for
    /// the call that produced it.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TelloError::Timeout(_))
    }
}
