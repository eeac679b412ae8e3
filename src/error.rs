//! Error types for the match observer.

use thiserror::Error;

/// Errors that can occur while observing a match.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// Failed to receive a message from the stream transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// Failed to send a frame (including the close handshake) on the stream transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to serialize or deserialize a protocol document.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request could not be completed at the HTTP layer (DNS, connect, body read).
    #[error("request failed: {0}")]
    Request(String),

    /// The match engine answered with a non-success status.
    #[error("match engine returned {status}: {detail}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// The engine's `detail` field, or the raw body when absent.
        detail: String,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for match observer operations.
pub type Result<T> = std::result::Result<T, ObserverError>;
