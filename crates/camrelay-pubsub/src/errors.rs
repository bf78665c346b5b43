//! Transport error types.

use thiserror::Error;

/// Errors raised by the pub/sub transport.
#[derive(Debug, Error)]
pub enum PubSubError {
    /// The origin could not be turned into a websocket URL.
    #[error("invalid origin url: {0}")]
    InvalidUrl(String),

    /// The websocket connection failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server did not complete the Engine.IO handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A packet could not be decoded.
    #[error("malformed packet: {0}")]
    Protocol(String),

    /// The server refused to join the namespace.
    #[error("namespace {namespace} rejected: {reason}")]
    ConnectRejected {
        /// Namespace we tried to join.
        namespace: String,
        /// Server-provided reason.
        reason: String,
    },

    /// The subscription was closed.
    #[error("subscription closed")]
    Closed,
}

impl From<serde_json::Error> for PubSubError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, PubSubError>;
