//! Error types
//!
//! A single crate-level [`Error`] carries the four failure classes of the
//! pipeline. Store errors pass through the registry and API unchanged; transport
//! errors stay local to the connection that produced them.

use thiserror::Error;

use crate::model::{NotificationId, ValidationError};
use crate::store::StoreError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Lookup or mutation target does not exist
    #[error("notification not found: {0}")]
    NotFound(NotificationId),

    /// Input rejected before reaching the store
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Backing database could not serve the request
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Live connection failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Socket level I/O failure (bind, accept)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the target id did not resolve
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Errors raised by real-time transports
#[derive(Debug, Error)]
pub enum TransportError {
    /// WebSocket protocol or handshake failure
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame payload could not be encoded or decoded
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// Handshake did not complete within the configured timeout
    #[error("connect timed out")]
    ConnectTimeout,

    /// Peer did not accept a frame within the send timeout
    #[error("send timed out")]
    SendTimeout,

    /// Connection was closed by the peer or by the hub
    #[error("connection closed")]
    Closed,
}
