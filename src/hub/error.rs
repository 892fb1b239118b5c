//! Per-connection delivery failures
//!
//! A failed delivery removes the affected connection and is logged. It is
//! reported in the [`BroadcastReport`](super::BroadcastReport) but never fails
//! the broadcast itself.

use super::connection::ConnectionId;

/// Why a broadcast could not be handed to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// Connection buffer is full; the consumer is not keeping up
    Slow(ConnectionId),
    /// Receiving side is gone
    Closed(ConnectionId),
}

impl DeliveryFailure {
    /// Connection the failure belongs to
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            DeliveryFailure::Slow(id) | DeliveryFailure::Closed(id) => *id,
        }
    }
}

impl std::fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryFailure::Slow(id) => write!(f, "Connection {} is too slow", id),
            DeliveryFailure::Closed(id) => write!(f, "Connection {} is closed", id),
        }
    }
}

impl std::error::Error for DeliveryFailure {}
