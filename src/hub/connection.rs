//! Connection entry and handle types
//!
//! The hub stores one [`ConnectionEntry`] per live connection. The matching
//! [`ConnectionHandle`] is owned by whoever serves that connection (a socket
//! task or an in-process transport) and yields the events pushed to it.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::error::DeliveryFailure;
use super::event::HubEvent;

/// Identifier of a live hub connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hub-side state for one connection
pub(super) struct ConnectionEntry {
    /// Sender half of the connection's event buffer
    tx: mpsc::Sender<HubEvent>,

    /// When the connection registered
    connected_at: Instant,
}

impl ConnectionEntry {
    pub(super) fn new(tx: mpsc::Sender<HubEvent>) -> Self {
        Self {
            tx,
            connected_at: Instant::now(),
        }
    }

    /// Cheap clone of the sender, used to deliver outside the hub lock
    pub(super) fn sender(&self) -> mpsc::Sender<HubEvent> {
        self.tx.clone()
    }

    /// How long the connection has been registered
    pub(super) fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Hand an event to one connection without waiting
pub(super) fn deliver(
    id: ConnectionId,
    tx: &mpsc::Sender<HubEvent>,
    event: HubEvent,
) -> Result<(), DeliveryFailure> {
    tx.try_send(event).map_err(|e| match e {
        TrySendError::Full(_) => DeliveryFailure::Slow(id),
        TrySendError::Closed(_) => DeliveryFailure::Closed(id),
    })
}

/// Receiving side of a hub connection
///
/// `recv` returns `None` once the hub has deregistered the connection (explicit
/// disconnect or dropped as slow) and any buffered events have been drained.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    rx: mpsc::Receiver<HubEvent>,
}

impl ConnectionHandle {
    pub(super) fn new(id: ConnectionId, rx: mpsc::Receiver<HubEvent>) -> Self {
        Self { id, rx }
    }

    /// Connection identifier, used for `disconnect`
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Wait for the next pushed event
    pub async fn recv(&mut self) -> Option<HubEvent> {
        self.rx.recv().await
    }

    /// Take a buffered event without waiting
    pub fn try_recv(&mut self) -> Option<HubEvent> {
        self.rx.try_recv().ok()
    }
}
