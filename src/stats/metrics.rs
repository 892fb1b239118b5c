//! Statistics and metrics for hub delivery

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Snapshot of hub activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Currently registered connections
    pub active_connections: u64,
    /// Connections ever registered
    pub total_connections: u64,
    /// Broadcasts performed
    pub broadcasts: u64,
    /// Individual events handed to connections
    pub deliveries: u64,
    /// Connections dropped because they could not keep up
    pub slow_disconnects: u64,
    /// Time since the hub was created
    pub uptime: Duration,
}

impl HubStats {
    /// Average deliveries per broadcast
    pub fn fanout(&self) -> f64 {
        if self.broadcasts > 0 {
            self.deliveries as f64 / self.broadcasts as f64
        } else {
            0.0
        }
    }
}

/// Live counters behind [`HubStats`]
#[derive(Debug)]
pub(crate) struct HubCounters {
    started_at: Instant,
    total_connections: AtomicU64,
    broadcasts: AtomicU64,
    deliveries: AtomicU64,
    slow_disconnects: AtomicU64,
}

impl HubCounters {
    pub(crate) fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            slow_disconnects: AtomicU64::new(0),
        }
    }

    pub(crate) fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn broadcast(&self, delivered: usize, slow: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.slow_disconnects
            .fetch_add(slow as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, active_connections: usize) -> HubStats {
        HubStats {
            active_connections: active_connections as u64,
            total_connections: self.total_connections.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            slow_disconnects: self.slow_disconnects.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}
