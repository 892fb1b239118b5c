//! Broadcast hub implementation
//!
//! The central set of live connections and the fan-out of created
//! notifications to them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};

use super::config::HubConfig;
use super::connection::{deliver, ConnectionEntry, ConnectionHandle, ConnectionId};
use super::error::DeliveryFailure;
use super::event::HubEvent;
use crate::model::Notification;
use crate::registry::RegistryEvent;
use crate::stats::metrics::HubCounters;
use crate::stats::HubStats;

/// Outcome of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the event was handed to
    pub delivered: usize,
    /// Connections removed because delivery failed
    pub failed: Vec<DeliveryFailure>,
}

/// Registry of live connections with best-effort fan-out
///
/// Thread-safe via `RwLock`. Broadcasting only holds the read lock long enough
/// to clone the connection senders; delivery happens after the lock is
/// released, so connects and disconnects never wait on a broadcast.
pub struct BroadcastHub {
    /// Live connections
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,

    /// Next connection ID to hand out
    next_id: AtomicU64,

    /// Activity counters
    counters: HubCounters,

    /// Configuration
    config: HubConfig,
}

impl BroadcastHub {
    /// Create a new hub with default configuration
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a new hub with custom configuration
    pub fn with_config(config: HubConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            counters: HubCounters::new(),
            config,
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a new live connection
    ///
    /// The connection receives every broadcast from now on; there is no
    /// per-recipient filtering.
    pub async fn connect(&self) -> ConnectionHandle {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.config.connection_buffer);

        let active = {
            let mut connections = self.connections.write().await;
            connections.insert(id, ConnectionEntry::new(tx));
            connections.len()
        };
        self.counters.connection_opened();

        tracing::debug!(connection_id = %id, active, "Connection registered");

        ConnectionHandle::new(id, rx)
    }

    /// Deregister a connection
    ///
    /// Idempotent. Returns `true` if the connection was registered.
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;

        match connections.remove(&id) {
            Some(entry) => {
                tracing::debug!(
                    connection_id = %id,
                    connected_secs = entry.age().as_secs(),
                    active = connections.len(),
                    "Connection deregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Deregister every connection
    ///
    /// Their handles drain what is buffered and then report closed.
    pub async fn disconnect_all(&self) -> usize {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        connections.clear();

        if count > 0 {
            tracing::info!(count, "All connections deregistered");
        }
        count
    }

    /// Push a created notification to every live connection
    pub async fn broadcast_notification(&self, notification: Notification) -> BroadcastReport {
        self.broadcast(HubEvent::NotificationCreated(notification)).await
    }

    /// Push an event to every live connection
    ///
    /// Fire-and-forget: there is no acknowledgement and no retry. Connections
    /// whose buffer is full or whose receiver is gone are deregistered.
    pub async fn broadcast(&self, event: HubEvent) -> BroadcastReport {
        let targets: Vec<(ConnectionId, mpsc::Sender<HubEvent>)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .map(|(id, entry)| (*id, entry.sender()))
                .collect()
        };

        let mut report = BroadcastReport::default();
        for (id, tx) in &targets {
            match deliver(*id, tx, event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(failure) => report.failed.push(failure),
            }
        }

        if !report.failed.is_empty() {
            let mut connections = self.connections.write().await;
            for failure in &report.failed {
                connections.remove(&failure.connection_id());
                match failure {
                    DeliveryFailure::Slow(id) => {
                        tracing::warn!(connection_id = %id, "Dropping slow connection");
                    }
                    DeliveryFailure::Closed(id) => {
                        tracing::debug!(connection_id = %id, "Dropping closed connection");
                    }
                }
            }
        }

        let slow = report
            .failed
            .iter()
            .filter(|f| matches!(f, DeliveryFailure::Slow(_)))
            .count();
        self.counters.broadcast(report.delivered, slow);

        tracing::debug!(
            targets = targets.len(),
            delivered = report.delivered,
            failed = report.failed.len(),
            "Broadcast complete"
        );

        report
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Check whether a connection is still registered
    pub async fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Get hub statistics
    pub async fn stats(&self) -> HubStats {
        let active = self.connection_count().await;
        self.counters.snapshot(active)
    }

    /// Spawn the task that forwards registry events to connections
    ///
    /// Returns a handle that can be used to abort the task. The task ends on
    /// its own when the registry is dropped.
    pub fn spawn_relay(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<RegistryEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let hub = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(RegistryEvent::Created(notification)) => {
                        hub.broadcast_notification(notification).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Hub relay lagged, notifications not pushed");
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Registry event channel closed, relay stopping");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::model::{NewNotification, NotificationId};
    use crate::registry::NotificationRegistry;
    use crate::store::SqliteStore;

    fn notification(title: &str) -> Notification {
        Notification {
            id: NotificationId::generate(),
            title: title.to_string(),
            message: "body".to_string(),
            recipient_id: None,
            created_at: Utc::now(),
            is_read: false,
        }
    }

    fn created(event: Option<HubEvent>) -> Notification {
        match event {
            Some(HubEvent::NotificationCreated(n)) => n,
            Some(other) => panic!("unexpected event: {other:?}"),
            None => panic!("connection closed"),
        }
    }

    #[tokio::test]
    async fn test_connect_disconnect() {
        let hub = BroadcastHub::new();

        let a = hub.connect().await;
        let b = hub.connect().await;
        assert_ne!(a.id(), b.id());
        assert_eq!(hub.connection_count().await, 2);

        assert!(hub.disconnect(a.id()).await);
        assert!(!hub.disconnect(a.id()).await);
        assert_eq!(hub.connection_count().await, 1);
        assert!(hub.is_connected(b.id()).await);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_connection() {
        let hub = BroadcastHub::new();
        let mut a = hub.connect().await;
        let mut b = hub.connect().await;

        let n = notification("hello");
        let report = hub.broadcast_notification(n.clone()).await;

        assert_eq!(report.delivered, 2);
        assert!(report.failed.is_empty());
        assert_eq!(created(a.recv().await), n);
        assert_eq!(created(b.recv().await), n);
    }

    #[tokio::test]
    async fn test_broadcast_without_connections() {
        let hub = BroadcastHub::new();

        let report = hub.broadcast_notification(notification("nobody")).await;

        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_disconnected_handle_stops_receiving() {
        let hub = BroadcastHub::new();
        let mut a = hub.connect().await;

        hub.disconnect(a.id()).await;
        hub.broadcast_notification(notification("late")).await;

        assert!(a.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_connection_dropped_others_unaffected() {
        let hub = BroadcastHub::with_config(HubConfig::default().connection_buffer(1));
        assert_eq!(hub.config().connection_buffer, 1);
        let slow = hub.connect().await;
        let mut fast = hub.connect().await;

        let first = notification("first");
        hub.broadcast_notification(first.clone()).await;
        assert_eq!(created(fast.recv().await), first);

        // `slow` never reads, so its single-slot buffer is still full
        let second = notification("second");
        let report = hub.broadcast_notification(second.clone()).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, vec![DeliveryFailure::Slow(slow.id())]);
        assert!(!hub.is_connected(slow.id()).await);
        assert_eq!(created(fast.recv().await), second);

        let stats = hub.stats().await;
        assert_eq!(stats.slow_disconnects, 1);
        assert_eq!(stats.active_connections, 1);
    }

    #[tokio::test]
    async fn test_dropped_handle_is_cleaned_up() {
        let hub = BroadcastHub::new();
        let gone = hub.connect().await;
        let gone_id = gone.id();
        drop(gone);

        let report = hub.broadcast_notification(notification("x")).await;

        assert_eq!(report.failed, vec![DeliveryFailure::Closed(gone_id)]);
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_all_closes_handles() {
        let hub = BroadcastHub::new();
        let mut a = hub.connect().await;
        let mut b = hub.connect().await;

        assert_eq!(hub.disconnect_all().await, 2);

        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_connect_and_broadcast() {
        let hub = Arc::new(BroadcastHub::with_config(
            HubConfig::default().connection_buffer(1024),
        ));

        let broadcaster = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                for i in 0..100 {
                    hub.broadcast_notification(notification(&format!("n{i}"))).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut joins = Vec::new();
        for _ in 0..20 {
            let hub = Arc::clone(&hub);
            joins.push(tokio::spawn(async move {
                let handle = hub.connect().await;
                tokio::task::yield_now().await;
                hub.disconnect(handle.id()).await
            }));
        }

        for join in joins {
            assert!(join.await.unwrap());
        }
        broadcaster.await.unwrap();

        assert_eq!(hub.connection_count().await, 0);
        let stats = hub.stats().await;
        assert_eq!(stats.total_connections, 20);
        assert_eq!(stats.broadcasts, 100);
    }

    #[tokio::test]
    async fn test_relay_pushes_created_notifications() {
        let registry = NotificationRegistry::new(SqliteStore::open_in_memory().unwrap());
        let hub = Arc::new(BroadcastHub::new());
        let relay = hub.spawn_relay(registry.subscribe());
        let mut observer = hub.connect().await;

        let n = registry
            .create(NewNotification::new("A", "hi").recipient("u1"))
            .await
            .unwrap();

        let pushed = tokio::time::timeout(Duration::from_secs(1), observer.recv())
            .await
            .expect("push not received");
        assert_eq!(created(pushed), n);
        assert!(!n.is_read);

        // Exactly one push per create
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(observer.try_recv().is_none());

        drop(registry);
        tokio::time::timeout(Duration::from_secs(1), relay)
            .await
            .expect("relay did not stop")
            .unwrap();
    }
}
