//! Client session
//!
//! Keeps a local, newest-first view of a recipient's unread notifications in
//! step with the server across the connection lifecycle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::hub::HubEvent;
use crate::model::{Notification, NotificationId};

use super::config::ClientConfig;
use super::source::NotificationSource;
use super::state::{SessionPhase, SessionState, SyncKind};
use super::transport::{PushStream, PushTransport, WsTransport};

/// Events from a client session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session moved to a new phase
    PhaseChanged(SessionPhase),

    /// The cache was replaced from a fetch
    Synced {
        /// Initial sync or resync after reconnect
        kind: SyncKind,
        /// Notifications now cached
        count: usize,
    },

    /// A pushed notification was added to the cache
    Pushed(Notification),
}

/// State shared between the session handle and its driver task
struct Shared {
    state: Mutex<SessionState>,
    events: mpsc::Sender<SessionEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the state and report any phase change
    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let (result, before, after) = {
            let mut state = self.lock();
            let before = state.phase;
            let result = f(&mut state);
            (result, before, state.phase)
        };

        if before != after {
            tracing::debug!(from = ?before, to = ?after, "Session phase changed");
            self.emit(SessionEvent::PhaseChanged(after));
        }
        result
    }

    // Events are advisory; a full or closed channel never stalls the driver
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.try_send(event);
    }
}

/// A connected client's reconciled view of its notifications
///
/// Starting a session spawns a driver task that connects, fetches unread
/// notifications, applies pushes, and on transport loss reconnects with
/// exponential backoff and replaces the cache from a fresh fetch.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use notify_rs::client::{ClientConfig, ClientSession, NotificationSource};
///
/// # async fn example(source: Arc<dyn NotificationSource>) {
/// let config = ClientConfig::new("ws://localhost:5174/notificationHub").recipient("user123");
/// let (session, mut events) = ClientSession::connect_ws(config, source);
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// for n in session.notifications() {
///     println!("{} {}", n.title, n.message);
/// }
/// session.stop().await;
/// # }
/// ```
pub struct ClientSession {
    shared: Arc<Shared>,
    source: Arc<dyn NotificationSource>,
    recipient_id: Option<String>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ClientSession {
    /// Start a session over an arbitrary transport.
    ///
    /// Returns the session and a receiver for session events. Must be called
    /// from within a tokio runtime.
    pub fn start(
        config: ClientConfig,
        source: Arc<dyn NotificationSource>,
        transport: Arc<dyn PushTransport>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::new()),
            events: tx,
        });
        let cancel = CancellationToken::new();
        let recipient_id = config.recipient_id.clone();

        shared.update(|s| s.start());

        let driver = Driver {
            shared: Arc::clone(&shared),
            source: Arc::clone(&source),
            transport,
            cancel: cancel.clone(),
            config,
        };
        let handle = tokio::spawn(driver.run());

        let session = Self {
            shared,
            source,
            recipient_id,
            cancel,
            driver: Mutex::new(Some(handle)),
        };

        (session, rx)
    }

    /// Start a session connected to `config.hub_url` over WebSocket
    pub fn connect_ws(
        config: ClientConfig,
        source: Arc<dyn NotificationSource>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let transport = Arc::new(WsTransport::new(
            config.hub_url.clone(),
            config.connect_timeout,
        ));
        Self::start(config, source, transport)
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        self.shared.lock().phase
    }

    /// Cached notifications, newest first
    pub fn notifications(&self) -> Vec<Notification> {
        self.shared.lock().cache.sorted()
    }

    /// Number of cached notifications not yet read
    pub fn unread_count(&self) -> usize {
        self.shared.lock().cache.unread_count()
    }

    /// Number of resyncs performed after reconnects
    pub fn resync_count(&self) -> u64 {
        self.shared.lock().resyncs
    }

    /// Mark one notification as read
    ///
    /// The cached copy is flipped immediately; the server call follows. A
    /// failed server call is returned but the local flag stays set.
    pub async fn mark_as_read(&self, id: &NotificationId) -> Result<()> {
        self.shared.update(|s| s.cache.mark_read(id));

        self.source.mark_as_read(id).await.inspect_err(|e| {
            tracing::warn!(notification_id = %id, error = %e, "Mark as read failed on server");
        })
    }

    /// Mark every cached notification as read
    ///
    /// The server side is scoped by the session's recipient filter.
    pub async fn mark_all_as_read(&self) -> Result<()> {
        self.shared.update(|s| s.cache.mark_all_read());

        self.source
            .mark_all_as_read(self.recipient_id.as_deref())
            .await
            .inspect_err(|e| {
                tracing::warn!(error = %e, "Mark all as read failed on server");
            })
    }

    /// Stop the session
    ///
    /// After this returns no further pushes are applied and any pending
    /// reconnect delay has been abandoned.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.shared.update(|s| s.stop());

        let driver = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                tracing::warn!(error = %e, "Session driver ended abnormally");
            }
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Background task owning the connection lifecycle
struct Driver {
    shared: Arc<Shared>,
    source: Arc<dyn NotificationSource>,
    transport: Arc<dyn PushTransport>,
    cancel: CancellationToken,
    config: ClientConfig,
}

impl Driver {
    async fn run(self) {
        let mut backoff = self.config.initial_backoff;

        loop {
            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => break,
                attempt = self.transport.connect() => attempt,
            };

            let mut stream = match attempt {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_ms = backoff.as_millis() as u64,
                        "Connect failed"
                    );
                    if !self.sleep(backoff).await {
                        break;
                    }
                    backoff = self.config.next_backoff(backoff);
                    continue;
                }
            };
            backoff = self.config.initial_backoff;

            let Some(kind) = self.shared.update(|s| s.on_handshake()) else {
                break;
            };
            if !self.sync(kind).await {
                break;
            }
            if !self.pump(stream.as_mut()).await {
                break;
            }

            self.shared.update(|s| s.on_transport_lost());
            tracing::info!(retry_ms = backoff.as_millis() as u64, "Connection lost, reconnecting");

            if !self.sleep(backoff).await {
                break;
            }
            backoff = self.config.next_backoff(backoff);
        }

        tracing::debug!("Session driver stopped");
    }

    /// Fetch unread notifications and replace the cache
    ///
    /// Returns `false` if the session was stopped meanwhile.
    async fn sync(&self, kind: SyncKind) -> bool {
        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return false,
            fetched = self.source.fetch_unread(self.config.recipient_id.as_deref()) => fetched,
        };

        match fetched {
            Ok(notifications) => {
                let count = notifications.len();
                if self.shared.update(|s| s.apply_sync(kind, notifications)) {
                    tracing::debug!(?kind, count, "Cache synchronised");
                    self.shared.emit(SessionEvent::Synced { kind, count });
                }
            }
            Err(e) => {
                tracing::warn!(?kind, error = %e, "Unread fetch failed, keeping cached view");
            }
        }
        true
    }

    /// Apply pushes until the transport drops
    ///
    /// Returns `false` if the session was stopped, `true` on transport loss.
    async fn pump(&self, stream: &mut dyn PushStream) -> bool {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return false,
                next = stream.next_event() => next,
            };

            match next {
                Some(Ok(HubEvent::Ready)) => {}
                Some(Ok(HubEvent::NotificationCreated(notification))) => {
                    let pushed = notification.clone();
                    if self.shared.update(|s| s.apply_push(notification)) {
                        self.shared.emit(SessionEvent::Pushed(pushed));
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Push transport failed");
                    return true;
                }
                None => return true,
            }
        }
    }

    /// Sleep unless cancelled first. Returns `false` when cancelled.
    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::client::transport::HubTransport;
    use crate::error::TransportError;
    use crate::hub::BroadcastHub;
    use crate::model::NewNotification;
    use crate::registry::NotificationRegistry;
    use crate::store::SqliteStore;

    struct Fixture {
        registry: Arc<NotificationRegistry<SqliteStore>>,
        hub: Arc<BroadcastHub>,
        relay: JoinHandle<()>,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Arc::new(NotificationRegistry::new(
                SqliteStore::open_in_memory().unwrap(),
            ));
            let hub = Arc::new(BroadcastHub::new());
            let relay = hub.spawn_relay(registry.subscribe());
            Self {
                registry,
                hub,
                relay,
            }
        }

        fn start(&self, config: ClientConfig) -> (ClientSession, mpsc::Receiver<SessionEvent>) {
            let source: Arc<dyn NotificationSource> = self.registry.clone();
            let transport = Arc::new(HubTransport::new(Arc::clone(&self.hub)));
            ClientSession::start(config, source, transport)
        }

        async fn create_at(&self, title: &str, recipient: &str, secs: i64) -> Notification {
            let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs);
            self.registry
                .create(NewNotification::new(title, "body").recipient(recipient).created_at(ts))
                .await
                .unwrap()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.relay.abort();
        }
    }

    fn fast_config() -> ClientConfig {
        ClientConfig::default()
            .recipient("u1")
            .backoff(Duration::from_millis(10), Duration::from_millis(50))
    }

    async fn wait_for(
        events: &mut mpsc::Receiver<SessionEvent>,
        matches: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        let wait = async {
            loop {
                match events.recv().await {
                    Some(event) if matches(&event) => return event,
                    Some(_) => continue,
                    None => panic!("session event channel closed"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(2), wait)
            .await
            .expect("timed out waiting for session event")
    }

    fn is_synced(kind: SyncKind) -> impl Fn(&SessionEvent) -> bool {
        move |e| matches!(e, SessionEvent::Synced { kind: k, .. } if *k == kind)
    }

    fn titles(items: &[Notification]) -> Vec<&str> {
        items.iter().map(|n| n.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_initial_sync_filters_by_recipient() {
        let fx = Fixture::new();
        fx.create_at("old", "u1", 1).await;
        fx.create_at("other", "u2", 2).await;
        fx.create_at("new", "u1", 3).await;

        let (session, mut events) = fx.start(fast_config());
        let synced = wait_for(&mut events, is_synced(SyncKind::Initial)).await;

        assert_eq!(
            synced,
            SessionEvent::Synced {
                kind: SyncKind::Initial,
                count: 2
            }
        );
        assert_eq!(session.phase(), SessionPhase::Connected);
        assert_eq!(titles(&session.notifications()), vec!["new", "old"]);
        assert_eq!(session.unread_count(), 2);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_push_is_added_to_cache() {
        let fx = Fixture::new();
        fx.create_at("first", "u1", 1).await;

        let (session, mut events) = fx.start(fast_config());
        wait_for(&mut events, is_synced(SyncKind::Initial)).await;

        let created = fx.create_at("pushed", "u1", 10).await;
        let pushed = wait_for(&mut events, |e| matches!(e, SessionEvent::Pushed(_))).await;

        assert_eq!(pushed, SessionEvent::Pushed(created));
        assert_eq!(titles(&session.notifications()), vec!["pushed", "first"]);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_resync_after_reconnect_replaces_cache() {
        let fx = Fixture::new();
        let n1 = fx.create_at("n1", "u1", 1).await;
        fx.create_at("n2", "u1", 2).await;

        let (session, mut events) = fx.start(fast_config());
        wait_for(&mut events, is_synced(SyncKind::Initial)).await;
        assert_eq!(session.notifications().len(), 2);

        // Read elsewhere while this session still shows it unread
        fx.registry.mark_as_read(&n1.id).await.unwrap();
        fx.hub.disconnect_all().await;

        wait_for(&mut events, |e| {
            *e == SessionEvent::PhaseChanged(SessionPhase::Reconnecting)
        })
        .await;
        let synced = wait_for(&mut events, is_synced(SyncKind::Resync)).await;

        assert_eq!(
            synced,
            SessionEvent::Synced {
                kind: SyncKind::Resync,
                count: 1
            }
        );
        assert_eq!(titles(&session.notifications()), vec!["n2"]);
        assert!(session.resync_count() >= 1);
        assert_eq!(session.phase(), SessionPhase::Connected);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_mark_as_read_is_optimistic() {
        let fx = Fixture::new();
        let a = fx.create_at("a", "u1", 1).await;
        let b = fx.create_at("b", "u1", 2).await;

        let (session, mut events) = fx.start(fast_config());
        wait_for(&mut events, is_synced(SyncKind::Initial)).await;

        session.mark_as_read(&a.id).await.unwrap();
        assert!(fx.registry.get_by_id(&a.id).await.unwrap().unwrap().is_read);

        // Server copy vanished: the call fails but the local flag stays set
        fx.registry.delete(&b.id).await.unwrap();
        let err = session.mark_as_read(&b.id).await.unwrap_err();
        assert!(err.is_not_found());

        assert!(session.notifications().iter().all(|n| n.is_read));
        assert_eq!(session.unread_count(), 0);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_mark_all_as_read_scoped_to_recipient() {
        let fx = Fixture::new();
        fx.create_at("mine", "u1", 1).await;
        let theirs = fx.create_at("theirs", "u2", 2).await;

        let (session, mut events) = fx.start(fast_config());
        wait_for(&mut events, is_synced(SyncKind::Initial)).await;

        session.mark_all_as_read().await.unwrap();

        assert_eq!(session.unread_count(), 0);
        assert!(fx.registry.get_unread(Some("u1")).await.unwrap().is_empty());
        assert!(!fx.registry.get_by_id(&theirs.id).await.unwrap().unwrap().is_read);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_stop_halts_push_processing() {
        let fx = Fixture::new();
        let (session, mut events) = fx.start(fast_config());
        wait_for(&mut events, is_synced(SyncKind::Initial)).await;

        session.stop().await;
        assert_eq!(session.phase(), SessionPhase::Disconnected);

        fx.create_at("late", "u1", 5).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(session.notifications().is_empty());
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, SessionEvent::Pushed(_)));
        }
    }

    #[tokio::test]
    async fn test_stop_abandons_backoff_sleep() {
        let fx = Fixture::new();
        let config = ClientConfig::default()
            .backoff(Duration::from_secs(60), Duration::from_secs(60));
        let (session, mut events) = fx.start(config);
        wait_for(&mut events, is_synced(SyncKind::Initial)).await;

        fx.hub.disconnect_all().await;
        wait_for(&mut events, |e| {
            *e == SessionEvent::PhaseChanged(SessionPhase::Reconnecting)
        })
        .await;

        tokio::time::timeout(Duration::from_secs(1), session.stop())
            .await
            .expect("stop waited for the backoff");
    }

    /// Fails the first `failures` connects, then delegates
    struct FlakyTransport {
        inner: HubTransport,
        failures: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl PushTransport for FlakyTransport {
        async fn connect(&self) -> Result<Box<dyn PushStream>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(TransportError::ConnectTimeout.into());
            }
            self.inner.connect().await
        }
    }

    #[tokio::test]
    async fn test_failed_connects_retry_until_initial_sync() {
        let fx = Fixture::new();
        fx.create_at("a", "u1", 1).await;

        let transport = Arc::new(FlakyTransport {
            inner: HubTransport::new(Arc::clone(&fx.hub)),
            failures: 3,
            attempts: AtomicUsize::new(0),
        });
        let source: Arc<dyn NotificationSource> = fx.registry.clone();
        let (session, mut events) = ClientSession::start(fast_config(), source, transport.clone());

        let synced = wait_for(&mut events, |e| matches!(e, SessionEvent::Synced { .. })).await;

        assert_eq!(
            synced,
            SessionEvent::Synced {
                kind: SyncKind::Initial,
                count: 1
            }
        );
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(session.resync_count(), 0);

        session.stop().await;
    }
}
