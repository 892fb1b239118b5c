//! Notification server listener
//!
//! Handles the TCP accept loop, spawns connection handlers and owns the relay
//! that feeds registry events into the hub.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::api::NotificationApi;
use crate::error::Result;
use crate::hub::BroadcastHub;
use crate::registry::NotificationRegistry;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::store::{NotificationStore, SqliteStore};

/// Notification server
///
/// Serves the real-time hub over WebSocket. The request/response operations
/// are exposed through [`NotificationServer::api`] for whichever HTTP layer
/// hosts them.
pub struct NotificationServer<S: NotificationStore + 'static> {
    config: Arc<ServerConfig>,
    registry: Arc<NotificationRegistry<S>>,
    hub: Arc<BroadcastHub>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl NotificationServer<SqliteStore> {
    /// Open the SQLite database named by the config and build a server on it
    pub fn open(config: ServerConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.database_path)?;
        Ok(Self::new(config, Arc::new(NotificationRegistry::new(store))))
    }
}

impl<S: NotificationStore + 'static> NotificationServer<S> {
    /// Create a new server around an existing registry
    pub fn new(config: ServerConfig, registry: Arc<NotificationRegistry<S>>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            hub: Arc::new(BroadcastHub::with_config(config.hub.clone())),
            config: Arc::new(config),
            registry,
            connection_semaphore,
        }
    }

    /// Get a reference to the registry
    pub fn registry(&self) -> &Arc<NotificationRegistry<S>> {
        &self.registry
    }

    /// Get a reference to the broadcast hub
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Request/response operations over the same registry
    pub fn api(&self) -> NotificationApi<S> {
        NotificationApi::new(Arc::clone(&self.registry))
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind the configured address and serve until `shutdown` completes
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes
    ///
    /// On shutdown every live connection is dropped from the hub, which makes
    /// its handler send a close frame and exit.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, path = %self.config.hub_path, "Notification server listening");

        let relay = self.hub.spawn_relay(self.registry.subscribe());

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        relay.abort();
        let closed = self.hub.disconnect_all().await;
        tracing::info!(closed, "Notification server stopped");

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let permit = match &self.connection_semaphore {
            Some(sem) => match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        if let Err(e) = socket.set_nodelay(true) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let connection = Connection::new(
            peer_addr,
            Arc::clone(&self.config),
            Arc::clone(&self.registry),
            Arc::clone(&self.hub),
        );

        tokio::spawn(async move {
            let _permit = permit;

            if let Err(e) = connection.run(socket).await {
                tracing::debug!(peer = %peer_addr, error = %e, "Connection error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::sync::{mpsc, oneshot};
    use tokio::task::JoinHandle;
    use tokio_tungstenite::tungstenite::http::StatusCode;
    use tokio_tungstenite::tungstenite::{self, Message};

    use super::*;
    use crate::client::{
        ClientConfig, ClientSession, NotificationSource, SessionEvent, SyncKind,
    };
    use crate::hub::HubEvent;
    use crate::model::NewNotification;

    struct Running {
        addr: SocketAddr,
        registry: Arc<NotificationRegistry<SqliteStore>>,
        hub: Arc<BroadcastHub>,
        shutdown: Option<oneshot::Sender<()>>,
        task: JoinHandle<Result<()>>,
    }

    impl Running {
        fn url(&self, path: &str) -> String {
            format!("ws://{}{}", self.addr, path)
        }

        async fn stop(self) {
            if let Some(tx) = self.shutdown {
                let _ = tx.send(());
            }
            self.task.await.unwrap().unwrap();
        }
    }

    async fn start(config: ServerConfig) -> Running {
        let registry = Arc::new(NotificationRegistry::new(
            SqliteStore::open_in_memory().unwrap(),
        ));
        let server = NotificationServer::new(config, Arc::clone(&registry));
        let hub = Arc::clone(server.hub());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        Running {
            addr,
            registry,
            hub,
            shutdown: Some(tx),
            task,
        }
    }

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Open a raw hub socket and consume its `ready` frame
    async fn connect_hub(url: &str) -> Client {
        let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        assert_eq!(next_event(&mut client).await, HubEvent::Ready);
        client
    }

    fn created(event: HubEvent) -> crate::model::Notification {
        match event {
            HubEvent::NotificationCreated(n) => n,
            other => panic!("expected notification-created, got {other:?}"),
        }
    }

    async fn next_event<S>(stream: &mut S) -> HubEvent
    where
        S: futures_util::Stream<Item = tungstenite::Result<Message>> + Unpin,
    {
        let wait = async {
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => return HubEvent::from_json(&text).unwrap(),
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected frame: {other:?}"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(2), wait)
            .await
            .expect("no event received")
    }

    async fn next_session_event(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
        let wait = async {
            loop {
                match events.recv().await {
                    Some(SessionEvent::PhaseChanged(_)) => continue,
                    Some(event) => return event,
                    None => panic!("session ended"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(2), wait)
            .await
            .expect("no session event received")
    }

    #[tokio::test]
    async fn test_create_is_pushed_over_websocket() {
        let server = start(ServerConfig::default()).await;
        let mut observer = connect_hub(&server.url("/notificationHub")).await;
        assert_eq!(server.hub.connection_count().await, 1);

        let created = server
            .registry
            .create(NewNotification::new("A", "hi").recipient("u1"))
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut observer).await,
            HubEvent::NotificationCreated(created)
        );

        server.stop().await;
    }

    #[test]
    fn test_hub_built_from_server_config() {
        let registry = Arc::new(NotificationRegistry::new(
            SqliteStore::open_in_memory().unwrap(),
        ));
        let config =
            ServerConfig::default().hub(crate::hub::HubConfig::default().connection_buffer(8));

        let server = NotificationServer::new(config, registry);

        assert_eq!(server.hub().config().connection_buffer, 8);
    }

    #[tokio::test]
    async fn test_unknown_path_is_rejected() {
        let server = start(ServerConfig::default()).await;

        let err = tokio_tungstenite::connect_async(server.url("/elsewhere"))
            .await
            .unwrap_err();

        match err {
            tungstenite::Error::Http(response) => {
                assert_eq!(response.status(), StatusCode::NOT_FOUND)
            }
            other => panic!("expected HTTP rejection, got {other:?}"),
        }
        assert_eq!(server.hub.connection_count().await, 0);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_create_command_reaches_every_connection() {
        let server = start(ServerConfig::default()).await;
        let url = server.url("/notificationHub");
        let mut sender = connect_hub(&url).await;
        let mut other = connect_hub(&url).await;

        let command = r#"{"command":"create-notification","title":"A","message":"hi","recipientId":"u1","isRead":true}"#;
        sender.send(Message::Text(command.to_string())).await.unwrap();

        let to_other = created(next_event(&mut other).await);
        let to_sender = created(next_event(&mut sender).await);

        assert_eq!(to_other, to_sender);
        assert_eq!(to_other.title, "A");
        assert!(!to_other.is_read);
        assert_eq!(server.registry.get_all().await.unwrap(), vec![to_other]);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_command_keeps_connection_open() {
        let server = start(ServerConfig::default()).await;
        let mut client = connect_hub(&server.url("/notificationHub")).await;

        client.send(Message::Text("not json".into())).await.unwrap();
        let blank = r#"{"command":"create-notification","title":"","message":"hi"}"#;
        client.send(Message::Text(blank.into())).await.unwrap();

        let created = server
            .registry
            .create(NewNotification::new("ok", "hi"))
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut client).await,
            HubEvent::NotificationCreated(created)
        );
        assert_eq!(server.registry.get_all().await.unwrap().len(), 1);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let server = start(ServerConfig::default().max_connections(1)).await;
        let url = server.url("/notificationHub");

        let _first = connect_hub(&url).await;

        assert!(tokio_tungstenite::connect_async(url.as_str()).await.is_err());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections() {
        let server = start(ServerConfig::default()).await;
        let mut client = connect_hub(&server.url("/notificationHub")).await;

        let hub = Arc::clone(&server.hub);
        server.stop().await;

        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match client.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;

        assert!(closed.is_ok());
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_client_session_over_websocket() {
        let server = start(ServerConfig::default()).await;
        server
            .registry
            .create(NewNotification::new("existing", "hi").recipient("u1"))
            .await
            .unwrap();

        let source: Arc<dyn NotificationSource> = server.registry.clone();
        let config = ClientConfig::new(server.url("/notificationHub"))
            .recipient("u1")
            .backoff(Duration::from_millis(10), Duration::from_millis(50));
        let (session, mut events) = ClientSession::connect_ws(config, source);

        let synced = next_session_event(&mut events).await;
        assert_eq!(
            synced,
            SessionEvent::Synced {
                kind: SyncKind::Initial,
                count: 1
            }
        );

        // No wait on the hub here: the session only syncs after `ready`, so
        // its socket is already registered.
        let created = server
            .registry
            .create(NewNotification::new("live", "hi").recipient("u1"))
            .await
            .unwrap();
        assert_eq!(
            next_session_event(&mut events).await,
            SessionEvent::Pushed(created)
        );

        let titles: Vec<String> = session.notifications().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["live", "existing"]);

        session.stop().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_session_registered_before_initial_sync() {
        let server = start(ServerConfig::default()).await;
        let source: Arc<dyn NotificationSource> = server.registry.clone();

        for round in 0..5 {
            let config = ClientConfig::new(server.url("/notificationHub")).recipient("u1");
            let (session, mut events) = ClientSession::connect_ws(config, source.clone());

            assert!(matches!(
                next_session_event(&mut events).await,
                SessionEvent::Synced {
                    kind: SyncKind::Initial,
                    ..
                }
            ));
            assert_eq!(server.hub.connection_count().await, 1);

            let created = server
                .registry
                .create(NewNotification::new(format!("n{round}"), "hi").recipient("u1"))
                .await
                .unwrap();
            assert_eq!(
                next_session_event(&mut events).await,
                SessionEvent::Pushed(created)
            );

            session.stop().await;
            wait_for_disconnect(&server.hub).await;
        }

        server.stop().await;
    }

    async fn wait_for_disconnect(hub: &BroadcastHub) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.connection_count().await != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connection never left the hub");
    }
}
