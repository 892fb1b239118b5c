//! Per-socket WebSocket handling
//!
//! One task per accepted socket: upgrade on the hub path, register with the
//! hub and send `ready`, then forward pushes out and commands in until either
//! side goes away.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::{Result, TransportError};
use crate::hub::{BroadcastHub, ClientCommand, ConnectionHandle, HubEvent};
use crate::registry::NotificationRegistry;
use crate::server::config::ServerConfig;
use crate::store::NotificationStore;

type Sink = SplitSink<WebSocketStream<TcpStream>, Message>;
type Stream = SplitStream<WebSocketStream<TcpStream>>;

/// A single client connection
pub(crate) struct Connection<S: NotificationStore> {
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
    registry: Arc<NotificationRegistry<S>>,
    hub: Arc<BroadcastHub>,
}

impl<S: NotificationStore> Connection<S> {
    pub(crate) fn new(
        peer_addr: SocketAddr,
        config: Arc<ServerConfig>,
        registry: Arc<NotificationRegistry<S>>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            peer_addr,
            config,
            registry,
            hub,
        }
    }

    /// Run the connection to completion
    pub(crate) async fn run(self, socket: TcpStream) -> Result<()> {
        let ws = self.upgrade(socket).await?;

        let mut handle = self.hub.connect().await;
        let id = handle.id();
        tracing::debug!(connection_id = %id, peer = %self.peer_addr, "Hub connection opened");

        let (mut sink, stream) = ws.split();
        let result = match self.send(&mut sink, &HubEvent::Ready).await {
            Ok(()) => self.pump(&mut handle, sink, stream).await,
            Err(e) => Err(e),
        };

        self.hub.disconnect(id).await;
        tracing::debug!(connection_id = %id, "Hub connection closed");
        result
    }

    async fn upgrade(&self, socket: TcpStream) -> Result<WebSocketStream<TcpStream>> {
        let hub_path = self.config.hub_path.as_str();
        let peer_addr = self.peer_addr;

        let check_path = |request: &Request, response: Response| {
            if request.uri().path() == hub_path {
                return Ok(response);
            }
            tracing::debug!(peer = %peer_addr, path = request.uri().path(), "Rejected upgrade");
            let mut rejection = ErrorResponse::new(Some("not found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        };

        let handshake = tokio_tungstenite::accept_hdr_async(socket, check_path);
        let ws = tokio::time::timeout(self.config.handshake_timeout, handshake)
            .await
            .map_err(|_| TransportError::ConnectTimeout)?
            .map_err(TransportError::from)?;
        Ok(ws)
    }

    async fn pump(
        &self,
        handle: &mut ConnectionHandle,
        mut sink: Sink,
        mut stream: Stream,
    ) -> Result<()> {
        loop {
            tokio::select! {
                event = handle.recv() => match event {
                    Some(event) => self.send(&mut sink, &event).await?,
                    None => {
                        // Dropped by the hub: slow consumer or shutdown
                        let _ = sink.send(Message::Close(None)).await;
                        return Ok(());
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_command(&text).await,
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(TransportError::from(e).into()),
                },
            }
        }
    }

    async fn send(&self, sink: &mut Sink, event: &HubEvent) -> Result<()> {
        let text = event.to_json().map_err(TransportError::from)?;

        tokio::time::timeout(self.config.send_timeout, sink.send(Message::Text(text)))
            .await
            .map_err(|_| TransportError::SendTimeout)?
            .map_err(TransportError::from)?;
        Ok(())
    }

    async fn handle_command(&self, text: &str) {
        let command = match ClientCommand::from_json(text) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(peer = %self.peer_addr, error = %e, "Ignoring malformed command");
                return;
            }
        };

        match command {
            ClientCommand::CreateNotification(input) => {
                // The relay pushes the result to every connection, this one included
                if let Err(e) = self.registry.create(input).await {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "Create command failed");
                }
            }
        }
    }
}
