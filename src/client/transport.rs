//! Push transports for client sessions
//!
//! A [`PushTransport`] opens connections; each connection is a [`PushStream`]
//! of hub events. Two implementations are provided:
//!
//! - [`WsTransport`]: WebSocket connection to a [`NotificationServer`](crate::server::NotificationServer)
//! - [`HubTransport`]: direct in-process connection to a [`BroadcastHub`]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Result, TransportError};
use crate::hub::{BroadcastHub, ConnectionHandle, HubEvent};

/// Opens live connections to the hub
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Connect and complete the handshake
    async fn connect(&self) -> Result<Box<dyn PushStream>>;
}

/// An open live connection
#[async_trait]
pub trait PushStream: Send {
    /// Wait for the next event
    ///
    /// `None` means the connection is gone and the caller should reconnect.
    async fn next_event(&mut self) -> Option<Result<HubEvent>>;
}

/// In-process transport registering directly with a hub
#[derive(Clone)]
pub struct HubTransport {
    hub: Arc<BroadcastHub>,
}

impl HubTransport {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl PushTransport for HubTransport {
    async fn connect(&self) -> Result<Box<dyn PushStream>> {
        let handle = self.hub.connect().await;
        Ok(Box::new(HubStream { handle }))
    }
}

// Dropping the handle closes the receiver; the hub deregisters the
// connection on its next broadcast.
struct HubStream {
    handle: ConnectionHandle,
}

#[async_trait]
impl PushStream for HubStream {
    async fn next_event(&mut self) -> Option<Result<HubEvent>> {
        self.handle.recv().await.map(Ok)
    }
}

type WsSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    /// Connect, then wait for the server's `ready` frame
    ///
    /// Returning only after `ready` means the server has registered this
    /// socket with its hub, so a sync fetched afterwards cannot miss a create.
    async fn connect(&self) -> Result<Box<dyn PushStream>> {
        let open = async {
            let (socket, _response) = tokio_tungstenite::connect_async(self.url.as_str())
                .await
                .map_err(TransportError::from)?;
            let (sink, stream) = socket.split();
            let mut ws = WsStream {
                _sink: sink,
                stream,
            };
            ws.wait_ready().await?;
            Ok::<_, crate::error::Error>(ws)
        };

        let ws = tokio::time::timeout(self.connect_timeout, open)
            .await
            .map_err(|_| TransportError::ConnectTimeout)??;

        tracing::debug!(url = %self.url, "WebSocket connected");
        Ok(Box::new(ws))
    }
}

struct WsStream {
    // Held so the socket stays open for writing pongs and the close handshake
    _sink: SplitSink<WsSocket, Message>,
    stream: SplitStream<WsSocket>,
}

impl WsStream {
    async fn wait_ready(&mut self) -> Result<()> {
        match self.next_event().await {
            Some(Ok(HubEvent::Ready)) => Ok(()),
            Some(Ok(event)) => {
                tracing::warn!(?event, "Hub sent an event before ready");
                Err(TransportError::Closed.into())
            }
            Some(Err(e)) => Err(e),
            None => Err(TransportError::Closed.into()),
        }
    }
}

#[async_trait]
impl PushStream for WsStream {
    async fn next_event(&mut self) -> Option<Result<HubEvent>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => match HubEvent::from_json(&text) {
                    Ok(event) => return Some(Ok(event)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring unrecognised hub frame");
                    }
                },
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "WebSocket closed by server");
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::from(e).into())),
            }
        }
    }
}
