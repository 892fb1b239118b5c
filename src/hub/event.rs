//! Real-time wire messages
//!
//! Server to client: [`HubEvent`], tagged by `event`.
//! Client to server: [`ClientCommand`], tagged by `command`.
//!
//! ```text
//! {"event":"ready"}
//! {"event":"notification-created","data":{"id":"..","title":"..",...}}
//! {"command":"create-notification","title":"..","message":"..","recipientId":".."}
//! ```

use serde::{Deserialize, Serialize};

use crate::model::{NewNotification, Notification};

/// Event pushed to every live connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum HubEvent {
    /// First frame on a socket, sent once the connection is registered with
    /// the hub. Every create after it is pushed on this socket.
    Ready,

    /// A notification was created and persisted
    NotificationCreated(Notification),
}

impl HubEvent {
    /// Encode as a JSON text frame
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode from a JSON text frame
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Command a connected client may send to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ClientCommand {
    /// Create a notification and broadcast it to everyone
    CreateNotification(NewNotification),
}

impl ClientCommand {
    /// Decode from a JSON text frame
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
