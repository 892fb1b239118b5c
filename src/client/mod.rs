//! Notification client
//!
//! Keeps a local cache of a recipient's notifications reconciled with the
//! server:
//! - One unread fetch on first connect
//! - Pushed `notification-created` events prepended as they arrive
//! - A full resync after every recovered connection
//!
//! The server side is reached through two seams: [`NotificationSource`] for
//! fetches and read-state changes, [`PushTransport`] for live events.

pub mod cache;
pub mod config;
pub mod session;
pub mod source;
pub mod state;
pub mod transport;

pub use cache::NotificationCache;
pub use config::ClientConfig;
pub use session::{ClientSession, SessionEvent};
pub use source::NotificationSource;
pub use state::{SessionPhase, SessionState, SyncKind};
pub use transport::{HubTransport, PushStream, PushTransport, WsTransport};
