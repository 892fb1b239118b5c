//! # notify-rs
//!
//! Persistent notifications with real-time fan-out.
//!
//! - [`store`]: durable notification records in SQLite
//! - [`registry`]: validation, defaults and the create event stream
//! - [`hub`]: live connection set, best-effort push to every connection
//! - [`server`]: WebSocket endpoint bridging the registry and the hub
//! - [`api`]: REST operations as plain request/response calls
//! - [`client`]: a client's cache kept in sync through pushes and resyncs
//!
//! ```text
//! create ──► NotificationRegistry ──► NotificationStore
//!                   │ Created event
//!                   ▼
//!             BroadcastHub ──► every live connection ──► ClientSession cache
//! ```
//!
//! ## Running a server
//!
//! ```no_run
//! use notify_rs::server::{NotificationServer, ServerConfig};
//!
//! # async fn run() -> notify_rs::Result<()> {
//! let server = NotificationServer::open(ServerConfig::from_env())?;
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await
//! # }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod hub;
pub mod model;
pub mod registry;
pub mod server;
pub mod stats;
pub mod store;

pub use error::{Error, Result};
pub use model::{NewNotification, Notification, NotificationId, UpdateNotification};
