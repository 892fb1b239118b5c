//! Notification server
//!
//! Accepts TCP connections, upgrades those addressed to the hub path to
//! WebSocket and registers them with the [`BroadcastHub`](crate::hub::BroadcastHub).

pub mod config;
mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::NotificationServer;
