//! Broadcast hub for live notification delivery
//!
//! The hub keeps the set of currently connected clients and pushes every
//! newly created notification to all of them. It knows nothing about storage:
//! notifications arrive through [`BroadcastHub::spawn_relay`], which listens on
//! the registry's event channel.
//!
//! # Architecture
//!
//! ```text
//!                           Arc<BroadcastHub>
//!                     ┌──────────────────────────┐
//!   registry events   │ connections: HashMap<Id, │
//!   ──► relay task ──►│   ConnectionEntry {      │
//!                     │     tx: mpsc::Sender,    │
//!                     │   }                      │
//!                     │ >                        │
//!                     └────────────┬─────────────┘
//!                                  │ try_send (never blocks)
//!          ┌───────────────────────┼───────────────────────┐
//!          ▼                       ▼                       ▼
//!   [ConnectionHandle]      [ConnectionHandle]      [ConnectionHandle]
//!      rx.recv()               rx.recv()               rx.recv()
//!          │                       │                       │
//!          └──► WebSocket ──►  client sessions  ◄── in-process transport
//! ```
//!
//! # Delivery policy
//!
//! Delivery is best-effort. Each connection has a bounded buffer; a connection
//! whose buffer is full is considered slow and is dropped from the hub instead
//! of stalling delivery to everyone else. Dropped clients reconnect and resync
//! from the store.

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;

pub use broadcast::{BroadcastHub, BroadcastReport};
pub use config::HubConfig;
pub use connection::{ConnectionHandle, ConnectionId};
pub use error::DeliveryFailure;
pub use event::{ClientCommand, HubEvent};
