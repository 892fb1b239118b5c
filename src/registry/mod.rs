//! Notification registry
//!
//! Business rules between callers (API, real-time server, client sessions)
//! and the [`NotificationStore`](crate::store::NotificationStore).
//!
//! ```text
//!   create() ──► validate ──► stamp defaults ──► store.insert()
//!                                                    │
//!                                     RegistryEvent::Created
//!                                                    │
//!                                   broadcast::Sender ┴──► hub relay ──► connections
//! ```
//!
//! The registry never talks to the hub directly. Anything interested in new
//! notifications calls [`NotificationRegistry::subscribe`].

pub mod service;

pub use service::{NotificationRegistry, RegistryEvent};
