//! Server-side operations a client session depends on
//!
//! The session only needs the unread fetch and the two read-state mutations.
//! In-process callers pass the registry itself; remote callers implement the
//! trait over their HTTP client of choice.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Notification, NotificationId};
use crate::registry::NotificationRegistry;
use crate::store::NotificationStore;

/// Read and read-state operations used by [`ClientSession`](super::ClientSession)
#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// Unread notifications, optionally for one recipient, newest first
    async fn fetch_unread(&self, recipient_id: Option<&str>) -> Result<Vec<Notification>>;

    /// Mark one notification as read
    async fn mark_as_read(&self, id: &NotificationId) -> Result<()>;

    /// Mark all unread notifications (optionally for one recipient) as read
    async fn mark_all_as_read(&self, recipient_id: Option<&str>) -> Result<()>;
}

#[async_trait]
impl<S: NotificationStore> NotificationSource for NotificationRegistry<S> {
    async fn fetch_unread(&self, recipient_id: Option<&str>) -> Result<Vec<Notification>> {
        self.get_unread(recipient_id).await
    }

    async fn mark_as_read(&self, id: &NotificationId) -> Result<()> {
        NotificationRegistry::mark_as_read(self, id).await
    }

    async fn mark_all_as_read(&self, recipient_id: Option<&str>) -> Result<()> {
        NotificationRegistry::mark_all_as_read(self, recipient_id)
            .await
            .map(|_| ())
    }
}
