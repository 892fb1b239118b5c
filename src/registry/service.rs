//! Registry implementation

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::model::notification::{normalize_recipient, recipient_filter, storage_timestamp};
use crate::model::{
    NewNotification, Notification, NotificationId, NotificationRecord, UpdateNotification,
};
use crate::store::{NotificationStore, StoreError};

/// Default capacity of the registry event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Events emitted after a successful store write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A notification was persisted
    Created(Notification),
}

/// Service layer over a notification store
///
/// Store calls run on the blocking thread pool, so a slow or locked database
/// never holds up the async workers serving live connections.
///
/// Mutations that target a single id (`mark_as_read`, `update`, `delete`) look
/// the record up first and report [`Error::NotFound`] when it is missing. The
/// lookup and the write are separate store calls: if a concurrent delete lands
/// between them the write affects nothing and the call still returns `Ok`.
pub struct NotificationRegistry<S: NotificationStore> {
    store: Arc<S>,
    events: broadcast::Sender<RegistryEvent>,
}

impl<S: NotificationStore> NotificationRegistry<S> {
    /// Create a registry with the default event capacity
    pub fn new(store: S) -> Self {
        Self::with_event_capacity(store, DEFAULT_EVENT_CAPACITY)
    }

    /// Create a registry with a custom event channel capacity
    pub fn with_event_capacity(store: S, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            store: Arc::new(store),
            events,
        }
    }

    /// Access the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Create and persist a notification
    ///
    /// A missing (or zero) `created_at` is stamped with the current UTC time and
    /// `is_read` is always stored as `false`. Returns the record as persisted,
    /// including its new id.
    pub async fn create(&self, input: NewNotification) -> Result<Notification> {
        input.validate()?;

        let created_at = input.supplied_created_at().unwrap_or_else(Utc::now);
        let record = NotificationRecord {
            title: input.title,
            message: input.message,
            recipient_id: normalize_recipient(input.recipient_id),
            created_at: storage_timestamp(created_at),
            is_read: false,
        };

        let notification = self
            .blocking(move |store| {
                let id = store.insert(&record)?;
                Ok(record.with_id(id))
            })
            .await?;

        tracing::info!(
            notification_id = %notification.id,
            recipient = ?notification.recipient_id,
            "Notification created"
        );

        // No receivers is fine: nothing is listening for live delivery yet
        let _ = self.events.send(RegistryEvent::Created(notification.clone()));

        Ok(notification)
    }

    /// All notifications, newest first
    pub async fn get_all(&self) -> Result<Vec<Notification>> {
        self.blocking(|store| Ok(store.find_all()?)).await
    }

    /// Unread notifications, optionally for one recipient, newest first
    ///
    /// A blank recipient id is treated as no filter.
    pub async fn get_unread(&self, recipient_id: Option<&str>) -> Result<Vec<Notification>> {
        let filter = recipient_filter(recipient_id).map(str::to_owned);
        self.blocking(move |store| Ok(store.find_unread(filter.as_deref())?)).await
    }

    /// Look up a single notification
    pub async fn get_by_id(&self, id: &NotificationId) -> Result<Option<Notification>> {
        let id = id.clone();
        self.blocking(move |store| Ok(store.find_by_id(&id)?)).await
    }

    /// Mark one notification as read
    pub async fn mark_as_read(&self, id: &NotificationId) -> Result<()> {
        let id = id.clone();
        self.blocking(move |store| mark_record_read(store, &id)).await
    }

    /// Mark every unread notification (optionally for one recipient) as read
    ///
    /// Returns the number of notifications changed.
    pub async fn mark_all_as_read(&self, recipient_id: Option<&str>) -> Result<usize> {
        let filter = recipient_filter(recipient_id).map(str::to_owned);
        let changed = self
            .blocking(move |store| Ok(store.set_read_where_unread(filter.as_deref())?))
            .await?;

        tracing::debug!(recipient = ?recipient_id, changed, "Marked all as read");
        Ok(changed)
    }

    /// Replace the content of an existing notification
    ///
    /// The id and creation time are kept. `is_read` may be raised but an
    /// already read notification stays read.
    pub async fn update(&self, id: &NotificationId, input: UpdateNotification) -> Result<()> {
        input.validate()?;
        let id = id.clone();
        self.blocking(move |store| replace_record(store, &id, input)).await
    }

    /// Permanently delete a notification
    pub async fn delete(&self, id: &NotificationId) -> Result<()> {
        let id = id.clone();
        self.blocking(move |store| delete_record(store, &id)).await
    }

    /// Run `f` against the store on the blocking thread pool
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&S) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(StoreError::from)?
    }
}

fn require<S: NotificationStore>(store: &S, id: &NotificationId) -> Result<Notification> {
    store
        .find_by_id(id)?
        .ok_or_else(|| Error::NotFound(id.clone()))
}

fn mark_record_read<S: NotificationStore>(store: &S, id: &NotificationId) -> Result<()> {
    require(store, id)?;

    if !store.set_read_by_id(id)? {
        tracing::debug!(notification_id = %id, "Mark-as-read target vanished");
    }
    Ok(())
}

fn replace_record<S: NotificationStore>(
    store: &S,
    id: &NotificationId,
    input: UpdateNotification,
) -> Result<()> {
    let current = require(store, id)?;
    let record = NotificationRecord {
        title: input.title,
        message: input.message,
        recipient_id: normalize_recipient(input.recipient_id),
        created_at: current.created_at,
        is_read: current.is_read || input.is_read,
    };

    if !store.replace_by_id(id, &record)? {
        tracing::debug!(notification_id = %id, "Update target vanished");
    }
    Ok(())
}

fn delete_record<S: NotificationStore>(store: &S, id: &NotificationId) -> Result<()> {
    require(store, id)?;

    if store.delete_by_id(id)? {
        tracing::info!(notification_id = %id, "Notification deleted");
    } else {
        tracing::debug!(notification_id = %id, "Delete target vanished");
    }
    Ok(())
}
