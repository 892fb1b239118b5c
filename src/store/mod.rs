//! Durable notification storage
//!
//! [`NotificationStore`] is the persistence seam used by the registry. Every
//! operation is atomic on its own; nothing spans multiple calls.
//!
//! Listing operations return records ordered by `created_at` descending, with
//! ties broken by insertion order.

mod migrations;
pub mod sqlite;

use thiserror::Error;

use crate::model::{Notification, NotificationId, NotificationRecord};

pub use sqlite::SqliteStore;

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures of the backing database
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("database connection poisoned")]
    Poisoned,
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
    #[error("store worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Persistence contract for notification records
///
/// Implementations may block. The registry only calls them from
/// `spawn_blocking` threads.
pub trait NotificationStore: Send + Sync + 'static {
    /// Persist a record and return its newly assigned id
    fn insert(&self, record: &NotificationRecord) -> StoreResult<NotificationId>;

    /// All records, newest first
    fn find_all(&self) -> StoreResult<Vec<Notification>>;

    /// Unread records, optionally restricted to one recipient, newest first
    fn find_unread(&self, recipient_id: Option<&str>) -> StoreResult<Vec<Notification>>;

    /// Point lookup
    fn find_by_id(&self, id: &NotificationId) -> StoreResult<Option<Notification>>;

    /// Replace every field except the id. Returns `false` if `id` is absent.
    fn replace_by_id(&self, id: &NotificationId, record: &NotificationRecord)
        -> StoreResult<bool>;

    /// Set `is_read` on one record. Returns `false` if `id` is absent.
    fn set_read_by_id(&self, id: &NotificationId) -> StoreResult<bool>;

    /// Set `is_read` on every unread record matching the recipient filter
    ///
    /// Returns the number of records changed.
    fn set_read_where_unread(&self, recipient_id: Option<&str>) -> StoreResult<usize>;

    /// Hard delete. Returns `false` if `id` is absent.
    fn delete_by_id(&self, id: &NotificationId) -> StoreResult<bool>;
}
