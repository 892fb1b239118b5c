//! Notification entity and input types

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Sub-second digits kept by the store (microseconds)
pub const TIMESTAMP_PRECISION: u16 = 6;

/// Opaque notification identifier
///
/// Assigned by the store at insert time and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NotificationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NotificationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A persisted notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Store-assigned identifier
    pub id: NotificationId,
    /// Short title
    pub title: String,
    /// Body text
    pub message: String,
    /// Target recipient; `None` means everyone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    /// Creation time (UTC), set once
    pub created_at: DateTime<Utc>,
    /// Read flag, only ever raised
    pub is_read: bool,
}

impl Notification {
    /// Whether this notification is addressed to `recipient_id`
    ///
    /// A `None` filter matches every notification.
    pub fn matches_recipient(&self, recipient_id: Option<&str>) -> bool {
        match recipient_id {
            Some(wanted) => self.recipient_id.as_deref() == Some(wanted),
            None => true,
        }
    }
}

/// Notification fields without an id, as handed to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub title: String,
    pub message: String,
    pub recipient_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl NotificationRecord {
    /// Attach a store-assigned id
    pub fn with_id(self, id: NotificationId) -> Notification {
        Notification {
            id,
            title: self.title,
            message: self.message,
            recipient_id: self.recipient_id,
            created_at: self.created_at,
            is_read: self.is_read,
        }
    }
}

impl From<&Notification> for NotificationRecord {
    fn from(n: &Notification) -> Self {
        Self {
            title: n.title.clone(),
            message: n.message.clone(),
            recipient_id: n.recipient_id.clone(),
            created_at: n.created_at,
            is_read: n.is_read,
        }
    }
}

/// Input for creating a notification
///
/// `created_at` and `is_read` are accepted so that callers can send a full
/// record, but the registry overrides them: a missing timestamp is stamped
/// with the server clock and `is_read` is always reset to `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_read: bool,
}

impl NewNotification {
    /// Create an input with title and message
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Address the notification to a recipient
    pub fn recipient(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = Some(recipient_id.into());
        self
    }

    /// Supply an explicit creation time
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Check required fields
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_text(&self.title, &self.message)
    }

    /// Caller-supplied timestamp, treating the zero value as unset
    pub(crate) fn supplied_created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.filter(|ts| *ts != DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Input for a full replace of an existing notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotification {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
}

impl UpdateNotification {
    /// Check required fields
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_text(&self.title, &self.message)
    }
}

/// Rejection reasons for notification input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title is required")]
    MissingTitle,
    #[error("message is required")]
    MissingMessage,
}

fn validate_text(title: &str, message: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::MissingTitle);
    }
    if message.trim().is_empty() {
        return Err(ValidationError::MissingMessage);
    }
    Ok(())
}

/// Blank recipient ids mean "no recipient"
pub(crate) fn normalize_recipient(recipient_id: Option<String>) -> Option<String> {
    recipient_id.filter(|r| !r.trim().is_empty())
}

/// Borrowing form of [`normalize_recipient`] for query filters
pub(crate) fn recipient_filter(recipient_id: Option<&str>) -> Option<&str> {
    recipient_id.filter(|r| !r.trim().is_empty())
}

/// Round a timestamp down to what the store can represent
pub(crate) fn storage_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(TIMESTAMP_PRECISION)
}
