//! Notification data model
//!
//! [`Notification`] is the only entity. [`NewNotification`] and
//! [`UpdateNotification`] are the caller-facing inputs; [`NotificationRecord`]
//! is what the store persists before an id is attached.

pub mod notification;

pub use notification::{
    NewNotification, Notification, NotificationId, NotificationRecord, UpdateNotification,
    ValidationError,
};
