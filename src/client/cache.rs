//! Local notification cache
//!
//! Pushes are prepended without re-sorting; [`NotificationCache::sorted`]
//! produces the newest-first view used for display.

use crate::model::{Notification, NotificationId};

/// A client's local copy of its notifications
#[derive(Debug, Clone, Default)]
pub struct NotificationCache {
    items: Vec<Notification>,
}

impl NotificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole cache with a fresh fetch
    pub fn replace(&mut self, mut items: Vec<Notification>) {
        sort_newest_first(&mut items);
        self.items = items;
    }

    /// Add a pushed notification at the front
    ///
    /// Returns `false` if a notification with the same id is already cached.
    pub fn prepend(&mut self, notification: Notification) -> bool {
        if self.contains(&notification.id) {
            return false;
        }
        self.items.insert(0, notification);
        true
    }

    /// Set the read flag on one cached notification
    pub fn mark_read(&mut self, id: &NotificationId) -> bool {
        match self.items.iter_mut().find(|n| &n.id == id) {
            Some(n) => {
                n.is_read = true;
                true
            }
            None => false,
        }
    }

    /// Set the read flag on every cached notification
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for n in self.items.iter_mut().filter(|n| !n.is_read) {
            n.is_read = true;
            changed += 1;
        }
        changed
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.items.iter().any(|n| &n.id == id)
    }

    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.items.iter().find(|n| &n.id == id)
    }

    /// Entries in storage order (most recent push first)
    pub fn entries(&self) -> &[Notification] {
        &self.items
    }

    /// Entries sorted by creation time, newest first
    pub fn sorted(&self) -> Vec<Notification> {
        let mut items = self.items.clone();
        sort_newest_first(&mut items);
        items
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.is_read).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// Stable: equal timestamps keep their relative order
fn sort_newest_first(items: &mut [Notification]) {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
