//! Client session state machine
//!
//! Tracks a client session from start to stop and decides when the local
//! cache must be (re)synchronised from the server.
//!
//! ```text
//!  Disconnected ──start──► Connecting ──handshake──► Connected
//!        ▲                     │                      │    ▲
//!        │                 (retry)            transport│    │handshake
//!        │                                        lost ▼    │ (resync)
//!        └────────────── stop (from any) ───────── Reconnecting
//! ```

use super::cache::NotificationCache;
use crate::model::Notification;

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Not started, or stopped
    Disconnected,
    /// First connection attempt(s) in progress
    Connecting,
    /// Handshake complete, receiving pushes
    Connected,
    /// Transport lost, retrying with backoff
    Reconnecting,
}

/// Which fetch a successful handshake calls for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// First connection of the session
    Initial,
    /// Connection recovered after a loss; cache is replaced wholesale
    Resync,
}

/// Complete client session state
#[derive(Debug)]
pub struct SessionState {
    /// Current phase
    pub phase: SessionPhase,

    /// Local notification cache
    pub cache: NotificationCache,

    /// Set once the session has been connected at least once
    has_connected: bool,

    /// Set by `stop`; a stopped session never restarts
    stopped: bool,

    /// Number of completed resyncs
    pub resyncs: u64,

    /// Number of pushes applied to the cache
    pub pushes_applied: u64,
}

impl SessionState {
    /// Create a new session state
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            cache: NotificationCache::new(),
            has_connected: false,
            stopped: false,
            resyncs: 0,
            pushes_applied: 0,
        }
    }

    /// Begin connecting
    pub fn start(&mut self) -> bool {
        if self.phase == SessionPhase::Disconnected && !self.stopped {
            self.phase = SessionPhase::Connecting;
            true
        } else {
            false
        }
    }

    /// Handshake succeeded
    ///
    /// Returns the fetch the caller must issue, or `None` if the session is
    /// not waiting for a connection (stopped or already connected).
    pub fn on_handshake(&mut self) -> Option<SyncKind> {
        let kind = match self.phase {
            SessionPhase::Connecting if !self.has_connected => SyncKind::Initial,
            SessionPhase::Connecting | SessionPhase::Reconnecting => SyncKind::Resync,
            SessionPhase::Connected | SessionPhase::Disconnected => return None,
        };

        self.phase = SessionPhase::Connected;
        self.has_connected = true;
        Some(kind)
    }

    /// Transport dropped while connected
    pub fn on_transport_lost(&mut self) {
        if self.phase == SessionPhase::Connected {
            self.phase = SessionPhase::Reconnecting;
        }
    }

    /// Replace the cache with fetched notifications
    pub fn apply_sync(&mut self, kind: SyncKind, notifications: Vec<Notification>) -> bool {
        if self.phase != SessionPhase::Connected {
            return false;
        }
        self.cache.replace(notifications);
        if kind == SyncKind::Resync {
            self.resyncs += 1;
        }
        true
    }

    /// Prepend a pushed notification
    ///
    /// Ignored unless connected, and ignored if already cached.
    pub fn apply_push(&mut self, notification: Notification) -> bool {
        if self.phase != SessionPhase::Connected {
            return false;
        }
        let applied = self.cache.prepend(notification);
        if applied {
            self.pushes_applied += 1;
        }
        applied
    }

    /// Stop the session for good
    pub fn stop(&mut self) {
        self.phase = SessionPhase::Disconnected;
        self.stopped = true;
    }

    /// Whether `stop` has been called
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Check if the session is connected
    pub fn is_connected(&self) -> bool {
        self.phase == SessionPhase::Connected
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
