//! Client session configuration

use std::time::Duration;

/// Default hub endpoint
pub const DEFAULT_HUB_URL: &str = "ws://localhost:5174/notificationHub";

/// Client session configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the notification hub
    pub hub_url: String,

    /// Recipient whose unread notifications are fetched and bulk-marked
    pub recipient_id: Option<String>,

    /// First reconnect delay
    pub initial_backoff: Duration,

    /// Upper bound for the reconnect delay
    pub max_backoff: Duration,

    /// Handshake must complete within this time
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hub_url: DEFAULT_HUB_URL.to_string(),
            recipient_id: None,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Create a config for the given hub URL
    pub fn new(hub_url: impl Into<String>) -> Self {
        Self {
            hub_url: hub_url.into(),
            ..Default::default()
        }
    }

    /// Scope the unread fetch and mark-all to one recipient
    pub fn recipient(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = Some(recipient_id.into());
        self
    }

    /// Set reconnect backoff bounds
    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Delay to use after `current`, doubling up to `max_backoff`
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_backoff)
    }
}
