//! Hub configuration

/// Default number of events buffered per connection
pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

/// Broadcast hub configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Events buffered per connection before it is considered slow and dropped
    pub connection_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
        }
    }
}

impl HubConfig {
    /// Set the per-connection buffer size (minimum 1)
    pub fn connection_buffer(mut self, size: usize) -> Self {
        self.connection_buffer = size.max(1);
        self
    }
}
