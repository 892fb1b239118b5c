//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::hub::HubConfig;

/// Default listen port
pub const DEFAULT_PORT: u16 = 5174;

/// Default WebSocket path of the notification hub
pub const DEFAULT_HUB_PATH: &str = "/notificationHub";

/// Default SQLite database file
pub const DEFAULT_DATABASE_PATH: &str = "notifications.db";

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Request path accepted for WebSocket upgrades
    pub hub_path: String,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Handshake must complete within this time
    pub handshake_timeout: Duration,

    /// A push not accepted by the socket within this time closes the connection
    pub send_timeout: Duration,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Per-connection hub settings
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            hub_path: DEFAULT_HUB_PATH.to_string(),
            max_connections: 0, // Unlimited
            handshake_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Build a config from `NOTIFY_*` environment variables
    ///
    /// Unset variables keep their defaults; unparseable ones are logged and
    /// ignored.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `NOTIFY_BIND_ADDR` | `bind_addr` |
    /// | `NOTIFY_DB_PATH` | `database_path` |
    /// | `NOTIFY_HUB_PATH` | `hub_path` |
    /// | `NOTIFY_MAX_CONNECTIONS` | `max_connections` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("NOTIFY_BIND_ADDR") {
            match addr.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => tracing::warn!(value = %addr, error = %e, "Ignoring NOTIFY_BIND_ADDR"),
            }
        }
        if let Some(path) = lookup("NOTIFY_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("NOTIFY_HUB_PATH") {
            config = config.hub_path(path);
        }
        if let Some(max) = lookup("NOTIFY_MAX_CONNECTIONS") {
            match max.parse() {
                Ok(max) => config.max_connections = max,
                Err(e) => {
                    tracing::warn!(value = %max, error = %e, "Ignoring NOTIFY_MAX_CONNECTIONS")
                }
            }
        }

        config
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the hub path; a missing leading `/` is added
    pub fn hub_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.hub_path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the database file
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set hub settings
    pub fn hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }
}
