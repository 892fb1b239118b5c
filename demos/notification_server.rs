//! Notification server
//!
//! Serves the notification hub over WebSocket, backed by a SQLite file.
//!
//! Usage:
//!   cargo run --example notification_server
//!
//! Configure with NOTIFY_BIND_ADDR, NOTIFY_DB_PATH, NOTIFY_HUB_PATH and
//! NOTIFY_MAX_CONNECTIONS; log level with RUST_LOG.
//!
//! Connect with any WebSocket client:
//!   websocat ws://localhost:5174/notificationHub
//!
//! and create a notification by sending:
//!   {"command":"create-notification","title":"Hello","message":"World"}

use std::sync::Arc;
use std::time::Duration;

use notify_rs::server::{NotificationServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("notify_rs=info")),
        )
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        addr = %config.bind_addr,
        db = %config.database_path.display(),
        "Starting notification server"
    );

    let server = NotificationServer::open(config)?;

    let hub = Arc::clone(server.hub());
    let stats = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        interval.tick().await;
        loop {
            interval.tick().await;
            let stats = hub.stats().await;
            tracing::info!(
                active = stats.active_connections,
                total = stats.total_connections,
                broadcasts = stats.broadcasts,
                fanout = format!("{:.1}", stats.fanout()),
                slow = stats.slow_disconnects,
                "Hub stats"
            );
        }
    });

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    stats.abort();
    Ok(())
}
