//! recordnet - shared record collection server
//!
//! Serves an in-memory record collection over a length-prefixed TCP
//! request/response protocol.

use recordnet_collection::CollectionDispatcher;
use recordnet_server::{Config, Server};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if RECORDNET_CONFIG is set, then env overrides)
    let config_path = std::env::var("RECORDNET_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(path) = &config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Starting recordnet server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);
    tracing::info!("  Max frame size: {} bytes", config.limits.max_frame_bytes);

    let dispatcher = Arc::new(CollectionDispatcher::new());
    let server = Arc::new(Server::new(config.to_server_config(), dispatcher));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    let stats = server.stats().snapshot();
    tracing::info!(
        "Server stopped ({} connections, {} requests served)",
        stats.connections_total,
        stats.requests_total
    );
    Ok(())
}
