//! Upgrade responder binary entry point.
//!
//! This is a thin wrapper around the upgrade-responder library that:
//! 1. Parses command-line arguments
//! 2. Initializes logging
//! 3. Validates configuration
//! 4. Starts the server
//!
//! For library usage, see the upgrade-responder crate documentation.

use anyhow::Result;
use upgrade_responder::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Upgrade responder starting...");

    // Parse configuration from CLI args
    let config = ServerConfig::from_args();

    tracing::info!(
        "Configuration loaded: bind={}, releases={:?}, telemetry={}",
        config.http_bind,
        config.upgrade_response_config,
        config.has_telemetry()
    );

    // Validate configuration
    config.validate()?;

    // Create and run server
    let server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
