//! Upgrade responder service.
//!
//! A small backend that tells deployed instances of a storage product
//! whether a newer release exists, and opportunistically records
//! anonymized usage telemetry (approximate location, reported component
//! versions) for each check.
//!
//! # Architecture
//!
//! The server uses a library-first design with the following components:
//! - `catalog`: validated, immutable index of known releases
//! - `response`: check-upgrade response generation policies
//! - `geoip`: coarse IP geolocation for telemetry enrichment
//! - `telemetry`: best-effort metric-point pipeline
//! - `config`: CLI/environment configuration
//! - `http`: axum router and request handlers
//! - `server`: state assembly and lifecycle
//!
//! # Example
//!
//! ```no_run
//! use upgrade_responder::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Initialize logging
//!     tracing_subscriber::fmt::init();
//!
//!     // Load configuration from CLI args and environment
//!     let config = ServerConfig::from_args();
//!     config.validate()?;
//!
//!     // Create and run server
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Failure isolation
//!
//! The telemetry pipeline is strictly best-effort: location resolution
//! and point emission may fail per request, and neither the HTTP status
//! nor the body of the client-visible response ever changes because of
//! it. Catalog validation, by contrast, is all-or-nothing at startup.

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

// Module declarations
pub mod catalog;
pub mod config;
pub mod error;
pub mod geoip;
pub mod http;
pub mod response;
pub mod server;
pub mod telemetry;

// Re-exports for public API
pub use catalog::{ReleaseConfig, Version, VersionCatalog};
pub use config::ServerConfig;
pub use error::{
    CatalogError, ConfigError, LocationError, ResponseError, ServerError, TelemetryError,
};
pub use geoip::{Location, LocationResolver};
pub use response::{CheckUpgradeRequest, CheckUpgradeResponse, ResponseGenerator, UpgradePolicy};
pub use server::{AppState, Server};
pub use telemetry::{InfluxSink, MetricPoint, TelemetryRecorder};
