//! Server state management and orchestration.
//!
//! Assembles the immutable catalog, the response generator and the
//! telemetry pipeline into shared state, and runs the HTTP server until
//! a shutdown signal arrives.

use crate::catalog::VersionCatalog;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::geoip::LocationResolver;
use crate::response::{ResponseGenerator, UpgradePolicy};
use crate::telemetry::{InfluxSink, TelemetryRecorder};
use std::sync::Arc;

/// Shared application state for request handlers.
///
/// Built once at startup; every request task sees the same immutable
/// catalog and the same shared geolocation and sink handles. Dropping the
/// state releases both handles.
#[derive(Debug, Clone)]
pub struct AppState {
    catalog: Arc<VersionCatalog>,
    generator: ResponseGenerator,
    telemetry: TelemetryRecorder,
}

impl AppState {
    /// Create application state from configuration, acquiring all shared
    /// resources.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the catalog fails validation, the
    /// geolocation database cannot be opened, or a configured telemetry
    /// sink cannot be prepared. Any failure aborts startup; resources
    /// acquired before the failure are released on drop.
    pub async fn new(config: &ServerConfig) -> Result<Self, ServerError> {
        tracing::info!(
            "Loading release config from {:?}",
            config.upgrade_response_config
        );
        let catalog = Arc::new(VersionCatalog::from_file(&config.upgrade_response_config)?);
        tracing::info!(
            "Loaded {} versions, latest is {}",
            catalog.len(),
            catalog.latest().map_or("unknown", |version| version.name.as_str())
        );

        let resolver = Arc::new(LocationResolver::open(&config.geodb)?);

        let sink = match config.influxdb_url.as_deref() {
            Some(url) => {
                let sink = InfluxSink::new(
                    url,
                    config.influxdb_user.clone(),
                    config.influxdb_pass.clone(),
                )?;
                sink.ensure_database().await?;
                tracing::info!("Telemetry sink ready at {url}");
                Some(sink)
            }
            None => {
                tracing::info!("No telemetry sink configured, points will not be emitted");
                None
            }
        };

        let telemetry = TelemetryRecorder::new(sink, Some(resolver));
        Ok(Self::with_components(catalog, config.upgrade_policy, telemetry))
    }

    /// Assemble state from already-built components.
    ///
    /// Used by tests and embedders that manage resources themselves.
    #[must_use]
    pub fn with_components(
        catalog: Arc<VersionCatalog>,
        policy: UpgradePolicy,
        telemetry: TelemetryRecorder,
    ) -> Self {
        let generator = ResponseGenerator::new(Arc::clone(&catalog), policy);
        Self {
            catalog,
            generator,
            telemetry,
        }
    }

    /// The validated release catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<VersionCatalog> {
        &self.catalog
    }

    /// The response generator.
    #[must_use]
    pub fn generator(&self) -> &ResponseGenerator {
        &self.generator
    }

    /// The telemetry recorder.
    #[must_use]
    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }
}

/// Server orchestration.
pub struct Server {
    state: Arc<AppState>,
    config: ServerConfig,
}

impl Server {
    /// Create a new server with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if state construction fails.
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let state = AppState::new(&config).await?;
        Ok(Self {
            state: Arc::new(state),
            config,
        })
    }

    /// Run the server until a shutdown signal arrives.
    ///
    /// In-flight requests are drained before the shared state (and with
    /// it the geolocation reader and the sink client) is dropped.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the server errors out.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Starting upgrade responder");

        crate::http::start_server(self.config.http_bind, self.state, shutdown_signal()).await?;

        tracing::debug!("Geolocation database and telemetry sink released");
        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Get shared application state (for testing).
    #[cfg(test)]
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

/// Resolves once a shutdown signal is received.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received, draining requests"),
        Err(err) => {
            // Without a working signal handler the server cannot shut
            // down cleanly; keep serving rather than exiting at once.
            tracing::error!("Failed to listen for shutdown signal: {err}");
            std::future::pending::<()>().await;
        }
    }
}
