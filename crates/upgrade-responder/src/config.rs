//! Server configuration management.
//!
//! Configuration is loaded from CLI arguments with environment-variable
//! fallbacks (`UPGRADE_RESPONDER_*`) and validated for consistency before
//! any resource is acquired.
//!
//! # Example
//!
//! ```no_run
//! use upgrade_responder::ServerConfig;
//!
//! let config = ServerConfig::from_args();
//! config.validate().expect("Invalid configuration");
//!
//! println!("HTTP server will bind to: {}", config.http_bind);
//! println!("Telemetry enabled: {}", config.has_telemetry());
//! ```

use crate::error::ConfigError;
use crate::response::UpgradePolicy;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration loaded from CLI args and environment variables.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "upgrade-responder",
    about = "Release version-check service with anonymized usage telemetry",
    version
)]
pub struct ServerConfig {
    /// HTTP bind address
    #[arg(
        long,
        env = "UPGRADE_RESPONDER_HTTP_BIND",
        default_value = "0.0.0.0:8314"
    )]
    pub http_bind: SocketAddr,

    /// Path to the JSON document listing the known releases
    #[arg(
        long,
        env = "UPGRADE_RESPONDER_CONFIG",
        default_value = "./upgrade-responder.json"
    )]
    pub upgrade_response_config: PathBuf,

    /// Path to the MaxMind-format geolocation database
    #[arg(
        long,
        env = "UPGRADE_RESPONDER_GEODB",
        default_value = "./GeoLite2-City.mmdb"
    )]
    pub geodb: PathBuf,

    /// Telemetry sink endpoint; telemetry is disabled when unset
    #[arg(long, env = "UPGRADE_RESPONDER_INFLUXDB_URL")]
    pub influxdb_url: Option<String>,

    /// Telemetry sink username
    #[arg(long, env = "UPGRADE_RESPONDER_INFLUXDB_USER")]
    pub influxdb_user: Option<String>,

    /// Telemetry sink password (requires a username)
    #[arg(long, env = "UPGRADE_RESPONDER_INFLUXDB_PASS")]
    pub influxdb_pass: Option<String>,

    /// Which versions to report to a requester
    #[arg(
        long,
        env = "UPGRADE_RESPONDER_UPGRADE_POLICY",
        value_enum,
        default_value = "always-latest"
    )]
    pub upgrade_policy: UpgradePolicy,
}

impl ServerConfig {
    /// Parse configuration from command-line arguments.
    #[must_use]
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Check if a telemetry sink is configured.
    #[must_use]
    pub const fn has_telemetry(&self) -> bool {
        self.influxdb_url.is_some()
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The release config document doesn't exist
    /// - The geolocation database doesn't exist
    /// - Sink credentials are provided without an endpoint, or a password
    ///   without a username
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.upgrade_response_config.exists() {
            return Err(ConfigError::MissingRequired(format!(
                "release config not found: {}",
                self.upgrade_response_config.display()
            )));
        }

        if !self.geodb.exists() {
            return Err(ConfigError::MissingRequired(format!(
                "geolocation database not found: {}",
                self.geodb.display()
            )));
        }

        if self.influxdb_url.is_none()
            && (self.influxdb_user.is_some() || self.influxdb_pass.is_some())
        {
            return Err(ConfigError::Credentials(
                "sink credentials provided without --influxdb-url".to_string(),
            ));
        }

        if self.influxdb_pass.is_some() && self.influxdb_user.is_none() {
            return Err(ConfigError::Credentials(
                "sink password provided without a username".to_string(),
            ));
        }

        Ok(())
    }
}
