//! Error types for the upgrade responder.
//!
//! All errors use thiserror for consistent error handling across the codebase.

use std::path::PathBuf;
use thiserror::Error;

/// Version catalog construction errors.
///
/// Every variant is fatal to process startup: the service never serves a
/// partially validated catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Failed to read the release config document
    #[error("Failed to read release config from {path}: {source}")]
    LoadFailed {
        /// Path to the release config document
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid JSON in the release config document
    #[error("Invalid JSON in release config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A version entry carries no tags
    #[error("Version {name} has an empty tag list")]
    EmptyTags {
        /// Name of the offending entry
        name: String,
    },

    /// Two entries share the same name
    #[error("Duplicate version name {0}")]
    DuplicateName(String),

    /// A version name does not parse as a semantic version
    #[error("Version name {name} is not a valid semantic version: {source}")]
    InvalidVersion {
        /// Name of the offending entry
        name: String,
        /// Underlying parse error
        #[source]
        source: semver::Error,
    },

    /// A release date does not parse as RFC3339
    #[error("Release date {date} of version {name} is not RFC3339: {source}")]
    InvalidReleaseDate {
        /// Name of the offending entry
        name: String,
        /// The unparseable date string
        date: String,
        /// Underlying parse error
        #[source]
        source: chrono::ParseError,
    },

    /// A tag is claimed by more than one version
    #[error("Duplicate tag {0}")]
    DuplicateTag(String),

    /// No entry claims the reserved "latest" tag
    #[error("No version is tagged latest")]
    MissingLatest,
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required configuration value
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Telemetry sink credential pairing error
    #[error("Telemetry sink credential error: {0}")]
    Credentials(String),
}

/// Geolocation resolution errors.
///
/// Only `OpenFailed` is fatal (at startup); every other variant is
/// best-effort and stays inside the telemetry pipeline.
#[derive(Debug, Error)]
pub enum LocationError {
    /// Failed to open the geolocation database file
    #[error("Failed to open geolocation database {path}: {source}")]
    OpenFailed {
        /// Path to the database file
        path: PathBuf,
        /// Underlying reader error
        #[source]
        source: maxminddb::MaxMindDBError,
    },

    /// The input does not parse as an IP address
    #[error("Invalid IP address {address:?}: {source}")]
    InvalidAddress {
        /// The unparseable input
        address: String,
        /// Underlying parse error
        #[source]
        source: std::net::AddrParseError,
    },

    /// Database lookup failed (including lookup misses)
    #[error("Geolocation lookup failed: {0}")]
    Lookup(#[from] maxminddb::MaxMindDBError),
}

/// Response generation errors.
///
/// The catalog guarantees these cannot occur after a successful startup;
/// seeing one at runtime is a logic bug.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// No version is registered under the requested tag
    #[error("Cannot find version with tag {0}")]
    TagNotFound(String),

    /// The tagged version's name no longer parses as a semantic version
    #[error("Version {name} is not valid with tag {tag}: {source}")]
    InvalidTaggedVersion {
        /// Name of the tagged version
        name: String,
        /// The tag it was looked up under
        tag: String,
        /// Underlying parse error
        #[source]
        source: semver::Error,
    },
}

/// Telemetry sink errors.
///
/// Fatal at startup (`ensure_database`), best-effort afterwards.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The sink endpoint URL is invalid
    #[error("Invalid telemetry sink URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The sink request could not be sent
    #[error("Telemetry sink request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The sink answered with a non-success status
    #[error("Telemetry sink rejected {operation}: HTTP {status}")]
    Rejected {
        /// What was attempted ("database creation", "point write")
        operation: &'static str,
        /// HTTP status returned by the sink
        status: reqwest::StatusCode,
    },

    /// The metric point carries no fields
    #[error("Metric point has no fields")]
    NoFields,

    /// The metric timestamp does not fit the wire representation
    #[error("Metric timestamp out of range")]
    TimestampOutOfRange,
}

/// Server runtime errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the HTTP listener
    #[error("Failed to bind HTTP server to {addr}: {source}")]
    BindFailed {
        /// Address that failed to bind
        addr: std::net::SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Catalog construction error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Geolocation database error
    #[error("Geolocation error: {0}")]
    Location(#[from] LocationError),

    /// Telemetry sink error
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// Server shutdown error
    #[error("Server shutdown error: {0}")]
    Shutdown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_messages() {
        let err = CatalogError::DuplicateTag("latest".to_string());
        assert_eq!(err.to_string(), "Duplicate tag latest");

        let err = CatalogError::MissingLatest;
        assert_eq!(err.to_string(), "No version is tagged latest");
    }

    #[test]
    fn test_response_error_message() {
        let err = ResponseError::TagNotFound("latest".to_string());
        assert_eq!(err.to_string(), "Cannot find version with tag latest");
    }

    #[test]
    fn test_server_error_conversion() {
        let catalog_err = CatalogError::DuplicateName("v1.0.0".to_string());
        let server_err: ServerError = catalog_err.into();
        assert!(server_err.to_string().contains("Duplicate version name"));
    }
}
