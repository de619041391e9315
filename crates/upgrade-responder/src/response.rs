//! Check-upgrade response generation.
//!
//! The generator is a pure lookup against the immutable catalog. Which
//! versions it reports is decided by an [`UpgradePolicy`] chosen at
//! construction time.

use crate::catalog::{TAG_LATEST, Version, VersionCatalog, parse_semver};
use crate::error::ResponseError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An upgrade check sent by a deployed instance.
///
/// Both fields are client-reported free text. They are recorded in
/// telemetry but never trusted: malformed or empty values must not fail
/// the request.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CheckUpgradeRequest {
    /// Product version reported by the client
    #[serde(rename = "longhornVersion")]
    pub longhorn_version: String,

    /// Orchestrator version reported by the client
    #[serde(rename = "kubernetesVersion")]
    pub kubernetes_version: String,
}

/// The set of versions reported back to a requester.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CheckUpgradeResponse {
    /// Versions the client may upgrade to
    #[serde(rename = "versions")]
    pub versions: Vec<Version>,
}

/// How the generator decides which versions to report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UpgradePolicy {
    /// Always report the latest version, regardless of what the client runs
    #[default]
    AlwaysLatest,

    /// Report the latest version only when the client is behind it
    OnlyIfBehind,
}

/// Generates check-upgrade responses from the catalog.
#[derive(Debug, Clone)]
pub struct ResponseGenerator {
    catalog: Arc<VersionCatalog>,
    policy: UpgradePolicy,
}

impl ResponseGenerator {
    /// Create a generator over the given catalog with the given policy.
    #[must_use]
    pub fn new(catalog: Arc<VersionCatalog>, policy: UpgradePolicy) -> Self {
        Self { catalog, policy }
    }

    /// The catalog this generator reads from.
    #[must_use]
    pub fn catalog(&self) -> &Arc<VersionCatalog> {
        &self.catalog
    }

    /// Generate the response for one upgrade check.
    ///
    /// # Errors
    ///
    /// Returns `ResponseError` if the `latest` tag cannot be resolved.
    /// The catalog guarantees this cannot happen after a successful
    /// startup; such a failure is logged as a bug and surfaced to the
    /// handler.
    pub fn generate(
        &self,
        request: &CheckUpgradeRequest,
    ) -> Result<CheckUpgradeResponse, ResponseError> {
        let (latest_parsed, latest) = self.tagged_version(TAG_LATEST).inspect_err(|err| {
            tracing::error!("BUG: unable to get a valid version for tag {TAG_LATEST}: {err}");
        })?;

        let versions = match self.policy {
            UpgradePolicy::AlwaysLatest => vec![latest.clone()],
            UpgradePolicy::OnlyIfBehind => {
                let client = parse_semver(&request.longhorn_version).unwrap_or_else(|err| {
                    // Clients with an unparseable version are assumed to
                    // predate semantic versioning and always get the latest.
                    tracing::warn!(
                        "Invalid version in request: {:?}: {err}, responding with the latest version",
                        request.longhorn_version
                    );
                    semver::Version::new(0, 0, 1)
                });
                if client < latest_parsed {
                    vec![latest.clone()]
                } else {
                    Vec::new()
                }
            }
        };

        Ok(CheckUpgradeResponse { versions })
    }

    /// Resolve a tag to its version, parsed and raw.
    fn tagged_version(&self, tag: &str) -> Result<(semver::Version, &Version), ResponseError> {
        let version = self
            .catalog
            .by_tag(tag)
            .ok_or_else(|| ResponseError::TagNotFound(tag.to_string()))?;
        let parsed = version
            .semver()
            .map_err(|source| ResponseError::InvalidTaggedVersion {
                name: version.name.clone(),
                tag: tag.to_string(),
                source,
            })?;
        Ok((parsed, version))
    }
}
