//! Version catalog management.
//!
//! Loads the set of known releases from a JSON document, validates it and
//! indexes it by name and by tag. The catalog is built once at startup and
//! shared read-only across all request tasks.

use crate::error::CatalogError;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Reserved tag that must resolve to exactly one version.
pub const TAG_LATEST: &str = "latest";

/// A single known release.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Version {
    /// Release name; must be a semantic version (a leading `v` is accepted)
    #[serde(rename = "Name")]
    pub name: String,

    /// RFC3339 release timestamp, stored verbatim once validated
    #[serde(rename = "ReleaseDate")]
    pub release_date: String,

    /// Labels attached to this release; each tag is globally unique
    /// across the catalog
    #[serde(rename = "Tags")]
    pub tags: Vec<String>,
}

impl Version {
    /// Parse the release name as a semantic version.
    pub fn semver(&self) -> Result<semver::Version, semver::Error> {
        parse_semver(&self.name)
    }
}

/// Parse a version string, tolerating the leading `v` releases are
/// published under (e.g. "v1.5.0").
pub(crate) fn parse_semver(version: &str) -> Result<semver::Version, semver::Error> {
    semver::Version::parse(version.strip_prefix('v').unwrap_or(version))
}

/// The startup configuration document listing all known releases.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReleaseConfig {
    /// Known releases, in document order
    #[serde(rename = "Versions")]
    pub versions: Vec<Version>,
}

/// Validated, immutable catalog of known releases.
///
/// Construction either validates every entry or fails identifying the
/// offending one. There is no mutation API: the indexes are fixed for the
/// process lifetime and concurrent reads need no locking.
#[derive(Debug)]
pub struct VersionCatalog {
    versions: Vec<Version>,
    by_name: HashMap<String, usize>,
    by_tag: HashMap<String, usize>,
}

impl VersionCatalog {
    /// Load and validate a catalog from a JSON release config document.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the file cannot be read, the JSON is
    /// malformed, or any validation step fails.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let file = File::open(path).map_err(|source| CatalogError::LoadFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let reader = BufReader::new(file);
        let config: ReleaseConfig = serde_json::from_reader(reader)?;
        Self::from_config(config)
    }

    /// Validate a release config and build the catalog indexes.
    ///
    /// Validation runs per entry in document order and short-circuits on
    /// the first failure: empty tag list, duplicate name, unparseable
    /// semantic version, unparseable release date, then tag collisions
    /// (case-sensitive, across all entries). After all entries are
    /// registered the reserved `latest` tag must have been claimed.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` identifying the offending entry.
    pub fn from_config(config: ReleaseConfig) -> Result<Self, CatalogError> {
        let mut by_name = HashMap::new();
        let mut by_tag: HashMap<String, usize> = HashMap::new();

        for (idx, version) in config.versions.iter().enumerate() {
            if version.tags.is_empty() {
                return Err(CatalogError::EmptyTags {
                    name: version.name.clone(),
                });
            }
            if by_name.contains_key(&version.name) {
                return Err(CatalogError::DuplicateName(version.name.clone()));
            }
            version.semver().map_err(|source| CatalogError::InvalidVersion {
                name: version.name.clone(),
                source,
            })?;
            DateTime::parse_from_rfc3339(&version.release_date).map_err(|source| {
                CatalogError::InvalidReleaseDate {
                    name: version.name.clone(),
                    date: version.release_date.clone(),
                    source,
                }
            })?;
            for tag in &version.tags {
                if by_tag.insert(tag.clone(), idx).is_some() {
                    return Err(CatalogError::DuplicateTag(tag.clone()));
                }
            }
            by_name.insert(version.name.clone(), idx);
        }

        if !by_tag.contains_key(TAG_LATEST) {
            return Err(CatalogError::MissingLatest);
        }

        Ok(Self {
            versions: config.versions,
            by_name,
            by_tag,
        })
    }

    /// Look up a version by tag (case-sensitive).
    #[must_use]
    pub fn by_tag(&self, tag: &str) -> Option<&Version> {
        self.by_tag.get(tag).map(|&idx| &self.versions[idx])
    }

    /// Look up a version by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Version> {
        self.by_name.get(name).map(|&idx| &self.versions[idx])
    }

    /// The version registered under the reserved `latest` tag.
    ///
    /// Present by construction; `None` can only be observed through a
    /// logic bug.
    #[must_use]
    pub fn latest(&self) -> Option<&Version> {
        self.by_tag(TAG_LATEST)
    }

    /// All known versions, in document order.
    #[must_use]
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Number of known versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether the catalog holds no versions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
