//! Coarse IP geolocation for telemetry enrichment.
//!
//! Backed by a MaxMind-format database file opened once at startup. The
//! resolver only ever feeds telemetry: every lookup failure is non-fatal
//! and callers proceed without a location.

use crate::error::LocationError;
use maxminddb::geoip2;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;

/// Locale key projected out of the database's name tables.
const LOCALE_EN: &str = "en";

/// Coarse location derived from a client address.
///
/// Request-scoped: used once to enrich a telemetry point, then discarded.
/// The address it was derived from is never retained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    /// City name, English locale
    pub city: String,

    /// Country of the resolved address
    pub country: Country,
}

/// Country part of a resolved location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Country {
    /// Country name, English locale
    pub name: String,

    /// ISO 3166-1 code, copied verbatim from the database
    pub iso_code: String,
}

/// Maps client IP addresses to coarse locations.
///
/// The underlying reader is opened once at startup and shared across
/// concurrent request tasks; lookups take `&self`.
pub struct LocationResolver {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl fmt::Debug for LocationResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationResolver").finish_non_exhaustive()
    }
}

impl LocationResolver {
    /// Open the geolocation database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `LocationError::OpenFailed` if the file is missing or not a
    /// valid MaxMind database. Callers treat this as fatal to startup.
    pub fn open(path: &Path) -> Result<Self, LocationError> {
        let reader =
            maxminddb::Reader::open_readfile(path).map_err(|source| LocationError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!("Geolocation database opened from {}", path.display());
        Ok(Self { reader })
    }

    /// Resolve an address to a coarse location.
    ///
    /// Projects the English name tables for city and country and copies
    /// the country ISO code verbatim. The raw address is used for the
    /// lookup only.
    ///
    /// # Errors
    ///
    /// Returns `LocationError` for an unparseable address or a lookup
    /// miss. Neither is fatal to the caller.
    pub fn resolve(&self, address: &str) -> Result<Location, LocationError> {
        let ip = parse_address(address)?;
        let record: geoip2::City<'_> = self.reader.lookup(ip)?;

        let city = record
            .city
            .and_then(|city| city.names)
            .and_then(|names| names.get(LOCALE_EN).copied())
            .unwrap_or_default();
        let (country_name, iso_code) = record
            .country
            .map(|country| {
                (
                    country
                        .names
                        .and_then(|names| names.get(LOCALE_EN).copied())
                        .unwrap_or_default(),
                    country.iso_code.unwrap_or_default(),
                )
            })
            .unwrap_or_default();

        Ok(Location {
            city: city.to_string(),
            country: Country {
                name: country_name.to_string(),
                iso_code: iso_code.to_string(),
            },
        })
    }
}

/// Parse a forwarded address entry as an IP address.
fn parse_address(address: &str) -> Result<IpAddr, LocationError> {
    address
        .trim()
        .parse()
        .map_err(|source| LocationError::InvalidAddress {
            address: address.to_string(),
            source,
        })
}
