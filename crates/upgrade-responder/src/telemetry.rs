//! Best-effort usage telemetry.
//!
//! Each upgrade check is recorded as a single metric point written to an
//! InfluxDB 1.x-compatible sink. Recording is strictly fire-and-forget:
//! nothing in this module may raise an error back to the request path or
//! delay the client-visible response, and raw client IP addresses are
//! never written to the sink.

use crate::error::TelemetryError;
use crate::geoip::{Location, LocationResolver};
use crate::response::CheckUpgradeRequest;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use influxdb_line_protocol::LineProtocolBuilder;
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

/// Database all upgrade-check points are written to.
pub const INFLUX_DATABASE: &str = "longhorn_upgrade_responder";

/// Measurement name for upgrade-check points.
pub const MEASUREMENT_UPGRADE_QUERY: &str = "longhorn_upgrade_query";

// ns is good for counting nodes
const INFLUX_PRECISION: &str = "ns";

const TAG_APP_VERSION: &str = "longhorn_version";
const TAG_KUBERNETES_VERSION: &str = "kubernetes_version";
const TAG_LOCATION_CITY: &str = "city";
const TAG_LOCATION_COUNTRY: &str = "country";
const TAG_LOCATION_COUNTRY_ISO_CODE: &str = "country_isocode";

/// Forwarded-address chain; the rightmost entry was appended by the edge
/// nearest the public internet and is the least spoofable of the chain.
pub const HEADER_X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Request-correlation identifier, passed through into telemetry verbatim.
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// A single telemetry measurement.
///
/// Constructed per request, encoded once and handed to the sink; never
/// retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricPoint {
    /// Measurement name
    pub measurement: &'static str,

    /// Indexed dimensions
    pub tags: BTreeMap<String, String>,

    /// Unindexed values
    pub fields: BTreeMap<String, String>,

    /// Time of recording
    pub timestamp: DateTime<Utc>,
}

impl MetricPoint {
    /// Build the point for one upgrade check.
    ///
    /// Location tags are present only when a location was resolved.
    #[must_use]
    pub fn upgrade_query(
        request: &CheckUpgradeRequest,
        request_id: &str,
        location: Option<&Location>,
    ) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(
            TAG_APP_VERSION.to_string(),
            request.longhorn_version.clone(),
        );
        tags.insert(
            TAG_KUBERNETES_VERSION.to_string(),
            request.kubernetes_version.clone(),
        );
        if let Some(location) = location {
            tags.insert(TAG_LOCATION_CITY.to_string(), location.city.clone());
            tags.insert(
                TAG_LOCATION_COUNTRY.to_string(),
                location.country.name.clone(),
            );
            tags.insert(
                TAG_LOCATION_COUNTRY_ISO_CODE.to_string(),
                location.country.iso_code.clone(),
            );
        }

        let mut fields = BTreeMap::new();
        fields.insert(
            canonicalize_field(HEADER_REQUEST_ID),
            request_id.to_string(),
        );

        Self {
            measurement: MEASUREMENT_UPGRADE_QUERY,
            tags,
            fields,
            timestamp: Utc::now(),
        }
    }

    /// Encode the point as one line of InfluxDB line protocol.
    ///
    /// Tags with an empty key or value are skipped: the line protocol has
    /// no representation for them and the sink would reject the whole
    /// line.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError` if the point has no fields or its
    /// timestamp does not fit the nanosecond wire representation.
    pub fn to_line_protocol(&self) -> Result<Vec<u8>, TelemetryError> {
        let timestamp = self
            .timestamp
            .timestamp_nanos_opt()
            .ok_or(TelemetryError::TimestampOutOfRange)?;

        let mut builder = LineProtocolBuilder::new().measurement(self.measurement);
        for (key, value) in &self.tags {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            builder = builder.tag(key, value);
        }

        let mut fields = self.fields.iter();
        let (first_key, first_value) = fields.next().ok_or(TelemetryError::NoFields)?;
        let mut builder = builder.field(first_key.as_str(), first_value.as_str());
        for (key, value) in fields {
            builder = builder.field(key.as_str(), value.as_str());
        }

        Ok(builder.timestamp(timestamp).close_line().build())
    }
}

/// Canonicalize a header name into a metric field key.
fn canonicalize_field(name: &str) -> String {
    name.to_lowercase().replace('-', "_")
}

/// Client for an InfluxDB 1.x-compatible write endpoint.
///
/// One sink is created at startup and shared by all request tasks; the
/// underlying HTTP client pools connections internally and clones are
/// cheap handles onto the same pool.
#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: reqwest::Client,
    base_url: Url,
    database: String,
    username: Option<String>,
    password: Option<String>,
}

impl InfluxSink {
    /// Create a sink writing to the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::InvalidUrl` if the endpoint is not a
    /// valid absolute URL.
    pub fn new(
        url: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, TelemetryError> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: Url::parse(url)?,
            database: INFLUX_DATABASE.to_string(),
            username,
            password,
        })
    }

    /// The database this sink writes to.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Create the sink database if it does not exist yet.
    ///
    /// `CREATE DATABASE` is idempotent on InfluxDB 1.x, so this is safe
    /// to run on every startup.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError` if the sink is unreachable or rejects the
    /// query. Callers treat this as fatal to startup.
    pub async fn ensure_database(&self) -> Result<(), TelemetryError> {
        let url = self.base_url.join("./query")?;
        let response = self
            .with_auth(self.client.post(url))
            .form(&[("q", format!("CREATE DATABASE \"{}\"", self.database))])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Rejected {
                operation: "database creation",
                status,
            });
        }
        tracing::debug!("Telemetry database {} ready", self.database);
        Ok(())
    }

    /// Write a single point at nanosecond precision.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError` if the point cannot be encoded, the sink
    /// is unreachable, or the write is rejected.
    pub async fn write(&self, point: &MetricPoint) -> Result<(), TelemetryError> {
        let line = point.to_line_protocol()?;
        let url = self.base_url.join("./write")?;
        let response = self
            .with_auth(self.client.post(url))
            .query(&[("db", self.database.as_str()), ("precision", INFLUX_PRECISION)])
            .body(line)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Rejected {
                operation: "point write",
                status,
            });
        }
        Ok(())
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }
}

/// Records one usage point per upgrade check.
///
/// Everything here is best-effort: failures are logged and dropped, and
/// the sink write runs on a detached task so the response path never
/// waits on it. Without a sink the recorder still resolves and logs, it
/// just emits nothing.
#[derive(Debug, Clone)]
pub struct TelemetryRecorder {
    sink: Option<InfluxSink>,
    resolver: Option<Arc<LocationResolver>>,
}

impl TelemetryRecorder {
    /// Create a recorder.
    ///
    /// Location enrichment is skipped when no resolver is attached.
    #[must_use]
    pub fn new(sink: Option<InfluxSink>, resolver: Option<Arc<LocationResolver>>) -> Self {
        Self { sink, resolver }
    }

    /// A recorder that resolves nothing and emits nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    /// Record one upgrade check. Never fails, never blocks on the sink.
    pub fn record(&self, headers: &HeaderMap, request: &CheckUpgradeRequest) {
        let public_ip = public_address(headers).unwrap_or_default();
        let request_id = header_value(headers, HEADER_REQUEST_ID);

        // The address is used for the lookup and then dropped; only the
        // derived location is recorded.
        let location = self.resolver.as_deref().and_then(|resolver| {
            resolver
                .resolve(&public_ip)
                .inspect_err(|err| tracing::debug!("Failed to get location for one ip: {err}"))
                .ok()
        });

        tracing::debug!(
            "Upgrade check: request id {request_id:?}, location {location:?}, request {request:?}"
        );

        let Some(sink) = &self.sink else {
            return;
        };

        let point = MetricPoint::upgrade_query(request, &request_id, location.as_ref());
        let sink = sink.clone();
        tokio::spawn(async move {
            // Losing a sample is not worth surfacing past this task.
            if let Err(err) = sink.write(&point).await {
                tracing::error!("Failed to record upgrade check: {err}");
            }
        });
    }
}

/// Rightmost non-empty entry of the forwarded-address chain.
fn public_address(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(HEADER_X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .last()
        .map(ToString::to_string)
}

/// A header value as text, empty when absent or non-UTF-8.
fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoip::Country;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn check_request() -> CheckUpgradeRequest {
        CheckUpgradeRequest {
            longhorn_version: "v1.4.2".to_string(),
            kubernetes_version: "v1.27.1".to_string(),
        }
    }

    fn tokyo() -> Location {
        Location {
            city: "Tokyo".to_string(),
            country: Country {
                name: "Japan".to_string(),
                iso_code: "JP".to_string(),
            },
        }
    }

    #[test]
    fn test_canonicalize_field() {
        assert_eq!(canonicalize_field("X-Request-ID"), "x_request_id");
        assert_eq!(canonicalize_field(HEADER_REQUEST_ID), "x_request_id");
    }

    #[test]
    fn test_public_address_rightmost() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_X_FORWARDED_FOR, "10.0.0.1, 8.8.8.8".parse().unwrap());
        assert_eq!(public_address(&headers), Some("8.8.8.8".to_string()));
    }

    #[test]
    fn test_public_address_multiple_header_lines() {
        let mut headers = HeaderMap::new();
        headers.append(HEADER_X_FORWARDED_FOR, "10.0.0.1".parse().unwrap());
        headers.append(HEADER_X_FORWARDED_FOR, "172.16.0.1, 8.8.4.4".parse().unwrap());
        assert_eq!(public_address(&headers), Some("8.8.4.4".to_string()));
    }

    #[test]
    fn test_public_address_absent() {
        let headers = HeaderMap::new();
        assert_eq!(public_address(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_X_FORWARDED_FOR, " , ".parse().unwrap());
        assert_eq!(public_address(&headers), None);
    }

    #[test]
    fn test_point_with_location() {
        let location = tokyo();
        let point = MetricPoint::upgrade_query(&check_request(), "req-1", Some(&location));

        assert_eq!(point.measurement, MEASUREMENT_UPGRADE_QUERY);
        assert_eq!(point.tags["longhorn_version"], "v1.4.2");
        assert_eq!(point.tags["kubernetes_version"], "v1.27.1");
        assert_eq!(point.tags["city"], "Tokyo");
        assert_eq!(point.tags["country"], "Japan");
        assert_eq!(point.tags["country_isocode"], "JP");
        assert_eq!(point.fields["x_request_id"], "req-1");
    }

    #[test]
    fn test_point_without_location() {
        let point = MetricPoint::upgrade_query(&check_request(), "req-1", None);

        assert!(!point.tags.contains_key("city"));
        assert!(!point.tags.contains_key("country"));
        assert!(!point.tags.contains_key("country_isocode"));
        assert_eq!(point.fields["x_request_id"], "req-1");
    }

    #[test]
    fn test_line_protocol_encoding() {
        let location = tokyo();
        let mut point = MetricPoint::upgrade_query(&check_request(), "req-1", Some(&location));
        point.timestamp = Utc.timestamp_opt(1_672_531_200, 0).unwrap();

        let line = String::from_utf8(point.to_line_protocol().unwrap()).unwrap();
        assert_eq!(
            line,
            "longhorn_upgrade_query,city=Tokyo,country=Japan,country_isocode=JP,\
             kubernetes_version=v1.27.1,longhorn_version=v1.4.2 \
             x_request_id=\"req-1\" 1672531200000000000\n"
        );
    }

    #[test]
    fn test_line_protocol_escapes_spaces() {
        let location = Location {
            city: "San Jose".to_string(),
            country: Country {
                name: "United States".to_string(),
                iso_code: "US".to_string(),
            },
        };
        let point = MetricPoint::upgrade_query(&check_request(), "req-1", Some(&location));

        let line = String::from_utf8(point.to_line_protocol().unwrap()).unwrap();
        assert!(line.contains(r"city=San\ Jose"));
        assert!(line.contains(r"country=United\ States"));
    }

    #[test]
    fn test_line_protocol_skips_empty_tags() {
        let point = MetricPoint::upgrade_query(&CheckUpgradeRequest::default(), "req-1", None);

        let line = String::from_utf8(point.to_line_protocol().unwrap()).unwrap();
        assert!(line.starts_with("longhorn_upgrade_query "));
        assert!(!line.contains("longhorn_version"));
        assert!(!line.contains("kubernetes_version"));
    }

    #[test]
    fn test_line_protocol_requires_fields() {
        let point = MetricPoint {
            measurement: MEASUREMENT_UPGRADE_QUERY,
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        };
        assert!(matches!(
            point.to_line_protocol().unwrap_err(),
            TelemetryError::NoFields
        ));
    }

    #[test]
    fn test_sink_rejects_invalid_url() {
        assert!(matches!(
            InfluxSink::new("not a url", None, None).unwrap_err(),
            TelemetryError::InvalidUrl(_)
        ));
    }

    #[tokio::test]
    async fn test_disabled_recorder_is_inert() {
        let recorder = TelemetryRecorder::disabled();
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_REQUEST_ID, "req-1".parse().unwrap());

        // Must neither fail nor spawn anything that could.
        recorder.record(&headers, &check_request());
    }
}
