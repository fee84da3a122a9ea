//! Station telemetry from the USGS Instantaneous Values service.
//!
//! One area request returns every active site inside a bounding box together
//! with the recent series of each requested parameter. A site may report
//! several parameters; it is reduced to a single [`Station`] carrying the
//! highest-priority parameter that has data.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use hydro_common::{iso8601_hours, BoundingBox, ParameterKind, ReadingPoint, RiskLevel, Station};

use crate::error::{UpstreamError, UpstreamResult};
use crate::limits::AreaLimits;

/// Value the service uses for "no reading".
pub const NO_DATA_SENTINEL: f64 = -999999.0;

pub const DEFAULT_IV_ENDPOINT: &str = "https://waterservices.usgs.gov/nwis/iv/";

/// Source of station readings.
#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    /// Stations inside `bbox` with readings from the last `hours`.
    ///
    /// `bbox` must already satisfy the provider's [`AreaLimits`].
    async fn fetch_area(
        &self,
        bbox: &BoundingBox,
        hours: u32,
        parameter_codes: &[String],
    ) -> UpstreamResult<Vec<Station>>;

    /// One station's series for one parameter between `start` and `end`.
    async fn fetch_history(
        &self,
        station_id: &str,
        parameter_code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> UpstreamResult<Vec<ReadingPoint>>;

    fn name(&self) -> &'static str;
}

/// HTTP client for the Instantaneous Values service.
pub struct UsgsClient {
    client: Client,
    endpoint: String,
}

impl UsgsClient {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("hydro-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn get_text(&self, url: &str) -> UpstreamResult<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Http {
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl TelemetryProvider for UsgsClient {
    #[instrument(skip(self, bbox, parameter_codes), fields(bbox = %bbox.cache_key()))]
    async fn fetch_area(
        &self,
        bbox: &BoundingBox,
        hours: u32,
        parameter_codes: &[String],
    ) -> UpstreamResult<Vec<Station>> {
        let url = build_area_url(&self.endpoint, bbox, hours, parameter_codes);
        debug!(url = %url, "Requesting area readings");
        let body = self.get_text(&url).await?;
        let stations = parse_area_response(&body)?;
        debug!(stations = stations.len(), "Parsed area readings");
        Ok(stations)
    }

    #[instrument(skip(self))]
    async fn fetch_history(
        &self,
        station_id: &str,
        parameter_code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> UpstreamResult<Vec<ReadingPoint>> {
        let url = build_history_url(&self.endpoint, station_id, parameter_code, start, end);
        debug!(url = %url, "Requesting station history");
        let body = self.get_text(&url).await?;
        parse_series_response(&body, parameter_code)
    }

    fn name(&self) -> &'static str {
        "usgs-iv"
    }
}

// ============================================================================
// Request URLs
// ============================================================================

/// Area request. Coordinates are rounded to the provider's precision.
pub fn build_area_url(
    endpoint: &str,
    bbox: &BoundingBox,
    hours: u32,
    parameter_codes: &[String],
) -> String {
    let b = AreaLimits::round(bbox);
    format!(
        "{}?format=json&bBox={},{},{},{}&period={}&parameterCd={}&siteStatus=active",
        endpoint,
        b.west,
        b.south,
        b.east,
        b.north,
        iso8601_hours(hours),
        parameter_codes.join(",")
    )
}

pub fn build_history_url(
    endpoint: &str,
    station_id: &str,
    parameter_code: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    format!(
        "{}?format=json&sites={}&parameterCd={}&startDT={}&endDT={}",
        endpoint,
        station_id,
        parameter_code,
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        end.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

// ============================================================================
// WaterML-JSON records
// ============================================================================

#[derive(Debug, Deserialize)]
struct IvResponse {
    value: IvValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IvValue {
    #[serde(default)]
    time_series: Vec<TimeSeries>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeSeries {
    source_info: SourceInfo,
    variable: Variable,
    #[serde(default)]
    values: Vec<ValueBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceInfo {
    site_name: String,
    site_code: Vec<CodeValue>,
    geo_location: GeoLocation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeoLocation {
    geog_location: GeogLocation,
}

#[derive(Debug, Deserialize)]
struct GeogLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Variable {
    variable_code: Vec<CodeValue>,
    #[serde(default)]
    unit: Option<Unit>,
    #[serde(default)]
    no_data_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Unit {
    unit_code: String,
}

#[derive(Debug, Deserialize)]
struct CodeValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ValueBlock {
    #[serde(default)]
    value: Vec<RawPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPoint {
    value: String,
    date_time: String,
}

impl TimeSeries {
    fn site_id(&self) -> Option<&str> {
        self.source_info.site_code.first().map(|c| c.value.as_str())
    }

    fn parameter_code(&self) -> Option<&str> {
        self.variable.variable_code.first().map(|c| c.value.as_str())
    }

    /// Usable points, ascending and unique by timestamp.
    fn points(&self) -> Vec<ReadingPoint> {
        let no_data = self.variable.no_data_value.unwrap_or(NO_DATA_SENTINEL);
        let mut points: Vec<ReadingPoint> = self
            .values
            .iter()
            .flat_map(|block| block.value.iter())
            .filter_map(|raw| {
                let value: f64 = raw.value.trim().parse().ok()?;
                if !value.is_finite() || value == no_data || value == NO_DATA_SENTINEL {
                    return None;
                }
                let ts = DateTime::parse_from_rfc3339(&raw.date_time).ok()?;
                Some(ReadingPoint::new(ts.timestamp_millis(), value))
            })
            .collect();

        points.sort_by_key(|p| p.timestamp_millis);
        points.dedup_by_key(|p| p.timestamp_millis);
        points
    }
}

fn decode(body: &str) -> UpstreamResult<IvResponse> {
    Ok(serde_json::from_str(body)?)
}

/// Reduce an area response to one station per site.
pub fn parse_area_response(body: &str) -> UpstreamResult<Vec<Station>> {
    let response = decode(body)?;

    // site id -> index into `stations`, in order of first appearance
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut stations: Vec<Station> = Vec::new();

    for series in &response.value.time_series {
        let (Some(site_id), Some(code)) = (series.site_id(), series.parameter_code()) else {
            continue;
        };
        let geo = &series.source_info.geo_location.geog_location;
        if !geo.latitude.is_finite() || !geo.longitude.is_finite() {
            continue;
        }

        let candidate = Station {
            id: site_id.to_string(),
            name: series.source_info.site_name.clone(),
            latitude: geo.latitude,
            longitude: geo.longitude,
            parameter_code: code.to_string(),
            unit: series.variable.unit.as_ref().map(|u| u.unit_code.clone()),
            series: series.points(),
            risk: RiskLevel::Unknown,
        };

        match index.get(site_id) {
            Some(&i) => {
                if preferred(&candidate, &stations[i]) {
                    stations[i] = candidate;
                }
            }
            None => {
                index.insert(site_id.to_string(), stations.len());
                stations.push(candidate);
            }
        }
    }

    Ok(stations)
}

/// Whether `candidate` should replace `current` for the same site.
///
/// A series with data beats one without; otherwise the parameter priority
/// decides and the earlier series wins ties.
fn preferred(candidate: &Station, current: &Station) -> bool {
    let has_data = |s: &Station| !s.series.is_empty();
    match (has_data(candidate), has_data(current)) {
        (true, false) => true,
        (false, true) => false,
        _ => {
            ParameterKind::from_code(&candidate.parameter_code).priority()
                < ParameterKind::from_code(&current.parameter_code).priority()
        }
    }
}

/// Points of the first series reporting `parameter_code`.
pub fn parse_series_response(
    body: &str,
    parameter_code: &str,
) -> UpstreamResult<Vec<ReadingPoint>> {
    let response = decode(body)?;
    Ok(response
        .value
        .time_series
        .iter()
        .find(|s| s.parameter_code() == Some(parameter_code))
        .map(|s| s.points())
        .unwrap_or_default())
}
