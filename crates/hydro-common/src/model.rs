//! Domain model shared by the providers, the cache and the acquisition layer.
//!
//! Types only. Values stored in the cache are whole serialized snapshots of
//! these types; callers never patch a cached value in place.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Parameter codes
// ---------------------------------------------------------------------------

/// USGS parameter code for discharge (streamflow), in cubic feet per second.
pub const PARAM_DISCHARGE: &str = "00060";

/// USGS parameter code for gage height (stage), in feet.
pub const PARAM_GAGE_HEIGHT: &str = "00065";

/// USGS parameter code for reservoir storage, in acre-feet.
pub const PARAM_RESERVOIR_STORAGE: &str = "00054";

/// USGS parameter code for lake or reservoir water-surface elevation, in feet.
pub const PARAM_LAKE_ELEVATION: &str = "62614";

/// Physical quantity reported by a time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    GageHeight,
    Discharge,
    ReservoirStorage,
    LakeElevation,
    Other,
}

impl ParameterKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            PARAM_GAGE_HEIGHT => ParameterKind::GageHeight,
            PARAM_DISCHARGE => ParameterKind::Discharge,
            PARAM_RESERVOIR_STORAGE => ParameterKind::ReservoirStorage,
            PARAM_LAKE_ELEVATION => ParameterKind::LakeElevation,
            _ => ParameterKind::Other,
        }
    }

    /// Preference when a site reports several parameters: lower wins.
    pub fn priority(&self) -> u8 {
        match self {
            ParameterKind::GageHeight => 0,
            ParameterKind::Discharge => 1,
            ParameterKind::LakeElevation => 2,
            ParameterKind::ReservoirStorage => 3,
            ParameterKind::Other => 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Readings and stations
// ---------------------------------------------------------------------------

/// A single timestamped value within a station series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingPoint {
    /// Milliseconds since the Unix epoch (UTC).
    pub timestamp_millis: i64,
    pub value: f64,
}

impl ReadingPoint {
    pub fn new(timestamp_millis: i64, value: f64) -> Self {
        Self {
            timestamp_millis,
            value,
        }
    }
}

/// Qualitative flood risk, ordered from least to most severe.
///
/// `Unknown` sorts lowest; it is only produced when no reading exists.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Unknown,
    Low,
    Normal,
    Moderate,
    High,
    Extreme,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Unknown => "unknown",
            RiskLevel::Low => "low",
            RiskLevel::Normal => "normal",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Extreme => "extreme",
        }
    }
}

/// A telemetry station as seen in a provider response.
///
/// Identity is the provider-assigned `id`. `series` is time-ascending and
/// unique by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub parameter_code: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub series: Vec<ReadingPoint>,
    #[serde(default)]
    pub risk: RiskLevel,
}

impl Station {
    pub fn parameter_kind(&self) -> ParameterKind {
        ParameterKind::from_code(&self.parameter_code)
    }

    /// Most recent reading value, if any.
    pub fn latest_value(&self) -> Option<f64> {
        self.series.last().map(|p| p.value)
    }
}

/// Readings-free view of a station, used for metadata and risk snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSummary {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub latest_value: Option<f64>,
    #[serde(default)]
    pub risk: RiskLevel,
}

impl From<&Station> for StationSummary {
    fn from(station: &Station) -> Self {
        Self {
            id: station.id.clone(),
            name: station.name.clone(),
            latitude: station.latitude,
            longitude: station.longitude,
            latest_value: station.latest_value(),
            risk: station.risk,
        }
    }
}

impl StationSummary {
    /// Same station with readings and risk dropped.
    pub fn metadata_only(&self) -> Self {
        Self {
            latest_value: None,
            risk: RiskLevel::Unknown,
            ..self.clone()
        }
    }
}

/// Official flood stage thresholds for a gauge, in the series' unit (feet).
///
/// Stage levels in ascending order:
///   action < flood < moderate_flood < major_flood
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageThresholds {
    pub action_stage: f64,
    pub flood_stage: f64,
    pub moderate_flood_stage: f64,
    pub major_flood_stage: f64,
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    River,
    Stream,
    Lake,
    Reservoir,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 4] = [
        FeatureKind::River,
        FeatureKind::Stream,
        FeatureKind::Lake,
        FeatureKind::Reservoir,
    ];

    /// Lakes and reservoirs are filled polygons; rivers and streams are lines.
    pub fn is_polygon(&self) -> bool {
        matches!(self, FeatureKind::Lake | FeatureKind::Reservoir)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::River => "river",
            FeatureKind::Stream => "stream",
            FeatureKind::Lake => "lake",
            FeatureKind::Reservoir => "reservoir",
        }
    }
}

/// A water body outline or course, as `(lat, lon)` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryFeature {
    pub id: String,
    pub name: String,
    pub kind: FeatureKind,
    pub coordinates: Vec<(f64, f64)>,
}

impl GeometryFeature {
    /// Coordinate at the middle of the sequence, used as the feature's
    /// representative point.
    pub fn midpoint(&self) -> Option<(f64, f64)> {
        self.coordinates.get(self.coordinates.len() / 2).copied()
    }

    /// Enforce point-count rules and close polygon rings.
    ///
    /// Returns `None` for lines with fewer than 2 points and polygons with
    /// fewer than 3 distinct points.
    pub fn normalized(mut self) -> Option<Self> {
        if self.kind.is_polygon() {
            let closed = self.coordinates.len() > 1
                && self.coordinates.first() == self.coordinates.last();
            let distinct = if closed {
                self.coordinates.len() - 1
            } else {
                self.coordinates.len()
            };
            if distinct < 3 {
                return None;
            }
            if !closed {
                let first = self.coordinates[0];
                self.coordinates.push(first);
            }
            Some(self)
        } else if self.coordinates.len() >= 2 {
            Some(self)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(kind: FeatureKind, coords: &[(f64, f64)]) -> GeometryFeature {
        GeometryFeature {
            id: "way/1".to_string(),
            name: "Test".to_string(),
            kind,
            coordinates: coords.to_vec(),
        }
    }

    #[test]
    fn test_polygon_is_closed() {
        let lake = feature(FeatureKind::Lake, &[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)])
            .normalized()
            .expect("three distinct points form a polygon");
        assert_eq!(lake.coordinates.len(), 4);
        assert_eq!(lake.coordinates.first(), lake.coordinates.last());
    }

    #[test]
    fn test_degenerate_features_dropped() {
        let ring = feature(FeatureKind::Reservoir, &[(0.0, 0.0), (0.0, 1.0), (0.0, 0.0)]);
        assert!(ring.normalized().is_none());

        let river = feature(FeatureKind::River, &[(0.0, 0.0)]);
        assert!(river.normalized().is_none());
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Unknown < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Normal);
        assert!(RiskLevel::Moderate < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Extreme);
    }

    #[test]
    fn test_parameter_kind_from_code() {
        assert_eq!(ParameterKind::from_code("00065"), ParameterKind::GageHeight);
        assert_eq!(ParameterKind::from_code("00060"), ParameterKind::Discharge);
        assert_eq!(ParameterKind::from_code("99999"), ParameterKind::Other);
    }
}
