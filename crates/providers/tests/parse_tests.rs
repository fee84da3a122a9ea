//! Provider response parsing against recorded payloads.

use chrono::{TimeZone, Utc};

use hydro_common::{FeatureKind, ParameterKind, RiskLevel};
use providers::geometry::parse_overpass_response;
use providers::telemetry::{parse_area_response, parse_series_response};

const USGS_IV: &str = include_str!("fixtures/usgs_iv.json");
const OVERPASS: &str = include_str!("fixtures/overpass.json");

fn millis(h: u32) -> i64 {
    Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0)
        .unwrap()
        .timestamp_millis()
}

// ============================================================================
// Telemetry
// ============================================================================

#[test]
fn test_one_station_per_site_in_response_order() {
    let stations = parse_area_response(USGS_IV).unwrap();
    let ids: Vec<&str> = stations.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["05568500", "05568000", "05570000"]);
}

#[test]
fn test_gage_height_preferred_over_discharge() {
    let stations = parse_area_response(USGS_IV).unwrap();
    let kingston = &stations[0];

    assert_eq!(kingston.parameter_kind(), ParameterKind::GageHeight);
    assert_eq!(kingston.unit.as_deref(), Some("ft"));
    assert_eq!(kingston.risk, RiskLevel::Unknown);
}

#[test]
fn test_series_sorted_deduplicated_without_sentinels() {
    let stations = parse_area_response(USGS_IV).unwrap();
    let series = &stations[0].series;

    assert_eq!(series.len(), 2);
    // 10:00 and 11:00 at -05:00
    assert_eq!(series[0].timestamp_millis, millis(15));
    assert_eq!(series[0].value, 17.05);
    assert_eq!(series[1].timestamp_millis, millis(16));
    assert_eq!(stations[0].latest_value(), Some(17.10));
}

#[test]
fn test_unparseable_values_skipped() {
    let stations = parse_area_response(USGS_IV).unwrap();
    let mackinaw = &stations[1];
    assert_eq!(mackinaw.series.len(), 1);
    assert_eq!(mackinaw.latest_value(), Some(1250.0));
}

#[test]
fn test_site_without_readings_is_kept() {
    let stations = parse_area_response(USGS_IV).unwrap();
    let spoon = &stations[2];
    assert!(spoon.series.is_empty());
    assert_eq!(spoon.latest_value(), None);
}

#[test]
fn test_series_response_selects_parameter() {
    let stage = parse_series_response(USGS_IV, "00065").unwrap();
    assert_eq!(stage.len(), 2);

    let flow = parse_series_response(USGS_IV, "00060").unwrap();
    assert_eq!(flow.len(), 2);
    assert_eq!(flow[1].value, 21600.0);

    assert!(parse_series_response(USGS_IV, "62614").unwrap().is_empty());
}

// ============================================================================
// Geometry
// ============================================================================

#[test]
fn test_overpass_features() {
    let features = parse_overpass_response(OVERPASS).unwrap();
    let ids: Vec<&str> = features.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["way/26830381", "way/41112233", "way/55500001", "relation/7012345"]
    );
}

#[test]
fn test_overpass_kinds_and_names() {
    let features = parse_overpass_response(OVERPASS).unwrap();
    assert_eq!(features[0].kind, FeatureKind::River);
    assert_eq!(features[0].name, "Illinois River");
    assert_eq!(features[1].kind, FeatureKind::Stream);
    assert_eq!(features[1].name, "Unnamed");
    assert_eq!(features[2].kind, FeatureKind::Lake);
    assert_eq!(features[3].kind, FeatureKind::Reservoir);
}

#[test]
fn test_polygons_are_closed() {
    let features = parse_overpass_response(OVERPASS).unwrap();
    for feature in features.iter().filter(|f| f.kind.is_polygon()) {
        assert_eq!(feature.coordinates.first(), feature.coordinates.last());
        assert!(feature.coordinates.len() >= 4);
    }
}

#[test]
fn test_relation_outer_ways_chained() {
    let features = parse_overpass_response(OVERPASS).unwrap();
    let reservoir = &features[3];
    assert_eq!(
        reservoir.coordinates,
        vec![
            (40.40, -89.80),
            (40.45, -89.80),
            (40.45, -89.70),
            (40.40, -89.70),
            (40.40, -89.80),
        ]
    );
}
