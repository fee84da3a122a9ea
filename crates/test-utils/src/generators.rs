//! Generators for synthetic stations, series and features.
//!
//! Values follow simple predictable patterns so tests can assert on them
//! without recomputing anything.

use hydro_common::{FeatureKind, GeometryFeature, ReadingPoint, RiskLevel, Station};

/// Series of `count` points spaced `step_millis` apart starting at
/// `start_millis`, with values `base, base + 1, base + 2, ...`.
///
/// # Example
///
/// ```
/// use test_utils::create_series;
///
/// let s = create_series(0, 1000, 3, 10.0);
/// assert_eq!(s.len(), 3);
/// assert_eq!(s[2].timestamp_millis, 2000);
/// assert_eq!(s[2].value, 12.0);
/// ```
pub fn create_series(
    start_millis: i64,
    step_millis: i64,
    count: usize,
    base: f64,
) -> Vec<ReadingPoint> {
    (0..count)
        .map(|i| ReadingPoint::new(start_millis + step_millis * i as i64, base + i as f64))
        .collect()
}

/// Station at `(lat, lon)` reporting `parameter_code` with the given
/// values at one-hour spacing. The last value is the latest reading.
pub fn create_station(
    id: &str,
    latitude: f64,
    longitude: f64,
    parameter_code: &str,
    values: &[f64],
) -> Station {
    let series = values
        .iter()
        .enumerate()
        .map(|(i, &v)| ReadingPoint::new(i as i64 * 3_600_000, v))
        .collect();
    Station {
        id: id.to_string(),
        name: format!("Station {}", id),
        latitude,
        longitude,
        parameter_code: parameter_code.to_string(),
        unit: None,
        series,
        risk: RiskLevel::Unknown,
    }
}

/// Straight line feature from `from` to `to` with `points` evenly spaced
/// vertices.
pub fn create_line_feature(
    id: &str,
    kind: FeatureKind,
    from: (f64, f64),
    to: (f64, f64),
    points: usize,
) -> GeometryFeature {
    let n = points.max(2);
    let coordinates = (0..n)
        .map(|i| {
            let t = i as f64 / (n - 1) as f64;
            (from.0 + (to.0 - from.0) * t, from.1 + (to.1 - from.1) * t)
        })
        .collect();
    GeometryFeature {
        id: id.to_string(),
        name: format!("Feature {}", id),
        kind,
        coordinates,
    }
}
