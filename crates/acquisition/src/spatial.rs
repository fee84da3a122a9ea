//! Nearest-station lookup for geometry features.

use hydro_common::{GeometryFeature, Station, StationSummary};

/// Mean Earth radius in statute miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Great-circle distance between two `(lat, lon)` points, in miles.
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_MILES * c
}

/// Anything with a fixed position.
pub trait Located {
    fn latitude(&self) -> f64;
    fn longitude(&self) -> f64;
}

impl Located for Station {
    fn latitude(&self) -> f64 {
        self.latitude
    }
    fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl Located for StationSummary {
    fn latitude(&self) -> f64 {
        self.latitude
    }
    fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// A matched station and its distance from the feature.
#[derive(Debug, PartialEq)]
pub struct Association<'a, S> {
    pub station: &'a S,
    pub distance_miles: f64,
}

impl<S> Clone for Association<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Association<'_, S> {}

/// Closest station strictly within `max_distance_miles` of the feature's
/// midpoint.
///
/// Ties go to the station that comes first in `stations`. Stations with
/// non-finite coordinates never match.
pub fn nearest<'a, S: Located>(
    feature: &GeometryFeature,
    stations: &'a [S],
    max_distance_miles: f64,
) -> Option<Association<'a, S>> {
    let (lat, lon) = feature.midpoint()?;
    nearest_to_point(lat, lon, stations, max_distance_miles)
}

pub fn nearest_to_point<'a, S: Located>(
    lat: f64,
    lon: f64,
    stations: &'a [S],
    max_distance_miles: f64,
) -> Option<Association<'a, S>> {
    let mut best: Option<Association<'a, S>> = None;

    for station in stations {
        let d = haversine_miles(lat, lon, station.latitude(), station.longitude());
        if !d.is_finite() || d >= max_distance_miles {
            continue;
        }
        // strict `<` keeps the earlier station on an exact tie
        if best.as_ref().map_or(true, |b| d < b.distance_miles) {
            best = Some(Association {
                station,
                distance_miles: d,
            });
        }
    }

    best
}
