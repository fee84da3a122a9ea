//! In-process provider fakes.
//!
//! Each fake records how it was called so tests can assert on request
//! counts (cache hits must not reach upstream, retries must stop at the
//! attempt budget, and so on).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hydro_common::{
    BoundingBox, GeometryFeature, HydroError, HydroResult, ReadingPoint, StageThresholds, Station,
};
use providers::{
    GeometryProvider, GeometryQuery, TelemetryProvider, ThresholdSource, UpstreamError,
    UpstreamResult,
};
use storage::{CacheStore, MemoryStore, TieredCache};

/// Cache over a fresh in-memory store.
pub fn memory_cache() -> TieredCache {
    TieredCache::new(Arc::new(MemoryStore::new(10_000)))
}

/// Store whose every operation fails as if the server were down.
#[derive(Default)]
pub struct UnreachableStore {
    calls: AtomicUsize,
}

impl UnreachableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> HydroResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HydroError::CacheUnavailable("connection refused".to_string()))
    }
}

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _key: &str) -> HydroResult<Option<String>> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> HydroResult<()> {
        self.fail()
    }

    async fn multi_get(&self, _keys: &[String]) -> HydroResult<Vec<Option<String>>> {
        self.fail()
    }

    async fn multi_set(&self, _entries: &[(String, String)], _ttl_secs: u64) -> HydroResult<()> {
        self.fail()
    }

    async fn delete_pattern(&self, _pattern: &str) -> HydroResult<u64> {
        self.fail()
    }

    async fn ping(&self) -> HydroResult<()> {
        self.fail()
    }

    fn backend(&self) -> &'static str {
        "unreachable"
    }
}

/// A transient failure, retried by the default policies.
pub fn transient_error() -> UpstreamError {
    UpstreamError::Transport("connection reset".to_string())
}

/// One recorded history request.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryCall {
    pub station_id: String,
    pub parameter_code: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

type AreaResponder = Box<dyn Fn(&BoundingBox) -> UpstreamResult<Vec<Station>> + Send + Sync>;

/// Scriptable telemetry provider.
///
/// Area requests are answered by a responder closure; history requests by
/// a per-station series filtered to the requested range.
pub struct FakeTelemetry {
    area: AreaResponder,
    series: Mutex<HashMap<String, Vec<ReadingPoint>>>,
    failing_history: Mutex<HashSet<String>>,
    area_calls: Mutex<Vec<BoundingBox>>,
    history_calls: Mutex<Vec<HistoryCall>>,
}

impl FakeTelemetry {
    /// Every area request returns no stations.
    pub fn empty() -> Self {
        Self::with_area(|_| Ok(Vec::new()))
    }

    /// Every area request returns the stations inside the requested box.
    pub fn with_stations(stations: Vec<Station>) -> Self {
        Self::with_area(move |bbox| {
            Ok(stations
                .iter()
                .filter(|s| bbox.contains_point(s.latitude, s.longitude))
                .cloned()
                .collect())
        })
    }

    pub fn with_area<F>(responder: F) -> Self
    where
        F: Fn(&BoundingBox) -> UpstreamResult<Vec<Station>> + Send + Sync + 'static,
    {
        Self {
            area: Box::new(responder),
            series: Mutex::new(HashMap::new()),
            failing_history: Mutex::new(HashSet::new()),
            area_calls: Mutex::new(Vec::new()),
            history_calls: Mutex::new(Vec::new()),
        }
    }

    /// Full series served for `station_id` history requests.
    pub fn set_series(&self, station_id: &str, points: Vec<ReadingPoint>) {
        self.series
            .lock()
            .unwrap()
            .insert(station_id.to_string(), points);
    }

    /// Make every history request for `station_id` fail, or succeed again.
    pub fn set_history_failing(&self, station_id: &str, failing: bool) {
        let mut set = self.failing_history.lock().unwrap();
        if failing {
            set.insert(station_id.to_string());
        } else {
            set.remove(station_id);
        }
    }

    pub fn area_calls(&self) -> Vec<BoundingBox> {
        self.area_calls.lock().unwrap().clone()
    }

    pub fn area_call_count(&self) -> usize {
        self.area_calls.lock().unwrap().len()
    }

    pub fn history_calls(&self) -> Vec<HistoryCall> {
        self.history_calls.lock().unwrap().clone()
    }

    pub fn history_call_count(&self) -> usize {
        self.history_calls.lock().unwrap().len()
    }

    pub fn reset_calls(&self) {
        self.area_calls.lock().unwrap().clear();
        self.history_calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl TelemetryProvider for FakeTelemetry {
    async fn fetch_area(
        &self,
        bbox: &BoundingBox,
        _hours: u32,
        _parameter_codes: &[String],
    ) -> UpstreamResult<Vec<Station>> {
        self.area_calls.lock().unwrap().push(*bbox);
        (self.area)(bbox)
    }

    async fn fetch_history(
        &self,
        station_id: &str,
        parameter_code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> UpstreamResult<Vec<ReadingPoint>> {
        self.history_calls.lock().unwrap().push(HistoryCall {
            station_id: station_id.to_string(),
            parameter_code: parameter_code.to_string(),
            start,
            end,
        });

        if self.failing_history.lock().unwrap().contains(station_id) {
            return Err(transient_error());
        }

        let (from, to) = (start.timestamp_millis(), end.timestamp_millis());
        Ok(self
            .series
            .lock()
            .unwrap()
            .get(station_id)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp_millis >= from && p.timestamp_millis <= to)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "fake-telemetry"
    }
}

/// Geometry provider returning a fixed feature set.
pub struct FakeGeometry {
    features: Vec<GeometryFeature>,
    fail_first: AtomicU32,
    queries: Mutex<Vec<GeometryQuery>>,
}

impl FakeGeometry {
    pub fn new(features: Vec<GeometryFeature>) -> Self {
        Self {
            features,
            fail_first: AtomicU32::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `n` requests with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.fail_first.store(n, Ordering::SeqCst);
    }

    pub fn queries(&self) -> Vec<GeometryQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl GeometryProvider for FakeGeometry {
    async fn fetch_features(&self, query: &GeometryQuery) -> UpstreamResult<Vec<GeometryFeature>> {
        self.queries.lock().unwrap().push(query.clone());
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(transient_error());
        }
        Ok(self.features.clone())
    }

    fn name(&self) -> &'static str {
        "fake-geometry"
    }
}

/// Threshold source backed by a map, counting lookups.
#[derive(Default)]
pub struct FakeThresholds {
    known: HashMap<String, StageThresholds>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeThresholds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, station_id: &str, thresholds: StageThresholds) -> Self {
        self.known.insert(station_id.to_string(), thresholds);
        self
    }

    pub fn failing_for(mut self, station_id: &str) -> Self {
        self.failing.insert(station_id.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThresholdSource for FakeThresholds {
    async fn thresholds(&self, station_id: &str) -> UpstreamResult<Option<StageThresholds>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(station_id) {
            return Err(transient_error());
        }
        Ok(self.known.get(station_id).copied())
    }
}
