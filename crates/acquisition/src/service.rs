//! The layer's public surface: stations, waterways, history, invalidation.
//!
//! One `HydroDataService` is built at startup and shared by every request
//! handler. It owns the cache front, the upstream coordinators and the
//! counters; nothing here lives in module-level state.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use hydro_common::{
    BoundingBox, FeatureKind, GeometryFeature, HydroError, HydroResult, ParameterKind, RiskLevel,
    StageThresholds, Station, StationSummary,
};
use providers::{
    GeometryProvider, GeometryQuery, RetryPolicy, TelemetryProvider, ThresholdSource,
};
use storage::{keys, CacheCategory, CacheTarget, TieredCache};

use crate::config::AcquisitionConfig;
use crate::grid::{GridFetchCoordinator, GridReport};
use crate::history::{HistoryOutcome, IncrementalHistorySync};
use crate::risk::RiskClassifier;
use crate::spatial;
use crate::stats::{ServiceStats, ServiceStatsSnapshot};
use crate::status::FetchStatus;

/// Most stations accepted in one bulk history request.
pub const MAX_BULK_STATIONS: usize = 100;

/// Concurrent threshold lookups on a cache miss.
const THRESHOLD_LOOKUP_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct StationsResponse {
    pub bbox: BoundingBox,
    pub hours: u32,
    pub stations: Vec<Station>,
    pub served_from_cache: bool,
    pub status: FetchStatus,
    /// Cell accounting when the response came from upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<GridReport>,
}

/// A feature with the station it is associated with, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterwayOverlay {
    #[serde(flatten)]
    pub feature: GeometryFeature,
    pub nearest_station_id: Option<String>,
    pub distance_miles: Option<f64>,
    pub risk: RiskLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaterwaysResponse {
    pub bbox: BoundingBox,
    pub features: Vec<WaterwayOverlay>,
    pub served_from_cache: bool,
    pub status: FetchStatus,
}

/// Optional narrowing of a waterway request.
#[derive(Debug, Clone, Default)]
pub struct WaterwayFilter {
    pub name: Option<String>,
    /// Empty means every kind.
    pub kinds: Vec<FeatureKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsReport {
    pub backend: &'static str,
    pub enabled: bool,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
    pub hit_rate_percent: f64,
    pub service: ServiceStatsSnapshot,
}

pub struct HydroDataService {
    config: AcquisitionConfig,
    cache: TieredCache,
    grid: GridFetchCoordinator,
    history: IncrementalHistorySync,
    geometry: Arc<dyn GeometryProvider>,
    thresholds: Arc<dyn ThresholdSource>,
    classifier: RiskClassifier,
    geometry_retry: RetryPolicy,
    stats: Arc<ServiceStats>,
}

impl HydroDataService {
    pub fn new(
        config: AcquisitionConfig,
        cache: TieredCache,
        telemetry: Arc<dyn TelemetryProvider>,
        geometry: Arc<dyn GeometryProvider>,
        thresholds: Arc<dyn ThresholdSource>,
        classifier: RiskClassifier,
    ) -> Self {
        let stats = Arc::new(ServiceStats::new());
        let grid = GridFetchCoordinator::new(telemetry.clone(), &config, stats.clone());
        let history =
            IncrementalHistorySync::new(telemetry, cache.clone(), &config, stats.clone());
        let geometry_retry = config.fetch_retry();

        Self {
            config,
            cache,
            grid,
            history,
            geometry,
            thresholds,
            classifier,
            geometry_retry,
            stats,
        }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn stats(&self) -> ServiceStatsSnapshot {
        self.stats.snapshot()
    }

    fn check_hours(&self, hours: u32) -> HydroResult<u32> {
        if hours == 0 || hours > self.config.max_hours {
            return Err(HydroError::invalid_parameter(
                "hours",
                format!("must be between 1 and {}", self.config.max_hours),
            ));
        }
        Ok(hours)
    }

    // ========================================================================
    // Stations
    // ========================================================================

    /// Stations in `bbox` with their last `hours` of readings and a risk
    /// level.
    #[instrument(skip(self, bbox), fields(bbox = %bbox.cache_key()))]
    pub async fn get_stations(
        &self,
        bbox: &BoundingBox,
        hours: u32,
    ) -> HydroResult<StationsResponse> {
        let hours = self.check_hours(hours)?;
        let bbox = bbox.validated_or_clamped()?;
        let bbox_key = bbox.cache_key();
        let key = keys::stations(&bbox_key, hours);

        if let Some(stations) = self.cache.get::<Vec<Station>>(&key).await {
            self.stats.record_station_lookup(true);
            debug!(stations = stations.len(), "Stations served from cache");
            let status = if stations.is_empty() {
                FetchStatus::NoData
            } else {
                FetchStatus::Complete
            };
            return Ok(StationsResponse {
                bbox,
                hours,
                stations,
                served_from_cache: true,
                status,
                report: None,
            });
        }
        self.stats.record_station_lookup(false);

        let outcome = self
            .grid
            .fetch(&bbox, hours, &self.config.parameter_codes)
            .await;
        let mut stations = outcome.stations;
        self.classify_stations(&mut stations).await;

        // Only results with no failed units are reused for the TTL.
        if matches!(outcome.status, FetchStatus::Complete | FetchStatus::NoData) {
            self.cache
                .set(&key, &stations, CacheCategory::CurrentReadings)
                .await;
        }
        if !stations.is_empty() {
            self.write_snapshots(&bbox_key, &stations).await;
        }

        info!(
            stations = stations.len(),
            status = outcome.status.as_str(),
            "Stations fetched from upstream"
        );

        Ok(StationsResponse {
            bbox,
            hours,
            stations,
            served_from_cache: false,
            status: outcome.status,
            report: Some(outcome.report),
        })
    }

    async fn write_snapshots(&self, bbox_key: &str, stations: &[Station]) {
        let current: Vec<StationSummary> = stations.iter().map(StationSummary::from).collect();
        let metadata: Vec<StationSummary> = current.iter().map(|s| s.metadata_only()).collect();

        self.cache
            .set(
                &keys::station_snapshot(bbox_key),
                &current,
                CacheCategory::CurrentReadings,
            )
            .await;
        self.cache
            .set(
                &keys::station_metadata(bbox_key),
                &metadata,
                CacheCategory::StationMetadata,
            )
            .await;
    }

    async fn classify_stations(&self, stations: &mut [Station]) {
        let gauge_ids: Vec<String> = stations
            .iter()
            .filter(|s| s.parameter_kind() == ParameterKind::GageHeight)
            .map(|s| s.id.clone())
            .collect();
        let thresholds = self.resolve_thresholds(&gauge_ids).await;

        for station in stations.iter_mut() {
            let t = thresholds.get(&station.id).and_then(|t| t.as_ref());
            station.risk = self
                .classifier
                .classify(station.latest_value(), station.parameter_kind(), t);
        }
    }

    /// Thresholds for `station_ids`, through the cache.
    ///
    /// Known-absent thresholds are cached as `null` so stations without
    /// official stages are not looked up again for the TTL. Lookup failures
    /// are left out of the map and not cached.
    pub async fn resolve_thresholds(
        &self,
        station_ids: &[String],
    ) -> HashMap<String, Option<StageThresholds>> {
        let mut resolved = HashMap::with_capacity(station_ids.len());
        if station_ids.is_empty() {
            return resolved;
        }

        let cache_keys: Vec<String> = station_ids.iter().map(|id| keys::thresholds(id)).collect();
        let cached: Vec<Option<Option<StageThresholds>>> = self.cache.multi_get(&cache_keys).await;

        let mut misses = Vec::new();
        for (id, entry) in station_ids.iter().zip(cached) {
            match entry {
                Some(t) => {
                    resolved.insert(id.clone(), t);
                }
                None => misses.push(id.clone()),
            }
        }
        if misses.is_empty() {
            return resolved;
        }

        let source = &self.thresholds;
        let looked_up: Vec<(String, Option<Option<StageThresholds>>)> = stream::iter(misses)
            .map(|id| async move {
                match source.thresholds(&id).await {
                    Ok(t) => (id, Some(t)),
                    Err(e) => {
                        warn!(station = %id, error = %e, "Threshold lookup failed");
                        (id, None)
                    }
                }
            })
            .buffer_unordered(THRESHOLD_LOOKUP_CONCURRENCY)
            .collect()
            .await;

        let mut writes = Vec::new();
        for (id, found) in looked_up {
            if let Some(t) = found {
                writes.push((keys::thresholds(&id), t));
                resolved.insert(id, t);
            }
        }
        self.cache
            .multi_set(&writes, CacheCategory::StageThresholds)
            .await;

        resolved
    }

    // ========================================================================
    // Waterways
    // ========================================================================

    /// Water-body features in `bbox`, each with its nearest station and that
    /// station's risk.
    #[instrument(skip(self, bbox, filter), fields(bbox = %bbox.cache_key()))]
    pub async fn get_waterways(
        &self,
        bbox: &BoundingBox,
        filter: &WaterwayFilter,
    ) -> HydroResult<WaterwaysResponse> {
        let bbox = bbox.validated_or_clamped()?;
        let bbox_key = bbox.cache_key();
        let key = keys::waterways(&bbox_key, filter.name.as_deref());

        let (features, served_from_cache, status) =
            match self.cache.get::<Vec<GeometryFeature>>(&key).await {
                Some(features) => {
                    self.stats.record_waterway_lookup(true);
                    (features, true, FetchStatus::Complete)
                }
                None => {
                    self.stats.record_waterway_lookup(false);
                    self.fetch_features(&bbox, filter, &key).await
                }
            };

        let features: Vec<GeometryFeature> = features
            .into_iter()
            .filter(|f| filter.kinds.is_empty() || filter.kinds.contains(&f.kind))
            .collect();

        let stations = self.overlay_stations(&bbox_key).await;
        let radius = self.config.association_radius_miles;
        let overlays = features
            .into_iter()
            .map(|feature| {
                let hit = spatial::nearest(&feature, &stations, radius);
                WaterwayOverlay {
                    nearest_station_id: hit.map(|h| h.station.id.clone()),
                    distance_miles: hit.map(|h| h.distance_miles),
                    risk: hit.map(|h| h.station.risk).unwrap_or_default(),
                    feature,
                }
            })
            .collect::<Vec<_>>();

        let status = if status == FetchStatus::Complete && overlays.is_empty() {
            FetchStatus::NoData
        } else {
            status
        };

        Ok(WaterwaysResponse {
            bbox,
            features: overlays,
            served_from_cache,
            status,
        })
    }

    async fn fetch_features(
        &self,
        bbox: &BoundingBox,
        filter: &WaterwayFilter,
        key: &str,
    ) -> (Vec<GeometryFeature>, bool, FetchStatus) {
        let mut query = GeometryQuery::new(*bbox);
        if let Some(name) = &filter.name {
            query = query.with_name(name.clone());
        }

        let geometry = &self.geometry;
        let stats = &self.stats;
        let query = &query;
        let outcome = self
            .geometry_retry
            .run("geometry", |_attempt| async move {
                let result = geometry.fetch_features(query).await;
                stats.record_upstream_request(geometry.name(), result.is_ok());
                result
            })
            .await;

        match outcome.result {
            Ok(features) => {
                let features: Vec<GeometryFeature> =
                    features.into_iter().filter_map(|f| f.normalized()).collect();
                self.cache.set(key, &features, CacheCategory::Geometry).await;
                info!(features = features.len(), "Waterways fetched from upstream");
                (features, false, FetchStatus::Complete)
            }
            Err(e) => {
                warn!(error = %e, attempts = outcome.attempts, "Waterway fetch failed");
                (Vec::new(), false, FetchStatus::Failed)
            }
        }
    }

    /// Stations to associate features with: the current snapshot, else the
    /// readings-free metadata snapshot.
    async fn overlay_stations(&self, bbox_key: &str) -> Vec<StationSummary> {
        if let Some(current) = self
            .cache
            .get::<Vec<StationSummary>>(&keys::station_snapshot(bbox_key))
            .await
        {
            return current;
        }
        self.cache
            .get::<Vec<StationSummary>>(&keys::station_metadata(bbox_key))
            .await
            .map(|meta| meta.iter().map(StationSummary::metadata_only).collect())
            .unwrap_or_default()
    }

    // ========================================================================
    // History
    // ========================================================================

    pub async fn get_history(
        &self,
        station_id: &str,
        hours: u32,
        parameter_code: &str,
    ) -> HydroResult<HistoryOutcome> {
        self.get_history_at(station_id, hours, parameter_code, Utc::now())
            .await
    }

    pub async fn get_history_at(
        &self,
        station_id: &str,
        hours: u32,
        parameter_code: &str,
        now: DateTime<Utc>,
    ) -> HydroResult<HistoryOutcome> {
        check_station_id(station_id)?;
        check_parameter_code(parameter_code)?;
        let hours = self.check_hours(hours)?;
        Ok(self
            .history
            .sync_at(station_id, parameter_code, hours, now)
            .await)
    }

    pub async fn get_histories(
        &self,
        station_ids: &[String],
        hours: u32,
        parameter_code: &str,
    ) -> HydroResult<Vec<HistoryOutcome>> {
        self.get_histories_at(station_ids, hours, parameter_code, Utc::now())
            .await
    }

    pub async fn get_histories_at(
        &self,
        station_ids: &[String],
        hours: u32,
        parameter_code: &str,
        now: DateTime<Utc>,
    ) -> HydroResult<Vec<HistoryOutcome>> {
        if station_ids.len() > MAX_BULK_STATIONS {
            return Err(HydroError::invalid_parameter(
                "station_ids",
                format!("at most {} stations per request", MAX_BULK_STATIONS),
            ));
        }
        for id in station_ids {
            check_station_id(id)?;
        }
        check_parameter_code(parameter_code)?;
        let hours = self.check_hours(hours)?;
        Ok(self
            .history
            .sync_many_at(station_ids, parameter_code, hours, now)
            .await)
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Clear cached entries. Returns the number of keys deleted.
    pub async fn invalidate(&self, target: &CacheTarget) -> u64 {
        let deleted = self.cache.invalidate(target).await;
        info!(target = ?target, deleted = deleted, "Cache invalidated");
        deleted
    }

    pub fn cache_stats(&self) -> CacheStatsReport {
        let s = self.cache.stats();
        CacheStatsReport {
            backend: self.cache.backend(),
            enabled: self.cache.is_enabled(),
            hits: s.hits.load(Ordering::Relaxed),
            misses: s.misses.load(Ordering::Relaxed),
            writes: s.writes.load(Ordering::Relaxed),
            errors: s.errors.load(Ordering::Relaxed),
            hit_rate_percent: s.hit_rate(),
            service: self.stats.snapshot(),
        }
    }

    pub async fn cache_ready(&self) -> bool {
        self.cache.ping().await
    }
}

/// Station ids become cache key segments, so only plain identifiers pass.
fn check_station_id(id: &str) -> HydroResult<()> {
    let ok = !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(HydroError::invalid_parameter(
            "station_id",
            format!("invalid station id '{}'", id),
        ))
    }
}

fn check_parameter_code(code: &str) -> HydroResult<()> {
    if code.len() == 5 && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(HydroError::invalid_parameter(
            "parameter",
            format!("invalid parameter code '{}'", code),
        ))
    }
}
