//! Incremental station history.
//!
//! Each (station, parameter, hours) series is cached as a [`HistoryRecord`]
//! covering `[from_time, to_time]`. A request is served from the record
//! when it is fresh, topped up with a delta fetch when it is slightly
//! behind, and fetched in full otherwise.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use hydro_common::time::from_millis;
use hydro_common::{HistoryWindow, ReadingPoint};
use providers::{RetryPolicy, TelemetryProvider, UpstreamResult};
use storage::{keys, CacheCategory, TieredCache};

use crate::config::AcquisitionConfig;
use crate::stats::ServiceStats;
use crate::status::FetchStatus;

/// A record is served as-is only if its newest fetch ended this recently.
pub const FRESH_GAP_MILLIS: i64 = 30 * 60 * 1000;
/// A record this far behind is topped up with a delta fetch.
pub const DELTA_MAX_GAP_MILLIS: i64 = 2 * 60 * 60 * 1000;
/// Delta fetches start this long before the record's `to_time`.
pub const DELTA_OVERLAP_MILLIS: i64 = 30 * 60 * 1000;

/// Cached series for one (station, parameter, hours).
///
/// `data` is ascending and unique by timestamp. `from_time`/`to_time` are
/// the full fetched range, which may be wider than `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub data: Vec<ReadingPoint>,
    pub from_time: i64,
    pub to_time: i64,
    pub last_updated: i64,
}

/// What a sync decided to do for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPlan {
    /// Serve the cached record.
    Serve,
    /// Fetch from `start` to now and merge into the cached record.
    Delta { start: i64 },
    /// Fetch the whole window.
    Full,
}

/// Where the returned points came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    Cache,
    Delta,
    Full,
    /// Cached data returned after a failed delta fetch.
    Stale,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryOutcome {
    pub station_id: String,
    pub points: Vec<ReadingPoint>,
    pub source: HistorySource,
    pub status: FetchStatus,
}

/// Decide how to serve `window` given the cached record, if any.
pub fn plan(
    record: Option<&HistoryRecord>,
    window: &HistoryWindow,
    now_millis: i64,
    ttl_millis: i64,
) -> SyncPlan {
    let Some(record) = record else {
        return SyncPlan::Full;
    };
    if record.from_time > window.start_millis {
        return SyncPlan::Full;
    }

    let gap = now_millis - record.to_time;
    let age = now_millis - record.last_updated;
    if age < ttl_millis && gap < FRESH_GAP_MILLIS {
        SyncPlan::Serve
    } else if gap < DELTA_MAX_GAP_MILLIS {
        SyncPlan::Delta {
            start: record.to_time - DELTA_OVERLAP_MILLIS,
        }
    } else {
        SyncPlan::Full
    }
}

/// Union of two series, ascending and unique by timestamp.
///
/// On a timestamp collision the point from `existing` is kept and the
/// incoming one discarded.
pub fn merge_series(existing: &[ReadingPoint], incoming: &[ReadingPoint]) -> Vec<ReadingPoint> {
    let mut by_time: BTreeMap<i64, f64> = BTreeMap::new();
    for p in existing.iter().chain(incoming) {
        by_time.entry(p.timestamp_millis).or_insert(p.value);
    }
    by_time
        .into_iter()
        .map(|(t, v)| ReadingPoint::new(t, v))
        .collect()
}

fn within(points: &[ReadingPoint], window: &HistoryWindow) -> Vec<ReadingPoint> {
    points
        .iter()
        .filter(|p| window.contains(p.timestamp_millis))
        .copied()
        .collect()
}

fn data_status(points: &[ReadingPoint]) -> FetchStatus {
    if points.is_empty() {
        FetchStatus::NoData
    } else {
        FetchStatus::Complete
    }
}

/// Serves station history through the cache.
pub struct IncrementalHistorySync {
    telemetry: Arc<dyn TelemetryProvider>,
    cache: TieredCache,
    retry: RetryPolicy,
    batch_concurrency: usize,
    stats: Arc<ServiceStats>,
}

impl IncrementalHistorySync {
    pub fn new(
        telemetry: Arc<dyn TelemetryProvider>,
        cache: TieredCache,
        config: &AcquisitionConfig,
        stats: Arc<ServiceStats>,
    ) -> Self {
        Self {
            telemetry,
            cache,
            retry: config.fetch_retry(),
            batch_concurrency: config.history_batch_concurrency.max(1),
            stats,
        }
    }

    fn ttl_millis() -> i64 {
        CacheCategory::HistoricalSeries.ttl_secs() as i64 * 1000
    }

    /// Last `hours` of `parameter_code` readings for `station_id`.
    pub async fn sync(&self, station_id: &str, parameter_code: &str, hours: u32) -> HistoryOutcome {
        self.sync_at(station_id, parameter_code, hours, Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn sync_at(
        &self,
        station_id: &str,
        parameter_code: &str,
        hours: u32,
        now: DateTime<Utc>,
    ) -> HistoryOutcome {
        let key = keys::history(station_id, parameter_code, hours);
        let record: Option<HistoryRecord> = self.cache.get(&key).await;

        let (outcome, updated) = self
            .resolve(station_id, parameter_code, hours, record, now)
            .await;

        if let Some(updated) = updated {
            self.cache
                .set(&key, &updated, CacheCategory::HistoricalSeries)
                .await;
        }
        outcome
    }

    /// History for several stations. Results come back in input order,
    /// one per distinct station id.
    pub async fn sync_many(
        &self,
        station_ids: &[String],
        parameter_code: &str,
        hours: u32,
    ) -> Vec<HistoryOutcome> {
        self.sync_many_at(station_ids, parameter_code, hours, Utc::now())
            .await
    }

    #[instrument(skip(self, station_ids), fields(stations = station_ids.len()))]
    pub async fn sync_many_at(
        &self,
        station_ids: &[String],
        parameter_code: &str,
        hours: u32,
        now: DateTime<Utc>,
    ) -> Vec<HistoryOutcome> {
        let mut seen = HashSet::new();
        let ids: Vec<&String> = station_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .collect();
        if ids.is_empty() {
            return Vec::new();
        }

        let cache_keys: Vec<String> = ids
            .iter()
            .map(|id| keys::history(id, parameter_code, hours))
            .collect();
        let records: Vec<Option<HistoryRecord>> = self.cache.multi_get(&cache_keys).await;

        let window = HistoryWindow::ending_at(now, hours);
        let now_millis = now.timestamp_millis();

        let mut results: Vec<Option<HistoryOutcome>> = vec![None; ids.len()];
        let mut pending = Vec::new();

        for (i, (id, record)) in ids.iter().zip(records).enumerate() {
            match (plan(record.as_ref(), &window, now_millis, Self::ttl_millis()), record) {
                (SyncPlan::Serve, Some(record)) => {
                    self.stats.record_history_hit();
                    let points = within(&record.data, &window);
                    results[i] = Some(HistoryOutcome {
                        station_id: id.to_string(),
                        status: data_status(&points),
                        points,
                        source: HistorySource::Cache,
                    });
                }
                (_, record) => pending.push((i, id.to_string(), record)),
            }
        }

        info!(
            cached = ids.len() - pending.len(),
            to_fetch = pending.len(),
            "Partitioned bulk history request"
        );

        let fetched: Vec<(usize, HistoryOutcome, Option<HistoryRecord>)> = stream::iter(pending)
            .map(|(i, id, record)| async move {
                let (outcome, updated) = self
                    .resolve(&id, parameter_code, hours, record, now)
                    .await;
                (i, outcome, updated)
            })
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await;

        let mut writes = Vec::new();
        for (i, outcome, updated) in fetched {
            if let Some(updated) = updated {
                writes.push((keys::history(&outcome.station_id, parameter_code, hours), updated));
            }
            results[i] = Some(outcome);
        }
        if !writes.is_empty() {
            self.cache
                .multi_set(&writes, CacheCategory::HistoricalSeries)
                .await;
        }

        results.into_iter().flatten().collect()
    }

    /// Serve, top up or fetch one series. Returns the outcome and the
    /// record to persist, if it changed.
    async fn resolve(
        &self,
        station_id: &str,
        parameter_code: &str,
        hours: u32,
        record: Option<HistoryRecord>,
        now: DateTime<Utc>,
    ) -> (HistoryOutcome, Option<HistoryRecord>) {
        let window = HistoryWindow::ending_at(now, hours);
        let now_millis = now.timestamp_millis();
        let outcome = |points: Vec<ReadingPoint>, source, status| HistoryOutcome {
            station_id: station_id.to_string(),
            points,
            source,
            status,
        };

        match (plan(record.as_ref(), &window, now_millis, Self::ttl_millis()), record) {
            (SyncPlan::Serve, Some(record)) => {
                self.stats.record_history_hit();
                debug!(station = %station_id, "History served from cache");
                let points = within(&record.data, &window);
                let status = data_status(&points);
                (outcome(points, HistorySource::Cache, status), None)
            }
            (SyncPlan::Delta { start }, Some(record)) => {
                self.stats.record_history_delta();
                match self
                    .fetch(station_id, parameter_code, from_millis(start), now)
                    .await
                {
                    Ok(delta) => {
                        let merged = merge_series(&record.data, &delta);
                        let points = within(&merged, &window);
                        debug!(
                            station = %station_id,
                            delta_points = delta.len(),
                            points = points.len(),
                            "History topped up with delta fetch"
                        );
                        let updated = HistoryRecord {
                            data: points.clone(),
                            from_time: record.from_time,
                            to_time: now_millis,
                            last_updated: now_millis,
                        };
                        let status = data_status(&points);
                        (outcome(points, HistorySource::Delta, status), Some(updated))
                    }
                    Err(e) => {
                        self.stats.record_history_stale();
                        warn!(
                            station = %station_id,
                            error = %e,
                            "Delta fetch failed, serving cached history"
                        );
                        let points = within(&record.data, &window);
                        (
                            outcome(points, HistorySource::Stale, FetchStatus::PartialSuccess),
                            None,
                        )
                    }
                }
            }
            _ => {
                self.stats.record_history_full();
                match self
                    .fetch(station_id, parameter_code, window.start(), now)
                    .await
                {
                    Ok(fetched) => {
                        let points = within(&merge_series(&[], &fetched), &window);
                        let updated = HistoryRecord {
                            data: points.clone(),
                            from_time: window.start_millis,
                            to_time: now_millis,
                            last_updated: now_millis,
                        };
                        let status = data_status(&points);
                        (outcome(points, HistorySource::Full, status), Some(updated))
                    }
                    Err(e) => {
                        warn!(station = %station_id, error = %e, "History fetch failed");
                        (
                            outcome(Vec::new(), HistorySource::None, FetchStatus::Failed),
                            None,
                        )
                    }
                }
            }
        }
    }

    async fn fetch(
        &self,
        station_id: &str,
        parameter_code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> UpstreamResult<Vec<ReadingPoint>> {
        let telemetry = &self.telemetry;
        let stats = &self.stats;
        let label = format!("history {}", station_id);

        self.retry
            .run(&label, |_attempt| async move {
                let result = telemetry
                    .fetch_history(station_id, parameter_code, start, end)
                    .await;
                stats.record_upstream_request(telemetry.name(), result.is_ok());
                result
            })
            .await
            .result
    }
}
