//! Incremental history sync against an in-memory cache.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use acquisition::{
    AcquisitionConfig, FetchStatus, HistoryRecord, HistorySource, IncrementalHistorySync,
    ServiceStats,
};
use hydro_common::time::from_millis;
use storage::{keys, TieredCache};
use test_utils::{
    create_series, memory_cache, FakeTelemetry, HOUR_MILLIS, MINUTE_MILLIS, REFERENCE_MILLIS,
};

const STATION: &str = "05568500";
const GAGE: &str = "00065";

struct Fixture {
    sync: IncrementalHistorySync,
    telemetry: Arc<FakeTelemetry>,
    cache: TieredCache,
    stats: Arc<ServiceStats>,
}

fn fixture() -> Fixture {
    let telemetry = Arc::new(FakeTelemetry::empty());
    // quarter-hourly readings from 7h before the reference time to 2h after,
    // valued by their index
    telemetry.set_series(
        STATION,
        create_series(REFERENCE_MILLIS - 7 * HOUR_MILLIS, 15 * MINUTE_MILLIS, 37, 0.0),
    );
    let cache = memory_cache();
    let stats = Arc::new(ServiceStats::new());
    let config = AcquisitionConfig::default().without_delays();
    let sync =
        IncrementalHistorySync::new(telemetry.clone(), cache.clone(), &config, stats.clone());
    Fixture {
        sync,
        telemetry,
        cache,
        stats,
    }
}

fn reference() -> DateTime<Utc> {
    from_millis(REFERENCE_MILLIS)
}

fn assert_sorted_unique(points: &[hydro_common::ReadingPoint]) {
    assert!(points
        .windows(2)
        .all(|w| w[0].timestamp_millis < w[1].timestamp_millis));
}

#[tokio::test]
async fn test_full_then_cached_then_delta() {
    let f = fixture();
    let now0 = reference();

    let first = f.sync.sync_at(STATION, GAGE, 6, now0).await;
    assert_eq!(first.source, HistorySource::Full);
    assert_eq!(first.status, FetchStatus::Complete);
    assert_eq!(first.points.len(), 25);
    assert_eq!(f.telemetry.history_call_count(), 1);
    assert_eq!(f.telemetry.history_calls()[0].start, now0 - Duration::hours(6));

    // ten minutes later the record is fresh
    let second = f
        .sync
        .sync_at(STATION, GAGE, 6, now0 + Duration::minutes(10))
        .await;
    assert_eq!(second.source, HistorySource::Cache);
    assert_eq!(f.telemetry.history_call_count(), 1);

    // an hour later only the gap (plus overlap) is fetched
    let now2 = now0 + Duration::hours(1);
    let third = f.sync.sync_at(STATION, GAGE, 6, now2).await;
    assert_eq!(third.source, HistorySource::Delta);
    assert_eq!(f.telemetry.history_call_count(), 2);
    let delta_call = &f.telemetry.history_calls()[1];
    assert_eq!(delta_call.start, now0 - Duration::minutes(30));
    assert_eq!(delta_call.end, now2);

    assert_eq!(third.points.len(), 25);
    assert_sorted_unique(&third.points);
    assert_eq!(
        third.points.first().map(|p| p.timestamp_millis),
        Some(REFERENCE_MILLIS - 5 * HOUR_MILLIS)
    );
    assert_eq!(
        third.points.last().map(|p| p.timestamp_millis),
        Some(REFERENCE_MILLIS + HOUR_MILLIS)
    );

    let record: HistoryRecord = f
        .cache
        .get(&keys::history(STATION, GAGE, 6))
        .await
        .expect("record cached");
    assert_eq!(record.from_time, REFERENCE_MILLIS - 6 * HOUR_MILLIS);
    assert_eq!(record.to_time, now2.timestamp_millis());

    let stats = f.stats.snapshot();
    assert_eq!(stats.history_full_fetches, 1);
    assert_eq!(stats.history_cache_hits, 1);
    assert_eq!(stats.history_delta_fetches, 1);
}

#[tokio::test]
async fn test_delta_keeps_cached_value_on_overlap() {
    let f = fixture();
    let now0 = reference();
    f.sync.sync_at(STATION, GAGE, 6, now0).await;

    // upstream revises every value
    f.telemetry.set_series(
        STATION,
        create_series(REFERENCE_MILLIS - 7 * HOUR_MILLIS, 15 * MINUTE_MILLIS, 37, 100.0),
    );

    let out = f
        .sync
        .sync_at(STATION, GAGE, 6, now0 + Duration::hours(1))
        .await;
    assert_eq!(out.source, HistorySource::Delta);

    let value_at = |t: i64| {
        out.points
            .iter()
            .find(|p| p.timestamp_millis == t)
            .map(|p| p.value)
    };
    // inside the overlap: cached value wins
    assert_eq!(value_at(REFERENCE_MILLIS - 15 * MINUTE_MILLIS), Some(27.0));
    // past the old record: new value
    assert_eq!(value_at(REFERENCE_MILLIS + 15 * MINUTE_MILLIS), Some(129.0));
}

#[tokio::test]
async fn test_failed_delta_serves_stale_cache() {
    let f = fixture();
    let now0 = reference();
    f.sync.sync_at(STATION, GAGE, 6, now0).await;

    f.telemetry.set_history_failing(STATION, true);
    let out = f
        .sync
        .sync_at(STATION, GAGE, 6, now0 + Duration::hours(1))
        .await;

    assert_eq!(out.source, HistorySource::Stale);
    assert_eq!(out.status, FetchStatus::PartialSuccess);
    // cached points still inside the moved window
    assert_eq!(out.points.len(), 21);
    assert_sorted_unique(&out.points);
    // one full fetch, then three delta attempts
    assert_eq!(f.telemetry.history_call_count(), 4);

    // the record is left as it was
    let record: HistoryRecord = f
        .cache
        .get(&keys::history(STATION, GAGE, 6))
        .await
        .expect("record cached");
    assert_eq!(record.to_time, REFERENCE_MILLIS);
    assert_eq!(f.stats.snapshot().history_stale_served, 1);
}

#[tokio::test]
async fn test_failed_full_fetch_returns_nothing() {
    let f = fixture();
    f.telemetry.set_history_failing(STATION, true);

    let out = f.sync.sync_at(STATION, GAGE, 6, reference()).await;

    assert_eq!(out.source, HistorySource::None);
    assert_eq!(out.status, FetchStatus::Failed);
    assert!(out.points.is_empty());
    assert_eq!(f.telemetry.history_call_count(), 3);
    assert!(f
        .cache
        .get::<HistoryRecord>(&keys::history(STATION, GAGE, 6))
        .await
        .is_none());
}

#[tokio::test]
async fn test_old_record_is_refetched_in_full() {
    let f = fixture();
    let now0 = reference();
    f.sync.sync_at(STATION, GAGE, 6, now0).await;

    let out = f
        .sync
        .sync_at(STATION, GAGE, 6, now0 + Duration::hours(2))
        .await;

    assert_eq!(out.source, HistorySource::Full);
    let call = &f.telemetry.history_calls()[1];
    assert_eq!(call.start, now0 - Duration::hours(4));
}

#[tokio::test]
async fn test_bulk_partitions_cached_and_missing() {
    let f = fixture();
    let now0 = reference();
    f.telemetry.set_series(
        "05568000",
        create_series(REFERENCE_MILLIS - 2 * HOUR_MILLIS, HOUR_MILLIS, 3, 1000.0),
    );

    f.sync.sync_at(STATION, GAGE, 6, now0).await;
    f.telemetry.reset_calls();

    let ids = vec![
        STATION.to_string(),
        "05568000".to_string(),
        STATION.to_string(),
        "05570000".to_string(),
    ];
    let results = f
        .sync
        .sync_many_at(&ids, GAGE, 6, now0 + Duration::minutes(5))
        .await;

    let order: Vec<&str> = results.iter().map(|r| r.station_id.as_str()).collect();
    assert_eq!(order, vec![STATION, "05568000", "05570000"]);

    assert_eq!(results[0].source, HistorySource::Cache);
    assert_eq!(results[1].source, HistorySource::Full);
    assert_eq!(results[1].points.len(), 3);
    assert_eq!(results[2].source, HistorySource::Full);
    assert_eq!(results[2].status, FetchStatus::NoData);

    // only the two uncached stations reached upstream
    let fetched: Vec<String> = f
        .telemetry
        .history_calls()
        .into_iter()
        .map(|c| c.station_id)
        .collect();
    assert_eq!(fetched.len(), 2);
    assert!(!fetched.contains(&STATION.to_string()));

    // both new records were written back
    let cached: Vec<Option<HistoryRecord>> = f
        .cache
        .multi_get(&[
            keys::history("05568000", GAGE, 6),
            keys::history("05570000", GAGE, 6),
        ])
        .await;
    assert!(cached.iter().all(|r| r.is_some()));
}

#[tokio::test]
async fn test_bulk_failure_is_isolated_per_station() {
    let f = fixture();
    let now0 = reference();
    f.telemetry.set_series(
        "05567500",
        create_series(REFERENCE_MILLIS - 2 * HOUR_MILLIS, HOUR_MILLIS, 3, 12.0),
    );
    f.telemetry.set_history_failing("05568000", true);

    let ids = vec![
        STATION.to_string(),
        "05568000".to_string(),
        "05567500".to_string(),
    ];
    let results = f.sync.sync_many_at(&ids, GAGE, 6, now0).await;
    assert_eq!(results.len(), 3);

    assert_eq!(results[0].station_id, STATION);
    assert_eq!(results[0].source, HistorySource::Full);
    assert_eq!(results[0].status, FetchStatus::Complete);
    assert!(!results[0].points.is_empty());
    assert_sorted_unique(&results[0].points);

    assert_eq!(results[1].station_id, "05568000");
    assert_eq!(results[1].source, HistorySource::None);
    assert_eq!(results[1].status, FetchStatus::Failed);
    assert!(results[1].points.is_empty());

    assert_eq!(results[2].station_id, "05567500");
    assert_eq!(results[2].status, FetchStatus::Complete);
    assert_eq!(results[2].points.len(), 3);

    // the failing station used its whole retry budget, the others one call each
    let calls = f.telemetry.history_calls();
    let failing = calls.iter().filter(|c| c.station_id == "05568000").count();
    assert_eq!(failing, 3);
    assert_eq!(calls.len(), 3 + 2);

    let cached: Vec<Option<HistoryRecord>> = f
        .cache
        .multi_get(&[
            keys::history(STATION, GAGE, 6),
            keys::history("05568000", GAGE, 6),
            keys::history("05567500", GAGE, 6),
        ])
        .await;
    assert!(cached[0].is_some());
    assert!(cached[1].is_none());
    assert!(cached[2].is_some());
}

#[tokio::test]
async fn test_bulk_with_no_ids() {
    let f = fixture();
    let results = f.sync.sync_many_at(&[], GAGE, 6, reference()).await;
    assert!(results.is_empty());
    assert_eq!(f.telemetry.history_call_count(), 0);
}

#[tokio::test]
async fn test_disabled_cache_always_fetches() {
    let telemetry = Arc::new(FakeTelemetry::empty());
    let config = AcquisitionConfig::default().without_delays();
    let sync = IncrementalHistorySync::new(
        telemetry.clone(),
        TieredCache::disabled(),
        &config,
        Arc::new(ServiceStats::new()),
    );

    sync.sync_at(STATION, GAGE, 6, reference()).await;
    sync.sync_at(STATION, GAGE, 6, reference()).await;
    assert_eq!(telemetry.history_call_count(), 2);
}
