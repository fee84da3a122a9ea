//! Grid fetch behavior against a scripted telemetry provider.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use acquisition::{decompose, AcquisitionConfig, FetchStatus, GridFetchCoordinator, ServiceStats};
use hydro_common::{BoundingBox, Station};
use providers::UpstreamError;
use test_utils::{boxes, create_station, FakeTelemetry};

fn fast_config() -> AcquisitionConfig {
    AcquisitionConfig::default().without_delays()
}

fn codes() -> Vec<String> {
    vec!["00065".to_string()]
}

/// One station at the cell center plus a station every cell reports, named
/// after the cell that returned it.
fn cell_stations(bbox: &BoundingBox) -> Vec<Station> {
    let mut own = create_station(
        &format!("center-{}", bbox.cache_key()),
        bbox.center_lat(),
        bbox.center_lon(),
        "00065",
        &[5.0],
    );
    own.name = "own".to_string();
    let mut shared = create_station("shared", 30.0, -100.0, "00065", &[5.0]);
    shared.name = bbox.cache_key();
    vec![own, shared]
}

#[tokio::test]
async fn test_oversized_box_with_two_timed_out_cells() {
    let bbox = boxes::oversized_southwest();
    let cells = decompose(&bbox, 6, 6);
    let failing = vec![cells[7].bbox, cells[22].bbox];

    let failing_cells = failing.clone();
    let telemetry = Arc::new(FakeTelemetry::with_area(move |b| {
        if failing_cells.contains(b) {
            Err(UpstreamError::Timeout(Duration::from_secs(60)))
        } else {
            Ok(cell_stations(b))
        }
    }));
    let stats = Arc::new(ServiceStats::new());
    let grid = GridFetchCoordinator::new(telemetry.clone(), &fast_config(), stats.clone());

    let outcome = grid.fetch(&bbox, 6, &codes()).await;

    assert_eq!(outcome.status, FetchStatus::PartialSuccess);
    assert_eq!(outcome.report.cells_total, 36);
    assert_eq!(outcome.report.attempted, 36);
    assert_eq!(outcome.report.succeeded, 34);
    assert_eq!(outcome.report.failed, 2);
    assert_eq!(outcome.report.skipped, 0);

    // 34 cells succeed first time, 2 cells use all 3 attempts
    assert_eq!(telemetry.area_call_count(), 34 + 2 * 3);

    // 34 cell-center stations plus the shared one, kept once
    assert_eq!(outcome.stations.len(), 35);
    let shared: Vec<&Station> = outcome.stations.iter().filter(|s| s.id == "shared").collect();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].name, cells[0].bbox.cache_key());

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.grid_cells_attempted, 36);
    assert_eq!(snapshot.grid_cells_failed, 2);
    assert_eq!(snapshot.upstream_requests, 40);
    assert_eq!(snapshot.upstream_failures, 6);
}

#[tokio::test]
async fn test_every_cell_requested_and_cells_cover_the_box() {
    let bbox = boxes::oversized_southwest();
    let telemetry = Arc::new(FakeTelemetry::empty());
    let grid = GridFetchCoordinator::new(
        telemetry.clone(),
        &fast_config(),
        Arc::new(ServiceStats::new()),
    );

    let outcome = grid.fetch(&bbox, 6, &codes()).await;
    assert_eq!(outcome.status, FetchStatus::NoData);

    let requested = telemetry.area_calls();
    assert_eq!(requested.len(), 36);
    let distinct: HashSet<String> = requested.iter().map(|b| b.cache_key()).collect();
    assert_eq!(distinct.len(), 36);

    let south = requested.iter().map(|b| b.south).fold(f64::INFINITY, f64::min);
    let north = requested.iter().map(|b| b.north).fold(f64::NEG_INFINITY, f64::max);
    let west = requested.iter().map(|b| b.west).fold(f64::INFINITY, f64::min);
    let east = requested.iter().map(|b| b.east).fold(f64::NEG_INFINITY, f64::max);
    assert_eq!((south, north, west, east), (25.8, 36.5, -106.7, -93.5));

    let area: f64 = requested.iter().map(|b| b.height() * b.width()).sum();
    test_utils::assert_approx_eq!(area, bbox.height() * bbox.width(), 1e-6);
}

#[tokio::test]
async fn test_permanent_errors_are_not_retried() {
    let telemetry = Arc::new(FakeTelemetry::with_area(|_| {
        Err(UpstreamError::Http { status: 400 })
    }));
    let grid = GridFetchCoordinator::new(
        telemetry.clone(),
        &fast_config(),
        Arc::new(ServiceStats::new()),
    );

    let outcome = grid.fetch(&boxes::oversized_southwest(), 6, &codes()).await;

    assert_eq!(outcome.status, FetchStatus::Failed);
    assert_eq!(outcome.report.failed, 36);
    assert_eq!(telemetry.area_call_count(), 36);
    assert!(outcome.stations.is_empty());
}

#[tokio::test]
async fn test_small_box_is_one_request() {
    let telemetry = Arc::new(FakeTelemetry::with_stations(vec![
        create_station("a", 40.5, -89.5, "00065", &[3.0]),
        create_station("b", 40.6, -89.6, "00060", &[900.0]),
    ]));
    let grid = GridFetchCoordinator::new(
        telemetry.clone(),
        &fast_config(),
        Arc::new(ServiceStats::new()),
    );

    let outcome = grid.fetch(&boxes::peoria(), 6, &codes()).await;

    assert_eq!(telemetry.area_call_count(), 1);
    assert_eq!(telemetry.area_calls()[0], boxes::peoria());
    assert_eq!(outcome.report.cells_total, 1);
    assert_eq!(outcome.status, FetchStatus::Complete);
    assert_eq!(outcome.stations.len(), 2);
}

#[tokio::test]
async fn test_transient_failure_recovers_within_budget() {
    let attempts = std::sync::atomic::AtomicU32::new(0);
    let telemetry = Arc::new(FakeTelemetry::with_area(move |_| {
        if attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 2 {
            Err(UpstreamError::Http { status: 503 })
        } else {
            Ok(vec![create_station("a", 40.5, -89.5, "00065", &[3.0])])
        }
    }));
    let grid = GridFetchCoordinator::new(
        telemetry.clone(),
        &fast_config(),
        Arc::new(ServiceStats::new()),
    );

    let outcome = grid.fetch(&boxes::peoria(), 6, &codes()).await;

    assert_eq!(telemetry.area_call_count(), 3);
    assert_eq!(outcome.status, FetchStatus::Complete);
    assert_eq!(outcome.stations.len(), 1);
}

#[tokio::test]
async fn test_cells_outside_limits_are_skipped() {
    // a 1x1 grid leaves the oversized box as its only cell
    let config = AcquisitionConfig {
        grid_rows: 1,
        grid_cols: 1,
        ..fast_config()
    };
    let telemetry = Arc::new(FakeTelemetry::empty());
    let grid = GridFetchCoordinator::new(telemetry.clone(), &config, Arc::new(ServiceStats::new()));

    let outcome = grid.fetch(&boxes::oversized_southwest(), 6, &codes()).await;

    assert_eq!(telemetry.area_call_count(), 0);
    assert_eq!(outcome.report.skipped, 1);
    assert_eq!(outcome.report.attempted, 0);
    assert_eq!(outcome.status, FetchStatus::NoData);
}

#[tokio::test]
async fn test_concurrent_cells_keep_first_wins_order() {
    let config = AcquisitionConfig {
        cell_concurrency: 4,
        ..fast_config()
    };
    let bbox = boxes::oversized_southwest();
    let cells = decompose(&bbox, 6, 6);
    let telemetry = Arc::new(FakeTelemetry::with_area(|b| Ok(cell_stations(b))));
    let grid = GridFetchCoordinator::new(telemetry, &config, Arc::new(ServiceStats::new()));

    let outcome = grid.fetch(&bbox, 6, &codes()).await;

    assert_eq!(outcome.status, FetchStatus::Complete);
    assert_eq!(outcome.stations.len(), 37);
    let shared = outcome.stations.iter().find(|s| s.id == "shared").unwrap();
    assert_eq!(shared.name, cells[0].bbox.cache_key());
}

// ============================================================================
// Default delays, on a paused clock
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_default_pacing_separates_cells() {
    let telemetry = Arc::new(FakeTelemetry::empty());
    let grid = GridFetchCoordinator::new(
        telemetry.clone(),
        &AcquisitionConfig::default(),
        Arc::new(ServiceStats::new()),
    );

    let started = tokio::time::Instant::now();
    let outcome = grid.fetch(&boxes::oversized_southwest(), 6, &codes()).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.status, FetchStatus::NoData);
    assert_eq!(telemetry.area_call_count(), 36);
    // 35 gaps of 500ms, nothing after the last cell
    assert!(elapsed >= Duration::from_millis(17_500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(18_000), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_default_retry_delay_between_attempts() {
    let bbox = boxes::oversized_southwest();
    let failing = decompose(&bbox, 6, 6)[3].bbox;
    let telemetry = Arc::new(FakeTelemetry::with_area(move |b| {
        if *b == failing {
            Err(UpstreamError::Http { status: 503 })
        } else {
            Ok(Vec::new())
        }
    }));
    let grid = GridFetchCoordinator::new(
        telemetry.clone(),
        &AcquisitionConfig::default(),
        Arc::new(ServiceStats::new()),
    );

    let started = tokio::time::Instant::now();
    let outcome = grid.fetch(&bbox, 6, &codes()).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.report.failed, 1);
    assert_eq!(telemetry.area_call_count(), 35 + 3);
    // pacing plus two 1s waits before the second and third attempts
    assert!(elapsed >= Duration::from_millis(19_500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(20_000), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_single_request_is_not_paced() {
    let telemetry = Arc::new(FakeTelemetry::empty());
    let grid = GridFetchCoordinator::new(
        telemetry.clone(),
        &AcquisitionConfig::default(),
        Arc::new(ServiceStats::new()),
    );

    let started = tokio::time::Instant::now();
    grid.fetch(&boxes::peoria(), 6, &codes()).await;

    assert_eq!(telemetry.area_call_count(), 1);
    assert!(started.elapsed() < Duration::from_millis(500));
}
