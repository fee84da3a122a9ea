//! Per-service counters.
//!
//! Each counter is kept as an atomic on the service instance (so tests can
//! assert on an isolated instance) and mirrored to the `metrics` registry
//! for the Prometheus exporter.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use serde::Serialize;

#[derive(Debug, Default)]
pub struct ServiceStats {
    pub station_cache_hits: AtomicU64,
    pub station_cache_misses: AtomicU64,
    pub waterway_cache_hits: AtomicU64,
    pub waterway_cache_misses: AtomicU64,

    pub upstream_requests: AtomicU64,
    pub upstream_failures: AtomicU64,

    pub grid_cells_attempted: AtomicU64,
    pub grid_cells_skipped: AtomicU64,
    pub grid_cells_failed: AtomicU64,

    pub history_cache_hits: AtomicU64,
    pub history_delta_fetches: AtomicU64,
    pub history_full_fetches: AtomicU64,
    pub history_stale_served: AtomicU64,
}

/// Point-in-time copy of [`ServiceStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceStatsSnapshot {
    pub station_cache_hits: u64,
    pub station_cache_misses: u64,
    pub waterway_cache_hits: u64,
    pub waterway_cache_misses: u64,
    pub upstream_requests: u64,
    pub upstream_failures: u64,
    pub grid_cells_attempted: u64,
    pub grid_cells_skipped: u64,
    pub grid_cells_failed: u64,
    pub history_cache_hits: u64,
    pub history_delta_fetches: u64,
    pub history_full_fetches: u64,
    pub history_stale_served: u64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl ServiceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_station_lookup(&self, hit: bool) {
        if hit {
            bump(&self.station_cache_hits, 1);
            counter!("hydro_station_cache_hits_total").increment(1);
        } else {
            bump(&self.station_cache_misses, 1);
            counter!("hydro_station_cache_misses_total").increment(1);
        }
    }

    pub fn record_waterway_lookup(&self, hit: bool) {
        if hit {
            bump(&self.waterway_cache_hits, 1);
            counter!("hydro_waterway_cache_hits_total").increment(1);
        } else {
            bump(&self.waterway_cache_misses, 1);
            counter!("hydro_waterway_cache_misses_total").increment(1);
        }
    }

    /// One upstream call, counted per attempt.
    pub fn record_upstream_request(&self, provider: &'static str, ok: bool) {
        bump(&self.upstream_requests, 1);
        counter!("hydro_upstream_requests_total", "provider" => provider).increment(1);
        if !ok {
            bump(&self.upstream_failures, 1);
            counter!("hydro_upstream_failures_total", "provider" => provider).increment(1);
        }
    }

    pub fn record_grid_cells(&self, attempted: usize, skipped: usize, failed: usize) {
        bump(&self.grid_cells_attempted, attempted as u64);
        bump(&self.grid_cells_skipped, skipped as u64);
        bump(&self.grid_cells_failed, failed as u64);
        counter!("hydro_grid_cells_attempted_total").increment(attempted as u64);
        counter!("hydro_grid_cells_skipped_total").increment(skipped as u64);
        counter!("hydro_grid_cells_failed_total").increment(failed as u64);
    }

    pub fn record_history_hit(&self) {
        bump(&self.history_cache_hits, 1);
        counter!("hydro_history_cache_hits_total").increment(1);
    }

    pub fn record_history_delta(&self) {
        bump(&self.history_delta_fetches, 1);
        counter!("hydro_history_delta_fetches_total").increment(1);
    }

    pub fn record_history_full(&self) {
        bump(&self.history_full_fetches, 1);
        counter!("hydro_history_full_fetches_total").increment(1);
    }

    pub fn record_history_stale(&self) {
        bump(&self.history_stale_served, 1);
        counter!("hydro_history_stale_served_total").increment(1);
    }

    pub fn snapshot(&self) -> ServiceStatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        ServiceStatsSnapshot {
            station_cache_hits: get(&self.station_cache_hits),
            station_cache_misses: get(&self.station_cache_misses),
            waterway_cache_hits: get(&self.waterway_cache_hits),
            waterway_cache_misses: get(&self.waterway_cache_misses),
            upstream_requests: get(&self.upstream_requests),
            upstream_failures: get(&self.upstream_failures),
            grid_cells_attempted: get(&self.grid_cells_attempted),
            grid_cells_skipped: get(&self.grid_cells_skipped),
            grid_cells_failed: get(&self.grid_cells_failed),
            history_cache_hits: get(&self.history_cache_hits),
            history_delta_fetches: get(&self.history_delta_fetches),
            history_full_fetches: get(&self.history_full_fetches),
            history_stale_served: get(&self.history_stale_served),
        }
    }
}
