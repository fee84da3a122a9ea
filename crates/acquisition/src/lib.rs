//! Cached acquisition of station telemetry and water-body geometry.
//!
//! - `grid`: splits oversized boxes into provider-legal cells
//! - `history`: incremental per-station history with delta fetch and merge
//! - `spatial`: nearest-station association for features
//! - `risk`: reading to risk level
//! - `service`: the `HydroDataService` handlers call into

pub mod config;
pub mod grid;
pub mod history;
pub mod risk;
pub mod service;
pub mod spatial;
pub mod stats;
pub mod status;

pub use config::AcquisitionConfig;
pub use grid::{decompose, GridCell, GridFetchCoordinator, GridFetchOutcome, GridReport};
pub use history::{
    merge_series, HistoryOutcome, HistoryRecord, HistorySource, IncrementalHistorySync, SyncPlan,
};
pub use risk::{RiskBands, RiskClassifier, RiskConfig};
pub use service::{
    CacheStatsReport, HydroDataService, StationsResponse, WaterwayFilter, WaterwayOverlay,
    WaterwaysResponse,
};
pub use spatial::{haversine_miles, nearest, Association, Located};
pub use stats::{ServiceStats, ServiceStatsSnapshot};
pub use status::FetchStatus;
