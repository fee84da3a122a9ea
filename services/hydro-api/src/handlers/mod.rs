//! HTTP request handlers.
//!
//! This module is organized into submodules:
//! - `stations`: station readings for a bounding box
//! - `waterways`: water-body features with nearest-station overlay
//! - `history`: single and bulk station history
//! - `admin`: cache statistics and invalidation
//! - `health`: liveness, readiness and Prometheus metrics
//! - `common`: shared query parsing

pub mod admin;
pub mod common;
pub mod health;
pub mod history;
pub mod stations;
pub mod waterways;

pub use admin::{cache_stats_handler, invalidate_handler, InvalidateRequest, InvalidateResponse};
pub use common::BboxParams;
pub use health::{health_handler, metrics_handler, ready_handler};
pub use history::{bulk_history_handler, history_handler, BulkHistoryRequest, BulkHistoryResponse};
pub use stations::stations_handler;
pub use waterways::waterways_handler;
