//! Hydro data API.
//!
//! HTTP surface over [`acquisition::HydroDataService`]: station and waterway
//! overlays for a bounding box, per-station history, and cache
//! administration.

pub mod error;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub use state::{AppState, CacheBackend, ServerConfig};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Data endpoints
        .route("/api/stations", get(handlers::stations_handler))
        .route("/api/waterways", get(handlers::waterways_handler))
        .route(
            "/api/stations/:id/history",
            get(handlers::history_handler),
        )
        .route("/api/history", post(handlers::bulk_history_handler))
        // Cache administration
        .route("/admin/cache/invalidate", post(handlers::invalidate_handler))
        .route("/admin/cache/stats", get(handlers::cache_stats_handler))
        // Health check
        .route("/health", get(handlers::health_handler))
        .route("/ready", get(handlers::ready_handler))
        // Metrics
        .route("/metrics", get(handlers::metrics_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
