//! Station history endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    Extension, Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use acquisition::{FetchStatus, HistoryOutcome};
use hydro_common::model::PARAM_GAGE_HEIGHT;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub hours: Option<u32>,
    /// Parameter code, gage height when absent.
    pub parameter: Option<String>,
}

/// GET /api/stations/:id/history
#[instrument(skip(state))]
pub async fn history_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(station_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryOutcome>> {
    counter!("hydro_http_requests_total", "endpoint" => "history").increment(1);
    let hours = params
        .hours
        .unwrap_or(state.service.config().default_hours);
    let parameter = params.parameter.as_deref().unwrap_or(PARAM_GAGE_HEIGHT);
    let outcome = state
        .service
        .get_history(&station_id, hours, parameter)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct BulkHistoryRequest {
    pub station_ids: Vec<String>,
    pub hours: Option<u32>,
    pub parameter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkHistoryResponse {
    pub results: Vec<HistoryOutcome>,
    /// Stations whose history could not be served at all.
    pub failed: usize,
    pub status: FetchStatus,
}

/// POST /api/history
#[instrument(skip_all, fields(stations = request.station_ids.len()))]
pub async fn bulk_history_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<BulkHistoryRequest>,
) -> ApiResult<Json<BulkHistoryResponse>> {
    counter!("hydro_http_requests_total", "endpoint" => "bulk_history").increment(1);
    let hours = request
        .hours
        .unwrap_or(state.service.config().default_hours);
    let parameter = request.parameter.as_deref().unwrap_or(PARAM_GAGE_HEIGHT);

    let results = state
        .service
        .get_histories(&request.station_ids, hours, parameter)
        .await?;

    let failed = results.iter().filter(|r| r.status.is_failure()).count();
    let degraded = results
        .iter()
        .filter(|r| r.status == FetchStatus::PartialSuccess)
        .count();
    let has_data = results.iter().any(|r| !r.points.is_empty());
    let status = if degraded > 0 && failed == 0 {
        FetchStatus::PartialSuccess
    } else {
        FetchStatus::from_counts(results.len(), failed, has_data)
    };

    Ok(Json(BulkHistoryResponse {
        results,
        failed,
        status,
    }))
}
