//! GET /api/stations

use std::sync::Arc;

use axum::{extract::Query, Extension, Json};
use metrics::counter;
use serde::Deserialize;
use tracing::instrument;

use acquisition::StationsResponse;

use crate::error::ApiResult;
use crate::handlers::common::BboxParams;
use crate::state::AppState;

// Not a flattened `BboxParams`: flattened query structs cannot parse numbers.
#[derive(Debug, Deserialize)]
pub struct StationsQuery {
    pub north: Option<f64>,
    pub south: Option<f64>,
    pub east: Option<f64>,
    pub west: Option<f64>,
    pub bbox: Option<String>,
    pub hours: Option<u32>,
}

impl StationsQuery {
    fn bbox_params(&self) -> BboxParams {
        BboxParams {
            north: self.north,
            south: self.south,
            east: self.east,
            west: self.west,
            bbox: self.bbox.clone(),
        }
    }
}

/// Stations in a bounding box with recent readings and risk levels.
#[instrument(skip(state))]
pub async fn stations_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<StationsQuery>,
) -> ApiResult<Json<StationsResponse>> {
    counter!("hydro_http_requests_total", "endpoint" => "stations").increment(1);
    let bbox = params.bbox_params().to_bbox()?;
    let hours = params
        .hours
        .unwrap_or(state.service.config().default_hours);
    let response = state.service.get_stations(&bbox, hours).await?;
    Ok(Json(response))
}
