//! GET /api/waterways

use std::sync::Arc;

use axum::{extract::Query, Extension, Json};
use metrics::counter;
use serde::Deserialize;
use tracing::instrument;

use acquisition::{WaterwayFilter, WaterwaysResponse};
use hydro_common::{FeatureKind, HydroError, HydroResult};

use crate::error::ApiResult;
use crate::handlers::common::BboxParams;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WaterwaysQuery {
    pub north: Option<f64>,
    pub south: Option<f64>,
    pub east: Option<f64>,
    pub west: Option<f64>,
    pub bbox: Option<String>,
    /// Case-insensitive name fragment.
    pub name: Option<String>,
    /// Comma-separated feature kinds, e.g. `river,lake`.
    pub kind: Option<String>,
}

impl WaterwaysQuery {
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

/// Parse a comma-separated kind list. Empty means every kind.
pub fn parse_kinds(raw: Option<&str>) -> HydroResult<Vec<FeatureKind>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            FeatureKind::ALL
                .iter()
                .copied()
                .find(|k| k.as_str().eq_ignore_ascii_case(s))
                .ok_or_else(|| {
                    HydroError::invalid_parameter("kind", format!("unknown feature kind '{}'", s))
                })
        })
        .collect()
}

/// Water-body features in a bounding box, each with its nearest station.
#[instrument(skip(state))]
pub async fn waterways_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<WaterwaysQuery>,
) -> ApiResult<Json<WaterwaysResponse>> {
    counter!("hydro_http_requests_total", "endpoint" => "waterways").increment(1);
    let bbox = params.bbox_params().to_bbox()?;
    let filter = WaterwayFilter {
        name: params.name.filter(|n| !n.trim().is_empty()),
        kinds: parse_kinds(params.kind.as_deref())?,
    };
    let response = state.service.get_waterways(&bbox, &filter).await?;
    Ok(Json(response))
}
