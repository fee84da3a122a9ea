//! Cache administration.

use std::str::FromStr;
use std::sync::Arc;

use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use acquisition::CacheStatsReport;
use hydro_common::HydroError;
use storage::{keys, CacheCategory, CacheTarget};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Body of an invalidation request. Exactly one of `category`, `pattern`
/// or `all` must be set.
#[derive(Debug, Default, Deserialize)]
pub struct InvalidateRequest {
    pub category: Option<String>,
    pub pattern: Option<String>,
    #[serde(default)]
    pub all: bool,
}

impl InvalidateRequest {
    pub fn target(&self) -> Result<CacheTarget, HydroError> {
        match (&self.category, &self.pattern, self.all) {
            (Some(category), None, false) => {
                Ok(CacheTarget::Category(CacheCategory::from_str(category)?))
            }
            (None, Some(pattern), false) => {
                // keys outside the namespace belong to other tenants of the store
                let prefix = format!("{}:", keys::NAMESPACE);
                if !pattern.starts_with(&prefix) {
                    return Err(HydroError::invalid_parameter(
                        "pattern",
                        format!("pattern must start with '{}'", prefix),
                    ));
                }
                // both stores agree only on `*` and `?`
                if pattern.contains(['[', ']', '\\']) {
                    return Err(HydroError::invalid_parameter(
                        "pattern",
                        "only '*' and '?' wildcards are supported",
                    ));
                }
                Ok(CacheTarget::Pattern(pattern.clone()))
            }
            (None, None, true) => Ok(CacheTarget::All),
            _ => Err(HydroError::invalid_parameter(
                "body",
                "exactly one of category, pattern or all is required",
            )),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub deleted: u64,
    pub target: String,
}

/// POST /admin/cache/invalidate
#[instrument(skip(state))]
pub async fn invalidate_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<InvalidateRequest>,
) -> ApiResult<Json<InvalidateResponse>> {
    let target = request.target().map_err(ApiError::from)?;
    let deleted = state.service.invalidate(&target).await;
    info!(target = ?target, deleted, "Admin cache invalidation");
    Ok(Json(InvalidateResponse {
        deleted,
        target: format!("{:?}", target),
    }))
}

/// GET /admin/cache/stats
pub async fn cache_stats_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<CacheStatsReport> {
    Json(state.service.cache_stats())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_target() {
        let req = InvalidateRequest {
            category: Some("geometry".into()),
            ..Default::default()
        };
        assert_eq!(
            req.target().unwrap(),
            CacheTarget::Category(CacheCategory::Geometry)
        );
    }

    #[test]
    fn test_pattern_must_be_namespaced() {
        let ok = InvalidateRequest {
            pattern: Some("hydro:history:05568500:*".into()),
            ..Default::default()
        };
        assert!(ok.target().is_ok());

        let foreign = InvalidateRequest {
            pattern: Some("*".into()),
            ..Default::default()
        };
        assert!(foreign.target().is_err());
    }

    #[test]
    fn test_pattern_rejects_character_classes() {
        for pattern in ["hydro:history:0556[0-9]*", "hydro:history:\\*"] {
            let req = InvalidateRequest {
                pattern: Some(pattern.into()),
                ..Default::default()
            };
            assert!(req.target().is_err(), "{pattern}");
        }

        let wildcards = InvalidateRequest {
            pattern: Some("hydro:history:0556850?:*".into()),
            ..Default::default()
        };
        assert!(wildcards.target().is_ok());
    }

    #[test]
    fn test_ambiguous_body_rejected() {
        assert!(InvalidateRequest::default().target().is_err());
        let both = InvalidateRequest {
            category: Some("geometry".into()),
            all: true,
            ..Default::default()
        };
        assert!(both.target().is_err());
    }
}
