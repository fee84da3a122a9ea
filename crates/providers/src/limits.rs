//! Area constraints of the telemetry provider.
//!
//! The instantaneous-values service rejects a bounding box whose latitude
//! span exceeds 10 degrees, or whose longitude span exceeds 3.5 degrees
//! scaled by the cosine of the box's center latitude. Coordinates are sent
//! with at most 7 decimal places.

use serde::{Deserialize, Serialize};

use hydro_common::bbox::round_to;
use hydro_common::BoundingBox;

/// Decimal places accepted by the provider for bbox coordinates.
pub const COORDINATE_PRECISION: i32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaLimits {
    /// Maximum latitude span in degrees.
    pub max_height_deg: f64,
    /// Longitude span allowance before scaling by `cos(center latitude)`.
    pub width_factor_deg: f64,
}

impl Default for AreaLimits {
    fn default() -> Self {
        Self {
            max_height_deg: 10.0,
            width_factor_deg: 3.5,
        }
    }
}

impl AreaLimits {
    /// Maximum longitude span at a given latitude.
    pub fn max_width_at(&self, center_lat: f64) -> f64 {
        self.width_factor_deg * center_lat.to_radians().cos()
    }

    /// Whether a single request for `bbox` would be accepted.
    pub fn is_valid(&self, bbox: &BoundingBox) -> bool {
        if !bbox.is_finite() {
            return false;
        }
        let height = bbox.height();
        let width = bbox.width();
        height > 0.0
            && width > 0.0
            && height <= self.max_height_deg
            && width <= self.max_width_at(bbox.center_lat())
    }

    /// Round every edge to the provider's coordinate precision.
    pub fn round(bbox: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            round_to(bbox.north, COORDINATE_PRECISION),
            round_to(bbox.south, COORDINATE_PRECISION),
            round_to(bbox.east, COORDINATE_PRECISION),
            round_to(bbox.west, COORDINATE_PRECISION),
        )
    }
}
