//! Common fixtures for hydro data layer tests.

use hydro_common::{BoundingBox, StageThresholds};

/// Recorded provider responses, shared with the providers crate's own tests.
pub mod responses {
    /// Instantaneous-values area response for three Illinois River sites.
    pub const USGS_IV: &str = include_str!("../../providers/tests/fixtures/usgs_iv.json");

    /// Overpass response with a river, a stream, a lake, a degenerate way
    /// and a multi-way reservoir relation.
    pub const OVERPASS: &str = include_str!("../../providers/tests/fixtures/overpass.json");
}

/// Bounding boxes used across the test suite.
pub mod boxes {
    use super::BoundingBox;

    /// Around Peoria, IL. Small enough for a single area request.
    pub fn peoria() -> BoundingBox {
        BoundingBox::new(41.0, 40.0, -89.0, -90.0)
    }

    /// Southwest US box whose latitude span (10.7 deg) exceeds the area
    /// limit, forcing a 6x6 grid.
    pub fn oversized_southwest() -> BoundingBox {
        BoundingBox::new(36.5, 25.8, -93.5, -106.7)
    }
}

/// Illinois River at Kingston Mines.
pub const KINGSTON_MINES_ID: &str = "05568500";

pub const KINGSTON_MINES_THRESHOLDS: StageThresholds = StageThresholds {
    action_stage: 14.0,
    flood_stage: 16.0,
    moderate_flood_stage: 20.0,
    major_flood_stage: 24.0,
};

/// 2024-05-01T12:00:00Z.
pub const REFERENCE_MILLIS: i64 = 1_714_564_800_000;

pub const MINUTE_MILLIS: i64 = 60 * 1000;
pub const HOUR_MILLIS: i64 = 60 * MINUTE_MILLIS;
