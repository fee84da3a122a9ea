//! Common types and utilities shared across the hydro data layer.

pub mod bbox;
pub mod error;
pub mod model;
pub mod time;

pub use bbox::{BboxParseError, BoundingBox};
pub use error::{HydroError, HydroResult};
pub use model::{
    FeatureKind, GeometryFeature, ParameterKind, ReadingPoint, RiskLevel, StageThresholds,
    Station, StationSummary,
};
pub use time::{iso8601_hours, HistoryWindow};
