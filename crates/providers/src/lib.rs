//! Upstream data providers.
//!
//! - `telemetry`: USGS Instantaneous Values client (station time series)
//! - `geometry`: Overpass client (rivers, streams, lakes, reservoirs)
//! - `thresholds`: stage-threshold registry
//! - `limits`: the telemetry provider's area constraints
//! - `retry`: bounded retry loop shared by grid and bulk fetches

pub mod error;
pub mod geometry;
pub mod limits;
pub mod retry;
pub mod telemetry;
pub mod thresholds;

pub use error::{UpstreamError, UpstreamResult};
pub use geometry::{GeometryProvider, GeometryQuery, OverpassClient};
pub use limits::AreaLimits;
pub use retry::RetryPolicy;
pub use telemetry::{TelemetryProvider, UsgsClient};
pub use thresholds::{StationRegistry, ThresholdSource};
