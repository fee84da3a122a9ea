//! Acquisition layer configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hydro_common::model::{
    PARAM_DISCHARGE, PARAM_GAGE_HEIGHT, PARAM_LAKE_ELEVATION, PARAM_RESERVOIR_STORAGE,
};
use providers::geometry::DEFAULT_OVERPASS_ENDPOINT;
use providers::telemetry::DEFAULT_IV_ENDPOINT;
use providers::{AreaLimits, RetryPolicy};

/// Tunables for grid fetches, history sync and overlays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Grid rows used when a box exceeds the provider's area limit.
    pub grid_rows: usize,
    /// Grid columns used when a box exceeds the provider's area limit.
    pub grid_cols: usize,
    /// Attempts per grid cell or history fetch, including the first.
    pub retry_attempts: u32,
    #[serde(with = "duration_millis")]
    pub retry_delay: Duration,
    /// Wait between consecutive grid cells, whatever their outcome.
    #[serde(with = "duration_millis")]
    pub cell_pacing: Duration,
    /// Grid cells in flight at once. 1 keeps fetches sequential.
    pub cell_concurrency: usize,
    /// Per-attempt timeout for area and grid-cell fetches.
    #[serde(with = "duration_millis")]
    pub area_fetch_timeout: Duration,
    /// History fetches in flight at once in a bulk request.
    pub history_batch_concurrency: usize,
    /// Maximum feature-to-station distance for overlays.
    pub association_radius_miles: f64,
    pub default_hours: u32,
    pub max_hours: u32,
    pub telemetry_endpoint: String,
    pub geometry_endpoint: String,
    /// Parameters requested from the telemetry provider, in priority order.
    pub parameter_codes: Vec<String>,
    pub area_limits: AreaLimits,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            grid_rows: 6,
            grid_cols: 6,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            cell_pacing: Duration::from_millis(500),
            cell_concurrency: 1,
            area_fetch_timeout: Duration::from_secs(60),
            history_batch_concurrency: 5,
            association_radius_miles: 10.0,
            default_hours: 6,
            max_hours: 24 * 30,
            telemetry_endpoint: DEFAULT_IV_ENDPOINT.to_string(),
            geometry_endpoint: DEFAULT_OVERPASS_ENDPOINT.to_string(),
            parameter_codes: vec![
                PARAM_GAGE_HEIGHT.to_string(),
                PARAM_DISCHARGE.to_string(),
                PARAM_LAKE_ELEVATION.to_string(),
                PARAM_RESERVOIR_STORAGE.to_string(),
            ],
            area_limits: AreaLimits::default(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AcquisitionConfig {
    /// Defaults overridden by `HYDRO_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        let parameter_codes = env::var("HYDRO_PARAMETER_CODES")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|codes| !codes.is_empty())
            .unwrap_or(d.parameter_codes);

        Self {
            grid_rows: env_or("HYDRO_GRID_ROWS", d.grid_rows).max(1),
            grid_cols: env_or("HYDRO_GRID_COLS", d.grid_cols).max(1),
            retry_attempts: env_or("HYDRO_RETRY_ATTEMPTS", d.retry_attempts).max(1),
            retry_delay: Duration::from_millis(env_or(
                "HYDRO_RETRY_DELAY_MS",
                d.retry_delay.as_millis() as u64,
            )),
            cell_pacing: Duration::from_millis(env_or(
                "HYDRO_CELL_PACING_MS",
                d.cell_pacing.as_millis() as u64,
            )),
            cell_concurrency: env_or("HYDRO_CELL_CONCURRENCY", d.cell_concurrency).max(1),
            area_fetch_timeout: Duration::from_secs(env_or(
                "HYDRO_AREA_TIMEOUT_SECS",
                d.area_fetch_timeout.as_secs(),
            )),
            history_batch_concurrency: env_or(
                "HYDRO_HISTORY_BATCH_CONCURRENCY",
                d.history_batch_concurrency,
            )
            .max(1),
            association_radius_miles: env_or(
                "HYDRO_ASSOCIATION_RADIUS_MILES",
                d.association_radius_miles,
            ),
            default_hours: env_or("HYDRO_DEFAULT_HOURS", d.default_hours),
            max_hours: env_or("HYDRO_MAX_HOURS", d.max_hours),
            telemetry_endpoint: env::var("HYDRO_TELEMETRY_ENDPOINT")
                .unwrap_or(d.telemetry_endpoint),
            geometry_endpoint: env::var("HYDRO_GEOMETRY_ENDPOINT")
                .unwrap_or(d.geometry_endpoint),
            parameter_codes,
            area_limits: d.area_limits,
        }
    }

    /// Same configuration with every delay removed.
    pub fn without_delays(mut self) -> Self {
        self.retry_delay = Duration::ZERO;
        self.cell_pacing = Duration::ZERO;
        self
    }

    /// Retry policy for area and grid-cell fetches.
    pub fn area_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            delay: self.retry_delay,
            ..RetryPolicy::default()
        }
        .with_timeout(self.area_fetch_timeout)
    }

    /// Retry policy for history and geometry fetches.
    pub fn fetch_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            delay: self.retry_delay,
            ..RetryPolicy::default()
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
