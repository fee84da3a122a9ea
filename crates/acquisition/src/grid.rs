//! Grid decomposition for bounding boxes larger than the telemetry
//! provider accepts in one request.
//!
//! A box within [`AreaLimits`] is fetched with a single request. Anything
//! larger is split into a fixed `rows x cols` grid. Each cell is fetched with
//! bounded retry, consecutive cells are separated by a pacing delay, and
//! stations are merged across cells with first-wins deduplication.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use hydro_common::bbox::round_to;
use hydro_common::{BoundingBox, Station};
use providers::limits::COORDINATE_PRECISION;
use providers::{AreaLimits, RetryPolicy, TelemetryProvider, UpstreamResult};

use crate::config::AcquisitionConfig;
use crate::stats::ServiceStats;
use crate::status::FetchStatus;

/// A sub-box of a decomposition, row 0 at the south edge, column 0 at the
/// west edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    pub bbox: BoundingBox,
}

/// Split `bbox` into `rows x cols` cells by linear interpolation.
///
/// The last row and column take the box's own north and east edges so the
/// cells cover the box exactly. Edges are clamped to the coordinate domain
/// and rounded to the provider's precision.
pub fn decompose(bbox: &BoundingBox, rows: usize, cols: usize) -> Vec<GridCell> {
    let rows = rows.max(1);
    let cols = cols.max(1);
    let lat_step = (bbox.north - bbox.south) / rows as f64;
    let lon_step = (bbox.east - bbox.west) / cols as f64;

    let lat_edge = |i: usize| {
        let v = if i == rows {
            bbox.north
        } else {
            bbox.south + lat_step * i as f64
        };
        round_to(v.clamp(-90.0, 90.0), COORDINATE_PRECISION)
    };
    let lon_edge = |j: usize| {
        let v = if j == cols {
            bbox.east
        } else {
            bbox.west + lon_step * j as f64
        };
        round_to(v.clamp(-180.0, 180.0), COORDINATE_PRECISION)
    };

    let mut cells = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            cells.push(GridCell {
                row,
                col,
                bbox: BoundingBox::new(
                    lat_edge(row + 1),
                    lat_edge(row),
                    lon_edge(col + 1),
                    lon_edge(col),
                ),
            });
        }
    }
    cells
}

/// Cell accounting for one grid fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridReport {
    pub cells_total: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Merged stations plus how the fetch went.
#[derive(Debug, Clone)]
pub struct GridFetchOutcome {
    pub stations: Vec<Station>,
    pub report: GridReport,
    pub status: FetchStatus,
}

/// Fetches telemetry for arbitrarily large boxes.
pub struct GridFetchCoordinator {
    telemetry: Arc<dyn TelemetryProvider>,
    limits: AreaLimits,
    retry: RetryPolicy,
    rows: usize,
    cols: usize,
    pacing: Duration,
    concurrency: usize,
    stats: Arc<ServiceStats>,
}

impl GridFetchCoordinator {
    pub fn new(
        telemetry: Arc<dyn TelemetryProvider>,
        config: &AcquisitionConfig,
        stats: Arc<ServiceStats>,
    ) -> Self {
        Self {
            telemetry,
            limits: config.area_limits,
            retry: config.area_retry(),
            rows: config.grid_rows,
            cols: config.grid_cols,
            pacing: config.cell_pacing,
            concurrency: config.cell_concurrency.max(1),
            stats,
        }
    }

    /// Fetch all stations inside `bbox` reporting any of `parameter_codes`
    /// over the last `hours`.
    #[instrument(skip(self, bbox, parameter_codes), fields(bbox = %bbox.cache_key()))]
    pub async fn fetch(
        &self,
        bbox: &BoundingBox,
        hours: u32,
        parameter_codes: &[String],
    ) -> GridFetchOutcome {
        let rounded = AreaLimits::round(bbox);
        if self.limits.is_valid(&rounded) {
            return self.fetch_single(&rounded, hours, parameter_codes).await;
        }

        let cells = decompose(bbox, self.rows, self.cols);
        let cells_total = cells.len();
        let (valid, invalid): (Vec<GridCell>, Vec<GridCell>) = cells
            .into_iter()
            .partition(|cell| self.limits.is_valid(&cell.bbox));

        for cell in &invalid {
            warn!(
                row = cell.row,
                col = cell.col,
                cell = %cell.bbox.cache_key(),
                "Skipping grid cell outside provider area limits"
            );
        }

        info!(
            cells = cells_total,
            valid = valid.len(),
            skipped = invalid.len(),
            "Decomposed oversized bbox into grid"
        );

        // `buffered` yields in cell order, keeping first-wins deterministic
        // even when several cells are in flight.
        let last = valid.len().saturating_sub(1);
        let results: Vec<(GridCell, UpstreamResult<Vec<Station>>)> = stream::iter(valid)
            .enumerate()
            .map(|(index, cell)| async move {
                let result = self.fetch_cell(&cell, hours, parameter_codes).await;
                if index < last && !self.pacing.is_zero() {
                    tokio::time::sleep(self.pacing).await;
                }
                (cell, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut report = GridReport {
            cells_total,
            attempted: results.len(),
            skipped: invalid.len(),
            ..GridReport::default()
        };
        // First sighting wins: a station reported by several cells keeps the
        // entry from the earliest cell in row-major order.
        let mut seen: HashSet<String> = HashSet::new();
        let mut stations = Vec::new();

        for (cell, result) in results {
            match result {
                Ok(found) => {
                    report.succeeded += 1;
                    let before = stations.len();
                    for station in found {
                        if seen.insert(station.id.clone()) {
                            stations.push(station);
                        }
                    }
                    debug!(
                        row = cell.row,
                        col = cell.col,
                        new_stations = stations.len() - before,
                        "Grid cell fetched"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        row = cell.row,
                        col = cell.col,
                        error = %e,
                        "Grid cell failed after retries"
                    );
                }
            }
        }

        self.stats
            .record_grid_cells(report.attempted, report.skipped, report.failed);

        let status =
            FetchStatus::from_counts(report.attempted, report.failed, !stations.is_empty());
        info!(
            stations = stations.len(),
            attempted = report.attempted,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            status = status.as_str(),
            "Grid fetch complete"
        );

        GridFetchOutcome {
            stations,
            report,
            status,
        }
    }

    async fn fetch_single(
        &self,
        bbox: &BoundingBox,
        hours: u32,
        parameter_codes: &[String],
    ) -> GridFetchOutcome {
        let cell = GridCell {
            row: 0,
            col: 0,
            bbox: *bbox,
        };
        let result = self.fetch_cell(&cell, hours, parameter_codes).await;

        let mut report = GridReport {
            cells_total: 1,
            attempted: 1,
            ..GridReport::default()
        };
        let stations = match result {
            Ok(found) => {
                report.succeeded = 1;
                dedup_first_wins(found)
            }
            Err(e) => {
                report.failed = 1;
                warn!(error = %e, "Area fetch failed after retries");
                Vec::new()
            }
        };

        let status = FetchStatus::from_counts(1, report.failed, !stations.is_empty());
        GridFetchOutcome {
            stations,
            report,
            status,
        }
    }

    async fn fetch_cell(
        &self,
        cell: &GridCell,
        hours: u32,
        parameter_codes: &[String],
    ) -> UpstreamResult<Vec<Station>> {
        let label = format!("cell {},{}", cell.row, cell.col);
        let telemetry = &self.telemetry;
        let stats = &self.stats;
        let bbox = &cell.bbox;

        let outcome = self
            .retry
            .run(&label, |_attempt| async move {
                let result = telemetry.fetch_area(bbox, hours, parameter_codes).await;
                stats.record_upstream_request(telemetry.name(), result.is_ok());
                result
            })
            .await;
        outcome.result
    }
}

fn dedup_first_wins(stations: Vec<Station>) -> Vec<Station> {
    let mut seen = HashSet::new();
    stations
        .into_iter()
        .filter(|s| seen.insert(s.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_counts_and_edges() {
        let bbox = BoundingBox::new(36.5, 25.8, -93.5, -106.7);
        let cells = decompose(&bbox, 6, 6);
        assert_eq!(cells.len(), 36);

        let first = &cells[0];
        assert_eq!((first.row, first.col), (0, 0));
        assert_eq!(first.bbox.south, 25.8);
        assert_eq!(first.bbox.west, -106.7);

        let last = &cells[35];
        assert_eq!(last.bbox.north, 36.5);
        assert_eq!(last.bbox.east, -93.5);
    }

    #[test]
    fn test_adjacent_cells_share_edges() {
        let bbox = BoundingBox::new(36.5, 25.8, -93.5, -106.7);
        let cells = decompose(&bbox, 6, 6);
        for row in 0..6 {
            for col in 0..5 {
                let a = &cells[row * 6 + col];
                let b = &cells[row * 6 + col + 1];
                assert_eq!(a.bbox.east, b.bbox.west);
            }
        }
        for row in 0..5 {
            let a = &cells[row * 6];
            let b = &cells[(row + 1) * 6];
            assert_eq!(a.bbox.north, b.bbox.south);
        }
    }

    #[test]
    fn test_single_cell_grid_is_the_box() {
        let bbox = BoundingBox::new(41.0, 40.0, -89.0, -90.0);
        let cells = decompose(&bbox, 1, 1);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].bbox, bbox);
    }
}
