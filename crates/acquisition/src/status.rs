//! Outcome status shared by grid and history operations.

use serde::{Deserialize, Serialize};

/// How much of a best-effort operation succeeded.
///
/// None of these is an error: the caller always gets a (possibly empty)
/// result alongside the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Every unit of work succeeded and produced data.
    Complete,
    /// Some units failed; the result holds what the others produced.
    PartialSuccess,
    /// Nothing failed, but there was nothing to return.
    NoData,
    /// Every attempted unit failed.
    Failed,
}

impl FetchStatus {
    /// Derive a status from per-unit counts.
    pub fn from_counts(attempted: usize, failed: usize, has_data: bool) -> Self {
        if attempted == 0 {
            FetchStatus::NoData
        } else if failed >= attempted {
            FetchStatus::Failed
        } else if failed > 0 {
            FetchStatus::PartialSuccess
        } else if has_data {
            FetchStatus::Complete
        } else {
            FetchStatus::NoData
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FetchStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Complete => "complete",
            FetchStatus::PartialSuccess => "partial_success",
            FetchStatus::NoData => "no_data",
            FetchStatus::Failed => "failed",
        }
    }
}
