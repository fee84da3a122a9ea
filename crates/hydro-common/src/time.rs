//! Time window helpers for station history requests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Format a look-back period of `hours` as an ISO 8601 duration ("PT6H").
pub fn iso8601_hours(hours: u32) -> String {
    format!("PT{}H", hours)
}

/// Convert epoch milliseconds to a UTC datetime, saturating on overflow.
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// A closed `[start, end]` window in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub start_millis: i64,
    pub end_millis: i64,
}

impl HistoryWindow {
    pub fn new(start_millis: i64, end_millis: i64) -> Self {
        Self {
            start_millis,
            end_millis,
        }
    }

    /// The window `[now - hours, now]`.
    pub fn ending_at(now: DateTime<Utc>, hours: u32) -> Self {
        let end = now.timestamp_millis();
        let start = (now - Duration::hours(i64::from(hours))).timestamp_millis();
        Self::new(start, end)
    }

    pub fn contains(&self, timestamp_millis: i64) -> bool {
        timestamp_millis >= self.start_millis && timestamp_millis <= self.end_millis
    }

    pub fn start(&self) -> DateTime<Utc> {
        from_millis(self.start_millis)
    }

    pub fn end(&self) -> DateTime<Utc> {
        from_millis(self.end_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso8601_hours() {
        assert_eq!(iso8601_hours(6), "PT6H");
        assert_eq!(iso8601_hours(168), "PT168H");
    }

    #[test]
    fn test_window_ending_at() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
        let window = HistoryWindow::ending_at(now, 2);
        assert_eq!(window.end_millis - window.start_millis, 2 * 3_600_000);
        assert!(window.contains(window.start_millis));
        assert!(!window.contains(window.end_millis + 1));
        assert_eq!(window.end(), now);
    }
}
