//! Cache key layout.
//!
//! Every key is `hydro:<category prefix>:<parts...>` so a whole category can
//! be invalidated with one `hydro:<prefix>:*` pattern.

use crate::cache::CacheCategory;

pub const NAMESPACE: &str = "hydro";

fn build(category: CacheCategory, parts: &[&str]) -> String {
    let mut key = format!("{}:{}", NAMESPACE, category.prefix());
    for part in parts {
        key.push(':');
        key.push_str(part);
    }
    key
}

/// Station list with series for a bbox and look-back period.
pub fn stations(bbox_key: &str, hours: u32) -> String {
    build(
        CacheCategory::CurrentReadings,
        &[bbox_key, &format!("{}h", hours)],
    )
}

/// Latest-value and risk snapshot of the stations in a bbox.
pub fn station_snapshot(bbox_key: &str) -> String {
    build(CacheCategory::CurrentReadings, &[bbox_key, "latest"])
}

/// Readings-free station metadata for a bbox.
pub fn station_metadata(bbox_key: &str) -> String {
    build(CacheCategory::StationMetadata, &[bbox_key])
}

/// Geometry features for a bbox, optionally narrowed by name.
pub fn waterways(bbox_key: &str, name_filter: Option<&str>) -> String {
    let name = name_filter
        .map(|n| n.trim().to_lowercase().replace([':', '*', '?'], "_"))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "all".to_string());
    build(CacheCategory::Geometry, &[bbox_key, &name])
}

/// Rolling history record for one station series.
pub fn history(station_id: &str, parameter_code: &str, hours: u32) -> String {
    build(
        CacheCategory::HistoricalSeries,
        &[station_id, parameter_code, &format!("{}h", hours)],
    )
}

/// Stage thresholds for one station.
pub fn thresholds(station_id: &str) -> String {
    build(CacheCategory::StageThresholds, &[station_id])
}

/// Pattern matching every key in a category.
pub fn category_pattern(category: CacheCategory) -> String {
    format!("{}:{}:*", NAMESPACE, category.prefix())
}
