//! Category-aware cache wrapper with per-category TTLs.
//!
//! `TieredCache` never fails its caller: when the store is missing or
//! unreachable every read is a miss and every write reports `false`, and the
//! problem is logged and counted.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use hydro_common::HydroError;

use crate::keys;
use crate::store::CacheStore;

/// Data categories, each with its own freshness policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    CurrentReadings,
    HistoricalSeries,
    Geometry,
    StationMetadata,
    StageThresholds,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 5] = [
        CacheCategory::CurrentReadings,
        CacheCategory::HistoricalSeries,
        CacheCategory::Geometry,
        CacheCategory::StationMetadata,
        CacheCategory::StageThresholds,
    ];

    /// Time-to-live in seconds.
    pub fn ttl_secs(&self) -> u64 {
        match self {
            CacheCategory::CurrentReadings => 15 * 60,
            CacheCategory::HistoricalSeries => 60 * 60,
            CacheCategory::Geometry => 24 * 60 * 60,
            CacheCategory::StationMetadata => 24 * 60 * 60,
            CacheCategory::StageThresholds => 7 * 24 * 60 * 60,
        }
    }

    /// Key segment following the namespace.
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheCategory::CurrentReadings => "stations",
            CacheCategory::HistoricalSeries => "history",
            CacheCategory::Geometry => "geometry",
            CacheCategory::StationMetadata => "meta",
            CacheCategory::StageThresholds => "thresholds",
        }
    }
}

impl FromStr for CacheCategory {
    type Err = HydroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current_readings" | "stations" => Ok(CacheCategory::CurrentReadings),
            "historical_series" | "history" => Ok(CacheCategory::HistoricalSeries),
            "geometry" | "waterways" => Ok(CacheCategory::Geometry),
            "station_metadata" | "meta" => Ok(CacheCategory::StationMetadata),
            "stage_thresholds" | "thresholds" => Ok(CacheCategory::StageThresholds),
            other => Err(HydroError::invalid_parameter(
                "category",
                format!("unknown cache category '{}'", other),
            )),
        }
    }
}

/// What to clear in an administrative invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheTarget {
    Category(CacheCategory),
    Pattern(String),
    All,
}

impl CacheTarget {
    fn pattern(&self) -> String {
        match self {
            CacheTarget::Category(category) => keys::category_pattern(*category),
            CacheTarget::Pattern(pattern) => pattern.clone(),
            CacheTarget::All => format!("{}:*", keys::NAMESPACE),
        }
    }
}

/// Hit/miss tallies for one cache instance.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub writes: AtomicU64,
    /// Store failures that were downgraded to a miss or a failed write.
    pub errors: AtomicU64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }
}

/// Cache front used by the acquisition layer.
#[derive(Clone)]
pub struct TieredCache {
    store: Option<Arc<dyn CacheStore>>,
    stats: Arc<CacheStats>,
}

impl TieredCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store: Some(store),
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// A cache with no backing store; every read misses.
    pub fn disabled() -> Self {
        Self {
            store: None,
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn backend(&self) -> &'static str {
        self.store.as_ref().map(|s| s.backend()).unwrap_or("disabled")
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn record_error(&self, op: &str, key: &str, err: &HydroError) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        warn!(op = op, key = %key, error = %err, "Cache operation failed, treating as miss");
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, raw: Option<String>) -> Option<T> {
        let Some(raw) = raw else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Get and decode a cached value.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let Some(store) = &self.store else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        match store.get(key).await {
            Ok(raw) => self.decode(key, raw),
            Err(e) => {
                self.record_error("get", key, &e);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value under the TTL of its category.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        category: CacheCategory,
    ) -> bool {
        self.set_with_ttl(key, value, category.ttl_secs()).await
    }

    /// Store a value with an explicit TTL in seconds.
    pub async fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> bool {
        let Some(store) = &self.store else {
            return false;
        };

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                self.record_error("encode", key, &e.into());
                return false;
            }
        };

        match store.set(key, &raw, ttl_secs).await {
            Ok(()) => {
                self.stats.writes.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, ttl_secs = ttl_secs, bytes = raw.len(), "Cached value");
                true
            }
            Err(e) => {
                self.record_error("set", key, &e);
                false
            }
        }
    }

    /// Get and decode many values in one round trip.
    pub async fn multi_get<T: DeserializeOwned>(&self, keys: &[String]) -> Vec<Option<T>> {
        let Some(store) = &self.store else {
            self.stats
                .misses
                .fetch_add(keys.len() as u64, Ordering::Relaxed);
            return keys.iter().map(|_| None).collect();
        };
        if keys.is_empty() {
            return Vec::new();
        }

        match store.multi_get(keys).await {
            Ok(raws) if raws.len() == keys.len() => keys
                .iter()
                .zip(raws)
                .map(|(key, raw)| self.decode(key, raw))
                .collect(),
            Ok(raws) => {
                let err = HydroError::CacheUnavailable(format!(
                    "multi-get returned {} values for {} keys",
                    raws.len(),
                    keys.len()
                ));
                self.record_error("multi_get", &keys[0], &err);
                self.stats
                    .misses
                    .fetch_add(keys.len() as u64, Ordering::Relaxed);
                keys.iter().map(|_| None).collect()
            }
            Err(e) => {
                self.record_error("multi_get", &keys[0], &e);
                self.stats
                    .misses
                    .fetch_add(keys.len() as u64, Ordering::Relaxed);
                keys.iter().map(|_| None).collect()
            }
        }
    }

    /// Store many values of one category in one round trip.
    pub async fn multi_set<T: Serialize>(
        &self,
        entries: &[(String, T)],
        category: CacheCategory,
    ) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        if entries.is_empty() {
            return true;
        }

        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match serde_json::to_string(value) {
                Ok(raw) => encoded.push((key.clone(), raw)),
                Err(e) => self.record_error("encode", key, &e.into()),
            }
        }

        match store.multi_set(&encoded, category.ttl_secs()).await {
            Ok(()) => {
                self.stats
                    .writes
                    .fetch_add(encoded.len() as u64, Ordering::Relaxed);
                encoded.len() == entries.len()
            }
            Err(e) => {
                self.record_error("multi_set", &entries[0].0, &e);
                false
            }
        }
    }

    /// Delete everything matching the target. Returns the deleted key count.
    pub async fn invalidate(&self, target: &CacheTarget) -> u64 {
        let Some(store) = &self.store else {
            return 0;
        };
        let pattern = target.pattern();

        match store.delete_pattern(&pattern).await {
            Ok(count) => count,
            Err(e) => {
                self.record_error("invalidate", &pattern, &e);
                0
            }
        }
    }

    /// True when a store is configured and answers.
    pub async fn ping(&self) -> bool {
        match &self.store {
            Some(store) => store.ping().await.is_ok(),
            None => false,
        }
    }
}
