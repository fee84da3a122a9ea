//! The key/value seam behind `TieredCache`.

use async_trait::async_trait;

use hydro_common::HydroResult;

/// A TTL-aware string key/value store.
///
/// Values are JSON text. Implementations report connectivity problems as
/// `HydroError::CacheUnavailable`; `TieredCache` turns those into misses.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a single value.
    async fn get(&self, key: &str) -> HydroResult<Option<String>>;

    /// Store a value that expires after `ttl_secs`.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> HydroResult<()>;

    /// Fetch many values in one round trip, positionally aligned with `keys`.
    async fn multi_get(&self, keys: &[String]) -> HydroResult<Vec<Option<String>>>;

    /// Store many values with a shared TTL in one round trip.
    async fn multi_set(&self, entries: &[(String, String)], ttl_secs: u64) -> HydroResult<()>;

    /// Delete every key matching a glob pattern (`*`, `?`). Returns the count.
    async fn delete_pattern(&self, pattern: &str) -> HydroResult<u64>;

    /// Cheap reachability probe.
    async fn ping(&self) -> HydroResult<()>;

    /// Backend name for logs and readiness output.
    fn backend(&self) -> &'static str;
}
