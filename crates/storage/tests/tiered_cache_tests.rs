//! TieredCache behavior over the in-memory store and an unreachable store.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use hydro_common::{HydroError, HydroResult};
use tokio_test::assert_ok;

use storage::{keys, CacheCategory, CacheStore, CacheTarget, MemoryStore, TieredCache};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    ids: Vec<String>,
}

fn snapshot(ids: &[&str]) -> Snapshot {
    Snapshot {
        ids: ids.iter().map(|s| s.to_string()).collect(),
    }
}

/// A store whose backend is down.
struct UnreachableStore;

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _key: &str) -> HydroResult<Option<String>> {
        Err(HydroError::CacheUnavailable("connection refused".into()))
    }
    async fn set(&self, _key: &str, _value: &str, _ttl: u64) -> HydroResult<()> {
        Err(HydroError::CacheUnavailable("connection refused".into()))
    }
    async fn multi_get(&self, _keys: &[String]) -> HydroResult<Vec<Option<String>>> {
        Err(HydroError::CacheUnavailable("connection refused".into()))
    }
    async fn multi_set(&self, _entries: &[(String, String)], _ttl: u64) -> HydroResult<()> {
        Err(HydroError::CacheUnavailable("connection refused".into()))
    }
    async fn delete_pattern(&self, _pattern: &str) -> HydroResult<u64> {
        Err(HydroError::CacheUnavailable("connection refused".into()))
    }
    async fn ping(&self) -> HydroResult<()> {
        Err(HydroError::CacheUnavailable("connection refused".into()))
    }
    fn backend(&self) -> &'static str {
        "unreachable"
    }
}

fn memory_cache() -> TieredCache {
    TieredCache::new(Arc::new(MemoryStore::new(1_000)))
}

// ============================================================================
// Healthy store
// ============================================================================

#[tokio::test]
async fn test_set_then_get() {
    let cache = memory_cache();
    let key = keys::station_metadata("41.000_40.000_-89.000_-90.000");

    assert!(cache.set(&key, &snapshot(&["a", "b"]), CacheCategory::StationMetadata).await);
    let loaded: Option<Snapshot> = cache.get(&key).await;

    assert_eq!(loaded, Some(snapshot(&["a", "b"])));
    assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_multi_get_is_positional() {
    let cache = memory_cache();
    let entries = vec![
        (keys::thresholds("A"), snapshot(&["a"])),
        (keys::thresholds("C"), snapshot(&["c"])),
    ];
    assert!(cache.multi_set(&entries, CacheCategory::StageThresholds).await);

    let wanted = vec![keys::thresholds("A"), keys::thresholds("B"), keys::thresholds("C")];
    let loaded: Vec<Option<Snapshot>> = cache.multi_get(&wanted).await;

    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[0], Some(snapshot(&["a"])));
    assert_eq!(loaded[1], None);
    assert_eq!(loaded[2], Some(snapshot(&["c"])));
}

#[tokio::test]
async fn test_undecodable_entry_is_a_miss() {
    let store = Arc::new(MemoryStore::new(10));
    assert_ok!(store.set("hydro:meta:k", "not json", 60).await);
    let cache = TieredCache::new(store);

    let loaded: Option<Snapshot> = cache.get("hydro:meta:k").await;
    assert!(loaded.is_none());
}

#[tokio::test]
async fn test_invalidate_category_leaves_other_categories() {
    let cache = memory_cache();
    cache
        .set(&keys::history("S1", "00065", 24), &snapshot(&["h"]), CacheCategory::HistoricalSeries)
        .await;
    cache
        .set(&keys::history("S2", "00065", 24), &snapshot(&["h"]), CacheCategory::HistoricalSeries)
        .await;
    cache
        .set(&keys::waterways("k", None), &snapshot(&["w"]), CacheCategory::Geometry)
        .await;

    let deleted = cache
        .invalidate(&CacheTarget::Category(CacheCategory::HistoricalSeries))
        .await;

    assert_eq!(deleted, 2);
    assert!(cache.get::<Snapshot>(&keys::waterways("k", None)).await.is_some());
}

#[tokio::test]
async fn test_invalidate_pattern() {
    let cache = memory_cache();
    cache
        .set(&keys::history("S1", "00065", 24), &snapshot(&["h"]), CacheCategory::HistoricalSeries)
        .await;
    cache
        .set(&keys::history("S1", "00060", 24), &snapshot(&["h"]), CacheCategory::HistoricalSeries)
        .await;
    cache
        .set(&keys::history("S2", "00065", 24), &snapshot(&["h"]), CacheCategory::HistoricalSeries)
        .await;

    let deleted = cache
        .invalidate(&CacheTarget::Pattern("hydro:history:S1:*".to_string()))
        .await;
    assert_eq!(deleted, 2);
}

// ============================================================================
// Unreachable store degrades to cold cache
// ============================================================================

#[tokio::test]
async fn test_unreachable_store_never_raises() {
    let cache = TieredCache::new(Arc::new(UnreachableStore));

    assert!(!cache.set("k", &snapshot(&["a"]), CacheCategory::Geometry).await);
    assert!(cache.get::<Snapshot>("k").await.is_none());

    let many: Vec<Option<Snapshot>> = cache.multi_get(&["a".to_string(), "b".to_string()]).await;
    assert_eq!(many, vec![None, None]);

    assert!(!cache.multi_set(&[("a".to_string(), 1u8)], CacheCategory::Geometry).await);
    assert_eq!(cache.invalidate(&CacheTarget::All).await, 0);
    assert!(!cache.ping().await);

    assert!(cache.stats().errors.load(Ordering::Relaxed) >= 5);
    assert_eq!(cache.stats().hit_rate(), 0.0);
}
