//! In-process LRU cache store.
//!
//! Used when no Redis is configured (single-instance deployments, local
//! development) and by tests. Expiry is lazy: an entry past its TTL is
//! dropped the next time it is read or matched.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock;

use hydro_common::HydroResult;

use crate::store::CacheStore;

/// A stored value and its freshness bookkeeping.
///
/// The value is valid only while `now - stored_at < ttl_seconds`.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub stored_at: Instant,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            stored_at: Instant::now(),
            ttl_seconds,
        }
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < Duration::from_secs(self.ttl_seconds)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }
}

/// LRU-bounded in-memory store.
pub struct MemoryStore {
    cache: Arc<RwLock<LruCache<String, CacheEntry>>>,
}

impl MemoryStore {
    /// Create a store holding at most `max_entries` keys.
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(RwLock::new(LruCache::new(capacity))),
        }
    }

    /// Number of entries currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn read_locked(cache: &mut LruCache<String, CacheEntry>, key: &str) -> Option<String> {
        let valid = cache.get(key).map(CacheEntry::is_valid);
        match valid {
            Some(true) => cache.get(key).map(|entry| entry.value.clone()),
            Some(false) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> HydroResult<Option<String>> {
        let mut cache = self.cache.write().await;
        Ok(Self::read_locked(&mut cache, key))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> HydroResult<()> {
        let mut cache = self.cache.write().await;
        cache.put(key.to_string(), CacheEntry::new(key, value, ttl_secs));
        Ok(())
    }

    async fn multi_get(&self, keys: &[String]) -> HydroResult<Vec<Option<String>>> {
        let mut cache = self.cache.write().await;
        Ok(keys
            .iter()
            .map(|key| Self::read_locked(&mut cache, key))
            .collect())
    }

    async fn multi_set(&self, entries: &[(String, String)], ttl_secs: u64) -> HydroResult<()> {
        let mut cache = self.cache.write().await;
        for (key, value) in entries {
            cache.put(key.clone(), CacheEntry::new(key.as_str(), value.as_str(), ttl_secs));
        }
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> HydroResult<u64> {
        let mut cache = self.cache.write().await;
        let matching: Vec<String> = cache
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();

        let mut deleted = 0u64;
        for key in matching {
            if let Some(entry) = cache.pop(&key) {
                if entry.is_valid() {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn ping(&self) -> HydroResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Redis-style glob match supporting `*` and `?`.
///
/// Character classes and escapes are not understood and match literally,
/// so callers must keep patterns to the two wildcards.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut star_ti = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
