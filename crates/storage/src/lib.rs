//! Cache storage for the hydro data layer.
//!
//! Provides:
//! - `CacheStore`, the key/value seam with TTLs (Redis or in-memory LRU)
//! - `TieredCache`, the category-aware wrapper that degrades to misses when
//!   the store is unreachable
//! - `keys`, the cache key layout

pub mod cache;
pub mod keys;
pub mod memory_store;
pub mod redis_store;
pub mod store;

pub use cache::{CacheCategory, CacheStats, CacheTarget, TieredCache};
pub use memory_store::{CacheEntry, MemoryStore};
pub use redis_store::RedisStore;
pub use store::CacheStore;
