//! Redis-backed cache store.

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tracing::debug;

use hydro_common::{HydroError, HydroResult};

use crate::store::CacheStore;

/// Redis cache client.
///
/// The multiplexed connection is cheap to clone, so each call works on its
/// own handle and the store can be shared behind an `Arc` without a lock.
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to Redis.
    pub async fn connect(redis_url: &str) -> HydroResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| HydroError::CacheUnavailable(format!("Redis connection failed: {}", e)))?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| HydroError::CacheUnavailable(format!("Redis connection failed: {}", e)))?;

        Ok(Self { conn })
    }
}

fn unavailable(op: &str, err: redis::RedisError) -> HydroError {
    HydroError::CacheUnavailable(format!("Cache {} failed: {}", op, err))
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> HydroResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(|e| unavailable("get", e))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> HydroResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(|e| unavailable("set", e))?;
        Ok(())
    }

    async fn multi_get(&self, keys: &[String]) -> HydroResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("multi-get", e))?;

        Ok(values)
    }

    async fn multi_set(&self, entries: &[(String, String)], ttl_secs: u64) -> HydroResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.cmd("SET").arg(key).arg(value).arg("EX").arg(ttl_secs).ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("multi-set", e))?;

        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> HydroResult<u64> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("pattern search", e))?;

        if keys.is_empty() {
            return Ok(0);
        }

        let deleted: u64 = redis::cmd("DEL")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("delete", e))?;

        debug!(pattern = %pattern, deleted = deleted, "Deleted cache keys");
        Ok(deleted)
    }

    async fn ping(&self) -> HydroResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("ping", e))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
