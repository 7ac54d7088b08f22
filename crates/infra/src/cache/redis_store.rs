//! Redis-backed cache store.
//!
//! Uses a multiplexed async connection (cheap to clone, safe to share) and
//! millisecond TTLs. The counter primitives run as Lua scripts so that the
//! increment and its expiry are applied atomically.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::instrument;

use super::r#trait::{CacheError, CacheStore};

const INCR_WITH_TTL: &str = r"
local value = redis.call('INCR', KEYS[1])
if value == 1 and tonumber(ARGV[1]) > 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return value
";

const INCR_SLIDING: &str = r"
local value = redis.call('INCR', KEYS[1])
if tonumber(ARGV[1]) > 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return value
";

#[derive(Clone)]
pub struct RedisCacheStore {
    conn: MultiplexedConnection,
    key_prefix: String,
    incr_script: redis::Script,
    incr_sliding_script: redis::Script,
}

impl core::fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisCacheStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisCacheStore {
    async fn run_counter(
        &self,
        script: &redis::Script,
        key: &str,
        ttl: Duration,
    ) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        let ttl_ms = if ttl.is_zero() { 0 } else { ttl_millis(ttl) };
        let mut invocation = script.key(self.key(key));
        invocation.arg(ttl_ms);
        invocation
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)
    }

    /// Connect to Redis.
    ///
    /// * `redis_url` - e.g. `redis://localhost:6379`
    /// * `key_prefix` - prepended to every key (empty for none)
    pub async fn connect(
        redis_url: impl AsRef<str>,
        key_prefix: impl Into<String>,
    ) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Backend(format!("redis connection error: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(format!("redis connection error: {e}")))?;

        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
            incr_script: redis::Script::new(INCR_WITH_TTL),
            incr_sliding_script: redis::Script::new(INCR_SLIDING),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

fn command_error(e: redis::RedisError) -> CacheError {
    CacheError::Backend(format!("redis command error: {e}"))
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    #[instrument(skip(self, value), fields(ttl_ms = ttl.as_millis() as u64))]
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(value);
        if !ttl.is_zero() {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        cmd.query_async::<_, ()>(&mut conn)
            .await
            .map_err(command_error)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get(self.key(key)).await.map_err(command_error)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let keys: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        conn.del(keys).await.map_err(command_error)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        conn.exists(self.key(key)).await.map_err(command_error)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        if ttl.is_zero() {
            let _: bool = conn.persist(self.key(key)).await.map_err(command_error)?;
            return conn.exists(self.key(key)).await.map_err(command_error);
        }
        redis::cmd("PEXPIRE")
            .arg(self.key(key))
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(command_error)
    }

    #[instrument(skip(self), fields(ttl_ms = ttl.as_millis() as u64))]
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        self.run_counter(&self.incr_script, key, ttl).await
    }

    #[instrument(skip(self), fields(ttl_ms = ttl.as_millis() as u64))]
    async fn incr_sliding(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        self.run_counter(&self.incr_sliding_script, key, ttl).await
    }
}
