//! Keyed, TTL-capable cache store boundary.
//!
//! Sessions, lockout records and verification codes all live here. Values
//! are opaque strings (JSON in practice, see [`put_json`] / [`fetch_json`]).

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod r#trait;

pub use in_memory::InMemoryCacheStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisCacheStore;
pub use r#trait::{CacheError, CacheStore};

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serialize `value` as JSON and store it under `key`.
pub async fn put_json<T>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError>
where
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
    store.set(key, raw, ttl).await
}

/// Load and deserialize a JSON value.
///
/// A value that no longer parses is reported as [`CacheError::Corrupted`] so
/// callers can decide whether to discard it.
pub async fn fetch_json<T>(store: &dyn CacheStore, key: &str) -> Result<Option<T>, CacheError>
where
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CacheError::Corrupted {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}
