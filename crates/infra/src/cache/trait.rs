use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use gatekeep_core::DomainError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),

    #[error("corrupted cache entry '{key}': {reason}")]
    Corrupted { key: String, reason: String },
}

impl From<CacheError> for DomainError {
    fn from(value: CacheError) -> Self {
        DomainError::internal(value.to_string())
    }
}

/// A shared, externally synchronized key/value store with expiry.
///
/// A `ttl` of [`Duration::ZERO`] means the entry does not expire.
/// Implementations must be safe to call concurrently; this crate never holds
/// locks across calls.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Reset the expiry of an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Atomically increment an integer counter, returning the new value.
    ///
    /// When the increment creates the key, `ttl` is applied to it; later
    /// increments leave the expiry untouched so the window is anchored at the
    /// first increment.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError>;

    /// Like [`CacheStore::incr`], but every increment resets the expiry to
    /// `ttl`: the counter lives until `ttl` passes without an increment.
    async fn incr_sliding(&self, key: &str, ttl: Duration) -> Result<i64, CacheError>;
}
