//! In-memory cache store for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gatekeep_core::clock::to_time_delta;
use gatekeep_core::{Clock, SystemClock};

use super::r#trait::{CacheError, CacheStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Cache store backed by a `HashMap`, with expiry driven by an injected clock.
///
/// Expired entries are dropped lazily when touched.
#[derive(Debug)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of live entries (test helper).
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .map(|m| m.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining TTL of a live key, `None` when absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key).filter(|e| e.is_live(now))?;
        entry.expires_at.and_then(|at| (at - now).to_std().ok())
    }

    fn expiry(&self, ttl: Duration) -> Option<DateTime<Utc>> {
        if ttl.is_zero() {
            None
        } else {
            self.clock.now().checked_add_signed(to_time_delta(ttl))
        }
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> CacheError {
    CacheError::Backend("in-memory cache lock poisoned".to_string())
}

impl InMemoryCacheStore {
    fn bump(&self, key: &str, ttl: Duration, sliding: bool) -> Result<i64, CacheError> {
        let now = self.clock.now();
        let fresh_expiry = self.expiry(ttl);
        let mut entries = self.entries.write().map_err(poisoned)?;

        let (next, expires_at) = match entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                let value: i64 = entry.value.parse().map_err(|_| CacheError::Corrupted {
                    key: key.to_string(),
                    reason: "value is not an integer".to_string(),
                })?;
                let next = value
                    .checked_add(1)
                    .ok_or_else(|| CacheError::Backend(format!("counter '{key}' overflowed")))?;
                let expires_at = if sliding { fresh_expiry } else { entry.expires_at };
                (next, expires_at)
            }
            _ => (1, fresh_expiry),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = self.expiry(ttl);
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().map_err(poisoned)?;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().map_err(poisoned)?;
        let removed = keys
            .iter()
            .filter_map(|k| entries.remove(k))
            .filter(|e| e.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).is_some_and(|e| e.is_live(now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let expires_at = self.expiry(ttl);
        let mut entries = self.entries.write().map_err(poisoned)?;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        self.bump(key, ttl, false)
    }

    async fn incr_sliding(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        self.bump(key, ttl, true)
    }
}
