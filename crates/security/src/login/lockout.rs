use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use gatekeep_core::clock::{remaining, to_time_delta};
use gatekeep_infra::CacheError;
use gatekeep_infra::cache::{fetch_json, put_json};

use super::LoginSecurityManager;
use crate::error::{LoginSecurityError, LoginSecurityResult};

/// What a lock applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    Account,
    Ip,
}

impl LockScope {
    fn lock_key(&self, subject: &str) -> String {
        match self {
            LockScope::Account => format!("login_attempt:{subject}"),
            LockScope::Ip => format!("ip_attempt:{subject}"),
        }
    }

    fn counter_key(&self, subject: &str) -> String {
        match self {
            LockScope::Account => format!("login_attempt_count:{subject}"),
            LockScope::Ip => format!("ip_attempt_count:{subject}"),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LockScope::Account => "account",
            LockScope::Ip => "ip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LockRecord {
    subject: String,
    scope: LockScope,
    attempt_count: u32,
    locked_at: DateTime<Utc>,
    locked_until: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LockStatus {
    Unlocked,
    Locked {
        scope: LockScope,
        locked_until: DateTime<Utc>,
        /// e.g. `account locked, 25 minutes remaining`
        reason: String,
    },
}

impl LockStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockStatus::Locked { .. })
    }

    /// Turn a lock into [`LoginSecurityError::Locked`].
    pub fn ensure_unlocked(&self) -> LoginSecurityResult<()> {
        match self {
            LockStatus::Unlocked => Ok(()),
            LockStatus::Locked { reason, .. } => Err(LoginSecurityError::Locked(reason.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginSecurityStats {
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub remaining_attempts: u32,
    pub is_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub lock_duration: Duration,
}

fn minutes_left(left: Duration) -> u64 {
    left.as_secs().div_ceil(60).max(1)
}

impl LoginSecurityManager {
    /// Record a login outcome.
    ///
    /// Success clears every counter and lock for both the identifier and
    /// the IP. Failure bumps both counters; whichever reaches the threshold
    /// gets locked for the configured duration.
    #[instrument(skip(self))]
    pub async fn record_attempt(
        &self,
        identifier: &str,
        ip: &str,
        success: bool,
    ) -> LoginSecurityResult<()> {
        if success {
            let keys = [
                LockScope::Account.lock_key(identifier),
                LockScope::Account.counter_key(identifier),
                LockScope::Ip.lock_key(ip),
                LockScope::Ip.counter_key(ip),
            ];
            self.cache.delete(&keys).await?;
            debug!("login succeeded, attempts cleared");
            return Ok(());
        }

        self.register_failure(LockScope::Account, identifier).await?;
        self.register_failure(LockScope::Ip, ip).await?;
        Ok(())
    }

    async fn register_failure(&self, scope: LockScope, subject: &str) -> LoginSecurityResult<()> {
        let lock_duration = self.config.lock_duration;
        let count = self
            .cache
            .incr_sliding(&scope.counter_key(subject), lock_duration)
            .await?;
        debug!(scope = scope.label(), subject, count, "failed login recorded");

        if count < i64::from(self.config.max_attempts) {
            return Ok(());
        }

        let now = self.clock.now();
        let record = LockRecord {
            subject: subject.to_string(),
            scope,
            attempt_count: u32::try_from(count).unwrap_or(u32::MAX),
            locked_at: now,
            locked_until: now + to_time_delta(lock_duration),
        };
        put_json(&*self.cache, &scope.lock_key(subject), &record, lock_duration).await?;
        info!(
            scope = scope.label(),
            subject,
            attempts = count,
            locked_until = %record.locked_until,
            "login locked"
        );
        Ok(())
    }

    /// Live lock for one scope. Locks past their deadline are removed.
    async fn active_lock(
        &self,
        scope: LockScope,
        subject: &str,
    ) -> LoginSecurityResult<Option<LockRecord>> {
        let key = scope.lock_key(subject);
        let record = match fetch_json::<LockRecord>(&*self.cache, &key).await {
            Ok(record) => record,
            Err(CacheError::Corrupted { reason, .. }) => {
                warn!(key = %key, %reason, "discarding unreadable lock record");
                self.forget(&key).await;
                None
            }
            Err(e) => return Err(e.into()),
        };

        match record {
            Some(record) if record.locked_until > self.clock.now() => Ok(Some(record)),
            Some(_) => {
                debug!(key = %key, "lock expired, clearing");
                self.forget(&key).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn forget(&self, key: &str) {
        if let Err(error) = self.cache.delete(&[key.to_string()]).await {
            warn!(key, %error, "best-effort lock cleanup failed");
        }
    }

    /// Whether logins for `identifier` or from `ip` are currently blocked.
    /// The identifier is checked first.
    #[instrument(skip(self))]
    pub async fn check_locked(&self, identifier: &str, ip: &str) -> LoginSecurityResult<LockStatus> {
        for (scope, subject) in [(LockScope::Account, identifier), (LockScope::Ip, ip)] {
            if let Some(record) = self.active_lock(scope, subject).await? {
                let left = remaining(self.clock.now(), record.locked_until).unwrap_or_default();
                let reason = format!(
                    "{} locked, {} minutes remaining",
                    scope.label(),
                    minutes_left(left)
                );
                return Ok(LockStatus::Locked {
                    scope,
                    locked_until: record.locked_until,
                    reason,
                });
            }
        }
        Ok(LockStatus::Unlocked)
    }

    /// Failed attempts currently counted against `identifier`.
    pub async fn attempt_count(&self, identifier: &str) -> LoginSecurityResult<u32> {
        let key = LockScope::Account.counter_key(identifier);
        let count = match self.cache.get(&key).await? {
            Some(raw) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
                warn!(key = %key, value = %raw, "unreadable attempt counter");
                0
            }),
            None => 0,
        };
        Ok(count)
    }

    /// Deadline of the identifier's lock, if one is active.
    pub async fn is_account_locked(
        &self,
        identifier: &str,
    ) -> LoginSecurityResult<Option<DateTime<Utc>>> {
        Ok(self
            .active_lock(LockScope::Account, identifier)
            .await?
            .map(|r| r.locked_until))
    }

    /// Administrative unlock: clears the identifier's lock and counter.
    #[instrument(skip(self))]
    pub async fn unlock_account(&self, identifier: &str) -> LoginSecurityResult<bool> {
        let removed = self
            .cache
            .delete(&[
                LockScope::Account.lock_key(identifier),
                LockScope::Account.counter_key(identifier),
            ])
            .await?;
        info!(removed, "account unlocked");
        Ok(removed > 0)
    }

    pub async fn stats(&self, identifier: &str) -> LoginSecurityResult<LoginSecurityStats> {
        let attempt_count = self.attempt_count(identifier).await?;
        let locked_until = self.is_account_locked(identifier).await?;
        Ok(LoginSecurityStats {
            attempt_count,
            max_attempts: self.config.max_attempts,
            remaining_attempts: self.config.max_attempts.saturating_sub(attempt_count),
            is_locked: locked_until.is_some(),
            locked_until,
            lock_duration: self.config.lock_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::login::test_support::fixture;
    use std::sync::Arc;

    use gatekeep_core::{Clock, DomainError, ManualClock};
    use gatekeep_infra::{CacheStore, InMemoryCacheStore};
    use proptest::prelude::*;

    use crate::config::LoginSecurityConfig;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn fifth_failure_locks_the_account() {
        let f = fixture();
        for _ in 0..4 {
            f.manager.record_attempt("alice", "10.0.0.1", false).await.unwrap();
        }
        assert_eq!(
            f.manager.check_locked("alice", "10.0.0.1").await.unwrap(),
            LockStatus::Unlocked
        );

        f.manager.record_attempt("alice", "10.0.0.1", false).await.unwrap();
        let status = f.manager.check_locked("alice", "10.0.0.1").await.unwrap();
        match &status {
            LockStatus::Locked { scope, reason, .. } => {
                assert_eq!(*scope, LockScope::Account);
                assert_eq!(reason, "account locked, 30 minutes remaining");
            }
            LockStatus::Unlocked => panic!("expected a lock"),
        }

        let err = status.ensure_unlocked().unwrap_err();
        assert!(matches!(DomainError::from(err), DomainError::Locked(_)));
    }

    #[tokio::test]
    async fn success_resets_the_counter() {
        let f = fixture();
        for _ in 0..3 {
            f.manager.record_attempt("alice", "10.0.0.1", false).await.unwrap();
        }
        assert_eq!(f.manager.attempt_count("alice").await.unwrap(), 3);

        f.manager.record_attempt("alice", "10.0.0.1", true).await.unwrap();
        assert_eq!(f.manager.attempt_count("alice").await.unwrap(), 0);
        assert!(f.cache.is_empty());

        for _ in 0..4 {
            f.manager.record_attempt("alice", "10.0.0.1", false).await.unwrap();
        }
        assert!(!f.manager.check_locked("alice", "10.0.0.1").await.unwrap().is_locked());
    }

    #[tokio::test]
    async fn locks_expire_on_their_own() {
        let f = fixture();
        for _ in 0..5 {
            f.manager.record_attempt("alice", "10.0.0.1", false).await.unwrap();
        }

        f.clock.advance(5 * MINUTE);
        match f.manager.check_locked("alice", "10.0.0.1").await.unwrap() {
            LockStatus::Locked { reason, .. } => {
                assert_eq!(reason, "account locked, 25 minutes remaining")
            }
            LockStatus::Unlocked => panic!("expected a lock"),
        }

        f.clock.advance(26 * MINUTE);
        assert_eq!(
            f.manager.check_locked("alice", "10.0.0.1").await.unwrap(),
            LockStatus::Unlocked
        );
        assert_eq!(f.manager.is_account_locked("alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn stale_lock_records_are_cleared_on_read() {
        let f = fixture();
        let now = f.clock.now();
        let record = LockRecord {
            subject: "alice".into(),
            scope: LockScope::Account,
            attempt_count: 5,
            locked_at: now,
            locked_until: now + to_time_delta(MINUTE),
        };
        let key = LockScope::Account.lock_key("alice");
        put_json(&*f.cache, &key, &record, Duration::ZERO).await.unwrap();

        f.clock.advance(2 * MINUTE);
        assert!(!f.manager.check_locked("alice", "10.0.0.1").await.unwrap().is_locked());
        assert!(!f.cache.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn ip_locks_independently() {
        let f = fixture();
        for user in ["a", "b", "c", "d", "e"] {
            f.manager.record_attempt(user, "203.0.113.9", false).await.unwrap();
        }

        match f.manager.check_locked("f", "203.0.113.9").await.unwrap() {
            LockStatus::Locked { scope, reason, .. } => {
                assert_eq!(scope, LockScope::Ip);
                assert!(reason.starts_with("ip locked"));
            }
            LockStatus::Unlocked => panic!("expected an ip lock"),
        }
        assert!(!f.manager.check_locked("a", "198.51.100.1").await.unwrap().is_locked());
    }

    #[tokio::test]
    async fn unlock_and_stats() {
        let f = fixture();
        for _ in 0..2 {
            f.manager.record_attempt("alice", "10.0.0.1", false).await.unwrap();
        }
        let stats = f.manager.stats("alice").await.unwrap();
        assert_eq!(stats.attempt_count, 2);
        assert_eq!(stats.remaining_attempts, 3);
        assert!(!stats.is_locked);

        for _ in 0..3 {
            f.manager.record_attempt("alice", "10.0.0.1", false).await.unwrap();
        }
        let stats = f.manager.stats("alice").await.unwrap();
        assert!(stats.is_locked);
        assert_eq!(stats.remaining_attempts, 0);
        assert_eq!(stats.lock_duration, 30 * MINUTE);

        assert!(f.manager.unlock_account("alice").await.unwrap());
        assert!(f.manager.is_account_locked("alice").await.unwrap().is_none());
        assert_eq!(f.manager.attempt_count("alice").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_are_all_counted() {
        let f = fixture();
        let mut handles = Vec::new();
        for _ in 0..20 {
            let manager = f.manager.clone();
            handles.push(tokio::spawn(async move {
                manager.record_attempt("alice", "10.0.0.1", false).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(f.manager.attempt_count("alice").await.unwrap(), 20);
        assert!(f.manager.check_locked("alice", "10.0.0.1").await.unwrap().is_locked());
    }

    #[tokio::test]
    async fn failures_count_while_each_gap_is_under_the_window() {
        let f = fixture();
        f.manager.record_attempt("alice", "10.0.0.1", false).await.unwrap();
        f.clock.advance(20 * MINUTE);
        for _ in 0..3 {
            f.manager.record_attempt("alice", "10.0.0.1", false).await.unwrap();
        }
        // 35 minutes after the first failure, 15 after the last
        f.clock.advance(15 * MINUTE);
        f.manager.record_attempt("alice", "10.0.0.1", false).await.unwrap();

        assert_eq!(f.manager.attempt_count("alice").await.unwrap(), 5);
        assert!(f.manager.check_locked("alice", "10.0.0.1").await.unwrap().is_locked());
    }

    #[tokio::test]
    async fn a_quiet_window_forgets_failures() {
        let f = fixture();
        for _ in 0..4 {
            f.manager.record_attempt("alice", "10.0.0.1", false).await.unwrap();
        }
        f.clock.advance(31 * MINUTE);
        f.manager.record_attempt("alice", "10.0.0.1", false).await.unwrap();
        assert_eq!(f.manager.attempt_count("alice").await.unwrap(), 1);
        assert!(!f.manager.check_locked("alice", "10.0.0.1").await.unwrap().is_locked());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]

        #[test]
        fn locks_exactly_at_the_threshold(max in 1u32..8, failures in 0u32..12) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let locked = runtime.block_on(async {
                let clock = Arc::new(ManualClock::default());
                let cache = Arc::new(InMemoryCacheStore::with_clock(clock.clone()));
                let manager = LoginSecurityManager::with_clock(
                    cache,
                    clock,
                    LoginSecurityConfig::default().with_max_attempts(max),
                );
                for _ in 0..failures {
                    manager.record_attempt("alice", "10.0.0.1", false).await.unwrap();
                }
                // another IP, so only the account counter matters
                manager.check_locked("alice", "10.0.0.9").await.unwrap().is_locked()
            });
            prop_assert_eq!(locked, failures >= max);
        }
    }
}
