use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use gatekeep_core::clock::to_time_delta;
use gatekeep_infra::cache::{fetch_json, put_json};

use super::LoginSecurityManager;
use crate::error::{VerificationError, VerificationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeType {
    Login,
    Register,
    ResetPassword,
}

impl CodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeType::Login => "login",
            CodeType::Register => "register",
            CodeType::ResetPassword => "reset_password",
        }
    }
}

impl fmt::Display for CodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored under `verify_code:{type}:{target}` for validity + retention, so
/// an expired code still reads as expired until the retention runs out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CodeRecord {
    code: String,
    code_type: CodeType,
    target: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    used_at: Option<DateTime<Utc>>,
}

fn code_key(target: &str, code_type: CodeType) -> String {
    format!("verify_code:{code_type}:{target}")
}

fn cooldown_key(target: &str, code_type: CodeType) -> String {
    format!("verify_cooldown:{code_type}:{target}")
}

fn consumed_key(record: &CodeRecord) -> String {
    format!(
        "verify_consumed:{}:{}:{}",
        record.code_type,
        record.target,
        record.created_at.timestamp_micros()
    )
}

impl LoginSecurityManager {
    /// Issue `code` for `target` (phone number or e-mail address).
    ///
    /// Rejected with [`VerificationError::TooFrequent`] while the previous
    /// issuance for the same target and type is cooling down. A new code
    /// replaces any earlier one.
    #[instrument(skip(self, code))]
    pub async fn store_code(
        &self,
        target: &str,
        code_type: CodeType,
        code: &str,
    ) -> VerificationResult<()> {
        if target.trim().is_empty() || code.is_empty() {
            return Err(VerificationError::InvalidArgument(
                "target and code are required".to_string(),
            ));
        }

        // The counter doubles as an atomic claim on the cooldown window.
        let cooldown = cooldown_key(target, code_type);
        if self.cache.incr(&cooldown, self.config.code_cooldown).await? > 1 {
            debug!("verification code requested during cooldown");
            return Err(VerificationError::TooFrequent);
        }

        let now = self.clock.now();
        let record = CodeRecord {
            code: code.to_string(),
            code_type,
            target: target.to_string(),
            created_at: now,
            expires_at: now + to_time_delta(self.config.code_validity),
            used_at: None,
        };
        let ttl = self.config.code_validity + self.config.used_code_retention;
        if let Err(error) = put_json(&*self.cache, &code_key(target, code_type), &record, ttl).await {
            // let the caller retry right away
            if let Err(release) = self.cache.delete(&[cooldown]).await {
                warn!(%release, "failed to release verification cooldown");
            }
            return Err(error.into());
        }

        info!(expires_at = %record.expires_at, "verification code issued");
        Ok(())
    }

    /// Check `input` against the latest code for `target`.
    ///
    /// Rejections, in order: missing, already used, expired, mismatch. A
    /// mismatch leaves the code usable. On success the code is marked used
    /// and kept for the retention window so replays read as already used.
    #[instrument(skip(self, input))]
    pub async fn validate_code(
        &self,
        target: &str,
        code_type: CodeType,
        input: &str,
    ) -> VerificationResult<()> {
        let key = code_key(target, code_type);
        let mut record = fetch_json::<CodeRecord>(&*self.cache, &key)
            .await?
            .ok_or(VerificationError::NotFound)?;

        if record.used_at.is_some() {
            return Err(VerificationError::AlreadyUsed);
        }
        let now = self.clock.now();
        if now >= record.expires_at {
            return Err(VerificationError::Expired);
        }
        if record.code != input {
            debug!("verification code mismatch");
            return Err(VerificationError::Mismatch);
        }

        // Exactly one concurrent validation of this issuance gets 1.
        let ttl = self.config.code_validity + self.config.used_code_retention;
        if self.cache.incr(&consumed_key(&record), ttl).await? > 1 {
            return Err(VerificationError::AlreadyUsed);
        }

        record.used_at = Some(now);
        if let Err(error) =
            put_json(&*self.cache, &key, &record, self.config.used_code_retention).await
        {
            warn!(%error, "failed to mark verification code used");
        }
        info!("verification code accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::login::test_support::fixture;
    use gatekeep_infra::CacheStore;

    const TARGET: &str = "alice@example.com";
    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn codes_are_single_use() {
        let f = fixture();
        f.manager.store_code(TARGET, CodeType::Login, "123456").await.unwrap();

        f.manager.validate_code(TARGET, CodeType::Login, "123456").await.unwrap();
        let err = f
            .manager
            .validate_code(TARGET, CodeType::Login, "123456")
            .await
            .unwrap_err();
        assert_eq!(err, VerificationError::AlreadyUsed);
        assert_eq!(err.to_string(), "verification code already used");

        // used codes linger only for the retention window
        f.clock.advance(6 * MINUTE);
        assert_eq!(
            f.manager.validate_code(TARGET, CodeType::Login, "123456").await,
            Err(VerificationError::NotFound)
        );
    }

    #[tokio::test]
    async fn mismatch_keeps_the_code_usable() {
        let f = fixture();
        f.manager.store_code(TARGET, CodeType::Register, "123456").await.unwrap();

        assert_eq!(
            f.manager.validate_code(TARGET, CodeType::Register, "000000").await,
            Err(VerificationError::Mismatch)
        );
        // a code of another type is a separate record
        assert_eq!(
            f.manager.validate_code(TARGET, CodeType::Login, "123456").await,
            Err(VerificationError::NotFound)
        );
        f.manager.validate_code(TARGET, CodeType::Register, "123456").await.unwrap();
    }

    #[tokio::test]
    async fn expired_is_distinct_from_missing() {
        let f = fixture();
        f.manager
            .store_code(TARGET, CodeType::ResetPassword, "654321")
            .await
            .unwrap();

        f.clock.advance(11 * MINUTE);
        assert_eq!(
            f.manager
                .validate_code(TARGET, CodeType::ResetPassword, "654321")
                .await,
            Err(VerificationError::Expired)
        );

        f.clock.advance(5 * MINUTE);
        assert_eq!(
            f.manager
                .validate_code(TARGET, CodeType::ResetPassword, "654321")
                .await,
            Err(VerificationError::NotFound)
        );
    }

    #[tokio::test]
    async fn issuance_is_throttled() {
        let f = fixture();
        f.manager.store_code(TARGET, CodeType::Login, "111111").await.unwrap();
        assert_eq!(
            f.manager.store_code(TARGET, CodeType::Login, "222222").await,
            Err(VerificationError::TooFrequent)
        );
        // other types and targets have their own cooldown
        f.manager.store_code(TARGET, CodeType::Register, "333333").await.unwrap();
        f.manager
            .store_code("bob@example.com", CodeType::Login, "444444")
            .await
            .unwrap();

        f.clock.advance(MINUTE + Duration::from_secs(1));
        f.manager.store_code(TARGET, CodeType::Login, "555555").await.unwrap();
        assert_eq!(
            f.manager.validate_code(TARGET, CodeType::Login, "111111").await,
            Err(VerificationError::Mismatch)
        );
        f.manager.validate_code(TARGET, CodeType::Login, "555555").await.unwrap();
    }

    #[tokio::test]
    async fn corrupted_records_are_reported() {
        let f = fixture();
        f.cache
            .set(&code_key(TARGET, CodeType::Login), "garbage".to_string(), MINUTE)
            .await
            .unwrap();
        assert_eq!(
            f.manager.validate_code(TARGET, CodeType::Login, "123456").await,
            Err(VerificationError::Corrupted)
        );
    }

    #[tokio::test]
    async fn empty_requests_are_rejected() {
        let f = fixture();
        assert!(matches!(
            f.manager.store_code(" ", CodeType::Login, "1").await,
            Err(VerificationError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.manager.store_code(TARGET, CodeType::Login, "").await,
            Err(VerificationError::InvalidArgument(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_validations_accept_once() {
        let f = fixture();
        f.manager.store_code(TARGET, CodeType::Login, "987654").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = f.manager.clone();
            handles.push(tokio::spawn(async move {
                manager.validate_code(TARGET, CodeType::Login, "987654").await
            }));
        }
        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => accepted += 1,
                Err(e) => assert_eq!(e, VerificationError::AlreadyUsed),
            }
        }
        assert_eq!(accepted, 1);
    }
}
