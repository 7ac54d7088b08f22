//! Session lifecycle: `Created -> Active -> {expired, deleted}`.
//!
//! Layout in the cache store:
//! - `session:{id}`: the [`UserSession`] record
//! - `user_session:{user}:{client}`: id of the newest session per user and client type
//! - `device_session:{device}`: id of the newest session per device
//!
//! The three writes are independent, not a transaction. A failure part way
//! through may leave an index pointing at a missing session, or a session no
//! index reaches. Readers therefore treat a dangling or stale index as "not
//! found" and drop it; sessions themselves still expire through their TTL.
//!
//! A session's absolute expiry is fixed at creation. Refreshing only moves
//! `last_active_at` and rewrites the record with its remaining lifetime.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use gatekeep_core::clock::{remaining, to_time_delta};
use gatekeep_core::{Clock, SystemClock, TenantId, UserId};
use gatekeep_infra::cache::{fetch_json, put_json};
use gatekeep_infra::{CacheError, CacheStore};

use crate::config::{ClientType, SessionConfig};
use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub session_id: String,
    pub user_id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    pub client_type: ClientType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl UserSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Lifetime left at `now`, `None` once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        remaining(now, self.expires_at)
    }
}

/// Parameters for [`SessionManager::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub user_id: UserId,
    pub client_type: ClientType,
    pub username: String,
    pub tenant_id: Option<TenantId>,
    pub device_id: Option<String>,
    pub login_ip: Option<String>,
    /// Generated when absent.
    pub session_id: Option<String>,
}

impl NewSession {
    pub fn new(user_id: UserId, client_type: ClientType) -> Self {
        Self {
            user_id,
            client_type,
            username: String::new(),
            tenant_id: None,
            device_id: None,
            login_ip: None,
            session_id: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into()).filter(|d: &String| !d.is_empty());
        self
    }

    pub fn with_login_ip(mut self, ip: impl Into<String>) -> Self {
        self.login_ip = Some(ip.into()).filter(|ip: &String| !ip.is_empty());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

fn session_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

fn user_session_key(user: UserId, client: ClientType) -> String {
    format!("user_session:{}:{}", user.get(), client)
}

fn device_session_key(device_id: &str) -> String {
    format!("device_session:{device_id}")
}

/// Client types a user may hold an indexed session for.
fn indexed_client_types() -> impl Iterator<Item = ClientType> {
    ClientType::KNOWN.into_iter().chain([ClientType::Unknown])
}

pub struct SessionManager {
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl core::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(cache: Arc<dyn CacheStore>, config: SessionConfig) -> Self {
        Self::with_clock(cache, Arc::new(SystemClock), config)
    }

    pub fn with_clock(cache: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, config: SessionConfig) -> Self {
        Self {
            cache,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Store a new session and point the user/client and device indexes at it.
    ///
    /// A previous session indexed under the same user and client type is not
    /// revoked; it simply stops being reachable through the index.
    #[instrument(skip(self, new), fields(user = %new.user_id, client = %new.client_type))]
    pub async fn create(&self, new: NewSession) -> SessionResult<UserSession> {
        let session_id = match new.session_id {
            Some(id) if id.trim().is_empty() => {
                return Err(SessionError::InvalidArgument("empty session id".to_string()));
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let ttl = self.config.ttl_for(new.client_type);
        let now = self.clock.now();
        let session = UserSession {
            session_id,
            user_id: new.user_id,
            username: new.username,
            tenant_id: new.tenant_id,
            client_type: new.client_type,
            device_id: new.device_id,
            login_ip: new.login_ip,
            created_at: now,
            expires_at: now + to_time_delta(ttl),
            last_active_at: now,
        };

        put_json(&*self.cache, &session_key(&session.session_id), &session, ttl).await?;
        self.cache
            .set(
                &user_session_key(session.user_id, session.client_type),
                session.session_id.clone(),
                ttl,
            )
            .await?;
        if let Some(device) = &session.device_id {
            self.cache
                .set(&device_session_key(device), session.session_id.clone(), ttl)
                .await?;
        }

        info!(session = %session.session_id, ttl_secs = ttl.as_secs(), "session created");
        Ok(session)
    }

    /// The stored record as is. Corrupted records are discarded.
    async fn load(&self, session_id: &str) -> SessionResult<Option<UserSession>> {
        let key = session_key(session_id);
        match fetch_json::<UserSession>(&*self.cache, &key).await {
            Ok(session) => Ok(session),
            Err(CacheError::Corrupted { reason, .. }) => {
                warn!(session = session_id, %reason, "discarding unreadable session record");
                self.forget(&[key]).await;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load a live session. An expired record still in the store is deleted
    /// together with its indexes and reported as not found.
    pub async fn get(&self, session_id: &str) -> SessionResult<UserSession> {
        let session = self
            .load(session_id)
            .await?
            .ok_or_else(|| SessionError::not_found(session_id))?;

        if session.is_expired_at(self.clock.now()) {
            debug!(session = session_id, "session expired, removing");
            self.purge(&session).await;
            return Err(SessionError::not_found(session_id));
        }
        Ok(session)
    }

    /// Mark the session active now. The absolute expiry does not move.
    #[instrument(skip(self))]
    pub async fn refresh(&self, session_id: &str) -> SessionResult<UserSession> {
        let session = self.get(session_id).await?;
        self.touch(session).await
    }

    async fn touch(&self, mut session: UserSession) -> SessionResult<UserSession> {
        let now = self.clock.now();
        let Some(left) = session.remaining_at(now) else {
            self.purge(&session).await;
            return Err(SessionError::not_found(session.session_id));
        };
        session.last_active_at = now;
        put_json(&*self.cache, &session_key(&session.session_id), &session, left).await?;
        Ok(session)
    }

    /// Remove a session and, best effort, the indexes still pointing at it.
    /// Returns whether the session record existed.
    #[instrument(skip(self))]
    pub async fn delete(&self, session_id: &str) -> SessionResult<bool> {
        // The record may be gone already (expiry raced us); the indexes are
        // then left to their own TTL.
        let session = match self.load(session_id).await {
            Ok(session) => session,
            Err(error) => {
                warn!(session = session_id, %error, "could not read session before delete");
                None
            }
        };

        let removed = self.cache.delete(&[session_key(session_id)]).await? > 0;
        if let Some(session) = &session {
            self.drop_indexes(session).await;
        }
        info!(session = session_id, removed, "session deleted");
        Ok(removed)
    }

    /// Session indexed for `user` on `client`.
    pub async fn session_for(&self, user: UserId, client: ClientType) -> SessionResult<UserSession> {
        let key = user_session_key(user, client);
        self.resolve_index(&key, |s| s.user_id == user && s.client_type == client)
            .await
    }

    /// Session indexed for a device.
    pub async fn session_for_device(&self, device_id: &str) -> SessionResult<UserSession> {
        let key = device_session_key(device_id);
        self.resolve_index(&key, |s| s.device_id.as_deref() == Some(device_id))
            .await
    }

    /// Log `user` out of one client type. Returns `false` if there was no
    /// session to kick.
    #[instrument(skip(self), fields(user = %user, client = %client))]
    pub async fn kick(&self, user: UserId, client: ClientType) -> SessionResult<bool> {
        match self.session_for(user, client).await {
            Ok(session) => {
                self.delete(&session.session_id).await?;
                info!(session = %session.session_id, "session kicked");
                Ok(true)
            }
            Err(SessionError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Kick `user` from every client type; returns how many sessions ended.
    pub async fn logout_everywhere(&self, user: UserId) -> SessionResult<usize> {
        let mut kicked = 0;
        for client in indexed_client_types() {
            if self.kick(user, client).await? {
                kicked += 1;
            }
        }
        Ok(kicked)
    }

    /// Live indexed sessions of `user`, one per client type at most.
    pub async fn list_user_sessions(&self, user: UserId) -> SessionResult<Vec<UserSession>> {
        let mut sessions = Vec::new();
        for client in indexed_client_types() {
            match self.session_for(user, client).await {
                Ok(session) => sessions.push(session),
                Err(SessionError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(sessions)
    }

    /// Check a session on use: load it and record the activity. A failed
    /// activity write is logged and does not fail validation.
    pub async fn validate(&self, session_id: &str) -> SessionResult<UserSession> {
        let session = self.get(session_id).await?;
        match self.touch(session.clone()).await {
            Ok(touched) => Ok(touched),
            Err(SessionError::NotFound(what)) => Err(SessionError::NotFound(what)),
            Err(error) => {
                warn!(session = session_id, %error, "failed to record session activity");
                Ok(session)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Index maintenance
    // ─────────────────────────────────────────────────────────────────────────

    async fn resolve_index(
        &self,
        key: &str,
        belongs: impl Fn(&UserSession) -> bool,
    ) -> SessionResult<UserSession> {
        let Some(session_id) = self.cache.get(key).await? else {
            return Err(SessionError::not_found(key));
        };
        match self.get(&session_id).await {
            Ok(session) if belongs(&session) => Ok(session),
            Ok(_) | Err(SessionError::NotFound(_)) => {
                debug!(index = key, session = %session_id, "dropping stale session index");
                self.release_index(key, &session_id).await;
                Err(SessionError::not_found(key))
            }
            Err(e) => Err(e),
        }
    }

    /// Delete an index only while it still names `session_id`, so a newer
    /// session's index survives the cleanup of an older one.
    async fn release_index(&self, key: &str, session_id: &str) {
        match self.cache.get(key).await {
            Ok(Some(current)) if current == session_id => self.forget(&[key.to_string()]).await,
            Ok(_) => {}
            Err(error) => warn!(index = key, %error, "failed to read session index"),
        }
    }

    async fn drop_indexes(&self, session: &UserSession) {
        self.release_index(
            &user_session_key(session.user_id, session.client_type),
            &session.session_id,
        )
        .await;
        if let Some(device) = &session.device_id {
            self.release_index(&device_session_key(device), &session.session_id)
                .await;
        }
    }

    async fn purge(&self, session: &UserSession) {
        self.forget(&[session_key(&session.session_id)]).await;
        self.drop_indexes(session).await;
    }

    async fn forget(&self, keys: &[String]) {
        if let Err(error) = self.cache.delete(keys).await {
            warn!(?keys, %error, "best-effort session cleanup failed");
        }
    }
}
