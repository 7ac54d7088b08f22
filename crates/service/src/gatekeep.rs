//! Wiring of the authorization engine, menu service, session manager and
//! login security manager over one set of stores.
//!
//! The login flow the managers are meant to be driven in:
//!
//! 1. [`Gatekeep::begin_login`] refuses locked identifiers and IPs;
//! 2. the caller checks credentials (out of scope here);
//! 3. [`Gatekeep::complete_login`] or [`Gatekeep::fail_login`];
//! 4. every request then goes through [`Gatekeep::authorize_session`].

use std::sync::Arc;

use tracing::{info, instrument, warn};

use gatekeep_auth::{AuthorizationEngine, MenuService, ReloadHandle};
use gatekeep_core::{Clock, DomainResult, SystemClock, TenantId};
use gatekeep_infra::{
    CacheStore, Directory, InMemoryCacheStore, InMemoryDirectory, InMemoryPolicyStore,
    PolicyEvaluator,
};
use gatekeep_security::{
    LockStatus, LoginSecurityManager, NewSession, SessionManager, UserSession,
};

use crate::config::GatekeepConfig;

pub struct Gatekeep {
    engine: Arc<AuthorizationEngine>,
    menus: MenuService,
    sessions: Arc<SessionManager>,
    login: Arc<LoginSecurityManager>,
    // aborts the reload task on drop
    reload: Option<ReloadHandle>,
}

impl core::fmt::Debug for Gatekeep {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Gatekeep")
            .field("engine", &self.engine)
            .field("auto_reload", &self.reload.is_some())
            .finish_non_exhaustive()
    }
}

impl Gatekeep {
    pub fn builder(config: GatekeepConfig) -> GatekeepBuilder {
        GatekeepBuilder::new(config)
    }

    /// Connect to the stores named in `config`.
    ///
    /// A Redis URL needs the `redis` feature. A database URL needs
    /// `casbin-postgres`: it backs both the directory and the policy store,
    /// so policies survive restarts and replicas share them. A missing
    /// feature is an invalid argument rather than a silent fallback to
    /// memory. Without a database URL the evaluator is in-memory (casbin's
    /// with the `casbin` feature, otherwise the built-in one).
    pub async fn connect(config: GatekeepConfig) -> DomainResult<Self> {
        let mut builder = GatekeepBuilder::new(config.clone());

        if let Some(url) = &config.redis_url {
            builder = builder.cache(connect_cache(url, &config.cache_key_prefix).await?);
        }
        match &config.database_url {
            Some(url) => {
                builder = builder.evaluator(durable_evaluator(url).await?);
                builder = builder.directory(connect_directory(url).await?);
            }
            None => {
                warn!("no database configured; policies live in memory only");
                builder = builder.evaluator(default_evaluator().await?);
            }
        }

        let gatekeep = builder.build();
        info!(
            redis = config.redis_url.is_some(),
            database = config.database_url.is_some(),
            "gatekeep connected"
        );
        Ok(gatekeep)
    }

    pub fn engine(&self) -> &Arc<AuthorizationEngine> {
        &self.engine
    }

    pub fn menus(&self) -> &MenuService {
        &self.menus
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn login(&self) -> &Arc<LoginSecurityManager> {
        &self.login
    }

    pub fn is_auto_reloading(&self) -> bool {
        self.reload.as_ref().is_some_and(|h| !h.is_finished())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Login flow
    // ─────────────────────────────────────────────────────────────────────────

    /// Fails with [`DomainError::Locked`] while the identifier or the IP is
    /// locked out.
    #[instrument(skip(self))]
    pub async fn begin_login(&self, identifier: &str, ip: &str) -> DomainResult<()> {
        self.login.check_locked(identifier, ip).await?.ensure_unlocked()?;
        Ok(())
    }

    /// Count a failed credential check; returns the lock state afterwards.
    #[instrument(skip(self))]
    pub async fn fail_login(&self, identifier: &str, ip: &str) -> DomainResult<LockStatus> {
        self.login.record_attempt(identifier, ip, false).await?;
        Ok(self.login.check_locked(identifier, ip).await?)
    }

    /// Clear the failure history and open a session.
    #[instrument(skip(self, session), fields(user = %session.user_id, client = %session.client_type))]
    pub async fn complete_login(
        &self,
        identifier: &str,
        ip: &str,
        session: NewSession,
    ) -> DomainResult<UserSession> {
        self.login.record_attempt(identifier, ip, true).await?;
        let session = if session.login_ip.is_none() {
            session.with_login_ip(ip)
        } else {
            session
        };
        Ok(self.sessions.create(session).await?)
    }

    pub async fn logout(&self, session_id: &str) -> DomainResult<bool> {
        Ok(self.sessions.delete(session_id).await?)
    }

    /// Validate the session and check API access in the session's tenant
    /// (the default tenant when the session carries none).
    #[instrument(skip(self, session_id))]
    pub async fn authorize_session(
        &self,
        session_id: &str,
        path: &str,
        method: &str,
    ) -> DomainResult<UserSession> {
        let session = self.sessions.validate(session_id).await?;
        let tenant = session.tenant_id.unwrap_or(TenantId::DEFAULT);
        self.engine
            .ensure_api_access(session.user_id, tenant, path, method)
            .await?;
        Ok(session)
    }
}

#[cfg(feature = "casbin-postgres")]
const POLICY_POOL_SIZE: u32 = 4;

#[cfg(feature = "redis")]
async fn connect_cache(url: &str, prefix: &str) -> DomainResult<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> =
        Arc::new(gatekeep_infra::cache::RedisCacheStore::connect(url, prefix).await?);
    Ok(store)
}

#[cfg(not(feature = "redis"))]
async fn connect_cache(_url: &str, _prefix: &str) -> DomainResult<Arc<dyn CacheStore>> {
    Err(gatekeep_core::DomainError::invalid_argument(
        "a Redis URL was configured but redis support is not compiled in",
    ))
}

#[cfg(feature = "postgres")]
async fn connect_directory(url: &str) -> DomainResult<Arc<dyn Directory>> {
    let directory: Arc<dyn Directory> =
        Arc::new(gatekeep_infra::directory::PgDirectory::connect(url).await?);
    Ok(directory)
}

#[cfg(not(feature = "postgres"))]
async fn connect_directory(_url: &str) -> DomainResult<Arc<dyn Directory>> {
    Err(gatekeep_core::DomainError::invalid_argument(
        "a database URL was configured but postgres support is not compiled in",
    ))
}

#[cfg(feature = "casbin-postgres")]
async fn durable_evaluator(url: &str) -> DomainResult<Arc<dyn PolicyEvaluator>> {
    let store: Arc<dyn PolicyEvaluator> = Arc::new(
        gatekeep_infra::policy::CasbinPolicyStore::postgres(url, POLICY_POOL_SIZE).await?,
    );
    Ok(store)
}

#[cfg(not(feature = "casbin-postgres"))]
async fn durable_evaluator(_url: &str) -> DomainResult<Arc<dyn PolicyEvaluator>> {
    Err(gatekeep_core::DomainError::invalid_argument(
        "a database URL was configured but durable policy storage (casbin-postgres) is not compiled in",
    ))
}

#[cfg(feature = "casbin")]
async fn default_evaluator() -> DomainResult<Arc<dyn PolicyEvaluator>> {
    let store: Arc<dyn PolicyEvaluator> =
        Arc::new(gatekeep_infra::policy::CasbinPolicyStore::in_memory().await?);
    Ok(store)
}

#[cfg(not(feature = "casbin"))]
async fn default_evaluator() -> DomainResult<Arc<dyn PolicyEvaluator>> {
    let store: Arc<dyn PolicyEvaluator> = InMemoryPolicyStore::arc();
    Ok(store)
}

/// Assembles a [`Gatekeep`]; every store left unset is in-memory.
pub struct GatekeepBuilder {
    config: GatekeepConfig,
    cache: Option<Arc<dyn CacheStore>>,
    evaluator: Option<Arc<dyn PolicyEvaluator>>,
    directory: Option<Arc<dyn Directory>>,
    clock: Option<Arc<dyn Clock>>,
}

impl GatekeepBuilder {
    pub fn new(config: GatekeepConfig) -> Self {
        Self {
            config,
            cache: None,
            evaluator: None,
            directory: None,
            clock: None,
        }
    }

    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Clock for session and lockout expiry; also drives the default
    /// in-memory cache.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Auto reload is only started when called inside a tokio runtime.
    pub fn build(self) -> Gatekeep {
        let GatekeepBuilder {
            config,
            cache,
            evaluator,
            directory,
            clock,
        } = self;

        let clock: Arc<dyn Clock> = match clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let cache: Arc<dyn CacheStore> = match cache {
            Some(cache) => cache,
            None => Arc::new(InMemoryCacheStore::with_clock(clock.clone())),
        };
        let evaluator: Arc<dyn PolicyEvaluator> = match evaluator {
            Some(evaluator) => evaluator,
            None => InMemoryPolicyStore::arc(),
        };
        let directory: Arc<dyn Directory> = match directory {
            Some(directory) => directory,
            None => InMemoryDirectory::arc(),
        };

        let engine = Arc::new(AuthorizationEngine::new(evaluator, directory, config.authz));
        let menus = MenuService::new(engine.clone());
        let sessions = Arc::new(SessionManager::with_clock(
            cache.clone(),
            clock.clone(),
            config.session,
        ));
        let login = Arc::new(LoginSecurityManager::with_clock(cache, clock, config.login));

        let reload = if !config.auto_reload {
            None
        } else if tokio::runtime::Handle::try_current().is_ok() {
            Some(engine.spawn_auto_reload())
        } else {
            warn!("no tokio runtime, policy auto-reload disabled");
            None
        };

        Gatekeep {
            engine,
            menus,
            sessions,
            login,
            reload,
        }
    }
}
