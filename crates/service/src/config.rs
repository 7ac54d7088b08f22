//! Top-level configuration.

use gatekeep_auth::AuthzConfig;
use gatekeep_core::env;
use gatekeep_security::{LoginSecurityConfig, SessionConfig};

/// Prefix applied to every key written to a shared Redis.
pub const DEFAULT_CACHE_KEY_PREFIX: &str = "gatekeep:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatekeepConfig {
    pub authz: AuthzConfig,
    pub session: SessionConfig,
    pub login: LoginSecurityConfig,
    /// Cache store; in-memory when absent.
    pub redis_url: Option<String>,
    pub cache_key_prefix: String,
    /// Relational directory; in-memory when absent.
    pub database_url: Option<String>,
    /// Spawn the periodic policy reload task on start.
    pub auto_reload: bool,
}

impl Default for GatekeepConfig {
    fn default() -> Self {
        Self {
            authz: AuthzConfig::default(),
            session: SessionConfig::default(),
            login: LoginSecurityConfig::default(),
            redis_url: None,
            cache_key_prefix: DEFAULT_CACHE_KEY_PREFIX.to_string(),
            database_url: None,
            auto_reload: true,
        }
    }
}

impl GatekeepConfig {
    /// Every component's `from_env()` plus `GATEKEEP_REDIS_URL`,
    /// `GATEKEEP_CACHE_PREFIX`, `GATEKEEP_DATABASE_URL` and
    /// `GATEKEEP_AUTO_RELOAD`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            authz: AuthzConfig::from_env(),
            session: SessionConfig::from_env(),
            login: LoginSecurityConfig::from_env(),
            redis_url: env::string("GATEKEEP_REDIS_URL"),
            cache_key_prefix: env::string("GATEKEEP_CACHE_PREFIX")
                .unwrap_or(defaults.cache_key_prefix),
            database_url: env::string("GATEKEEP_DATABASE_URL"),
            auto_reload: env::number("GATEKEEP_AUTO_RELOAD", defaults.auto_reload),
        }
    }

    pub fn with_authz(mut self, authz: AuthzConfig) -> Self {
        self.authz = authz;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_login(mut self, login: LoginSecurityConfig) -> Self {
        self.login = login;
        self
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_auto_reload(mut self, enabled: bool) -> Self {
        self.auto_reload = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults_are_in_memory_with_auto_reload() {
        let config = GatekeepConfig::default();
        assert!(config.redis_url.is_none());
        assert!(config.database_url.is_none());
        assert!(config.auto_reload);
        assert_eq!(config.cache_key_prefix, "gatekeep:");
    }

    #[test]
    fn builders_replace_components() {
        let config = GatekeepConfig::default()
            .with_redis_url("redis://127.0.0.1/")
            .with_database_url("postgres://localhost/gatekeep")
            .with_login(LoginSecurityConfig::default().with_max_attempts(3))
            .with_auto_reload(false);
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1/"));
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/gatekeep")
        );
        assert_eq!(config.login.max_attempts, 3);
        assert!(!config.auto_reload);
        assert_eq!(
            config.authz.policy_refresh_interval,
            Duration::from_secs(10)
        );
    }
}
