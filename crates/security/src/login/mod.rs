//! Login security: failed-attempt lockout and verification codes.
//!
//! Failed attempts are tracked twice, per identifier and per source IP,
//! and either can lock on its own. Counting uses the cache store's atomic
//! `incr_sliding`, so concurrent failures are never lost and the count
//! survives as long as failures keep arriving within the lock duration.
//!
//! | key                                          | holds                          |
//! |----------------------------------------------|--------------------------------|
//! | `login_attempt_count:{identifier}`           | failure counter                |
//! | `ip_attempt_count:{ip}`                      | failure counter                |
//! | `login_attempt:{identifier}`                 | lock record                    |
//! | `ip_attempt:{ip}`                            | lock record                    |
//! | `verify_code:{type}:{target}`                | latest issued code             |
//! | `verify_cooldown:{type}:{target}`            | issuance throttle              |
//! | `verify_consumed:{type}:{target}:{issued}`   | single-use guard               |

mod codes;
mod lockout;

use std::sync::Arc;

use gatekeep_core::{Clock, SystemClock};
use gatekeep_infra::CacheStore;

use crate::config::LoginSecurityConfig;

pub use codes::CodeType;
pub use lockout::{LockScope, LockStatus, LoginSecurityStats};

pub struct LoginSecurityManager {
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    config: LoginSecurityConfig,
}

impl core::fmt::Debug for LoginSecurityManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoginSecurityManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LoginSecurityManager {
    pub fn new(cache: Arc<dyn CacheStore>, config: LoginSecurityConfig) -> Self {
        Self::with_clock(cache, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        config: LoginSecurityConfig,
    ) -> Self {
        Self {
            cache,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &LoginSecurityConfig {
        &self.config
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use gatekeep_core::ManualClock;
    use gatekeep_infra::InMemoryCacheStore;

    use super::LoginSecurityManager;
    use crate::config::LoginSecurityConfig;

    pub struct Fixture {
        pub clock: Arc<ManualClock>,
        pub cache: Arc<InMemoryCacheStore>,
        pub manager: Arc<LoginSecurityManager>,
    }

    pub fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(InMemoryCacheStore::with_clock(clock.clone()));
        let manager = Arc::new(LoginSecurityManager::with_clock(
            cache.clone(),
            clock.clone(),
            LoginSecurityConfig::default(),
        ));
        Fixture {
            clock,
            cache,
            manager,
        }
    }
}
