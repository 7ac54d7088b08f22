//! Authorization engine configuration.

use std::time::Duration;

use gatekeep_core::{RoleId, env};

/// Interval at which evaluator caches are reloaded from durable storage.
pub const DEFAULT_POLICY_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Role name that bypasses every check.
pub const DEFAULT_SUPER_ADMIN_ROLE: &str = "super_admin";

/// Role id seeded as super admin.
pub const DEFAULT_SUPER_ADMIN_ROLE_ID: RoleId = RoleId::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzConfig {
    pub policy_refresh_interval: Duration,
    /// Role names granting the super-admin bypass.
    pub super_admin_role_names: Vec<String>,
    /// Role ids granting the super-admin bypass.
    pub super_admin_role_ids: Vec<RoleId>,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            policy_refresh_interval: DEFAULT_POLICY_REFRESH_INTERVAL,
            super_admin_role_names: vec![DEFAULT_SUPER_ADMIN_ROLE.to_string()],
            super_admin_role_ids: vec![DEFAULT_SUPER_ADMIN_ROLE_ID],
        }
    }
}

impl AuthzConfig {
    /// Read `GATEKEEP_POLICY_REFRESH_SECS`, `GATEKEEP_SUPER_ADMIN_ROLES` and
    /// `GATEKEEP_SUPER_ADMIN_ROLE_IDS` (comma separated), defaulting the rest.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let role_ids = env::list("GATEKEEP_SUPER_ADMIN_ROLE_IDS")
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.parse::<u64>().ok().map(RoleId::new))
                    .collect()
            })
            .unwrap_or(defaults.super_admin_role_ids);

        Self {
            policy_refresh_interval: env::duration_secs(
                "GATEKEEP_POLICY_REFRESH_SECS",
                defaults.policy_refresh_interval,
            ),
            super_admin_role_names: env::list("GATEKEEP_SUPER_ADMIN_ROLES")
                .unwrap_or(defaults.super_admin_role_names),
            super_admin_role_ids: role_ids,
        }
    }

    pub fn with_policy_refresh_interval(mut self, interval: Duration) -> Self {
        self.policy_refresh_interval = interval;
        self
    }

    pub fn with_super_admin_role_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.super_admin_role_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_super_admin_role_ids(mut self, ids: impl IntoIterator<Item = RoleId>) -> Self {
        self.super_admin_role_ids = ids.into_iter().collect();
        self
    }
}
