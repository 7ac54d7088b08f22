//! Human-facing identifier resolution.
//!
//! Accepted forms per kind:
//! - policy token (`t3`, `r7`, `a12`, `u42`)
//! - bare decimal id (`3`)
//! - a name looked up in the directory: tenant code, role name (within the
//!   tenant), permission code (within the tenant), username
//!
//! Tenants additionally accept `""` and `"default"` for the default tenant.

use std::sync::Arc;

use tracing::{debug, warn};

use gatekeep_core::{
    DEFAULT_TENANT_CODE, EntityId, EntityKind, PermissionId, RoleId, TenantId, UserId,
    parse_decimal,
};
use gatekeep_infra::Directory;

use crate::error::{AuthzError, AuthzResult};

fn numeric_form(kind: EntityKind, ident: &str) -> Option<u64> {
    EntityId::decode_as(kind, ident)
        .ok()
        .map(|e| e.id())
        .or_else(|| parse_decimal(ident))
}

#[derive(Clone)]
pub struct TenantResolver {
    directory: Arc<dyn Directory>,
}

impl core::fmt::Debug for TenantResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TenantResolver").finish_non_exhaustive()
    }
}

impl TenantResolver {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Strict tenant resolution.
    pub async fn tenant_id(&self, ident: &str) -> AuthzResult<TenantId> {
        let ident = ident.trim();
        if ident.is_empty() || ident == DEFAULT_TENANT_CODE {
            return Ok(TenantId::DEFAULT);
        }
        if let Some(id) = numeric_form(EntityKind::Tenant, ident) {
            return Ok(TenantId::new(id));
        }
        self.directory
            .tenant_by_code(ident)
            .await?
            .map(|t| t.id)
            .ok_or_else(|| AuthzError::not_found(format!("tenant '{ident}'")))
    }

    /// Lenient tenant resolution: any failure falls back to the default
    /// tenant so authorization stays available under partial
    /// misconfiguration. Use [`TenantResolver::tenant_id`] when the caller
    /// must know.
    pub async fn tenant_or_default(&self, ident: &str) -> TenantId {
        match self.tenant_id(ident).await {
            Ok(id) => id,
            Err(error) => {
                warn!(tenant = ident, %error, "tenant resolution failed, using default tenant");
                TenantId::DEFAULT
            }
        }
    }

    /// Human-facing code of a tenant.
    pub async fn tenant_code(&self, id: TenantId) -> AuthzResult<String> {
        if id.is_default() {
            return Ok(DEFAULT_TENANT_CODE.to_string());
        }
        self.directory
            .tenant_by_id(id)
            .await?
            .map(|t| t.code)
            .ok_or_else(|| AuthzError::not_found(format!("tenant {id}")))
    }

    /// Resolve a role token, id or name. Names are looked up inside `tenant`
    /// (resolved leniently).
    pub async fn role_id(&self, ident: &str, tenant: &str) -> AuthzResult<RoleId> {
        if let Some(id) = numeric_form(EntityKind::Role, ident) {
            return Ok(RoleId::new(id));
        }
        let tenant_id = self.tenant_or_default(tenant).await;
        self.directory
            .role_by_name(tenant_id, ident)
            .await?
            .map(|r| r.id)
            .ok_or_else(|| AuthzError::not_found(format!("role '{ident}'")))
    }

    pub async fn role_name(&self, id: RoleId) -> AuthzResult<String> {
        self.directory
            .role_by_id(id)
            .await?
            .map(|r| r.name)
            .ok_or_else(|| AuthzError::not_found(format!("role {id}")))
    }

    /// Resolve a permission token, id or code inside `tenant`.
    pub async fn permission_id(&self, ident: &str, tenant: &str) -> AuthzResult<PermissionId> {
        let tenant_id = self.tenant_or_default(tenant).await;
        self.permission_id_in(ident, tenant_id).await
    }

    pub(crate) async fn permission_id_in(
        &self,
        ident: &str,
        tenant_id: TenantId,
    ) -> AuthzResult<PermissionId> {
        if let Some(id) = numeric_form(EntityKind::Permission, ident) {
            return Ok(PermissionId::new(id));
        }
        self.directory
            .permission_by_code(tenant_id, ident)
            .await?
            .map(|p| p.id)
            .ok_or_else(|| AuthzError::not_found(format!("permission '{ident}'")))
    }

    pub async fn permission_code(&self, id: PermissionId) -> AuthzResult<String> {
        self.directory
            .permission_by_id(id)
            .await?
            .map(|p| p.code)
            .ok_or_else(|| AuthzError::not_found(format!("permission {id}")))
    }

    /// Resolve a user token, id or username.
    pub async fn user_id(&self, ident: &str) -> AuthzResult<UserId> {
        if let Some(id) = numeric_form(EntityKind::User, ident) {
            return Ok(UserId::new(id));
        }
        debug!(username = ident, "resolving user by username");
        self.directory
            .user_by_username(ident)
            .await?
            .ok_or_else(|| AuthzError::not_found(format!("user '{ident}'")))
    }
}
