//! Tenant-scoped authorization engine.
//!
//! Wraps a [`PolicyEvaluator`] holding two tuple kinds:
//! - grouping `(u42, r7, t3)`: user 42 has role 7 in tenant 3
//! - policy `(r7, a12, t3)`: role 7 holds permission 12 in tenant 3
//!
//! "Not authorized" is always `Ok(false)`; errors are reserved for lookup
//! and storage failures. Policy tokens only ever appear in logs.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use gatekeep_core::{
    DomainError, EntityId, EntityKind, MenuId, PermissionId, RoleId, TenantId, UserId,
};
use gatekeep_infra::{Directory, GroupingRule, PolicyEvaluator, PolicyRule};

use crate::config::AuthzConfig;
use crate::error::{AuthzError, AuthzResult};
use crate::refresh::{self, ReloadHandle};
use crate::resolver::TenantResolver;

/// Decode evaluator tokens of one kind, skipping tokens of other kinds
/// (e.g. roles inheriting roles) and warning on foreign tokens.
fn decode_tokens<T>(tokens: impl IntoIterator<Item = String>) -> Vec<T>
where
    T: TryFrom<EntityId, Error = DomainError> + Eq + std::hash::Hash + Copy,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for token in tokens {
        match EntityId::decode(&token) {
            Ok(entity) => {
                if let Ok(value) = T::try_from(entity) {
                    if seen.insert(value) {
                        out.push(value);
                    }
                }
            }
            Err(error) => warn!(%token, %error, "skipping undecodable policy token"),
        }
    }
    out
}

/// Turn a boolean decision into the caller-facing error.
pub fn require(allowed: bool) -> AuthzResult<()> {
    if allowed {
        Ok(())
    } else {
        Err(AuthzError::PermissionDenied)
    }
}

pub struct AuthorizationEngine {
    evaluator: Arc<dyn PolicyEvaluator>,
    directory: Arc<dyn Directory>,
    resolver: TenantResolver,
    config: AuthzConfig,
}

impl core::fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthorizationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AuthorizationEngine {
    pub fn new(
        evaluator: Arc<dyn PolicyEvaluator>,
        directory: Arc<dyn Directory>,
        config: AuthzConfig,
    ) -> Self {
        let resolver = TenantResolver::new(directory.clone());
        Self {
            evaluator,
            directory,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &AuthzConfig {
        &self.config
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub fn evaluator(&self) -> &Arc<dyn PolicyEvaluator> {
        &self.evaluator
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Evaluation
    // ─────────────────────────────────────────────────────────────────────────

    async fn enforce(
        &self,
        subject: EntityId,
        permission: PermissionId,
        tenant: TenantId,
    ) -> AuthzResult<bool> {
        let (sub, obj, dom) = (subject.encode(), permission.encode(), tenant.encode());
        let allowed = self.evaluator.enforce(&sub, &obj, &dom).await?;
        debug!(subject = %sub, object = %obj, domain = %dom, allowed, "policy evaluated");
        Ok(allowed)
    }

    /// A user or role token is used as is; anything else resolves as a user.
    async fn resolve_subject(&self, subject: &str) -> AuthzResult<EntityId> {
        match EntityId::decode(subject) {
            Ok(entity) if matches!(entity.kind(), EntityKind::User | EntityKind::Role) => {
                Ok(entity)
            }
            _ => Ok(self.resolver.user_id(subject).await?.entity()),
        }
    }

    /// Raw policy evaluation from human-facing identifiers.
    ///
    /// `subject` must resolve (error otherwise); `tenant` resolves leniently;
    /// an unknown `object` permission is simply not granted. The policy model
    /// is `(subject, object, domain)`, so `action` only feeds diagnostics.
    /// No super-admin bypass applies here; see the `check_*` methods.
    #[instrument(skip(self))]
    pub async fn authorize(
        &self,
        subject: &str,
        tenant: &str,
        object: &str,
        action: &str,
    ) -> AuthzResult<bool> {
        let subject = self.resolve_subject(subject).await?;
        let tenant_id = self.resolver.tenant_or_default(tenant).await;

        let permission = match self.resolver.permission_id_in(object, tenant_id).await {
            Ok(permission) => permission,
            Err(AuthzError::NotFound(what)) => {
                debug!(%what, "unknown permission, denying");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        self.enforce(subject, permission, tenant_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Role assignment
    // ─────────────────────────────────────────────────────────────────────────

    /// Assign `role` to `user` in `tenant`. Idempotent.
    #[instrument(skip(self), fields(user = %user, role = %role, tenant = %tenant))]
    pub async fn grant_role(&self, user: UserId, role: RoleId, tenant: TenantId) -> AuthzResult<bool> {
        let added = self
            .evaluator
            .add_grouping(GroupingRule::new(user.encode(), role.encode(), tenant.encode()))
            .await?;
        if added {
            info!("role granted");
        } else {
            debug!("role already granted");
        }
        Ok(true)
    }

    /// Remove `role` from `user` in `tenant`. Idempotent.
    #[instrument(skip(self), fields(user = %user, role = %role, tenant = %tenant))]
    pub async fn revoke_role(&self, user: UserId, role: RoleId, tenant: TenantId) -> AuthzResult<bool> {
        let removed = self
            .evaluator
            .remove_grouping(&GroupingRule::new(user.encode(), role.encode(), tenant.encode()))
            .await?;
        if removed {
            info!("role revoked");
        }
        Ok(true)
    }

    /// Make `role` inherit everything `parent` holds in `tenant`.
    pub async fn add_role_inheritance(
        &self,
        role: RoleId,
        parent: RoleId,
        tenant: TenantId,
    ) -> AuthzResult<bool> {
        if role == parent {
            return Err(AuthzError::InvalidArgument(
                "a role cannot inherit from itself".to_string(),
            ));
        }
        self.evaluator
            .add_grouping(GroupingRule::new(role.encode(), parent.encode(), tenant.encode()))
            .await?;
        Ok(true)
    }

    pub async fn remove_role_inheritance(
        &self,
        role: RoleId,
        parent: RoleId,
        tenant: TenantId,
    ) -> AuthzResult<bool> {
        self.evaluator
            .remove_grouping(&GroupingRule::new(role.encode(), parent.encode(), tenant.encode()))
            .await?;
        Ok(true)
    }

    /// Remove every role of `user` in `tenant`.
    #[instrument(skip(self), fields(user = %user, tenant = %tenant))]
    pub async fn delete_all_roles_for_user(&self, user: UserId, tenant: TenantId) -> AuthzResult<bool> {
        let removed = self
            .evaluator
            .remove_groupings_for_member(&user.encode(), &tenant.encode())
            .await?;
        info!(removed, "roles cleared for user");
        Ok(true)
    }

    /// Delete a role from a tenant: its policy tuples, the grouping tuples
    /// assigning it, and its own inheritance links.
    #[instrument(skip(self), fields(role = %role, tenant = %tenant))]
    pub async fn delete_role(&self, role: RoleId, tenant: TenantId) -> AuthzResult<bool> {
        let (role, domain) = (role.encode(), tenant.encode());
        self.evaluator
            .remove_policies_for_subject(&role, &domain)
            .await?;
        self.evaluator
            .remove_groupings_for_role(&role, &domain)
            .await?;
        self.evaluator
            .remove_groupings_for_member(&role, &domain)
            .await?;
        info!("role deleted from policy");
        Ok(true)
    }

    /// Roles directly assigned to `user`.
    pub async fn roles_of(&self, user: UserId, tenant: TenantId) -> AuthzResult<Vec<RoleId>> {
        let tokens = self
            .evaluator
            .roles_for(&user.encode(), &tenant.encode())
            .await?;
        Ok(decode_tokens(tokens))
    }

    /// Users directly assigned `role`.
    pub async fn users_of(&self, role: RoleId, tenant: TenantId) -> AuthzResult<Vec<UserId>> {
        let tokens = self
            .evaluator
            .members_of(&role.encode(), &tenant.encode())
            .await?;
        Ok(decode_tokens(tokens))
    }

    /// Roles reachable from `user` through role inheritance.
    pub async fn implicit_roles_of(&self, user: UserId, tenant: TenantId) -> AuthzResult<Vec<RoleId>> {
        let tokens = self
            .evaluator
            .implicit_roles_for(&user.encode(), &tenant.encode())
            .await?;
        Ok(decode_tokens(tokens))
    }

    /// Every user holding at least one role in `tenant`.
    pub async fn users_in_tenant(&self, tenant: TenantId) -> AuthzResult<Vec<UserId>> {
        let tokens = self.evaluator.members_in_domain(&tenant.encode()).await?;
        Ok(decode_tokens(tokens))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permission assignment
    // ─────────────────────────────────────────────────────────────────────────

    fn grantee(subject: impl Into<EntityId>) -> AuthzResult<EntityId> {
        let subject = subject.into();
        match subject.kind() {
            EntityKind::User | EntityKind::Role => Ok(subject),
            other => Err(AuthzError::InvalidArgument(format!(
                "permissions can only be granted to users or roles, not to a {other}"
            ))),
        }
    }

    /// Grant `permission` directly to a role or user. Idempotent.
    #[instrument(skip(self, subject), fields(permission = %permission, tenant = %tenant))]
    pub async fn grant_permission(
        &self,
        subject: impl Into<EntityId>,
        permission: PermissionId,
        tenant: TenantId,
    ) -> AuthzResult<bool> {
        let subject = Self::grantee(subject)?;
        let added = self
            .evaluator
            .add_policy(PolicyRule::new(subject.encode(), permission.encode(), tenant.encode()))
            .await?;
        if added {
            info!(subject = %subject, "permission granted");
        }
        Ok(true)
    }

    #[instrument(skip(self, subject), fields(permission = %permission, tenant = %tenant))]
    pub async fn revoke_permission(
        &self,
        subject: impl Into<EntityId>,
        permission: PermissionId,
        tenant: TenantId,
    ) -> AuthzResult<bool> {
        let subject = Self::grantee(subject)?;
        let removed = self
            .evaluator
            .remove_policy(&PolicyRule::new(
                subject.encode(),
                permission.encode(),
                tenant.encode(),
            ))
            .await?;
        if removed {
            info!(subject = %subject, "permission revoked");
        }
        Ok(true)
    }

    /// Permissions held directly by a user or role.
    pub async fn permissions_of(
        &self,
        subject: impl Into<EntityId>,
        tenant: TenantId,
    ) -> AuthzResult<Vec<PermissionId>> {
        let subject = Self::grantee(subject)?;
        let rules = self
            .evaluator
            .permissions_for(&subject.encode(), &tenant.encode())
            .await?;
        Ok(decode_tokens(rules.into_iter().map(|r| r.object)))
    }

    /// Permissions held by `user` directly or through any inherited role.
    pub async fn implicit_permissions_of(
        &self,
        user: UserId,
        tenant: TenantId,
    ) -> AuthzResult<Vec<PermissionId>> {
        let rules = self
            .evaluator
            .implicit_permissions_for(&user.encode(), &tenant.encode())
            .await?;
        Ok(decode_tokens(rules.into_iter().map(|r| r.object)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Checks (with super-admin bypass)
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether any role directly assigned to `user` is configured as super
    /// admin, by id or by name.
    pub async fn is_super_admin(&self, user: UserId, tenant: TenantId) -> AuthzResult<bool> {
        let roles = self.roles_of(user, tenant).await?;
        if roles
            .iter()
            .any(|r| self.config.super_admin_role_ids.contains(r))
        {
            return Ok(true);
        }
        if self.config.super_admin_role_names.is_empty() {
            return Ok(false);
        }
        for role in roles {
            if let Some(record) = self.directory.role_by_id(role).await? {
                if self.config.super_admin_role_names.contains(&record.name) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Check a single permission (token, id or code within the tenant).
    #[instrument(skip(self), fields(user = %user, tenant = %tenant))]
    pub async fn check_permission(
        &self,
        user: UserId,
        tenant: TenantId,
        permission: &str,
    ) -> AuthzResult<bool> {
        if self.is_super_admin(user, tenant).await? {
            return Ok(true);
        }
        match self.resolver.permission_id_in(permission, tenant).await {
            Ok(permission) => self.enforce(user.entity(), permission, tenant).await,
            Err(AuthzError::NotFound(what)) => {
                debug!(%what, "unknown permission, denying");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Menu visibility check. A menu without permission links is visible;
    /// otherwise every required permission must be held.
    #[instrument(skip(self), fields(user = %user, tenant = %tenant, menu = %menu))]
    pub async fn check_menu_access(
        &self,
        user: UserId,
        tenant: TenantId,
        menu: MenuId,
    ) -> AuthzResult<bool> {
        match self.directory.menu_by_id(menu).await? {
            Some(record) if record.tenant_id == tenant => {}
            _ => return Err(AuthzError::not_found(format!("menu {menu}"))),
        }
        if self.is_super_admin(user, tenant).await? {
            return Ok(true);
        }

        let links = self.directory.menu_permissions(menu).await?;
        if links.is_empty() {
            debug!("menu has no permission links, allowing");
            return Ok(true);
        }
        for link in links.iter().filter(|l| l.is_required) {
            if !self.enforce(user.entity(), link.permission.id, tenant).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// API access check. An endpoint without configured permissions is
    /// denied; otherwise holding any one of them is enough.
    #[instrument(skip(self), fields(user = %user, tenant = %tenant))]
    pub async fn check_api_access(
        &self,
        user: UserId,
        tenant: TenantId,
        path: &str,
        method: &str,
    ) -> AuthzResult<bool> {
        if self.is_super_admin(user, tenant).await? {
            return Ok(true);
        }

        let permissions = self.directory.api_permissions(tenant, path, method).await?;
        if permissions.is_empty() {
            debug!("no permission configured for endpoint, denying");
            return Ok(false);
        }
        for permission in &permissions {
            if self.enforce(user.entity(), permission.id, tenant).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn ensure_permission(
        &self,
        user: UserId,
        tenant: TenantId,
        permission: &str,
    ) -> AuthzResult<()> {
        require(self.check_permission(user, tenant, permission).await?)
    }

    pub async fn ensure_menu_access(
        &self,
        user: UserId,
        tenant: TenantId,
        menu: MenuId,
    ) -> AuthzResult<()> {
        require(self.check_menu_access(user, tenant, menu).await?)
    }

    pub async fn ensure_api_access(
        &self,
        user: UserId,
        tenant: TenantId,
        path: &str,
        method: &str,
    ) -> AuthzResult<()> {
        require(self.check_api_access(user, tenant, path, method).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cache refresh
    // ─────────────────────────────────────────────────────────────────────────

    /// Force the evaluator to reload from durable storage.
    pub async fn reload(&self) -> AuthzResult<()> {
        self.evaluator.reload().await?;
        info!("policy reloaded");
        Ok(())
    }

    /// Reload periodically at the configured interval until the handle is dropped.
    pub fn spawn_auto_reload(&self) -> ReloadHandle {
        refresh::spawn_auto_reload(self.evaluator.clone(), self.config.policy_refresh_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{api_permission, directory, engine, menu, permission, role};

    const ALICE: UserId = UserId::new(7);
    const BOB: UserId = UserId::new(8);
    const EDITOR: RoleId = RoleId::new(2);
    const ADMIN: RoleId = RoleId::new(1);
    const T1: TenantId = TenantId::DEFAULT;

    #[tokio::test]
    async fn grant_then_revoke_role() {
        let dir = directory();
        dir.insert_permission(permission(12, "user:list", Some("view")));
        let engine = engine(dir);

        engine.grant_permission(EDITOR, PermissionId::new(12), T1).await.unwrap();
        assert!(!engine.authorize("alice", "default", "user:list", "read").await.unwrap());

        assert!(engine.grant_role(ALICE, EDITOR, T1).await.unwrap());
        assert!(engine.grant_role(ALICE, EDITOR, T1).await.unwrap());
        assert!(engine.authorize("alice", "default", "user:list", "read").await.unwrap());
        assert!(engine.authorize("u7", "t1", "a12", "").await.unwrap());
        // another tenant sees nothing
        assert!(!engine.authorize("u7", "acme", "a12", "read").await.unwrap());

        assert!(engine.revoke_role(ALICE, EDITOR, T1).await.unwrap());
        assert!(engine.revoke_role(ALICE, EDITOR, T1).await.unwrap());
        assert!(!engine.authorize("alice", "default", "user:list", "read").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_subject_errors_unknown_object_denies() {
        let engine = engine(directory());
        assert!(matches!(
            engine.authorize("mallory", "default", "user:list", "read").await,
            Err(AuthzError::NotFound(_))
        ));
        assert!(!engine.authorize("alice", "default", "no:such", "read").await.unwrap());
    }

    #[tokio::test]
    async fn role_queries() {
        let engine = engine(directory());
        engine.grant_role(ALICE, EDITOR, T1).await.unwrap();
        engine.grant_role(BOB, EDITOR, T1).await.unwrap();
        engine.grant_role(BOB, RoleId::new(3), TenantId::new(2)).await.unwrap();

        assert_eq!(engine.roles_of(ALICE, T1).await.unwrap(), vec![EDITOR]);
        let mut users = engine.users_of(EDITOR, T1).await.unwrap();
        users.sort();
        assert_eq!(users, vec![ALICE, BOB]);
        assert_eq!(engine.users_in_tenant(TenantId::new(2)).await.unwrap(), vec![BOB]);

        engine.delete_all_roles_for_user(BOB, T1).await.unwrap();
        assert!(engine.roles_of(BOB, T1).await.unwrap().is_empty());
        assert_eq!(engine.roles_of(BOB, TenantId::new(2)).await.unwrap(), vec![RoleId::new(3)]);
    }

    #[tokio::test]
    async fn delete_role_removes_policies_and_assignments() {
        let engine = engine(directory());
        let viewer = RoleId::new(4);
        engine.grant_permission(EDITOR, PermissionId::new(12), T1).await.unwrap();
        engine.grant_role(ALICE, EDITOR, T1).await.unwrap();
        engine.add_role_inheritance(EDITOR, viewer, T1).await.unwrap();

        engine.delete_role(EDITOR, T1).await.unwrap();

        assert!(engine.permissions_of(EDITOR, T1).await.unwrap().is_empty());
        assert!(engine.users_of(EDITOR, T1).await.unwrap().is_empty());
        assert!(engine.evaluator().roles_for("r2", "t1").await.unwrap().is_empty());
        assert!(!engine.check_permission(ALICE, T1, "a12").await.unwrap());
    }

    #[tokio::test]
    async fn inherited_roles_grant_their_permissions() {
        let engine = engine(directory());
        let viewer = RoleId::new(4);
        engine.grant_permission(viewer, PermissionId::new(20), T1).await.unwrap();
        engine.grant_permission(EDITOR, PermissionId::new(21), T1).await.unwrap();
        engine.add_role_inheritance(EDITOR, viewer, T1).await.unwrap();
        engine.grant_role(ALICE, EDITOR, T1).await.unwrap();

        assert_eq!(engine.roles_of(ALICE, T1).await.unwrap(), vec![EDITOR]);
        let mut roles = engine.implicit_roles_of(ALICE, T1).await.unwrap();
        roles.sort();
        assert_eq!(roles, vec![EDITOR, viewer]);

        let mut perms = engine.implicit_permissions_of(ALICE, T1).await.unwrap();
        perms.sort();
        assert_eq!(perms, vec![PermissionId::new(20), PermissionId::new(21)]);
        assert!(engine.check_permission(ALICE, T1, "a20").await.unwrap());

        assert!(matches!(
            engine.add_role_inheritance(EDITOR, EDITOR, T1).await,
            Err(AuthzError::InvalidArgument(_))
        ));
        engine.remove_role_inheritance(EDITOR, viewer, T1).await.unwrap();
        assert!(!engine.check_permission(ALICE, T1, "a20").await.unwrap());
    }

    #[tokio::test]
    async fn permissions_only_go_to_users_and_roles() {
        let engine = engine(directory());
        let result = engine
            .grant_permission(TenantId::new(3), PermissionId::new(1), T1)
            .await;
        assert!(matches!(result, Err(AuthzError::InvalidArgument(_))));

        engine.grant_permission(ALICE, PermissionId::new(5), T1).await.unwrap();
        assert_eq!(engine.permissions_of(ALICE, T1).await.unwrap(), vec![PermissionId::new(5)]);
        engine.revoke_permission(ALICE, PermissionId::new(5), T1).await.unwrap();
        assert!(engine.permissions_of(ALICE, T1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn super_admin_bypasses_checks_but_not_authorize() {
        let dir = directory();
        dir.insert_menu(menu(30, None, 0));
        dir.insert_permission(permission(31, "audit:view", Some("view")));
        dir.link(MenuId::new(30), PermissionId::new(31), true);
        let engine = engine(dir);
        engine.grant_role(ALICE, ADMIN, T1).await.unwrap();

        assert!(engine.is_super_admin(ALICE, T1).await.unwrap());
        assert!(engine.check_permission(ALICE, T1, "anything:at:all").await.unwrap());
        assert!(engine.check_menu_access(ALICE, T1, MenuId::new(30)).await.unwrap());
        assert!(engine.check_api_access(ALICE, T1, "/api/none", "GET").await.unwrap());
        assert!(!engine.authorize("alice", "default", "audit:view", "view").await.unwrap());

        // scoped to the tenant holding the role
        assert!(!engine.is_super_admin(ALICE, TenantId::new(2)).await.unwrap());
    }

    #[tokio::test]
    async fn super_admin_by_role_name() {
        let dir = directory();
        dir.insert_role(role(9, T1, "root"));
        let engine = AuthorizationEngine::new(
            gatekeep_infra::InMemoryPolicyStore::arc(),
            dir,
            AuthzConfig::default()
                .with_super_admin_role_ids(Vec::new())
                .with_super_admin_role_names(["root"]),
        );
        engine.grant_role(BOB, RoleId::new(9), T1).await.unwrap();
        engine.grant_role(ALICE, ADMIN, T1).await.unwrap();

        assert!(engine.is_super_admin(BOB, T1).await.unwrap());
        assert!(!engine.is_super_admin(ALICE, T1).await.unwrap());
    }

    #[tokio::test]
    async fn menus_default_allow() {
        let dir = directory();
        dir.insert_menu(menu(1, None, 0));
        dir.insert_menu(menu(2, None, 1));
        dir.insert_permission(permission(10, "user:list", Some("view")));
        dir.insert_permission(permission(11, "user:edit", Some("edit")));
        dir.link(MenuId::new(2), PermissionId::new(10), true);
        dir.link(MenuId::new(2), PermissionId::new(11), false);
        let engine = engine(dir);

        assert!(engine.check_menu_access(BOB, T1, MenuId::new(1)).await.unwrap());
        assert!(!engine.check_menu_access(BOB, T1, MenuId::new(2)).await.unwrap());
        assert!(matches!(
            engine.ensure_menu_access(BOB, T1, MenuId::new(2)).await,
            Err(AuthzError::PermissionDenied)
        ));

        engine.grant_permission(BOB, PermissionId::new(10), T1).await.unwrap();
        assert!(engine.check_menu_access(BOB, T1, MenuId::new(2)).await.unwrap());

        assert!(matches!(
            engine.check_menu_access(BOB, T1, MenuId::new(99)).await,
            Err(AuthzError::NotFound(_))
        ));
        assert!(matches!(
            engine.check_menu_access(BOB, TenantId::new(2), MenuId::new(1)).await,
            Err(AuthzError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn apis_default_deny() {
        let dir = directory();
        dir.insert_permission(api_permission(40, "user:api:list", "/api/users", "GET"));
        dir.insert_permission(api_permission(41, "user:api:all", "/api/users", "get"));
        let engine = engine(dir);

        assert!(!engine.check_api_access(BOB, T1, "/api/unconfigured", "GET").await.unwrap());
        assert!(!engine.check_api_access(BOB, T1, "/api/users", "GET").await.unwrap());

        engine.grant_permission(EDITOR, PermissionId::new(41), T1).await.unwrap();
        engine.grant_role(BOB, EDITOR, T1).await.unwrap();
        assert!(engine.check_api_access(BOB, T1, "/api/users", "GET").await.unwrap());
        engine.ensure_api_access(BOB, T1, "/api/users", "Get").await.unwrap();
        assert!(!engine.check_api_access(BOB, T1, "/api/users", "POST").await.unwrap());
    }

    #[tokio::test]
    async fn permission_codes_resolve_within_the_tenant() {
        let dir = directory();
        let mut foreign = permission(50, "report:view", None);
        foreign.tenant_id = TenantId::new(2);
        dir.insert_permission(foreign);
        let engine = engine(dir);

        engine.grant_permission(BOB, PermissionId::new(50), TenantId::new(2)).await.unwrap();
        assert!(engine.check_permission(BOB, TenantId::new(2), "report:view").await.unwrap());
        assert!(!engine.check_permission(BOB, T1, "report:view").await.unwrap());
        assert!(matches!(
            engine.ensure_permission(BOB, T1, "report:view").await,
            Err(AuthzError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn replica_sees_writes_after_reload() {
        use gatekeep_infra::policy::PolicyTable;

        let table = PolicyTable::arc();
        let writer = AuthorizationEngine::new(
            Arc::new(gatekeep_infra::InMemoryPolicyStore::with_table(table.clone())),
            directory(),
            AuthzConfig::default(),
        );
        let reader = AuthorizationEngine::new(
            Arc::new(gatekeep_infra::InMemoryPolicyStore::with_table(table)),
            directory(),
            AuthzConfig::default(),
        );

        writer.grant_permission(BOB, PermissionId::new(3), T1).await.unwrap();
        assert!(!reader.check_permission(BOB, T1, "a3").await.unwrap());
        reader.reload().await.unwrap();
        assert!(reader.check_permission(BOB, T1, "a3").await.unwrap());
    }
}
