//! Menu visibility for users.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

use gatekeep_core::{MenuId, TenantId, UserId};
use gatekeep_infra::directory::MenuRecord;

use super::matrix::{MenuPermissionEntry, MenuPermissionMatrix};
use super::tree::{MenuItem, MenuNode, build_menu_tree};
use crate::engine::AuthorizationEngine;
use crate::error::{AuthzError, AuthzResult};

/// Upper bound on ancestor walks; deeper hierarchies are rejected.
pub const MAX_MENU_DEPTH: usize = 32;

/// A menu the user may see, with what they may do on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessibleMenu {
    pub menu: MenuRecord,
    /// Granted permission codes linked to the menu.
    pub permissions: Vec<String>,
    pub actions: Vec<String>,
}

impl MenuItem for AccessibleMenu {
    fn menu_id(&self) -> MenuId {
        self.menu.id
    }

    fn parent_id(&self) -> Option<MenuId> {
        self.menu.parent_id
    }

    fn sort_order(&self) -> i32 {
        self.menu.sort_order
    }
}

/// Outcome of [`MenuService::validate_menu_access`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuAccessReport {
    pub menu_id: MenuId,
    pub has_access: bool,
    /// Required permission codes the user lacks.
    pub missing_permissions: Vec<String>,
    pub available_actions: Vec<String>,
}

/// What a user holds in one tenant, as seen by the menu matrix.
struct Grants {
    super_admin: bool,
    codes: HashSet<String>,
}

impl Grants {
    fn accessible(&self, entry: &MenuPermissionEntry) -> Option<AccessibleMenu> {
        if self.super_admin {
            return Some(AccessibleMenu {
                menu: entry.menu.clone(),
                permissions: entry.all.iter().map(|p| p.code.clone()).collect(),
                actions: entry.all_actions(),
            });
        }
        if !entry.has_required_permissions(&self.codes) {
            return None;
        }
        Some(AccessibleMenu {
            menu: entry.menu.clone(),
            permissions: entry.granted_permissions(&self.codes),
            actions: entry.available_actions(&self.codes),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MenuService {
    engine: Arc<AuthorizationEngine>,
}

impl MenuService {
    pub fn new(engine: Arc<AuthorizationEngine>) -> Self {
        Self { engine }
    }

    /// Build the tenant's menu-permission matrix from the directory.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn menu_permission_matrix(&self, tenant: TenantId) -> AuthzResult<MenuPermissionMatrix> {
        let directory = self.engine.directory();
        let menus = directory.menus(tenant).await?;
        let links = directory.menu_links(tenant).await?;
        let matrix = MenuPermissionMatrix::build(tenant, menus, links);
        debug!(menus = matrix.entries.len(), "menu permission matrix built");
        Ok(matrix)
    }

    async fn grants(
        &self,
        user: UserId,
        tenant: TenantId,
        matrix: &MenuPermissionMatrix,
    ) -> AuthzResult<Grants> {
        if self.engine.is_super_admin(user, tenant).await? {
            return Ok(Grants {
                super_admin: true,
                codes: HashSet::new(),
            });
        }
        let codes_by_id = matrix.permission_codes();
        let codes = self
            .engine
            .implicit_permissions_of(user, tenant)
            .await?
            .into_iter()
            .filter_map(|id| codes_by_id.get(&id).cloned())
            .collect();
        Ok(Grants {
            super_admin: false,
            codes,
        })
    }

    /// Menus whose required permissions the user holds (all menus for super
    /// admins), in storage order.
    #[instrument(skip(self), fields(user = %user, tenant = %tenant))]
    pub async fn accessible_menus(
        &self,
        user: UserId,
        tenant: TenantId,
    ) -> AuthzResult<Vec<AccessibleMenu>> {
        let matrix = self.menu_permission_matrix(tenant).await?;
        let grants = self.grants(user, tenant, &matrix).await?;
        let menus: Vec<AccessibleMenu> = matrix
            .entries
            .iter()
            .filter_map(|entry| grants.accessible(entry))
            .collect();
        debug!(
            visible = menus.len(),
            total = matrix.entries.len(),
            "accessible menus computed"
        );
        Ok(menus)
    }

    /// Navigation tree of visible (non-hidden) accessible menus.
    pub async fn user_menu_tree(
        &self,
        user: UserId,
        tenant: TenantId,
    ) -> AuthzResult<Vec<MenuNode<AccessibleMenu>>> {
        let menus = self
            .accessible_menus(user, tenant)
            .await?
            .into_iter()
            .filter(|m| m.menu.visible)
            .collect();
        Ok(build_menu_tree(menus))
    }

    /// Explain access to one menu.
    pub async fn validate_menu_access(
        &self,
        user: UserId,
        tenant: TenantId,
        menu: MenuId,
    ) -> AuthzResult<MenuAccessReport> {
        let matrix = self.menu_permission_matrix(tenant).await?;
        let entry = matrix
            .entry(menu)
            .ok_or_else(|| AuthzError::not_found(format!("menu {menu}")))?;
        let grants = self.grants(user, tenant, &matrix).await?;

        let report = match grants.accessible(entry) {
            Some(accessible) => MenuAccessReport {
                menu_id: menu,
                has_access: true,
                missing_permissions: Vec::new(),
                available_actions: accessible.actions,
            },
            None => MenuAccessReport {
                menu_id: menu,
                has_access: false,
                missing_permissions: entry.missing_permissions(&grants.codes),
                available_actions: Vec::new(),
            },
        };
        Ok(report)
    }

    /// Write-time loop prevention for moving `menu` under `new_parent`.
    ///
    /// Walks the ancestors of `new_parent` with a visited set and a depth
    /// bound, so a corrupted (already cyclic) hierarchy cannot hang the walk.
    #[instrument(skip(self), fields(tenant = %tenant, menu = %menu))]
    pub async fn validate_reparent(
        &self,
        tenant: TenantId,
        menu: MenuId,
        new_parent: Option<MenuId>,
    ) -> AuthzResult<()> {
        let Some(parent) = new_parent else {
            return Ok(());
        };
        if parent == menu {
            return Err(AuthzError::conflict(
                "menu hierarchy contains a circular reference",
            ));
        }

        let directory = self.engine.directory();
        let mut visited: HashSet<MenuId> = HashSet::new();
        let mut current = Some(parent);
        let mut depth = 0;

        while let Some(id) = current {
            if id == menu || !visited.insert(id) {
                return Err(AuthzError::conflict(
                    "menu hierarchy contains a circular reference",
                ));
            }
            depth += 1;
            if depth > MAX_MENU_DEPTH {
                return Err(AuthzError::conflict(format!(
                    "menu hierarchy deeper than {MAX_MENU_DEPTH} levels"
                )));
            }

            let record = directory.menu_by_id(id).await?;
            current = match record {
                Some(record) if record.tenant_id == tenant => record.parent_id,
                Some(_) => {
                    return Err(AuthzError::InvalidArgument(format!(
                        "menu {id} belongs to another tenant"
                    )));
                }
                None if id == parent => {
                    return Err(AuthzError::not_found(format!("parent menu {id}")));
                }
                None => None,
            };
        }
        Ok(())
    }
}
