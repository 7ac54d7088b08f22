//! In-memory directory for tests/dev.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use gatekeep_core::{MenuId, PermissionId, RoleId, TenantId, UserId};

use super::r#trait::{
    Directory, DirectoryError, LinkedPermission, MenuPermissionLink, MenuRecord, PermissionRecord,
    RoleRecord, TenantRecord,
};

#[derive(Debug, Default)]
struct Tables {
    tenants: BTreeMap<TenantId, TenantRecord>,
    roles: BTreeMap<RoleId, RoleRecord>,
    permissions: BTreeMap<PermissionId, PermissionRecord>,
    menus: Vec<MenuRecord>,
    links: Vec<MenuPermissionLink>,
    users: HashMap<String, UserId>,
}

impl Tables {
    fn join(&self, link: &MenuPermissionLink) -> Option<LinkedPermission> {
        self.permissions
            .get(&link.permission_id)
            .map(|permission| LinkedPermission {
                permission: permission.clone(),
                is_required: link.is_required,
            })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    tables: RwLock<Tables>,
}

fn poisoned<T>(_: T) -> DirectoryError {
    DirectoryError::Query("directory lock poisoned".to_string())
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_tenant(&self, tenant: TenantRecord) {
        self.write().tenants.insert(tenant.id, tenant);
    }

    pub fn insert_role(&self, role: RoleRecord) {
        self.write().roles.insert(role.id, role);
    }

    pub fn insert_permission(&self, permission: PermissionRecord) {
        self.write().permissions.insert(permission.id, permission);
    }

    /// Soft-delete a permission: it disappears from lookups and link joins.
    pub fn delete_permission(&self, id: PermissionId) {
        self.write().permissions.remove(&id);
    }

    /// Insert or replace a menu, keeping storage order stable.
    pub fn insert_menu(&self, menu: MenuRecord) {
        let mut tables = self.write();
        match tables.menus.iter_mut().find(|m| m.id == menu.id) {
            Some(existing) => *existing = menu,
            None => tables.menus.push(menu),
        }
    }

    /// Link a permission to a menu in the menu's tenant (the default tenant
    /// when the menu has not been inserted).
    pub fn link(&self, menu_id: MenuId, permission_id: PermissionId, is_required: bool) {
        let tenant_id = self
            .read()
            .menus
            .iter()
            .find(|m| m.id == menu_id)
            .map_or(TenantId::DEFAULT, |m| m.tenant_id);
        self.link_in(tenant_id, menu_id, permission_id, is_required);
    }

    pub fn link_in(
        &self,
        tenant_id: TenantId,
        menu_id: MenuId,
        permission_id: PermissionId,
        is_required: bool,
    ) {
        let mut tables = self.write();
        tables
            .links
            .retain(|l| !(l.menu_id == menu_id && l.permission_id == permission_id));
        tables.links.push(MenuPermissionLink {
            tenant_id,
            menu_id,
            permission_id,
            is_required,
        });
    }

    pub fn insert_user(&self, username: impl Into<String>, id: UserId) {
        self.write().users.insert(username.into(), id);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn tenant_by_code(&self, code: &str) -> Result<Option<TenantRecord>, DirectoryError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.tenants.values().find(|t| t.code == code).cloned())
    }

    async fn tenant_by_id(&self, id: TenantId) -> Result<Option<TenantRecord>, DirectoryError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.tenants.get(&id).cloned())
    }

    async fn role_by_name(
        &self,
        tenant_id: TenantId,
        name: &str,
    ) -> Result<Option<RoleRecord>, DirectoryError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .roles
            .values()
            .find(|r| r.tenant_id == tenant_id && r.name == name)
            .cloned())
    }

    async fn role_by_id(&self, id: RoleId) -> Result<Option<RoleRecord>, DirectoryError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.roles.get(&id).cloned())
    }

    async fn permission_by_code(
        &self,
        tenant_id: TenantId,
        code: &str,
    ) -> Result<Option<PermissionRecord>, DirectoryError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .permissions
            .values()
            .find(|p| p.tenant_id == tenant_id && p.code == code)
            .cloned())
    }

    async fn permission_by_id(
        &self,
        id: PermissionId,
    ) -> Result<Option<PermissionRecord>, DirectoryError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.permissions.get(&id).cloned())
    }

    async fn api_permissions(
        &self,
        tenant_id: TenantId,
        path: &str,
        method: &str,
    ) -> Result<Vec<PermissionRecord>, DirectoryError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .permissions
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.guards_api(path, method))
            .cloned()
            .collect())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<UserId>, DirectoryError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.users.get(username).copied())
    }

    async fn menus(&self, tenant_id: TenantId) -> Result<Vec<MenuRecord>, DirectoryError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .menus
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.enabled)
            .cloned()
            .collect())
    }

    async fn menu_by_id(&self, id: MenuId) -> Result<Option<MenuRecord>, DirectoryError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.menus.iter().find(|m| m.id == id).cloned())
    }

    async fn menu_links(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<(MenuId, LinkedPermission)>, DirectoryError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .links
            .iter()
            .filter(|link| link.tenant_id == tenant_id)
            .filter_map(|link| tables.join(link).map(|joined| (link.menu_id, joined)))
            .collect())
    }

    async fn menu_permissions(
        &self,
        menu_id: MenuId,
    ) -> Result<Vec<LinkedPermission>, DirectoryError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .links
            .iter()
            .filter(|l| l.menu_id == menu_id)
            .filter_map(|l| tables.join(l))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ResourceType;

    const ACME: TenantId = TenantId::new(2);

    fn menu(id: u64, tenant: TenantId) -> MenuRecord {
        MenuRecord {
            id: MenuId::new(id),
            tenant_id: tenant,
            parent_id: None,
            code: format!("m{id}"),
            title: format!("Menu {id}"),
            route_path: None,
            icon: None,
            sort_order: 0,
            visible: true,
            enabled: true,
        }
    }

    fn permission(id: u64, tenant: TenantId) -> PermissionRecord {
        PermissionRecord {
            id: PermissionId::new(id),
            tenant_id: tenant,
            code: format!("p{id}"),
            name: format!("p{id}"),
            resource_type: ResourceType::Menu,
            action: None,
            menu_id: None,
            resource_path: None,
            http_method: None,
        }
    }

    fn linked_menus(links: Vec<(MenuId, LinkedPermission)>) -> Vec<(u64, u64)> {
        links
            .into_iter()
            .map(|(menu, l)| (menu.get(), l.permission.id.get()))
            .collect()
    }

    #[tokio::test]
    async fn menu_links_are_scoped_on_the_link_tenant() {
        let dir = InMemoryDirectory::new();
        dir.insert_menu(menu(1, TenantId::DEFAULT));
        dir.insert_menu(menu(2, ACME));
        // a shared permission row linked from both tenants
        dir.insert_permission(permission(10, TenantId::DEFAULT));
        dir.link(MenuId::new(1), PermissionId::new(10), true);
        dir.link(MenuId::new(2), PermissionId::new(10), true);

        let default_links = dir.menu_links(TenantId::DEFAULT).await.unwrap();
        assert_eq!(linked_menus(default_links), vec![(1, 10)]);
        let acme_links = dir.menu_links(ACME).await.unwrap();
        assert_eq!(linked_menus(acme_links), vec![(2, 10)]);
    }

    #[tokio::test]
    async fn explicit_link_tenant_and_deleted_permissions() {
        let dir = InMemoryDirectory::new();
        dir.insert_permission(permission(10, ACME));
        dir.insert_permission(permission(11, ACME));
        dir.link_in(ACME, MenuId::new(5), PermissionId::new(10), false);
        dir.link_in(ACME, MenuId::new(5), PermissionId::new(11), true);
        dir.delete_permission(PermissionId::new(11));

        let links = dir.menu_links(ACME).await.unwrap();
        assert_eq!(linked_menus(links), vec![(5, 10)]);
        assert!(dir.menu_links(TenantId::DEFAULT).await.unwrap().is_empty());
    }
}
