use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatekeep_core::{DomainError, MenuId, PermissionId, RoleId, TenantId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: TenantId,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: RoleId,
    pub tenant_id: TenantId,
    pub name: String,
}

/// What a permission guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Menu,
    Api,
    Button,
    Data,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Menu => "menu",
            ResourceType::Api => "api",
            ResourceType::Button => "button",
            ResourceType::Data => "data",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "menu" => Some(ResourceType::Menu),
            "api" => Some(ResourceType::Api),
            "button" => Some(ResourceType::Button),
            "data" => Some(ResourceType::Data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub id: PermissionId,
    pub tenant_id: TenantId,
    /// Unique code inside the tenant, e.g. `system:user:list`.
    pub code: String,
    pub name: String,
    pub resource_type: ResourceType,
    /// Action this permission unlocks on its menu (`view`, `edit`, ...).
    pub action: Option<String>,
    pub menu_id: Option<MenuId>,
    /// For API permissions: request path and HTTP method.
    pub resource_path: Option<String>,
    pub http_method: Option<String>,
}

impl PermissionRecord {
    /// Whether this permission guards `method path`. Methods compare
    /// case-insensitively.
    pub fn guards_api(&self, path: &str, method: &str) -> bool {
        self.resource_type == ResourceType::Api
            && self.resource_path.as_deref() == Some(path)
            && self
                .http_method
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case(method))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuRecord {
    pub id: MenuId,
    pub tenant_id: TenantId,
    /// `None` for a root menu (stored as `0`/`NULL`).
    pub parent_id: Option<MenuId>,
    pub code: String,
    pub title: String,
    pub route_path: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i32,
    pub visible: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MenuPermissionLink {
    /// Tenant owning the link row; menu matrices are scoped on it.
    pub tenant_id: TenantId,
    pub menu_id: MenuId,
    pub permission_id: PermissionId,
    /// Required links gate visibility; optional links only gate actions.
    pub is_required: bool,
}

/// A link joined with its (non-deleted) permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedPermission {
    pub permission: PermissionRecord,
    pub is_required: bool,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory query failed: {0}")]
    Query(String),

    #[error("invalid directory row: {0}")]
    InvalidRow(String),
}

impl From<DirectoryError> for DomainError {
    fn from(value: DirectoryError) -> Self {
        DomainError::internal(value.to_string())
    }
}

/// Read access to the tenant, role, permission, menu and link tables.
///
/// Soft-deleted rows are never returned.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn tenant_by_code(&self, code: &str) -> Result<Option<TenantRecord>, DirectoryError>;

    async fn tenant_by_id(&self, id: TenantId) -> Result<Option<TenantRecord>, DirectoryError>;

    async fn role_by_name(
        &self,
        tenant_id: TenantId,
        name: &str,
    ) -> Result<Option<RoleRecord>, DirectoryError>;

    async fn role_by_id(&self, id: RoleId) -> Result<Option<RoleRecord>, DirectoryError>;

    async fn permission_by_code(
        &self,
        tenant_id: TenantId,
        code: &str,
    ) -> Result<Option<PermissionRecord>, DirectoryError>;

    async fn permission_by_id(
        &self,
        id: PermissionId,
    ) -> Result<Option<PermissionRecord>, DirectoryError>;

    /// API permissions guarding `method path` in the tenant.
    async fn api_permissions(
        &self,
        tenant_id: TenantId,
        path: &str,
        method: &str,
    ) -> Result<Vec<PermissionRecord>, DirectoryError>;

    async fn user_by_username(&self, username: &str) -> Result<Option<UserId>, DirectoryError>;

    /// Enabled menus of the tenant in storage order.
    async fn menus(&self, tenant_id: TenantId) -> Result<Vec<MenuRecord>, DirectoryError>;

    async fn menu_by_id(&self, id: MenuId) -> Result<Option<MenuRecord>, DirectoryError>;

    /// Every menu-permission link of the tenant, joined with its permission.
    async fn menu_links(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<(MenuId, LinkedPermission)>, DirectoryError>;

    /// Links of one menu, joined with their permissions.
    async fn menu_permissions(
        &self,
        menu_id: MenuId,
    ) -> Result<Vec<LinkedPermission>, DirectoryError>;
}
