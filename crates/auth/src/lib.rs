//! `gatekeep-auth`: tenant-scoped RBAC on top of a policy evaluator.
//!
//! - [`AuthorizationEngine`]: role/permission assignment and checks
//! - [`TenantResolver`]: human-facing identifiers to typed ids
//! - [`menu`]: menu-permission matrix and per-user menu trees
//!
//! Storage lives behind the `gatekeep-infra` traits; nothing here talks to a
//! database directly.

pub mod config;
pub mod engine;
pub mod error;
pub mod menu;
pub mod refresh;
pub mod resolver;

pub use config::AuthzConfig;
pub use engine::{AuthorizationEngine, require};
pub use error::{AuthzError, AuthzResult};
pub use menu::{AccessibleMenu, MenuAccessReport, MenuNode, MenuPermissionMatrix, MenuService};
pub use refresh::{ReloadHandle, spawn_auto_reload};
pub use resolver::TenantResolver;

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use gatekeep_core::{MenuId, PermissionId, RoleId, TenantId};
    use gatekeep_infra::directory::{
        MenuRecord, PermissionRecord, ResourceType, RoleRecord, TenantRecord,
    };
    use gatekeep_infra::{InMemoryDirectory, InMemoryPolicyStore};

    use crate::{AuthorizationEngine, AuthzConfig};

    pub fn menu(id: u64, parent: Option<u64>, sort: i32) -> MenuRecord {
        MenuRecord {
            id: MenuId::new(id),
            tenant_id: TenantId::DEFAULT,
            parent_id: parent.map(MenuId::new),
            code: format!("m{id}"),
            title: format!("Menu {id}"),
            route_path: None,
            icon: None,
            sort_order: sort,
            visible: true,
            enabled: true,
        }
    }

    pub fn permission(id: u64, code: &str, action: Option<&str>) -> PermissionRecord {
        PermissionRecord {
            id: PermissionId::new(id),
            tenant_id: TenantId::DEFAULT,
            code: code.to_string(),
            name: code.to_string(),
            resource_type: ResourceType::Menu,
            action: action.map(str::to_string),
            menu_id: None,
            resource_path: None,
            http_method: None,
        }
    }

    pub fn api_permission(id: u64, code: &str, path: &str, method: &str) -> PermissionRecord {
        PermissionRecord {
            resource_type: ResourceType::Api,
            resource_path: Some(path.to_string()),
            http_method: Some(method.to_string()),
            ..permission(id, code, None)
        }
    }

    pub fn role(id: u64, tenant: TenantId, name: &str) -> RoleRecord {
        RoleRecord {
            id: RoleId::new(id),
            tenant_id: tenant,
            name: name.to_string(),
        }
    }

    /// Directory with the default tenant, tenant 2 (`acme`), role 1
    /// `super_admin`, role 2 `editor` and user `alice` (id 7).
    pub fn directory() -> Arc<InMemoryDirectory> {
        let directory = InMemoryDirectory::arc();
        directory.insert_tenant(TenantRecord {
            id: TenantId::DEFAULT,
            code: "default".to_string(),
            name: "Default".to_string(),
        });
        directory.insert_tenant(TenantRecord {
            id: TenantId::new(2),
            code: "acme".to_string(),
            name: "Acme".to_string(),
        });
        directory.insert_role(role(1, TenantId::DEFAULT, "super_admin"));
        directory.insert_role(role(2, TenantId::DEFAULT, "editor"));
        directory.insert_user("alice", gatekeep_core::UserId::new(7));
        directory
    }

    pub fn engine(directory: Arc<InMemoryDirectory>) -> Arc<AuthorizationEngine> {
        Arc::new(AuthorizationEngine::new(
            InMemoryPolicyStore::arc(),
            directory,
            AuthzConfig::default(),
        ))
    }
}
