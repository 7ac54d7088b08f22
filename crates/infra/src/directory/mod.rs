//! Relational lookups (tenants, roles, permissions, menus, menu-permission links).
//!
//! The CRUD layer owns these tables; this boundary only reads them for
//! name/id resolution and menu-permission matrix construction.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryDirectory;
#[cfg(feature = "postgres")]
pub use postgres::PgDirectory;
pub use r#trait::{
    Directory, DirectoryError, LinkedPermission, MenuPermissionLink, MenuRecord, PermissionRecord,
    ResourceType, RoleRecord, TenantRecord,
};
