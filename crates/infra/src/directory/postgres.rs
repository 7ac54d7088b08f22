//! Postgres-backed directory.
//!
//! Read-only queries against the relational tables owned by the CRUD layer.
//! Ids are `BIGINT` columns; soft-deleted rows (`deleted_at IS NOT NULL`) and
//! disabled rows (`status = false`) are filtered in SQL.
//!
//! ## Error Mapping
//!
//! | SQLx Error | DirectoryError |
//! |------------|----------------|
//! | any query failure | `Query` |
//! | negative id / unknown resource type in a row | `InvalidRow` |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use gatekeep_core::{MenuId, PermissionId, RoleId, TenantId, UserId};

use super::r#trait::{
    Directory, DirectoryError, LinkedPermission, MenuRecord, PermissionRecord, ResourceType,
    RoleRecord, TenantRecord,
};

const PERMISSION_COLUMNS: &str = "p.id, p.tenant_id, p.permission_code, p.name, p.resource_type, \
     p.action, p.menu_id, p.resource_path, p.http_method";

const MENU_COLUMNS: &str = "id, tenant_id, parent_id, menu_code, title, path, icon, sort_order, \
     visible, status";

#[derive(Debug, Clone)]
pub struct PgDirectory {
    pool: Arc<PgPool>,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect with a fresh pool.
    pub async fn connect(database_url: &str) -> Result<Self, DirectoryError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DirectoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            DirectoryError::Query(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            DirectoryError::Query(format!("connection pool closed in {}", operation))
        }
        other => DirectoryError::Query(format!("{} failed: {}", operation, other)),
    }
}

fn id_from(column: &str, value: i64) -> Result<u64, DirectoryError> {
    u64::try_from(value)
        .map_err(|_| DirectoryError::InvalidRow(format!("negative {column}: {value}")))
}

/// `0` and `NULL` both mean "no parent".
fn optional_id(column: &str, value: Option<i64>) -> Result<Option<u64>, DirectoryError> {
    match value {
        None | Some(0) => Ok(None),
        Some(v) => id_from(column, v).map(Some),
    }
}

struct TenantRow {
    id: i64,
    tenant_code: String,
    name: String,
}

impl<'r> FromRow<'r, PgRow> for TenantRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TenantRow {
            id: row.try_get("id")?,
            tenant_code: row.try_get("tenant_code")?,
            name: row.try_get("name")?,
        })
    }
}

impl TryFrom<TenantRow> for TenantRecord {
    type Error = DirectoryError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        Ok(TenantRecord {
            id: TenantId::new(id_from("tenant id", row.id)?),
            code: row.tenant_code,
            name: row.name,
        })
    }
}

struct RoleRow {
    id: i64,
    tenant_id: i64,
    name: String,
}

impl<'r> FromRow<'r, PgRow> for RoleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RoleRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            name: row.try_get("name")?,
        })
    }
}

impl TryFrom<RoleRow> for RoleRecord {
    type Error = DirectoryError;

    fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
        Ok(RoleRecord {
            id: RoleId::new(id_from("role id", row.id)?),
            tenant_id: TenantId::new(id_from("tenant id", row.tenant_id)?),
            name: row.name,
        })
    }
}

struct PermissionRow {
    id: i64,
    tenant_id: i64,
    permission_code: String,
    name: String,
    resource_type: String,
    action: Option<String>,
    menu_id: Option<i64>,
    resource_path: Option<String>,
    http_method: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for PermissionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PermissionRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            permission_code: row.try_get("permission_code")?,
            name: row.try_get("name")?,
            resource_type: row.try_get("resource_type")?,
            action: row.try_get("action")?,
            menu_id: row.try_get("menu_id")?,
            resource_path: row.try_get("resource_path")?,
            http_method: row.try_get("http_method")?,
        })
    }
}

impl TryFrom<PermissionRow> for PermissionRecord {
    type Error = DirectoryError;

    fn try_from(row: PermissionRow) -> Result<Self, Self::Error> {
        let resource_type = ResourceType::parse(&row.resource_type).ok_or_else(|| {
            DirectoryError::InvalidRow(format!("unknown resource type '{}'", row.resource_type))
        })?;
        Ok(PermissionRecord {
            id: PermissionId::new(id_from("permission id", row.id)?),
            tenant_id: TenantId::new(id_from("tenant id", row.tenant_id)?),
            code: row.permission_code,
            name: row.name,
            resource_type,
            action: row.action,
            menu_id: optional_id("menu id", row.menu_id)?.map(MenuId::new),
            resource_path: row.resource_path,
            http_method: row.http_method,
        })
    }
}

struct MenuRow {
    id: i64,
    tenant_id: i64,
    parent_id: Option<i64>,
    menu_code: String,
    title: String,
    path: Option<String>,
    icon: Option<String>,
    sort_order: i32,
    visible: bool,
    status: bool,
}

impl<'r> FromRow<'r, PgRow> for MenuRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MenuRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            parent_id: row.try_get("parent_id")?,
            menu_code: row.try_get("menu_code")?,
            title: row.try_get("title")?,
            path: row.try_get("path")?,
            icon: row.try_get("icon")?,
            sort_order: row.try_get("sort_order")?,
            visible: row.try_get("visible")?,
            status: row.try_get("status")?,
        })
    }
}

impl TryFrom<MenuRow> for MenuRecord {
    type Error = DirectoryError;

    fn try_from(row: MenuRow) -> Result<Self, Self::Error> {
        Ok(MenuRecord {
            id: MenuId::new(id_from("menu id", row.id)?),
            tenant_id: TenantId::new(id_from("tenant id", row.tenant_id)?),
            parent_id: optional_id("parent id", row.parent_id)?.map(MenuId::new),
            code: row.menu_code,
            title: row.title,
            route_path: row.path,
            icon: row.icon,
            sort_order: row.sort_order,
            visible: row.visible,
            enabled: row.status,
        })
    }
}

fn convert<R, T>(rows: Vec<PgRow>) -> Result<Vec<T>, DirectoryError>
where
    R: for<'r> FromRow<'r, PgRow>,
    T: TryFrom<R, Error = DirectoryError>,
{
    rows.iter()
        .map(|row| {
            R::from_row(row)
                .map_err(|e| DirectoryError::InvalidRow(e.to_string()))
                .and_then(T::try_from)
        })
        .collect()
}

fn convert_one<R, T>(row: Option<PgRow>) -> Result<Option<T>, DirectoryError>
where
    R: for<'r> FromRow<'r, PgRow>,
    T: TryFrom<R, Error = DirectoryError>,
{
    row.map(|row| convert::<R, T>(vec![row]))
        .transpose()
        .map(|v| v.and_then(|mut v| v.pop()))
}

fn linked(row: &PgRow) -> Result<LinkedPermission, DirectoryError> {
    let permission = PermissionRow::from_row(row)
        .map_err(|e| DirectoryError::InvalidRow(e.to_string()))
        .and_then(PermissionRecord::try_from)?;
    let is_required: bool = row
        .try_get("is_required")
        .map_err(|e| DirectoryError::InvalidRow(e.to_string()))?;
    Ok(LinkedPermission {
        permission,
        is_required,
    })
}

fn to_i64(column: &str, value: u64) -> Result<i64, DirectoryError> {
    i64::try_from(value)
        .map_err(|_| DirectoryError::Query(format!("{column} {value} exceeds BIGINT range")))
}

#[async_trait]
impl Directory for PgDirectory {
    #[instrument(skip(self))]
    async fn tenant_by_code(&self, code: &str) -> Result<Option<TenantRecord>, DirectoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_code, name FROM tenants \
             WHERE tenant_code = $1 AND deleted_at IS NULL LIMIT 1",
        )
        .bind(code)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("tenant_by_code", e))?;
        convert_one::<TenantRow, _>(row)
    }

    async fn tenant_by_id(&self, id: TenantId) -> Result<Option<TenantRecord>, DirectoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_code, name FROM tenants WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(to_i64("tenant id", id.get())?)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("tenant_by_id", e))?;
        convert_one::<TenantRow, _>(row)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn role_by_name(
        &self,
        tenant_id: TenantId,
        name: &str,
    ) -> Result<Option<RoleRecord>, DirectoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name FROM roles \
             WHERE name = $1 AND tenant_id = $2 AND deleted_at IS NULL LIMIT 1",
        )
        .bind(name)
        .bind(to_i64("tenant id", tenant_id.get())?)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_by_name", e))?;
        convert_one::<RoleRow, _>(row)
    }

    async fn role_by_id(&self, id: RoleId) -> Result<Option<RoleRecord>, DirectoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name FROM roles WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(to_i64("role id", id.get())?)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_by_id", e))?;
        convert_one::<RoleRow, _>(row)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn permission_by_code(
        &self,
        tenant_id: TenantId,
        code: &str,
    ) -> Result<Option<PermissionRecord>, DirectoryError> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions p \
             WHERE p.permission_code = $1 AND p.tenant_id = $2 AND p.deleted_at IS NULL LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(code)
            .bind(to_i64("tenant id", tenant_id.get())?)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("permission_by_code", e))?;
        convert_one::<PermissionRow, _>(row)
    }

    async fn permission_by_id(
        &self,
        id: PermissionId,
    ) -> Result<Option<PermissionRecord>, DirectoryError> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions p \
             WHERE p.id = $1 AND p.deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(to_i64("permission id", id.get())?)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("permission_by_id", e))?;
        convert_one::<PermissionRow, _>(row)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn api_permissions(
        &self,
        tenant_id: TenantId,
        path: &str,
        method: &str,
    ) -> Result<Vec<PermissionRecord>, DirectoryError> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions p \
             WHERE p.tenant_id = $1 AND p.resource_type = 'api' AND p.resource_path = $2 \
             AND UPPER(p.http_method) = UPPER($3) AND p.status = true AND p.deleted_at IS NULL"
        );
        let rows = sqlx::query(&sql)
            .bind(to_i64("tenant id", tenant_id.get())?)
            .bind(path)
            .bind(method)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("api_permissions", e))?;
        convert::<PermissionRow, _>(rows)
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<UserId>, DirectoryError> {
        let row = sqlx::query("SELECT id FROM users WHERE username = $1 AND deleted_at IS NULL")
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_by_username", e))?;
        row.map(|row| {
            let id: i64 = row
                .try_get("id")
                .map_err(|e| DirectoryError::InvalidRow(e.to_string()))?;
            id_from("user id", id).map(UserId::new)
        })
        .transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn menus(&self, tenant_id: TenantId) -> Result<Vec<MenuRecord>, DirectoryError> {
        let sql = format!(
            "SELECT {MENU_COLUMNS} FROM menus \
             WHERE tenant_id = $1 AND status = true AND deleted_at IS NULL ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(to_i64("tenant id", tenant_id.get())?)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("menus", e))?;
        convert::<MenuRow, _>(rows)
    }

    async fn menu_by_id(&self, id: MenuId) -> Result<Option<MenuRecord>, DirectoryError> {
        let sql = format!("SELECT {MENU_COLUMNS} FROM menus WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query(&sql)
            .bind(to_i64("menu id", id.get())?)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("menu_by_id", e))?;
        convert_one::<MenuRow, _>(row)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn menu_links(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<(MenuId, LinkedPermission)>, DirectoryError> {
        let sql = format!(
            "SELECT mp.menu_id AS link_menu_id, mp.is_required, {PERMISSION_COLUMNS} \
             FROM menu_permissions mp JOIN permissions p ON p.id = mp.permission_id \
             WHERE mp.tenant_id = $1 AND p.deleted_at IS NULL ORDER BY mp.id"
        );
        let rows = sqlx::query(&sql)
            .bind(to_i64("tenant id", tenant_id.get())?)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("menu_links", e))?;

        rows.iter()
            .map(|row| {
                let menu_id: i64 = row
                    .try_get("link_menu_id")
                    .map_err(|e| DirectoryError::InvalidRow(e.to_string()))?;
                Ok((MenuId::new(id_from("menu id", menu_id)?), linked(row)?))
            })
            .collect()
    }

    async fn menu_permissions(
        &self,
        menu_id: MenuId,
    ) -> Result<Vec<LinkedPermission>, DirectoryError> {
        let sql = format!(
            "SELECT mp.is_required, {PERMISSION_COLUMNS} \
             FROM menu_permissions mp JOIN permissions p ON p.id = mp.permission_id \
             WHERE mp.menu_id = $1 AND p.deleted_at IS NULL ORDER BY mp.id"
        );
        let rows = sqlx::query(&sql)
            .bind(to_i64("menu id", menu_id.get())?)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("menu_permissions", e))?;
        rows.iter().map(linked).collect()
    }
}
