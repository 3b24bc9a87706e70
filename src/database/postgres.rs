use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::manager::{classify, DatabaseError, DatabaseManager};
use super::models::unit::{DEFAULT_UNIT_COLOR, DEFAULT_UNIT_ICON};
use super::models::{
    AccessRequestFilter, AccessRequestStatus, ActivityFilter, AdminActivity, LeaderSlot, NewAccessRequest,
    NewAdminActivity, NewPermissionAudit, NewRoleChange, NewUnit, NewUser, PermissionAudit, PermissionAuditFilter,
    Role, RoleChange, RolePermission, RolePermissionKey, RolePermissionUpsert, ToolAccessRequest, Unit, UnitPatch,
    User, UserFilter,
};
use super::store::{
    AccessRequestResolution, AccessRequestStore, AuditStore, LeaderAssignment, PermissionStore, PermissionWrite,
    RoleAssignment, Store, UnitDeactivation, UnitStore, UnitUpdate, UserStore,
};

const USER_COLUMNS: &str = "id, email, first_name, last_name, role, unit, status, is_approved, is_active, \
    last_active_at, approved_at, approved_by, sessions_revoked_at, password_hash, mfa_secret, mfa_backup_codes, \
    created_at, updated_at, deleted_at";

const UNIT_COLUMNS: &str = "id, name, code, description, color, icon, leader_id, co_leader_id, is_active, \
    member_count, created_at, updated_at";

const PERMISSION_COLUMNS: &str = "role, resource, action, allowed, description, created_at, updated_at";

const REQUEST_COLUMNS: &str = "id, user_id, tool_path, justification, status, reviewed_by, review_notes, \
    reviewed_at, created_at, updated_at";

/// Members are active, non-deleted users whose free-text unit matches.
const MEMBER_COUNT_SQL: &str =
    "SELECT COUNT(*) FROM users WHERE unit = $1 AND is_active = TRUE AND deleted_at IS NULL";

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    role: Option<String>,
    unit: Option<String>,
    status: String,
    is_approved: bool,
    is_active: bool,
    last_active_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    approved_by: Option<Uuid>,
    sessions_revoked_at: Option<DateTime<Utc>>,
    password_hash: Option<String>,
    mfa_secret: Option<String>,
    mfa_backup_codes: Option<Vec<String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = DatabaseError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            role: parse_role(row.role)?,
            unit: row.unit,
            status: row.status.parse()?,
            is_approved: row.is_approved,
            is_active: row.is_active,
            last_active_at: row.last_active_at,
            approved_at: row.approved_at,
            approved_by: row.approved_by,
            sessions_revoked_at: row.sessions_revoked_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            password_hash: row.password_hash,
            mfa_secret: row.mfa_secret,
            mfa_backup_codes: row.mfa_backup_codes,
        })
    }
}

#[derive(FromRow)]
struct PermissionRow {
    role: String,
    resource: String,
    action: String,
    allowed: bool,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PermissionRow> for RolePermission {
    type Error = DatabaseError;

    fn try_from(row: PermissionRow) -> Result<Self, Self::Error> {
        Ok(RolePermission {
            role: row.role.parse()?,
            resource: row.resource,
            action: row.action,
            allowed: row.allowed,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct UnitRow {
    id: Uuid,
    name: String,
    code: Option<String>,
    description: Option<String>,
    color: String,
    icon: String,
    leader_id: Option<Uuid>,
    co_leader_id: Option<Uuid>,
    is_active: bool,
    member_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UnitRow> for Unit {
    fn from(row: UnitRow) -> Self {
        Unit {
            id: row.id,
            name: row.name,
            code: row.code,
            description: row.description,
            color: row.color,
            icon: row.icon,
            leader_id: row.leader_id,
            co_leader_id: row.co_leader_id,
            is_active: row.is_active,
            member_count: row.member_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct RoleChangeRow {
    id: Uuid,
    user_id: Uuid,
    changed_by: Option<Uuid>,
    old_role: Option<String>,
    new_role: Option<String>,
    old_unit: Option<String>,
    new_unit: Option<String>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RoleChangeRow> for RoleChange {
    type Error = DatabaseError;

    fn try_from(row: RoleChangeRow) -> Result<Self, Self::Error> {
        Ok(RoleChange {
            id: row.id,
            user_id: row.user_id,
            changed_by: row.changed_by,
            old_role: parse_role(row.old_role)?,
            new_role: parse_role(row.new_role)?,
            old_unit: row.old_unit,
            new_unit: row.new_unit,
            reason: row.reason,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ActivityRow {
    id: Uuid,
    admin_id: Uuid,
    action: String,
    target_type: Option<String>,
    target_id: Option<String>,
    old_value: Option<Value>,
    new_value: Option<Value>,
    reason: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ActivityRow> for AdminActivity {
    fn from(row: ActivityRow) -> Self {
        AdminActivity {
            id: row.id,
            admin_id: row.admin_id,
            action: row.action,
            target_type: row.target_type,
            target_id: row.target_id,
            old_value: row.old_value,
            new_value: row.new_value,
            reason: row.reason,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct PermissionAuditRow {
    id: Uuid,
    changed_by: Uuid,
    role: String,
    resource: String,
    action: String,
    change_type: String,
    old_value: Option<Value>,
    new_value: Option<Value>,
    reason: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PermissionAuditRow> for PermissionAudit {
    type Error = DatabaseError;

    fn try_from(row: PermissionAuditRow) -> Result<Self, Self::Error> {
        Ok(PermissionAudit {
            id: row.id,
            changed_by: row.changed_by,
            role: row.role.parse()?,
            resource: row.resource,
            action: row.action,
            change_type: row.change_type.parse()?,
            old_value: row.old_value,
            new_value: row.new_value,
            reason: row.reason,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct AccessRequestRow {
    id: Uuid,
    user_id: Uuid,
    tool_path: String,
    justification: Option<String>,
    status: String,
    reviewed_by: Option<Uuid>,
    review_notes: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccessRequestRow> for ToolAccessRequest {
    type Error = DatabaseError;

    fn try_from(row: AccessRequestRow) -> Result<Self, Self::Error> {
        Ok(ToolAccessRequest {
            id: row.id,
            user_id: row.user_id,
            tool_path: row.tool_path,
            justification: row.justification,
            status: row.status.parse()?,
            reviewed_by: row.reviewed_by,
            review_notes: row.review_notes,
            reviewed_at: row.reviewed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_role(raw: Option<String>) -> Result<Option<Role>, DatabaseError> {
    Ok(raw.as_deref().map(str::parse::<Role>).transpose()?)
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, DatabaseError>
where
    T: TryFrom<R, Error = DatabaseError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Unit names touched by a membership change, deduplicated
fn affected_units(previous: Option<&str>, next: Option<&str>) -> Vec<String> {
    let mut names: Vec<String> = previous.into_iter().chain(next).map(str::to_string).collect();
    names.dedup();
    names
}

async fn lock_units(conn: &mut PgConnection, names: &[String]) -> Result<(), DatabaseError> {
    if names.is_empty() {
        return Ok(());
    }
    sqlx::query("SELECT id FROM units WHERE name = ANY($1) ORDER BY name FOR UPDATE")
        .bind(names.to_vec())
        .fetch_all(&mut *conn)
        .await?;
    Ok(())
}

async fn recount_units(conn: &mut PgConnection, names: &[String], at: DateTime<Utc>) -> Result<(), DatabaseError> {
    if names.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        UPDATE units
        SET member_count = (
                SELECT COUNT(*) FROM users u
                WHERE u.unit = units.name AND u.is_active = TRUE AND u.deleted_at IS NULL
            ),
            updated_at = $2
        WHERE name = ANY($1)
        "#,
    )
    .bind(names.to_vec())
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Postgres-backed store used in every deployed environment
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn from_manager(manager: &DatabaseManager) -> Self {
        Self::new(manager.pool().clone())
    }

    async fn update_user_returning(&self, sql: &str, id: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError> {
        sqlx::query_as::<_, UserRow>(sql)
            .bind(id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser, at: DateTime<Utc>) -> Result<User, DatabaseError> {
        let sql = format!(
            "INSERT INTO users (id, email, first_name, last_name, unit, password_hash, status, is_approved, \
             is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 'pending', FALSE, TRUE, $7, $7) RETURNING {}",
            USER_COLUMNS
        );
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(user.email.trim().to_lowercase())
            .bind(user.first_name)
            .bind(user.last_name)
            .bind(user.unit.clone())
            .bind(user.password_hash)
            .bind(at)
            .fetch_one(&mut *tx)
            .await
            .map_err(classify)?;
        recount_units(&mut tx, &affected_units(None, user.unit.as_deref()), at).await?;
        tx.commit().await?;
        User::try_from(row)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, DatabaseError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM users WHERE TRUE", USER_COLUMNS));
        if !filter.include_deleted.unwrap_or(false) {
            qb.push(" AND deleted_at IS NULL");
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(unit) = &filter.unit {
            qb.push(" AND unit = ").push_bind(unit.clone());
        }
        if let Some(role) = filter.role {
            qb.push(" AND role = ").push_bind(role.as_str());
        }
        qb.push(" ORDER BY created_at ASC");

        let rows = qb.build_query_as::<UserRow>().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn set_user_role(
        &self,
        id: Uuid,
        role: Option<Role>,
        unit: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<RoleAssignment>, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let select = format!("SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL FOR UPDATE", USER_COLUMNS);
        let Some(current) = sqlx::query_as::<_, UserRow>(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let previous = User::try_from(current)?;

        let names = affected_units(previous.unit.as_deref(), unit.as_deref());
        lock_units(&mut tx, &names).await?;

        let update = format!(
            "UPDATE users SET role = $2, unit = $3, updated_at = $4 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&update)
            .bind(id)
            .bind(role.map(|r| r.as_str()))
            .bind(unit)
            .bind(at)
            .fetch_one(&mut *tx)
            .await?;

        recount_units(&mut tx, &names, at).await?;
        tx.commit().await?;

        Ok(Some(RoleAssignment {
            user: User::try_from(row)?,
            previous_role: previous.role,
            previous_unit: previous.unit,
        }))
    }

    async fn approve_user(&self, id: Uuid, approved_by: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError> {
        let sql = format!(
            "UPDATE users SET status = 'active', is_approved = TRUE, approved_by = $2, approved_at = $3, \
             last_active_at = $3, updated_at = $3 WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(approved_by)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn mark_user_pending(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError> {
        let sql = format!(
            "UPDATE users SET status = 'pending', updated_at = $2 WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            USER_COLUMNS
        );
        self.update_user_returning(&sql, id, at).await
    }

    async fn soft_delete_user(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError> {
        let sql = format!(
            "UPDATE users SET deleted_at = $2, status = 'suspended', is_active = FALSE, updated_at = $2 \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            USER_COLUMNS
        );
        let mut tx = self.pool.begin().await?;
        let Some(row) = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(at)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let user = User::try_from(row)?;
        recount_units(&mut tx, &affected_units(user.unit.as_deref(), None), at).await?;
        tx.commit().await?;
        Ok(Some(user))
    }

    async fn revoke_user_sessions(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError> {
        let sql = format!(
            "UPDATE users SET sessions_revoked_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            USER_COLUMNS
        );
        self.update_user_returning(&sql, id, at).await
    }

    async fn record_user_activity(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError> {
        let sql = format!(
            "UPDATE users SET last_active_at = $2 WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            USER_COLUMNS
        );
        self.update_user_returning(&sql, id, at).await
    }

    async fn find_inactive_approved_users(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM users
            WHERE is_approved = TRUE
              AND is_active = TRUE
              AND deleted_at IS NULL
              AND status = 'active'
              AND COALESCE(last_active_at, approved_at, created_at) < $1
            ORDER BY COALESCE(last_active_at, approved_at, created_at) ASC
            "#,
            USER_COLUMNS
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql).bind(cutoff).fetch_all(&self.pool).await?;
        convert_all(rows)
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn find_role_permission(&self, key: &RolePermissionKey) -> Result<Option<RolePermission>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM role_permissions WHERE role = $1 AND resource = $2 AND action = $3",
            PERMISSION_COLUMNS
        );
        sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(key.role.as_str())
            .bind(&key.resource)
            .bind(&key.action)
            .fetch_optional(&self.pool)
            .await?
            .map(RolePermission::try_from)
            .transpose()
    }

    async fn list_role_permissions(&self, role: Option<Role>) -> Result<Vec<RolePermission>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM role_permissions WHERE ($1::TEXT IS NULL OR role = $1) ORDER BY role, resource, action",
            PERMISSION_COLUMNS
        );
        let rows = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(role.map(|r| r.as_str()))
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn upsert_role_permission(
        &self,
        upsert: RolePermissionUpsert,
        at: DateTime<Utc>,
    ) -> Result<PermissionWrite, DatabaseError> {
        let key = &upsert.key;
        let mut tx = self.pool.begin().await?;

        let select = format!(
            "SELECT {} FROM role_permissions WHERE role = $1 AND resource = $2 AND action = $3 FOR UPDATE",
            PERMISSION_COLUMNS
        );
        let previous = sqlx::query_as::<_, PermissionRow>(&select)
            .bind(key.role.as_str())
            .bind(&key.resource)
            .bind(&key.action)
            .fetch_optional(&mut *tx)
            .await?
            .map(RolePermission::try_from)
            .transpose()?;

        let upsert_sql = format!(
            r#"
            INSERT INTO role_permissions (role, resource, action, allowed, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (role, resource, action) DO UPDATE
            SET allowed = EXCLUDED.allowed,
                description = COALESCE(EXCLUDED.description, role_permissions.description),
                updated_at = EXCLUDED.updated_at
            RETURNING {}
            "#,
            PERMISSION_COLUMNS
        );
        let row = sqlx::query_as::<_, PermissionRow>(&upsert_sql)
            .bind(key.role.as_str())
            .bind(&key.resource)
            .bind(&key.action)
            .bind(upsert.allowed)
            .bind(upsert.description.clone())
            .bind(at)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(PermissionWrite {
            previous,
            current: RolePermission::try_from(row)?,
        })
    }

    async fn delete_role_permission(&self, key: &RolePermissionKey) -> Result<Option<RolePermission>, DatabaseError> {
        let sql = format!(
            "DELETE FROM role_permissions WHERE role = $1 AND resource = $2 AND action = $3 RETURNING {}",
            PERMISSION_COLUMNS
        );
        sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(key.role.as_str())
            .bind(&key.resource)
            .bind(&key.action)
            .fetch_optional(&self.pool)
            .await?
            .map(RolePermission::try_from)
            .transpose()
    }
}

#[async_trait]
impl UnitStore for PgStore {
    async fn insert_unit(&self, unit: NewUnit, at: DateTime<Utc>) -> Result<Unit, DatabaseError> {
        let insert = format!(
            "INSERT INTO units (id, name, code, description, color, icon, is_active, member_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, TRUE, 0, $7, $7) RETURNING {}",
            UNIT_COLUMNS
        );
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;
        sqlx::query_as::<_, UnitRow>(&insert)
            .bind(id)
            .bind(&unit.name)
            .bind(unit.code)
            .bind(unit.description)
            .bind(unit.color.unwrap_or_else(|| DEFAULT_UNIT_COLOR.to_string()))
            .bind(unit.icon.unwrap_or_else(|| DEFAULT_UNIT_ICON.to_string()))
            .bind(at)
            .fetch_one(&mut *tx)
            .await
            .map_err(classify)?;

        // Users may already carry the name in their free-text unit field.
        recount_units(&mut tx, &[unit.name], at).await?;

        let select = format!("SELECT {} FROM units WHERE id = $1", UNIT_COLUMNS);
        let row = sqlx::query_as::<_, UnitRow>(&select).bind(id).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn find_unit(&self, id: Uuid) -> Result<Option<Unit>, DatabaseError> {
        let sql = format!("SELECT {} FROM units WHERE id = $1", UNIT_COLUMNS);
        let row = sqlx::query_as::<_, UnitRow>(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Unit::from))
    }

    async fn list_units(&self, include_inactive: bool) -> Result<Vec<Unit>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM units WHERE ($1 OR is_active = TRUE) ORDER BY name ASC",
            UNIT_COLUMNS
        );
        let rows = sqlx::query_as::<_, UnitRow>(&sql)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Unit::from).collect())
    }

    async fn update_unit(&self, id: Uuid, patch: UnitPatch, at: DateTime<Utc>) -> Result<UnitUpdate, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let select = format!("SELECT {} FROM units WHERE id = $1", UNIT_COLUMNS);
        let Some(row) = sqlx::query_as::<_, UnitRow>(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(UnitUpdate::NotFound);
        };
        let old_name = Unit::from(row).name;
        let renamed = patch.name.as_deref().is_some_and(|name| name != old_name);

        // Lock order matches set_user_role: user rows first, then the unit.
        if renamed {
            sqlx::query("SELECT id FROM users WHERE unit = $1 ORDER BY id FOR UPDATE")
                .bind(&old_name)
                .fetch_all(&mut *tx)
                .await?;
        }
        let locked = format!("SELECT {} FROM units WHERE id = $1 FOR UPDATE", UNIT_COLUMNS);
        let Some(row) = sqlx::query_as::<_, UnitRow>(&locked)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(UnitUpdate::NotFound);
        };
        let mut current = Unit::from(row);

        if patch.is_active == Some(false) && current.is_active {
            let count: i64 = sqlx::query_scalar(MEMBER_COUNT_SQL)
                .bind(&current.name)
                .fetch_one(&mut *tx)
                .await?;
            if count > 0 {
                tx.rollback().await?;
                current.member_count = count;
                return Ok(UnitUpdate::HasMembers { unit: current, count });
            }
        }

        if renamed {
            sqlx::query("UPDATE users SET unit = $2, updated_at = $3 WHERE unit = $1")
                .bind(&current.name)
                .bind(patch.name.as_deref())
                .bind(at)
                .execute(&mut *tx)
                .await?;
        }

        let update = format!(
            r#"
            UPDATE units
            SET name = COALESCE($2, name),
                code = CASE WHEN $3::TEXT = '' THEN NULL ELSE COALESCE($3, code) END,
                description = COALESCE($4, description),
                color = COALESCE($5, color),
                icon = COALESCE($6, icon),
                is_active = COALESCE($7, is_active),
                updated_at = $8
            WHERE id = $1
            RETURNING {}
            "#,
            UNIT_COLUMNS
        );
        let row = sqlx::query_as::<_, UnitRow>(&update)
            .bind(id)
            .bind(patch.name)
            .bind(patch.code)
            .bind(patch.description)
            .bind(patch.color)
            .bind(patch.icon)
            .bind(patch.is_active)
            .bind(at)
            .fetch_one(&mut *tx)
            .await
            .map_err(classify)?;

        let mut unit = Unit::from(row);
        recount_units(&mut tx, &[unit.name.clone()], at).await?;
        unit.member_count = sqlx::query_scalar(MEMBER_COUNT_SQL)
            .bind(&unit.name)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(UnitUpdate::Updated(unit))
    }

    async fn deactivate_unit_if_empty(&self, id: Uuid, at: DateTime<Utc>) -> Result<UnitDeactivation, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let select = format!("SELECT {} FROM units WHERE id = $1 FOR UPDATE", UNIT_COLUMNS);
        let Some(row) = sqlx::query_as::<_, UnitRow>(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(UnitDeactivation::NotFound);
        };
        let mut unit = Unit::from(row);

        let count: i64 = sqlx::query_scalar(MEMBER_COUNT_SQL)
            .bind(&unit.name)
            .fetch_one(&mut *tx)
            .await?;

        if count > 0 {
            sqlx::query("UPDATE units SET member_count = $2 WHERE id = $1")
                .bind(id)
                .bind(count)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            unit.member_count = count;
            return Ok(UnitDeactivation::HasMembers { unit, count });
        }

        let update = format!(
            "UPDATE units SET is_active = FALSE, member_count = 0, updated_at = $2 WHERE id = $1 RETURNING {}",
            UNIT_COLUMNS
        );
        let row = sqlx::query_as::<_, UnitRow>(&update)
            .bind(id)
            .bind(at)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(UnitDeactivation::Deactivated(row.into()))
    }

    async fn assign_unit_leader(
        &self,
        unit_id: Uuid,
        user_id: Uuid,
        slot: LeaderSlot,
        at: DateTime<Utc>,
    ) -> Result<LeaderAssignment, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        // Lock order matches set_user_role: user row first, then units.
        let select_user = format!("SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL FOR UPDATE", USER_COLUMNS);
        let Some(user_row) = sqlx::query_as::<_, UserRow>(&select_user)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(LeaderAssignment::UserNotFound);
        };
        let previous = User::try_from(user_row)?;

        let select_unit = format!("SELECT {} FROM units WHERE id = $1 FOR UPDATE", UNIT_COLUMNS);
        let Some(unit_row) = sqlx::query_as::<_, UnitRow>(&select_unit)
            .bind(unit_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(LeaderAssignment::UnitNotFound);
        };
        let unit = Unit::from(unit_row);
        if !unit.is_active {
            return Ok(LeaderAssignment::UnitInactive);
        }

        let names = affected_units(previous.unit.as_deref(), Some(&unit.name));
        lock_units(&mut tx, &names).await?;

        let assign_slot = match slot {
            LeaderSlot::Leader => "UPDATE units SET leader_id = $2, updated_at = $3 WHERE id = $1",
            LeaderSlot::CoLeader => "UPDATE units SET co_leader_id = $2, updated_at = $3 WHERE id = $1",
        };
        sqlx::query(assign_slot)
            .bind(unit_id)
            .bind(user_id)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        let update_user = format!(
            "UPDATE users SET role = $2, unit = $3, updated_at = $4 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let user_row = sqlx::query_as::<_, UserRow>(&update_user)
            .bind(user_id)
            .bind(slot.role().as_str())
            .bind(&unit.name)
            .bind(at)
            .fetch_one(&mut *tx)
            .await?;

        recount_units(&mut tx, &names, at).await?;

        let reload = format!("SELECT {} FROM units WHERE id = $1", UNIT_COLUMNS);
        let unit_row = sqlx::query_as::<_, UnitRow>(&reload).bind(unit_id).fetch_one(&mut *tx).await?;
        tx.commit().await?;

        Ok(LeaderAssignment::Assigned {
            unit: unit_row.into(),
            assignment: RoleAssignment {
                user: User::try_from(user_row)?,
                previous_role: previous.role,
                previous_unit: previous.unit,
            },
        })
    }

    async fn refresh_member_count(&self, unit_name: &str, at: DateTime<Utc>) -> Result<i64, DatabaseError> {
        let names = [unit_name.to_string()];
        let mut tx = self.pool.begin().await?;
        lock_units(&mut tx, &names).await?;
        recount_units(&mut tx, &names, at).await?;
        let count: i64 = sqlx::query_scalar(MEMBER_COUNT_SQL)
            .bind(unit_name)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(count)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn insert_admin_activity(
        &self,
        entry: NewAdminActivity,
        at: DateTime<Utc>,
    ) -> Result<AdminActivity, DatabaseError> {
        let row = sqlx::query_as::<_, ActivityRow>(
            r#"
            INSERT INTO admin_activity_logs
                (id, admin_id, action, target_type, target_id, old_value, new_value, reason, ip_address, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, admin_id, action, target_type, target_id, old_value, new_value, reason, ip_address,
                      user_agent, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.admin_id)
        .bind(entry.action.as_str())
        .bind(entry.target_type)
        .bind(entry.target_id)
        .bind(entry.old_value)
        .bind(entry.new_value)
        .bind(entry.reason)
        .bind(entry.ip_address)
        .bind(entry.user_agent)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list_admin_activity(&self, filter: &ActivityFilter, limit: i64) -> Result<Vec<AdminActivity>, DatabaseError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, admin_id, action, target_type, target_id, old_value, new_value, reason, ip_address, \
             user_agent, created_at FROM admin_activity_logs WHERE TRUE",
        );
        if let Some(admin_id) = filter.admin_id {
            qb.push(" AND admin_id = ").push_bind(admin_id);
        }
        if let Some(action) = &filter.action {
            qb.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(target_type) = &filter.target_type {
            qb.push(" AND target_type = ").push_bind(target_type.clone());
        }
        if let Some(target_id) = &filter.target_id {
            qb.push(" AND target_id = ").push_bind(target_id.clone());
        }
        qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);

        let rows = qb.build_query_as::<ActivityRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(AdminActivity::from).collect())
    }

    async fn insert_permission_audit(
        &self,
        entry: NewPermissionAudit,
        at: DateTime<Utc>,
    ) -> Result<PermissionAudit, DatabaseError> {
        let row = sqlx::query_as::<_, PermissionAuditRow>(
            r#"
            INSERT INTO permission_audit_logs
                (id, changed_by, role, resource, action, change_type, old_value, new_value, reason, ip_address,
                 user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id, changed_by, role, resource, action, change_type, old_value, new_value, reason,
                      ip_address, user_agent, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.changed_by)
        .bind(entry.role.as_str())
        .bind(entry.resource)
        .bind(entry.action)
        .bind(entry.change_type.as_str())
        .bind(entry.old_value)
        .bind(entry.new_value)
        .bind(entry.reason)
        .bind(entry.ip_address)
        .bind(entry.user_agent)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;
        PermissionAudit::try_from(row)
    }

    async fn list_permission_audit(
        &self,
        filter: &PermissionAuditFilter,
        limit: i64,
    ) -> Result<Vec<PermissionAudit>, DatabaseError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, changed_by, role, resource, action, change_type, old_value, new_value, reason, ip_address, \
             user_agent, created_at FROM permission_audit_logs WHERE TRUE",
        );
        if let Some(changed_by) = filter.changed_by {
            qb.push(" AND changed_by = ").push_bind(changed_by);
        }
        if let Some(role) = filter.role {
            qb.push(" AND role = ").push_bind(role.as_str());
        }
        if let Some(resource) = &filter.resource {
            qb.push(" AND resource = ").push_bind(resource.clone());
        }
        if let Some(change_type) = filter.change_type {
            qb.push(" AND change_type = ").push_bind(change_type.as_str());
        }
        qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);

        let rows = qb.build_query_as::<PermissionAuditRow>().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn insert_role_change(&self, entry: NewRoleChange, at: DateTime<Utc>) -> Result<RoleChange, DatabaseError> {
        let row = sqlx::query_as::<_, RoleChangeRow>(
            r#"
            INSERT INTO role_change_history
                (id, user_id, changed_by, old_role, new_role, old_unit, new_unit, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, user_id, changed_by, old_role, new_role, old_unit, new_unit, reason, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.changed_by)
        .bind(entry.old_role.map(|r| r.as_str()))
        .bind(entry.new_role.map(|r| r.as_str()))
        .bind(entry.old_unit)
        .bind(entry.new_unit)
        .bind(entry.reason)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;
        RoleChange::try_from(row)
    }

    async fn list_role_changes(&self, user_id: Option<Uuid>, limit: i64) -> Result<Vec<RoleChange>, DatabaseError> {
        let rows = sqlx::query_as::<_, RoleChangeRow>(
            r#"
            SELECT id, user_id, changed_by, old_role, new_role, old_unit, new_unit, reason, created_at
            FROM role_change_history
            WHERE ($1::UUID IS NULL OR user_id = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }
}

#[async_trait]
impl AccessRequestStore for PgStore {
    async fn insert_access_request(
        &self,
        request: NewAccessRequest,
        at: DateTime<Utc>,
    ) -> Result<ToolAccessRequest, DatabaseError> {
        let sql = format!(
            "INSERT INTO tool_access_requests (id, user_id, tool_path, justification, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, 'pending', $5, $5) RETURNING {}",
            REQUEST_COLUMNS
        );
        let row = sqlx::query_as::<_, AccessRequestRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(request.user_id)
            .bind(request.tool_path)
            .bind(request.justification)
            .bind(at)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        ToolAccessRequest::try_from(row)
    }

    async fn find_access_request(&self, id: Uuid) -> Result<Option<ToolAccessRequest>, DatabaseError> {
        let sql = format!("SELECT {} FROM tool_access_requests WHERE id = $1", REQUEST_COLUMNS);
        sqlx::query_as::<_, AccessRequestRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(ToolAccessRequest::try_from)
            .transpose()
    }

    async fn list_access_requests(
        &self,
        filter: &AccessRequestFilter,
        limit: i64,
    ) -> Result<Vec<ToolAccessRequest>, DatabaseError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM tool_access_requests WHERE TRUE", REQUEST_COLUMNS));
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(user_id) = filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);

        let rows = qb.build_query_as::<AccessRequestRow>().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn resolve_access_request(
        &self,
        id: Uuid,
        status: AccessRequestStatus,
        reviewed_by: Uuid,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<AccessRequestResolution, DatabaseError> {
        let sql = format!(
            "UPDATE tool_access_requests SET status = $2, reviewed_by = $3, review_notes = $4, reviewed_at = $5, \
             updated_at = $5 WHERE id = $1 AND status = 'pending' RETURNING {}",
            REQUEST_COLUMNS
        );
        let resolved = sqlx::query_as::<_, AccessRequestRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(reviewed_by)
            .bind(notes)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = resolved {
            return Ok(AccessRequestResolution::Resolved(ToolAccessRequest::try_from(row)?));
        }

        Ok(match self.find_access_request(id).await? {
            Some(existing) => AccessRequestResolution::AlreadyResolved(existing),
            None => AccessRequestResolution::NotFound,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affected_units_skips_missing_and_duplicates() {
        assert!(affected_units(None, None).is_empty());
        assert_eq!(affected_units(Some("Ops"), None), vec!["Ops".to_string()]);
        assert_eq!(affected_units(Some("Ops"), Some("Ops")), vec!["Ops".to_string()]);
        assert_eq!(
            affected_units(Some("Ops"), Some("Field")),
            vec!["Ops".to_string(), "Field".to_string()]
        );
    }

    #[test]
    fn unknown_role_strings_are_decode_errors() {
        assert!(matches!(
            parse_role(Some("owner".to_string())),
            Err(DatabaseError::Decode(_))
        ));
        assert_eq!(parse_role(None).unwrap(), None);
    }
}
