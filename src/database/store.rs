//! Storage seam shared by the Postgres and in-memory backends.
//!
//! Every method is a single atomic unit of work: multi-row sequences that must
//! not interleave with concurrent writers (unit deactivation vs. member
//! additions, leader assignment vs. the mirrored user role, member counts vs.
//! membership changes) are executed inside one transaction by the backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::manager::DatabaseError;
use super::models::{
    AccessRequestFilter, AccessRequestStatus, ActivityFilter, AdminActivity, LeaderSlot, NewAccessRequest,
    NewAdminActivity, NewPermissionAudit, NewRoleChange, NewUnit, NewUser, PermissionAudit, PermissionAuditFilter,
    Role, RoleChange, RolePermission, RolePermissionKey, RolePermissionUpsert, ToolAccessRequest, Unit, UnitPatch,
    User, UserFilter,
};

/// Result of a role/unit write on a user, with the values it replaced.
#[derive(Debug, Clone)]
pub struct RoleAssignment {
    pub user: User,
    pub previous_role: Option<Role>,
    pub previous_unit: Option<String>,
}

#[derive(Debug, Clone)]
pub enum UnitDeactivation {
    Deactivated(Unit),
    HasMembers { unit: Unit, count: i64 },
    NotFound,
}

/// Outcome of a unit patch. Deactivating through a patch obeys the same
/// member check as `deactivate_unit_if_empty`.
#[derive(Debug, Clone)]
pub enum UnitUpdate {
    Updated(Unit),
    HasMembers { unit: Unit, count: i64 },
    NotFound,
}

#[derive(Debug, Clone)]
pub enum LeaderAssignment {
    Assigned { unit: Unit, assignment: RoleAssignment },
    UnitNotFound,
    UnitInactive,
    UserNotFound,
}

#[derive(Debug, Clone)]
pub struct PermissionWrite {
    pub previous: Option<RolePermission>,
    pub current: RolePermission,
}

#[derive(Debug, Clone)]
pub enum AccessRequestResolution {
    Resolved(ToolAccessRequest),
    AlreadyResolved(ToolAccessRequest),
    NotFound,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Signup: the row starts `pending` and unapproved.
    async fn create_user(&self, user: NewUser, at: DateTime<Utc>) -> Result<User, DatabaseError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, DatabaseError>;

    /// Sets role and unit, recomputing the member count of both affected units.
    async fn set_user_role(
        &self,
        id: Uuid,
        role: Option<Role>,
        unit: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<RoleAssignment>, DatabaseError>;

    async fn approve_user(&self, id: Uuid, approved_by: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError>;

    /// Moves the user back to `pending`; `is_approved` is left as-is.
    async fn mark_user_pending(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError>;

    async fn soft_delete_user(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError>;

    async fn revoke_user_sessions(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError>;

    async fn record_user_activity(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError>;

    /// Approved, active, non-deleted users with `status = active` whose
    /// activity anchor is older than `cutoff`.
    async fn find_inactive_approved_users(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>, DatabaseError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn find_role_permission(&self, key: &RolePermissionKey) -> Result<Option<RolePermission>, DatabaseError>;

    async fn list_role_permissions(&self, role: Option<Role>) -> Result<Vec<RolePermission>, DatabaseError>;

    async fn upsert_role_permission(
        &self,
        upsert: RolePermissionUpsert,
        at: DateTime<Utc>,
    ) -> Result<PermissionWrite, DatabaseError>;

    async fn delete_role_permission(&self, key: &RolePermissionKey) -> Result<Option<RolePermission>, DatabaseError>;
}

#[async_trait]
pub trait UnitStore: Send + Sync {
    /// Fails with `DatabaseError::Conflict` when name or code is taken.
    async fn insert_unit(&self, unit: NewUnit, at: DateTime<Utc>) -> Result<Unit, DatabaseError>;

    async fn find_unit(&self, id: Uuid) -> Result<Option<Unit>, DatabaseError>;

    async fn list_units(&self, include_inactive: bool) -> Result<Vec<Unit>, DatabaseError>;

    /// A rename carries every user on the old name over to the new one.
    async fn update_unit(&self, id: Uuid, patch: UnitPatch, at: DateTime<Utc>) -> Result<UnitUpdate, DatabaseError>;

    /// Soft-deletes the unit unless it still has members, checked and applied atomically.
    async fn deactivate_unit_if_empty(&self, id: Uuid, at: DateTime<Utc>) -> Result<UnitDeactivation, DatabaseError>;

    /// Sets the leader/co-leader slot and mirrors role and unit onto the user in one transaction.
    async fn assign_unit_leader(
        &self,
        unit_id: Uuid,
        user_id: Uuid,
        slot: LeaderSlot,
        at: DateTime<Utc>,
    ) -> Result<LeaderAssignment, DatabaseError>;

    async fn refresh_member_count(&self, unit_name: &str, at: DateTime<Utc>) -> Result<i64, DatabaseError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_admin_activity(
        &self,
        entry: NewAdminActivity,
        at: DateTime<Utc>,
    ) -> Result<AdminActivity, DatabaseError>;

    async fn list_admin_activity(&self, filter: &ActivityFilter, limit: i64) -> Result<Vec<AdminActivity>, DatabaseError>;

    async fn insert_permission_audit(
        &self,
        entry: NewPermissionAudit,
        at: DateTime<Utc>,
    ) -> Result<PermissionAudit, DatabaseError>;

    async fn list_permission_audit(
        &self,
        filter: &PermissionAuditFilter,
        limit: i64,
    ) -> Result<Vec<PermissionAudit>, DatabaseError>;

    async fn insert_role_change(&self, entry: NewRoleChange, at: DateTime<Utc>) -> Result<RoleChange, DatabaseError>;

    async fn list_role_changes(&self, user_id: Option<Uuid>, limit: i64) -> Result<Vec<RoleChange>, DatabaseError>;
}

#[async_trait]
pub trait AccessRequestStore: Send + Sync {
    /// Fails with `DatabaseError::Conflict` when the user already has a pending request for the path.
    async fn insert_access_request(
        &self,
        request: NewAccessRequest,
        at: DateTime<Utc>,
    ) -> Result<ToolAccessRequest, DatabaseError>;

    async fn find_access_request(&self, id: Uuid) -> Result<Option<ToolAccessRequest>, DatabaseError>;

    async fn list_access_requests(
        &self,
        filter: &AccessRequestFilter,
        limit: i64,
    ) -> Result<Vec<ToolAccessRequest>, DatabaseError>;

    /// Moves a pending request to a terminal state; terminal requests are left untouched.
    async fn resolve_access_request(
        &self,
        id: Uuid,
        status: AccessRequestStatus,
        reviewed_by: Uuid,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<AccessRequestResolution, DatabaseError>;
}

/// Everything the console persists.
#[async_trait]
pub trait Store: UserStore + PermissionStore + UnitStore + AuditStore + AccessRequestStore {
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<(), DatabaseError>;
}
