//! In-process store for development mode and the test suites.
//!
//! All state sits behind one `RwLock`, so each trait method observes and
//! mutates a consistent snapshot, matching the per-call transactions of the
//! Postgres backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::manager::DatabaseError;
use super::models::unit::{DEFAULT_UNIT_COLOR, DEFAULT_UNIT_ICON};
use super::models::{
    AccessRequestFilter, AccessRequestStatus, ActivityFilter, AdminActivity, LeaderSlot, NewAccessRequest,
    NewAdminActivity, NewPermissionAudit, NewRoleChange, NewUnit, NewUser, PermissionAudit, PermissionAuditFilter,
    Role, RoleChange, RolePermission, RolePermissionKey, RolePermissionUpsert, ToolAccessRequest, Unit, UnitPatch,
    User, UserFilter, UserStatus,
};
use super::store::{
    AccessRequestResolution, AccessRequestStore, AuditStore, LeaderAssignment, PermissionStore, PermissionWrite,
    RoleAssignment, Store, UnitDeactivation, UnitStore, UnitUpdate, UserStore,
};

#[derive(Default)]
struct MemoryData {
    users: HashMap<Uuid, User>,
    permissions: HashMap<RolePermissionKey, RolePermission>,
    units: HashMap<Uuid, Unit>,
    role_changes: Vec<RoleChange>,
    activity: Vec<AdminActivity>,
    permission_audit: Vec<PermissionAudit>,
    access_requests: HashMap<Uuid, ToolAccessRequest>,
}

impl MemoryData {
    fn member_count(&self, unit_name: &str) -> i64 {
        self.users.values().filter(|u| u.counts_as_member_of(unit_name)).count() as i64
    }

    fn recount(&mut self, names: &[Option<&str>], at: DateTime<Utc>) {
        let names: HashSet<String> = names.iter().flatten().map(|n| n.to_string()).collect();
        for name in names {
            let count = self.member_count(&name);
            for unit in self.units.values_mut().filter(|u| u.name == name) {
                unit.member_count = count;
                unit.updated_at = at;
            }
        }
    }

    fn live_user_mut(&mut self, id: Uuid) -> Option<&mut User> {
        self.users.get_mut(&id).filter(|u| !u.is_deleted())
    }

    fn unit_conflict(&self, except: Option<Uuid>, name: Option<&str>, code: Option<&str>) -> Option<&'static str> {
        let others = self.units.values().filter(|u| Some(u.id) != except);
        for unit in others {
            if name.is_some_and(|n| unit.name == n) {
                return Some("units_name_key");
            }
            if code.is_some() && unit.code.as_deref() == code {
                return Some("units_code_key");
            }
        }
        None
    }
}

/// Newest first, capped at `limit`.
fn newest<T: Clone>(items: impl Iterator<Item = T>, created_at: impl Fn(&T) -> DateTime<Utc>, limit: i64) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items.truncate(limit.max(0) as usize);
    items
}

#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<MemoryData>,
    queries: AtomicUsize,
    fail_reads: AtomicBool,
    failing_users: Mutex<HashSet<Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store calls served so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Make every read fail with a query error until switched off.
    pub fn set_read_failure(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make writes targeting this user fail.
    pub fn fail_writes_for_user(&self, id: Uuid) {
        if let Ok(mut users) = self.failing_users.lock() {
            users.insert(id);
        }
    }

    /// Insert or replace a user row as-is, then refresh the affected member counts.
    pub async fn put_user(&self, user: User) -> User {
        let mut data = self.data.write().await;
        let previous_unit = data.users.get(&user.id).and_then(|u| u.unit.clone());
        let at = user.updated_at;
        data.users.insert(user.id, user.clone());
        data.recount(&[previous_unit.as_deref(), user.unit.as_deref()], at);
        user
    }

    fn read(&self) -> Result<(), DatabaseError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryError("injected read failure".to_string()));
        }
        Ok(())
    }

    fn write_for(&self, user_id: Option<Uuid>) -> Result<(), DatabaseError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let blocked = match (user_id, self.failing_users.lock()) {
            (Some(id), Ok(users)) => users.contains(&id),
            _ => false,
        };
        if blocked {
            return Err(DatabaseError::QueryError("injected write failure".to_string()));
        }
        Ok(())
    }

    fn write(&self) -> Result<(), DatabaseError> {
        self.write_for(None)
    }

    async fn update_live_user<F>(&self, id: Uuid, apply: F) -> Result<Option<User>, DatabaseError>
    where
        F: FnOnce(&mut User) + Send,
    {
        self.write_for(Some(id))?;
        let mut data = self.data.write().await;
        Ok(data.live_user_mut(id).map(|user| {
            apply(user);
            user.clone()
        }))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser, at: DateTime<Utc>) -> Result<User, DatabaseError> {
        self.write()?;
        let email = user.email.trim().to_lowercase();
        let mut data = self.data.write().await;
        if data.users.values().any(|u| u.email == email) {
            return Err(DatabaseError::Conflict("users_email_key".to_string()));
        }
        let created = User {
            id: Uuid::new_v4(),
            email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: None,
            unit: user.unit,
            status: UserStatus::Pending,
            is_approved: false,
            is_active: true,
            last_active_at: None,
            approved_at: None,
            approved_by: None,
            sessions_revoked_at: None,
            created_at: at,
            updated_at: at,
            deleted_at: None,
            password_hash: user.password_hash,
            mfa_secret: None,
            mfa_backup_codes: None,
        };
        data.users.insert(created.id, created.clone());
        data.recount(&[created.unit.as_deref()], at);
        Ok(created)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        self.read()?;
        Ok(self.data.read().await.users.get(&id).cloned())
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, DatabaseError> {
        self.read()?;
        let data = self.data.read().await;
        let mut users: Vec<User> = data.users.values().filter(|u| filter.matches(u)).cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn set_user_role(
        &self,
        id: Uuid,
        role: Option<Role>,
        unit: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<RoleAssignment>, DatabaseError> {
        self.write_for(Some(id))?;
        let mut data = self.data.write().await;
        let Some(user) = data.live_user_mut(id) else {
            return Ok(None);
        };
        let previous_role = user.role;
        let previous_unit = user.unit.clone();
        user.role = role;
        user.unit = unit;
        user.updated_at = at;
        let updated = user.clone();
        data.recount(&[previous_unit.as_deref(), updated.unit.as_deref()], at);
        Ok(Some(RoleAssignment {
            user: updated,
            previous_role,
            previous_unit,
        }))
    }

    async fn approve_user(&self, id: Uuid, approved_by: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError> {
        self.update_live_user(id, |user| {
            user.status = UserStatus::Active;
            user.is_approved = true;
            user.approved_by = Some(approved_by);
            user.approved_at = Some(at);
            user.last_active_at = Some(at);
            user.updated_at = at;
        })
        .await
    }

    async fn mark_user_pending(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError> {
        self.update_live_user(id, |user| {
            user.status = UserStatus::Pending;
            user.updated_at = at;
        })
        .await
    }

    async fn soft_delete_user(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError> {
        self.write_for(Some(id))?;
        let mut data = self.data.write().await;
        let Some(user) = data.live_user_mut(id) else {
            return Ok(None);
        };
        user.deleted_at = Some(at);
        user.status = UserStatus::Suspended;
        user.is_active = false;
        user.updated_at = at;
        let deleted = user.clone();
        data.recount(&[deleted.unit.as_deref()], at);
        Ok(Some(deleted))
    }

    async fn revoke_user_sessions(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError> {
        self.update_live_user(id, |user| {
            user.sessions_revoked_at = Some(at);
            user.updated_at = at;
        })
        .await
    }

    async fn record_user_activity(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<User>, DatabaseError> {
        self.update_live_user(id, |user| user.last_active_at = Some(at)).await
    }

    async fn find_inactive_approved_users(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>, DatabaseError> {
        self.read()?;
        let data = self.data.read().await;
        let mut users: Vec<User> = data
            .users
            .values()
            .filter(|u| {
                u.is_approved
                    && u.is_active
                    && !u.is_deleted()
                    && u.status == UserStatus::Active
                    && u.activity_anchor() < cutoff
            })
            .cloned()
            .collect();
        users.sort_by_key(User::activity_anchor);
        Ok(users)
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn find_role_permission(&self, key: &RolePermissionKey) -> Result<Option<RolePermission>, DatabaseError> {
        self.read()?;
        Ok(self.data.read().await.permissions.get(key).cloned())
    }

    async fn list_role_permissions(&self, role: Option<Role>) -> Result<Vec<RolePermission>, DatabaseError> {
        self.read()?;
        let data = self.data.read().await;
        let mut rows: Vec<RolePermission> = data
            .permissions
            .values()
            .filter(|p| role.map_or(true, |r| p.role == r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.role.as_str(), &a.resource, &a.action).cmp(&(b.role.as_str(), &b.resource, &b.action))
        });
        Ok(rows)
    }

    async fn upsert_role_permission(
        &self,
        upsert: RolePermissionUpsert,
        at: DateTime<Utc>,
    ) -> Result<PermissionWrite, DatabaseError> {
        self.write()?;
        let mut data = self.data.write().await;
        let previous = data.permissions.get(&upsert.key).cloned();
        let current = match &previous {
            Some(existing) => RolePermission {
                allowed: upsert.allowed,
                description: upsert.description.or_else(|| existing.description.clone()),
                updated_at: at,
                ..existing.clone()
            },
            None => RolePermission {
                role: upsert.key.role,
                resource: upsert.key.resource.clone(),
                action: upsert.key.action.clone(),
                allowed: upsert.allowed,
                description: upsert.description,
                created_at: at,
                updated_at: at,
            },
        };
        data.permissions.insert(upsert.key, current.clone());
        Ok(PermissionWrite { previous, current })
    }

    async fn delete_role_permission(&self, key: &RolePermissionKey) -> Result<Option<RolePermission>, DatabaseError> {
        self.write()?;
        Ok(self.data.write().await.permissions.remove(key))
    }
}

#[async_trait]
impl UnitStore for MemoryStore {
    async fn insert_unit(&self, unit: NewUnit, at: DateTime<Utc>) -> Result<Unit, DatabaseError> {
        self.write()?;
        let mut data = self.data.write().await;
        if let Some(constraint) = data.unit_conflict(None, Some(&unit.name), unit.code.as_deref()) {
            return Err(DatabaseError::Conflict(constraint.to_string()));
        }
        let created = Unit {
            id: Uuid::new_v4(),
            member_count: data.member_count(&unit.name),
            name: unit.name,
            code: unit.code,
            description: unit.description,
            color: unit.color.unwrap_or_else(|| DEFAULT_UNIT_COLOR.to_string()),
            icon: unit.icon.unwrap_or_else(|| DEFAULT_UNIT_ICON.to_string()),
            leader_id: None,
            co_leader_id: None,
            is_active: true,
            created_at: at,
            updated_at: at,
        };
        data.units.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_unit(&self, id: Uuid) -> Result<Option<Unit>, DatabaseError> {
        self.read()?;
        Ok(self.data.read().await.units.get(&id).cloned())
    }

    async fn list_units(&self, include_inactive: bool) -> Result<Vec<Unit>, DatabaseError> {
        self.read()?;
        let data = self.data.read().await;
        let mut units: Vec<Unit> = data
            .units
            .values()
            .filter(|u| include_inactive || u.is_active)
            .cloned()
            .collect();
        units.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(units)
    }

    async fn update_unit(&self, id: Uuid, patch: UnitPatch, at: DateTime<Utc>) -> Result<UnitUpdate, DatabaseError> {
        self.write()?;
        let mut data = self.data.write().await;
        let Some(current) = data.units.get(&id).cloned() else {
            return Ok(UnitUpdate::NotFound);
        };
        let code = patch.code.as_deref().filter(|c| !c.is_empty());
        if let Some(constraint) = data.unit_conflict(Some(id), patch.name.as_deref(), code) {
            return Err(DatabaseError::Conflict(constraint.to_string()));
        }

        if patch.is_active == Some(false) && current.is_active {
            let count = data.member_count(&current.name);
            if count > 0 {
                let mut unit = current;
                unit.member_count = count;
                return Ok(UnitUpdate::HasMembers { unit, count });
            }
        }

        let name = patch.name.unwrap_or_else(|| current.name.clone());
        if name != current.name {
            for user in data.users.values_mut().filter(|u| u.unit.as_deref() == Some(current.name.as_str())) {
                user.unit = Some(name.clone());
                user.updated_at = at;
            }
        }

        let Some(unit) = data.units.get_mut(&id) else {
            return Ok(UnitUpdate::NotFound);
        };
        unit.name = name.clone();
        if let Some(code) = patch.code {
            unit.code = Some(code).filter(|c| !c.is_empty());
        }
        if patch.description.is_some() {
            unit.description = patch.description;
        }
        if let Some(color) = patch.color {
            unit.color = color;
        }
        if let Some(icon) = patch.icon {
            unit.icon = icon;
        }
        if let Some(is_active) = patch.is_active {
            unit.is_active = is_active;
        }
        unit.updated_at = at;
        data.recount(&[Some(name.as_str())], at);
        match data.units.get(&id) {
            Some(unit) => Ok(UnitUpdate::Updated(unit.clone())),
            None => Ok(UnitUpdate::NotFound),
        }
    }

    async fn deactivate_unit_if_empty(&self, id: Uuid, at: DateTime<Utc>) -> Result<UnitDeactivation, DatabaseError> {
        self.write()?;
        let mut data = self.data.write().await;
        let Some(name) = data.units.get(&id).map(|u| u.name.clone()) else {
            return Ok(UnitDeactivation::NotFound);
        };
        let count = data.member_count(&name);
        let Some(unit) = data.units.get_mut(&id) else {
            return Ok(UnitDeactivation::NotFound);
        };
        unit.member_count = count;
        if count > 0 {
            return Ok(UnitDeactivation::HasMembers {
                unit: unit.clone(),
                count,
            });
        }
        unit.is_active = false;
        unit.updated_at = at;
        Ok(UnitDeactivation::Deactivated(unit.clone()))
    }

    async fn assign_unit_leader(
        &self,
        unit_id: Uuid,
        user_id: Uuid,
        slot: LeaderSlot,
        at: DateTime<Utc>,
    ) -> Result<LeaderAssignment, DatabaseError> {
        self.write_for(Some(user_id))?;
        let mut data = self.data.write().await;
        if data.live_user_mut(user_id).is_none() {
            return Ok(LeaderAssignment::UserNotFound);
        }
        let Some(unit) = data.units.get_mut(&unit_id) else {
            return Ok(LeaderAssignment::UnitNotFound);
        };
        if !unit.is_active {
            return Ok(LeaderAssignment::UnitInactive);
        }
        match slot {
            LeaderSlot::Leader => unit.leader_id = Some(user_id),
            LeaderSlot::CoLeader => unit.co_leader_id = Some(user_id),
        }
        unit.updated_at = at;
        let unit_name = unit.name.clone();

        let Some(user) = data.live_user_mut(user_id) else {
            return Ok(LeaderAssignment::UserNotFound);
        };
        let previous_role = user.role;
        let previous_unit = user.unit.replace(unit_name.clone());
        user.role = Some(slot.role());
        user.updated_at = at;
        let user = user.clone();

        data.recount(&[previous_unit.as_deref(), Some(&unit_name)], at);
        let Some(unit) = data.units.get(&unit_id).cloned() else {
            return Ok(LeaderAssignment::UnitNotFound);
        };
        Ok(LeaderAssignment::Assigned {
            unit,
            assignment: RoleAssignment {
                user,
                previous_role,
                previous_unit,
            },
        })
    }

    async fn refresh_member_count(&self, unit_name: &str, at: DateTime<Utc>) -> Result<i64, DatabaseError> {
        self.write()?;
        let mut data = self.data.write().await;
        data.recount(&[Some(unit_name)], at);
        Ok(data.member_count(unit_name))
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert_admin_activity(
        &self,
        entry: NewAdminActivity,
        at: DateTime<Utc>,
    ) -> Result<AdminActivity, DatabaseError> {
        self.write()?;
        let row = AdminActivity {
            id: Uuid::new_v4(),
            admin_id: entry.admin_id,
            action: entry.action.as_str().to_string(),
            target_type: entry.target_type,
            target_id: entry.target_id,
            old_value: entry.old_value,
            new_value: entry.new_value,
            reason: entry.reason,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            created_at: at,
        };
        self.data.write().await.activity.push(row.clone());
        Ok(row)
    }

    async fn list_admin_activity(&self, filter: &ActivityFilter, limit: i64) -> Result<Vec<AdminActivity>, DatabaseError> {
        self.read()?;
        let data = self.data.read().await;
        let rows = data.activity.iter().filter(|a| {
            filter.admin_id.map_or(true, |id| a.admin_id == id)
                && filter.action.as_ref().map_or(true, |action| &a.action == action)
                && filter.target_type.as_ref().map_or(true, |t| a.target_type.as_ref() == Some(t))
                && filter.target_id.as_ref().map_or(true, |t| a.target_id.as_ref() == Some(t))
        });
        Ok(newest(rows.cloned(), |a| a.created_at, limit))
    }

    async fn insert_permission_audit(
        &self,
        entry: NewPermissionAudit,
        at: DateTime<Utc>,
    ) -> Result<PermissionAudit, DatabaseError> {
        self.write()?;
        let row = PermissionAudit {
            id: Uuid::new_v4(),
            changed_by: entry.changed_by,
            role: entry.role,
            resource: entry.resource,
            action: entry.action,
            change_type: entry.change_type,
            old_value: entry.old_value,
            new_value: entry.new_value,
            reason: entry.reason,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            created_at: at,
        };
        self.data.write().await.permission_audit.push(row.clone());
        Ok(row)
    }

    async fn list_permission_audit(
        &self,
        filter: &PermissionAuditFilter,
        limit: i64,
    ) -> Result<Vec<PermissionAudit>, DatabaseError> {
        self.read()?;
        let data = self.data.read().await;
        let rows = data.permission_audit.iter().filter(|p| {
            filter.changed_by.map_or(true, |id| p.changed_by == id)
                && filter.role.map_or(true, |role| p.role == role)
                && filter.resource.as_ref().map_or(true, |r| &p.resource == r)
                && filter.change_type.map_or(true, |t| p.change_type == t)
        });
        Ok(newest(rows.cloned(), |p| p.created_at, limit))
    }

    async fn insert_role_change(&self, entry: NewRoleChange, at: DateTime<Utc>) -> Result<RoleChange, DatabaseError> {
        self.write_for(Some(entry.user_id))?;
        let row = RoleChange {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            changed_by: entry.changed_by,
            old_role: entry.old_role,
            new_role: entry.new_role,
            old_unit: entry.old_unit,
            new_unit: entry.new_unit,
            reason: entry.reason,
            created_at: at,
        };
        self.data.write().await.role_changes.push(row.clone());
        Ok(row)
    }

    async fn list_role_changes(&self, user_id: Option<Uuid>, limit: i64) -> Result<Vec<RoleChange>, DatabaseError> {
        self.read()?;
        let data = self.data.read().await;
        let rows = data
            .role_changes
            .iter()
            .filter(|c| user_id.map_or(true, |id| c.user_id == id));
        Ok(newest(rows.cloned(), |c| c.created_at, limit))
    }
}

#[async_trait]
impl AccessRequestStore for MemoryStore {
    async fn insert_access_request(
        &self,
        request: NewAccessRequest,
        at: DateTime<Utc>,
    ) -> Result<ToolAccessRequest, DatabaseError> {
        self.write()?;
        let mut data = self.data.write().await;
        let duplicate = data.access_requests.values().any(|r| {
            r.user_id == request.user_id && r.tool_path == request.tool_path && r.status == AccessRequestStatus::Pending
        });
        if duplicate {
            return Err(DatabaseError::Conflict("tool_access_requests_pending_key".to_string()));
        }
        let row = ToolAccessRequest {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            tool_path: request.tool_path,
            justification: request.justification,
            status: AccessRequestStatus::Pending,
            reviewed_by: None,
            review_notes: None,
            reviewed_at: None,
            created_at: at,
            updated_at: at,
        };
        data.access_requests.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_access_request(&self, id: Uuid) -> Result<Option<ToolAccessRequest>, DatabaseError> {
        self.read()?;
        Ok(self.data.read().await.access_requests.get(&id).cloned())
    }

    async fn list_access_requests(
        &self,
        filter: &AccessRequestFilter,
        limit: i64,
    ) -> Result<Vec<ToolAccessRequest>, DatabaseError> {
        self.read()?;
        let data = self.data.read().await;
        let rows = data.access_requests.values().filter(|r| {
            filter.status.map_or(true, |s| r.status == s) && filter.user_id.map_or(true, |id| r.user_id == id)
        });
        Ok(newest(rows.cloned(), |r| r.created_at, limit))
    }

    async fn resolve_access_request(
        &self,
        id: Uuid,
        status: AccessRequestStatus,
        reviewed_by: Uuid,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<AccessRequestResolution, DatabaseError> {
        self.write()?;
        let mut data = self.data.write().await;
        let Some(request) = data.access_requests.get_mut(&id) else {
            return Ok(AccessRequestResolution::NotFound);
        };
        if request.status.is_terminal() {
            return Ok(AccessRequestResolution::AlreadyResolved(request.clone()));
        }
        request.status = status;
        request.reviewed_by = Some(reviewed_by);
        request.review_notes = notes;
        request.reviewed_at = Some(at);
        request.updated_at = at;
        Ok(AccessRequestResolution::Resolved(request.clone()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        self.read()
    }
}
