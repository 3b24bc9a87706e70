use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ParseEnumError, Role};

/// Action tags written to the admin activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivityAction {
    UnitCreated,
    UnitUpdated,
    UnitDeleted,
    UnitLeaderAssigned,
    UnitMemberCountRefreshed,
    UserRoleChanged,
    UserApproved,
    UserDeleted,
    UserSessionsRevoked,
    UserSignIn,
    PermissionUpdated,
    PermissionDeleted,
    PermissionCacheCleared,
    ApprovalSweepRun,
    AccessRequestApproved,
    AccessRequestRejected,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::UnitCreated => "unit.create",
            ActivityAction::UnitUpdated => "unit.update",
            ActivityAction::UnitDeleted => "unit.delete",
            ActivityAction::UnitLeaderAssigned => "unit.assign_leader",
            ActivityAction::UnitMemberCountRefreshed => "unit.refresh_member_count",
            ActivityAction::UserRoleChanged => "user.change_role",
            ActivityAction::UserApproved => "user.approve",
            ActivityAction::UserDeleted => "user.delete",
            ActivityAction::UserSessionsRevoked => "user.revoke_sessions",
            ActivityAction::UserSignIn => "user.sign_in",
            ActivityAction::PermissionUpdated => "permission.update",
            ActivityAction::PermissionDeleted => "permission.delete",
            ActivityAction::PermissionCacheCleared => "permission.clear_cache",
            ActivityAction::ApprovalSweepRun => "approval.expiry_sweep",
            ActivityAction::AccessRequestApproved => "access_request.approve",
            ActivityAction::AccessRequestRejected => "access_request.reject",
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminActivity {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub action: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAdminActivity {
    pub admin_id: Uuid,
    pub action: ActivityAction,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewAdminActivity {
    pub fn new(admin_id: Uuid, action: ActivityAction) -> Self {
        Self {
            admin_id,
            action,
            target_type: None,
            target_id: None,
            old_value: None,
            new_value: None,
            reason: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn target(mut self, target_type: &str, target_id: impl ToString) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id.to_string());
        self
    }

    pub fn values(mut self, old_value: Option<Value>, new_value: Option<Value>) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn origin(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFilter {
    pub admin_id: Option<Uuid>,
    pub action: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionChangeType {
    Created,
    Updated,
    Deleted,
}

impl PermissionChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionChangeType::Created => "created",
            PermissionChangeType::Updated => "updated",
            PermissionChangeType::Deleted => "deleted",
        }
    }
}

impl FromStr for PermissionChangeType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(PermissionChangeType::Created),
            "updated" => Ok(PermissionChangeType::Updated),
            "deleted" => Ok(PermissionChangeType::Deleted),
            other => Err(ParseEnumError::new("permission change type", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionAudit {
    pub id: Uuid,
    pub changed_by: Uuid,
    pub role: Role,
    pub resource: String,
    pub action: String,
    pub change_type: PermissionChangeType,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPermissionAudit {
    pub changed_by: Uuid,
    pub role: Role,
    pub resource: String,
    pub action: String,
    pub change_type: PermissionChangeType,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionAuditFilter {
    pub changed_by: Option<Uuid>,
    pub role: Option<Role>,
    pub resource: Option<String>,
    pub change_type: Option<PermissionChangeType>,
    pub limit: Option<i64>,
}
