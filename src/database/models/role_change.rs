use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::Role;

/// Append-only history entry for a user's role/unit change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleChange {
    pub id: Uuid,
    pub user_id: Uuid,
    pub changed_by: Option<Uuid>,
    pub old_role: Option<Role>,
    pub new_role: Option<Role>,
    pub old_unit: Option<String>,
    pub new_unit: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRoleChange {
    pub user_id: Uuid,
    pub changed_by: Option<Uuid>,
    pub old_role: Option<Role>,
    pub new_role: Option<Role>,
    pub old_unit: Option<String>,
    pub new_unit: Option<String>,
    pub reason: Option<String>,
}
