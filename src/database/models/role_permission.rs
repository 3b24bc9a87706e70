use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Role;

/// Action used by nearly every tool route.
pub const DEFAULT_ACTION: &str = "execute";

/// One policy row. The (role, resource, action) triple is unique; a missing
/// row means "not permitted".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermission {
    pub role: Role,
    pub resource: String,
    pub action: String,
    pub allowed: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissionKey {
    pub role: Role,
    pub resource: String,
    pub action: String,
}

#[derive(Debug, Clone)]
pub struct RolePermissionUpsert {
    pub key: RolePermissionKey,
    pub allowed: bool,
    pub description: Option<String>,
}
