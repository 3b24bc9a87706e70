pub mod access_request;
pub mod audit;
pub mod role_change;
pub mod role_permission;
pub mod unit;
pub mod user;

pub use access_request::{AccessRequestFilter, AccessRequestStatus, NewAccessRequest, ToolAccessRequest};
pub use audit::{
    ActivityAction, ActivityFilter, AdminActivity, NewAdminActivity, NewPermissionAudit, PermissionAudit,
    PermissionAuditFilter, PermissionChangeType,
};
pub use role_change::{NewRoleChange, RoleChange};
pub use role_permission::{RolePermission, RolePermissionKey, RolePermissionUpsert, DEFAULT_ACTION};
pub use unit::{LeaderSlot, NewUnit, Unit, UnitPatch};
pub use user::{NewUser, Role, User, UserFilter, UserStatus};

/// Raised when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
