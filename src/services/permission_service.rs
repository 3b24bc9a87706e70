use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::audit_service::{AuditLogger, LogWrite, RequestOrigin};
use super::permission_cache::{CacheKey, PermissionCache};
use crate::database::models::{
    NewPermissionAudit, PermissionChangeType, Role, RolePermission, RolePermissionKey, RolePermissionUpsert,
    UserStatus, DEFAULT_ACTION,
};
use crate::database::{DatabaseError, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowReason {
    AdminBypass,
    PolicyGranted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    UserNotFound,
    PendingApproval,
    Inactive,
    StatusNotActive,
    NoRole,
    PolicyDenied,
    NoPolicy,
    LookupFailed,
}

/// Result of evaluating one (user, resource, action) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "lowercase")]
pub enum Decision {
    Allowed(AllowReason),
    Denied(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Decision::Allowed(AllowReason::AdminBypass) => "Admin role bypasses permission checks",
            Decision::Allowed(AllowReason::PolicyGranted) => "Permission granted by role policy",
            Decision::Denied(DenyReason::UserNotFound) => "User not found",
            Decision::Denied(DenyReason::PendingApproval) => "User account pending approval",
            Decision::Denied(DenyReason::Inactive) => "User account is inactive",
            Decision::Denied(DenyReason::StatusNotActive) => "User status is not active",
            Decision::Denied(DenyReason::NoRole) => "User has no role assigned",
            Decision::Denied(DenyReason::PolicyDenied) => "Permission denied by role policy",
            Decision::Denied(DenyReason::NoPolicy) => "No permission policy defined for this role",
            Decision::Denied(DenyReason::LookupFailed) => "Permission lookup failed",
        }
    }

    fn is_cacheable(&self) -> bool {
        !matches!(self, Decision::Denied(DenyReason::LookupFailed))
    }
}

/// Admin request to create or change a permission row.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionUpdate {
    pub role: Role,
    pub resource: String,
    #[serde(default)]
    pub action: Option<String>,
    pub allowed: bool,
    pub description: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRemoval {
    pub role: Role,
    pub resource: String,
    #[serde(default)]
    pub action: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionChange {
    pub permission: RolePermission,
    pub change_type: PermissionChangeType,
    pub audit: LogWrite,
}

#[derive(Debug, thiserror::Error)]
pub enum PermissionAdminError {
    #[error("Invalid permission update")]
    Validation(HashMap<String, String>),

    #[error("Permission not found")]
    NotFound,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Validates a permission key, filling in the default action.
fn validate_key(role: Role, resource: &str, action: Option<&str>) -> Result<RolePermissionKey, PermissionAdminError> {
    let mut errors = HashMap::new();
    let resource = resource.trim();
    let action = action.map(str::trim).unwrap_or(DEFAULT_ACTION);

    if role == Role::Admin {
        errors.insert("role".to_string(), "Admin permissions cannot be edited".to_string());
    }
    if !resource.starts_with('/') || resource.chars().any(char::is_whitespace) {
        errors.insert(
            "resource".to_string(),
            "Resource must be a path starting with '/'".to_string(),
        );
    }
    if action.is_empty() {
        errors.insert("action".to_string(), "Action is required".to_string());
    }

    if !errors.is_empty() {
        return Err(PermissionAdminError::Validation(errors));
    }

    Ok(RolePermissionKey {
        role,
        resource: resource.to_string(),
        action: action.to_string(),
    })
}

/// Role/permission evaluator plus the admin operations that change its inputs.
#[derive(Clone)]
pub struct PermissionEvaluator {
    store: Arc<dyn Store>,
    cache: Arc<PermissionCache>,
    audit: AuditLogger,
}

impl PermissionEvaluator {
    pub fn new(store: Arc<dyn Store>, cache: Arc<PermissionCache>, audit: AuditLogger) -> Self {
        Self { store, cache, audit }
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    pub async fn check_permission(&self, user_id: Uuid, resource: &str, action: &str) -> bool {
        self.decide(user_id, resource, action).await.is_allowed()
    }

    pub async fn check_execute(&self, user_id: Uuid, resource: &str) -> bool {
        self.check_permission(user_id, resource, DEFAULT_ACTION).await
    }

    /// Cache-first evaluation. Lookup failures are returned but never cached.
    pub async fn decide(&self, user_id: Uuid, resource: &str, action: &str) -> Decision {
        let key = CacheKey::new(user_id, resource, action);
        if let Some(decision) = self.cache.get(&key).await {
            debug!("Permission cache hit for {}", key);
            return decision;
        }

        let decision = self.evaluate(user_id, resource, action).await;
        if decision.is_cacheable() {
            self.cache.insert(key, decision).await;
        }
        decision
    }

    /// Fresh evaluation with its reason, bypassing the cache.
    pub async fn has_permission(&self, user_id: Uuid, resource: &str, action: &str) -> Decision {
        self.evaluate(user_id, resource, action).await
    }

    pub async fn clear_permission_cache(&self, user_id: Uuid) {
        let cleared = self.cache.clear_user(user_id).await;
        debug!("Cleared {} cached permission decisions for {}", cleared, user_id);
    }

    pub async fn clear_all_permission_cache(&self) -> usize {
        let cleared = self.cache.clear_all().await;
        info!("Cleared permission cache ({} entries)", cleared);
        cleared
    }

    async fn evaluate(&self, user_id: Uuid, resource: &str, action: &str) -> Decision {
        match self.try_evaluate(user_id, resource, action).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(
                    "Permission lookup failed for {}:{}:{}: {}",
                    user_id, resource, action, e
                );
                Decision::Denied(DenyReason::LookupFailed)
            }
        }
    }

    async fn try_evaluate(&self, user_id: Uuid, resource: &str, action: &str) -> Result<Decision, DatabaseError> {
        let Some(user) = self.store.find_user(user_id).await?.filter(|u| !u.is_deleted()) else {
            return Ok(Decision::Denied(DenyReason::UserNotFound));
        };
        if !user.is_approved {
            return Ok(Decision::Denied(DenyReason::PendingApproval));
        }
        if !user.is_active {
            return Ok(Decision::Denied(DenyReason::Inactive));
        }
        if user.status != UserStatus::Active {
            return Ok(Decision::Denied(DenyReason::StatusNotActive));
        }

        let role = match user.role {
            Some(Role::Admin) => return Ok(Decision::Allowed(AllowReason::AdminBypass)),
            Some(role) => role,
            None => return Ok(Decision::Denied(DenyReason::NoRole)),
        };

        let key = RolePermissionKey {
            role,
            resource: resource.to_string(),
            action: action.to_string(),
        };
        Ok(match self.store.find_role_permission(&key).await? {
            Some(row) if row.allowed => Decision::Allowed(AllowReason::PolicyGranted),
            Some(_) => Decision::Denied(DenyReason::PolicyDenied),
            None => Decision::Denied(DenyReason::NoPolicy),
        })
    }

    pub async fn list_role_permissions(&self, role: Option<Role>) -> Result<Vec<RolePermission>, DatabaseError> {
        self.store.list_role_permissions(role).await
    }

    /// Upserts one row, audits it, then drops every cached decision since any
    /// user holding the role may be affected.
    pub async fn update_role_permission(
        &self,
        actor_id: Uuid,
        update: PermissionUpdate,
        origin: &RequestOrigin,
    ) -> Result<PermissionChange, PermissionAdminError> {
        let key = validate_key(update.role, &update.resource, update.action.as_deref())?;
        let upsert = RolePermissionUpsert {
            key: key.clone(),
            allowed: update.allowed,
            description: update.description,
        };

        let write = self.store.upsert_role_permission(upsert, Utc::now()).await?;
        let change_type = match write.previous {
            Some(_) => PermissionChangeType::Updated,
            None => PermissionChangeType::Created,
        };

        let audit = self
            .audit
            .log_permission_change(NewPermissionAudit {
                changed_by: actor_id,
                role: key.role,
                resource: key.resource.clone(),
                action: key.action.clone(),
                change_type,
                old_value: write.previous.as_ref().map(|p| json!({ "allowed": p.allowed })),
                new_value: Some(json!({ "allowed": write.current.allowed })),
                reason: update.reason,
                ip_address: origin.ip_address.clone(),
                user_agent: origin.user_agent.clone(),
            })
            .await;

        self.clear_all_permission_cache().await;
        info!(
            "Permission {}:{}:{} {} by {} (allowed={})",
            key.role,
            key.resource,
            key.action,
            change_type.as_str(),
            actor_id,
            write.current.allowed
        );

        Ok(PermissionChange {
            permission: write.current,
            change_type,
            audit,
        })
    }

    pub async fn delete_role_permission(
        &self,
        actor_id: Uuid,
        removal: PermissionRemoval,
        origin: &RequestOrigin,
    ) -> Result<PermissionChange, PermissionAdminError> {
        let key = validate_key(removal.role, &removal.resource, removal.action.as_deref())?;
        let removed = self
            .store
            .delete_role_permission(&key)
            .await?
            .ok_or(PermissionAdminError::NotFound)?;

        let audit = self
            .audit
            .log_permission_change(NewPermissionAudit {
                changed_by: actor_id,
                role: key.role,
                resource: key.resource.clone(),
                action: key.action.clone(),
                change_type: PermissionChangeType::Deleted,
                old_value: Some(json!({ "allowed": removed.allowed })),
                new_value: None,
                reason: removal.reason,
                ip_address: origin.ip_address.clone(),
                user_agent: origin.user_agent.clone(),
            })
            .await;

        self.clear_all_permission_cache().await;

        Ok(PermissionChange {
            permission: removed,
            change_type: PermissionChangeType::Deleted,
            audit,
        })
    }
}
