// handlers/admin/permissions.rs - Role permission administration
//
// Writes go through the evaluator so every change lands in the permission
// audit trail and invalidates cached decisions.

use axum::extract::{rejection::JsonRejection, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::{log_activity, Audited};
use crate::database::models::{
    ActivityAction, NewAdminActivity, PermissionAudit, PermissionAuditFilter, Role, RolePermission, DEFAULT_ACTION,
};
use crate::middleware::{ApiResponse, ApiResult, AuthorizedCaller, RequestContext};
use crate::services::{PermissionChange, PermissionRemoval, PermissionUpdate};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RoleQuery {
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckQuery {
    pub user_id: Uuid,
    pub resource: String,
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub user_id: Uuid,
    pub resource: String,
    pub action: String,
    pub allowed: bool,
    pub reason: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheCleared {
    pub user_id: Option<Uuid>,
    pub cleared: usize,
}

/// GET /admin/permissions
pub async fn list_permissions(
    State(state): State<AppState>,
    Query(query): Query<RoleQuery>,
) -> ApiResult<Vec<RolePermission>> {
    let permissions = state.permissions.list_role_permissions(query.role).await?;
    Ok(ApiResponse::success(permissions))
}

/// POST /admin/permissions/update
pub async fn update_permission(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    payload: Result<Json<PermissionUpdate>, JsonRejection>,
) -> ApiResult<PermissionChange> {
    let Json(update) = payload?;
    let change = state
        .permissions
        .update_role_permission(caller.user_id, update, &ctx.origin())
        .await?;
    Ok(ApiResponse::success(change))
}

/// POST /admin/permissions/delete
pub async fn delete_permission(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    payload: Result<Json<PermissionRemoval>, JsonRejection>,
) -> ApiResult<PermissionChange> {
    let Json(removal) = payload?;
    let change = state
        .permissions
        .delete_role_permission(caller.user_id, removal, &ctx.origin())
        .await?;
    Ok(ApiResponse::success(change))
}

/// GET /admin/permissions/audit-trail
pub async fn audit_trail(
    State(state): State<AppState>,
    Query(filter): Query<PermissionAuditFilter>,
) -> ApiResult<Vec<PermissionAudit>> {
    let entries = state.audit.get_permission_audit_trail(&filter).await?;
    Ok(ApiResponse::success(entries))
}

/// GET /admin/permissions/check
///
/// Bypasses the cache so admins see the decision a fresh request would get.
pub async fn check_permission(State(state): State<AppState>, Query(query): Query<CheckQuery>) -> ApiResult<CheckOutcome> {
    let action = query.action.unwrap_or_else(|| DEFAULT_ACTION.to_string());
    let decision = state
        .permissions
        .has_permission(query.user_id, &query.resource, &action)
        .await;

    Ok(ApiResponse::success(CheckOutcome {
        user_id: query.user_id,
        resource: query.resource,
        action,
        allowed: decision.is_allowed(),
        reason: decision.reason(),
    }))
}

/// DELETE /admin/permissions/cache
pub async fn clear_cache(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    Query(query): Query<CacheQuery>,
) -> ApiResult<Audited<CacheCleared>> {
    let cleared = match query.user_id {
        Some(user_id) => state.permission_cache().clear_user(user_id).await,
        None => state.permissions.clear_all_permission_cache().await,
    };

    let mut entry = NewAdminActivity::new(caller.user_id, ActivityAction::PermissionCacheCleared)
        .values(None, Some(json!({ "cleared": cleared })));
    if let Some(user_id) = query.user_id {
        entry = entry.target("user", user_id);
    }
    let activity = log_activity(&state, &ctx, entry).await;

    Ok(ApiResponse::success(Audited {
        data: CacheCleared {
            user_id: query.user_id,
            cleared,
        },
        activity,
    }))
}
