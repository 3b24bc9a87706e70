// handlers/admin/users.rs - User lifecycle administration
//
// Every mutation drops the subject's cached permission decisions and writes
// an activity entry. Role changes additionally land in the role history.

use axum::extract::{rejection::JsonRejection, Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{log_activity, Audited};
use crate::database::models::{ActivityAction, NewAdminActivity, Role, RoleChange, User, UserFilter};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthorizedCaller, RequestContext};
use crate::services::RoleChangeOutcome;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBody {
    pub role: Option<Role>,
    pub unit: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

fn user_activity(caller: &AuthorizedCaller, action: ActivityAction, user_id: Uuid) -> NewAdminActivity {
    NewAdminActivity::new(caller.user_id, action).target("user", user_id)
}

async fn load_user(state: &AppState, id: Uuid) -> Result<User, ApiError> {
    state
        .store
        .find_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User not found: {}", id)))
}

/// GET /admin/users
pub async fn list_users(State(state): State<AppState>, Query(filter): Query<UserFilter>) -> ApiResult<Vec<User>> {
    Ok(ApiResponse::success(state.store.list_users(&filter).await?))
}

/// GET /admin/users/:id
pub async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<User> {
    Ok(ApiResponse::success(load_user(&state, id).await?))
}

/// PUT /admin/users/:id/role
pub async fn change_role(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    payload: Result<Json<RoleBody>, JsonRejection>,
) -> ApiResult<Audited<RoleChangeOutcome>> {
    let Json(body) = payload?;
    let before = load_user(&state, id).await?;

    let outcome = state
        .units
        .change_user_role(id, body.role, body.unit, Some(caller.user_id), body.reason.clone())
        .await?;

    let entry = user_activity(&caller, ActivityAction::UserRoleChanged, id)
        .values(
            Some(json!({ "role": before.role, "unit": before.unit })),
            Some(json!({ "role": outcome.user.role, "unit": outcome.user.unit })),
        )
        .reason(body.reason);
    let activity = log_activity(&state, &ctx, entry).await;
    Ok(ApiResponse::success(Audited { data: outcome, activity }))
}

/// POST /admin/users/:id/approve
pub async fn approve_user(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Audited<User>> {
    let before = load_user(&state, id).await?;
    let user = state.approvals.restore_approval(id, caller.user_id).await?;

    let entry = user_activity(&caller, ActivityAction::UserApproved, id).values(
        Some(json!({ "status": before.status, "isApproved": before.is_approved })),
        Some(json!({ "status": user.status, "isApproved": user.is_approved })),
    );
    let activity = log_activity(&state, &ctx, entry).await;
    Ok(ApiResponse::success(Audited { data: user, activity }))
}

/// DELETE /admin/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Audited<User>> {
    if id == caller.user_id {
        return Err(ApiError::bad_request("Administrators cannot delete their own account"));
    }

    let user = state
        .store
        .soft_delete_user(id, chrono::Utc::now())
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User not found: {}", id)))?;
    state.permissions.clear_permission_cache(id).await;

    let entry = user_activity(&caller, ActivityAction::UserDeleted, id)
        .values(None, Some(json!({ "status": user.status, "deletedAt": user.deleted_at })));
    let activity = log_activity(&state, &ctx, entry).await;
    Ok(ApiResponse::success(Audited { data: user, activity }))
}

/// DELETE /admin/users/:id/sessions
pub async fn revoke_sessions(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Audited<User>> {
    let user = state
        .store
        .revoke_user_sessions(id, chrono::Utc::now())
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User not found: {}", id)))?;
    state.permissions.clear_permission_cache(id).await;

    let entry = user_activity(&caller, ActivityAction::UserSessionsRevoked, id)
        .values(None, Some(json!({ "sessionsRevokedAt": user.sessions_revoked_at })));
    let activity = log_activity(&state, &ctx, entry).await;
    Ok(ApiResponse::success(Audited { data: user, activity }))
}

/// GET /admin/users/:id/role-history
pub async fn role_history(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Vec<RoleChange>> {
    load_user(&state, id).await?;
    Ok(ApiResponse::success(state.units.get_user_role_history(id).await?))
}

/// GET /admin/role-changes
pub async fn role_changes(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> ApiResult<Vec<RoleChange>> {
    Ok(ApiResponse::success(state.units.get_all_role_changes(query.limit).await?))
}
