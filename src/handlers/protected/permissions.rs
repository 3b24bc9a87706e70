// handlers/protected/permissions.rs - POST /api/permissions/check handler

use axum::extract::{rejection::JsonRejection, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::database::models::DEFAULT_ACTION;
use crate::middleware::{require_role, ApiResponse, ApiResult, RequestContext, RoleRequirement};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub resource: String,
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub resource: String,
    pub action: String,
    pub allowed: bool,
}

/// Lets the UI ask whether the caller may use a resource before linking to it.
pub async fn check_own_permission(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> ApiResult<CheckResult> {
    let caller = require_role(&state, &ctx, &RoleRequirement::approved()).await?;
    let Json(body) = payload?;
    let action = body.action.unwrap_or_else(|| DEFAULT_ACTION.to_string());

    let allowed = state
        .permissions
        .check_permission(caller.user_id, &body.resource, &action)
        .await;

    Ok(ApiResponse::success(CheckResult {
        resource: body.resource,
        action,
        allowed,
    }))
}
