// handlers/protected/access_requests.rs - Caller's own tool access requests

use axum::extract::{rejection::JsonRejection, State};
use axum::Json;
use serde::Deserialize;

use crate::database::models::ToolAccessRequest;
use crate::middleware::{require_role, ApiResponse, ApiResult, RequestContext, RoleRequirement};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequestBody {
    pub tool_path: String,
    pub justification: Option<String>,
}

/// POST /api/tool-access-requests
pub async fn create_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<AccessRequestBody>, JsonRejection>,
) -> ApiResult<ToolAccessRequest> {
    let caller = require_role(&state, &ctx, &RoleRequirement::approved()).await?;
    let Json(body) = payload?;

    let request = state
        .access_requests
        .create_request(caller.user_id, &body.tool_path, body.justification)
        .await?;
    Ok(ApiResponse::created(request))
}

/// GET /api/tool-access-requests
pub async fn list_own_requests(State(state): State<AppState>, ctx: RequestContext) -> ApiResult<Vec<ToolAccessRequest>> {
    let caller = require_role(&state, &ctx, &RoleRequirement::approved()).await?;
    let requests = state.access_requests.list_for_user(caller.user_id).await?;
    Ok(ApiResponse::success(requests))
}
