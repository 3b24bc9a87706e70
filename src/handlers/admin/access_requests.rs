// handlers/admin/access_requests.rs - Review queue for tool access requests

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{log_activity, Audited};
use crate::database::models::{AccessRequestFilter, ActivityAction, NewAdminActivity, ToolAccessRequest};
use crate::middleware::{ApiResponse, ApiResult, AuthorizedCaller, RequestContext};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReviewNotes {
    pub notes: Option<String>,
}

/// GET /admin/tool-access-requests
pub async fn list_requests(
    State(state): State<AppState>,
    Query(filter): Query<AccessRequestFilter>,
) -> ApiResult<Vec<ToolAccessRequest>> {
    Ok(ApiResponse::success(state.access_requests.list_requests(&filter).await?))
}

/// POST /admin/tool-access-requests/:id/approve
pub async fn approve_request(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    body: Option<Json<ReviewNotes>>,
) -> ApiResult<Audited<ToolAccessRequest>> {
    resolve(state, caller, ctx, id, true, body).await
}

/// POST /admin/tool-access-requests/:id/reject
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    body: Option<Json<ReviewNotes>>,
) -> ApiResult<Audited<ToolAccessRequest>> {
    resolve(state, caller, ctx, id, false, body).await
}

async fn resolve(
    state: AppState,
    caller: AuthorizedCaller,
    ctx: RequestContext,
    id: Uuid,
    approve: bool,
    body: Option<Json<ReviewNotes>>,
) -> ApiResult<Audited<ToolAccessRequest>> {
    let notes = body.and_then(|Json(b)| b.notes);
    let request = state
        .access_requests
        .resolve(id, approve, caller.user_id, notes.clone())
        .await?;

    let action = if approve {
        ActivityAction::AccessRequestApproved
    } else {
        ActivityAction::AccessRequestRejected
    };
    let entry = NewAdminActivity::new(caller.user_id, action)
        .target("tool_access_request", request.id)
        .values(
            Some(json!({ "status": "pending" })),
            Some(json!({ "status": request.status, "toolPath": request.tool_path, "userId": request.user_id })),
        )
        .reason(notes);
    let activity = log_activity(&state, &ctx, entry).await;

    Ok(ApiResponse::success(Audited { data: request, activity }))
}
