// handlers/admin/activity.rs - GET /admin/activity-logs handler

use axum::extract::{Query, State};

use crate::database::models::{ActivityFilter, AdminActivity};
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

pub async fn list_activity(
    State(state): State<AppState>,
    Query(filter): Query<ActivityFilter>,
) -> ApiResult<Vec<AdminActivity>> {
    let entries = state.audit.get_admin_activity_logs(&filter).await?;
    Ok(ApiResponse::success(entries))
}
