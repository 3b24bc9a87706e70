// handlers/admin/approvals.rs - Approval expiry review and manual sweep

use axum::extract::State;
use axum::Extension;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use super::{log_activity, Audited};
use crate::database::models::{ActivityAction, NewAdminActivity, User};
use crate::middleware::{ApiResponse, ApiResult, AuthorizedCaller, RequestContext};
use crate::services::ExpirySummary;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiringApprovals {
    pub inactivity_days: i64,
    pub cutoff: DateTime<Utc>,
    pub users: Vec<User>,
}

/// GET /admin/approvals/expiring
pub async fn list_expiring(State(state): State<AppState>) -> ApiResult<ExpiringApprovals> {
    let now = Utc::now();
    let users = state.approvals.find_users_needing_reapproval_as_of(now).await?;

    Ok(ApiResponse::success(ExpiringApprovals {
        inactivity_days: state.config.approval.inactivity_days,
        cutoff: state.approvals.inactivity_cutoff(now),
        users,
    }))
}

/// POST /admin/approvals/expiry-sweep
pub async fn run_sweep(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
) -> ApiResult<Audited<ExpirySummary>> {
    let summary = state.approvals.process_approval_expiry().await?;

    let entry = NewAdminActivity::new(caller.user_id, ActivityAction::ApprovalSweepRun)
        .values(None, Some(json!(summary)));
    let activity = log_activity(&state, &ctx, entry).await;
    Ok(ApiResponse::success(Audited { data: summary, activity }))
}
