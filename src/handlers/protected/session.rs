// handlers/protected/session.rs - Sign-in recording and current user

use axum::extract::State;
use serde::Serialize;

use crate::database::models::User;
use crate::middleware::{record_activity, require_session, ApiResponse, ApiResult, RequestContext};
use crate::services::LogWrite;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignIn {
    pub user: User,
    pub activity: LogWrite,
}

/// POST /api/session/sign-in
///
/// Called by the identity front end once credentials have been verified.
/// Pending users may sign in; approval is enforced per route.
pub async fn sign_in(State(state): State<AppState>, ctx: RequestContext) -> ApiResult<SignIn> {
    let user = require_session(&state, &ctx).await?;
    let activity = state.audit.log_login_event(&user, &ctx.origin()).await;
    record_activity(&state, user.id).await;

    Ok(ApiResponse::success(SignIn { user, activity }))
}

/// GET /api/me
pub async fn me(State(state): State<AppState>, ctx: RequestContext) -> ApiResult<User> {
    let user = require_session(&state, &ctx).await?;
    Ok(ApiResponse::success(user))
}
