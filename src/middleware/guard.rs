use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use super::request_context::RequestContext;
use crate::auth::decode_jwt;
use crate::database::models::{Role, User};
use crate::error::ApiError;
use crate::services::{Decision, DenyReason};
use crate::state::AppState;

/// Caller that passed a guard; injected into admin requests as an extension.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedCaller {
    pub user_id: Uuid,
    pub email: String,
    pub role: Option<Role>,
}

impl From<&User> for AuthorizedCaller {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Roles a route accepts. An empty list only requires an approved session.
#[derive(Debug, Clone)]
pub struct RoleRequirement {
    pub roles: Vec<Role>,
    pub log_unauthorized: bool,
}

impl RoleRequirement {
    pub fn any_of(roles: &[Role]) -> Self {
        Self {
            roles: roles.to_vec(),
            log_unauthorized: true,
        }
    }

    pub fn admin() -> Self {
        Self::any_of(&[Role::Admin])
    }

    pub fn approved() -> Self {
        Self::any_of(&[])
    }

    pub fn quiet(mut self) -> Self {
        self.log_unauthorized = false;
        self
    }

    fn admits(&self, role: Option<Role>) -> bool {
        self.roles.is_empty() || role.is_some_and(|r| self.roles.contains(&r))
    }

    fn describe(&self) -> String {
        self.roles.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
    }
}

/// Bearer token → claims → current user row. 401 on anything unresolvable.
pub async fn require_session(state: &AppState, ctx: &RequestContext) -> Result<User, ApiError> {
    let token = ctx
        .bearer
        .as_deref()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let claims = decode_jwt(&state.config.security, token)?;

    let user = state
        .store
        .find_user(claims.sub)
        .await
        .map_err(|e| {
            error!("Session lookup failed for {}: {}", claims.sub, e);
            ApiError::internal_server_error("Session could not be resolved")
        })?
        .filter(|user| !user.is_deleted())
        .ok_or_else(|| ApiError::unauthorized("Session is no longer valid"))?;

    if claims.issued_before(user.sessions_revoked_at) {
        return Err(ApiError::unauthorized("Session has been revoked"));
    }

    Ok(user)
}

async fn session_or_log(state: &AppState, ctx: &RequestContext, log_unauthorized: bool) -> Result<User, ApiError> {
    require_session(state, ctx).await.map_err(|err| {
        if log_unauthorized && err.status_code() == 401 {
            warn!("Unauthenticated request to {} from {}", ctx.path, ctx.ip_or_unknown());
        }
        err
    })
}

fn ensure_approved(user: &User) -> Result<(), ApiError> {
    if user.is_approved {
        Ok(())
    } else {
        Err(ApiError::forbidden("Account pending approval"))
    }
}

pub async fn require_role(
    state: &AppState,
    ctx: &RequestContext,
    requirement: &RoleRequirement,
) -> Result<AuthorizedCaller, ApiError> {
    let user = role_checked_user(state, ctx, requirement).await?;
    Ok(AuthorizedCaller::from(&user))
}

async fn role_checked_user(
    state: &AppState,
    ctx: &RequestContext,
    requirement: &RoleRequirement,
) -> Result<User, ApiError> {
    let user = session_or_log(state, ctx, requirement.log_unauthorized).await?;
    ensure_approved(&user)?;

    if !requirement.admits(user.role) {
        if requirement.log_unauthorized {
            warn!(
                path = %ctx.path,
                ip = %ctx.ip_or_unknown(),
                email = %user.email,
                "Role check failed: role {} not in [{}]",
                user.role.map(|r| r.as_str()).unwrap_or("none"),
                requirement.describe()
            );
        }
        return Err(ApiError::forbidden("Insufficient permissions"));
    }

    Ok(user)
}

pub async fn require_permission(
    state: &AppState,
    ctx: &RequestContext,
    resource: &str,
    action: &str,
) -> Result<AuthorizedCaller, ApiError> {
    let user = session_or_log(state, ctx, true).await?;
    ensure_approved(&user)?;
    authorize(state, ctx, &user, resource, action).await?;
    Ok(AuthorizedCaller::from(&user))
}

/// Role check first, then the evaluator; stops at the first failure.
pub async fn require_role_and_permission(
    state: &AppState,
    ctx: &RequestContext,
    requirement: &RoleRequirement,
    resource: &str,
    action: &str,
) -> Result<AuthorizedCaller, ApiError> {
    let user = role_checked_user(state, ctx, requirement).await?;
    authorize(state, ctx, &user, resource, action).await?;
    Ok(AuthorizedCaller::from(&user))
}

async fn authorize(state: &AppState, ctx: &RequestContext, user: &User, resource: &str, action: &str) -> Result<(), ApiError> {
    match state.permissions.decide(user.id, resource, action).await {
        Decision::Allowed(_) => Ok(()),
        Decision::Denied(DenyReason::LookupFailed) => {
            Err(ApiError::internal_server_error("Permission check could not be completed"))
        }
        denied => {
            warn!(
                path = %ctx.path,
                ip = %ctx.ip_or_unknown(),
                email = %user.email,
                "Permission denied for {}:{}: {}",
                resource,
                action,
                denied.reason()
            );
            Err(ApiError::forbidden("Insufficient permissions"))
        }
    }
}

/// Applied to every `/admin/*` route.
pub async fn require_admin(
    State(state): State<AppState>,
    ctx: RequestContext,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let logged = state.config.security.log_unauthorized;
    let requirement = if logged {
        RoleRequirement::admin()
    } else {
        RoleRequirement::admin().quiet()
    };

    let caller = require_role(&state, &ctx, &requirement).await?;
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// Touches `last_active_at` for the approval sweep; failures only log.
pub async fn record_activity(state: &AppState, user_id: Uuid) {
    if let Err(e) = state.store.record_user_activity(user_id, Utc::now()).await {
        warn!("Failed to record activity for {}: {}", user_id, e);
    }
}
