use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::{middleware::from_fn_with_state, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::config::SecurityConfig;
use crate::handlers::{admin, protected, public};
use crate::middleware::require_admin;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.security);

    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        // Session and permission-gated API
        .merge(api_routes())
        // Admin surface, role admin required
        .nest("/admin", admin_routes(state.clone()))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<AppState> {
    use protected::{access_requests, permissions, session, tools, units};

    Router::new()
        .route("/api/session/sign-in", post(session::sign_in))
        .route("/api/me", get(session::me))
        .route("/api/tools/*path", get(tools::open_tool))
        .route("/api/permissions/check", post(permissions::check_own_permission))
        .route("/api/units/:id/members", get(units::list_members))
        .route(
            "/api/tool-access-requests",
            get(access_requests::list_own_requests).post(access_requests::create_request),
        )
}

fn admin_routes(state: AppState) -> Router<AppState> {
    use admin::{access_requests, activity, approvals, permissions, units, users};

    Router::new()
        // Units
        .route("/units", get(units::list_units).post(units::create_unit))
        .route(
            "/units/:id",
            get(units::get_unit).put(units::update_unit).delete(units::delete_unit),
        )
        .route("/units/:id/leader", post(units::assign_leader))
        .route("/units/:id/member-count", post(units::refresh_member_count))
        // Permissions
        .route("/permissions", get(permissions::list_permissions))
        .route("/permissions/update", post(permissions::update_permission))
        .route("/permissions/delete", post(permissions::delete_permission))
        .route("/permissions/audit-trail", get(permissions::audit_trail))
        .route("/permissions/check", get(permissions::check_permission))
        .route("/permissions/cache", delete(permissions::clear_cache))
        // Activity
        .route("/activity-logs", get(activity::list_activity))
        // Users
        .route("/users", get(users::list_users))
        .route("/users/:id", get(users::get_user).delete(users::delete_user))
        .route("/users/:id/role", axum::routing::put(users::change_role))
        .route("/users/:id/approve", post(users::approve_user))
        .route("/users/:id/sessions", delete(users::revoke_sessions))
        .route("/users/:id/role-history", get(users::role_history))
        .route("/role-changes", get(users::role_changes))
        // Approvals
        .route("/approvals/expiring", get(approvals::list_expiring))
        .route("/approvals/expiry-sweep", post(approvals::run_sweep))
        // Tool access requests
        .route("/tool-access-requests", get(access_requests::list_requests))
        .route("/tool-access-requests/:id/approve", post(access_requests::approve_request))
        .route("/tool-access-requests/:id/reject", post(access_requests::reject_request))
        .route_layer(from_fn_with_state(state, require_admin))
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if !security.enable_cors {
        return CorsLayer::new();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}
