// handlers/admin/mod.rs - Administrative endpoints under /admin
//
// Mounted behind `require_admin`, so every handler here can read the
// `AuthorizedCaller` extension. Mutations record an activity entry after the
// change has committed and return its outcome alongside the payload.

use serde::Serialize;

use crate::database::models::NewAdminActivity;
use crate::middleware::RequestContext;
use crate::services::LogWrite;
use crate::state::AppState;

pub mod access_requests; // /admin/tool-access-requests
pub mod activity; // GET /admin/activity-logs
pub mod approvals; // /admin/approvals/*
pub mod permissions; // /admin/permissions/*
pub mod units; // /admin/units
pub mod users; // /admin/users, /admin/role-changes

/// Payload of an audited mutation.
#[derive(Debug, Serialize)]
pub struct Audited<T: Serialize> {
    #[serde(flatten)]
    pub data: T,
    pub activity: LogWrite,
}

/// Stamps the request origin onto an entry and writes it.
pub(crate) async fn log_activity(state: &AppState, ctx: &RequestContext, entry: NewAdminActivity) -> LogWrite {
    let origin = ctx.origin();
    state
        .audit
        .log_admin_activity(entry.origin(origin.ip_address, origin.user_agent))
        .await
}
