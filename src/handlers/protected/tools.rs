// handlers/protected/tools.rs - GET /api/tools/*path handler

use axum::extract::{Path, State};
use serde::Serialize;

use crate::database::models::DEFAULT_ACTION;
use crate::middleware::{record_activity, require_permission, ApiResponse, ApiResult, AuthorizedCaller, RequestContext};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAccess {
    pub resource: String,
    pub action: &'static str,
    pub caller: AuthorizedCaller,
}

pub fn tool_resource(path: &str) -> String {
    format!("/tools/{}", path.trim_matches('/'))
}

/// Entry point for every tool page: the caller needs `execute` on
/// `/tools/<path>`.
pub async fn open_tool(
    State(state): State<AppState>,
    Path(path): Path<String>,
    ctx: RequestContext,
) -> ApiResult<ToolAccess> {
    let resource = tool_resource(&path);
    let caller = require_permission(&state, &ctx, &resource, DEFAULT_ACTION).await?;
    record_activity(&state, caller.user_id).await;

    Ok(ApiResponse::success(ToolAccess {
        resource,
        action: DEFAULT_ACTION,
        caller,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_paths_map_onto_resources() {
        assert_eq!(tool_resource("dispatch"), "/tools/dispatch");
        assert_eq!(tool_resource("/reports/weekly/"), "/tools/reports/weekly");
    }
}
