// handlers/public/root.rs - GET / handler

use axum::response::Json;
use serde_json::{json, Value};

pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Operations Console API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Role/permission authorization, unit administration and audit trail",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "session": "/api/session/sign-in, /api/me (session)",
                "tools": "/api/tools/*path (permission on /tools/<path>)",
                "permissions": "/api/permissions/check (approved)",
                "units": "/api/units/:id/members (leader, co-leader or admin)",
                "access_requests": "/api/tool-access-requests (approved)",
                "admin": "/admin/* (admin role)",
            }
        }
    }))
}
