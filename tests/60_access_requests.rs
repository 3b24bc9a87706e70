mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{data_id, TestApp};
use ops_console_api::database::models::Role;

#[tokio::test]
async fn requests_are_validated_and_deduplicated() -> Result<()> {
    let app = TestApp::new();
    let user = app.user("asker@example.com", Some(Role::Member)).await;
    let token = app.token(&user);

    let (status, body) = app
        .post("/api/tool-access-requests", &token, json!({ "toolPath": "tools/dispatch" }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fieldErrors"]["toolPath"].is_string());

    let body = json!({ "toolPath": "/tools/dispatch", "justification": "Covering nights" });
    let (status, created) = app.post("/api/tool-access-requests", &token, body.clone()).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["status"], "pending");
    assert_eq!(created["data"]["justification"], "Covering nights");

    let (status, _) = app.post("/api/tool-access-requests", &token, body).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, own) = app.get("/api/tool-access-requests", &token).await?;
    assert_eq!(own["data"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn admins_resolve_requests_exactly_once() -> Result<()> {
    let app = TestApp::new();
    let (admin, admin_token) = app.admin().await;
    let user = app.user("asker@example.com", Some(Role::Member)).await;
    let token = app.token(&user);

    let (_, created) = app
        .post("/api/tool-access-requests", &token, json!({ "toolPath": "/tools/payroll" }))
        .await?;
    let id = data_id(&created)?;

    let (_, pending) = app.get("/admin/tool-access-requests?status=pending", &admin_token).await?;
    assert_eq!(pending["data"].as_array().map(Vec::len), Some(1));

    let (status, body) = app
        .post(
            &format!("/admin/tool-access-requests/{}/reject", id),
            &admin_token,
            json!({ "notes": "Finance only" }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "rejected");
    assert_eq!(body["data"]["reviewNotes"], "Finance only");
    assert_eq!(body["data"]["reviewedBy"], json!(admin.id));
    assert_eq!(body["data"]["activity"]["status"], "recorded");

    let (status, _) = app
        .post(&format!("/admin/tool-access-requests/{}/approve", id), &admin_token, json!({}))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post(
            &format!("/admin/tool-access-requests/{}/approve", uuid::Uuid::new_v4()),
            &admin_token,
            json!({}),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A rejected request no longer blocks a new one for the same path.
    let (status, _) = app
        .post("/api/tool-access-requests", &token, json!({ "toolPath": "/tools/payroll" }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(())
}
