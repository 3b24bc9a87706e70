mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;
use ops_console_api::database::models::Role;

#[tokio::test]
async fn permission_changes_are_audited_and_invalidate_decisions() -> Result<()> {
    let app = TestApp::new();
    let (admin, token) = app.admin().await;
    let leader = app.user("leader@example.com", Some(Role::Leader)).await;
    let leader_token = app.token(&leader);

    let grant = json!({
        "role": "leader",
        "resource": "/tools/reports",
        "allowed": true,
        "description": "Weekly reports",
        "reason": "Leads own reporting"
    });
    let (status, body) = app.post("/admin/permissions/update", &token, grant).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["changeType"], "created");
    assert_eq!(body["data"]["permission"]["action"], "execute");
    assert_eq!(body["data"]["audit"]["status"], "recorded");

    let (status, _) = app.get("/api/tools/reports", &leader_token).await?;
    assert_eq!(status, StatusCode::OK);

    let revoke = json!({ "role": "leader", "resource": "/tools/reports", "allowed": false });
    let (_, body) = app.post("/admin/permissions/update", &token, revoke).await?;
    assert_eq!(body["data"]["changeType"], "updated");

    // The cached allow must not survive the policy change.
    let (status, _) = app.get("/api/tools/reports", &leader_token).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app.get("/admin/permissions/audit-trail?role=leader", &token).await?;
    let trail = body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0]["changeType"], "updated");
    assert_eq!(trail[0]["oldValue"], json!({ "allowed": true }));
    assert_eq!(trail[0]["newValue"], json!({ "allowed": false }));
    assert_eq!(trail[0]["changedBy"], json!(admin.id));
    assert_eq!(trail[0]["ipAddress"], "198.51.100.7");
    assert_eq!(trail[1]["reason"], "Leads own reporting");
    Ok(())
}

#[tokio::test]
async fn invalid_permission_updates_report_field_errors() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;

    let bad = json!({ "role": "admin", "resource": "tools/reports", "allowed": true });
    let (status, body) = app.post("/admin/permissions/update", &token, bad).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["fieldErrors"]["role"].is_string());
    assert!(body["fieldErrors"]["resource"].is_string());

    let missing = json!({ "role": "member", "resource": "/tools/none" });
    let (status, _) = app.post("/admin/permissions/delete", &token, missing).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn deleting_a_permission_falls_back_to_no_policy() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;
    let member = app.user("member@example.com", Some(Role::Member)).await;

    let grant = json!({ "role": "member", "resource": "/tools/roster", "allowed": true });
    app.post("/admin/permissions/update", &token, grant).await?;

    let check = format!("/admin/permissions/check?userId={}&resource=/tools/roster", member.id);
    let (_, body) = app.get(&check, &token).await?;
    assert_eq!(body["data"]["allowed"], true);
    assert_eq!(body["data"]["reason"], "Permission granted by role policy");

    let removal = json!({ "role": "member", "resource": "/tools/roster", "reason": "Roster retired" });
    let (status, body) = app.post("/admin/permissions/delete", &token, removal).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["changeType"], "deleted");

    let (_, body) = app.get(&check, &token).await?;
    assert_eq!(body["data"]["allowed"], false);
    assert_eq!(body["data"]["reason"], "No permission policy defined for this role");

    let (_, body) = app.get("/admin/permissions?role=member", &token).await?;
    assert_eq!(body["data"], json!([]));
    Ok(())
}

#[tokio::test]
async fn cache_can_be_cleared_per_user_or_globally() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;
    let member = app.user("member@example.com", Some(Role::Member)).await;
    let member_token = app.token(&member);

    app.get("/api/tools/a", &member_token).await?;
    app.get("/api/tools/b", &member_token).await?;
    assert_eq!(app.state.permission_cache().len().await, 2);

    let (status, body) = app
        .delete(&format!("/admin/permissions/cache?userId={}", member.id), &token)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleared"], 2);
    assert!(app.state.permission_cache().is_empty().await);

    app.get("/api/tools/a", &member_token).await?;
    let (_, body) = app.delete("/admin/permissions/cache", &token).await?;
    assert_eq!(body["data"]["cleared"], 1);
    assert_eq!(body["data"]["activity"]["status"], "recorded");
    Ok(())
}
