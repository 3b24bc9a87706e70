mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;
use ops_console_api::database::models::{Role, UserStatus};

#[tokio::test]
async fn role_changes_clear_cached_decisions_and_are_logged() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;
    let user = app.user("promote@example.com", Some(Role::Member)).await;
    let user_token = app.token(&user);

    let grant = json!({ "role": "leader", "resource": "/tools/dispatch", "allowed": true });
    app.post("/admin/permissions/update", &token, grant).await?;

    let (status, _) = app.get("/api/tools/dispatch", &user_token).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .put_json(
            &format!("/admin/users/{}/role", user.id),
            &token,
            json!({ "role": "leader", "reason": "Took over dispatch" }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["role"], "leader");
    assert_eq!(body["data"]["history"]["status"], "recorded");
    assert_eq!(body["data"]["activity"]["status"], "recorded");

    let (status, _) = app.get("/api/tools/dispatch", &user_token).await?;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("/admin/role-changes?limit=10", &token).await?;
    let changes = body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["reason"], "Took over dispatch");

    let (_, logs) = app
        .get(&format!("/admin/activity-logs?targetType=user&targetId={}", user.id), &token)
        .await?;
    let entries = logs["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "user.change_role");
    assert_eq!(entries[0]["oldValue"]["role"], "member");
    Ok(())
}

#[tokio::test]
async fn users_are_listed_without_sensitive_fields() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;
    let mut secret = app.user("secret@example.com", Some(Role::Member)).await;
    secret.password_hash = Some("$argon2id$v=19$...".to_string());
    secret.mfa_secret = Some("JBSWY3DPEHPK3PXP".to_string());
    app.put(secret).await;

    let (status, body) = app.get("/admin/users", &token).await?;
    assert_eq!(status, StatusCode::OK);
    let users = body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(users.len(), 2);
    for user in &users {
        assert!(user.get("passwordHash").is_none());
        assert!(user.get("mfaSecret").is_none());
        assert!(user.get("mfaBackupCodes").is_none());
    }

    let (_, body) = app.get("/admin/users?role=member", &token).await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let (status, _) = app.get(&format!("/admin/users/{}", uuid::Uuid::new_v4()), &token).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn soft_deleted_users_lose_their_session_and_membership() -> Result<()> {
    let app = TestApp::new();
    let (admin, token) = app.admin().await;
    app.post("/admin/units", &token, json!({ "name": "Ops" })).await?;
    let mut user = app.user("leaving@example.com", Some(Role::Member)).await;
    user.unit = Some("Ops".to_string());
    let user = app.put(user).await;
    let user_token = app.token(&user);

    let (status, body) = app.delete(&format!("/admin/users/{}", user.id), &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "suspended");
    assert_eq!(body["data"]["isActive"], false);
    assert!(body["data"]["deletedAt"].is_string());

    let (status, _) = app.get("/api/me", &user_token).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app.get("/admin/units", &token).await?;
    assert_eq!(body["data"][0]["memberCount"], 0);

    let (status, body) = app.delete(&format!("/admin/users/{}", admin.id), &token).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn approving_a_pending_user_restores_access() -> Result<()> {
    let app = TestApp::new();
    let (admin, token) = app.admin().await;
    let mut pending = app.user("signup@example.com", Some(Role::Member)).await;
    pending.is_approved = false;
    pending.status = UserStatus::Pending;
    pending.approved_at = None;
    let pending = app.put(pending).await;
    let pending_token = app.token(&pending);

    let (status, _) = app.get("/api/tool-access-requests", &pending_token).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(&format!("/admin/users/{}/approve", pending.id), &token, json!({}))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["isApproved"], true);
    assert_eq!(body["data"]["approvedBy"], json!(admin.id));

    let (status, _) = app.get("/api/tool-access-requests", &pending_token).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}
