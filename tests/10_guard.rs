mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use serde_json::json;

use common::TestApp;
use ops_console_api::database::models::{Role, UserStatus};

#[tokio::test]
async fn health_and_root_are_public() -> Result<()> {
    let app = TestApp::new();

    let (status, body) = app.request(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["database"], "memory");

    let (status, body) = app.request(Method::GET, "/", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    Ok(())
}

#[tokio::test]
async fn admin_routes_require_a_session() -> Result<()> {
    let app = TestApp::new();

    let (status, body) = app.request(Method::GET, "/admin/units", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = app.get("/admin/units", "not-a-jwt").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn pending_users_are_told_to_wait_for_approval() -> Result<()> {
    let app = TestApp::new();
    let mut pending = app.user("pending@example.com", Some(Role::Admin)).await;
    pending.is_approved = false;
    pending.status = UserStatus::Pending;
    let pending = app.put(pending).await;

    let (status, body) = app.get("/admin/units", &app.token(&pending)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Account pending approval");
    Ok(())
}

#[tokio::test]
async fn members_cannot_reach_admin_routes() -> Result<()> {
    let app = TestApp::new();
    let member = app.user("member@example.com", Some(Role::Member)).await;

    let (status, body) = app.get("/admin/units", &app.token(&member)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Insufficient permissions");

    let (admin, token) = app.admin().await;
    let (status, body) = app.get("/admin/units", &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
    assert_ne!(admin.id, member.id);
    Ok(())
}

#[tokio::test]
async fn revoked_sessions_are_rejected() -> Result<()> {
    let app = TestApp::new();
    let (_, admin_token) = app.admin().await;
    let user = app.user("revoked@example.com", Some(Role::Member)).await;
    let old_token = app.token_issued_at(&user, Utc::now() - Duration::minutes(5));

    let (status, _) = app.get("/api/me", &old_token).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.delete(&format!("/admin/users/{}/sessions", user.id), &admin_token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["activity"]["status"], "recorded");

    let (status, body) = app.get("/api/me", &old_token).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Session has been revoked");

    let fresh = app.token_issued_at(&user, Utc::now() + Duration::seconds(1));
    let (status, _) = app.get("/api/me", &fresh).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn tool_pages_follow_role_permissions() -> Result<()> {
    let app = TestApp::new();
    let (_, admin_token) = app.admin().await;
    let leader = app.user("leader@example.com", Some(Role::Leader)).await;
    let token = app.token(&leader);

    let (status, _) = app.get("/api/tools/dispatch", &token).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let grant = json!({ "role": "leader", "resource": "/tools/dispatch", "allowed": true });
    let (status, _) = app.post("/admin/permissions/update", &admin_token, grant).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/api/tools/dispatch", &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["resource"], "/tools/dispatch");
    assert_eq!(body["data"]["caller"]["email"], "leader@example.com");

    let (status, body) = app
        .post("/api/permissions/check", &token, json!({ "resource": "/tools/payroll" }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["allowed"], false);
    assert_eq!(body["data"]["action"], "execute");
    Ok(())
}

#[tokio::test]
async fn store_outages_fail_closed() -> Result<()> {
    let app = TestApp::new();
    let leader = app.user("leader@example.com", Some(Role::Leader)).await;
    let token = app.token(&leader);

    app.store.set_read_failure(true);
    let (status, body) = app.get("/api/tools/dispatch", &token).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    Ok(())
}

#[tokio::test]
async fn sign_in_is_recorded_and_stamps_activity() -> Result<()> {
    let app = TestApp::new();
    let (_, admin_token) = app.admin().await;
    let mut user = app.user("returning@example.com", Some(Role::Member)).await;
    user.last_active_at = Some(Utc::now() - Duration::days(30));
    let user = app.put(user).await;

    let (status, body) = app
        .request(Method::POST, "/api/session/sign-in", Some(&app.token(&user)), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["activity"]["status"], "recorded");
    assert!(body["data"]["user"].get("passwordHash").is_none());

    let (_, body) = app.get(&format!("/admin/users/{}", user.id), &admin_token).await?;
    let seen: chrono::DateTime<Utc> = serde_json::from_value(body["data"]["lastActiveAt"].clone())?;
    assert!(seen > Utc::now() - Duration::minutes(1));

    let (_, logs) = app.get("/admin/activity-logs?action=user.sign_in", &admin_token).await?;
    let entries = logs["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["ipAddress"], "198.51.100.7");
    Ok(())
}
