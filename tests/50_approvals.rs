mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;

use common::TestApp;
use ops_console_api::database::models::{Role, UserStatus};
use ops_console_api::database::UserStore;

#[tokio::test]
async fn sweep_moves_idle_users_to_pending_and_notifies_admins() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;

    let mut idle = app.user("idle@example.com", Some(Role::Member)).await;
    idle.last_active_at = Some(Utc::now() - Duration::days(91));
    let idle = app.put(idle).await;

    let mut recent = app.user("recent@example.com", Some(Role::Member)).await;
    recent.last_active_at = Some(Utc::now() - Duration::days(89));
    let recent = app.put(recent).await;

    let (status, body) = app.get("/admin/approvals/expiring", &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["inactivityDays"], 90);
    let due = body["data"]["users"].as_array().cloned().unwrap_or_default();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0]["email"], "idle@example.com");

    let (status, body) = app.post("/admin/approvals/expiry-sweep", &token, json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["processed"], 1);
    assert_eq!(body["data"]["errors"], 0);
    assert_eq!(body["data"]["activity"]["status"], "recorded");

    let idle = app.store.find_user(idle.id).await?.expect("idle user");
    assert_eq!(idle.status, UserStatus::Pending);
    assert!(idle.is_approved);
    let recent = app.store.find_user(recent.id).await?.expect("recent user");
    assert_eq!(recent.status, UserStatus::Active);

    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].related_user_id, Some(idle.id));
    assert_eq!(sent[0].action_url.as_deref(), Some("/admin/users?status=pending"));

    // Already-pending users are not picked up again.
    let (_, body) = app.post("/admin/approvals/expiry-sweep", &token, json!({})).await?;
    assert_eq!(body["data"]["processed"], 0);
    assert_eq!(app.notifier.sent().len(), 1);
    Ok(())
}

#[tokio::test]
async fn pending_after_expiry_keeps_route_access_but_loses_tools() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;
    let grant = json!({ "role": "member", "resource": "/tools/roster", "allowed": true });
    app.post("/admin/permissions/update", &token, grant).await?;

    let mut idle = app.user("idle@example.com", Some(Role::Member)).await;
    idle.last_active_at = Some(Utc::now() - Duration::days(120));
    let idle = app.put(idle).await;
    let idle_token = app.token(&idle);

    let check = format!("/admin/permissions/check?userId={}&resource=/tools/roster", idle.id);
    let (_, body) = app.get(&check, &token).await?;
    assert_eq!(body["data"]["allowed"], true);

    app.post("/admin/approvals/expiry-sweep", &token, json!({})).await?;

    // isApproved stays set, so approved-only routes still answer.
    let (status, _) = app.get("/api/tool-access-requests", &idle_token).await?;
    assert_eq!(status, StatusCode::OK);
    // The evaluator requires status=active and its cache was cleared.
    let (status, _) = app.get("/api/tools/roster", &idle_token).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.post(&format!("/admin/users/{}/approve", idle.id), &token, json!({})).await?;
    let (status, _) = app.get("/api/tools/roster", &idle_token).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}
