mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{data_id, TestApp};
use ops_console_api::database::models::Role;

#[tokio::test]
async fn units_are_created_with_defaults_and_unique_names() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;

    let (status, body) = app
        .post("/admin/units", &token, json!({ "name": "  Field Ops ", "code": "FOPS" }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], "Field Ops");
    assert_eq!(body["data"]["color"], "#3B82F6");
    assert_eq!(body["data"]["icon"], "users");
    assert_eq!(body["data"]["memberCount"], 0);
    assert_eq!(body["data"]["isActive"], true);
    assert_eq!(body["data"]["activity"]["status"], "recorded");

    let (status, body) = app.post("/admin/units", &token, json!({ "name": "Field Ops" })).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, _) = app
        .post("/admin/units", &token, json!({ "name": "Other", "code": "FOPS" }))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn blank_unit_names_are_rejected() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;

    let (status, body) = app.post("/admin/units", &token, json!({ "name": "   " })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["fieldErrors"]["name"], "Unit name is required");

    let (status, body) = app.post("/admin/units", &token, json!({ "name": 42 })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    Ok(())
}

#[tokio::test]
async fn units_with_members_cannot_be_deleted() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;

    let (_, body) = app.post("/admin/units", &token, json!({ "name": "Dispatch" })).await?;
    let unit_id = data_id(&body)?;

    for email in ["a@example.com", "b@example.com", "c@example.com"] {
        let member = app.user(email, Some(Role::Member)).await;
        let (status, _) = app
            .put_json(
                &format!("/admin/users/{}/role", member.id),
                &token,
                json!({ "role": "member", "unit": "Dispatch" }),
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = app.get(&format!("/admin/units/{}", unit_id), &token).await?;
    assert_eq!(body["data"]["memberCount"], 3);

    let (status, body) = app.delete(&format!("/admin/units/{}", unit_id), &token).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Cannot delete unit with 3 active members");

    let (_, body) = app.get(&format!("/admin/units/{}", unit_id), &token).await?;
    assert_eq!(body["data"]["isActive"], true);
    Ok(())
}

#[tokio::test]
async fn empty_units_are_soft_deleted() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;
    let (_, body) = app.post("/admin/units", &token, json!({ "name": "Archive" })).await?;
    let unit_id = data_id(&body)?;

    let (status, body) = app.delete(&format!("/admin/units/{}", unit_id), &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isActive"], false);

    let (_, body) = app.get("/admin/units", &token).await?;
    assert_eq!(body["data"], json!([]));
    let (_, body) = app.get("/admin/units?includeInactive=true", &token).await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let (status, _) = app.delete(&format!("/admin/units/{}", uuid::Uuid::new_v4()), &token).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn leader_assignment_updates_user_unit_and_history() -> Result<()> {
    let app = TestApp::new();
    let (admin, token) = app.admin().await;
    let (_, body) = app.post("/admin/units", &token, json!({ "name": "Ops" })).await?;
    let unit_id = data_id(&body)?;
    let user = app.user("lead@example.com", Some(Role::Member)).await;

    let (status, body) = app
        .post(
            &format!("/admin/units/{}/leader", unit_id),
            &token,
            json!({ "userId": user.id, "isCoLeader": false }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unit"]["leaderId"], json!(user.id));
    assert_eq!(body["data"]["unit"]["memberCount"], 1);
    assert_eq!(body["data"]["user"]["role"], "leader");
    assert_eq!(body["data"]["user"]["unit"], "Ops");
    assert_eq!(body["data"]["history"]["status"], "recorded");

    let (_, body) = app.get(&format!("/admin/users/{}/role-history", user.id), &token).await?;
    let history = body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["oldRole"], "member");
    assert_eq!(history[0]["newRole"], "leader");
    assert_eq!(history[0]["newUnit"], "Ops");
    assert_eq!(history[0]["changedBy"], json!(admin.id));

    let (status, _) = app
        .post(
            &format!("/admin/units/{}/leader", unit_id),
            &token,
            json!({ "userId": uuid::Uuid::new_v4() }),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn leaders_list_their_own_unit_members() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;
    let (_, body) = app.post("/admin/units", &token, json!({ "name": "North" })).await?;
    let north = data_id(&body)?;
    let (_, body) = app.post("/admin/units", &token, json!({ "name": "South" })).await?;
    let south = data_id(&body)?;

    let lead = app.user("north-lead@example.com", Some(Role::Member)).await;
    app.post(&format!("/admin/units/{}/leader", north), &token, json!({ "userId": lead.id }))
        .await?;
    let lead_token = app.token(&lead);

    let (status, _) = app.get(&format!("/api/units/{}/members", north), &lead_token).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let grant = json!({ "role": "leader", "resource": "/units/members", "action": "view", "allowed": true });
    app.post("/admin/permissions/update", &token, grant).await?;

    let (status, body) = app.get(&format!("/api/units/{}/members", north), &lead_token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["members"].as_array().map(Vec::len), Some(1));

    let (status, _) = app.get(&format!("/api/units/{}/members", south), &lead_token).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get(&format!("/api/units/{}/members", south), &token).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn member_count_can_be_refreshed_explicitly() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;
    let (_, body) = app.post("/admin/units", &token, json!({ "name": "Recount" })).await?;
    let unit_id = data_id(&body)?;

    let mut member = app.user("m@example.com", Some(Role::Member)).await;
    member.unit = Some("Recount".to_string());
    app.put(member).await;

    let (status, body) = app.post(&format!("/admin/units/{}/member-count", unit_id), &token, json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["memberCount"], 1);
    assert_eq!(body["data"]["unitName"], "Recount");
    Ok(())
}

#[tokio::test]
async fn deactivating_through_update_respects_members() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;
    let (_, body) = app.post("/admin/units", &token, json!({ "name": "Dispatch" })).await?;
    let unit_id = data_id(&body)?;

    let member = app.user("d@example.com", Some(Role::Member)).await;
    app.put_json(
        &format!("/admin/users/{}/role", member.id),
        &token,
        json!({ "role": "member", "unit": "Dispatch" }),
    )
    .await?;

    let (status, body) = app
        .put_json(
            &format!("/admin/units/{}", unit_id),
            &token,
            json!({ "isActive": false, "description": "closing" }),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Cannot delete unit with 1 active members");

    let (_, body) = app.get(&format!("/admin/units/{}", unit_id), &token).await?;
    assert_eq!(body["data"]["isActive"], true);
    assert_eq!(body["data"]["memberCount"], 1);
    assert!(body["data"]["description"].is_null());

    app.put_json(
        &format!("/admin/users/{}/role", member.id),
        &token,
        json!({ "role": "member", "unit": null }),
    )
    .await?;
    let (status, body) = app
        .put_json(&format!("/admin/units/{}", unit_id), &token, json!({ "isActive": false }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isActive"], false);
    Ok(())
}

#[tokio::test]
async fn renaming_a_unit_moves_its_members() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;
    let (_, body) = app.post("/admin/units", &token, json!({ "name": "Dispatch" })).await?;
    let unit_id = data_id(&body)?;

    let member = app.user("r@example.com", Some(Role::Member)).await;
    app.put_json(
        &format!("/admin/users/{}/role", member.id),
        &token,
        json!({ "role": "member", "unit": "Dispatch" }),
    )
    .await?;

    let (status, body) = app
        .put_json(&format!("/admin/units/{}", unit_id), &token, json!({ "name": "Dispatch North" }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Dispatch North");
    assert_eq!(body["data"]["memberCount"], 1);

    let (_, body) = app.get(&format!("/admin/users/{}", member.id), &token).await?;
    assert_eq!(body["data"]["unit"], "Dispatch North");

    let (status, _) = app.delete(&format!("/admin/units/{}", unit_id), &token).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn blank_codes_clear_the_unit_code() -> Result<()> {
    let app = TestApp::new();
    let (_, token) = app.admin().await;
    let (_, body) = app
        .post("/admin/units", &token, json!({ "name": "Logistics", "code": "LOG" }))
        .await?;
    let unit_id = data_id(&body)?;

    let (status, body) = app
        .put_json(&format!("/admin/units/{}", unit_id), &token, json!({ "code": "  " }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["code"].is_null());

    let (_, body) = app.post("/admin/units", &token, json!({ "name": "Supply" })).await?;
    let other_id = data_id(&body)?;
    let (status, _) = app
        .put_json(&format!("/admin/units/{}", other_id), &token, json!({ "code": "" }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}
