#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use ops_console_api::auth::generate_jwt;
use ops_console_api::config::AppConfig;
use ops_console_api::database::models::{Role, User, UserStatus};
use ops_console_api::database::MemoryStore;
use ops_console_api::services::{AdminNotification, Notifier, NotifyError};
use ops_console_api::{app, AppState};

/// Captures admin notifications instead of delivering them.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<AdminNotification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<AdminNotification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_admins(&self, notification: &AdminNotification) -> Result<(), NotifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
        Ok(())
    }
}

/// Router over an in-memory store, driven with `oneshot` requests.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::new(AppConfig::development(), store.clone(), notifier.clone());
        let router = app(state.clone());

        Self {
            state,
            store,
            notifier,
            router,
        }
    }

    /// Approved, active user created a year ago and seen just now.
    pub async fn user(&self, email: &str, role: Option<Role>) -> User {
        let now = Utc::now();
        let created = now - Duration::days(365);
        self.store
            .put_user(User {
                id: Uuid::new_v4(),
                email: email.to_string(),
                first_name: None,
                last_name: None,
                role,
                unit: None,
                status: UserStatus::Active,
                is_approved: true,
                is_active: true,
                last_active_at: Some(now),
                approved_at: Some(created),
                approved_by: None,
                sessions_revoked_at: None,
                created_at: created,
                updated_at: now,
                deleted_at: None,
                password_hash: None,
                mfa_secret: None,
                mfa_backup_codes: None,
            })
            .await
    }

    pub async fn put(&self, user: User) -> User {
        self.store.put_user(user).await
    }

    pub async fn admin(&self) -> (User, String) {
        let admin = self.user("admin@example.com", Some(Role::Admin)).await;
        let token = self.token(&admin);
        (admin, token)
    }

    pub fn token(&self, user: &User) -> String {
        self.token_issued_at(user, Utc::now())
    }

    pub fn token_issued_at(&self, user: &User, issued_at: DateTime<Utc>) -> String {
        generate_jwt(&self.state.config.security, user, issued_at).expect("token")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "198.51.100.7")
            .header("user-agent", "integration-tests");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await.context("router failed")?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).with_context(|| format!("non-JSON body for {}", uri))?
        };
        Ok((status, value))
    }

    pub async fn get(&self, uri: &str, token: &str) -> Result<(StatusCode, Value)> {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put_json(&self, uri: &str, token: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Result<(StatusCode, Value)> {
        self.request(Method::DELETE, uri, Some(token), None).await
    }
}

/// Parses `data.id` out of a success envelope.
pub fn data_id(body: &Value) -> Result<Uuid> {
    let raw = body["data"]["id"].as_str().context("missing data.id")?;
    Ok(raw.parse()?)
}
