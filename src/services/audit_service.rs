use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::database::models::{
    ActivityAction, ActivityFilter, AdminActivity, NewAdminActivity, NewPermissionAudit, PermissionAudit,
    PermissionAuditFilter, User,
};
use crate::database::{DatabaseError, Store};

/// Outcome of a best-effort log write. The mutation it describes has already
/// committed either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum LogWrite {
    Recorded(Uuid),
    Failed(String),
}

impl LogWrite {
    pub fn is_recorded(&self) -> bool {
        matches!(self, LogWrite::Recorded(_))
    }
}

/// Where an audited request came from.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn Store>,
    default_limit: i64,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn Store>, default_limit: i64) -> Self {
        Self { store, default_limit }
    }

    pub async fn log_admin_activity(&self, entry: NewAdminActivity) -> LogWrite {
        let admin_id = entry.admin_id;
        let action = entry.action;
        match self.store.insert_admin_activity(entry, Utc::now()).await {
            Ok(row) => LogWrite::Recorded(row.id),
            Err(e) => {
                error!("Failed to record admin activity {} by {}: {}", action, admin_id, e);
                LogWrite::Failed(e.to_string())
            }
        }
    }

    pub async fn log_permission_change(&self, entry: NewPermissionAudit) -> LogWrite {
        let subject = format!("{}:{}:{}", entry.role, entry.resource, entry.action);
        match self.store.insert_permission_audit(entry, Utc::now()).await {
            Ok(row) => LogWrite::Recorded(row.id),
            Err(e) => {
                error!("Failed to record permission audit for {}: {}", subject, e);
                LogWrite::Failed(e.to_string())
            }
        }
    }

    /// Sign-ins are logged with the user as their own actor.
    pub async fn log_login_event(&self, user: &User, origin: &RequestOrigin) -> LogWrite {
        let entry = NewAdminActivity::new(user.id, ActivityAction::UserSignIn)
            .target("user", user.id)
            .values(None, Some(json!({ "email": user.email })))
            .origin(origin.ip_address.clone(), origin.user_agent.clone());
        self.log_admin_activity(entry).await
    }

    pub async fn get_admin_activity_logs(&self, filter: &ActivityFilter) -> Result<Vec<AdminActivity>, DatabaseError> {
        self.store.list_admin_activity(filter, self.limit(filter.limit)).await
    }

    pub async fn get_permission_audit_trail(
        &self,
        filter: &PermissionAuditFilter,
    ) -> Result<Vec<PermissionAudit>, DatabaseError> {
        self.store.list_permission_audit(filter, self.limit(filter.limit)).await
    }

    /// Caller-supplied limits are honoured as-is; only absent or non-positive
    /// values fall back to the default page size.
    pub fn limit(&self, requested: Option<i64>) -> i64 {
        requested.filter(|limit| *limit > 0).unwrap_or(self.default_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::testing::user_fixture;

    fn logger(store: Arc<MemoryStore>) -> AuditLogger {
        AuditLogger::new(store, 100)
    }

    #[tokio::test]
    async fn activity_is_listed_newest_first_with_filters() {
        let store = Arc::new(MemoryStore::new());
        let audit = logger(store.clone());
        let admin = Uuid::new_v4();
        let other = Uuid::new_v4();

        audit
            .log_admin_activity(NewAdminActivity::new(admin, ActivityAction::UnitCreated).target("unit", "u1"))
            .await;
        audit
            .log_admin_activity(NewAdminActivity::new(admin, ActivityAction::UnitDeleted).target("unit", "u1"))
            .await;
        audit
            .log_admin_activity(NewAdminActivity::new(other, ActivityAction::UnitCreated).target("unit", "u2"))
            .await;

        let mine = audit
            .get_admin_activity_logs(&ActivityFilter {
                admin_id: Some(admin),
                ..ActivityFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine[0].created_at >= mine[1].created_at);

        let created = audit
            .get_admin_activity_logs(&ActivityFilter {
                action: Some("unit.create".to_string()),
                ..ActivityFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
    }

    #[tokio::test]
    async fn login_events_are_tagged_sign_in() {
        let store = Arc::new(MemoryStore::new());
        let audit = logger(store.clone());
        let user = user_fixture("login@example.com");
        let origin = RequestOrigin {
            ip_address: Some("10.0.0.7".to_string()),
            user_agent: Some("curl/8".to_string()),
        };

        assert!(audit.log_login_event(&user, &origin).await.is_recorded());
        let rows = audit.get_admin_activity_logs(&ActivityFilter::default()).await.unwrap();
        assert_eq!(rows[0].action, "user.sign_in");
        assert_eq!(rows[0].ip_address.as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn limit_defaults_to_page_size() {
        let audit = logger(Arc::new(MemoryStore::new()));
        assert_eq!(audit.limit(None), 100);
        assert_eq!(audit.limit(Some(0)), 100);
        assert_eq!(audit.limit(Some(5000)), 5000);
    }
}
