use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::database::models::{AccessRequestFilter, AccessRequestStatus, NewAccessRequest, ToolAccessRequest};
use crate::database::{AccessRequestResolution, DatabaseError, Store};

const MAX_TOOL_PATH_LEN: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum AccessRequestError {
    #[error("{0}")]
    InvalidToolPath(String),

    #[error("A pending request for this tool already exists")]
    Duplicate,

    #[error("Access request not found: {0}")]
    NotFound(Uuid),

    #[error("Access request is already {0}")]
    AlreadyResolved(AccessRequestStatus),

    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for AccessRequestError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Conflict(_) => AccessRequestError::Duplicate,
            other => AccessRequestError::Database(other),
        }
    }
}

pub fn validate_tool_path(raw: &str) -> Result<String, AccessRequestError> {
    let path = raw.trim();
    if !path.starts_with('/') || path.len() < 2 {
        return Err(AccessRequestError::InvalidToolPath(
            "Tool path must start with '/' and name a tool".to_string(),
        ));
    }
    if path.chars().any(char::is_whitespace) {
        return Err(AccessRequestError::InvalidToolPath(
            "Tool path cannot contain whitespace".to_string(),
        ));
    }
    if path.len() > MAX_TOOL_PATH_LEN {
        return Err(AccessRequestError::InvalidToolPath(format!(
            "Tool path cannot exceed {} characters",
            MAX_TOOL_PATH_LEN
        )));
    }
    Ok(path.to_string())
}

#[derive(Clone)]
pub struct AccessRequestService {
    store: Arc<dyn Store>,
    default_limit: i64,
}

impl AccessRequestService {
    pub fn new(store: Arc<dyn Store>, default_limit: i64) -> Self {
        Self { store, default_limit }
    }

    pub async fn create_request(
        &self,
        user_id: Uuid,
        tool_path: &str,
        justification: Option<String>,
    ) -> Result<ToolAccessRequest, AccessRequestError> {
        let request = NewAccessRequest {
            user_id,
            tool_path: validate_tool_path(tool_path)?,
            justification: justification.map(|j| j.trim().to_string()).filter(|j| !j.is_empty()),
        };
        let created = self.store.insert_access_request(request, Utc::now()).await?;
        info!("User {} requested access to {}", user_id, created.tool_path);
        Ok(created)
    }

    pub async fn list_requests(&self, filter: &AccessRequestFilter) -> Result<Vec<ToolAccessRequest>, AccessRequestError> {
        let limit = filter.limit.filter(|l| *l > 0).unwrap_or(self.default_limit);
        Ok(self.store.list_access_requests(filter, limit).await?)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ToolAccessRequest>, AccessRequestError> {
        self.list_requests(&AccessRequestFilter {
            user_id: Some(user_id),
            ..AccessRequestFilter::default()
        })
        .await
    }

    /// Terminal requests are never reopened or re-decided.
    pub async fn resolve(
        &self,
        id: Uuid,
        approve: bool,
        reviewer: Uuid,
        notes: Option<String>,
    ) -> Result<ToolAccessRequest, AccessRequestError> {
        let status = if approve {
            AccessRequestStatus::Approved
        } else {
            AccessRequestStatus::Rejected
        };

        match self
            .store
            .resolve_access_request(id, status, reviewer, notes, Utc::now())
            .await?
        {
            AccessRequestResolution::Resolved(request) => {
                info!("Access request {} {} by {}", id, request.status, reviewer);
                Ok(request)
            }
            AccessRequestResolution::AlreadyResolved(request) => Err(AccessRequestError::AlreadyResolved(request.status)),
            AccessRequestResolution::NotFound => Err(AccessRequestError::NotFound(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_store;

    #[test]
    fn tool_paths_are_validated() {
        assert_eq!(validate_tool_path(" /tools/dispatch ").unwrap(), "/tools/dispatch");
        assert!(validate_tool_path("tools/dispatch").is_err());
        assert!(validate_tool_path("/").is_err());
        assert!(validate_tool_path("/tools/with space").is_err());
        assert!(validate_tool_path(&format!("/{}", "a".repeat(MAX_TOOL_PATH_LEN))).is_err());
    }

    #[tokio::test]
    async fn requests_resolve_once() {
        let service = AccessRequestService::new(memory_store(), 100);
        let user = Uuid::new_v4();
        let reviewer = Uuid::new_v4();

        let request = service.create_request(user, "/tools/dispatch", None).await.unwrap();
        assert!(matches!(
            service.create_request(user, "/tools/dispatch", None).await,
            Err(AccessRequestError::Duplicate)
        ));

        let approved = service
            .resolve(request.id, true, reviewer, Some("ok".to_string()))
            .await
            .unwrap();
        assert_eq!(approved.status, AccessRequestStatus::Approved);
        assert_eq!(approved.reviewed_by, Some(reviewer));

        assert!(matches!(
            service.resolve(request.id, false, reviewer, None).await,
            Err(AccessRequestError::AlreadyResolved(AccessRequestStatus::Approved))
        ));
        assert!(matches!(
            service.resolve(Uuid::new_v4(), true, reviewer, None).await,
            Err(AccessRequestError::NotFound(_))
        ));
        assert_eq!(service.list_for_user(user).await.unwrap().len(), 1);
    }
}
