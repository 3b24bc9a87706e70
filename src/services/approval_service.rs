use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::notification::{AdminNotification, NotificationPriority, Notifier};
use super::permission_cache::PermissionCache;
use crate::config::ApprovalConfig;
use crate::database::models::User;
use crate::database::{DatabaseError, Store};

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpirySummary {
    pub processed: usize,
    pub errors: usize,
}

/// Demotes long-idle approved users back to pending and restores them on review.
#[derive(Clone)]
pub struct ApprovalService {
    store: Arc<dyn Store>,
    cache: Arc<PermissionCache>,
    notifier: Arc<dyn Notifier>,
    config: ApprovalConfig,
}

impl ApprovalService {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<PermissionCache>,
        notifier: Arc<dyn Notifier>,
        config: ApprovalConfig,
    ) -> Self {
        Self {
            store,
            cache,
            notifier,
            config,
        }
    }

    pub fn inactivity_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.config.inactivity_days)
    }

    pub async fn find_users_needing_reapproval(&self) -> Result<Vec<User>, ApprovalError> {
        self.find_users_needing_reapproval_as_of(Utc::now()).await
    }

    pub async fn find_users_needing_reapproval_as_of(&self, now: DateTime<Utc>) -> Result<Vec<User>, ApprovalError> {
        Ok(self.store.find_inactive_approved_users(self.inactivity_cutoff(now)).await?)
    }

    /// Moves the user to `pending`. `is_approved` stays set so the user keeps
    /// working while an admin reviews the account.
    pub async fn require_reapproval(&self, user_id: Uuid, reason: &str) -> Result<User, ApprovalError> {
        let user = self
            .store
            .mark_user_pending(user_id, Utc::now())
            .await?
            .ok_or(ApprovalError::UserNotFound(user_id))?;

        self.cache.clear_user(user_id).await;
        info!("User {} requires re-approval: {}", user.email, reason);

        let notification = AdminNotification {
            kind: "approval_expiry".to_string(),
            title: "User requires re-approval".to_string(),
            message: format!("{} ({}): {}", user.display_name(), user.email, reason),
            related_user_id: Some(user.id),
            action_url: Some(self.config.review_url.clone()),
            action_label: Some("Review user".to_string()),
            priority: NotificationPriority::Normal,
        };
        if let Err(e) = self.notifier.notify_admins(&notification).await {
            warn!("Failed to notify admins about user {}: {}", user.id, e);
        }

        Ok(user)
    }

    pub async fn process_approval_expiry(&self) -> Result<ExpirySummary, ApprovalError> {
        self.process_approval_expiry_as_of(Utc::now()).await
    }

    /// One failing user never stops the rest of the batch.
    pub async fn process_approval_expiry_as_of(&self, now: DateTime<Utc>) -> Result<ExpirySummary, ApprovalError> {
        let candidates = self.find_users_needing_reapproval_as_of(now).await?;
        let reason = format!("No activity for more than {} days", self.config.inactivity_days);
        let mut summary = ExpirySummary::default();

        for user in candidates {
            match self.require_reapproval(user.id, &reason).await {
                Ok(_) => summary.processed += 1,
                Err(e) => {
                    error!("Approval expiry failed for user {}: {}", user.id, e);
                    summary.errors += 1;
                }
            }
        }

        info!(
            "Approval expiry sweep finished: processed={}, errors={}",
            summary.processed, summary.errors
        );
        Ok(summary)
    }

    pub async fn restore_approval(&self, user_id: Uuid, admin_id: Uuid) -> Result<User, ApprovalError> {
        let user = self
            .store
            .approve_user(user_id, admin_id, Utc::now())
            .await?
            .ok_or(ApprovalError::UserNotFound(user_id))?;

        self.cache.clear_user(user_id).await;
        info!("User {} approved by {}", user.email, admin_id);
        Ok(user)
    }
}
