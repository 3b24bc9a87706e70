use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::config::NotificationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

/// Payload broadcast to every admin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminNotification {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub related_user_id: Option<Uuid>,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
    pub priority: NotificationPriority,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid webhook URL: {0}")]
    InvalidUrl(String),

    #[error("Webhook delivery failed: {0}")]
    Delivery(#[from] reqwest::Error),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_admins(&self, notification: &AdminNotification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify_admins(&self, notification: &AdminNotification) -> Result<(), NotifyError> {
        info!(
            kind = %notification.kind,
            related_user = ?notification.related_user_id,
            "Admin notification: {}: {}",
            notification.title,
            notification.message
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a configured endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let url = Url::parse(url).map_err(|e| NotifyError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(NotifyError::InvalidUrl(format!("unsupported scheme '{}'", url.scheme())));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_admins(&self, notification: &AdminNotification) -> Result<(), NotifyError> {
        self.client
            .post(self.url.clone())
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

pub fn notifier_from_config(config: &NotificationConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match config.webhook_url.as_deref() {
        Some(url) => {
            let notifier = WebhookNotifier::new(url, Duration::from_secs(config.timeout_secs))?;
            info!("Admin notifications delivered to webhook {}", notifier.url.host_str().unwrap_or("?"));
            Ok(Arc::new(notifier))
        }
        None => Ok(Arc::new(TracingNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_type_and_camel_case() {
        let notification = AdminNotification {
            kind: "approval_expiry".to_string(),
            title: "Re-approval required".to_string(),
            message: "m".to_string(),
            related_user_id: Some(Uuid::nil()),
            action_url: Some("/admin/users".to_string()),
            action_label: Some("Review".to_string()),
            priority: NotificationPriority::Normal,
        };
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "approval_expiry");
        assert_eq!(value["relatedUserId"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(value["priority"], "normal");
    }

    #[test]
    fn webhook_urls_are_validated() {
        assert!(WebhookNotifier::new("not a url", Duration::from_secs(1)).is_err());
        assert!(WebhookNotifier::new("ftp://hooks.example.com", Duration::from_secs(1)).is_err());
        assert!(WebhookNotifier::new("https://hooks.example.com/ops", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn config_without_webhook_falls_back_to_tracing() {
        let config = NotificationConfig {
            webhook_url: None,
            timeout_secs: 5,
        };
        assert!(notifier_from_config(&config).is_ok());

        let bad = NotificationConfig {
            webhook_url: Some("::".to_string()),
            timeout_secs: 5,
        };
        assert!(notifier_from_config(&bad).is_err());
    }
}
