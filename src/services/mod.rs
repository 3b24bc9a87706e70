pub mod access_request_service;
pub mod approval_service;
pub mod audit_service;
pub mod notification;
pub mod permission_cache;
pub mod permission_service;
pub mod unit_service;

pub use access_request_service::{AccessRequestError, AccessRequestService};
pub use approval_service::{ApprovalError, ApprovalService, ExpirySummary};
pub use audit_service::{AuditLogger, LogWrite, RequestOrigin};
pub use notification::{
    notifier_from_config, AdminNotification, NotificationPriority, Notifier, NotifyError, TracingNotifier, WebhookNotifier,
};
pub use permission_cache::{CacheKey, PermissionCache};
pub use permission_service::{
    AllowReason, Decision, DenyReason, PermissionAdminError, PermissionChange, PermissionEvaluator,
    PermissionRemoval, PermissionUpdate,
};
pub use unit_service::{LeaderChange, RoleChangeOutcome, UnitError, UnitService};
