use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::Store;
use crate::services::{
    AccessRequestService, ApprovalService, AuditLogger, Notifier, PermissionCache, PermissionEvaluator, UnitService,
};

/// Shared handles passed to every handler. One permission cache per state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub permissions: PermissionEvaluator,
    pub units: UnitService,
    pub audit: AuditLogger,
    pub approvals: ApprovalService,
    pub access_requests: AccessRequestService,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        let page_size = config.audit.default_page_size;
        let cache = Arc::new(PermissionCache::new(config.permissions.cache_ttl()));
        let audit = AuditLogger::new(store.clone(), page_size);

        Self {
            permissions: PermissionEvaluator::new(store.clone(), cache.clone(), audit.clone()),
            units: UnitService::new(store.clone(), cache.clone(), page_size),
            approvals: ApprovalService::new(store.clone(), cache, notifier, config.approval.clone()),
            access_requests: AccessRequestService::new(store.clone(), page_size),
            audit,
            store,
            config: Arc::new(config),
        }
    }

    pub fn permission_cache(&self) -> &Arc<PermissionCache> {
        self.permissions.cache()
    }
}
