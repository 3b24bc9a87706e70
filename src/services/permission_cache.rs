use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::permission_service::Decision;

/// Cache key rendered as `userId:resource:action`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub user_id: Uuid,
    pub resource: String,
    pub action: String,
}

impl CacheKey {
    pub fn new(user_id: Uuid, resource: &str, action: &str) -> Self {
        Self {
            user_id,
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.user_id, self.resource, self.action)
    }
}

#[derive(Debug, Clone)]
struct CachedDecision {
    decision: Decision,
    inserted_at: Instant,
}

/// Time-boxed decision cache in front of the permission table.
///
/// Entries expire lazily on read; `purge_expired` drops stale entries in bulk
/// and is driven by the server's maintenance loop. Concurrent misses on the
/// same key both evaluate and the last insert wins.
#[derive(Debug)]
pub struct PermissionCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CachedDecision>>,
}

impl PermissionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Decision> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|cached| cached.inserted_at.elapsed() < self.ttl)
            .map(|cached| cached.decision.clone())
    }

    pub async fn insert(&self, key: CacheKey, decision: Decision) {
        let cached = CachedDecision {
            decision,
            inserted_at: Instant::now(),
        };
        self.entries.write().await.insert(key, cached);
    }

    /// Drops every entry belonging to one user.
    pub async fn clear_user(&self, user_id: Uuid) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.user_id != user_id);
        before - entries.len()
    }

    pub async fn clear_all(&self) -> usize {
        let mut entries = self.entries.write().await;
        let cleared = entries.len();
        entries.clear();
        cleared
    }

    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, cached| cached.inserted_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
