use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::{Role, User, UserStatus};
use crate::database::MemoryStore;

/// Approved, active user without a role, created a year ago and seen just now.
pub fn user_fixture(email: &str) -> User {
    let now = Utc::now();
    let created = now - Duration::days(365);
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        first_name: None,
        last_name: None,
        role: None,
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
    }
}

pub fn user_with_role(email: &str, role: Role) -> User {
    User {
        role: Some(role),
        ..user_fixture(email)
    }
}

/// Same as `user_fixture` but last seen `days` ago.
pub fn idle_user(email: &str, days: i64) -> User {
    User {
        last_active_at: Some(Utc::now() - Duration::days(days)),
        ..user_with_role(email, Role::Member)
    }
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}
