use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

pub const DEFAULT_UNIT_COLOR: &str = "#3B82F6";
pub const DEFAULT_UNIT_ICON: &str = "users";

/// Organizational grouping. `member_count` counts active users whose free-text
/// `unit` equals `name`; the store recomputes it with every membership write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    pub color: String,
    pub icon: String,
    pub leader_id: Option<Uuid>,
    pub co_leader_id: Option<Uuid>,
    pub is_active: bool,
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUnit {
    #[serde(default)]
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// Partial update; `None` leaves a column untouched and an empty `code`
/// clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitPatch {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeaderSlot {
    Leader,
    CoLeader,
}

impl LeaderSlot {
    pub fn from_co_leader_flag(is_co_leader: bool) -> Self {
        if is_co_leader {
            LeaderSlot::CoLeader
        } else {
            LeaderSlot::Leader
        }
    }

    /// Role mirrored onto the user row.
    pub fn role(&self) -> Role {
        match self {
            LeaderSlot::Leader => Role::Leader,
            LeaderSlot::CoLeader => Role::CoLeader,
        }
    }
}
