use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::audit_service::LogWrite;
use super::permission_cache::PermissionCache;
use crate::database::models::{LeaderSlot, NewRoleChange, NewUnit, Role, RoleChange, Unit, UnitPatch, User};
use crate::database::{DatabaseError, LeaderAssignment, Store, UnitDeactivation, UnitUpdate};

#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error("A unit with this name or code already exists")]
    Duplicate,

    #[error("Unit not found: {0}")]
    NotFound(Uuid),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Unit {0} is inactive")]
    Inactive(Uuid),

    #[error("Cannot delete unit with {count} active members")]
    HasMembers { count: i64 },

    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for UnitError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Conflict(_) => UnitError::Duplicate,
            other => UnitError::Database(other),
        }
    }
}

/// A user's role/unit write together with its history outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleChangeOutcome {
    pub user: User,
    pub history: LogWrite,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderChange {
    pub unit: Unit,
    pub user: User,
    pub history: LogWrite,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct UnitService {
    store: Arc<dyn Store>,
    cache: Arc<PermissionCache>,
    default_limit: i64,
}

impl UnitService {
    pub fn new(store: Arc<dyn Store>, cache: Arc<PermissionCache>, default_limit: i64) -> Self {
        Self {
            store,
            cache,
            default_limit,
        }
    }

    pub async fn list_units(&self, include_inactive: bool) -> Result<Vec<Unit>, UnitError> {
        Ok(self.store.list_units(include_inactive).await?)
    }

    pub async fn get_unit(&self, id: Uuid) -> Result<Unit, UnitError> {
        self.store.find_unit(id).await?.ok_or(UnitError::NotFound(id))
    }

    pub async fn create_unit(&self, data: NewUnit) -> Result<Unit, UnitError> {
        let name = data.name.trim().to_string();
        if name.is_empty() {
            return Err(UnitError::Validation {
                field: "name",
                message: "Unit name is required".to_string(),
            });
        }

        let unit = NewUnit {
            name,
            code: non_empty(data.code),
            description: data.description,
            color: non_empty(data.color),
            icon: non_empty(data.icon),
        };
        let created = self.store.insert_unit(unit, Utc::now()).await?;
        info!("Created unit {} ({})", created.name, created.id);
        Ok(created)
    }

    pub async fn update_unit(&self, id: Uuid, patch: UnitPatch) -> Result<Unit, UnitError> {
        let mut patch = patch;
        if let Some(name) = patch.name.as_mut() {
            *name = name.trim().to_string();
            if name.is_empty() {
                return Err(UnitError::Validation {
                    field: "name",
                    message: "Unit name cannot be empty".to_string(),
                });
            }
        }
        patch.code = patch.code.map(|c| c.trim().to_string());

        match self.store.update_unit(id, patch, Utc::now()).await? {
            UnitUpdate::Updated(unit) => {
                info!("Updated unit {} ({})", unit.name, unit.id);
                Ok(unit)
            }
            UnitUpdate::HasMembers { count, .. } => Err(UnitError::HasMembers { count }),
            UnitUpdate::NotFound => Err(UnitError::NotFound(id)),
        }
    }

    /// Soft delete; refused while any active user still belongs to the unit.
    pub async fn delete_unit(&self, id: Uuid) -> Result<Unit, UnitError> {
        match self.store.deactivate_unit_if_empty(id, Utc::now()).await? {
            UnitDeactivation::Deactivated(unit) => {
                info!("Deactivated unit {} ({})", unit.name, unit.id);
                Ok(unit)
            }
            UnitDeactivation::HasMembers { count, .. } => Err(UnitError::HasMembers { count }),
            UnitDeactivation::NotFound => Err(UnitError::NotFound(id)),
        }
    }

    /// Sets the leader (or co-leader) slot and mirrors role and unit onto the user.
    pub async fn assign_unit_leader(
        &self,
        unit_id: Uuid,
        user_id: Uuid,
        is_co_leader: bool,
        changed_by: Option<Uuid>,
    ) -> Result<LeaderChange, UnitError> {
        let slot = LeaderSlot::from_co_leader_flag(is_co_leader);
        let (unit, assignment) = match self.store.assign_unit_leader(unit_id, user_id, slot, Utc::now()).await? {
            LeaderAssignment::Assigned { unit, assignment } => (unit, assignment),
            LeaderAssignment::UnitNotFound => return Err(UnitError::NotFound(unit_id)),
            LeaderAssignment::UnitInactive => return Err(UnitError::Inactive(unit_id)),
            LeaderAssignment::UserNotFound => return Err(UnitError::UserNotFound(user_id)),
        };

        self.cache.clear_user(user_id).await;
        let history = self
            .log_role_change(NewRoleChange {
                user_id,
                changed_by,
                old_role: assignment.previous_role,
                new_role: assignment.user.role,
                old_unit: assignment.previous_unit,
                new_unit: assignment.user.unit.clone(),
                reason: Some(format!("Assigned as {} of {}", slot.role(), unit.name)),
            })
            .await;

        Ok(LeaderChange {
            unit,
            user: assignment.user,
            history,
        })
    }

    /// Explicit recount; membership writes already keep the count current.
    pub async fn update_unit_member_count(&self, unit_name: &str) -> Result<i64, UnitError> {
        Ok(self.store.refresh_member_count(unit_name, Utc::now()).await?)
    }

    pub async fn change_user_role(
        &self,
        user_id: Uuid,
        new_role: Option<Role>,
        new_unit: Option<String>,
        changed_by: Option<Uuid>,
        reason: Option<String>,
    ) -> Result<RoleChangeOutcome, UnitError> {
        let assignment = self
            .store
            .set_user_role(user_id, new_role, non_empty(new_unit), Utc::now())
            .await?
            .ok_or(UnitError::UserNotFound(user_id))?;

        self.cache.clear_user(user_id).await;
        let history = self
            .log_role_change(NewRoleChange {
                user_id,
                changed_by,
                old_role: assignment.previous_role,
                new_role: assignment.user.role,
                old_unit: assignment.previous_unit,
                new_unit: assignment.user.unit.clone(),
                reason,
            })
            .await;

        Ok(RoleChangeOutcome {
            user: assignment.user,
            history,
        })
    }

    pub async fn log_role_change(&self, entry: NewRoleChange) -> LogWrite {
        let user_id = entry.user_id;
        match self.store.insert_role_change(entry, Utc::now()).await {
            Ok(row) => LogWrite::Recorded(row.id),
            Err(e) => {
                error!("Failed to record role change for user {}: {}", user_id, e);
                LogWrite::Failed(e.to_string())
            }
        }
    }

    pub async fn get_user_role_history(&self, user_id: Uuid) -> Result<Vec<RoleChange>, UnitError> {
        Ok(self.store.list_role_changes(Some(user_id), self.default_limit).await?)
    }

    pub async fn get_all_role_changes(&self, limit: Option<i64>) -> Result<Vec<RoleChange>, UnitError> {
        let limit = limit.filter(|l| *l > 0).unwrap_or(self.default_limit);
        Ok(self.store.list_role_changes(None, limit).await?)
    }
}
