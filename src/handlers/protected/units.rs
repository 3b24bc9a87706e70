// handlers/protected/units.rs - GET /api/units/:id/members handler

use axum::extract::{Path, State};
use serde::Serialize;
use uuid::Uuid;

use crate::database::models::{Role, Unit, User, UserFilter};
use crate::error::ApiError;
use crate::middleware::{require_role_and_permission, ApiResponse, ApiResult, RequestContext, RoleRequirement};
use crate::state::AppState;

pub const MEMBERS_RESOURCE: &str = "/units/members";
pub const MEMBERS_ACTION: &str = "view";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitMembers {
    pub unit: Unit,
    pub members: Vec<User>,
}

/// Leaders and co-leaders see their own unit; admins see any.
pub async fn list_members(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: RequestContext,
) -> ApiResult<UnitMembers> {
    let requirement = RoleRequirement::any_of(&[Role::Admin, Role::Leader, Role::CoLeader]);
    let caller = require_role_and_permission(&state, &ctx, &requirement, MEMBERS_RESOURCE, MEMBERS_ACTION).await?;

    let unit = state.units.get_unit(id).await?;
    if caller.role != Some(Role::Admin) {
        let leads_unit = unit.leader_id == Some(caller.user_id) || unit.co_leader_id == Some(caller.user_id);
        if !leads_unit {
            return Err(ApiError::forbidden("You can only view members of a unit you lead"));
        }
    }

    let filter = UserFilter {
        unit: Some(unit.name.clone()),
        ..UserFilter::default()
    };
    let members = state
        .store
        .list_users(&filter)
        .await?
        .into_iter()
        .filter(|user| user.counts_as_member_of(&unit.name))
        .collect();

    Ok(ApiResponse::success(UnitMembers { unit, members }))
}
