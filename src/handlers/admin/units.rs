// handlers/admin/units.rs - Unit CRUD, leader assignment and member recount

use axum::extract::{rejection::JsonRejection, Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::{log_activity, Audited};
use crate::database::models::{ActivityAction, NewAdminActivity, NewUnit, Unit, UnitPatch};
use crate::middleware::{ApiResponse, ApiResult, AuthorizedCaller, RequestContext};
use crate::services::LeaderChange;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitListQuery {
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderBody {
    pub user_id: Uuid,
    #[serde(default)]
    pub is_co_leader: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberCount {
    pub unit_id: Uuid,
    pub unit_name: String,
    pub member_count: i64,
}

fn unit_activity(caller: &AuthorizedCaller, action: ActivityAction, unit: &Unit) -> NewAdminActivity {
    NewAdminActivity::new(caller.user_id, action).target("unit", unit.id)
}

/// GET /admin/units
pub async fn list_units(State(state): State<AppState>, Query(query): Query<UnitListQuery>) -> ApiResult<Vec<Unit>> {
    let units = state.units.list_units(query.include_inactive.unwrap_or(false)).await?;
    Ok(ApiResponse::success(units))
}

/// POST /admin/units
pub async fn create_unit(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    payload: Result<Json<NewUnit>, JsonRejection>,
) -> ApiResult<Audited<Unit>> {
    let Json(body) = payload?;
    let unit = state.units.create_unit(body).await?;

    let entry = unit_activity(&caller, ActivityAction::UnitCreated, &unit).values(None, Some(json!(unit)));
    let activity = log_activity(&state, &ctx, entry).await;
    Ok(ApiResponse::created(Audited { data: unit, activity }))
}

/// GET /admin/units/:id
pub async fn get_unit(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Unit> {
    Ok(ApiResponse::success(state.units.get_unit(id).await?))
}

/// PUT /admin/units/:id
pub async fn update_unit(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    payload: Result<Json<UnitPatch>, JsonRejection>,
) -> ApiResult<Audited<Unit>> {
    let Json(patch) = payload?;
    let before = state.units.get_unit(id).await?;
    let unit = state.units.update_unit(id, patch).await?;

    let entry =
        unit_activity(&caller, ActivityAction::UnitUpdated, &unit).values(Some(json!(before)), Some(json!(unit)));
    let activity = log_activity(&state, &ctx, entry).await;
    Ok(ApiResponse::success(Audited { data: unit, activity }))
}

/// DELETE /admin/units/:id
pub async fn delete_unit(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Audited<Unit>> {
    let unit = state.units.delete_unit(id).await?;

    let entry = unit_activity(&caller, ActivityAction::UnitDeleted, &unit)
        .values(Some(json!({ "isActive": true })), Some(json!({ "isActive": false })));
    let activity = log_activity(&state, &ctx, entry).await;
    Ok(ApiResponse::success(Audited { data: unit, activity }))
}

/// POST /admin/units/:id/leader
pub async fn assign_leader(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    payload: Result<Json<LeaderBody>, JsonRejection>,
) -> ApiResult<Audited<LeaderChange>> {
    let Json(body) = payload?;
    let change = state
        .units
        .assign_unit_leader(id, body.user_id, body.is_co_leader, Some(caller.user_id))
        .await?;

    let entry = unit_activity(&caller, ActivityAction::UnitLeaderAssigned, &change.unit).values(
        None,
        Some(json!({
            "userId": change.user.id,
            "role": change.user.role,
            "isCoLeader": body.is_co_leader,
        })),
    );
    let activity = log_activity(&state, &ctx, entry).await;
    Ok(ApiResponse::success(Audited { data: change, activity }))
}

/// POST /admin/units/:id/member-count
pub async fn refresh_member_count(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthorizedCaller>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Audited<MemberCount>> {
    let unit = state.units.get_unit(id).await?;
    let member_count = state.units.update_unit_member_count(&unit.name).await?;

    let entry = unit_activity(&caller, ActivityAction::UnitMemberCountRefreshed, &unit)
        .values(Some(json!(unit.member_count)), Some(json!(member_count)));
    let activity = log_activity(&state, &ctx, entry).await;
    Ok(ApiResponse::success(Audited {
        data: MemberCount {
            unit_id: unit.id,
            unit_name: unit.name,
            member_count,
        },
        activity,
    }))
}
