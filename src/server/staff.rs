use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use super::Caller;
use crate::actions::{ActionResponse, Actions};
use crate::models::{
    BlockedTime, BulkResult, NewBlockedTime, NewStaffProfile, NewStaffSchedule, Service,
    StaffFilters, StaffProfile, StaffProfileUpdate, StaffSchedule,
};

pub(super) fn routes() -> Router<Actions> {
    Router::new()
        .route("/api/staff", post(create_staff))
        .route(
            "/api/staff/:id",
            get(staff_by_id).patch(update_staff).delete(delete_staff),
        )
        .route("/api/staff/:id/toggle-bookable", post(toggle_bookable))
        .route("/api/staff/:id/toggle-featured", post(toggle_featured))
        .route("/api/staff/:id/commission", put(update_commission))
        .route("/api/staff/:id/schedules", get(schedules).put(upsert_schedule))
        .route(
            "/api/staff/:id/schedules/:schedule_id",
            delete(delete_schedule),
        )
        .route("/api/staff/:id/services", get(staff_services))
        .route(
            "/api/staff/:id/services/:service_id",
            post(assign_service).delete(unassign_service),
        )
        .route(
            "/api/staff/:id/blocked-times",
            get(blocked_times).post(create_blocked_time),
        )
        .route("/api/blocked-times/:id", delete(remove_blocked_time))
        .route("/api/salons/:salon_id/staff", get(list_staff))
        .route("/api/salons/:salon_id/staff/bulk", post(bulk))
        .route(
            "/api/salons/:salon_id/services/:service_id/staff",
            get(bookable_for_service),
        )
}

#[derive(Debug, Deserialize)]
struct CommissionBody {
    rate: f64,
}

/// Schedule body; the staff member comes from the path
#[derive(Debug, Deserialize)]
struct ScheduleBody {
    day_of_week: u8,
    start_time: String,
    end_time: String,
    break_start: Option<String>,
    break_end: Option<String>,
    #[serde(default = "working_default")]
    is_working: bool,
}

const fn working_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct BlockedTimeBody {
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BulkAction {
    Activate,
    Deactivate,
    Delete,
    Commission,
}

#[derive(Debug, Deserialize)]
struct BulkBody {
    action: BulkAction,
    staff_ids: Vec<String>,
    commission_rate: Option<f64>,
}

async fn create_staff(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Json(profile): Json<NewStaffProfile>,
) -> ActionResponse<StaffProfile> {
    actions.create_staff(&ctx, profile).await
}

async fn staff_by_id(
    State(actions): State<Actions>,
    Path(id): Path<String>,
) -> ActionResponse<StaffProfile> {
    actions.get_staff_by_id(&id).await
}

async fn update_staff(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(update): Json<StaffProfileUpdate>,
) -> ActionResponse<StaffProfile> {
    actions.update_staff(&ctx, &id, update).await
}

async fn delete_staff(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> ActionResponse<StaffProfile> {
    actions.delete_staff(&ctx, &id).await
}

async fn toggle_bookable(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> ActionResponse<StaffProfile> {
    actions.toggle_bookable(&ctx, &id).await
}

async fn toggle_featured(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> ActionResponse<StaffProfile> {
    actions.toggle_featured(&ctx, &id).await
}

async fn update_commission(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(body): Json<CommissionBody>,
) -> ActionResponse<StaffProfile> {
    actions.update_commission(&ctx, &id, body.rate).await
}

async fn schedules(
    State(actions): State<Actions>,
    Path(id): Path<String>,
) -> ActionResponse<Vec<StaffSchedule>> {
    actions.get_schedules(&id).await
}

async fn upsert_schedule(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(body): Json<ScheduleBody>,
) -> ActionResponse<StaffSchedule> {
    let schedule = NewStaffSchedule {
        staff_id: id,
        day_of_week: body.day_of_week,
        start_time: body.start_time,
        end_time: body.end_time,
        break_start: body.break_start,
        break_end: body.break_end,
        is_working: body.is_working,
    };
    actions.upsert_schedule(&ctx, schedule).await
}

async fn delete_schedule(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path((id, schedule_id)): Path<(String, String)>,
) -> ActionResponse<bool> {
    actions.delete_schedule(&ctx, &id, &schedule_id).await
}

async fn staff_services(
    State(actions): State<Actions>,
    Path(id): Path<String>,
) -> ActionResponse<Vec<Service>> {
    actions.get_staff_services(&id).await
}

async fn assign_service(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path((id, service_id)): Path<(String, String)>,
) -> ActionResponse<bool> {
    actions.assign_service(&ctx, &id, &service_id).await
}

async fn unassign_service(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path((id, service_id)): Path<(String, String)>,
) -> ActionResponse<bool> {
    actions.unassign_service(&ctx, &id, &service_id).await
}

async fn blocked_times(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Query(range): Query<RangeQuery>,
) -> ActionResponse<Vec<BlockedTime>> {
    actions
        .get_blocked_times(&ctx, &id, range.start, range.end)
        .await
}

async fn create_blocked_time(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(body): Json<BlockedTimeBody>,
) -> ActionResponse<BlockedTime> {
    let blocked = NewBlockedTime {
        staff_id: id,
        start_time: body.start_time,
        end_time: body.end_time,
        reason: body.reason,
    };
    actions.create_blocked_time(&ctx, blocked).await
}

async fn remove_blocked_time(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> ActionResponse<bool> {
    actions.remove_blocked_time(&ctx, &id).await
}

async fn list_staff(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(salon_id): Path<String>,
    Query(filters): Query<StaffFilters>,
) -> ActionResponse<Vec<StaffProfile>> {
    actions.get_staff_members(&ctx, &salon_id, filters).await
}

async fn bookable_for_service(
    State(actions): State<Actions>,
    Path((salon_id, service_id)): Path<(String, String)>,
) -> ActionResponse<Vec<StaffProfile>> {
    actions
        .get_bookable_staff_for_service(&salon_id, &service_id)
        .await
}

async fn bulk(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(salon_id): Path<String>,
    Json(body): Json<BulkBody>,
) -> ActionResponse<BulkResult> {
    let ids = body.staff_ids;
    match body.action {
        BulkAction::Activate => actions.bulk_activate(&ctx, &salon_id, ids).await,
        BulkAction::Deactivate => actions.bulk_deactivate(&ctx, &salon_id, ids).await,
        BulkAction::Delete => actions.bulk_delete(&ctx, &salon_id, ids).await,
        BulkAction::Commission => {
            let rate = body.commission_rate.unwrap_or(f64::NAN);
            actions
                .bulk_update_commission(&ctx, &salon_id, ids, rate)
                .await
        }
    }
}
