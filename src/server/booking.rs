use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;

use super::{rejected, Caller};
use crate::actions::{ActionResponse, Actions, GroupOutcome, RecurringOutcome};
use crate::availability::{AvailabilityCheck, CapacityInfo, DayAvailability, TimeSlot};
use crate::error::SalonError;
use crate::models::{
    Appointment, AppointmentDetails, AppointmentService, AppointmentStatus, BookingAnalytics,
    BookingFilters, BookingListItem, BookingRequest, DateRange, GroupBooking, NewWaitingListEntry,
    PaymentUpdate, RecurringSettings, WaitingListEntry, WaitingListFilters,
};

const DEFAULT_SLOT_DURATION: u32 = 60;

pub(super) fn routes() -> Router<Actions> {
    Router::new()
        .route("/api/bookings", post(create_booking))
        .route("/api/bookings/recurring", post(create_recurring))
        .route("/api/bookings/group", post(create_group))
        .route("/api/bookings/:id", get(booking_by_id))
        .route("/api/bookings/:id/services", get(booking_services))
        .route("/api/bookings/:id/status", post(update_status))
        .route("/api/bookings/:id/reschedule", post(reschedule))
        .route("/api/bookings/:id/cancel", post(cancel))
        .route("/api/bookings/:id/notes", post(add_notes))
        .route("/api/bookings/:id/payment", post(update_payment))
        .route("/api/bookings/:id/calendar.ics", get(calendar))
        .route("/api/salons/:salon_id/bookings", get(list_bookings))
        .route("/api/salons/:salon_id/waiting-list", get(waiting_list))
        .route("/api/salons/:salon_id/capacity", get(capacity))
        .route("/api/salons/:salon_id/analytics", get(analytics))
        .route("/api/waiting-list", post(join_waiting_list))
        .route("/api/availability", get(time_slots).post(check_availability))
        .route("/api/staff/:id/calendar", get(availability_calendar))
}

fn date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<DateRange> {
    match (start, end) {
        (Some(start), Some(end)) => Some(DateRange::new(start, end)),
        (Some(day), None) | (None, Some(day)) => Some(DateRange::new(day, day)),
        (None, None) => None,
    }
}

/// Query string of the booking list; `status` is comma separated
#[derive(Debug, Default, Deserialize)]
struct BookingQuery {
    status: Option<String>,
    staff_id: Option<String>,
    customer_id: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    search: Option<String>,
}

impl BookingQuery {
    fn into_filters(self) -> Result<BookingFilters, SalonError> {
        let statuses = self
            .status
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<AppointmentStatus>()
                    .map_err(|e| SalonError::invalid("status", e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BookingFilters {
            statuses,
            staff_id: self.staff_id,
            customer_id: self.customer_id,
            date_range: date_range(self.start, self.end),
            search: self.search,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct WaitingListQuery {
    service_ids: Option<String>,
    staff_id: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct SlotQuery {
    salon_id: String,
    date: NaiveDate,
    duration: Option<u32>,
    staff_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: AppointmentStatus,
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CancelBody {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RescheduleBody {
    date: NaiveDate,
    time: String,
    staff_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotesBody {
    notes: String,
    #[serde(default)]
    internal: bool,
}

#[derive(Debug, Deserialize)]
struct RecurringBody {
    booking: BookingRequest,
    settings: RecurringSettings,
}

#[derive(Debug, Deserialize)]
struct AvailabilityBody {
    staff_id: String,
    date: NaiveDate,
    service_id: String,
    time: Option<String>,
}

async fn create_booking(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Json(request): Json<BookingRequest>,
) -> ActionResponse<Appointment> {
    actions.create_booking(&ctx, request).await
}

async fn create_recurring(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Json(body): Json<RecurringBody>,
) -> ActionResponse<RecurringOutcome> {
    actions
        .create_recurring_bookings(&ctx, body.booking, body.settings)
        .await
}

async fn create_group(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Json(group): Json<GroupBooking>,
) -> ActionResponse<GroupOutcome> {
    actions.create_group_booking(&ctx, group).await
}

async fn booking_by_id(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> ActionResponse<AppointmentDetails> {
    actions.get_booking_by_id(&ctx, &id).await
}

async fn booking_services(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> ActionResponse<Vec<AppointmentService>> {
    actions.get_appointment_services(&ctx, &id).await
}

async fn update_status(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> ActionResponse<Appointment> {
    actions
        .update_booking_status(&ctx, &id, body.status, body.reason)
        .await
}

async fn reschedule(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(body): Json<RescheduleBody>,
) -> ActionResponse<Appointment> {
    actions
        .reschedule_booking(&ctx, &id, body.date, &body.time, body.staff_id)
        .await
}

async fn cancel(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    body: Option<Json<CancelBody>>,
) -> ActionResponse<Appointment> {
    let reason = body.and_then(|Json(b)| b.reason);
    actions.cancel_booking(&ctx, &id, reason).await
}

async fn add_notes(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(body): Json<NotesBody>,
) -> ActionResponse<Appointment> {
    actions
        .add_appointment_notes(&ctx, &id, &body.notes, body.internal)
        .await
}

async fn update_payment(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(update): Json<PaymentUpdate>,
) -> ActionResponse<Appointment> {
    actions.update_payment_status(&ctx, &id, update).await
}

async fn calendar(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Response {
    let response = actions.get_booking_calendar(&ctx, &id).await;
    if !response.success {
        return response.into_response();
    }
    let Some(file) = response.data else {
        return rejected(&SalonError::NotFound(format!("Calendar for appointment {id}")));
    };
    (
        [
            (CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.file_name),
            ),
        ],
        file.content,
    )
        .into_response()
}

async fn list_bookings(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(salon_id): Path<String>,
    Query(query): Query<BookingQuery>,
) -> Response {
    match query.into_filters() {
        Ok(filters) => actions
            .get_bookings(&ctx, &salon_id, filters)
            .await
            .into_response(),
        Err(e) => rejected(&e),
    }
}

async fn waiting_list(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(salon_id): Path<String>,
    Query(query): Query<WaitingListQuery>,
) -> ActionResponse<Vec<WaitingListEntry>> {
    let filters = WaitingListFilters {
        service_ids: query
            .service_ids
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        staff_id: query.staff_id,
        date_range: date_range(query.start, query.end),
    };
    actions.get_waiting_list(&ctx, &salon_id, filters).await
}

async fn join_waiting_list(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Json(entry): Json<NewWaitingListEntry>,
) -> ActionResponse<WaitingListEntry> {
    actions.add_to_waiting_list(&ctx, entry).await
}

async fn capacity(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(salon_id): Path<String>,
    Query(range): Query<RangeQuery>,
) -> ActionResponse<Vec<CapacityInfo>> {
    actions
        .get_capacity_info(&ctx, &salon_id, range.start, range.end)
        .await
}

async fn analytics(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(salon_id): Path<String>,
    Query(range): Query<RangeQuery>,
) -> ActionResponse<BookingAnalytics> {
    actions
        .get_booking_analytics(&ctx, &salon_id, range.start, range.end)
        .await
}

async fn time_slots(
    State(actions): State<Actions>,
    Caller(_ctx): Caller,
    Query(query): Query<SlotQuery>,
) -> ActionResponse<Vec<TimeSlot>> {
    actions
        .get_available_time_slots(
            &query.salon_id,
            query.date,
            query.duration.unwrap_or(DEFAULT_SLOT_DURATION),
            query.staff_id,
        )
        .await
}

async fn check_availability(
    State(actions): State<Actions>,
    Caller(_ctx): Caller,
    Json(body): Json<AvailabilityBody>,
) -> ActionResponse<AvailabilityCheck> {
    actions
        .check_availability(&body.staff_id, body.date, &body.service_id, body.time)
        .await
}

async fn availability_calendar(
    State(actions): State<Actions>,
    Caller(_ctx): Caller,
    Path(staff_id): Path<String>,
    Query(range): Query<RangeQuery>,
) -> ActionResponse<BTreeMap<NaiveDate, DayAvailability>> {
    actions
        .get_availability_calendar(&staff_id, range.start, range.end)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_query_splits_statuses() {
        let query = BookingQuery {
            status: Some("pending, confirmed".into()),
            start: NaiveDate::from_ymd_opt(2026, 10, 1),
            ..BookingQuery::default()
        };
        let filters = query.into_filters().expect("filters");
        assert_eq!(
            filters.statuses,
            vec![AppointmentStatus::Pending, AppointmentStatus::Confirmed]
        );
        let range = filters.date_range.expect("range");
        assert_eq!(range.start, range.end);
    }

    #[test]
    fn test_booking_query_rejects_unknown_status() {
        let query = BookingQuery {
            status: Some("lost".into()),
            ..BookingQuery::default()
        };
        let err = query.into_filters().expect_err("unknown status");
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
