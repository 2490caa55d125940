//! Booking actions: creation, lifecycle, rescheduling, payments, recurring
//! and group bookings, the waiting list, and availability queries.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ActionResponse, Actions};
use crate::auth::UserContext;
use crate::availability::{
    blocked_ranges, booked_ranges, capacity_by_day, check_requested_time, day_calendar,
    detect_conflicts, generate_slots, AvailabilityCheck, CapacityInfo, ConflictKind, DayAvailability,
    DaySchedule, Proposal, TimeRange, TimeSlot,
};
use crate::cache::cache_key;
use crate::dal::NewAppointment;
use crate::error::{Result, SalonError};
use crate::feed::BookingUpdateType;
use crate::ics::{appointment_to_ics, ics_file_name};
use crate::models::{
    Appointment, AppointmentDetails, AppointmentService, AppointmentStatus, BookingAnalytics,
    BookingFilters, BookingListItem, BookingRequest, BookingSource, DateRange, GroupBooking,
    NewWaitingListEntry, PaymentUpdate, RecurringFrequency, RecurringSettings, StaffProfile,
    WaitingListEntry, WaitingListFilters,
};
use crate::utils::{at_minutes, confirmation_code, format_minutes, parse_hhmm};
use crate::validation::{FieldCollector, InputValidator};

const BOOKING_PATH: &str = "/booking";
const APPOINTMENTS_PATH: &str = "/dashboard/appointments";
const BILLING_PATH: &str = "/dashboard/billing";
const WAITING_LIST_PATH: &str = "/booking/waiting-list";

fn booking_paths(appointment_id: &str) -> Vec<String> {
    vec![
        BOOKING_PATH.to_string(),
        APPOINTMENTS_PATH.to_string(),
        format!("/booking/{appointment_id}"),
        format!("/booking/confirmation/{appointment_id}"),
    ]
}

fn booking_tags(salon_id: &str) -> Vec<String> {
    vec![format!("bookings-{salon_id}")]
}

/// An occurrence or participant that could not be booked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedBooking {
    /// Occurrence day, or participant email
    pub key: String,
    /// Why it was skipped
    pub error: String,
}

/// Result of `create_recurring_bookings`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringOutcome {
    /// Appointments created, in date order
    pub created: Vec<Appointment>,
    /// Occurrences that failed
    pub skipped: Vec<SkippedBooking>,
}

/// Result of `create_group_booking`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupOutcome {
    /// Appointments created, in participant order
    pub created: Vec<Appointment>,
    /// Participants that were not booked
    pub skipped: Vec<SkippedBooking>,
}

/// Downloadable calendar file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFile {
    /// Suggested file name
    pub file_name: String,
    /// RFC 5545 text
    pub content: String,
}

fn last_day_of_month(first: NaiveDate) -> u32 {
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .map_or(28, |last| last.day())
}

/// Days a recurrence rule produces, starting with `start`.
///
/// Bounded by the rule's occurrence count and end date, each capped at
/// `max_occurrences` and `max_days` after `start`. Monthly rules pinned to a
/// day the month lacks fall on its last day.
#[must_use]
pub fn occurrence_dates(
    start: NaiveDate,
    settings: &RecurringSettings,
    max_occurrences: u32,
    max_days: u32,
) -> Vec<NaiveDate> {
    let limit = settings
        .occurrences
        .unwrap_or(max_occurrences)
        .min(max_occurrences) as usize;
    let horizon = start + Duration::days(i64::from(max_days));
    let last = settings.end_date.map_or(horizon, |end| end.min(horizon));
    let interval = settings.interval.max(1);

    let mut dates = Vec::new();
    let mut step: u32 = 0;
    while dates.len() < limit {
        let next = match settings.frequency {
            RecurringFrequency::Daily => {
                Some(start + Duration::days(i64::from(step * interval)))
            }
            RecurringFrequency::Weekly => {
                Some(start + Duration::weeks(i64::from(step * interval)))
            }
            RecurringFrequency::Biweekly => Some(start + Duration::weeks(i64::from(step * 2))),
            RecurringFrequency::Monthly => start
                .with_day(1)
                .and_then(|first| first.checked_add_months(Months::new(step * interval)))
                .and_then(|first| {
                    let day = settings.day_of_month.unwrap_or_else(|| start.day()).max(1);
                    first.with_day(day.min(last_day_of_month(first)))
                }),
        };
        step += 1;
        let Some(date) = next else {
            break;
        };
        if date > last {
            break;
        }
        if date >= start {
            dates.push(date);
        }
    }
    dates
}

impl Actions {
    pub(super) async fn load_appointment(&self, appointment_id: &str) -> Result<Appointment> {
        let id = appointment_id.to_string();
        self.with_db(move |db| db.get_appointment(&id))
            .await?
            .ok_or_else(|| SalonError::NotFound(format!("Appointment {appointment_id}")))
    }

    async fn load_bookable_staff(&self, salon_id: &str, staff_id: &str) -> Result<StaffProfile> {
        let id = staff_id.to_string();
        let staff = self
            .with_db(move |db| db.get_staff_by_id(&id))
            .await?
            .ok_or_else(|| SalonError::NotFound(format!("Staff member {staff_id}")))?;
        if staff.salon_id != salon_id || !staff.is_active || !staff.is_bookable {
            return Err(SalonError::invalid(
                "staff_id",
                "Staff member is not available for booking",
            ));
        }
        Ok(staff)
    }

    /// Check a proposed start against the staff member's day.
    ///
    /// Double bookings always fail. Other conflicts fail for customers and
    /// are only announced when salon staff place the booking themselves.
    async fn screen_proposal(
        &self,
        ctx: &UserContext,
        staff: &StaffProfile,
        appointment_id: Option<&str>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<()> {
        let staff_id = staff.id.clone();
        let date = start.date();
        let (schedules, appointments, blocked) = self
            .with_db(move |db| {
                Ok((
                    db.get_schedules(&staff_id)?,
                    db.get_staff_appointments_on(&staff_id, date)?,
                    db.get_blocked_times_on(&staff_id, date)?,
                ))
            })
            .await?;

        let proposal = Proposal {
            appointment_id,
            staff_name: &staff.display_name,
            start,
            end,
        };
        let day = DaySchedule::for_date(&schedules, date);
        let conflicts = detect_conflicts(&proposal, day.as_ref(), &appointments, &blocked);
        let is_member = ctx.require_salon_member(&staff.salon_id).is_ok();

        let mut rejection = None;
        for conflict in conflicts {
            let description = conflict.description.clone();
            let fatal = conflict.kind == ConflictKind::DoubleBooking;
            self.feed.publish_conflict(&staff.salon_id, conflict);
            if fatal {
                rejection = Some(SalonError::SlotConflict(description));
            } else if is_member {
                warn!(staff_id = %staff.id, %description, "Booking placed despite conflict");
            } else if rejection.is_none() {
                rejection = Some(SalonError::invalid("time", description));
            }
        }
        rejection.map_or(Ok(()), Err)
    }

    async fn publish_day_capacity(&self, salon_id: &str, date: NaiveDate) {
        let salon = salon_id.to_string();
        let appointments = self
            .with_db(move |db| db.get_appointments_between(&salon, None, date, date))
            .await;
        match appointments {
            Ok(appointments) => {
                let range = DateRange::new(date, date);
                for info in capacity_by_day(&appointments, self.config.booking.slots_per_day, range) {
                    self.feed.publish_capacity(salon_id, info);
                }
            }
            Err(e) => warn!(salon_id, error = %e, "Could not compute capacity snapshot"),
        }
    }

    async fn after_booking_change(&self, appointment: &Appointment, kind: BookingUpdateType) {
        let mut paths = booking_paths(&appointment.id);
        if kind == BookingUpdateType::Cancelled {
            paths.push(BILLING_PATH.to_string());
        }
        self.revalidate(&paths, &booking_tags(&appointment.salon_id));
        self.feed
            .publish_update(&appointment.salon_id, kind, &appointment.id, self.now_utc());
        if kind != BookingUpdateType::Updated {
            self.publish_day_capacity(&appointment.salon_id, appointment.start_time.date())
                .await;
        }
    }

    async fn resolve_customer(&self, ctx: &UserContext, request: &BookingRequest) -> Result<String> {
        let Some(info) = &request.customer else {
            return Ok(ctx.user_id.clone());
        };
        if ctx.require_salon_member(&request.salon_id).is_err() {
            return Ok(ctx.user_id.clone());
        }
        if let Some(id) = &info.id {
            return Ok(id.clone());
        }
        let email = info.email.trim().to_lowercase();
        let name = format!("{} {}", info.first_name.trim(), info.last_name.trim());
        let profile = self
            .with_db(move |db| db.ensure_customer(&email, &name))
            .await?;
        Ok(profile.id)
    }

    async fn create_booking_inner(
        &self,
        ctx: &UserContext,
        request: BookingRequest,
        sequence: i64,
    ) -> Result<Appointment> {
        InputValidator::validate_booking_request(&request)?;
        let minutes = parse_hhmm(&request.time)
            .ok_or_else(|| SalonError::invalid("time", "Invalid time, expected HH:MM"))?;

        let salon_id = request.salon_id.clone();
        if self.with_db(move |db| db.get_salon(&salon_id)).await?.is_none() {
            return Err(SalonError::NotFound(format!("Salon {}", request.salon_id)));
        }

        let start_time = at_minutes(request.date, minutes);
        let total_minutes = request
            .total_minutes()
            .ok_or_else(|| SalonError::invalid("services", "Booking is too long for a single appointment"))?;
        let end_time = start_time + Duration::minutes(i64::from(total_minutes));
        if let Some(staff_id) = &request.staff_id {
            let staff = self.load_bookable_staff(&request.salon_id, staff_id).await?;
            self.screen_proposal(ctx, &staff, None, start_time, end_time).await?;
        }

        let customer_id = self.resolve_customer(ctx, &request).await?;
        let new = NewAppointment {
            confirmation_code: confirmation_code(self.clock.now().timestamp_millis() + sequence),
            salon_id: request.salon_id.clone(),
            customer_id,
            staff_id: request.staff_id.clone(),
            start_time,
            services: request.all_services().cloned().collect(),
            tax_rate: self.config.booking.tax_rate,
            payment_method: request.payment_method.clone(),
            notes: request
                .special_requests
                .as_deref()
                .map(InputValidator::sanitize_text)
                .filter(|notes| !notes.is_empty()),
            booking_source: request.source,
        };
        let now = self.now_utc();
        let appointment = self
            .with_db(move |db| db.insert_appointment(&new, now))
            .await?;

        info!(
            appointment_id = %appointment.id,
            salon_id = %appointment.salon_id,
            code = %appointment.confirmation_code,
            "Booking created"
        );
        self.after_booking_change(&appointment, BookingUpdateType::New).await;
        Ok(appointment)
    }

    /// Create one appointment from services and add-ons
    pub async fn create_booking(&self, ctx: &UserContext, request: BookingRequest) -> ActionResponse<Appointment> {
        self.run("create_booking", self.create_booking_inner(ctx, request, 0))
            .await
    }

    async fn update_status_inner(
        &self,
        ctx: &UserContext,
        appointment_id: &str,
        status: AppointmentStatus,
        reason: Option<String>,
    ) -> Result<Appointment> {
        let current = self.load_appointment(appointment_id).await?;
        if status == AppointmentStatus::Cancelled {
            ctx.require_customer_or_member(&current.customer_id, &current.salon_id)?;
        } else {
            ctx.require_salon_member(&current.salon_id)?;
        }
        if let Some(reason) = &reason {
            let mut fields = FieldCollector::default();
            fields.check("reason", InputValidator::validate_description(reason));
            fields.finish()?;
        }

        let id = appointment_id.to_string();
        let actor = ctx.user_id.clone();
        let reason = reason.as_deref().map(InputValidator::sanitize_text);
        let now = self.now_utc();
        let appointment = self
            .with_db(move |db| db.update_appointment_status(&id, status, &actor, reason.as_deref(), now))
            .await?;

        info!(appointment_id, from = %current.status, to = %status, "Booking status changed");
        if status == AppointmentStatus::Completed {
            match self.award_points_inner(&appointment, Some(ctx.user_id.as_str())).await {
                Ok(Some((transaction, _))) => info!(
                    appointment_id,
                    points = transaction.points_amount,
                    "Loyalty points awarded"
                ),
                Ok(None) => {}
                Err(e) => warn!(appointment_id, error = %e, "Could not award loyalty points"),
            }
        }

        let kind = if status == AppointmentStatus::Cancelled {
            BookingUpdateType::Cancelled
        } else {
            BookingUpdateType::Updated
        };
        self.after_booking_change(&appointment, kind).await;
        Ok(appointment)
    }

    /// Move an appointment along its lifecycle
    pub async fn update_booking_status(
        &self,
        ctx: &UserContext,
        appointment_id: &str,
        status: AppointmentStatus,
        reason: Option<String>,
    ) -> ActionResponse<Appointment> {
        self.run(
            "update_booking_status",
            self.update_status_inner(ctx, appointment_id, status, reason),
        )
        .await
    }

    /// Cancel, with an optional reason
    pub async fn cancel_booking(
        &self,
        ctx: &UserContext,
        appointment_id: &str,
        reason: Option<String>,
    ) -> ActionResponse<Appointment> {
        self.update_booking_status(ctx, appointment_id, AppointmentStatus::Cancelled, reason)
            .await
    }

    /// Confirm a pending booking
    pub async fn confirm_booking(&self, ctx: &UserContext, appointment_id: &str) -> ActionResponse<Appointment> {
        self.update_booking_status(ctx, appointment_id, AppointmentStatus::Confirmed, None)
            .await
    }

    /// Customer arrived
    pub async fn check_in_customer(&self, ctx: &UserContext, appointment_id: &str) -> ActionResponse<Appointment> {
        self.update_booking_status(ctx, appointment_id, AppointmentStatus::CheckedIn, None)
            .await
    }

    /// Service started
    pub async fn start_service(&self, ctx: &UserContext, appointment_id: &str) -> ActionResponse<Appointment> {
        self.update_booking_status(ctx, appointment_id, AppointmentStatus::InProgress, None)
            .await
    }

    /// Service finished; awards loyalty points for the total
    pub async fn complete_appointment(&self, ctx: &UserContext, appointment_id: &str) -> ActionResponse<Appointment> {
        self.update_booking_status(ctx, appointment_id, AppointmentStatus::Completed, None)
            .await
    }

    /// Customer never arrived
    pub async fn mark_no_show(&self, ctx: &UserContext, appointment_id: &str) -> ActionResponse<Appointment> {
        self.update_booking_status(ctx, appointment_id, AppointmentStatus::NoShow, None)
            .await
    }

    async fn reschedule_inner(
        &self,
        ctx: &UserContext,
        appointment_id: &str,
        date: NaiveDate,
        time: &str,
        new_staff_id: Option<String>,
    ) -> Result<Appointment> {
        let minutes = parse_hhmm(time)
            .ok_or_else(|| SalonError::invalid("time", format!("Invalid time '{time}', expected HH:MM")))?;
        let current = self.load_appointment(appointment_id).await?;
        ctx.require_customer_or_member(&current.customer_id, &current.salon_id)?;
        if !current.status.is_modifiable() {
            return Err(SalonError::InvalidTransition {
                from: current.status.to_string(),
                to: "rescheduled".to_string(),
            });
        }

        let new_start = at_minutes(date, minutes);
        let new_end = new_start + Duration::minutes(i64::from(current.duration_minutes));
        if let Some(staff_id) = new_staff_id.as_deref().or(current.staff_id.as_deref()) {
            let staff = self.load_bookable_staff(&current.salon_id, staff_id).await?;
            self.screen_proposal(ctx, &staff, Some(appointment_id), new_start, new_end)
                .await?;
        }

        let id = appointment_id.to_string();
        let now = self.now_utc();
        let appointment = self
            .with_db(move |db| db.reschedule_appointment(&id, new_start, new_staff_id.as_deref(), now))
            .await?;

        info!(appointment_id, from = %current.start_time, to = %new_start, "Booking rescheduled");
        if current.start_time.date() != new_start.date() {
            self.publish_day_capacity(&current.salon_id, current.start_time.date())
                .await;
        }
        self.after_booking_change(&appointment, BookingUpdateType::Rescheduled)
            .await;
        Ok(appointment)
    }

    /// Move a pending or confirmed booking, optionally to another staff member
    pub async fn reschedule_booking(
        &self,
        ctx: &UserContext,
        appointment_id: &str,
        date: NaiveDate,
        time: &str,
        new_staff_id: Option<String>,
    ) -> ActionResponse<Appointment> {
        self.run(
            "reschedule_booking",
            self.reschedule_inner(ctx, appointment_id, date, time, new_staff_id),
        )
        .await
    }

    /// Replace the public or staff-only notes
    pub async fn add_appointment_notes(
        &self,
        ctx: &UserContext,
        appointment_id: &str,
        notes: &str,
        internal: bool,
    ) -> ActionResponse<Appointment> {
        self.run("add_appointment_notes", async {
            let current = self.load_appointment(appointment_id).await?;
            if internal {
                ctx.require_salon_member(&current.salon_id)?;
            } else {
                ctx.require_customer_or_member(&current.customer_id, &current.salon_id)?;
            }
            let mut fields = FieldCollector::default();
            fields.check("notes", InputValidator::validate_description(notes));
            fields.finish()?;

            let id = appointment_id.to_string();
            let notes = InputValidator::sanitize_text(notes);
            let now = self.now_utc();
            let appointment = self
                .with_db(move |db| db.set_appointment_notes(&id, &notes, internal, now))
                .await?;
            self.after_booking_change(&appointment, BookingUpdateType::Updated)
                .await;
            Ok(appointment)
        })
        .await
    }

    /// Record a payment status change
    pub async fn update_payment_status(
        &self,
        ctx: &UserContext,
        appointment_id: &str,
        update: PaymentUpdate,
    ) -> ActionResponse<Appointment> {
        self.run("update_payment_status", async {
            let current = self.load_appointment(appointment_id).await?;
            ctx.require_salon_member(&current.salon_id)?;

            let id = appointment_id.to_string();
            let now = self.now_utc();
            let appointment = self
                .with_db(move |db| db.update_payment(&id, &update, now))
                .await?;
            info!(appointment_id, status = %appointment.payment_status, "Payment updated");
            self.revalidate(&[BILLING_PATH.to_string()], &[]);
            self.after_booking_change(&appointment, BookingUpdateType::Updated)
                .await;
            Ok(appointment)
        })
        .await
    }

    /// Book the same services on every day a recurrence rule produces.
    /// Occurrences that fail are logged and skipped.
    pub async fn create_recurring_bookings(
        &self,
        ctx: &UserContext,
        base: BookingRequest,
        settings: RecurringSettings,
    ) -> ActionResponse<RecurringOutcome> {
        self.run("create_recurring_bookings", async {
            InputValidator::validate_booking_request(&base)?;
            let mut fields = FieldCollector::default();
            fields.check("interval", InputValidator::validate_interval(settings.interval));
            if settings.end_date.is_some_and(|end| end < base.date) {
                fields.push("end_date", "End date cannot be before the first booking");
            }
            if settings.day_of_month.is_some_and(|day| !(1..=31).contains(&day)) {
                fields.push("day_of_month", "Day of month must be between 1 and 31");
            }
            fields.finish()?;

            let dates = occurrence_dates(
                base.date,
                &settings,
                self.config.booking.max_recurring_occurrences,
                self.config.booking.max_recurring_days,
            );
            let mut outcome = RecurringOutcome {
                created: Vec::new(),
                skipped: Vec::new(),
            };
            for (sequence, date) in (0_i64..).zip(dates) {
                let request = BookingRequest {
                    date,
                    ..base.clone()
                };
                match self.create_booking_inner(ctx, request, sequence).await {
                    Ok(appointment) => outcome.created.push(appointment),
                    Err(e) => {
                        warn!(%date, error = %e, "Skipping recurring occurrence");
                        outcome.skipped.push(SkippedBooking {
                            key: date.to_string(),
                            error: e.to_string(),
                        });
                    }
                }
            }
            info!(
                created = outcome.created.len(),
                skipped = outcome.skipped.len(),
                "Recurring bookings created"
            );
            Ok(outcome)
        })
        .await
        .with_message(|o| format!("Created {} recurring appointments", o.created.len()))
    }

    /// One booking per participant with the shared and individual services.
    ///
    /// With `prefer_same_staff` and a staff member, participants follow one
    /// another; otherwise everybody starts at the same time.
    pub async fn create_group_booking(&self, ctx: &UserContext, group: GroupBooking) -> ActionResponse<GroupOutcome> {
        self.run("create_group_booking", async {
            ctx.require_salon_member(&group.salon_id)?;
            let mut fields = FieldCollector::default();
            fields.check("time", InputValidator::validate_time(&group.time));
            if group.participants.is_empty() {
                fields.push("participants", "At least one participant is required");
            }
            fields.finish()?;
            let first_start = parse_hhmm(&group.time)
                .ok_or_else(|| SalonError::invalid("time", "Invalid time, expected HH:MM"))?;

            let back_to_back = group.prefer_same_staff && group.staff_id.is_some();
            let mut offset = 0;
            let mut outcome = GroupOutcome {
                created: Vec::new(),
                skipped: Vec::new(),
            };
            for (sequence, participant) in (0_i64..).zip(group.participants.iter()) {
                let mut services = group.shared_services.clone();
                if let Some(extra) = group.individual_services.get(&participant.email) {
                    services.extend(extra.iter().cloned());
                }
                if services.is_empty() {
                    outcome.skipped.push(SkippedBooking {
                        key: participant.email.clone(),
                        error: "No services selected".to_string(),
                    });
                    continue;
                }

                let request = BookingRequest {
                    salon_id: group.salon_id.clone(),
                    staff_id: group.staff_id.clone(),
                    date: group.date,
                    time: format_minutes(first_start + offset),
                    services,
                    addons: Vec::new(),
                    customer: Some(participant.clone()),
                    payment_method: None,
                    special_requests: None,
                    source: BookingSource::Staff,
                };
                let minutes = request.total_minutes().unwrap_or_default();
                match self.create_booking_inner(ctx, request, sequence).await {
                    Ok(appointment) => {
                        if back_to_back {
                            offset += minutes;
                        }
                        outcome.created.push(appointment);
                    }
                    Err(e) => {
                        warn!(participant = %participant.email, error = %e, "Skipping group participant");
                        outcome.skipped.push(SkippedBooking {
                            key: participant.email.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
            Ok(outcome)
        })
        .await
        .with_message(|o| format!("Created {} group appointments", o.created.len()))
    }

    /// Put a customer on the waiting list
    pub async fn add_to_waiting_list(
        &self,
        ctx: &UserContext,
        entry: NewWaitingListEntry,
    ) -> ActionResponse<WaitingListEntry> {
        self.run("add_to_waiting_list", async {
            let customer_id = entry.customer_id.clone().unwrap_or_else(|| ctx.user_id.clone());
            ctx.require_customer_or_member(&customer_id, &entry.salon_id)?;

            let mut fields = FieldCollector::default();
            if let Some(time) = &entry.preferred_time {
                fields.check("preferred_time", InputValidator::validate_time(time));
            }
            if entry.service_ids.is_empty() {
                fields.push("service_ids", "At least one service is required");
            }
            if let Some(notes) = &entry.notes {
                fields.check("notes", InputValidator::validate_description(notes));
            }
            fields.finish()?;

            let salon_id = entry.salon_id.clone();
            if self.with_db(move |db| db.get_salon(&salon_id)).await?.is_none() {
                return Err(SalonError::NotFound(format!("Salon {}", entry.salon_id)));
            }

            let now = self.now_utc();
            let stored = self
                .with_db(move |db| db.insert_waiting_list_entry(&entry, &customer_id, now))
                .await?;
            self.revalidate(&[WAITING_LIST_PATH.to_string()], &[]);
            info!(entry_id = %stored.id, salon_id = %stored.salon_id, "Added to waiting list");
            Ok(stored)
        })
        .await
    }

    /// Waiting list of a salon, oldest first
    pub async fn get_waiting_list(
        &self,
        ctx: &UserContext,
        salon_id: &str,
        filters: WaitingListFilters,
    ) -> ActionResponse<Vec<WaitingListEntry>> {
        self.run("get_waiting_list", async {
            ctx.require_salon_member(salon_id)?;
            let salon = salon_id.to_string();
            self.with_db(move |db| db.get_waiting_list(&salon, &filters)).await
        })
        .await
    }

    /// Bookings of a salon, newest first. Customers only see their own.
    pub async fn get_bookings(
        &self,
        ctx: &UserContext,
        salon_id: &str,
        mut filters: BookingFilters,
    ) -> ActionResponse<Vec<BookingListItem>> {
        self.run("get_bookings", async {
            if ctx.require_salon_member(salon_id).is_err() {
                filters.customer_id = Some(ctx.user_id.clone());
            }
            if let Some(range) = &filters.date_range {
                let mut fields = FieldCollector::default();
                fields.check("date_range", InputValidator::validate_date_range(range.start, range.end));
                fields.finish()?;
            }

            let query = format!("salon={salon_id}&filters={}", serde_json::to_string(&filters)?);
            let key = cache_key(APPOINTMENTS_PATH, Some(&query));
            let salon = salon_id.to_string();
            let limit = self.config.booking.list_limit;
            let now = self.now_local();
            self.cached(
                key,
                booking_tags(salon_id),
                self.with_db(move |db| db.get_bookings(&salon, &filters, limit, now)),
            )
            .await
        })
        .await
    }

    /// Appointment with its line items, staff name and salon details
    pub async fn get_booking_by_id(&self, ctx: &UserContext, appointment_id: &str) -> ActionResponse<AppointmentDetails> {
        self.run("get_booking_by_id", self.booking_details(ctx, appointment_id))
            .await
    }

    async fn booking_details(&self, ctx: &UserContext, appointment_id: &str) -> Result<AppointmentDetails> {
        let id = appointment_id.to_string();
        let details = self
            .with_db(move |db| db.get_appointment_details(&id))
            .await?
            .ok_or_else(|| SalonError::NotFound(format!("Appointment {appointment_id}")))?;
        ctx.require_customer_or_member(&details.appointment.customer_id, &details.appointment.salon_id)?;
        Ok(details)
    }

    /// Line items of an appointment in execution order
    pub async fn get_appointment_services(
        &self,
        ctx: &UserContext,
        appointment_id: &str,
    ) -> ActionResponse<Vec<AppointmentService>> {
        self.run("get_appointment_services", async {
            let current = self.load_appointment(appointment_id).await?;
            ctx.require_customer_or_member(&current.customer_id, &current.salon_id)?;
            let id = appointment_id.to_string();
            self.with_db(move |db| db.get_appointment_services(&id)).await
        })
        .await
    }

    /// Calendar file for one appointment
    pub async fn get_booking_calendar(&self, ctx: &UserContext, appointment_id: &str) -> ActionResponse<CalendarFile> {
        self.run("get_booking_calendar", async {
            let details = self.booking_details(ctx, appointment_id).await?;
            Ok(CalendarFile {
                file_name: ics_file_name(&details.appointment.confirmation_code),
                content: appointment_to_ics(&details, self.now_utc()),
            })
        })
        .await
    }

    /// Start-time slots for a day.
    ///
    /// With a staff member the slots follow their schedule, appointments and
    /// blocked time. Without one the salon's default hours apply and every
    /// appointment of the salon that day counts as booked.
    pub async fn get_available_time_slots(
        &self,
        salon_id: &str,
        date: NaiveDate,
        duration_minutes: u32,
        staff_id: Option<String>,
    ) -> ActionResponse<Vec<TimeSlot>> {
        self.run("get_available_time_slots", async {
            let mut fields = FieldCollector::default();
            fields.check("duration", InputValidator::validate_duration(duration_minutes));
            fields.finish()?;
            let interval = self.config.booking.slot_interval_minutes;

            let slots = match staff_id {
                Some(staff_id) => {
                    let staff = self.load_bookable_staff(salon_id, &staff_id).await?;
                    let (schedules, appointments, blocked) = self
                        .with_db(move |db| {
                            Ok((
                                db.get_schedules(&staff_id)?,
                                db.get_staff_appointments_on(&staff_id, date)?,
                                db.get_blocked_times_on(&staff_id, date)?,
                            ))
                        })
                        .await?;
                    match DaySchedule::for_date(&schedules, date) {
                        Some(day) => generate_slots(
                            &day,
                            duration_minutes,
                            interval,
                            &booked_ranges(&appointments, date, None),
                            &blocked_ranges(&blocked, date),
                        ),
                        None => {
                            info!(staff_id = %staff.id, %date, "Staff member not working");
                            Vec::new()
                        }
                    }
                }
                None => {
                    let hours = TimeRange::parse(
                        &self.config.booking.default_open,
                        &self.config.booking.default_close,
                    )
                    .ok_or_else(|| SalonError::InvalidConfig("default salon hours".to_string()))?;
                    let salon = salon_id.to_string();
                    let appointments = self
                        .with_db(move |db| db.get_appointments_between(&salon, None, date, date))
                        .await?;
                    generate_slots(
                        &DaySchedule::new(hours),
                        duration_minutes,
                        interval,
                        &booked_ranges(&appointments, date, None),
                        &[],
                    )
                }
            };
            self.metrics.record_slots(slots.len());
            Ok(slots)
        })
        .await
    }

    /// Whether a staff member can take a service on a day, optionally at a
    /// requested time
    pub async fn check_availability(
        &self,
        staff_id: &str,
        date: NaiveDate,
        service_id: &str,
        time: Option<String>,
    ) -> ActionResponse<AvailabilityCheck> {
        self.run("check_availability", async {
            let requested = match time.as_deref() {
                Some(time) => Some(parse_hhmm(time).ok_or_else(|| {
                    SalonError::invalid("time", format!("Invalid time '{time}', expected HH:MM"))
                })?),
                None => None,
            };
            let service = service_id.to_string();
            let staff = staff_id.to_string();
            let (service, schedules, appointments, blocked) = self
                .with_db(move |db| {
                    Ok((
                        db.get_service(&service)?,
                        db.get_schedules(&staff)?,
                        db.get_staff_appointments_on(&staff, date)?,
                        db.get_blocked_times_on(&staff, date)?,
                    ))
                })
                .await?;
            let service = service.ok_or_else(|| SalonError::NotFound(format!("Service {service_id}")))?;

            let check = check_requested_time(
                DaySchedule::for_date(&schedules, date).as_ref(),
                requested,
                service.duration_minutes,
                self.config.booking.slot_interval_minutes,
                &booked_ranges(&appointments, date, None),
                &blocked_ranges(&blocked, date),
            );
            self.metrics.record_slots(check.available_slots.len());
            Ok(check)
        })
        .await
    }

    /// Working hours and booked ranges per day of an inclusive range
    pub async fn get_availability_calendar(
        &self,
        staff_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ActionResponse<BTreeMap<NaiveDate, DayAvailability>> {
        self.run("get_availability_calendar", async {
            let mut fields = FieldCollector::default();
            fields.check("date_range", InputValidator::validate_date_range(start, end));
            fields.finish()?;

            let staff = staff_id.to_string();
            let (profile, schedules) = self
                .with_db(move |db| Ok((db.get_staff_by_id(&staff)?, db.get_schedules(&staff)?)))
                .await?;
            let profile = profile.ok_or_else(|| SalonError::NotFound(format!("Staff member {staff_id}")))?;

            let staff = staff_id.to_string();
            let appointments = self
                .with_db(move |db| db.get_appointments_between(&profile.salon_id, Some(&staff), start, end))
                .await?;
            Ok(day_calendar(&schedules, &appointments, DateRange::new(start, end)))
        })
        .await
    }

    /// Booked versus offered slots per day
    pub async fn get_capacity_info(
        &self,
        ctx: &UserContext,
        salon_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ActionResponse<Vec<CapacityInfo>> {
        self.run("get_capacity_info", async {
            ctx.require_salon_member(salon_id)?;
            let mut fields = FieldCollector::default();
            fields.check("date_range", InputValidator::validate_date_range(start, end));
            fields.finish()?;

            let salon = salon_id.to_string();
            let appointments = self
                .with_db(move |db| db.get_appointments_between(&salon, None, start, end))
                .await?;
            Ok(capacity_by_day(
                &appointments,
                self.config.booking.slots_per_day,
                DateRange::new(start, end),
            ))
        })
        .await
    }

    /// Booking statistics for a period
    pub async fn get_booking_analytics(
        &self,
        ctx: &UserContext,
        salon_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ActionResponse<BookingAnalytics> {
        self.run("get_booking_analytics", async {
            ctx.require_salon_member(salon_id)?;
            let mut fields = FieldCollector::default();
            fields.check("date_range", InputValidator::validate_date_range(start, end));
            fields.finish()?;

            let query = format!("salon={salon_id}&start={start}&end={end}");
            let salon = salon_id.to_string();
            self.cached(
                cache_key("/dashboard/analytics", Some(&query)),
                booking_tags(salon_id),
                self.with_db(move |db| db.get_booking_analytics(&salon, start, end)),
            )
            .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn rule(frequency: RecurringFrequency, interval: u32) -> RecurringSettings {
        RecurringSettings {
            frequency,
            interval,
            end_date: None,
            occurrences: Some(4),
            day_of_month: None,
        }
    }

    #[test]
    fn test_weekly_occurrences() {
        let dates = occurrence_dates(date(2026, 10, 20), &rule(RecurringFrequency::Weekly, 1), 52, 365);
        assert_eq!(
            dates,
            vec![date(2026, 10, 20), date(2026, 10, 27), date(2026, 11, 3), date(2026, 11, 10)]
        );
    }

    #[test]
    fn test_biweekly_ignores_interval() {
        let dates = occurrence_dates(date(2026, 10, 20), &rule(RecurringFrequency::Biweekly, 5), 52, 365);
        assert_eq!(dates[1], date(2026, 11, 3));
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        let mut settings = rule(RecurringFrequency::Monthly, 1);
        settings.day_of_month = Some(31);
        let dates = occurrence_dates(date(2027, 1, 31), &settings, 52, 365);
        assert_eq!(
            dates,
            vec![date(2027, 1, 31), date(2027, 2, 28), date(2027, 3, 31), date(2027, 4, 30)]
        );
    }

    #[test]
    fn test_end_date_and_caps() {
        let mut settings = rule(RecurringFrequency::Daily, 1);
        settings.end_date = Some(date(2026, 10, 22));
        assert_eq!(occurrence_dates(date(2026, 10, 20), &settings, 52, 365).len(), 3);

        settings.end_date = None;
        settings.occurrences = Some(500);
        assert_eq!(occurrence_dates(date(2026, 10, 20), &settings, 52, 365).len(), 52);
        assert_eq!(occurrence_dates(date(2026, 10, 20), &settings, 52, 10).len(), 11);
    }
}
