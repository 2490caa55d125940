//! Slot generation and conflict detection.
//!
//! Everything here is pure: callers load schedules, appointments and blocked
//! times for the staff member and day, and these functions decide which
//! fixed-interval slots are bookable. Times of day are minutes since midnight
//! and every range is half-open.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::models::{Appointment, BlockedTime, DateRange, StaffSchedule};
use crate::utils::{format_minutes, minutes_of_day, parse_hhmm};

/// Reason given when the staff member has no schedule for the day
pub const REASON_NOT_SCHEDULED: &str = "Staff not available on this day";
/// Reason given when the requested time falls outside the shift
pub const REASON_OUTSIDE_HOURS: &str = "Outside working hours";
/// Reason given when the requested time overlaps the break window
pub const REASON_BREAK: &str = "Conflicts with break time";
/// Reason given when the requested time overlaps blocked time
pub const REASON_BLOCKED: &str = "Conflicts with blocked time";
/// Reason given when the requested time overlaps an appointment
pub const REASON_BOOKED: &str = "Time slot already booked";
/// Calendar reason for days without a schedule
pub const REASON_NOT_WORKING: &str = "Staff not working";

/// Half-open range of minutes since midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// First minute (inclusive)
    pub start: u32,
    /// Last minute (exclusive)
    pub end: u32,
}

impl TimeRange {
    /// Construct a range.
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Range starting at `start` lasting `minutes`.
    #[must_use]
    pub const fn starting_at(start: u32, minutes: u32) -> Self {
        Self::new(start, start + minutes)
    }

    /// Parse a pair of `HH:MM` strings.
    #[must_use]
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Some(Self::new(parse_hhmm(start)?, parse_hhmm(end)?))
    }

    /// Time-of-day portion of two timestamps on the same day.
    #[must_use]
    pub fn of_day(start: &NaiveDateTime, end: &NaiveDateTime) -> Self {
        let start_minutes = minutes_of_day(start);
        let end_minutes = if end.date() > start.date() {
            24 * 60
        } else {
            minutes_of_day(end)
        };
        Self::new(start_minutes, end_minutes)
    }

    /// `a.start < b.end && a.end > b.start`
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Whether `other` lies entirely within `self`.
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Length in minutes.
    #[must_use]
    pub const fn minutes(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

/// Free function form of [`TimeRange::overlaps`].
#[must_use]
pub const fn overlaps(a: &TimeRange, b: &TimeRange) -> bool {
    a.overlaps(b)
}

/// Working hours of one staff member on one day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySchedule {
    /// Shift
    pub hours: TimeRange,
    /// Break inside the shift
    pub break_window: Option<TimeRange>,
}

impl DaySchedule {
    /// Shift without a break.
    #[must_use]
    pub const fn new(hours: TimeRange) -> Self {
        Self {
            hours,
            break_window: None,
        }
    }

    /// Interpret a stored schedule row. Days off and unparseable rows yield
    /// `None`.
    #[must_use]
    pub fn from_schedule(schedule: &StaffSchedule) -> Option<Self> {
        if !schedule.is_working {
            return None;
        }
        let hours = TimeRange::parse(&schedule.start_time, &schedule.end_time)?;
        let break_window = match (&schedule.break_start, &schedule.break_end) {
            (Some(start), Some(end)) => TimeRange::parse(start, end).filter(|b| b.start < b.end),
            _ => None,
        };
        Some(Self {
            hours,
            break_window,
        })
    }

    /// Pick the schedule for `date` out of a staff member's weekly rows.
    #[must_use]
    pub fn for_date(schedules: &[StaffSchedule], date: NaiveDate) -> Option<Self> {
        let day = weekday_index(date);
        schedules
            .iter()
            .find(|s| s.day_of_week == day)
            .and_then(Self::from_schedule)
    }
}

/// Day of week with Sunday as 0.
#[must_use]
pub fn weekday_index(date: NaiveDate) -> u8 {
    u8::try_from(date.weekday().num_days_from_sunday()).unwrap_or_default()
}

/// Candidate start time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// Start `HH:MM`
    pub time: String,
    /// Whether it can be booked
    pub available: bool,
    /// Why it cannot be booked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of checking a staff member's day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityCheck {
    /// Requested time (or the day, when no time was given) is bookable
    pub available: bool,
    /// Why not
    pub reason: Option<String>,
    /// Every bookable start `HH:MM`
    pub available_slots: Vec<String>,
    /// Earliest bookable start at or after the requested time
    pub next_available: Option<String>,
}

fn blocking_reason(
    candidate: &TimeRange,
    break_window: Option<&TimeRange>,
    booked: &[TimeRange],
    blocked: &[TimeRange],
) -> Option<&'static str> {
    if break_window.is_some_and(|b| candidate.overlaps(b)) {
        return Some(REASON_BREAK);
    }
    if blocked.iter().any(|b| candidate.overlaps(b)) {
        return Some(REASON_BLOCKED);
    }
    if booked.iter().any(|b| candidate.overlaps(b)) {
        return Some(REASON_BOOKED);
    }
    None
}

/// Fixed-interval slots over a day.
///
/// Candidates start at the opening time and advance by `interval` while the
/// service still fits before closing. A candidate is unavailable when it
/// overlaps the break, a blocked range or a booked appointment.
#[must_use]
pub fn generate_slots(
    day: &DaySchedule,
    duration: u32,
    interval: u32,
    booked: &[TimeRange],
    blocked: &[TimeRange],
) -> Vec<TimeSlot> {
    let mut slots = Vec::new();
    if duration == 0 || interval == 0 {
        return slots;
    }

    let mut start = day.hours.start;
    while start + duration <= day.hours.end {
        let candidate = TimeRange::starting_at(start, duration);
        let reason = blocking_reason(&candidate, day.break_window.as_ref(), booked, blocked);
        slots.push(TimeSlot {
            time: format_minutes(start),
            available: reason.is_none(),
            reason: reason.map(str::to_string),
        });
        start += interval;
    }
    slots
}

/// Check a day, and optionally one requested start time, for bookability.
#[must_use]
pub fn check_requested_time(
    day: Option<&DaySchedule>,
    requested: Option<u32>,
    duration: u32,
    interval: u32,
    booked: &[TimeRange],
    blocked: &[TimeRange],
) -> AvailabilityCheck {
    let Some(day) = day else {
        return AvailabilityCheck {
            available: false,
            reason: Some(REASON_NOT_SCHEDULED.to_string()),
            available_slots: Vec::new(),
            next_available: None,
        };
    };

    let open: Vec<(u32, String)> = generate_slots(day, duration, interval, booked, blocked)
        .into_iter()
        .filter(|s| s.available)
        .filter_map(|s| parse_hhmm(&s.time).map(|m| (m, s.time)))
        .collect();
    let available_slots: Vec<String> = open.iter().map(|(_, t)| t.clone()).collect();

    let Some(requested) = requested else {
        return AvailabilityCheck {
            available: !available_slots.is_empty(),
            reason: None,
            next_available: available_slots.first().cloned(),
            available_slots,
        };
    };

    let next_available = open
        .iter()
        .find(|(m, _)| *m >= requested)
        .map(|(_, t)| t.clone());
    let candidate = TimeRange::starting_at(requested, duration);
    let reason = if day.hours.contains(&candidate) {
        blocking_reason(&candidate, day.break_window.as_ref(), booked, blocked)
    } else {
        Some(REASON_OUTSIDE_HOURS)
    };

    AvailabilityCheck {
        available: reason.is_none(),
        reason: reason.map(str::to_string),
        available_slots,
        next_available,
    }
}

/// Booked ranges of the appointments that still occupy time on `date`.
#[must_use]
pub fn booked_ranges(appointments: &[Appointment], date: NaiveDate, ignore: Option<&str>) -> Vec<TimeRange> {
    appointments
        .iter()
        .filter(|a| a.status.blocks_slot())
        .filter(|a| ignore != Some(a.id.as_str()))
        .filter(|a| a.start_time.date() <= date && a.end_time.date() >= date)
        .map(|a| clip_to_day(&a.start_time, &a.end_time, date))
        .collect()
}

/// Blocked ranges falling on `date`.
#[must_use]
pub fn blocked_ranges(blocked: &[BlockedTime], date: NaiveDate) -> Vec<TimeRange> {
    blocked
        .iter()
        .filter(|b| b.start_time.date() <= date && b.end_time.date() >= date)
        .map(|b| clip_to_day(&b.start_time, &b.end_time, date))
        .collect()
}

fn clip_to_day(start: &NaiveDateTime, end: &NaiveDateTime, date: NaiveDate) -> TimeRange {
    let start_minutes = if start.date() < date { 0 } else { minutes_of_day(start) };
    let end_minutes = if end.date() > date { 24 * 60 } else { minutes_of_day(end) };
    TimeRange::new(start_minutes, end_minutes)
}

/// Shift with its break, as shown on the calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    /// Shift start `HH:MM`
    pub start: String,
    /// Shift end `HH:MM`
    pub end: String,
    /// Break window
    #[serde(rename = "break")]
    pub break_window: Option<SlotSpan>,
}

/// Start and end `HH:MM`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpan {
    /// Start `HH:MM`
    pub start: String,
    /// End `HH:MM`
    pub end: String,
}

impl From<TimeRange> for SlotSpan {
    fn from(range: TimeRange) -> Self {
        Self {
            start: format_minutes(range.start),
            end: format_minutes(range.end),
        }
    }
}

/// One calendar day for a staff member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayAvailability {
    /// Works this day
    pub available: bool,
    /// Why not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Shift and break
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_hours: Option<WorkingHours>,
    /// Appointments already on the books
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub booked_slots: Vec<SlotSpan>,
}

/// Per-date availability over an inclusive range.
#[must_use]
pub fn day_calendar(
    schedules: &[StaffSchedule],
    appointments: &[Appointment],
    range: DateRange,
) -> BTreeMap<NaiveDate, DayAvailability> {
    range
        .days()
        .map(|date| {
            let day = match DaySchedule::for_date(schedules, date) {
                Some(schedule) => {
                    let mut booked = booked_ranges(appointments, date, None);
                    booked.sort_by_key(|r| r.start);
                    DayAvailability {
                        available: true,
                        reason: None,
                        working_hours: Some(WorkingHours {
                            start: format_minutes(schedule.hours.start),
                            end: format_minutes(schedule.hours.end),
                            break_window: schedule.break_window.map(SlotSpan::from),
                        }),
                        booked_slots: booked.into_iter().map(SlotSpan::from).collect(),
                    }
                }
                None => DayAvailability {
                    available: false,
                    reason: Some(REASON_NOT_WORKING.to_string()),
                    working_hours: None,
                    booked_slots: Vec::new(),
                },
            };
            (date, day)
        })
        .collect()
}

/// Kind of scheduling conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Overlaps another appointment for the same staff member
    DoubleBooking,
    /// Outside the staff member's shift
    OutsideWorkingHours,
    /// Overlaps the break window
    BreakTime,
    /// Overlaps blocked time
    BlockedTime,
}

/// How serious a conflict is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    /// Worth a look
    Low,
    /// Needs attention
    Medium,
    /// Must be resolved
    High,
}

impl ConflictKind {
    /// Default severity of this kind.
    #[must_use]
    pub const fn severity(self) -> ConflictSeverity {
        match self {
            Self::DoubleBooking | Self::BlockedTime => ConflictSeverity::High,
            Self::OutsideWorkingHours => ConflictSeverity::Medium,
            Self::BreakTime => ConflictSeverity::Low,
        }
    }
}

/// A conflict between a proposed booking and the staff member's day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConflict {
    /// Conflict kind
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    /// Severity
    pub severity: ConflictSeverity,
    /// Appointments involved
    pub appointment_ids: Vec<String>,
    /// Human readable summary
    pub description: String,
}

/// A booking being placed or moved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal<'a> {
    /// Appointment being moved, ignored when scanning for overlaps
    pub appointment_id: Option<&'a str>,
    /// Staff member's display name, used in descriptions
    pub staff_name: &'a str,
    /// Salon-local start
    pub start: NaiveDateTime,
    /// Salon-local end
    pub end: NaiveDateTime,
}

/// Every conflict between `proposal` and the staff member's day.
///
/// `schedule` is `None` when the staff member does not work that day, which
/// counts as outside working hours.
#[must_use]
pub fn detect_conflicts(
    proposal: &Proposal<'_>,
    schedule: Option<&DaySchedule>,
    appointments: &[Appointment],
    blocked: &[BlockedTime],
) -> Vec<ScheduleConflict> {
    let mut conflicts = Vec::new();
    let span = TimeRange::of_day(&proposal.start, &proposal.end);
    let label = format!(
        "{}-{}",
        format_minutes(span.start),
        format_minutes(span.end.min(24 * 60 - 1))
    );

    let overlapping: Vec<String> = appointments
        .iter()
        .filter(|a| a.status.blocks_slot())
        .filter(|a| proposal.appointment_id != Some(a.id.as_str()))
        .filter(|a| a.start_time < proposal.end && a.end_time > proposal.start)
        .map(|a| a.id.clone())
        .collect();
    if !overlapping.is_empty() {
        conflicts.push(ScheduleConflict {
            kind: ConflictKind::DoubleBooking,
            severity: ConflictKind::DoubleBooking.severity(),
            description: format!(
                "Time slot {label} is already booked for {}",
                proposal.staff_name
            ),
            appointment_ids: overlapping,
        });
    }

    match schedule {
        Some(day) if day.hours.contains(&span) => {
            if day.break_window.is_some_and(|b| span.overlaps(&b)) {
                conflicts.push(ScheduleConflict {
                    kind: ConflictKind::BreakTime,
                    severity: ConflictKind::BreakTime.severity(),
                    appointment_ids: Vec::new(),
                    description: format!("Time slot {label} overlaps {}'s break", proposal.staff_name),
                });
            }
        }
        _ => conflicts.push(ScheduleConflict {
            kind: ConflictKind::OutsideWorkingHours,
            severity: ConflictKind::OutsideWorkingHours.severity(),
            appointment_ids: Vec::new(),
            description: format!(
                "Time slot {label} is outside {}'s working hours",
                proposal.staff_name
            ),
        }),
    }

    if blocked
        .iter()
        .any(|b| b.start_time < proposal.end && b.end_time > proposal.start)
    {
        conflicts.push(ScheduleConflict {
            kind: ConflictKind::BlockedTime,
            severity: ConflictKind::BlockedTime.severity(),
            appointment_ids: Vec::new(),
            description: format!("Time slot {label} overlaps blocked time for {}", proposal.staff_name),
        });
    }

    conflicts
}

/// Booked versus total slots for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityInfo {
    /// Day
    pub date: NaiveDate,
    /// Slots the salon offers
    pub total_slots: u32,
    /// Slots taken
    pub booked_slots: u32,
    /// Slots left, never negative
    pub available_slots: u32,
    /// booked / total × 100
    pub utilization_percentage: f64,
}

impl CapacityInfo {
    /// Derive the remaining fields from a booked count.
    #[must_use]
    pub fn new(date: NaiveDate, total_slots: u32, booked_slots: u32) -> Self {
        let utilization_percentage = if total_slots == 0 {
            0.0
        } else {
            f64::from(booked_slots) / f64::from(total_slots) * 100.0
        };
        Self {
            date,
            total_slots,
            booked_slots,
            available_slots: total_slots.saturating_sub(booked_slots),
            utilization_percentage,
        }
    }
}

/// Capacity for every day in `range` from the appointments that occupy time.
#[must_use]
pub fn capacity_by_day(appointments: &[Appointment], slots_per_day: u32, range: DateRange) -> Vec<CapacityInfo> {
    let mut booked: HashMap<NaiveDate, u32> = HashMap::new();
    for appointment in appointments.iter().filter(|a| a.status.blocks_slot()) {
        *booked.entry(appointment.start_time.date()).or_default() += 1;
    }
    range
        .days()
        .map(|date| CapacityInfo::new(date, slots_per_day, booked.get(&date).copied().unwrap_or(0)))
        .collect()
}
