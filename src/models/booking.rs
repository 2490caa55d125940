use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{text_enum, DateRange};

/// Appointment lifecycle
///
/// `pending → confirmed → checked_in → in_progress → completed`, with
/// `cancelled` and `no_show` as terminal alternates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Created, awaiting confirmation
    Pending,
    /// Confirmed by the salon
    Confirmed,
    /// Customer arrived
    CheckedIn,
    /// Service under way
    InProgress,
    /// Finished
    Completed,
    /// Cancelled before service
    Cancelled,
    /// Customer did not show up
    NoShow,
}

text_enum!(AppointmentStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    CheckedIn => "checked_in",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
    NoShow => "no_show",
});

impl AppointmentStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use AppointmentStatus::{Cancelled, CheckedIn, Completed, Confirmed, InProgress, NoShow, Pending};
        matches!(
            (self, next),
            (Pending, Confirmed | CheckedIn | Cancelled | NoShow)
                | (Confirmed, CheckedIn | Cancelled | NoShow)
                | (CheckedIn, InProgress | Completed | Cancelled)
                | (InProgress, Completed)
        )
    }

    /// No further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Whether an appointment in this status occupies the staff member's time.
    #[must_use]
    pub const fn blocks_slot(self) -> bool {
        !matches!(self, Self::Cancelled | Self::NoShow)
    }

    /// Pending and confirmed bookings can still be moved or cancelled.
    #[must_use]
    pub const fn is_modifiable(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

/// Payment state of an appointment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Nothing collected yet
    Pending,
    /// Fully paid
    Paid,
    /// Deposit or partial amount collected
    PartiallyPaid,
    /// Charge failed
    Failed,
    /// Money returned
    Refunded,
}

text_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    PartiallyPaid => "partially_paid",
    Failed => "failed",
    Refunded => "refunded",
});

/// Channel a booking came in through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingSource {
    /// Customer self-service
    #[default]
    Online,
    /// Taken over the phone
    Phone,
    /// Walk-in at the front desk
    WalkIn,
    /// Entered by staff
    Staff,
}

text_enum!(BookingSource {
    Online => "online",
    Phone => "phone",
    WalkIn => "walk_in",
    Staff => "staff",
});

/// One service (or add-on) chosen for a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSelection {
    /// Catalog service id
    pub service_id: String,
    /// Name captured at booking time
    pub service_name: String,
    /// Length of one unit
    pub duration_minutes: u32,
    /// Price of one unit
    pub price: f64,
    /// Units booked
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

impl ServiceSelection {
    /// Price × quantity
    #[must_use]
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }

    /// Duration × quantity, `None` on overflow
    #[must_use]
    pub const fn line_minutes(&self) -> Option<u32> {
        self.duration_minutes.checked_mul(self.quantity)
    }
}

/// Customer details captured with a booking
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    /// Existing profile id, if known
    pub id: Option<String>,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: Option<String>,
}

/// Everything needed to create one appointment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Salon being booked
    pub salon_id: String,
    /// Staff member, or `None` for "any available"
    pub staff_id: Option<String>,
    /// Appointment day
    pub date: NaiveDate,
    /// Start time `HH:MM`
    pub time: String,
    /// Main services
    pub services: Vec<ServiceSelection>,
    /// Add-ons, performed after the main services
    #[serde(default)]
    pub addons: Vec<ServiceSelection>,
    /// Customer details; defaults to the caller
    pub customer: Option<CustomerInfo>,
    /// Payment method type
    pub payment_method: Option<String>,
    /// Free-text requests, stored as public notes
    pub special_requests: Option<String>,
    /// Booking channel
    #[serde(default)]
    pub source: BookingSource,
}

impl BookingRequest {
    /// Services followed by add-ons, in execution order.
    pub fn all_services(&self) -> impl Iterator<Item = &ServiceSelection> {
        self.services.iter().chain(self.addons.iter())
    }

    /// Σ price × quantity
    #[must_use]
    pub fn subtotal(&self) -> f64 {
        self.all_services().map(ServiceSelection::line_total).sum()
    }

    /// Σ duration × quantity, `None` on overflow
    #[must_use]
    pub fn total_minutes(&self) -> Option<u32> {
        self.all_services()
            .try_fold(0u32, |total, s| total.checked_add(s.line_minutes()?))
    }
}

/// Appointment row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    /// Primary key
    pub id: String,
    /// Salon
    pub salon_id: String,
    /// Customer profile id
    pub customer_id: String,
    /// Assigned staff member
    pub staff_id: Option<String>,
    /// Salon-local start
    pub start_time: NaiveDateTime,
    /// Salon-local end
    pub end_time: NaiveDateTime,
    /// Total length
    pub duration_minutes: u32,
    /// Lifecycle status
    pub status: AppointmentStatus,
    /// Code shown to the customer
    pub confirmation_code: String,
    /// Number of line items
    pub service_count: u32,
    /// Σ line totals
    pub subtotal: f64,
    /// Tax on the subtotal
    pub tax_amount: f64,
    /// Discount applied
    pub discount_amount: f64,
    /// Tip
    pub tip_amount: f64,
    /// Amount due
    pub total_amount: f64,
    /// Payment status
    pub payment_status: PaymentStatus,
    /// Payment method
    pub payment_method: Option<String>,
    /// Payment processor reference
    pub transaction_id: Option<String>,
    /// When payment completed
    pub paid_at: Option<DateTime<Utc>>,
    /// Notes visible to the customer
    pub notes: Option<String>,
    /// Staff-only notes
    pub internal_notes: Option<String>,
    /// Booking channel
    pub booking_source: BookingSource,
    /// Cancellation stamp
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Who cancelled
    pub cancelled_by: Option<String>,
    /// Why it was cancelled
    pub cancellation_reason: Option<String>,
    /// Check-in stamp
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Who checked the customer in
    pub checked_in_by: Option<String>,
    /// Completion stamp
    pub completed_at: Option<DateTime<Utc>>,
    /// Who completed it
    pub completed_by: Option<String>,
    /// No-show stamp
    pub marked_no_show_at: Option<DateTime<Utc>>,
    /// Who marked the no-show
    pub marked_no_show_by: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Line item of an appointment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentService {
    /// Primary key
    pub id: String,
    /// Parent appointment
    pub appointment_id: String,
    /// Catalog service id
    pub service_id: String,
    /// Staff member performing it
    pub staff_id: Option<String>,
    /// Name captured at booking time
    pub service_name: String,
    /// Length of one unit
    pub duration_minutes: u32,
    /// Price of one unit
    pub unit_price: f64,
    /// Units
    pub quantity: u32,
    /// Applied discount
    pub discount_percentage: f64,
    /// Price × quantity
    pub subtotal: f64,
    /// 1-based execution order
    pub service_order: u32,
    /// Salon-local start
    pub start_time: NaiveDateTime,
    /// Salon-local end
    pub end_time: NaiveDateTime,
    /// Whether this item has been performed
    pub is_completed: bool,
}

/// How often a recurring booking repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringFrequency {
    /// Every `interval` days
    Daily,
    /// Every `interval` weeks
    Weekly,
    /// Every two weeks, `interval` is ignored
    Biweekly,
    /// Every `interval` months
    Monthly,
}

/// Recurrence rule for `create_recurring_bookings`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringSettings {
    /// Repeat unit
    pub frequency: RecurringFrequency,
    /// Multiplier on the repeat unit
    #[serde(default = "default_quantity")]
    pub interval: u32,
    /// Last allowed day (inclusive)
    pub end_date: Option<NaiveDate>,
    /// Maximum occurrences
    pub occurrences: Option<u32>,
    /// For monthly rules, pin the day of month
    pub day_of_month: Option<u32>,
}

/// Booking for several people at once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBooking {
    /// Salon being booked
    pub salon_id: String,
    /// Day of the visit
    pub date: NaiveDate,
    /// Start time of the first participant, `HH:MM`
    pub time: String,
    /// People in the group
    pub participants: Vec<CustomerInfo>,
    /// Services every participant receives
    #[serde(default)]
    pub shared_services: Vec<ServiceSelection>,
    /// Extra services keyed by participant email
    #[serde(default)]
    pub individual_services: HashMap<String, Vec<ServiceSelection>>,
    /// Staff member to use
    pub staff_id: Option<String>,
    /// Book everybody with the same staff member, one after another
    #[serde(default)]
    pub prefer_same_staff: bool,
}

/// Waiting list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingListEntry {
    /// Primary key
    pub id: String,
    /// Salon
    pub salon_id: String,
    /// Customer waiting
    pub customer_id: String,
    /// Wanted services
    pub service_ids: Vec<String>,
    /// Wanted staff member
    pub preferred_staff_id: Option<String>,
    /// Wanted day
    pub preferred_date: Option<NaiveDate>,
    /// Wanted time `HH:MM`
    pub preferred_time: Option<String>,
    /// Notes
    pub notes: Option<String>,
    /// Whether the customer was told about an opening
    pub notified: bool,
    /// When they were told
    pub notified_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Data for adding a waiting list entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWaitingListEntry {
    /// Salon
    pub salon_id: String,
    /// Customer; defaults to the caller
    pub customer_id: Option<String>,
    /// Wanted services
    #[serde(default)]
    pub service_ids: Vec<String>,
    /// Wanted staff member
    pub preferred_staff_id: Option<String>,
    /// Wanted day
    pub preferred_date: Option<NaiveDate>,
    /// Wanted time `HH:MM`
    pub preferred_time: Option<String>,
    /// Notes
    pub notes: Option<String>,
}

/// Filters for the waiting list query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaitingListFilters {
    /// Any of these services
    #[serde(default)]
    pub service_ids: Vec<String>,
    /// Preferred staff member
    pub staff_id: Option<String>,
    /// Preferred day within range
    pub date_range: Option<DateRange>,
}

/// Filters for the booking list query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingFilters {
    /// Any of these statuses
    #[serde(default)]
    pub statuses: Vec<AppointmentStatus>,
    /// Assigned staff member
    pub staff_id: Option<String>,
    /// Customer
    pub customer_id: Option<String>,
    /// Start day within range
    pub date_range: Option<DateRange>,
    /// Substring of the confirmation code or notes
    pub search: Option<String>,
}

/// Row of the booking list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingListItem {
    /// The appointment
    #[serde(flatten)]
    pub appointment: Appointment,
    /// Customer display name
    pub customer_name: String,
    /// Staff display name
    pub staff_name: String,
    /// Service names in order
    pub services: Vec<String>,
    /// Confirmed but start time has passed
    pub is_past_due: bool,
    /// Booking can still be moved
    pub can_reschedule: bool,
    /// Booking can still be cancelled
    pub can_cancel: bool,
}

/// Contact details of a salon, used for calendar exports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalonInfo {
    /// Salon id
    pub id: String,
    /// Display name
    pub name: String,
    /// Street address
    pub address: Option<String>,
    /// Contact phone
    pub phone: Option<String>,
    /// Contact email
    pub email: Option<String>,
}

/// An appointment with its line items and related names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentDetails {
    /// The appointment
    pub appointment: Appointment,
    /// Line items in order
    pub services: Vec<AppointmentService>,
    /// Assigned staff member's display name
    pub staff_name: Option<String>,
    /// Salon contact details
    pub salon: SalonInfo,
}

/// Payment status change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentUpdate {
    /// New status
    pub status: PaymentStatus,
    /// Payment method
    pub method: Option<String>,
    /// Processor reference
    pub transaction_id: Option<String>,
}

/// Service popularity entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCount {
    /// Catalog service id
    pub service_id: String,
    /// Service name
    pub service_name: String,
    /// Times booked
    pub count: u32,
}

/// Staff workload entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffCount {
    /// Staff id
    pub staff_id: String,
    /// Staff display name
    pub staff_name: String,
    /// Bookings assigned
    pub bookings: u32,
}

/// Booking statistics over a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingAnalytics {
    /// All bookings in the period
    pub total_bookings: u32,
    /// Completed bookings
    pub completed_bookings: u32,
    /// Cancelled bookings
    pub cancelled_bookings: u32,
    /// No-shows
    pub no_show_bookings: u32,
    /// Mean hours between creation and start
    pub average_lead_time_hours: f64,
    /// Busiest start hours, `H:00`, busiest first
    pub peak_booking_times: Vec<String>,
    /// Most booked services
    pub popular_services: Vec<ServiceCount>,
    /// Busiest staff
    pub top_staff: Vec<StaffCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_happy_path() {
        use AppointmentStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(CheckedIn));
        assert!(CheckedIn.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        use AppointmentStatus::*;
        for terminal in [Completed, Cancelled, NoShow] {
            assert!(terminal.is_terminal());
            for next in [Pending, Confirmed, CheckedIn, InProgress, Completed, Cancelled, NoShow] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_cannot_check_in_cancelled() {
        assert!(!AppointmentStatus::Cancelled.can_transition_to(AppointmentStatus::CheckedIn));
    }

    #[test]
    fn test_status_round_trips_through_text() {
        let parsed: AppointmentStatus = "checked_in".parse().expect("parse");
        assert_eq!(parsed, AppointmentStatus::CheckedIn);
        assert!("finished".parse::<AppointmentStatus>().is_err());
    }

    #[test]
    fn test_request_totals_include_addons() {
        let request = BookingRequest {
            salon_id: "s".into(),
            staff_id: None,
            date: NaiveDate::from_ymd_opt(2026, 10, 20).expect("date"),
            time: "10:00".into(),
            services: vec![ServiceSelection {
                service_id: "cut".into(),
                service_name: "Cut".into(),
                duration_minutes: 45,
                price: 40.0,
                quantity: 1,
            }],
            addons: vec![ServiceSelection {
                service_id: "mask".into(),
                service_name: "Mask".into(),
                duration_minutes: 10,
                price: 7.5,
                quantity: 2,
            }],
            customer: None,
            payment_method: None,
            special_requests: None,
            source: BookingSource::Online,
        };
        assert!((request.subtotal() - 55.0).abs() < f64::EPSILON);
        assert_eq!(request.total_minutes(), Some(65));
    }
}
