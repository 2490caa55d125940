use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::text_enum;

/// Employment arrangement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentType {
    /// Full-time employee
    #[default]
    FullTime,
    /// Part-time employee
    PartTime,
    /// Fixed-term contractor
    Contract,
    /// Chair renter / freelancer
    Freelance,
}

text_enum!(EmploymentType {
    FullTime => "full_time",
    PartTime => "part_time",
    Contract => "contract",
    Freelance => "freelance",
});

/// Staff profile row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffProfile {
    /// Primary key
    pub id: String,
    /// Employing salon
    pub salon_id: String,
    /// Linked login profile
    pub user_id: Option<String>,
    /// Name shown to customers
    pub display_name: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Work email
    pub email: String,
    /// Work phone
    pub phone: Option<String>,
    /// Job title
    pub title: Option<String>,
    /// Short biography
    pub bio: Option<String>,
    /// Years of experience
    pub experience_years: Option<u32>,
    /// Employment arrangement
    pub employment_type: EmploymentType,
    /// Commission in percent
    pub commission_rate: f64,
    /// Hourly wage
    pub hourly_rate: Option<f64>,
    /// Soft-delete flag
    pub is_active: bool,
    /// Whether customers can book this person
    pub is_bookable: bool,
    /// Highlighted in listings
    pub is_featured: bool,
    /// Start date
    pub hired_at: NaiveDate,
    /// Soft-delete stamp
    pub terminated_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a staff profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStaffProfile {
    /// Employing salon
    pub salon_id: String,
    /// Linked login profile
    pub user_id: Option<String>,
    /// Name shown to customers
    pub display_name: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Work email
    pub email: String,
    /// Work phone
    pub phone: Option<String>,
    /// Job title
    pub title: Option<String>,
    /// Short biography
    pub bio: Option<String>,
    /// Years of experience
    pub experience_years: Option<u32>,
    /// Employment arrangement
    #[serde(default)]
    pub employment_type: EmploymentType,
    /// Commission in percent
    #[serde(default)]
    pub commission_rate: f64,
    /// Hourly wage
    pub hourly_rate: Option<f64>,
    /// Bookable flag
    #[serde(default = "default_bookable")]
    pub is_bookable: bool,
    /// Start date, defaults to today
    pub hired_at: Option<NaiveDate>,
}

const fn default_bookable() -> bool {
    true
}

/// Partial staff profile update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaffProfileUpdate {
    /// New display name
    pub display_name: Option<String>,
    /// New given name
    pub first_name: Option<String>,
    /// New family name
    pub last_name: Option<String>,
    /// New email
    pub email: Option<String>,
    /// New phone
    pub phone: Option<String>,
    /// New title
    pub title: Option<String>,
    /// New biography
    pub bio: Option<String>,
    /// New experience
    pub experience_years: Option<u32>,
    /// New employment arrangement
    pub employment_type: Option<EmploymentType>,
    /// New hourly wage
    pub hourly_rate: Option<f64>,
}

/// Weekly working hours for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffSchedule {
    /// Primary key
    pub id: String,
    /// Staff member
    pub staff_id: String,
    /// 0 = Sunday … 6 = Saturday
    pub day_of_week: u8,
    /// Shift start `HH:MM`
    pub start_time: String,
    /// Shift end `HH:MM`
    pub end_time: String,
    /// Break start `HH:MM`
    pub break_start: Option<String>,
    /// Break end `HH:MM`
    pub break_end: Option<String>,
    /// Day off when false
    pub is_working: bool,
}

/// Data for creating or replacing a day's schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStaffSchedule {
    /// Staff member
    pub staff_id: String,
    /// 0 = Sunday … 6 = Saturday
    pub day_of_week: u8,
    /// Shift start `HH:MM`
    pub start_time: String,
    /// Shift end `HH:MM`
    pub end_time: String,
    /// Break start `HH:MM`
    pub break_start: Option<String>,
    /// Break end `HH:MM`
    pub break_end: Option<String>,
    /// Day off when false
    #[serde(default = "default_bookable")]
    pub is_working: bool,
}

/// Ad-hoc unavailable period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedTime {
    /// Primary key
    pub id: String,
    /// Staff member
    pub staff_id: String,
    /// Salon-local start
    pub start_time: NaiveDateTime,
    /// Salon-local end
    pub end_time: NaiveDateTime,
    /// Reason
    pub reason: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Data for blocking time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBlockedTime {
    /// Staff member
    pub staff_id: String,
    /// Salon-local start
    pub start_time: NaiveDateTime,
    /// Salon-local end
    pub end_time: NaiveDateTime,
    /// Reason
    pub reason: Option<String>,
}

/// Filters for the staff list query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaffFilters {
    /// Active flag
    pub is_active: Option<bool>,
    /// Bookable flag
    pub is_bookable: Option<bool>,
    /// Substring of the display name or email
    pub search: Option<String>,
}

/// One failed id in a bulk operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    /// Staff id
    pub id: String,
    /// Error message
    pub error: String,
}

/// Outcome of a bulk staff operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    /// Ids that were updated
    pub succeeded: Vec<String>,
    /// Ids that failed, with the reason
    pub failed: Vec<BulkFailure>,
}
