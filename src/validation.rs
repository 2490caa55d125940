//! Validation utilities for input sanitization and edge case handling
//!
//! Single-value checks return the message for the offending value. The
//! composite validators collect those messages per field and fail with
//! [`SalonError::Validation`].

use chrono::NaiveDate;

use crate::error::{FieldErrors, Result, SalonError};
use crate::models::{
    BookingRequest, NewLoyaltyProgram, NewStaffProfile, NewStaffSchedule, ServiceSelection,
    TransactionType,
};
use crate::utils::parse_hhmm;

/// Outcome of a single-value check
pub type Check = std::result::Result<(), String>;

/// Longest accepted appointment or service length, in minutes
pub const MAX_DURATION_MINUTES: u32 = 720;
/// Longest accepted query range, in days
pub const MAX_RANGE_DAYS: i64 = 366;
/// Most units of one service on a single appointment
pub const MAX_QUANTITY: u32 = 20;
/// Largest points amount a single ledger movement may carry
pub const MAX_POINTS_PER_TRANSACTION: i64 = 1_000_000;

/// Accumulates field errors for one input.
#[derive(Debug, Default)]
pub struct FieldCollector {
    errors: FieldErrors,
}

impl FieldCollector {
    /// Record the outcome of a check under `field`.
    pub fn check(&mut self, field: &str, outcome: Check) -> &mut Self {
        if let Err(message) = outcome {
            self.errors.entry(field.to_string()).or_default().push(message);
        }
        self
    }

    /// Record an error unconditionally.
    pub fn push(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
        self
    }

    /// Fail with every collected error, if any.
    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(SalonError::Validation(self.errors))
        }
    }
}

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a person or staff name
    pub fn validate_name(name: &str) -> Check {
        if name.trim().is_empty() {
            return Err("Name cannot be empty".into());
        }

        if name.chars().count() > 100 {
            return Err("Name too long (max 100 characters)".into());
        }

        if name.chars().any(char::is_control) {
            return Err("Name contains invalid characters".into());
        }

        Ok(())
    }

    /// Validate phone number format
    pub fn validate_phone(phone: &str) -> Check {
        if phone.trim().is_empty() {
            return Err("Phone number cannot be empty".into());
        }

        if phone
            .chars()
            .any(|c| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' ' | '.')))
        {
            return Err("Phone number contains invalid characters".into());
        }

        let digits = phone.chars().filter(char::is_ascii_digit).count();
        if !(7..=15).contains(&digits) {
            return Err("Phone number must be between 7 and 15 digits".into());
        }

        Ok(())
    }

    /// Validate email format
    pub fn validate_email(email: &str) -> Check {
        if email.trim().is_empty() {
            return Err("Email cannot be empty".into());
        }

        if email.len() > 254 {
            return Err("Email too long (max 254 characters)".into());
        }

        let Some((local_part, domain_part)) = email.split_once('@') else {
            return Err("Email must contain @ symbol".into());
        };

        if domain_part.contains('@') {
            return Err("Email must have exactly one @ symbol".into());
        }

        if local_part.is_empty() || local_part.len() > 64 {
            return Err("Email local part invalid".into());
        }

        if domain_part.is_empty()
            || !domain_part.contains('.')
            || domain_part.starts_with('.')
            || domain_part.ends_with('.')
        {
            return Err("Email domain invalid".into());
        }

        Ok(())
    }

    /// Validate an `HH:MM` time of day
    pub fn validate_time(value: &str) -> Check {
        parse_hhmm(value)
            .map(|_| ())
            .ok_or_else(|| format!("Invalid time '{value}', expected HH:MM"))
    }

    /// Validate a service or appointment length
    pub fn validate_duration(minutes: u32) -> Check {
        if minutes == 0 {
            return Err("Duration must be greater than 0".into());
        }

        if minutes > MAX_DURATION_MINUTES {
            return Err(format!(
                "Duration too long (max {MAX_DURATION_MINUTES} minutes)"
            ));
        }

        Ok(())
    }

    /// Validate a price or amount of money
    pub fn validate_price(price: f64) -> Check {
        if !price.is_finite() {
            return Err("Price must be a number".into());
        }

        if price < 0.0 {
            return Err("Price cannot be negative".into());
        }

        Ok(())
    }

    /// Validate a line item quantity
    pub fn validate_quantity(quantity: u32) -> Check {
        if quantity == 0 {
            return Err("Quantity must be at least 1".into());
        }

        if quantity > MAX_QUANTITY {
            return Err(format!("Quantity too large (max {MAX_QUANTITY})"));
        }

        Ok(())
    }

    /// Validate a points amount for a ledger movement
    pub fn validate_points(points: i64, transaction_type: TransactionType) -> Check {
        if points.unsigned_abs() > MAX_POINTS_PER_TRANSACTION.unsigned_abs() {
            return Err(format!(
                "Points amount too large (max {MAX_POINTS_PER_TRANSACTION} per transaction)"
            ));
        }
        match transaction_type {
            TransactionType::Adjusted if points == 0 => {
                Err("Adjustment cannot be zero".into())
            }
            TransactionType::Earned | TransactionType::Redeemed | TransactionType::Expired
                if points <= 0 =>
            {
                Err("Points must be positive".into())
            }
            _ => Ok(()),
        }
    }

    /// Validate a free-text description or reason
    pub fn validate_description(text: &str) -> Check {
        if text.trim().is_empty() {
            return Err("Description is required".into());
        }

        if text.chars().count() > 500 {
            return Err("Description too long (max 500 characters)".into());
        }

        Ok(())
    }

    /// Validate a commission percentage
    pub fn validate_commission_rate(rate: f64) -> Check {
        if !rate.is_finite() || !(0.0..=100.0).contains(&rate) {
            return Err("Commission rate must be between 0 and 100".into());
        }

        Ok(())
    }

    /// Validate a recurrence interval
    pub fn validate_interval(interval: u32) -> Check {
        if interval == 0 {
            return Err("Interval must be at least 1".into());
        }

        Ok(())
    }

    /// Validate date range
    pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Check {
        if start > end {
            return Err("Start date cannot be after end date".into());
        }

        let days = (end - start).num_days();
        if days > MAX_RANGE_DAYS {
            return Err(format!(
                "Date range too large ({days} days). Maximum supported range is {MAX_RANGE_DAYS} days"
            ));
        }

        Ok(())
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn check_selections(fields: &mut FieldCollector, field: &str, selections: &[ServiceSelection]) {
        for (idx, selection) in selections.iter().enumerate() {
            let prefix = format!("{field}[{idx}]");
            fields
                .check(&format!("{prefix}.service_name"), Self::validate_name(&selection.service_name))
                .check(
                    &format!("{prefix}.duration_minutes"),
                    Self::validate_duration(selection.duration_minutes),
                )
                .check(&format!("{prefix}.price"), Self::validate_price(selection.price))
                .check(&format!("{prefix}.quantity"), Self::validate_quantity(selection.quantity));
            if selection.service_id.trim().is_empty() {
                fields.push(&format!("{prefix}.service_id"), "Service is required");
            }
        }
    }

    /// Validate a booking request
    pub fn validate_booking_request(request: &BookingRequest) -> Result<()> {
        let mut fields = FieldCollector::default();

        if request.salon_id.trim().is_empty() {
            fields.push("salon_id", "Salon is required");
        }
        if request.services.is_empty() {
            fields.push("services", "At least one service is required");
        }
        fields.check("time", Self::validate_time(&request.time));
        Self::check_selections(&mut fields, "services", &request.services);
        Self::check_selections(&mut fields, "addons", &request.addons);

        if request.total_minutes().map_or(true, |m| m > MAX_DURATION_MINUTES) {
            fields.push("services", "Booking is too long for a single appointment");
        }

        if let Some(customer) = &request.customer {
            fields
                .check("customer.first_name", Self::validate_name(&customer.first_name))
                .check("customer.last_name", Self::validate_name(&customer.last_name))
                .check("customer.email", Self::validate_email(&customer.email));
            if let Some(phone) = &customer.phone {
                fields.check("customer.phone", Self::validate_phone(phone));
            }
        }

        if let Some(requests) = &request.special_requests {
            if requests.chars().count() > 500 {
                fields.push("special_requests", "Special requests too long (max 500 characters)");
            }
        }

        fields.finish()
    }

    /// Validate a new staff profile
    pub fn validate_staff_profile(profile: &NewStaffProfile) -> Result<()> {
        let mut fields = FieldCollector::default();

        fields
            .check("display_name", Self::validate_name(&profile.display_name))
            .check("first_name", Self::validate_name(&profile.first_name))
            .check("last_name", Self::validate_name(&profile.last_name))
            .check("email", Self::validate_email(&profile.email))
            .check("commission_rate", Self::validate_commission_rate(profile.commission_rate));

        if let Some(phone) = &profile.phone {
            fields.check("phone", Self::validate_phone(phone));
        }
        if let Some(rate) = profile.hourly_rate {
            fields.check("hourly_rate", Self::validate_price(rate));
        }
        if profile.experience_years.is_some_and(|years| years > 80) {
            fields.push("experience_years", "Experience must be 80 years or less");
        }

        fields.finish()
    }

    /// Validate a day's schedule, including its break window
    pub fn validate_schedule(schedule: &NewStaffSchedule) -> Result<()> {
        let mut fields = FieldCollector::default();

        if schedule.day_of_week > 6 {
            fields.push("day_of_week", "Day of week must be between 0 (Sunday) and 6 (Saturday)");
        }

        let start = parse_hhmm(&schedule.start_time);
        let end = parse_hhmm(&schedule.end_time);
        fields
            .check("start_time", Self::validate_time(&schedule.start_time))
            .check("end_time", Self::validate_time(&schedule.end_time));
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                fields.push("end_time", "End time must be after start time");
            }
        }

        match (&schedule.break_start, &schedule.break_end) {
            (None, None) => {}
            (Some(break_start), Some(break_end)) => {
                let b_start = parse_hhmm(break_start);
                let b_end = parse_hhmm(break_end);
                fields
                    .check("break_start", Self::validate_time(break_start))
                    .check("break_end", Self::validate_time(break_end));
                if let (Some(b_start), Some(b_end), Some(start), Some(end)) =
                    (b_start, b_end, start, end)
                {
                    if b_start >= b_end {
                        fields.push("break_end", "Break end must be after break start");
                    } else if b_start < start || b_end > end {
                        fields.push("break_start", "Break must fall within working hours");
                    }
                }
            }
            _ => {
                fields.push("break_end", "Break needs both a start and an end");
            }
        }

        fields.finish()
    }

    /// Validate a new loyalty program
    pub fn validate_program(program: &NewLoyaltyProgram) -> Result<()> {
        let mut fields = FieldCollector::default();

        fields.check("name", Self::validate_name(&program.name));
        if !program.points_per_dollar.is_finite() || program.points_per_dollar < 0.0 {
            fields.push("points_per_dollar", "Points per dollar cannot be negative");
        }
        if program.points_per_visit < 0 {
            fields.push("points_per_visit", "Points per visit cannot be negative");
        }
        if let Some(description) = &program.description {
            if description.chars().count() > 500 {
                fields.push("description", "Description too long (max 500 characters)");
            }
        }

        fields.finish()
    }
}
