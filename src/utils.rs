//! Utility functions shared by the booking and loyalty code.
//!
//! Time-of-day values travel as `HH:MM` strings and are handled internally as
//! minutes since midnight.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Source of "now", injectable for tests.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// Current salon-local time.
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Parse `HH:MM` (or `HH:MM:SS`, seconds ignored) into minutes since midnight.
///
/// Returns `None` for anything that is not a valid time of day.
#[must_use]
pub fn parse_hhmm(value: &str) -> Option<u32> {
    let mut parts = value.trim().split(':');
    let hours: u32 = parts.next()?.parse().ok()?;
    let minutes: u32 = parts.next()?.parse().ok()?;
    if let Some(seconds) = parts.next() {
        let seconds: u32 = seconds.parse().ok()?;
        if seconds > 59 {
            return None;
        }
    }
    if parts.next().is_some() || hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Format minutes since midnight as `HH:MM`.
#[must_use]
pub fn format_minutes(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Minutes since midnight of a timestamp.
#[must_use]
pub fn minutes_of_day(at: &NaiveDateTime) -> u32 {
    at.hour() * 60 + at.minute()
}

/// Combine a date and minutes since midnight.
#[must_use]
pub fn at_minutes(date: NaiveDate, minutes: u32) -> NaiveDateTime {
    let time = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap_or(NaiveTime::MIN);
    date.and_time(time)
}

/// Booking confirmation code: `BK` followed by the millisecond timestamp in
/// upper-case base 36.
#[must_use]
pub fn confirmation_code(millis: i64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut value = millis.unsigned_abs();
    let mut encoded = Vec::new();
    loop {
        // value % 36 < 36, the index is always in range
        encoded.push(DIGITS[(value % 36) as usize]);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    encoded.reverse();
    format!("BK{}", String::from_utf8_lossy(&encoded))
}

/// Round a money amount to cents.
#[must_use]
pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Fresh row identifier.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
