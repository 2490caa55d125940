//! iCalendar export of a single appointment.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

use crate::models::{AppointmentDetails, AppointmentStatus};

const ICS_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const MAX_LINE_OCTETS: usize = 75;

/// Escape a TEXT value: backslash, comma, semicolon and newlines.
#[must_use]
pub fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ',' => escaped.push_str("\\,"),
            ';' => escaped.push_str("\\;"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            other => escaped.push(other),
        }
    }
    escaped
}

/// Fold a content line at 75 octets, continuation lines starting with a space.
fn fold_line(line: &str) -> String {
    let mut folded = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut octets = 0;
    for c in line.chars() {
        let width = c.len_utf8();
        if octets + width > MAX_LINE_OCTETS {
            folded.push_str("\r\n ");
            octets = 1;
        }
        folded.push(c);
        octets += width;
    }
    folded
}

fn to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&local)
        .earliest()
        .map_or_else(|| Utc.from_utc_datetime(&local), |dt| dt.with_timezone(&Utc))
}

fn ics_status(status: AppointmentStatus) -> &'static str {
    match status {
        AppointmentStatus::Pending => "TENTATIVE",
        AppointmentStatus::Cancelled | AppointmentStatus::NoShow => "CANCELLED",
        _ => "CONFIRMED",
    }
}

/// Render an appointment as an RFC 5545 calendar with one event.
#[must_use]
pub fn appointment_to_ics(details: &AppointmentDetails, now: DateTime<Utc>) -> String {
    let appointment = &details.appointment;
    let services = details
        .services
        .iter()
        .map(|s| s.service_name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let staff = details.staff_name.as_deref().unwrap_or("Any available");
    let location = match &details.salon.address {
        Some(address) => format!("{}, {address}", details.salon.name),
        None => details.salon.name.clone(),
    };
    let description = format!(
        "Confirmation Code: {}\nServices: {services}\nStaff: {staff}\nTotal: ${:.2}",
        appointment.confirmation_code, appointment.total_amount
    );

    let lines = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//Salon Booking//EN".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}@salon.com", appointment.confirmation_code),
        format!("DTSTAMP:{}", now.format(ICS_DATE_FORMAT)),
        format!("DTSTART:{}", to_utc(appointment.start_time).format(ICS_DATE_FORMAT)),
        format!("DTEND:{}", to_utc(appointment.end_time).format(ICS_DATE_FORMAT)),
        format!("SUMMARY:{}", escape_text(&format!("Salon Appointment - {services}"))),
        format!("DESCRIPTION:{}", escape_text(&description)),
        format!("LOCATION:{}", escape_text(&location)),
        format!("STATUS:{}", ics_status(appointment.status)),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ];

    let mut calendar = String::new();
    for line in &lines {
        calendar.push_str(&fold_line(line));
        calendar.push_str("\r\n");
    }
    calendar
}

/// File name offered for download
#[must_use]
pub fn ics_file_name(confirmation_code: &str) -> String {
    format!("appointment-{confirmation_code}.ics")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a,b;c\\d\ne"), "a\\,b\\;c\\\\d\\ne");
    }

    #[test]
    fn test_fold_long_lines() {
        let line = "X".repeat(160);
        let folded = fold_line(&line);
        let parts: Vec<_> = folded.split("\r\n").collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 75);
        assert!(parts[1].starts_with(' '));
        assert_eq!(parts[1].len(), 75);
        assert_eq!(folded.replace("\r\n ", ""), line);
    }

    #[test]
    fn test_short_line_untouched() {
        assert_eq!(fold_line("VERSION:2.0"), "VERSION:2.0");
    }
}
