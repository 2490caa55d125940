use std::collections::HashMap;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, Timelike, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use tracing::{debug, info};

use super::{day_bounds, placeholders, qualified, range_bounds};
use crate::db::{collect_rows, json_column, Database};
use crate::error::{Result, SalonError};
use crate::models::{
    Appointment, AppointmentDetails, AppointmentService, AppointmentStatus, BookingAnalytics,
    BookingFilters, BookingListItem, BookingSource, NewWaitingListEntry, PaymentStatus,
    PaymentUpdate, SalonInfo, ServiceCount, ServiceSelection, StaffCount, WaitingListEntry,
    WaitingListFilters,
};
use crate::schema::{appointment_services, appointments, profiles, salons, staff_profiles, waiting_list};
use crate::utils::{new_id, round_money};

/// Fully resolved appointment, ready to be written
#[derive(Debug, Clone)]
pub struct NewAppointment {
    /// Salon
    pub salon_id: String,
    /// Customer profile id
    pub customer_id: String,
    /// Staff member
    pub staff_id: Option<String>,
    /// Salon-local start
    pub start_time: NaiveDateTime,
    /// Line items in execution order
    pub services: Vec<ServiceSelection>,
    /// Tax applied to the subtotal
    pub tax_rate: f64,
    /// Code shown to the customer
    pub confirmation_code: String,
    /// Payment method type
    pub payment_method: Option<String>,
    /// Customer-visible notes
    pub notes: Option<String>,
    /// Booking channel
    pub booking_source: BookingSource,
}

impl NewAppointment {
    /// Σ duration × quantity, saturating
    #[must_use]
    pub fn duration_minutes(&self) -> u32 {
        self.services
            .iter()
            .map(|s| s.line_minutes().unwrap_or(u32::MAX))
            .fold(0, u32::saturating_add)
    }

    /// Salon-local end
    #[must_use]
    pub fn end_time(&self) -> NaiveDateTime {
        self.start_time + Duration::minutes(i64::from(self.duration_minutes()))
    }

    /// `(subtotal, tax, total)`, each rounded to cents
    #[must_use]
    pub fn totals(&self) -> (f64, f64, f64) {
        let subtotal: f64 = self.services.iter().map(ServiceSelection::line_total).sum();
        let tax = subtotal * self.tax_rate;
        (round_money(subtotal), round_money(tax), round_money(subtotal + tax))
    }
}

fn map_appointment(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: row.get("id")?,
        salon_id: row.get("salon_id")?,
        customer_id: row.get("customer_id")?,
        staff_id: row.get("staff_id")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        duration_minutes: row.get("duration_minutes")?,
        status: row.get("status")?,
        confirmation_code: row.get("confirmation_code")?,
        service_count: row.get("service_count")?,
        subtotal: row.get("subtotal")?,
        tax_amount: row.get("tax_amount")?,
        discount_amount: row.get("discount_amount")?,
        tip_amount: row.get("tip_amount")?,
        total_amount: row.get("total_amount")?,
        payment_status: row.get("payment_status")?,
        payment_method: row.get("payment_method")?,
        transaction_id: row.get("transaction_id")?,
        paid_at: row.get("paid_at")?,
        notes: row.get("notes")?,
        internal_notes: row.get("internal_notes")?,
        booking_source: row.get("booking_source")?,
        cancelled_at: row.get("cancelled_at")?,
        cancelled_by: row.get("cancelled_by")?,
        cancellation_reason: row.get("cancellation_reason")?,
        checked_in_at: row.get("checked_in_at")?,
        checked_in_by: row.get("checked_in_by")?,
        completed_at: row.get("completed_at")?,
        completed_by: row.get("completed_by")?,
        marked_no_show_at: row.get("marked_no_show_at")?,
        marked_no_show_by: row.get("marked_no_show_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn map_appointment_service(row: &Row<'_>) -> rusqlite::Result<AppointmentService> {
    Ok(AppointmentService {
        id: row.get("id")?,
        appointment_id: row.get("appointment_id")?,
        service_id: row.get("service_id")?,
        staff_id: row.get("staff_id")?,
        service_name: row.get("service_name")?,
        duration_minutes: row.get("duration_minutes")?,
        unit_price: row.get("unit_price")?,
        quantity: row.get("quantity")?,
        discount_percentage: row.get("discount_percentage")?,
        subtotal: row.get("subtotal")?,
        service_order: row.get("service_order")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        is_completed: row.get("is_completed")?,
    })
}

fn map_waiting_entry(row: &Row<'_>) -> rusqlite::Result<WaitingListEntry> {
    Ok(WaitingListEntry {
        id: row.get("id")?,
        salon_id: row.get("salon_id")?,
        customer_id: row.get("customer_id")?,
        service_ids: json_column(row, "service_ids")?,
        preferred_staff_id: row.get("preferred_staff_id")?,
        preferred_date: row.get("preferred_date")?,
        preferred_time: row.get("preferred_time")?,
        notes: row.get("notes")?,
        notified: row.get("notified")?,
        notified_at: row.get("notified_at")?,
        created_at: row.get("created_at")?,
    })
}

/// Ids of the appointments of `staff_id` that occupy any of `[start, end)`.
pub(crate) fn overlapping_appointments(
    conn: &Connection,
    staff_id: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    ignore: Option<&str>,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {} WHERE staff_id = ?1 AND {} NOT IN ('cancelled', 'no_show') \
         AND start_time < ?3 AND end_time > ?2 AND id != ?4",
        appointments::TABLE,
        appointments::STATUS
    ))?;
    let rows = stmt.query_map(params![staff_id, start, end, ignore.unwrap_or("")], |row| {
        row.get::<_, String>(0)
    })?;
    collect_rows(rows)
}

fn load_appointment(conn: &Connection, appointment_id: &str) -> Result<Appointment> {
    conn.query_row(
        &format!("SELECT {} FROM {} WHERE id = ?", appointments::COLUMNS, appointments::TABLE),
        params![appointment_id],
        map_appointment,
    )
    .optional()?
    .ok_or_else(|| SalonError::NotFound(format!("Appointment {appointment_id}")))
}

/// One appointment with what analytics needs to know about it
#[derive(Debug, Clone)]
struct AnalyticsRow {
    appointment: Appointment,
    staff_name: Option<String>,
    services: Vec<(String, String)>,
}

fn top_n<K: Ord + Clone>(counts: HashMap<K, (String, u32)>, n: usize) -> Vec<(K, String, u32)> {
    let mut entries: Vec<(K, String, u32)> = counts
        .into_iter()
        .map(|(key, (name, count))| (key, name, count))
        .collect();
    entries.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}

fn summarize_bookings(rows: &[AnalyticsRow]) -> BookingAnalytics {
    let mut services: HashMap<String, (String, u32)> = HashMap::new();
    let mut staff: HashMap<String, (String, u32)> = HashMap::new();
    let mut hours: HashMap<u32, (String, u32)> = HashMap::new();
    let mut total_lead_minutes = 0_i64;
    let count_status = |status: AppointmentStatus| {
        u32::try_from(rows.iter().filter(|r| r.appointment.status == status).count())
            .unwrap_or(u32::MAX)
    };

    for row in rows {
        let appointment = &row.appointment;
        let created = appointment.created_at.with_timezone(&Local).naive_local();
        total_lead_minutes += (appointment.start_time - created).num_minutes();

        for (service_id, service_name) in &row.services {
            services
                .entry(service_id.clone())
                .or_insert_with(|| (service_name.clone(), 0))
                .1 += 1;
        }
        if let (Some(staff_id), Some(name)) = (&appointment.staff_id, &row.staff_name) {
            staff.entry(staff_id.clone()).or_insert_with(|| (name.clone(), 0)).1 += 1;
        }
        let hour = appointment.start_time.hour();
        hours.entry(hour).or_insert_with(|| (format!("{hour}:00"), 0)).1 += 1;
    }

    let average_lead_time_hours = if rows.is_empty() {
        0.0
    } else {
        total_lead_minutes as f64 / 60.0 / rows.len() as f64
    };

    BookingAnalytics {
        total_bookings: u32::try_from(rows.len()).unwrap_or(u32::MAX),
        completed_bookings: count_status(AppointmentStatus::Completed),
        cancelled_bookings: count_status(AppointmentStatus::Cancelled),
        no_show_bookings: count_status(AppointmentStatus::NoShow),
        average_lead_time_hours,
        peak_booking_times: top_n(hours, 3).into_iter().map(|(_, label, _)| label).collect(),
        popular_services: top_n(services, 5)
            .into_iter()
            .map(|(service_id, service_name, count)| ServiceCount {
                service_id,
                service_name,
                count,
            })
            .collect(),
        top_staff: top_n(staff, 5)
            .into_iter()
            .map(|(staff_id, staff_name, bookings)| StaffCount {
                staff_id,
                staff_name,
                bookings,
            })
            .collect(),
    }
}

impl Database {
    /// Write an appointment and its line items in one transaction.
    ///
    /// Fails with [`SalonError::SlotConflict`] when the staff member already
    /// has an overlapping appointment.
    pub fn insert_appointment(&self, new: &NewAppointment, now: DateTime<Utc>) -> Result<Appointment> {
        let (subtotal, tax_amount, total_amount) = new.totals();
        let appointment = Appointment {
            id: new_id(),
            salon_id: new.salon_id.clone(),
            customer_id: new.customer_id.clone(),
            staff_id: new.staff_id.clone(),
            start_time: new.start_time,
            end_time: new.end_time(),
            duration_minutes: new.duration_minutes(),
            status: AppointmentStatus::Pending,
            confirmation_code: new.confirmation_code.clone(),
            service_count: u32::try_from(new.services.len()).unwrap_or(u32::MAX),
            subtotal,
            tax_amount,
            discount_amount: 0.0,
            tip_amount: 0.0,
            total_amount,
            payment_status: PaymentStatus::Pending,
            payment_method: new.payment_method.clone(),
            transaction_id: None,
            paid_at: None,
            notes: new.notes.clone(),
            internal_notes: None,
            booking_source: new.booking_source,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            checked_in_at: None,
            checked_in_by: None,
            completed_at: None,
            completed_by: None,
            marked_no_show_at: None,
            marked_no_show_by: None,
            created_at: now,
            updated_at: now,
        };

        self.with_transaction(|tx| {
            if let Some(staff_id) = &appointment.staff_id {
                let clashes = overlapping_appointments(
                    tx,
                    staff_id,
                    appointment.start_time,
                    appointment.end_time,
                    None,
                )?;
                if !clashes.is_empty() {
                    return Err(SalonError::SlotConflict(format!(
                        "{} overlaps {}",
                        appointment.start_time,
                        clashes.join(", ")
                    )));
                }
            }

            tx.execute(
                &format!(
                    "INSERT INTO {} (id, salon_id, customer_id, staff_id, start_time, end_time, \
                     duration_minutes, status, confirmation_code, service_count, subtotal, \
                     tax_amount, total_amount, payment_status, payment_method, notes, \
                     booking_source, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    appointments::TABLE
                ),
                params![
                    appointment.id,
                    appointment.salon_id,
                    appointment.customer_id,
                    appointment.staff_id,
                    appointment.start_time,
                    appointment.end_time,
                    appointment.duration_minutes,
                    appointment.status,
                    appointment.confirmation_code,
                    appointment.service_count,
                    appointment.subtotal,
                    appointment.tax_amount,
                    appointment.total_amount,
                    appointment.payment_status,
                    appointment.payment_method,
                    appointment.notes,
                    appointment.booking_source,
                    appointment.created_at,
                    appointment.updated_at
                ],
            )?;

            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                appointment_services::TABLE,
                appointment_services::COLUMNS
            ))?;
            let mut cursor = appointment.start_time;
            for (idx, service) in new.services.iter().enumerate() {
                let minutes = service.line_minutes().unwrap_or(u32::MAX);
                let item_end = cursor + Duration::minutes(i64::from(minutes));
                stmt.execute(params![
                    new_id(),
                    appointment.id,
                    service.service_id,
                    appointment.staff_id,
                    service.service_name,
                    service.duration_minutes,
                    service.price,
                    service.quantity,
                    0.0_f64,
                    round_money(service.line_total()),
                    u32::try_from(idx + 1).unwrap_or(u32::MAX),
                    cursor,
                    item_end,
                    false
                ])?;
                cursor = item_end;
            }
            Ok(())
        })?;

        info!(
            appointment_id = %appointment.id,
            code = %appointment.confirmation_code,
            "Appointment created"
        );
        Ok(appointment)
    }

    /// Get an appointment by id
    pub fn get_appointment(&self, appointment_id: &str) -> Result<Option<Appointment>> {
        let conn = self.get_connection()?;
        match load_appointment(&conn, appointment_id) {
            Ok(appointment) => Ok(Some(appointment)),
            Err(SalonError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Line items of an appointment in execution order
    pub fn get_appointment_services(&self, appointment_id: &str) -> Result<Vec<AppointmentService>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE appointment_id = ? ORDER BY service_order",
            appointment_services::COLUMNS,
            appointment_services::TABLE
        ))?;
        let rows = stmt.query_map(params![appointment_id], map_appointment_service)?;
        collect_rows(rows)
    }

    /// Appointment with line items, staff name and salon contact details
    pub fn get_appointment_details(&self, appointment_id: &str) -> Result<Option<AppointmentDetails>> {
        let Some(appointment) = self.get_appointment(appointment_id)? else {
            return Ok(None);
        };
        let services = self.get_appointment_services(appointment_id)?;
        let conn = self.get_connection()?;

        let staff_name = match &appointment.staff_id {
            Some(staff_id) => conn
                .query_row(
                    &format!("SELECT display_name FROM {} WHERE id = ?", staff_profiles::TABLE),
                    params![staff_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?,
            None => None,
        };

        let salon = conn.query_row(
            &format!("SELECT id, name, address, phone, email FROM {} WHERE id = ?", salons::TABLE),
            params![appointment.salon_id],
            |row| {
                Ok(SalonInfo {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    address: row.get(2)?,
                    phone: row.get(3)?,
                    email: row.get(4)?,
                })
            },
        )?;

        Ok(Some(AppointmentDetails {
            appointment,
            services,
            staff_name,
            salon,
        }))
    }

    /// Move an appointment along its lifecycle, stamping who did it and when.
    pub fn update_appointment_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
        actor: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        self.with_transaction(|tx| {
            let current = load_appointment(tx, appointment_id)?;
            if !current.status.can_transition_to(status) {
                return Err(SalonError::InvalidTransition {
                    from: current.status.to_string(),
                    to: status.to_string(),
                });
            }

            let mut assignments = vec!["status = ?".to_string(), "updated_at = ?".to_string()];
            let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(status), Box::new(now)];
            let stamp = match status {
                AppointmentStatus::Cancelled => Some(("cancelled_at", "cancelled_by")),
                AppointmentStatus::CheckedIn => Some(("checked_in_at", "checked_in_by")),
                AppointmentStatus::Completed => Some(("completed_at", "completed_by")),
                AppointmentStatus::NoShow => Some(("marked_no_show_at", "marked_no_show_by")),
                AppointmentStatus::Pending
                | AppointmentStatus::Confirmed
                | AppointmentStatus::InProgress => None,
            };
            if let Some((at_column, by_column)) = stamp {
                assignments.push(format!("{at_column} = ?"));
                values.push(Box::new(now));
                assignments.push(format!("{by_column} = ?"));
                values.push(Box::new(actor.to_string()));
            }
            if status == AppointmentStatus::Cancelled {
                assignments.push("cancellation_reason = ?".to_string());
                values.push(Box::new(reason.map(str::to_string)));
            }
            values.push(Box::new(appointment_id.to_string()));

            tx.execute(
                &format!(
                    "UPDATE {} SET {} WHERE id = ?",
                    appointments::TABLE,
                    assignments.join(", ")
                ),
                params_from_iter(values.iter()),
            )?;

            if status == AppointmentStatus::Completed {
                tx.execute(
                    &format!(
                        "UPDATE {} SET is_completed = 1 WHERE appointment_id = ?",
                        appointment_services::TABLE
                    ),
                    params![appointment_id],
                )?;
            }

            debug!(appointment_id, from = %current.status, to = %status, "Status changed");
            load_appointment(tx, appointment_id)
        })
    }

    /// Move an appointment to a new start, keeping its duration.
    ///
    /// Line items shift by the same offset and follow a staff change.
    pub fn reschedule_appointment(
        &self,
        appointment_id: &str,
        new_start: NaiveDateTime,
        new_staff_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        self.with_transaction(|tx| {
            let current = load_appointment(tx, appointment_id)?;
            if !current.status.is_modifiable() {
                return Err(SalonError::InvalidTransition {
                    from: current.status.to_string(),
                    to: "rescheduled".to_string(),
                });
            }

            let new_end = new_start + Duration::minutes(i64::from(current.duration_minutes));
            let staff_id = new_staff_id.map(str::to_string).or_else(|| current.staff_id.clone());
            if let Some(staff_id) = &staff_id {
                let clashes =
                    overlapping_appointments(tx, staff_id, new_start, new_end, Some(appointment_id))?;
                if !clashes.is_empty() {
                    return Err(SalonError::SlotConflict(format!(
                        "{new_start} overlaps {}",
                        clashes.join(", ")
                    )));
                }
            }

            tx.execute(
                &format!(
                    "UPDATE {} SET start_time = ?, end_time = ?, staff_id = ?, updated_at = ? WHERE id = ?",
                    appointments::TABLE
                ),
                params![new_start, new_end, staff_id, now, appointment_id],
            )?;

            let offset = new_start - current.start_time;
            let items = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {} FROM {} WHERE appointment_id = ?",
                    appointment_services::COLUMNS,
                    appointment_services::TABLE
                ))?;
                let rows = stmt.query_map(params![appointment_id], map_appointment_service)?;
                collect_rows(rows)?
            };
            for item in items {
                let item_staff = new_staff_id.map(str::to_string).or(item.staff_id);
                tx.execute(
                    &format!(
                        "UPDATE {} SET start_time = ?, end_time = ?, staff_id = ? WHERE id = ?",
                        appointment_services::TABLE
                    ),
                    params![item.start_time + offset, item.end_time + offset, item_staff, item.id],
                )?;
            }

            load_appointment(tx, appointment_id)
        })
    }

    /// Replace the public or internal notes of an appointment.
    pub fn set_appointment_notes(
        &self,
        appointment_id: &str,
        notes: &str,
        internal: bool,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        let column = if internal { "internal_notes" } else { "notes" };
        let conn = self.get_connection()?;
        let changed = conn.execute(
            &format!("UPDATE {} SET {column} = ?, updated_at = ? WHERE id = ?", appointments::TABLE),
            params![notes, now, appointment_id],
        )?;
        if changed == 0 {
            return Err(SalonError::NotFound(format!("Appointment {appointment_id}")));
        }
        load_appointment(&conn, appointment_id)
    }

    /// Record a payment status change. Paying stamps `paid_at`.
    pub fn update_payment(
        &self,
        appointment_id: &str,
        update: &PaymentUpdate,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        let paid_at = (update.status == PaymentStatus::Paid).then_some(now);
        let conn = self.get_connection()?;
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET payment_status = ?, payment_method = COALESCE(?, payment_method), \
                 transaction_id = COALESCE(?, transaction_id), paid_at = COALESCE(?, paid_at), \
                 updated_at = ? WHERE id = ?",
                appointments::TABLE
            ),
            params![
                update.status,
                update.method,
                update.transaction_id,
                paid_at,
                now,
                appointment_id
            ],
        )?;
        if changed == 0 {
            return Err(SalonError::NotFound(format!("Appointment {appointment_id}")));
        }
        load_appointment(&conn, appointment_id)
    }

    /// Add a customer to the waiting list
    pub fn insert_waiting_list_entry(
        &self,
        entry: &NewWaitingListEntry,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> Result<WaitingListEntry> {
        let stored = WaitingListEntry {
            id: new_id(),
            salon_id: entry.salon_id.clone(),
            customer_id: customer_id.to_string(),
            service_ids: entry.service_ids.clone(),
            preferred_staff_id: entry.preferred_staff_id.clone(),
            preferred_date: entry.preferred_date,
            preferred_time: entry.preferred_time.clone(),
            notes: entry.notes.clone(),
            notified: false,
            notified_at: None,
            created_at: now,
        };
        self.get_connection()?.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                waiting_list::TABLE,
                waiting_list::COLUMNS
            ),
            params![
                stored.id,
                stored.salon_id,
                stored.customer_id,
                serde_json::to_string(&stored.service_ids)?,
                stored.preferred_staff_id,
                stored.preferred_date,
                stored.preferred_time,
                stored.notes,
                stored.notified,
                stored.notified_at,
                stored.created_at
            ],
        )?;
        Ok(stored)
    }

    /// Waiting list of a salon, oldest first
    pub fn get_waiting_list(
        &self,
        salon_id: &str,
        filters: &WaitingListFilters,
    ) -> Result<Vec<WaitingListEntry>> {
        let conn = self.get_connection()?;
        let mut query = format!(
            "SELECT {} FROM {} WHERE salon_id = ?",
            waiting_list::COLUMNS,
            waiting_list::TABLE
        );
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(salon_id.to_string())];

        if let Some(staff_id) = &filters.staff_id {
            query.push_str(" AND preferred_staff_id = ?");
            values.push(Box::new(staff_id.clone()));
        }
        if let Some(range) = &filters.date_range {
            query.push_str(" AND preferred_date >= ? AND preferred_date <= ?");
            values.push(Box::new(range.start));
            values.push(Box::new(range.end));
        }
        query.push_str(" ORDER BY created_at ASC");

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), map_waiting_entry)?;
        let entries = collect_rows(rows)?;

        if filters.service_ids.is_empty() {
            return Ok(entries);
        }
        Ok(entries
            .into_iter()
            .filter(|e| e.service_ids.iter().any(|id| filters.service_ids.contains(id)))
            .collect())
    }

    /// Bookings of a salon, newest first, with derived flags
    pub fn get_bookings(
        &self,
        salon_id: &str,
        filters: &BookingFilters,
        limit: u32,
        now: NaiveDateTime,
    ) -> Result<Vec<BookingListItem>> {
        let conn = self.get_connection()?;
        let mut query = format!(
            "SELECT {}, COALESCE(p.display_name, p.email) AS customer_name, \
             s.display_name AS staff_name \
             FROM {} a LEFT JOIN {} p ON p.id = a.customer_id \
             LEFT JOIN {} s ON s.id = a.staff_id WHERE a.salon_id = ?",
            qualified(appointments::COLUMNS, "a"),
            appointments::TABLE,
            profiles::TABLE,
            staff_profiles::TABLE
        );
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(salon_id.to_string())];

        if !filters.statuses.is_empty() {
            query.push_str(&format!(
                " AND a.status IN ({})",
                placeholders(filters.statuses.len())
            ));
            for status in &filters.statuses {
                values.push(Box::new(*status));
            }
        }
        if let Some(staff_id) = &filters.staff_id {
            query.push_str(" AND a.staff_id = ?");
            values.push(Box::new(staff_id.clone()));
        }
        if let Some(customer_id) = &filters.customer_id {
            query.push_str(" AND a.customer_id = ?");
            values.push(Box::new(customer_id.clone()));
        }
        if let Some(range) = &filters.date_range {
            let (start, end) = range_bounds(range.start, range.end);
            query.push_str(" AND a.start_time >= ? AND a.start_time < ?");
            values.push(Box::new(start));
            values.push(Box::new(end));
        }
        if let Some(term) = filters.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query.push_str(" AND (a.confirmation_code LIKE ? OR a.notes LIKE ?)");
            let pattern = format!("%{term}%");
            values.push(Box::new(pattern.clone()));
            values.push(Box::new(pattern));
        }
        query.push_str(&format!(" ORDER BY a.{} DESC LIMIT ?", appointments::START_TIME));
        values.push(Box::new(limit));

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((
                map_appointment(row)?,
                row.get::<_, Option<String>>("customer_name")?,
                row.get::<_, Option<String>>("staff_name")?,
            ))
        })?;
        let rows = collect_rows(rows)?;

        let mut names_stmt = conn.prepare(&format!(
            "SELECT service_name FROM {} WHERE appointment_id = ? ORDER BY service_order",
            appointment_services::TABLE
        ))?;
        let mut items = Vec::with_capacity(rows.len());
        for (appointment, customer_name, staff_name) in rows {
            let services = collect_rows(
                names_stmt.query_map(params![appointment.id], |row| row.get::<_, String>(0))?,
            )?;
            let status = appointment.status;
            items.push(BookingListItem {
                is_past_due: appointment.start_time < now && status == AppointmentStatus::Confirmed,
                can_reschedule: status.is_modifiable(),
                can_cancel: status.is_modifiable(),
                customer_name: customer_name.unwrap_or_else(|| "Unknown".to_string()),
                staff_name: staff_name.unwrap_or_else(|| "Unassigned".to_string()),
                services,
                appointment,
            });
        }
        Ok(items)
    }

    /// Appointments of a salon (optionally one staff member) starting within
    /// the inclusive day range, in start order
    pub fn get_appointments_between(
        &self,
        salon_id: &str,
        staff_id: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Appointment>> {
        let conn = self.get_connection()?;
        let (from, to) = range_bounds(start, end);
        let mut query = format!(
            "SELECT {} FROM {} WHERE salon_id = ? AND start_time >= ? AND start_time < ?",
            appointments::COLUMNS,
            appointments::TABLE
        );
        let mut values: Vec<Box<dyn ToSql>> =
            vec![Box::new(salon_id.to_string()), Box::new(from), Box::new(to)];
        if let Some(staff_id) = staff_id {
            query.push_str(" AND staff_id = ?");
            values.push(Box::new(staff_id.to_string()));
        }
        query.push_str(" ORDER BY start_time ASC");

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), map_appointment)?;
        collect_rows(rows)
    }

    /// Appointments of one staff member that touch `date`
    pub fn get_staff_appointments_on(&self, staff_id: &str, date: NaiveDate) -> Result<Vec<Appointment>> {
        let conn = self.get_connection()?;
        let (from, to) = day_bounds(date);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE staff_id = ? AND start_time < ? AND end_time > ? \
             ORDER BY start_time ASC",
            appointments::COLUMNS,
            appointments::TABLE
        ))?;
        let rows = stmt.query_map(params![staff_id, to, from], map_appointment)?;
        collect_rows(rows)
    }

    /// Totals per status, lead time, peak hours and the busiest services
    /// and staff for bookings starting in the range
    pub fn get_booking_analytics(
        &self,
        salon_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BookingAnalytics> {
        let appointments = self.get_appointments_between(salon_id, None, start, end)?;
        let conn = self.get_connection()?;
        let mut services_stmt = conn.prepare(&format!(
            "SELECT service_id, service_name FROM {} WHERE appointment_id = ?",
            appointment_services::TABLE
        ))?;
        let mut staff_stmt = conn.prepare(&format!(
            "SELECT display_name FROM {} WHERE id = ?",
            staff_profiles::TABLE
        ))?;

        let mut staff_names: HashMap<String, Option<String>> = HashMap::new();
        let mut rows = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            let services = collect_rows(services_stmt.query_map(params![appointment.id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?)?;
            let staff_name = match &appointment.staff_id {
                Some(staff_id) => {
                    if let Some(name) = staff_names.get(staff_id) {
                        name.clone()
                    } else {
                        let name = staff_stmt
                            .query_row(params![staff_id], |row| row.get::<_, String>(0))
                            .optional()?;
                        staff_names.insert(staff_id.clone(), name.clone());
                        name
                    }
                }
                None => None,
            };
            rows.push(AnalyticsRow {
                appointment,
                staff_name,
                services,
            });
        }

        Ok(summarize_bookings(&rows))
    }
}
