use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use tracing::{debug, info, warn};

use super::{day_bounds, qualified};
use crate::db::{collect_rows, map_service, Database};
use crate::error::{Result, SalonError};
use crate::models::{
    BlockedTime, BulkFailure, BulkResult, NewBlockedTime, NewStaffProfile, NewStaffSchedule,
    Service, StaffFilters, StaffProfile, StaffProfileUpdate, StaffSchedule,
};
use crate::schema::{appointments, blocked_times, services, staff_profiles, staff_schedules, staff_services};
use crate::utils::new_id;

fn map_staff(row: &Row<'_>) -> rusqlite::Result<StaffProfile> {
    Ok(StaffProfile {
        id: row.get("id")?,
        salon_id: row.get("salon_id")?,
        user_id: row.get("user_id")?,
        display_name: row.get("display_name")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        title: row.get("title")?,
        bio: row.get("bio")?,
        experience_years: row.get("experience_years")?,
        employment_type: row.get("employment_type")?,
        commission_rate: row.get("commission_rate")?,
        hourly_rate: row.get("hourly_rate")?,
        is_active: row.get("is_active")?,
        is_bookable: row.get("is_bookable")?,
        is_featured: row.get("is_featured")?,
        hired_at: row.get("hired_at")?,
        terminated_at: row.get("terminated_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn map_schedule(row: &Row<'_>) -> rusqlite::Result<StaffSchedule> {
    Ok(StaffSchedule {
        id: row.get("id")?,
        staff_id: row.get("staff_id")?,
        day_of_week: row.get("day_of_week")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        break_start: row.get("break_start")?,
        break_end: row.get("break_end")?,
        is_working: row.get("is_working")?,
    })
}

fn map_blocked(row: &Row<'_>) -> rusqlite::Result<BlockedTime> {
    Ok(BlockedTime {
        id: row.get("id")?,
        staff_id: row.get("staff_id")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        reason: row.get("reason")?,
        created_at: row.get("created_at")?,
    })
}

fn load_staff(conn: &Connection, staff_id: &str) -> Result<StaffProfile> {
    conn.query_row(
        &format!("SELECT {} FROM {} WHERE id = ?", staff_profiles::COLUMNS, staff_profiles::TABLE),
        params![staff_id],
        map_staff,
    )
    .optional()?
    .ok_or_else(|| SalonError::NotFound(format!("Staff member {staff_id}")))
}

/// Run one `UPDATE staff_profiles SET … WHERE id = ?` and return the fresh row.
fn update_staff_columns(
    conn: &Connection,
    staff_id: &str,
    assignments: &str,
    mut values: Vec<Box<dyn ToSql>>,
) -> Result<StaffProfile> {
    values.push(Box::new(staff_id.to_string()));
    let changed = conn.execute(
        &format!("UPDATE {} SET {assignments} WHERE id = ?", staff_profiles::TABLE),
        params_from_iter(values.iter()),
    )?;
    if changed == 0 {
        return Err(SalonError::NotFound(format!("Staff member {staff_id}")));
    }
    load_staff(conn, staff_id)
}

impl Database {
    /// Create a staff profile
    pub fn create_staff(&self, new_staff: &NewStaffProfile, now: DateTime<Utc>) -> Result<StaffProfile> {
        let staff = StaffProfile {
            id: new_id(),
            salon_id: new_staff.salon_id.clone(),
            user_id: new_staff.user_id.clone(),
            display_name: new_staff.display_name.clone(),
            first_name: new_staff.first_name.clone(),
            last_name: new_staff.last_name.clone(),
            email: new_staff.email.clone(),
            phone: new_staff.phone.clone(),
            title: new_staff.title.clone(),
            bio: new_staff.bio.clone(),
            experience_years: new_staff.experience_years,
            employment_type: new_staff.employment_type,
            commission_rate: new_staff.commission_rate,
            hourly_rate: new_staff.hourly_rate,
            is_active: true,
            is_bookable: new_staff.is_bookable,
            is_featured: false,
            hired_at: new_staff.hired_at.unwrap_or_else(|| now.date_naive()),
            terminated_at: None,
            created_at: now,
            updated_at: now,
        };

        self.get_connection()?.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                staff_profiles::TABLE,
                staff_profiles::COLUMNS
            ),
            params![
                staff.id,
                staff.salon_id,
                staff.user_id,
                staff.display_name,
                staff.first_name,
                staff.last_name,
                staff.email,
                staff.phone,
                staff.title,
                staff.bio,
                staff.experience_years,
                staff.employment_type,
                staff.commission_rate,
                staff.hourly_rate,
                staff.is_active,
                staff.is_bookable,
                staff.is_featured,
                staff.hired_at,
                staff.terminated_at,
                staff.created_at,
                staff.updated_at
            ],
        )?;

        info!(staff_id = %staff.id, salon_id = %staff.salon_id, "Staff member created");
        Ok(staff)
    }

    /// Apply a partial update; absent fields are left untouched
    pub fn update_staff(
        &self,
        staff_id: &str,
        update: &StaffProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<StaffProfile> {
        let mut assignments = vec!["updated_at = ?"];
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(now)];

        macro_rules! set_if_some {
            ($field:ident) => {
                if let Some(value) = &update.$field {
                    assignments.push(concat!(stringify!($field), " = ?"));
                    values.push(Box::new(value.clone()));
                }
            };
        }
        set_if_some!(display_name);
        set_if_some!(first_name);
        set_if_some!(last_name);
        set_if_some!(email);
        set_if_some!(phone);
        set_if_some!(title);
        set_if_some!(bio);
        set_if_some!(experience_years);
        set_if_some!(employment_type);
        set_if_some!(hourly_rate);

        let conn = self.get_connection()?;
        update_staff_columns(&conn, staff_id, &assignments.join(", "), values)
    }

    /// Soft delete: inactive, not bookable, terminated now
    pub fn soft_delete_staff(&self, staff_id: &str, now: DateTime<Utc>) -> Result<StaffProfile> {
        let conn = self.get_connection()?;
        let staff = update_staff_columns(
            &conn,
            staff_id,
            "is_active = 0, is_bookable = 0, terminated_at = ?, updated_at = ?",
            vec![Box::new(now), Box::new(now)],
        )?;
        info!(staff_id, "Staff member deactivated");
        Ok(staff)
    }

    /// Flip the bookable flag
    pub fn toggle_bookable(&self, staff_id: &str, now: DateTime<Utc>) -> Result<StaffProfile> {
        let conn = self.get_connection()?;
        update_staff_columns(
            &conn,
            staff_id,
            "is_bookable = NOT is_bookable, updated_at = ?",
            vec![Box::new(now)],
        )
    }

    /// Flip the featured flag
    pub fn toggle_featured(&self, staff_id: &str, now: DateTime<Utc>) -> Result<StaffProfile> {
        let conn = self.get_connection()?;
        update_staff_columns(
            &conn,
            staff_id,
            "is_featured = NOT is_featured, updated_at = ?",
            vec![Box::new(now)],
        )
    }

    /// Set the commission percentage
    pub fn update_commission(&self, staff_id: &str, rate: f64, now: DateTime<Utc>) -> Result<StaffProfile> {
        let conn = self.get_connection()?;
        update_staff_columns(
            &conn,
            staff_id,
            "commission_rate = ?, updated_at = ?",
            vec![Box::new(rate), Box::new(now)],
        )
    }

    /// Get a staff member by id
    pub fn get_staff_by_id(&self, staff_id: &str) -> Result<Option<StaffProfile>> {
        let conn = self.get_connection()?;
        match load_staff(&conn, staff_id) {
            Ok(staff) => Ok(Some(staff)),
            Err(SalonError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Staff of a salon ordered by display name
    pub fn get_staff_members(&self, salon_id: &str, filters: &StaffFilters) -> Result<Vec<StaffProfile>> {
        let conn = self.get_connection()?;
        let mut query = format!(
            "SELECT {} FROM {} WHERE salon_id = ?",
            staff_profiles::COLUMNS,
            staff_profiles::TABLE
        );
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(salon_id.to_string())];

        if let Some(active) = filters.is_active {
            query.push_str(" AND is_active = ?");
            values.push(Box::new(active));
        }
        if let Some(bookable) = filters.is_bookable {
            query.push_str(" AND is_bookable = ?");
            values.push(Box::new(bookable));
        }
        if let Some(term) = filters.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query.push_str(" AND (display_name LIKE ? OR email LIKE ?)");
            let pattern = format!("%{term}%");
            values.push(Box::new(pattern.clone()));
            values.push(Box::new(pattern));
        }
        query.push_str(" ORDER BY display_name COLLATE NOCASE");

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), map_staff)?;
        collect_rows(rows)
    }

    /// Active, bookable staff of a salon who perform `service_id`
    pub fn get_bookable_staff_for_service(
        &self,
        salon_id: &str,
        service_id: &str,
    ) -> Result<Vec<StaffProfile>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} sp JOIN {} ss ON ss.staff_id = sp.id \
             WHERE sp.salon_id = ? AND ss.service_id = ? AND sp.is_active = 1 AND sp.is_bookable = 1 \
             ORDER BY sp.is_featured DESC, sp.display_name COLLATE NOCASE",
            qualified(staff_profiles::COLUMNS, "sp"),
            staff_profiles::TABLE,
            staff_services::TABLE
        ))?;
        let rows = stmt.query_map(params![salon_id, service_id], map_staff)?;
        collect_rows(rows)
    }

    /// Create or replace the schedule for one staff member and weekday
    pub fn upsert_schedule(&self, schedule: &NewStaffSchedule) -> Result<StaffSchedule> {
        let conn = self.get_connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(staff_id, day_of_week) DO UPDATE SET \
                 start_time = excluded.start_time, end_time = excluded.end_time, \
                 break_start = excluded.break_start, break_end = excluded.break_end, \
                 is_working = excluded.is_working",
                staff_schedules::TABLE,
                staff_schedules::COLUMNS
            ),
            params![
                new_id(),
                schedule.staff_id,
                schedule.day_of_week,
                schedule.start_time,
                schedule.end_time,
                schedule.break_start,
                schedule.break_end,
                schedule.is_working
            ],
        )?;

        let stored = conn.query_row(
            &format!(
                "SELECT {} FROM {} WHERE staff_id = ? AND day_of_week = ?",
                staff_schedules::COLUMNS,
                staff_schedules::TABLE
            ),
            params![schedule.staff_id, schedule.day_of_week],
            map_schedule,
        )?;
        debug!(staff_id = %stored.staff_id, day = stored.day_of_week, "Schedule saved");
        Ok(stored)
    }

    /// Remove one schedule row; false when it did not exist
    pub fn delete_schedule(&self, schedule_id: &str) -> Result<bool> {
        let changed = self.get_connection()?.execute(
            &format!("DELETE FROM {} WHERE id = ?", staff_schedules::TABLE),
            params![schedule_id],
        )?;
        Ok(changed > 0)
    }

    /// Weekly schedule of a staff member, Sunday first
    pub fn get_schedules(&self, staff_id: &str) -> Result<Vec<StaffSchedule>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE staff_id = ? ORDER BY day_of_week",
            staff_schedules::COLUMNS,
            staff_schedules::TABLE
        ))?;
        let rows = stmt.query_map(params![staff_id], map_schedule)?;
        collect_rows(rows)
    }

    /// Let a staff member perform a service. Assigning twice is a no-op;
    /// the result tells whether a row was added.
    pub fn assign_service(&self, staff_id: &str, service_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.get_connection()?.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (staff_id, service_id, created_at) VALUES (?, ?, ?)",
                staff_services::TABLE
            ),
            params![staff_id, service_id, now],
        )?;
        Ok(changed > 0)
    }

    /// Remove a service assignment
    pub fn unassign_service(&self, staff_id: &str, service_id: &str) -> Result<bool> {
        let changed = self.get_connection()?.execute(
            &format!(
                "DELETE FROM {} WHERE staff_id = ? AND service_id = ?",
                staff_services::TABLE
            ),
            params![staff_id, service_id],
        )?;
        Ok(changed > 0)
    }

    /// Services a staff member performs
    pub fn get_staff_services(&self, staff_id: &str) -> Result<Vec<Service>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} s JOIN {} ss ON ss.service_id = s.id WHERE ss.staff_id = ? ORDER BY s.name",
            qualified(services::COLUMNS, "s"),
            services::TABLE,
            staff_services::TABLE
        ))?;
        let rows = stmt.query_map(params![staff_id], map_service)?;
        collect_rows(rows)
    }

    /// Block out a period for a staff member
    pub fn create_blocked_time(&self, blocked: &NewBlockedTime, now: DateTime<Utc>) -> Result<BlockedTime> {
        let stored = BlockedTime {
            id: new_id(),
            staff_id: blocked.staff_id.clone(),
            start_time: blocked.start_time,
            end_time: blocked.end_time,
            reason: blocked.reason.clone(),
            created_at: now,
        };
        self.get_connection()?.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?)",
                blocked_times::TABLE,
                blocked_times::COLUMNS
            ),
            params![
                stored.id,
                stored.staff_id,
                stored.start_time,
                stored.end_time,
                stored.reason,
                stored.created_at
            ],
        )?;
        Ok(stored)
    }

    /// Remove a blocked period
    pub fn remove_blocked_time(&self, blocked_id: &str) -> Result<bool> {
        let changed = self.get_connection()?.execute(
            &format!("DELETE FROM {} WHERE id = ?", blocked_times::TABLE),
            params![blocked_id],
        )?;
        Ok(changed > 0)
    }

    /// Look up a blocked period
    pub fn get_blocked_time(&self, blocked_id: &str) -> Result<Option<BlockedTime>> {
        let conn = self.get_connection()?;
        let blocked = conn
            .query_row(
                &format!("SELECT {} FROM {} WHERE id = ?", blocked_times::COLUMNS, blocked_times::TABLE),
                params![blocked_id],
                map_blocked,
            )
            .optional()?;
        Ok(blocked)
    }

    /// Blocked periods of a staff member overlapping `[from, to)`
    pub fn get_blocked_times(
        &self,
        staff_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<BlockedTime>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE staff_id = ? AND start_time < ? AND end_time > ? ORDER BY start_time",
            blocked_times::COLUMNS,
            blocked_times::TABLE
        ))?;
        let rows = stmt.query_map(params![staff_id, to, from], map_blocked)?;
        collect_rows(rows)
    }

    /// Blocked periods of a staff member touching `date`
    pub fn get_blocked_times_on(&self, staff_id: &str, date: NaiveDate) -> Result<Vec<BlockedTime>> {
        let (from, to) = day_bounds(date);
        self.get_blocked_times(staff_id, from, to)
    }

    /// Whether the staff member has pending or confirmed appointments
    /// starting at or after `from`
    pub fn has_active_appointments(&self, staff_id: &str, from: NaiveDateTime) -> Result<bool> {
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE staff_id = ? AND {} IN ('pending', 'confirmed') \
                 AND {} >= ?",
                appointments::TABLE,
                appointments::STATUS,
                appointments::START_TIME
            ),
            params![staff_id, from],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Run `op` for every id that belongs to `salon_id`, collecting failures
    /// instead of stopping at the first one.
    pub fn bulk_staff_update(
        &self,
        salon_id: &str,
        staff_ids: &[String],
        mut op: impl FnMut(&Self, &StaffProfile) -> Result<()>,
    ) -> BulkResult {
        let mut result = BulkResult::default();
        for staff_id in staff_ids {
            let outcome = self.get_staff_by_id(staff_id).and_then(|staff| match staff {
                Some(staff) if staff.salon_id == salon_id => op(self, &staff),
                _ => Err(SalonError::NotFound(format!("Staff member {staff_id}"))),
            });
            match outcome {
                Ok(()) => result.succeeded.push(staff_id.clone()),
                Err(e) => {
                    warn!(staff_id, error = %e, "Bulk staff update skipped");
                    result.failed.push(BulkFailure {
                        id: staff_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        result
    }

    /// Set the active flag without touching the termination stamp
    pub fn set_staff_active(&self, staff_id: &str, active: bool, now: DateTime<Utc>) -> Result<StaffProfile> {
        let conn = self.get_connection()?;
        if active {
            update_staff_columns(
                &conn,
                staff_id,
                "is_active = 1, terminated_at = NULL, updated_at = ?",
                vec![Box::new(now)],
            )
        } else {
            update_staff_columns(&conn, staff_id, "is_active = 0, updated_at = ?", vec![Box::new(now)])
        }
    }
}
