use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::info;

use super::{ActionResponse, Actions};
use crate::auth::UserContext;
use crate::cache::cache_key;
use crate::error::{Result, SalonError};
use crate::models::{
    BlockedTime, BulkResult, NewBlockedTime, NewStaffProfile, NewStaffSchedule, Service,
    StaffFilters, StaffProfile, StaffProfileUpdate, StaffSchedule,
};
use crate::validation::{FieldCollector, InputValidator};

const STAFF_PATH: &str = "/dashboard/staff";

fn staff_tags(salon_id: &str, staff_id: Option<&str>) -> Vec<String> {
    let mut tags = vec![format!("salon-{salon_id}-staff")];
    if let Some(staff_id) = staff_id {
        tags.push(format!("staff-{staff_id}"));
    }
    tags
}

fn active_appointments_error() -> SalonError {
    SalonError::invalid("staff_id", "Staff member has active appointments")
}

/// Which staff members a bulk operation touches
#[derive(Debug, Clone, Copy)]
enum BulkOperation {
    Activate,
    Deactivate,
    Delete,
    Commission(f64),
}

impl BulkOperation {
    const fn action(self) -> &'static str {
        match self {
            Self::Activate => "bulk_activate",
            Self::Deactivate => "bulk_deactivate",
            Self::Delete => "bulk_delete",
            Self::Commission(_) => "bulk_update_commission",
        }
    }

    const fn verb(self) -> &'static str {
        match self {
            Self::Activate => "activated",
            Self::Deactivate => "deactivated",
            Self::Delete => "deleted",
            Self::Commission(_) => "updated",
        }
    }
}

impl Actions {
    /// Load a staff member and check the caller's standing in their salon.
    async fn staff_for(&self, ctx: &UserContext, staff_id: &str, owner_only: bool) -> Result<StaffProfile> {
        let id = staff_id.to_string();
        let staff = self
            .with_db(move |db| db.get_staff_by_id(&id))
            .await?
            .ok_or_else(|| SalonError::NotFound(format!("Staff member {staff_id}")))?;
        if owner_only {
            ctx.require_salon_owner(&staff.salon_id)?;
        } else {
            ctx.require_salon_member(&staff.salon_id)?;
        }
        Ok(staff)
    }

    fn revalidate_staff(&self, salon_id: &str, staff_id: Option<&str>) {
        self.revalidate(&[STAFF_PATH.to_string()], &staff_tags(salon_id, staff_id));
    }

    /// Add a staff member to a salon
    pub async fn create_staff(&self, ctx: &UserContext, profile: NewStaffProfile) -> ActionResponse<StaffProfile> {
        self.run("create_staff", async {
            ctx.require_salon_owner(&profile.salon_id)?;
            InputValidator::validate_staff_profile(&profile)?;
            let now = self.now_utc();
            let staff = self.with_db(move |db| db.create_staff(&profile, now)).await?;
            self.revalidate_staff(&staff.salon_id, Some(&staff.id));
            Ok(staff)
        })
        .await
    }

    /// Apply a partial profile update
    pub async fn update_staff(
        &self,
        ctx: &UserContext,
        staff_id: &str,
        update: StaffProfileUpdate,
    ) -> ActionResponse<StaffProfile> {
        self.run("update_staff", async {
            let current = self.staff_for(ctx, staff_id, true).await?;
            let mut fields = FieldCollector::default();
            for (field, value) in [
                ("display_name", &update.display_name),
                ("first_name", &update.first_name),
                ("last_name", &update.last_name),
            ] {
                if let Some(value) = value {
                    fields.check(field, InputValidator::validate_name(value));
                }
            }
            if let Some(email) = &update.email {
                fields.check("email", InputValidator::validate_email(email));
            }
            if let Some(phone) = &update.phone {
                fields.check("phone", InputValidator::validate_phone(phone));
            }
            if let Some(rate) = update.hourly_rate {
                fields.check("hourly_rate", InputValidator::validate_price(rate));
            }
            fields.finish()?;

            let id = staff_id.to_string();
            let now = self.now_utc();
            let staff = self
                .with_db(move |db| db.update_staff(&id, &update, now))
                .await?;
            self.revalidate_staff(&current.salon_id, Some(staff_id));
            Ok(staff)
        })
        .await
    }

    /// Soft delete; refused while the staff member has upcoming bookings
    pub async fn delete_staff(&self, ctx: &UserContext, staff_id: &str) -> ActionResponse<StaffProfile> {
        self.run("delete_staff", async {
            let current = self.staff_for(ctx, staff_id, true).await?;
            let id = staff_id.to_string();
            let from = self.now_local();
            let now = self.now_utc();
            let staff = self
                .with_db(move |db| {
                    if db.has_active_appointments(&id, from)? {
                        return Err(active_appointments_error());
                    }
                    db.soft_delete_staff(&id, now)
                })
                .await?;
            self.revalidate_staff(&current.salon_id, Some(staff_id));
            Ok(staff)
        })
        .await
    }

    /// Flip whether customers can book this staff member
    pub async fn toggle_bookable(&self, ctx: &UserContext, staff_id: &str) -> ActionResponse<StaffProfile> {
        self.run("toggle_bookable", async {
            let current = self.staff_for(ctx, staff_id, true).await?;
            let id = staff_id.to_string();
            let now = self.now_utc();
            let staff = self.with_db(move |db| db.toggle_bookable(&id, now)).await?;
            self.revalidate_staff(&current.salon_id, Some(staff_id));
            Ok(staff)
        })
        .await
    }

    /// Flip the featured flag
    pub async fn toggle_featured(&self, ctx: &UserContext, staff_id: &str) -> ActionResponse<StaffProfile> {
        self.run("toggle_featured", async {
            let current = self.staff_for(ctx, staff_id, true).await?;
            let id = staff_id.to_string();
            let now = self.now_utc();
            let staff = self.with_db(move |db| db.toggle_featured(&id, now)).await?;
            self.revalidate_staff(&current.salon_id, Some(staff_id));
            Ok(staff)
        })
        .await
    }

    /// Set the commission percentage
    pub async fn update_commission(&self, ctx: &UserContext, staff_id: &str, rate: f64) -> ActionResponse<StaffProfile> {
        self.run("update_commission", async {
            let current = self.staff_for(ctx, staff_id, true).await?;
            let mut fields = FieldCollector::default();
            fields.check("commission_rate", InputValidator::validate_commission_rate(rate));
            fields.finish()?;

            let id = staff_id.to_string();
            let now = self.now_utc();
            let staff = self
                .with_db(move |db| db.update_commission(&id, rate, now))
                .await?;
            self.revalidate_staff(&current.salon_id, Some(staff_id));
            Ok(staff)
        })
        .await
    }

    /// Create or replace one weekday of a staff member's schedule
    pub async fn upsert_schedule(&self, ctx: &UserContext, schedule: NewStaffSchedule) -> ActionResponse<StaffSchedule> {
        self.run("upsert_schedule", async {
            let staff = self.staff_for(ctx, &schedule.staff_id, false).await?;
            InputValidator::validate_schedule(&schedule)?;
            let stored = self.with_db(move |db| db.upsert_schedule(&schedule)).await?;
            self.revalidate_staff(&staff.salon_id, Some(&staff.id));
            Ok(stored)
        })
        .await
    }

    /// Remove one schedule row of a staff member
    pub async fn delete_schedule(&self, ctx: &UserContext, staff_id: &str, schedule_id: &str) -> ActionResponse<bool> {
        self.run("delete_schedule", async {
            let staff = self.staff_for(ctx, staff_id, false).await?;
            let id = staff_id.to_string();
            let schedule = schedule_id.to_string();
            let deleted = self
                .with_db(move |db| {
                    if !db.get_schedules(&id)?.iter().any(|s| s.id == schedule) {
                        return Err(SalonError::NotFound(format!("Schedule {schedule}")));
                    }
                    db.delete_schedule(&schedule)
                })
                .await?;
            self.revalidate_staff(&staff.salon_id, Some(staff_id));
            Ok(deleted)
        })
        .await
    }

    /// Weekly schedule of a staff member
    pub async fn get_schedules(&self, staff_id: &str) -> ActionResponse<Vec<StaffSchedule>> {
        self.run("get_schedules", async {
            let id = staff_id.to_string();
            self.with_db(move |db| db.get_schedules(&id)).await
        })
        .await
    }

    /// Let a staff member perform a service; already assigned is not an error
    pub async fn assign_service(&self, ctx: &UserContext, staff_id: &str, service_id: &str) -> ActionResponse<bool> {
        self.run("assign_service", async {
            let staff = self.staff_for(ctx, staff_id, false).await?;
            let service = service_id.to_string();
            let found = self.with_db(move |db| db.get_service(&service)).await?;
            match found {
                Some(service) if service.salon_id == staff.salon_id => {}
                _ => return Err(SalonError::NotFound(format!("Service {service_id}"))),
            }

            let id = staff_id.to_string();
            let service = service_id.to_string();
            let now = self.now_utc();
            let added = self
                .with_db(move |db| db.assign_service(&id, &service, now))
                .await?;
            self.revalidate_staff(&staff.salon_id, Some(staff_id));
            Ok(added)
        })
        .await
    }

    /// Stop a staff member performing a service
    pub async fn unassign_service(&self, ctx: &UserContext, staff_id: &str, service_id: &str) -> ActionResponse<bool> {
        self.run("unassign_service", async {
            let staff = self.staff_for(ctx, staff_id, false).await?;
            let id = staff_id.to_string();
            let service = service_id.to_string();
            let removed = self
                .with_db(move |db| db.unassign_service(&id, &service))
                .await?;
            self.revalidate_staff(&staff.salon_id, Some(staff_id));
            Ok(removed)
        })
        .await
    }

    /// Services a staff member performs
    pub async fn get_staff_services(&self, staff_id: &str) -> ActionResponse<Vec<Service>> {
        self.run("get_staff_services", async {
            let id = staff_id.to_string();
            self.with_db(move |db| db.get_staff_services(&id)).await
        })
        .await
    }

    /// Block a period in a staff member's calendar
    pub async fn create_blocked_time(&self, ctx: &UserContext, blocked: NewBlockedTime) -> ActionResponse<BlockedTime> {
        self.run("create_blocked_time", async {
            let staff = self.staff_for(ctx, &blocked.staff_id, false).await?;
            let mut fields = FieldCollector::default();
            if blocked.end_time <= blocked.start_time {
                fields.push("end_time", "End time must be after start time");
            }
            if let Some(reason) = &blocked.reason {
                fields.check("reason", InputValidator::validate_description(reason));
            }
            fields.finish()?;

            let now = self.now_utc();
            let stored = self
                .with_db(move |db| db.create_blocked_time(&blocked, now))
                .await?;
            self.revalidate_staff(&staff.salon_id, Some(&staff.id));
            Ok(stored)
        })
        .await
    }

    /// Remove blocked time
    pub async fn remove_blocked_time(&self, ctx: &UserContext, blocked_id: &str) -> ActionResponse<bool> {
        self.run("remove_blocked_time", async {
            let id = blocked_id.to_string();
            let blocked = self
                .with_db(move |db| db.get_blocked_time(&id))
                .await?
                .ok_or_else(|| SalonError::NotFound(format!("Blocked time {blocked_id}")))?;
            let staff = self.staff_for(ctx, &blocked.staff_id, false).await?;
            let id = blocked_id.to_string();
            let removed = self.with_db(move |db| db.remove_blocked_time(&id)).await?;
            self.revalidate_staff(&staff.salon_id, Some(&staff.id));
            Ok(removed)
        })
        .await
    }

    /// Blocked periods touching an inclusive range of days
    pub async fn get_blocked_times(
        &self,
        ctx: &UserContext,
        staff_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ActionResponse<Vec<BlockedTime>> {
        self.run("get_blocked_times", async {
            self.staff_for(ctx, staff_id, false).await?;
            let mut fields = FieldCollector::default();
            fields.check("date_range", InputValidator::validate_date_range(start, end));
            fields.finish()?;

            let id = staff_id.to_string();
            let from = start.and_time(NaiveTime::MIN);
            let to = (end + Duration::days(1)).and_time(NaiveTime::MIN);
            self.with_db(move |db| db.get_blocked_times(&id, from, to)).await
        })
        .await
    }

    /// Staff of a salon matching the filters
    pub async fn get_staff_members(
        &self,
        ctx: &UserContext,
        salon_id: &str,
        filters: StaffFilters,
    ) -> ActionResponse<Vec<StaffProfile>> {
        self.run("get_staff_members", async {
            ctx.require_salon_member(salon_id)?;
            let query = format!("salon={salon_id}&filters={}", serde_json::to_string(&filters)?);
            let salon = salon_id.to_string();
            self.cached(
                cache_key(STAFF_PATH, Some(&query)),
                staff_tags(salon_id, None),
                self.with_db(move |db| db.get_staff_members(&salon, &filters)),
            )
            .await
        })
        .await
    }

    /// One staff profile
    pub async fn get_staff_by_id(&self, staff_id: &str) -> ActionResponse<StaffProfile> {
        self.run("get_staff_by_id", async {
            let id = staff_id.to_string();
            self.with_db(move |db| db.get_staff_by_id(&id))
                .await?
                .ok_or_else(|| SalonError::NotFound(format!("Staff member {staff_id}")))
        })
        .await
    }

    /// Staff customers can book for a service
    pub async fn get_bookable_staff_for_service(
        &self,
        salon_id: &str,
        service_id: &str,
    ) -> ActionResponse<Vec<StaffProfile>> {
        self.run("get_bookable_staff_for_service", async {
            let salon = salon_id.to_string();
            let service = service_id.to_string();
            self.with_db(move |db| db.get_bookable_staff_for_service(&salon, &service))
                .await
        })
        .await
    }

    async fn bulk(&self, ctx: &UserContext, salon_id: &str, staff_ids: Vec<String>, op: BulkOperation) -> ActionResponse<BulkResult> {
        self.run(op.action(), async {
            ctx.require_salon_owner(salon_id)?;
            let mut fields = FieldCollector::default();
            if staff_ids.is_empty() {
                fields.push("staff_ids", "Select at least one staff member");
            }
            if let BulkOperation::Commission(rate) = op {
                fields.check("commission_rate", InputValidator::validate_commission_rate(rate));
            }
            fields.finish()?;

            let salon = salon_id.to_string();
            let from = self.now_local();
            let now = self.now_utc();
            let result = self
                .with_db(move |db| {
                    Ok(db.bulk_staff_update(&salon, &staff_ids, |db, staff| {
                        let updated = match op {
                            BulkOperation::Activate => db.set_staff_active(&staff.id, true, now),
                            BulkOperation::Deactivate => db.set_staff_active(&staff.id, false, now),
                            BulkOperation::Delete => {
                                if db.has_active_appointments(&staff.id, from)? {
                                    return Err(active_appointments_error());
                                }
                                db.soft_delete_staff(&staff.id, now)
                            }
                            BulkOperation::Commission(rate) => db.update_commission(&staff.id, rate, now),
                        };
                        updated.map(|_| ())
                    }))
                })
                .await?;

            self.revalidate_staff(salon_id, None);
            for id in &result.succeeded {
                self.revalidate(&[], &[format!("staff-{id}")]);
            }
            info!(
                action = op.action(),
                succeeded = result.succeeded.len(),
                failed = result.failed.len(),
                "Bulk staff update finished"
            );
            Ok(result)
        })
        .await
        .with_message(|r| format!("{} staff members {} successfully", r.succeeded.len(), op.verb()))
    }

    /// Reactivate staff members
    pub async fn bulk_activate(&self, ctx: &UserContext, salon_id: &str, staff_ids: Vec<String>) -> ActionResponse<BulkResult> {
        self.bulk(ctx, salon_id, staff_ids, BulkOperation::Activate).await
    }

    /// Deactivate staff members
    pub async fn bulk_deactivate(&self, ctx: &UserContext, salon_id: &str, staff_ids: Vec<String>) -> ActionResponse<BulkResult> {
        self.bulk(ctx, salon_id, staff_ids, BulkOperation::Deactivate).await
    }

    /// Soft delete staff members without upcoming bookings
    pub async fn bulk_delete(&self, ctx: &UserContext, salon_id: &str, staff_ids: Vec<String>) -> ActionResponse<BulkResult> {
        self.bulk(ctx, salon_id, staff_ids, BulkOperation::Delete).await
    }

    /// Set one commission rate on several staff members
    pub async fn bulk_update_commission(
        &self,
        ctx: &UserContext,
        salon_id: &str,
        staff_ids: Vec<String>,
        rate: f64,
    ) -> ActionResponse<BulkResult> {
        self.bulk(ctx, salon_id, staff_ids, BulkOperation::Commission(rate))
            .await
    }
}
