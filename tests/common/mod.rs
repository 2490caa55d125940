//! Shared fixtures for the integration tests: a temporary SQLite database
//! with one salon, a service, a scheduled stylist and three callers.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

use salon_ops::actions::Actions;
use salon_ops::auth::{Role, UserContext};
use salon_ops::config::AppConfig;
use salon_ops::db::Database;
use salon_ops::models::{
    BookingRequest, BookingSource, EmploymentType, NewProfile, NewSalon, NewService,
    NewStaffProfile, NewStaffSchedule, Salon, Service, ServiceSelection, StaffProfile,
};
use salon_ops::utils::Clock;

pub const OWNER_TOKEN: &str = "owner-token";
pub const STAFF_TOKEN: &str = "staff-token";
pub const CUSTOMER_TOKEN: &str = "customer-token";

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

/// Monday 2026-10-19, 08:00 salon time
pub fn test_now() -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2026, 10, 19, 8, 0, 0)
        .single()
        .expect("unambiguous local time")
}

/// Monday 2026-11-02, a working day for the stylist
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 2).expect("date")
}

/// Sunday 2026-11-01, the stylist's day off
pub fn sunday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 1).expect("date")
}

pub struct Fixture {
    _dir: TempDir,
    pub db: Database,
    pub actions: Actions,
    pub salon: Salon,
    pub service: Service,
    pub stylist: StaffProfile,
    pub owner: UserContext,
    pub staff: UserContext,
    pub customer: UserContext,
}

impl Fixture {
    pub fn selection(&self) -> ServiceSelection {
        ServiceSelection {
            service_id: self.service.id.clone(),
            service_name: self.service.name.clone(),
            duration_minutes: self.service.duration_minutes,
            price: self.service.price,
            quantity: 1,
        }
    }

    /// Booking with the stylist for one haircut
    pub fn booking(&self, date: NaiveDate, time: &str) -> BookingRequest {
        BookingRequest {
            salon_id: self.salon.id.clone(),
            staff_id: Some(self.stylist.id.clone()),
            date,
            time: time.to_string(),
            services: vec![self.selection()],
            addons: Vec::new(),
            customer: None,
            payment_method: Some("card".to_string()),
            special_requests: None,
            source: BookingSource::Online,
        }
    }

    /// Staff profile data for another member of the salon
    pub fn new_staff(&self, name: &str) -> NewStaffProfile {
        NewStaffProfile {
            salon_id: self.salon.id.clone(),
            user_id: None,
            display_name: name.to_string(),
            first_name: name.to_string(),
            last_name: "Stylist".to_string(),
            email: format!("{}@salon.test", name.to_lowercase()),
            phone: None,
            title: Some("Stylist".to_string()),
            bio: None,
            experience_years: Some(3),
            employment_type: EmploymentType::FullTime,
            commission_rate: 40.0,
            hourly_rate: None,
            is_bookable: true,
            hired_at: None,
        }
    }

    /// Caller context for a token
    pub async fn ctx(&self, token: &str) -> UserContext {
        self.actions
            .authenticate(Some(token))
            .await
            .expect("known token")
    }
}

fn profile(email: &str, name: &str, role: Role, salon_id: Option<String>, token: &str) -> NewProfile {
    NewProfile {
        email: email.to_string(),
        display_name: name.to_string(),
        role,
        salon_id,
        api_token: token.to_string(),
    }
}

/// Monday to Friday 09:00-17:00 with a 12:00-13:00 break
fn weekday_schedule(staff_id: &str, day_of_week: u8) -> NewStaffSchedule {
    NewStaffSchedule {
        staff_id: staff_id.to_string(),
        day_of_week,
        start_time: "09:00".to_string(),
        end_time: "17:00".to_string(),
        break_start: Some("12:00".to_string()),
        break_end: Some("13:00".to_string()),
        is_working: true,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(AppConfig::default())
}

pub fn fixture_with(config: AppConfig) -> Fixture {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("salon.db");
    let db = Database::new(&format!("sqlite://{}", db_path.display())).expect("database");

    let salon = db
        .create_salon(&NewSalon {
            name: "Glow Studio".to_string(),
            address: Some("12 Main St".to_string()),
            phone: None,
            email: Some("hello@glow.test".to_string()),
        })
        .expect("salon");
    let service = db
        .create_service(&NewService {
            salon_id: salon.id.clone(),
            name: "Haircut".to_string(),
            duration_minutes: 60,
            price: 50.0,
        })
        .expect("service");

    let owner = db
        .create_profile(&profile("owner@glow.test", "Olivia Owner", Role::Owner, Some(salon.id.clone()), OWNER_TOKEN))
        .expect("owner");
    let staff_profile = db
        .create_profile(&profile("sam@glow.test", "Sam Stylist", Role::Staff, Some(salon.id.clone()), STAFF_TOKEN))
        .expect("staff");
    let customer = db
        .create_profile(&profile("casey@example.com", "Casey Customer", Role::Customer, None, CUSTOMER_TOKEN))
        .expect("customer");

    let now = test_now().with_timezone(&Utc);
    let stylist = db
        .create_staff(
            &NewStaffProfile {
                salon_id: salon.id.clone(),
                user_id: Some(staff_profile.id.clone()),
                display_name: "Sam".to_string(),
                first_name: "Sam".to_string(),
                last_name: "Stylist".to_string(),
                email: "sam@glow.test".to_string(),
                phone: None,
                title: Some("Senior Stylist".to_string()),
                bio: None,
                experience_years: Some(8),
                employment_type: EmploymentType::FullTime,
                commission_rate: 45.0,
                hourly_rate: None,
                is_bookable: true,
                hired_at: None,
            },
            now,
        )
        .expect("stylist");
    for day in 1..=5 {
        db.upsert_schedule(&weekday_schedule(&stylist.id, day))
            .expect("schedule");
    }
    db.assign_service(&stylist.id, &service.id, now)
        .expect("assign service");

    let actions = Actions::new(db.clone(), config).with_clock(Arc::new(FixedClock(test_now())));

    Fixture {
        _dir: dir,
        db,
        actions,
        salon,
        service,
        stylist,
        owner: UserContext::new(owner.id, owner.salon_id, Role::Owner),
        staff: UserContext::new(staff_profile.id, staff_profile.salon_id, Role::Staff),
        customer: UserContext::new(customer.id, None, Role::Customer),
    }
}
