use chrono::{NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

use salon_ops::auth::Role;
use salon_ops::db::{sqlite_path, Database};
use salon_ops::models::{
    EmploymentType, NewBlockedTime, NewProfile, NewSalon, NewService, NewStaffProfile,
    NewStaffSchedule, StaffFilters,
};

fn temp_db() -> (TempDir, Database) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db = Database::new(&format!("sqlite://{}", db_path.display())).expect("Failed to create database");
    (dir, db)
}

fn salon(db: &Database) -> String {
    db.create_salon(&NewSalon {
        name: "Test Salon".to_string(),
        address: None,
        phone: Some("+15551234567".to_string()),
        email: None,
    })
    .expect("Failed to create salon")
    .id
}

fn staff_data(salon_id: &str, name: &str) -> NewStaffProfile {
    NewStaffProfile {
        salon_id: salon_id.to_string(),
        user_id: None,
        display_name: name.to_string(),
        first_name: name.to_string(),
        last_name: "Tester".to_string(),
        email: format!("{}@salon.test", name.to_lowercase()),
        phone: None,
        title: None,
        bio: None,
        experience_years: None,
        employment_type: EmploymentType::PartTime,
        commission_rate: 30.0,
        hourly_rate: Some(20.0),
        is_bookable: true,
        hired_at: Some(NaiveDate::from_ymd_opt(2024, 3, 1).expect("date")),
    }
}

#[test]
fn test_sqlite_path_strips_scheme() {
    assert_eq!(sqlite_path("sqlite://data/salon.db"), "data/salon.db");
    assert_eq!(sqlite_path("sqlite:salon.db"), "salon.db");
    assert_eq!(sqlite_path("salon.db"), "salon.db");
}

#[test]
fn test_database_creation_and_initialization() {
    let (_dir, db) = temp_db();
    let _conn = db.get_connection().expect("Failed to get database connection");
}

#[test]
fn test_salon_and_service_round_trip() {
    let (_dir, db) = temp_db();
    let salon_id = salon(&db);

    let stored = db.get_salon(&salon_id).expect("query").expect("salon exists");
    assert_eq!(stored.name, "Test Salon");
    assert!(db.get_salon("missing").expect("query").is_none());

    let service = db
        .create_service(&NewService {
            salon_id: salon_id.clone(),
            name: "Colour".to_string(),
            duration_minutes: 90,
            price: 120.0,
        })
        .expect("service");
    let loaded = db.get_service(&service.id).expect("query").expect("service exists");
    assert_eq!(loaded.duration_minutes, 90);
    assert!(loaded.is_active);
}

#[test]
fn test_token_resolves_to_context() {
    let (_dir, db) = temp_db();
    let salon_id = salon(&db);
    let owner = db
        .create_profile(&NewProfile {
            email: "owner@salon.test".to_string(),
            display_name: "Owner".to_string(),
            role: Role::Owner,
            salon_id: Some(salon_id.clone()),
            api_token: "secret".to_string(),
        })
        .expect("profile");

    let ctx = db.resolve_token("secret").expect("query").expect("known token");
    assert_eq!(ctx.user_id, owner.id);
    assert_eq!(ctx.salon_id.as_deref(), Some(salon_id.as_str()));
    assert_eq!(ctx.role, Role::Owner);
    assert!(db.resolve_token("wrong").expect("query").is_none());
}

#[test]
fn test_ensure_customer_reuses_profile() {
    let (_dir, db) = temp_db();
    let first = db.ensure_customer("walkin@example.com", "Walk In").expect("create");
    let second = db.ensure_customer("walkin@example.com", "Other Name").expect("reuse");
    assert_eq!(first.id, second.id);
    assert_eq!(second.role, Role::Customer);
}

#[test]
fn test_staff_crud_and_filters() {
    let (_dir, db) = temp_db();
    let salon_id = salon(&db);
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).single().expect("time");

    let alex = db.create_staff(&staff_data(&salon_id, "Alex"), now).expect("alex");
    let blair = db.create_staff(&staff_data(&salon_id, "Blair"), now).expect("blair");
    assert!(alex.is_active);
    assert!(!alex.is_featured);

    let toggled = db.toggle_bookable(&blair.id, now).expect("toggle");
    assert!(!toggled.is_bookable);

    let bookable = db
        .get_staff_members(
            &salon_id,
            &StaffFilters {
                is_bookable: Some(true),
                ..StaffFilters::default()
            },
        )
        .expect("query");
    assert_eq!(bookable.len(), 1);
    assert_eq!(bookable[0].id, alex.id);

    let searched = db
        .get_staff_members(
            &salon_id,
            &StaffFilters {
                search: Some("blair".to_string()),
                ..StaffFilters::default()
            },
        )
        .expect("query");
    assert_eq!(searched.len(), 1);

    let deleted = db.soft_delete_staff(&alex.id, now).expect("delete");
    assert!(!deleted.is_active);
    assert!(!deleted.is_bookable);
    assert!(deleted.terminated_at.is_some());
}

#[test]
fn test_schedule_upsert_replaces_day() {
    let (_dir, db) = temp_db();
    let salon_id = salon(&db);
    let now = Utc::now();
    let staff = db.create_staff(&staff_data(&salon_id, "Casey"), now).expect("staff");

    let mut schedule = NewStaffSchedule {
        staff_id: staff.id.clone(),
        day_of_week: 2,
        start_time: "09:00".to_string(),
        end_time: "15:00".to_string(),
        break_start: None,
        break_end: None,
        is_working: true,
    };
    db.upsert_schedule(&schedule).expect("insert");
    schedule.end_time = "18:00".to_string();
    db.upsert_schedule(&schedule).expect("update");

    let schedules = db.get_schedules(&staff.id).expect("query");
    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].end_time, "18:00");

    assert!(db.delete_schedule(&schedules[0].id).expect("delete"));
    assert!(db.get_schedules(&staff.id).expect("query").is_empty());
}

#[test]
fn test_blocked_time_by_day() {
    let (_dir, db) = temp_db();
    let salon_id = salon(&db);
    let now = Utc::now();
    let staff = db.create_staff(&staff_data(&salon_id, "Devon"), now).expect("staff");
    let day = NaiveDate::from_ymd_opt(2026, 11, 3).expect("date");

    let blocked = db
        .create_blocked_time(
            &NewBlockedTime {
                staff_id: staff.id.clone(),
                start_time: day.and_hms_opt(14, 0, 0).expect("time"),
                end_time: day.and_hms_opt(15, 30, 0).expect("time"),
                reason: Some("Training".to_string()),
            },
            now,
        )
        .expect("blocked");

    assert_eq!(db.get_blocked_times_on(&staff.id, day).expect("query").len(), 1);
    let next_day = day.succ_opt().expect("date");
    assert!(db.get_blocked_times_on(&staff.id, next_day).expect("query").is_empty());

    assert!(db.remove_blocked_time(&blocked.id).expect("remove"));
    assert!(!db.remove_blocked_time(&blocked.id).expect("remove again"));
}
