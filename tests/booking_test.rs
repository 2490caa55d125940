//! Booking actions against a temporary database

mod common;

use std::collections::HashMap;

use chrono::Duration;

use common::{fixture, monday, sunday, CUSTOMER_TOKEN};
use salon_ops::feed::{BookingUpdateType, FeedMessage};
use salon_ops::models::{
    AppointmentStatus, BookingFilters, CustomerInfo, GroupBooking, NewWaitingListEntry,
    PaymentStatus, PaymentUpdate, RecurringFrequency, RecurringSettings,
};

fn guest(first: &str, email: &str) -> CustomerInfo {
    CustomerInfo {
        id: None,
        first_name: first.to_string(),
        last_name: "Guest".to_string(),
        email: email.to_string(),
        phone: None,
    }
}

#[tokio::test]
async fn test_create_booking_computes_totals() {
    let fx = fixture();
    let response = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await;

    assert!(response.success, "{:?}", response.error);
    let appointment = response.data.expect("appointment");
    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(appointment.customer_id, fx.customer.user_id);
    assert_eq!(appointment.duration_minutes, 60);
    assert_eq!(appointment.end_time - appointment.start_time, Duration::minutes(60));
    assert!((appointment.subtotal - 50.0).abs() < 0.001);
    assert!((appointment.tax_amount - 5.0).abs() < 0.001);
    assert!((appointment.total_amount - 55.0).abs() < 0.001);
    assert!(appointment.confirmation_code.starts_with("BK"));
}

#[tokio::test]
async fn test_authenticate_resolves_tokens() {
    let fx = fixture();
    assert_eq!(fx.ctx(CUSTOMER_TOKEN).await, fx.customer);
    assert!(fx.actions.authenticate(Some("nope")).await.is_err());
    assert!(fx.actions.authenticate(None).await.is_err());
}

#[tokio::test]
async fn test_double_booking_is_rejected() {
    let fx = fixture();
    let first = fx.actions.create_booking(&fx.staff, fx.booking(monday(), "10:00")).await;
    assert!(first.success);

    let second = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:30"))
        .await;
    assert!(!second.success);
    assert_eq!(second.code.as_deref(), Some("OPERATION_FAILED"));
    assert!(second.error.unwrap_or_default().contains("already booked"));
}

#[tokio::test]
async fn test_break_rejected_for_customers_but_not_staff() {
    let fx = fixture();
    let customer = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "12:00"))
        .await;
    assert!(!customer.success);
    assert_eq!(customer.code.as_deref(), Some("VALIDATION_ERROR"));
    assert!(customer.field_errors.is_some_and(|f| f.contains_key("time")));

    let staff = fx.actions.create_booking(&fx.staff, fx.booking(monday(), "12:00")).await;
    assert!(staff.success, "{:?}", staff.error);
}

#[tokio::test]
async fn test_day_off_is_outside_working_hours() {
    let fx = fixture();
    let response = fx
        .actions
        .create_booking(&fx.customer, fx.booking(sunday(), "10:00"))
        .await;
    assert_eq!(response.code.as_deref(), Some("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_invalid_request_reports_fields() {
    let fx = fixture();
    let mut request = fx.booking(monday(), "25:00");
    request.services.clear();

    let response = fx.actions.create_booking(&fx.customer, request).await;
    let fields = response.field_errors.expect("field errors");
    assert!(fields.contains_key("time"));
    assert!(fields.contains_key("services"));
}

#[tokio::test]
async fn test_status_lifecycle() {
    let fx = fixture();
    let id = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment")
        .id;

    let denied = fx.actions.confirm_booking(&fx.customer, &id).await;
    assert_eq!(denied.code.as_deref(), Some("PERMISSION_DENIED"));

    for (step, expected) in [
        (fx.actions.confirm_booking(&fx.owner, &id).await, AppointmentStatus::Confirmed),
        (fx.actions.check_in_customer(&fx.staff, &id).await, AppointmentStatus::CheckedIn),
        (fx.actions.start_service(&fx.staff, &id).await, AppointmentStatus::InProgress),
        (fx.actions.complete_appointment(&fx.staff, &id).await, AppointmentStatus::Completed),
    ] {
        assert_eq!(step.data.expect("transition").status, expected);
    }

    let completed = fx.db.get_appointment(&id).expect("query").expect("appointment");
    assert_eq!(completed.completed_by.as_deref(), Some(fx.staff.user_id.as_str()));
    assert!(completed.checked_in_at.is_some());
    assert!(fx
        .db
        .get_appointment_services(&id)
        .expect("query")
        .iter()
        .all(|s| s.is_completed));

    let late_cancel = fx.actions.cancel_booking(&fx.customer, &id, None).await;
    assert_eq!(late_cancel.code.as_deref(), Some("OPERATION_FAILED"));
    assert!(late_cancel.error.unwrap_or_default().contains("Cannot change booking status"));
}

#[tokio::test]
async fn test_customer_cancel_frees_slot() {
    let fx = fixture();
    let id = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment")
        .id;

    let cancelled = fx
        .actions
        .cancel_booking(&fx.customer, &id, Some("Feeling unwell".to_string()))
        .await
        .data
        .expect("cancelled");
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Feeling unwell"));
    assert_eq!(cancelled.cancelled_by.as_deref(), Some(fx.customer.user_id.as_str()));

    let rebooked = fx.actions.create_booking(&fx.staff, fx.booking(monday(), "10:00")).await;
    assert!(rebooked.success);
}

#[tokio::test]
async fn test_no_show_only_before_check_in() {
    let fx = fixture();
    let id = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "15:00"))
        .await
        .data
        .expect("appointment")
        .id;

    let marked = fx.actions.mark_no_show(&fx.staff, &id).await;
    assert_eq!(marked.data.expect("no show").status, AppointmentStatus::NoShow);
    assert!(!fx.actions.confirm_booking(&fx.staff, &id).await.success);
}

#[tokio::test]
async fn test_reschedule_moves_and_checks_conflicts() {
    let fx = fixture();
    let first = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("first");
    fx.actions
        .create_booking(&fx.staff, fx.booking(monday(), "15:00"))
        .await
        .data
        .expect("second");

    let moved = fx
        .actions
        .reschedule_booking(&fx.customer, &first.id, monday(), "14:00", None)
        .await
        .data
        .expect("rescheduled");
    assert_eq!(moved.start_time, monday().and_hms_opt(14, 0, 0).expect("time"));
    assert_eq!(moved.end_time, monday().and_hms_opt(15, 0, 0).expect("time"));

    // Overlapping its own old slot is fine, the 15:00 booking is not
    let clash = fx
        .actions
        .reschedule_booking(&fx.customer, &first.id, monday(), "14:30", None)
        .await;
    assert_eq!(clash.code.as_deref(), Some("OPERATION_FAILED"));

    let bad_time = fx
        .actions
        .reschedule_booking(&fx.customer, &first.id, monday(), "2pm", None)
        .await;
    assert_eq!(bad_time.code.as_deref(), Some("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_notes_and_payment() {
    let fx = fixture();
    let id = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment")
        .id;

    let notes = fx
        .actions
        .add_appointment_notes(&fx.customer, &id, "Please use the side door", false)
        .await;
    assert_eq!(notes.data.expect("notes").notes.as_deref(), Some("Please use the side door"));

    let internal = fx
        .actions
        .add_appointment_notes(&fx.customer, &id, "VIP", true)
        .await;
    assert_eq!(internal.code.as_deref(), Some("PERMISSION_DENIED"));

    let paid = fx
        .actions
        .update_payment_status(
            &fx.staff,
            &id,
            PaymentUpdate {
                status: PaymentStatus::Paid,
                method: Some("card".to_string()),
                transaction_id: Some("txn_123".to_string()),
            },
        )
        .await
        .data
        .expect("paid");
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.transaction_id.as_deref(), Some("txn_123"));
    assert!(paid.paid_at.is_some());
}

#[tokio::test]
async fn test_booking_details_and_services() {
    let fx = fixture();
    let id = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment")
        .id;

    let details = fx.actions.get_booking_by_id(&fx.customer, &id).await.data.expect("details");
    assert_eq!(details.staff_name.as_deref(), Some("Sam"));
    assert_eq!(details.salon.name, "Glow Studio");
    assert_eq!(details.services.len(), 1);

    let services = fx
        .actions
        .get_appointment_services(&fx.owner, &id)
        .await
        .data
        .expect("services");
    assert_eq!(services[0].service_order, 1);
    assert_eq!(services[0].service_name, "Haircut");

    let missing = fx.actions.get_booking_by_id(&fx.owner, "missing").await;
    assert_eq!(missing.code.as_deref(), Some("OPERATION_FAILED"));
}

#[tokio::test]
async fn test_recurring_skips_taken_weeks() {
    let fx = fixture();
    let second_week = monday() + Duration::weeks(1);
    fx.actions
        .create_booking(&fx.staff, fx.booking(second_week, "10:00"))
        .await
        .data
        .expect("existing");

    let settings = RecurringSettings {
        frequency: RecurringFrequency::Weekly,
        interval: 1,
        end_date: None,
        occurrences: Some(3),
        day_of_month: None,
    };
    let response = fx
        .actions
        .create_recurring_bookings(&fx.customer, fx.booking(monday(), "10:00"), settings)
        .await;

    assert_eq!(response.message.as_deref(), Some("Created 2 recurring appointments"));
    let outcome = response.data.expect("outcome");
    assert_eq!(outcome.created.len(), 2);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].key, second_week.to_string());
}

#[tokio::test]
async fn test_recurring_rejects_end_before_start() {
    let fx = fixture();
    let settings = RecurringSettings {
        frequency: RecurringFrequency::Daily,
        interval: 1,
        end_date: Some(sunday()),
        occurrences: None,
        day_of_month: None,
    };
    let response = fx
        .actions
        .create_recurring_bookings(&fx.customer, fx.booking(monday(), "10:00"), settings)
        .await;
    assert!(response.field_errors.is_some_and(|f| f.contains_key("end_date")));
}

#[tokio::test]
async fn test_group_booking_back_to_back() {
    let fx = fixture();
    let group = GroupBooking {
        salon_id: fx.salon.id.clone(),
        date: monday(),
        time: "09:00".to_string(),
        participants: vec![
            guest("Ana", "ana@example.com"),
            guest("Ben", "ben@example.com"),
            guest("Cleo", "cleo@example.com"),
        ],
        shared_services: vec![fx.selection()],
        individual_services: HashMap::new(),
        staff_id: Some(fx.stylist.id.clone()),
        prefer_same_staff: true,
    };

    assert_eq!(
        fx.actions.create_group_booking(&fx.customer, group.clone()).await.code.as_deref(),
        Some("PERMISSION_DENIED")
    );

    let outcome = fx
        .actions
        .create_group_booking(&fx.staff, group)
        .await
        .data
        .expect("outcome");
    let starts: Vec<String> = outcome
        .created
        .iter()
        .map(|a| a.start_time.format("%H:%M").to_string())
        .collect();
    assert_eq!(starts, vec!["09:00", "10:00", "11:00"]);
    assert!(outcome.skipped.is_empty());

    let customers: std::collections::HashSet<_> = outcome.created.iter().map(|a| &a.customer_id).collect();
    assert_eq!(customers.len(), 3);
}

#[tokio::test]
async fn test_group_participant_without_services_is_skipped() {
    let fx = fixture();
    let mut individual = HashMap::new();
    individual.insert("ana@example.com".to_string(), vec![fx.selection()]);
    let group = GroupBooking {
        salon_id: fx.salon.id.clone(),
        date: monday(),
        time: "09:00".to_string(),
        participants: vec![guest("Ana", "ana@example.com"), guest("Ben", "ben@example.com")],
        shared_services: Vec::new(),
        individual_services: individual,
        staff_id: None,
        prefer_same_staff: false,
    };

    let outcome = fx.actions.create_group_booking(&fx.owner, group).await.data.expect("outcome");
    assert_eq!(outcome.created.len(), 1);
    assert_eq!(outcome.skipped[0].key, "ben@example.com");
}

#[tokio::test]
async fn test_waiting_list() {
    let fx = fixture();
    let entry = fx
        .actions
        .add_to_waiting_list(
            &fx.customer,
            NewWaitingListEntry {
                salon_id: fx.salon.id.clone(),
                service_ids: vec![fx.service.id.clone()],
                preferred_date: Some(monday()),
                preferred_time: Some("10:00".to_string()),
                ..NewWaitingListEntry::default()
            },
        )
        .await
        .data
        .expect("entry");
    assert_eq!(entry.customer_id, fx.customer.user_id);
    assert!(!entry.notified);

    let empty = fx
        .actions
        .add_to_waiting_list(
            &fx.customer,
            NewWaitingListEntry {
                salon_id: fx.salon.id.clone(),
                ..NewWaitingListEntry::default()
            },
        )
        .await;
    assert!(empty.field_errors.is_some_and(|f| f.contains_key("service_ids")));

    let denied = fx
        .actions
        .get_waiting_list(&fx.customer, &fx.salon.id, Default::default())
        .await;
    assert_eq!(denied.code.as_deref(), Some("PERMISSION_DENIED"));

    let list = fx
        .actions
        .get_waiting_list(&fx.owner, &fx.salon.id, Default::default())
        .await
        .data
        .expect("list");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].service_ids, vec![fx.service.id.clone()]);
}

#[tokio::test]
async fn test_customers_only_list_their_own_bookings() {
    let fx = fixture();
    let mut for_guest = fx.booking(monday(), "09:00");
    for_guest.customer = Some(guest("Dana", "dana@example.com"));
    fx.actions.create_booking(&fx.owner, for_guest).await.data.expect("guest booking");
    fx.actions
        .create_booking(&fx.customer, fx.booking(monday(), "14:00"))
        .await
        .data
        .expect("own booking");

    let own = fx
        .actions
        .get_bookings(&fx.customer, &fx.salon.id, BookingFilters::default())
        .await
        .data
        .expect("bookings");
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].appointment.customer_id, fx.customer.user_id);
    assert!(own[0].can_cancel);

    let all = fx
        .actions
        .get_bookings(&fx.owner, &fx.salon.id, BookingFilters::default())
        .await
        .data
        .expect("bookings");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].staff_name, "Sam");
}

#[tokio::test]
async fn test_booking_list_is_revalidated_after_changes() {
    let fx = fixture();
    let before = fx
        .actions
        .get_bookings(&fx.owner, &fx.salon.id, BookingFilters::default())
        .await
        .data
        .expect("bookings");
    assert!(before.is_empty());
    assert!(!fx.actions.cache().is_empty());

    fx.actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment");

    let after = fx
        .actions
        .get_bookings(&fx.owner, &fx.salon.id, BookingFilters::default())
        .await
        .data
        .expect("bookings");
    assert_eq!(after.len(), 1);
}

#[tokio::test]
async fn test_status_filter() {
    let fx = fixture();
    let id = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment")
        .id;
    fx.actions
        .create_booking(&fx.customer, fx.booking(monday(), "14:00"))
        .await
        .data
        .expect("appointment");
    fx.actions.confirm_booking(&fx.owner, &id).await.data.expect("confirmed");

    let confirmed = fx
        .actions
        .get_bookings(
            &fx.owner,
            &fx.salon.id,
            BookingFilters {
                statuses: vec![AppointmentStatus::Confirmed],
                ..BookingFilters::default()
            },
        )
        .await
        .data
        .expect("bookings");
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].appointment.id, id);
}

#[tokio::test]
async fn test_time_slots_follow_schedule() {
    let fx = fixture();
    fx.actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment");

    let slots = fx
        .actions
        .get_available_time_slots(&fx.salon.id, monday(), 60, Some(fx.stylist.id.clone()))
        .await
        .data
        .expect("slots");
    let lookup: HashMap<&str, bool> = slots.iter().map(|s| (s.time.as_str(), s.available)).collect();
    assert_eq!(slots.first().map(|s| s.time.as_str()), Some("09:00"));
    assert_eq!(slots.last().map(|s| s.time.as_str()), Some("16:00"));
    assert!(lookup["09:00"]);
    assert!(!lookup["09:30"]);
    assert!(!lookup["10:00"]);
    assert!(lookup["11:00"]);
    assert!(!lookup["12:00"]);
    assert!(lookup["13:00"]);

    let day_off = fx
        .actions
        .get_available_time_slots(&fx.salon.id, sunday(), 60, Some(fx.stylist.id.clone()))
        .await
        .data
        .expect("slots");
    assert!(day_off.is_empty());
}

#[tokio::test]
async fn test_time_slots_without_staff_use_salon_hours() {
    let fx = fixture();
    fx.actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment");

    let slots = fx
        .actions
        .get_available_time_slots(&fx.salon.id, monday(), 30, None)
        .await
        .data
        .expect("slots");
    assert_eq!(slots.last().map(|s| s.time.as_str()), Some("18:30"));
    assert!(slots.iter().any(|s| s.time == "10:00" && !s.available));

    let invalid = fx.actions.get_available_time_slots(&fx.salon.id, monday(), 0, None).await;
    assert_eq!(invalid.code.as_deref(), Some("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_check_availability_suggests_next_slot() {
    let fx = fixture();
    fx.actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment");

    let check = fx
        .actions
        .check_availability(&fx.stylist.id, monday(), &fx.service.id, Some("10:00".to_string()))
        .await
        .data
        .expect("check");
    assert!(!check.available);
    assert_eq!(check.reason.as_deref(), Some("Time slot already booked"));
    assert_eq!(check.next_available.as_deref(), Some("11:00"));

    let whole_day = fx
        .actions
        .check_availability(&fx.stylist.id, sunday(), &fx.service.id, None)
        .await
        .data
        .expect("check");
    assert!(!whole_day.available);
    assert!(whole_day.available_slots.is_empty());
}

#[tokio::test]
async fn test_availability_calendar_lists_bookings() {
    let fx = fixture();
    fx.actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment");

    let calendar = fx
        .actions
        .get_availability_calendar(&fx.stylist.id, sunday(), monday())
        .await
        .data
        .expect("calendar");
    assert_eq!(calendar.len(), 2);
    assert!(calendar[&sunday()].working_hours.is_none());
    let day = &calendar[&monday()];
    assert!(day.working_hours.is_some());
    assert_eq!(day.booked_slots.len(), 1);
}

#[tokio::test]
async fn test_capacity_and_analytics() {
    let fx = fixture();
    let first = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("first");
    fx.actions
        .create_booking(&fx.customer, fx.booking(monday(), "14:00"))
        .await
        .data
        .expect("second");
    fx.actions.cancel_booking(&fx.owner, &first.id, None).await.data.expect("cancelled");

    let capacity = fx
        .actions
        .get_capacity_info(&fx.owner, &fx.salon.id, monday(), monday())
        .await
        .data
        .expect("capacity");
    assert_eq!(capacity.len(), 1);
    assert_eq!(capacity[0].booked_slots, 1);
    assert_eq!(capacity[0].total_slots, 32);
    assert_eq!(capacity[0].available_slots, 31);

    let denied = fx
        .actions
        .get_capacity_info(&fx.customer, &fx.salon.id, monday(), monday())
        .await;
    assert_eq!(denied.code.as_deref(), Some("PERMISSION_DENIED"));

    let analytics = fx
        .actions
        .get_booking_analytics(&fx.owner, &fx.salon.id, sunday(), monday())
        .await
        .data
        .expect("analytics");
    assert_eq!(analytics.total_bookings, 2);
    assert_eq!(analytics.cancelled_bookings, 1);
    assert_eq!(analytics.popular_services[0].service_name, "Haircut");
}

#[tokio::test]
async fn test_feed_announces_new_booking() {
    let fx = fixture();
    let mut rx = fx.actions.feed().subscribe(&fx.salon.id);

    let appointment = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment");

    match rx.recv().await.expect("update") {
        FeedMessage::BookingUpdate(update) => {
            assert_eq!(update.kind, BookingUpdateType::New);
            assert_eq!(update.appointment_id, appointment.id);
        }
        other => panic!("unexpected message {other:?}"),
    }
    assert!(matches!(rx.recv().await.expect("stats"), FeedMessage::Stats(s) if s.new_bookings == 1));
    match rx.recv().await.expect("capacity") {
        FeedMessage::Capacity(info) => {
            assert_eq!(info.date, monday());
            assert_eq!(info.booked_slots, 1);
        }
        other => panic!("unexpected message {other:?}"),
    }
}

#[tokio::test]
async fn test_feed_announces_conflicts() {
    let fx = fixture();
    let mut rx = fx.actions.feed().subscribe(&fx.salon.id);

    let response = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "12:00"))
        .await;
    assert!(!response.success);
    assert!(matches!(rx.recv().await.expect("conflict"), FeedMessage::Conflict(_)));
}

#[tokio::test]
async fn test_calendar_export() {
    let fx = fixture();
    let appointment = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment");

    let file = fx
        .actions
        .get_booking_calendar(&fx.customer, &appointment.id)
        .await
        .data
        .expect("calendar");
    assert_eq!(file.file_name, format!("appointment-{}.ics", appointment.confirmation_code));
    assert!(file.content.starts_with("BEGIN:VCALENDAR\r\n"));
    assert!(file.content.contains("SUMMARY:Salon Appointment - Haircut"));
    assert!(file.content.contains("LOCATION:Glow Studio\\, 12 Main St"));
    assert!(file.content.trim_end().ends_with("END:VCALENDAR"));
}
