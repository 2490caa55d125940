//! Loyalty programs, tiers and the points ledger

mod common;

use proptest::prelude::*;

use common::{fixture, monday, Fixture};
use salon_ops::ledger::{apply_transaction, LedgerBalance};
use salon_ops::models::{
    LoyaltyProgram, LoyaltyProgramUpdate, LoyaltyTierUpdate, NewLoyaltyProgram, NewLoyaltyTier,
    NewLoyaltyTransaction, TransactionType,
};

fn program_data(fx: &Fixture) -> NewLoyaltyProgram {
    NewLoyaltyProgram {
        salon_id: fx.salon.id.clone(),
        name: "Glow Rewards".to_string(),
        description: Some("One point per dollar".to_string()),
        points_per_dollar: 1.0,
        points_per_visit: 10,
        is_active: true,
    }
}

async fn program(fx: &Fixture) -> LoyaltyProgram {
    fx.actions
        .create_program(&fx.owner, program_data(fx))
        .await
        .data
        .expect("program")
}

fn tier(name: &str, min_points: i64) -> NewLoyaltyTier {
    NewLoyaltyTier {
        name: name.to_string(),
        min_points,
        discount_percentage: 5.0,
        benefits: vec!["Free fringe trim".to_string()],
    }
}

#[tokio::test]
async fn test_only_owners_manage_programs() {
    let fx = fixture();
    let denied = fx.actions.create_program(&fx.staff, program_data(&fx)).await;
    assert_eq!(denied.code.as_deref(), Some("PERMISSION_DENIED"));

    let created = program(&fx).await;
    assert_eq!(fx.actions.get_program(&fx.salon.id).await.data.flatten(), Some(created.clone()));

    let updated = fx
        .actions
        .update_program(
            &fx.owner,
            &created.id,
            LoyaltyProgramUpdate {
                points_per_dollar: Some(2.0),
                ..LoyaltyProgramUpdate::default()
            },
        )
        .await
        .data
        .expect("updated");
    assert!((updated.points_per_dollar - 2.0).abs() < f64::EPSILON);
    assert_eq!(updated.name, "Glow Rewards");

    let negative = fx
        .actions
        .update_program(
            &fx.owner,
            &created.id,
            LoyaltyProgramUpdate {
                points_per_visit: Some(-1),
                ..LoyaltyProgramUpdate::default()
            },
        )
        .await;
    assert!(negative.field_errors.is_some_and(|f| f.contains_key("points_per_visit")));

    assert_eq!(fx.actions.delete_program(&fx.owner, &created.id).await.data, Some(true));
    assert_eq!(fx.actions.get_program(&fx.salon.id).await.data.flatten(), None);
}

#[tokio::test]
async fn test_enrollment_is_unique() {
    let fx = fixture();
    let program = program(&fx).await;

    let membership = fx
        .actions
        .enroll_customer(&fx.customer, &fx.customer.user_id, &program.id)
        .await
        .data
        .expect("membership");
    assert_eq!(membership.points_balance, 0);
    assert_eq!(membership.tier_level, None);

    let again = fx
        .actions
        .enroll_customer(&fx.staff, &fx.customer.user_id, &program.id)
        .await;
    assert_eq!(again.code.as_deref(), Some("OPERATION_FAILED"));
    assert_eq!(again.error.as_deref(), Some("Customer is already enrolled in this program"));

    let members = fx
        .actions
        .get_program_members(&fx.staff, &program.id)
        .await
        .data
        .expect("members");
    assert_eq!(members.len(), 1);

    assert_eq!(
        fx.actions
            .unenroll_customer(&fx.customer, &fx.customer.user_id, &program.id)
            .await
            .data,
        Some(true)
    );
    let gone = fx
        .actions
        .get_customer_loyalty(&fx.customer, &fx.customer.user_id, &program.id)
        .await;
    assert_eq!(gone.data, Some(None));
}

#[tokio::test]
async fn test_inactive_program_refuses_enrollment() {
    let fx = fixture();
    let program = fx
        .actions
        .create_program(
            &fx.owner,
            NewLoyaltyProgram {
                is_active: false,
                ..program_data(&fx)
            },
        )
        .await
        .data
        .expect("program");

    let response = fx
        .actions
        .enroll_customer(&fx.customer, &fx.customer.user_id, &program.id)
        .await;
    assert!(response.field_errors.is_some_and(|f| f.contains_key("program_id")));
}

#[tokio::test]
async fn test_earn_redeem_and_adjust() {
    let fx = fixture();
    let program = program(&fx).await;
    let membership = fx
        .actions
        .enroll_customer(&fx.customer, &fx.customer.user_id, &program.id)
        .await
        .data
        .expect("membership");

    let earned = fx
        .actions
        .earn_points(&fx.staff, &membership.id, 120, "Welcome bonus", None)
        .await
        .data
        .expect("earned");
    assert_eq!(earned.balance_after, 120);
    assert_eq!(earned.created_by.as_deref(), Some(fx.staff.user_id.as_str()));

    let too_much = fx
        .actions
        .redeem_points(&fx.staff, &membership.id, 500, "Free colour")
        .await;
    assert_eq!(too_much.code.as_deref(), Some("OPERATION_FAILED"));
    assert!(too_much.error.unwrap_or_default().contains("Insufficient points"));

    let redeemed = fx
        .actions
        .redeem_points(&fx.staff, &membership.id, 100, "Free blow-dry")
        .await
        .data
        .expect("redeemed");
    assert_eq!(redeemed.balance_after, 20);

    let adjusted = fx
        .actions
        .adjust_points(&fx.owner, &membership.id, -5, "Duplicate entry")
        .await
        .data
        .expect("adjusted");
    assert_eq!(adjusted.balance_after, 15);

    let below_zero = fx
        .actions
        .adjust_points(&fx.owner, &membership.id, -50, "Mistake")
        .await;
    assert!(!below_zero.success);

    let customer_earn = fx
        .actions
        .earn_points(&fx.customer, &membership.id, 1000, "Self service", None)
        .await;
    assert_eq!(customer_earn.code.as_deref(), Some("PERMISSION_DENIED"));

    let stored = fx
        .actions
        .get_customer_loyalty(&fx.customer, &fx.customer.user_id, &program.id)
        .await
        .data
        .flatten()
        .expect("membership");
    assert_eq!(stored.points_balance, 15);
    assert_eq!(stored.lifetime_points, 120);

    let history = fx
        .actions
        .get_customer_transactions(&fx.customer, &membership.id, Some(2))
        .await
        .data
        .expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].transaction_type, TransactionType::Adjusted);
}

#[tokio::test]
async fn test_invalid_movements_are_rejected() {
    let fx = fixture();
    let program = program(&fx).await;
    let membership = fx
        .actions
        .enroll_customer(&fx.customer, &fx.customer.user_id, &program.id)
        .await
        .data
        .expect("membership");

    let response = fx
        .actions
        .add_transaction(
            &fx.owner,
            NewLoyaltyTransaction {
                customer_loyalty_id: membership.id.clone(),
                appointment_id: None,
                transaction_type: TransactionType::Earned,
                points_amount: 0,
                description: String::new(),
                reference_id: None,
                reference_type: None,
            },
        )
        .await;
    let fields = response.field_errors.expect("field errors");
    assert!(fields.contains_key("points"));
    assert!(fields.contains_key("description"));

    let unknown = fx.actions.earn_points(&fx.owner, "missing", 10, "Bonus", None).await;
    assert_eq!(unknown.code.as_deref(), Some("OPERATION_FAILED"));
}

#[tokio::test]
async fn test_tiers_follow_lifetime_points() {
    let fx = fixture();
    let program = program(&fx).await;
    let silver = fx
        .actions
        .create_tier(&fx.owner, &program.id, tier("Silver", 100))
        .await
        .data
        .expect("silver");
    fx.actions
        .create_tier(&fx.owner, &program.id, tier("Gold", 500))
        .await
        .data
        .expect("gold");

    let bad = fx
        .actions
        .create_tier(
            &fx.owner,
            &program.id,
            NewLoyaltyTier {
                discount_percentage: 150.0,
                ..tier("Platinum", 1000)
            },
        )
        .await;
    assert!(bad.field_errors.is_some_and(|f| f.contains_key("discount_percentage")));

    let tiers = fx.actions.get_tiers(&program.id).await.data.expect("tiers");
    let names: Vec<_> = tiers.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Silver", "Gold"]);

    let membership = fx
        .actions
        .enroll_customer(&fx.customer, &fx.customer.user_id, &program.id)
        .await
        .data
        .expect("membership");
    fx.actions
        .earn_points(&fx.owner, &membership.id, 150, "Referral", None)
        .await
        .data
        .expect("earned");
    let current = |fx: &Fixture| {
        fx.db
            .get_membership(&membership.id)
            .expect("query")
            .expect("membership")
    };
    assert_eq!(current(&fx).tier_level.as_deref(), Some("Silver"));

    fx.actions
        .earn_points(&fx.owner, &membership.id, 400, "Referral", None)
        .await
        .data
        .expect("earned");
    assert_eq!(current(&fx).tier_level.as_deref(), Some("Gold"));

    let renamed = fx
        .actions
        .update_tier(
            &fx.owner,
            &silver.id,
            LoyaltyTierUpdate {
                name: Some("Bronze".to_string()),
                ..LoyaltyTierUpdate::default()
            },
        )
        .await
        .data
        .expect("renamed");
    assert_eq!(renamed.name, "Bronze");
    assert_eq!(renamed.min_points, 100);

    assert_eq!(fx.actions.delete_tier(&fx.owner, &silver.id).await.data, Some(true));
    assert_eq!(fx.actions.get_tiers(&program.id).await.data.expect("tiers").len(), 1);
}

#[tokio::test]
async fn test_completion_awards_points() {
    let fx = fixture();
    let program = program(&fx).await;
    let membership = fx
        .actions
        .enroll_customer(&fx.customer, &fx.customer.user_id, &program.id)
        .await
        .data
        .expect("membership");

    let appointment = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment");
    for step in [
        fx.actions.check_in_customer(&fx.staff, &appointment.id).await,
        fx.actions.complete_appointment(&fx.staff, &appointment.id).await,
    ] {
        assert!(step.success, "{:?}", step.error);
    }

    let stored = fx.db.get_membership(&membership.id).expect("query").expect("membership");
    // $55.00 total at one point per dollar plus the 10 point visit bonus
    assert_eq!(stored.points_balance, 65);
    assert_eq!(stored.visits_count, 1);

    let history = fx
        .actions
        .get_customer_transactions(&fx.staff, &membership.id, None)
        .await
        .data
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].appointment_id.as_deref(), Some(appointment.id.as_str()));
    assert_eq!(history[0].reference_type.as_deref(), Some("appointment"));

    let stats = fx
        .actions
        .get_statistics(&fx.owner, &fx.salon.id)
        .await
        .data
        .expect("statistics");
    assert_eq!(stats.total_members, 1);
    assert_eq!(stats.total_points_earned, 65);
    assert_eq!(stats.total_points_redeemed, 0);
    assert_eq!(stats.active_programs, 1);
}

#[tokio::test]
async fn test_award_without_membership_is_empty() {
    let fx = fixture();
    program(&fx).await;
    let appointment = fx
        .actions
        .create_booking(&fx.customer, fx.booking(monday(), "10:00"))
        .await
        .data
        .expect("appointment");

    let response = fx
        .actions
        .award_points_for_appointment(&fx.owner, &appointment.id)
        .await;
    assert!(response.success);
    assert_eq!(response.data, Some(None));
}

#[tokio::test]
async fn test_points_for_purchase() {
    let fx = fixture();
    let default_rate = fx.actions.calculate_points_for_purchase(&fx.salon.id, 49.99).await;
    assert_eq!(default_rate.data, Some(49));

    let program = program(&fx).await;
    fx.actions
        .update_program(
            &fx.owner,
            &program.id,
            LoyaltyProgramUpdate {
                points_per_dollar: Some(2.0),
                ..LoyaltyProgramUpdate::default()
            },
        )
        .await
        .data
        .expect("updated");
    assert_eq!(
        fx.actions.calculate_points_for_purchase(&fx.salon.id, 100.0).await.data,
        Some(210)
    );

    let negative = fx.actions.calculate_points_for_purchase(&fx.salon.id, -1.0).await;
    assert_eq!(negative.code.as_deref(), Some("VALIDATION_ERROR"));
}

fn movement() -> impl Strategy<Value = (TransactionType, i64)> {
    prop_oneof![
        (1_i64..500).prop_map(|p| (TransactionType::Earned, p)),
        (1_i64..500).prop_map(|p| (TransactionType::Redeemed, p)),
        (1_i64..500).prop_map(|p| (TransactionType::Expired, p)),
        (-500_i64..500)
            .prop_filter("non-zero", |p| *p != 0)
            .prop_map(|p| (TransactionType::Adjusted, p)),
    ]
}

proptest! {
    #[test]
    fn test_balance_never_negative(moves in prop::collection::vec(movement(), 1..40)) {
        let mut balance = LedgerBalance::default();
        for (kind, points) in moves {
            if let Ok(next) = apply_transaction(balance, kind, points, false) {
                balance = next;
            }
            prop_assert!(balance.points_balance >= 0);
            prop_assert!(balance.lifetime_points >= balance.points_balance);
        }
    }

    #[test]
    fn test_rejected_redemption_leaves_balance(start in 0_i64..100, extra in 1_i64..100) {
        let balance = LedgerBalance { points_balance: start, lifetime_points: start, visits_count: 0 };
        prop_assert!(apply_transaction(balance, TransactionType::Redeemed, start + extra, false).is_err());
    }
}
