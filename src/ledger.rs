//! Loyalty ledger arithmetic.
//!
//! A membership's balance only ever changes through [`apply_transaction`],
//! which the data access layer runs inside the same SQLite transaction that
//! appends the ledger row.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SalonError};
use crate::models::{LoyaltyTier, TransactionType};
use crate::validation::InputValidator;

/// Running totals of one membership
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalance {
    /// Spendable points
    pub points_balance: i64,
    /// Every point ever earned
    pub lifetime_points: i64,
    /// Visits that earned points
    pub visits_count: i64,
}

/// Apply one movement to a balance.
///
/// * earned: adds to balance and lifetime, and counts a visit when tied to an
///   appointment
/// * redeemed: fails when the balance does not cover it
/// * expired: removes up to the whole balance, never below zero
/// * adjusted: signed; positive amounts also count toward lifetime, and the
///   result may not be negative
pub fn apply_transaction(
    balance: LedgerBalance,
    transaction_type: TransactionType,
    points: i64,
    tied_to_appointment: bool,
) -> Result<LedgerBalance> {
    InputValidator::validate_points(points, transaction_type)
        .map_err(|message| SalonError::invalid("points", message))?;

    let overflow = || SalonError::invalid("points", "Points total out of range");
    let mut next = balance;
    match transaction_type {
        TransactionType::Earned => {
            next.points_balance = balance.points_balance.checked_add(points).ok_or_else(overflow)?;
            next.lifetime_points = balance.lifetime_points.checked_add(points).ok_or_else(overflow)?;
            if tied_to_appointment {
                next.visits_count = balance.visits_count.saturating_add(1);
            }
        }
        TransactionType::Redeemed => {
            if balance.points_balance < points {
                return Err(SalonError::InsufficientPoints {
                    balance: balance.points_balance,
                    requested: points,
                });
            }
            next.points_balance = balance.points_balance.checked_sub(points).ok_or_else(overflow)?;
        }
        TransactionType::Expired => {
            next.points_balance = balance.points_balance.saturating_sub(points).max(0);
        }
        TransactionType::Adjusted => {
            let adjusted = balance.points_balance.checked_add(points).ok_or_else(overflow)?;
            if adjusted < 0 {
                return Err(SalonError::InsufficientPoints {
                    balance: balance.points_balance,
                    requested: points.saturating_neg(),
                });
            }
            next.points_balance = adjusted;
            if points > 0 {
                next.lifetime_points = balance.lifetime_points.checked_add(points).ok_or_else(overflow)?;
            }
        }
    }
    Ok(next)
}

/// Points a purchase earns: `floor(amount × points_per_dollar) + points_per_visit`.
///
/// Non-positive or non-finite amounts earn nothing.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn points_for_purchase(amount: f64, points_per_dollar: f64, points_per_visit: i64) -> i64 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0;
    }
    let earned = (amount * points_per_dollar.max(0.0)).floor() as i64;
    earned.saturating_add(points_per_visit.max(0))
}

/// Highest tier whose threshold the lifetime total has reached.
#[must_use]
pub fn tier_for(tiers: &[LoyaltyTier], lifetime_points: i64) -> Option<&LoyaltyTier> {
    tiers
        .iter()
        .filter(|t| t.min_points <= lifetime_points)
        .max_by_key(|t| t.min_points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::MAX_POINTS_PER_TRANSACTION;
    use chrono::Utc;

    fn balance(points: i64) -> LedgerBalance {
        LedgerBalance {
            points_balance: points,
            lifetime_points: points,
            visits_count: 0,
        }
    }

    #[test]
    fn test_earn_counts_visit_only_with_appointment() {
        let next = apply_transaction(balance(10), TransactionType::Earned, 5, true).expect("earn");
        assert_eq!(next.points_balance, 15);
        assert_eq!(next.lifetime_points, 15);
        assert_eq!(next.visits_count, 1);

        let next = apply_transaction(balance(10), TransactionType::Earned, 5, false).expect("earn");
        assert_eq!(next.visits_count, 0);
    }

    #[test]
    fn test_redeem_more_than_balance_fails() {
        let err = apply_transaction(balance(10), TransactionType::Redeemed, 11, false)
            .expect_err("insufficient");
        assert!(matches!(
            err,
            SalonError::InsufficientPoints {
                balance: 10,
                requested: 11
            }
        ));
    }

    #[test]
    fn test_redeem_exact_balance() {
        let next = apply_transaction(balance(10), TransactionType::Redeemed, 10, false).expect("redeem");
        assert_eq!(next.points_balance, 0);
        assert_eq!(next.lifetime_points, 10);
    }

    #[test]
    fn test_expire_floors_at_zero() {
        let next = apply_transaction(balance(10), TransactionType::Expired, 25, false).expect("expire");
        assert_eq!(next.points_balance, 0);
    }

    #[test]
    fn test_adjustments() {
        let up = apply_transaction(balance(10), TransactionType::Adjusted, 5, false).expect("adjust");
        assert_eq!((up.points_balance, up.lifetime_points), (15, 15));

        let down = apply_transaction(balance(10), TransactionType::Adjusted, -4, false).expect("adjust");
        assert_eq!((down.points_balance, down.lifetime_points), (6, 10));

        assert!(apply_transaction(balance(10), TransactionType::Adjusted, -11, false).is_err());
        let zero = apply_transaction(balance(10), TransactionType::Adjusted, 0, false)
            .expect_err("zero adjustment");
        assert_eq!(zero.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_balance_limits_are_rejected_not_wrapped() {
        let full = LedgerBalance {
            points_balance: i64::MAX,
            lifetime_points: i64::MAX,
            visits_count: 0,
        };
        let err = apply_transaction(full, TransactionType::Earned, 1, false).expect_err("overflow");
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.field_errors().is_some_and(|f| f.contains_key("points")));

        let err = apply_transaction(full, TransactionType::Adjusted, 1, false).expect_err("overflow");
        assert_eq!(err.code(), "VALIDATION_ERROR");

        for points in [i64::MIN, i64::MAX, MAX_POINTS_PER_TRANSACTION + 1] {
            let err = apply_transaction(LedgerBalance::default(), TransactionType::Adjusted, points, false)
                .expect_err("out of range amount");
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }

        let next = apply_transaction(
            LedgerBalance::default(),
            TransactionType::Earned,
            MAX_POINTS_PER_TRANSACTION,
            false,
        )
        .expect("largest single earn");
        assert_eq!(next.points_balance, MAX_POINTS_PER_TRANSACTION);
    }

    #[test]
    fn test_points_for_purchase() {
        assert_eq!(points_for_purchase(55.99, 1.0, 10), 65);
        assert_eq!(points_for_purchase(20.0, 2.5, 0), 50);
        assert_eq!(points_for_purchase(0.0, 1.0, 10), 0);
        assert_eq!(points_for_purchase(f64::MAX, 1.0, 10), i64::MAX);
    }

    #[test]
    fn test_tier_for_picks_highest_reached() {
        let tier = |name: &str, min_points| LoyaltyTier {
            id: name.into(),
            program_id: "p".into(),
            name: name.into(),
            min_points,
            discount_percentage: 0.0,
            benefits: Vec::new(),
            created_at: Utc::now(),
        };
        let tiers = vec![tier("Gold", 500), tier("Bronze", 0), tier("Silver", 200)];
        assert_eq!(tier_for(&tiers, 250).map(|t| t.name.as_str()), Some("Silver"));
        assert_eq!(tier_for(&tiers, 10).map(|t| t.name.as_str()), Some("Bronze"));
        assert_eq!(tier_for(&[], 10), None);
    }
}
