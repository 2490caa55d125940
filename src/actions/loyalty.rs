use tracing::info;

use super::{ActionResponse, Actions};
use crate::auth::UserContext;
use crate::cache::cache_key;
use crate::error::{Result, SalonError};
use crate::ledger::points_for_purchase;
use crate::models::{
    Appointment, CustomerLoyalty, LoyaltyProgram, LoyaltyProgramUpdate, LoyaltyStatistics,
    LoyaltyTier, LoyaltyTierUpdate, LoyaltyTransaction, NewLoyaltyProgram, NewLoyaltyTier,
    NewLoyaltyTransaction, TransactionType,
};
use crate::validation::{FieldCollector, InputValidator};

/// Default page size for transaction history
pub const DEFAULT_TRANSACTION_LIMIT: u32 = 50;

fn program_paths(customer_id: Option<&str>, membership_id: Option<&str>) -> Vec<String> {
    let mut paths = vec!["/dashboard/loyalty".to_string(), "/admin/loyalty".to_string()];
    if let Some(customer_id) = customer_id {
        paths.push(format!("/customers/{customer_id}"));
    }
    if let Some(membership_id) = membership_id {
        paths.push(format!("/dashboard/loyalty/{membership_id}"));
    }
    paths
}

fn program_tags(program: &LoyaltyProgram) -> Vec<String> {
    vec![
        format!("loyalty-{}", program.salon_id),
        "loyalty-programs".to_string(),
        format!("loyalty-program-{}", program.id),
    ]
}

fn membership_tags(program: &LoyaltyProgram, membership: &CustomerLoyalty) -> Vec<String> {
    let mut tags = program_tags(program);
    tags.push(format!("loyalty-customer-{}", membership.customer_id));
    tags.push(format!("loyalty-enrollment-{}", membership.id));
    tags
}

fn check_tier(fields: &mut FieldCollector, name: Option<&str>, min_points: Option<i64>, discount: Option<f64>) {
    if let Some(name) = name {
        fields.check("name", InputValidator::validate_name(name));
    }
    if min_points.is_some_and(|points| points < 0) {
        fields.push("min_points", "Minimum points cannot be negative");
    }
    if discount.is_some_and(|d| !d.is_finite() || !(0.0..=100.0).contains(&d)) {
        fields.push("discount_percentage", "Discount must be between 0 and 100");
    }
}

impl Actions {
    async fn load_program(&self, program_id: &str) -> Result<LoyaltyProgram> {
        let id = program_id.to_string();
        self.with_db(move |db| db.get_program_by_id(&id))
            .await?
            .ok_or_else(|| SalonError::NotFound(format!("Loyalty program {program_id}")))
    }

    /// Membership plus its program
    async fn load_membership(&self, membership_id: &str) -> Result<(CustomerLoyalty, LoyaltyProgram)> {
        let id = membership_id.to_string();
        let membership = self
            .with_db(move |db| db.get_membership(&id))
            .await?
            .ok_or_else(|| SalonError::NotFound(format!("Loyalty membership {membership_id}")))?;
        let program = self.load_program(&membership.program_id).await?;
        Ok((membership, program))
    }

    async fn record_movement(
        &self,
        movement: NewLoyaltyTransaction,
        program: &LoyaltyProgram,
        created_by: Option<&str>,
    ) -> Result<(LoyaltyTransaction, CustomerLoyalty)> {
        let mut fields = FieldCollector::default();
        fields
            .check(
                "points",
                InputValidator::validate_points(movement.points_amount, movement.transaction_type),
            )
            .check("description", InputValidator::validate_description(&movement.description));
        fields.finish()?;

        let created_by = created_by.map(str::to_string);
        let now = self.now_utc();
        let (transaction, membership) = self
            .with_db(move |db| db.add_transaction(&movement, created_by.as_deref(), now))
            .await?;

        self.metrics
            .record_points(transaction.transaction_type.as_str(), transaction.points_amount);
        self.revalidate(
            &program_paths(Some(&membership.customer_id), Some(&membership.id)),
            &membership_tags(program, &membership),
        );
        info!(
            membership_id = %membership.id,
            kind = %transaction.transaction_type,
            points = transaction.points_amount,
            balance = transaction.balance_after,
            "Loyalty transaction recorded"
        );
        Ok((transaction, membership))
    }

    /// Earn points for a completed appointment's total.
    ///
    /// `None` when the salon has no active program, the customer is not
    /// enrolled, or the total earns nothing.
    pub(super) async fn award_points_inner(
        &self,
        appointment: &Appointment,
        created_by: Option<&str>,
    ) -> Result<Option<(LoyaltyTransaction, CustomerLoyalty)>> {
        let salon = appointment.salon_id.clone();
        let program = self.with_db(move |db| db.get_salon_program(&salon)).await?;
        let Some(program) = program.filter(|p| p.is_active) else {
            return Ok(None);
        };
        let customer = appointment.customer_id.clone();
        let program_id = program.id.clone();
        let Some(membership) = self
            .with_db(move |db| db.get_customer_loyalty(&customer, &program_id))
            .await?
        else {
            return Ok(None);
        };

        let points = points_for_purchase(
            appointment.total_amount,
            program.points_per_dollar,
            program.points_per_visit,
        );
        if points <= 0 {
            return Ok(None);
        }

        let movement = NewLoyaltyTransaction {
            customer_loyalty_id: membership.id,
            appointment_id: Some(appointment.id.clone()),
            transaction_type: TransactionType::Earned,
            points_amount: points,
            description: format!("Points earned for appointment {}", appointment.confirmation_code),
            reference_id: Some(appointment.id.clone()),
            reference_type: Some("appointment".to_string()),
        };
        self.record_movement(movement, &program, created_by).await.map(Some)
    }

    /// Create a program for a salon
    pub async fn create_program(&self, ctx: &UserContext, program: NewLoyaltyProgram) -> ActionResponse<LoyaltyProgram> {
        self.run("create_program", async {
            ctx.require_salon_owner(&program.salon_id)?;
            InputValidator::validate_program(&program)?;
            let now = self.now_utc();
            let created = self.with_db(move |db| db.create_program(&program, now)).await?;
            self.revalidate(&program_paths(None, None), &program_tags(&created));
            Ok(created)
        })
        .await
    }

    /// Apply a partial update to a program
    pub async fn update_program(
        &self,
        ctx: &UserContext,
        program_id: &str,
        update: LoyaltyProgramUpdate,
    ) -> ActionResponse<LoyaltyProgram> {
        self.run("update_program", async {
            let current = self.load_program(program_id).await?;
            ctx.require_salon_owner(&current.salon_id)?;

            let mut fields = FieldCollector::default();
            if let Some(name) = &update.name {
                fields.check("name", InputValidator::validate_name(name));
            }
            if update.points_per_dollar.is_some_and(|p| !p.is_finite() || p < 0.0) {
                fields.push("points_per_dollar", "Points per dollar cannot be negative");
            }
            if update.points_per_visit.is_some_and(|p| p < 0) {
                fields.push("points_per_visit", "Points per visit cannot be negative");
            }
            fields.finish()?;

            let id = program_id.to_string();
            let now = self.now_utc();
            let updated = self
                .with_db(move |db| db.update_program(&id, &update, now))
                .await?;
            self.revalidate(&program_paths(None, None), &program_tags(&updated));
            Ok(updated)
        })
        .await
    }

    /// Delete a program with its tiers and memberships
    pub async fn delete_program(&self, ctx: &UserContext, program_id: &str) -> ActionResponse<bool> {
        self.run("delete_program", async {
            let current = self.load_program(program_id).await?;
            ctx.require_salon_owner(&current.salon_id)?;
            let id = program_id.to_string();
            let deleted = self.with_db(move |db| db.delete_program(&id)).await?;
            self.revalidate(&program_paths(None, None), &program_tags(&current));
            info!(program_id, deleted, "Loyalty program deleted");
            Ok(deleted)
        })
        .await
    }

    /// Newest program of a salon, active ones first
    pub async fn get_program(&self, salon_id: &str) -> ActionResponse<Option<LoyaltyProgram>> {
        self.run("get_program", async {
            let salon = salon_id.to_string();
            self.cached(
                cache_key("/dashboard/loyalty", Some(&format!("salon={salon_id}"))),
                vec![format!("loyalty-{salon_id}"), "loyalty-programs".to_string()],
                self.with_db(move |db| db.get_salon_program(&salon)),
            )
            .await
        })
        .await
    }

    /// Enroll a customer; the customer themselves or salon staff
    pub async fn enroll_customer(
        &self,
        ctx: &UserContext,
        customer_id: &str,
        program_id: &str,
    ) -> ActionResponse<CustomerLoyalty> {
        self.run("enroll_customer", async {
            let program = self.load_program(program_id).await?;
            ctx.require_customer_or_member(customer_id, &program.salon_id)?;
            if !program.is_active {
                return Err(SalonError::invalid("program_id", "Loyalty program is not active"));
            }

            let customer = customer_id.to_string();
            let program_key = program_id.to_string();
            let now = self.now_utc();
            let membership = self
                .with_db(move |db| db.enroll_customer(&customer, &program_key, now))
                .await?;
            self.revalidate(
                &program_paths(Some(customer_id), None),
                &membership_tags(&program, &membership),
            );
            Ok(membership)
        })
        .await
    }

    /// Remove a customer from a program
    pub async fn unenroll_customer(&self, ctx: &UserContext, customer_id: &str, program_id: &str) -> ActionResponse<bool> {
        self.run("unenroll_customer", async {
            let program = self.load_program(program_id).await?;
            ctx.require_customer_or_member(customer_id, &program.salon_id)?;
            let customer = customer_id.to_string();
            let program_key = program_id.to_string();
            let removed = self
                .with_db(move |db| db.unenroll_customer(&customer, &program_key))
                .await?;
            let mut tags = program_tags(&program);
            tags.push(format!("loyalty-customer-{customer_id}"));
            self.revalidate(&program_paths(Some(customer_id), None), &tags);
            Ok(removed)
        })
        .await
    }

    /// A customer's membership in a program
    pub async fn get_customer_loyalty(
        &self,
        ctx: &UserContext,
        customer_id: &str,
        program_id: &str,
    ) -> ActionResponse<Option<CustomerLoyalty>> {
        self.run("get_customer_loyalty", async {
            let program = self.load_program(program_id).await?;
            ctx.require_customer_or_member(customer_id, &program.salon_id)?;
            let customer = customer_id.to_string();
            let program_key = program_id.to_string();
            self.with_db(move |db| db.get_customer_loyalty(&customer, &program_key))
                .await
        })
        .await
    }

    /// Every membership of a program
    pub async fn get_program_members(&self, ctx: &UserContext, program_id: &str) -> ActionResponse<Vec<CustomerLoyalty>> {
        self.run("get_program_members", async {
            let program = self.load_program(program_id).await?;
            ctx.require_salon_member(&program.salon_id)?;
            let id = program_id.to_string();
            self.with_db(move |db| db.get_program_members(&id)).await
        })
        .await
    }

    /// Record any ledger movement
    pub async fn add_transaction(
        &self,
        ctx: &UserContext,
        movement: NewLoyaltyTransaction,
    ) -> ActionResponse<LoyaltyTransaction> {
        self.run("add_transaction", async {
            let (_, program) = self.load_membership(&movement.customer_loyalty_id).await?;
            ctx.require_salon_member(&program.salon_id)?;
            self.record_movement(movement, &program, Some(ctx.user_id.as_str()))
                .await
                .map(|(transaction, _)| transaction)
        })
        .await
    }

    /// Add points to a membership
    pub async fn earn_points(
        &self,
        ctx: &UserContext,
        membership_id: &str,
        points: i64,
        description: &str,
        appointment_id: Option<String>,
    ) -> ActionResponse<LoyaltyTransaction> {
        let movement = NewLoyaltyTransaction {
            customer_loyalty_id: membership_id.to_string(),
            reference_id: appointment_id.clone(),
            reference_type: appointment_id.as_ref().map(|_| "appointment".to_string()),
            appointment_id,
            transaction_type: TransactionType::Earned,
            points_amount: points,
            description: description.to_string(),
        };
        self.add_transaction(ctx, movement).await
    }

    /// Spend points; fails when the balance does not cover them
    pub async fn redeem_points(
        &self,
        ctx: &UserContext,
        membership_id: &str,
        points: i64,
        description: &str,
    ) -> ActionResponse<LoyaltyTransaction> {
        let movement = NewLoyaltyTransaction {
            customer_loyalty_id: membership_id.to_string(),
            appointment_id: None,
            transaction_type: TransactionType::Redeemed,
            points_amount: points,
            description: description.to_string(),
            reference_id: None,
            reference_type: None,
        };
        self.add_transaction(ctx, movement).await
    }

    /// Signed manual correction
    pub async fn adjust_points(
        &self,
        ctx: &UserContext,
        membership_id: &str,
        points: i64,
        reason: &str,
    ) -> ActionResponse<LoyaltyTransaction> {
        let movement = NewLoyaltyTransaction {
            customer_loyalty_id: membership_id.to_string(),
            appointment_id: None,
            transaction_type: TransactionType::Adjusted,
            points_amount: points,
            description: reason.to_string(),
            reference_id: None,
            reference_type: Some("manual_adjustment".to_string()),
        };
        self.add_transaction(ctx, movement).await
    }

    /// Award points for a completed appointment; data is `None` when nothing
    /// was earned
    pub async fn award_points_for_appointment(
        &self,
        ctx: &UserContext,
        appointment_id: &str,
    ) -> ActionResponse<Option<LoyaltyTransaction>> {
        self.run("award_points_for_appointment", async {
            let appointment = self.load_appointment(appointment_id).await?;
            ctx.require_salon_member(&appointment.salon_id)?;
            Ok(self
                .award_points_inner(&appointment, Some(ctx.user_id.as_str()))
                .await?
                .map(|(transaction, _)| transaction))
        })
        .await
    }

    /// Points a purchase would earn at a salon. Salons without an active
    /// program use the configured default rate and no visit bonus.
    pub async fn calculate_points_for_purchase(&self, salon_id: &str, amount: f64) -> ActionResponse<i64> {
        self.run("calculate_points_for_purchase", async {
            let mut fields = FieldCollector::default();
            fields.check("amount", InputValidator::validate_price(amount));
            fields.finish()?;

            let salon = salon_id.to_string();
            let program = self.with_db(move |db| db.get_salon_program(&salon)).await?;
            Ok(match program.filter(|p| p.is_active) {
                Some(program) => {
                    points_for_purchase(amount, program.points_per_dollar, program.points_per_visit)
                }
                None => points_for_purchase(amount, self.config.loyalty.default_points_per_dollar, 0),
            })
        })
        .await
    }

    /// Ledger of a membership, newest first
    pub async fn get_customer_transactions(
        &self,
        ctx: &UserContext,
        membership_id: &str,
        limit: Option<u32>,
    ) -> ActionResponse<Vec<LoyaltyTransaction>> {
        self.run("get_customer_transactions", async {
            let (membership, program) = self.load_membership(membership_id).await?;
            ctx.require_customer_or_member(&membership.customer_id, &program.salon_id)?;
            let id = membership_id.to_string();
            let limit = limit.unwrap_or(DEFAULT_TRANSACTION_LIMIT).clamp(1, 500);
            self.with_db(move |db| db.get_customer_transactions(&id, limit))
                .await
        })
        .await
    }

    /// Add a tier to a program
    pub async fn create_tier(
        &self,
        ctx: &UserContext,
        program_id: &str,
        tier: NewLoyaltyTier,
    ) -> ActionResponse<LoyaltyTier> {
        self.run("create_tier", async {
            let program = self.load_program(program_id).await?;
            ctx.require_salon_owner(&program.salon_id)?;
            let mut fields = FieldCollector::default();
            check_tier(
                &mut fields,
                Some(&tier.name),
                Some(tier.min_points),
                Some(tier.discount_percentage),
            );
            fields.finish()?;

            let id = program_id.to_string();
            let now = self.now_utc();
            let created = self
                .with_db(move |db| db.create_tier(&id, &tier, now))
                .await?;
            self.revalidate(&program_paths(None, None), &program_tags(&program));
            Ok(created)
        })
        .await
    }

    /// Apply a partial update to a tier
    pub async fn update_tier(
        &self,
        ctx: &UserContext,
        tier_id: &str,
        update: LoyaltyTierUpdate,
    ) -> ActionResponse<LoyaltyTier> {
        self.run("update_tier", async {
            let id = tier_id.to_string();
            let tier = self
                .with_db(move |db| db.get_tier(&id))
                .await?
                .ok_or_else(|| SalonError::NotFound(format!("Loyalty tier {tier_id}")))?;
            let program = self.load_program(&tier.program_id).await?;
            ctx.require_salon_owner(&program.salon_id)?;
            let mut fields = FieldCollector::default();
            check_tier(
                &mut fields,
                update.name.as_deref(),
                update.min_points,
                update.discount_percentage,
            );
            fields.finish()?;

            let id = tier_id.to_string();
            let updated = self.with_db(move |db| db.update_tier(&id, &update)).await?;
            self.revalidate(&program_paths(None, None), &program_tags(&program));
            Ok(updated)
        })
        .await
    }

    /// Remove a tier
    pub async fn delete_tier(&self, ctx: &UserContext, tier_id: &str) -> ActionResponse<bool> {
        self.run("delete_tier", async {
            let id = tier_id.to_string();
            let tier = self
                .with_db(move |db| db.get_tier(&id))
                .await?
                .ok_or_else(|| SalonError::NotFound(format!("Loyalty tier {tier_id}")))?;
            let program = self.load_program(&tier.program_id).await?;
            ctx.require_salon_owner(&program.salon_id)?;
            let id = tier_id.to_string();
            let deleted = self.with_db(move |db| db.delete_tier(&id)).await?;
            self.revalidate(&program_paths(None, None), &program_tags(&program));
            Ok(deleted)
        })
        .await
    }

    /// Tiers of a program, lowest threshold first
    pub async fn get_tiers(&self, program_id: &str) -> ActionResponse<Vec<LoyaltyTier>> {
        self.run("get_tiers", async {
            let id = program_id.to_string();
            self.cached(
                cache_key("/dashboard/loyalty/tiers", Some(&format!("program={program_id}"))),
                vec![format!("loyalty-program-{program_id}")],
                self.with_db(move |db| db.get_tiers(&id)),
            )
            .await
        })
        .await
    }

    /// Membership and points totals of a salon
    pub async fn get_statistics(&self, ctx: &UserContext, salon_id: &str) -> ActionResponse<LoyaltyStatistics> {
        self.run("get_statistics", async {
            ctx.require_salon_member(salon_id)?;
            let salon = salon_id.to_string();
            self.cached(
                cache_key("/admin/loyalty", Some(&format!("salon={salon_id}"))),
                vec![format!("loyalty-{salon_id}")],
                self.with_db(move |db| db.get_loyalty_statistics(&salon)),
            )
            .await
        })
        .await
    }
}
