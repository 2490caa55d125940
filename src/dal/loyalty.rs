use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use tracing::{debug, info};

use crate::db::{collect_rows, json_column, Database};
use crate::error::{Result, SalonError};
use crate::ledger::{apply_transaction, tier_for, LedgerBalance};
use crate::models::{
    CustomerLoyalty, LoyaltyProgram, LoyaltyProgramUpdate, LoyaltyStatistics, LoyaltyTier,
    LoyaltyTierUpdate, LoyaltyTransaction, NewLoyaltyProgram, NewLoyaltyTier,
    NewLoyaltyTransaction, TransactionType,
};
use crate::schema::{customer_loyalty, loyalty_programs, loyalty_tiers, loyalty_transactions};
use crate::utils::new_id;

fn map_program(row: &Row<'_>) -> rusqlite::Result<LoyaltyProgram> {
    Ok(LoyaltyProgram {
        id: row.get("id")?,
        salon_id: row.get("salon_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        points_per_dollar: row.get("points_per_dollar")?,
        points_per_visit: row.get("points_per_visit")?,
        is_active: row.get("is_active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn map_membership(row: &Row<'_>) -> rusqlite::Result<CustomerLoyalty> {
    Ok(CustomerLoyalty {
        id: row.get("id")?,
        customer_id: row.get("customer_id")?,
        program_id: row.get("program_id")?,
        points_balance: row.get("points_balance")?,
        lifetime_points: row.get("lifetime_points")?,
        visits_count: row.get("visits_count")?,
        tier_level: row.get("tier_level")?,
        tier_achieved_at: row.get("tier_achieved_at")?,
        enrolled_at: row.get("enrolled_at")?,
        last_activity_at: row.get("last_activity_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn map_tier(row: &Row<'_>) -> rusqlite::Result<LoyaltyTier> {
    Ok(LoyaltyTier {
        id: row.get("id")?,
        program_id: row.get("program_id")?,
        name: row.get("name")?,
        min_points: row.get("min_points")?,
        discount_percentage: row.get("discount_percentage")?,
        benefits: json_column(row, "benefits")?,
        created_at: row.get("created_at")?,
    })
}

fn map_transaction(row: &Row<'_>) -> rusqlite::Result<LoyaltyTransaction> {
    Ok(LoyaltyTransaction {
        id: row.get("id")?,
        customer_loyalty_id: row.get("customer_loyalty_id")?,
        appointment_id: row.get("appointment_id")?,
        transaction_type: row.get("transaction_type")?,
        points_amount: row.get("points_amount")?,
        balance_after: row.get("balance_after")?,
        description: row.get("description")?,
        reference_id: row.get("reference_id")?,
        reference_type: row.get("reference_type")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
    })
}

fn load_program(conn: &Connection, program_id: &str) -> Result<LoyaltyProgram> {
    conn.query_row(
        &format!("SELECT {} FROM {} WHERE id = ?", loyalty_programs::COLUMNS, loyalty_programs::TABLE),
        params![program_id],
        map_program,
    )
    .optional()?
    .ok_or_else(|| SalonError::NotFound(format!("Loyalty program {program_id}")))
}

fn load_membership(conn: &Connection, membership_id: &str) -> Result<CustomerLoyalty> {
    conn.query_row(
        &format!("SELECT {} FROM {} WHERE id = ?", customer_loyalty::COLUMNS, customer_loyalty::TABLE),
        params![membership_id],
        map_membership,
    )
    .optional()?
    .ok_or_else(|| SalonError::NotFound(format!("Loyalty membership {membership_id}")))
}

fn load_tiers(conn: &Connection, program_id: &str) -> Result<Vec<LoyaltyTier>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} WHERE program_id = ? ORDER BY min_points ASC",
        loyalty_tiers::COLUMNS,
        loyalty_tiers::TABLE
    ))?;
    let rows = stmt.query_map(params![program_id], map_tier)?;
    collect_rows(rows)
}

fn load_tier(conn: &Connection, tier_id: &str) -> Result<LoyaltyTier> {
    conn.query_row(
        &format!("SELECT {} FROM {} WHERE id = ?", loyalty_tiers::COLUMNS, loyalty_tiers::TABLE),
        params![tier_id],
        map_tier,
    )
    .optional()?
    .ok_or_else(|| SalonError::NotFound(format!("Loyalty tier {tier_id}")))
}

impl Database {
    /// Create a loyalty program
    pub fn create_program(&self, new_program: &NewLoyaltyProgram, now: DateTime<Utc>) -> Result<LoyaltyProgram> {
        let program = LoyaltyProgram {
            id: new_id(),
            salon_id: new_program.salon_id.clone(),
            name: new_program.name.clone(),
            description: new_program.description.clone(),
            points_per_dollar: new_program.points_per_dollar,
            points_per_visit: new_program.points_per_visit,
            is_active: new_program.is_active,
            created_at: now,
            updated_at: now,
        };
        self.get_connection()?.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                loyalty_programs::TABLE,
                loyalty_programs::COLUMNS
            ),
            params![
                program.id,
                program.salon_id,
                program.name,
                program.description,
                program.points_per_dollar,
                program.points_per_visit,
                program.is_active,
                program.created_at,
                program.updated_at
            ],
        )?;
        info!(program_id = %program.id, salon_id = %program.salon_id, "Loyalty program created");
        Ok(program)
    }

    /// Apply a partial update to a program
    pub fn update_program(
        &self,
        program_id: &str,
        update: &LoyaltyProgramUpdate,
        now: DateTime<Utc>,
    ) -> Result<LoyaltyProgram> {
        let mut assignments = vec!["updated_at = ?"];
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(now)];
        if let Some(name) = &update.name {
            assignments.push("name = ?");
            values.push(Box::new(name.clone()));
        }
        if let Some(description) = &update.description {
            assignments.push("description = ?");
            values.push(Box::new(description.clone()));
        }
        if let Some(rate) = update.points_per_dollar {
            assignments.push("points_per_dollar = ?");
            values.push(Box::new(rate));
        }
        if let Some(per_visit) = update.points_per_visit {
            assignments.push("points_per_visit = ?");
            values.push(Box::new(per_visit));
        }
        if let Some(active) = update.is_active {
            assignments.push("is_active = ?");
            values.push(Box::new(active));
        }
        values.push(Box::new(program_id.to_string()));

        let conn = self.get_connection()?;
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET {} WHERE id = ?",
                loyalty_programs::TABLE,
                assignments.join(", ")
            ),
            params_from_iter(values.iter()),
        )?;
        if changed == 0 {
            return Err(SalonError::NotFound(format!("Loyalty program {program_id}")));
        }
        load_program(&conn, program_id)
    }

    /// Delete a program along with its tiers, memberships and ledger
    pub fn delete_program(&self, program_id: &str) -> Result<bool> {
        let changed = self.get_connection()?.execute(
            &format!("DELETE FROM {} WHERE id = ?", loyalty_programs::TABLE),
            params![program_id],
        )?;
        Ok(changed > 0)
    }

    /// Get a program by id
    pub fn get_program_by_id(&self, program_id: &str) -> Result<Option<LoyaltyProgram>> {
        let conn = self.get_connection()?;
        match load_program(&conn, program_id) {
            Ok(program) => Ok(Some(program)),
            Err(SalonError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The program of a salon: the newest active one, else the newest.
    pub fn get_salon_program(&self, salon_id: &str) -> Result<Option<LoyaltyProgram>> {
        let conn = self.get_connection()?;
        let program = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE salon_id = ? ORDER BY is_active DESC, created_at DESC LIMIT 1",
                    loyalty_programs::COLUMNS,
                    loyalty_programs::TABLE
                ),
                params![salon_id],
                map_program,
            )
            .optional()?;
        Ok(program)
    }

    /// Enroll a customer with zeroed balances
    pub fn enroll_customer(
        &self,
        customer_id: &str,
        program_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CustomerLoyalty> {
        self.with_transaction(|tx| {
            let existing: Option<String> = tx
                .query_row(
                    &format!(
                        "SELECT id FROM {} WHERE customer_id = ? AND program_id = ?",
                        customer_loyalty::TABLE
                    ),
                    params![customer_id, program_id],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Err(SalonError::AlreadyEnrolled);
            }
            load_program(tx, program_id)?;

            let membership = CustomerLoyalty {
                id: new_id(),
                customer_id: customer_id.to_string(),
                program_id: program_id.to_string(),
                points_balance: 0,
                lifetime_points: 0,
                visits_count: 0,
                tier_level: None,
                tier_achieved_at: None,
                enrolled_at: now,
                last_activity_at: None,
                updated_at: now,
            };
            tx.execute(
                &format!(
                    "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    customer_loyalty::TABLE,
                    customer_loyalty::COLUMNS
                ),
                params![
                    membership.id,
                    membership.customer_id,
                    membership.program_id,
                    membership.points_balance,
                    membership.lifetime_points,
                    membership.visits_count,
                    membership.tier_level,
                    membership.tier_achieved_at,
                    membership.enrolled_at,
                    membership.last_activity_at,
                    membership.updated_at
                ],
            )?;
            info!(customer_id, program_id, "Customer enrolled");
            Ok(membership)
        })
    }

    /// Remove a membership and its ledger
    pub fn unenroll_customer(&self, customer_id: &str, program_id: &str) -> Result<bool> {
        let changed = self.get_connection()?.execute(
            &format!(
                "DELETE FROM {} WHERE customer_id = ? AND program_id = ?",
                customer_loyalty::TABLE
            ),
            params![customer_id, program_id],
        )?;
        Ok(changed > 0)
    }

    /// Get a membership by id
    pub fn get_membership(&self, membership_id: &str) -> Result<Option<CustomerLoyalty>> {
        let conn = self.get_connection()?;
        match load_membership(&conn, membership_id) {
            Ok(membership) => Ok(Some(membership)),
            Err(SalonError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Membership of a customer in a program
    pub fn get_customer_loyalty(&self, customer_id: &str, program_id: &str) -> Result<Option<CustomerLoyalty>> {
        let conn = self.get_connection()?;
        let membership = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE customer_id = ? AND program_id = ?",
                    customer_loyalty::COLUMNS,
                    customer_loyalty::TABLE
                ),
                params![customer_id, program_id],
                map_membership,
            )
            .optional()?;
        Ok(membership)
    }

    /// Members of a program, highest lifetime points first
    pub fn get_program_members(&self, program_id: &str) -> Result<Vec<CustomerLoyalty>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE program_id = ? ORDER BY lifetime_points DESC, enrolled_at ASC",
            customer_loyalty::COLUMNS,
            customer_loyalty::TABLE
        ))?;
        let rows = stmt.query_map(params![program_id], map_membership)?;
        collect_rows(rows)
    }

    /// Append a ledger row and move the membership balance in one
    /// transaction. Returns the row and the updated membership.
    pub fn add_transaction(
        &self,
        movement: &NewLoyaltyTransaction,
        created_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(LoyaltyTransaction, CustomerLoyalty)> {
        self.with_transaction(|tx| {
            let membership = load_membership(tx, &movement.customer_loyalty_id)?;
            let before = LedgerBalance {
                points_balance: membership.points_balance,
                lifetime_points: membership.lifetime_points,
                visits_count: membership.visits_count,
            };
            let after = apply_transaction(
                before,
                movement.transaction_type,
                movement.points_amount,
                movement.appointment_id.is_some(),
            )?;

            let tiers = load_tiers(tx, &membership.program_id)?;
            let tier_level = tier_for(&tiers, after.lifetime_points).map(|t| t.name.clone());
            let tier_achieved_at = if tier_level == membership.tier_level {
                membership.tier_achieved_at
            } else {
                tier_level.as_ref().map(|_| now)
            };

            let row = LoyaltyTransaction {
                id: new_id(),
                customer_loyalty_id: membership.id.clone(),
                appointment_id: movement.appointment_id.clone(),
                transaction_type: movement.transaction_type,
                points_amount: movement.points_amount,
                balance_after: after.points_balance,
                description: movement.description.clone(),
                reference_id: movement.reference_id.clone(),
                reference_type: movement.reference_type.clone(),
                created_by: created_by.map(str::to_string),
                created_at: now,
            };
            tx.execute(
                &format!(
                    "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    loyalty_transactions::TABLE,
                    loyalty_transactions::COLUMNS
                ),
                params![
                    row.id,
                    row.customer_loyalty_id,
                    row.appointment_id,
                    row.transaction_type,
                    row.points_amount,
                    row.balance_after,
                    row.description,
                    row.reference_id,
                    row.reference_type,
                    row.created_by,
                    row.created_at
                ],
            )?;
            tx.execute(
                &format!(
                    "UPDATE {} SET points_balance = ?, lifetime_points = ?, visits_count = ?, \
                     tier_level = ?, tier_achieved_at = ?, last_activity_at = ?, updated_at = ? \
                     WHERE id = ?",
                    customer_loyalty::TABLE
                ),
                params![
                    after.points_balance,
                    after.lifetime_points,
                    after.visits_count,
                    tier_level,
                    tier_achieved_at,
                    now,
                    now,
                    membership.id
                ],
            )?;

            debug!(
                membership_id = %membership.id,
                kind = %row.transaction_type,
                points = row.points_amount,
                balance_after = row.balance_after,
                "Ledger entry written"
            );
            Ok((row, load_membership(tx, &membership.id)?))
        })
    }

    /// Ledger of a membership, newest first
    pub fn get_customer_transactions(&self, membership_id: &str, limit: u32) -> Result<Vec<LoyaltyTransaction>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE customer_loyalty_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
            loyalty_transactions::COLUMNS,
            loyalty_transactions::TABLE
        ))?;
        let rows = stmt.query_map(params![membership_id, limit], map_transaction)?;
        collect_rows(rows)
    }

    /// Add a tier to a program
    pub fn create_tier(&self, program_id: &str, new_tier: &NewLoyaltyTier, now: DateTime<Utc>) -> Result<LoyaltyTier> {
        let tier = LoyaltyTier {
            id: new_id(),
            program_id: program_id.to_string(),
            name: new_tier.name.clone(),
            min_points: new_tier.min_points,
            discount_percentage: new_tier.discount_percentage,
            benefits: new_tier.benefits.clone(),
            created_at: now,
        };
        self.get_connection()?.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                loyalty_tiers::TABLE,
                loyalty_tiers::COLUMNS
            ),
            params![
                tier.id,
                tier.program_id,
                tier.name,
                tier.min_points,
                tier.discount_percentage,
                serde_json::to_string(&tier.benefits)?,
                tier.created_at
            ],
        )?;
        Ok(tier)
    }

    /// Apply a partial update to a tier
    pub fn update_tier(&self, tier_id: &str, update: &LoyaltyTierUpdate) -> Result<LoyaltyTier> {
        let conn = self.get_connection()?;
        let mut tier = load_tier(&conn, tier_id)?;
        if let Some(name) = &update.name {
            tier.name.clone_from(name);
        }
        if let Some(min_points) = update.min_points {
            tier.min_points = min_points;
        }
        if let Some(discount) = update.discount_percentage {
            tier.discount_percentage = discount;
        }
        if let Some(benefits) = &update.benefits {
            tier.benefits.clone_from(benefits);
        }
        conn.execute(
            &format!(
                "UPDATE {} SET name = ?, min_points = ?, discount_percentage = ?, benefits = ? WHERE id = ?",
                loyalty_tiers::TABLE
            ),
            params![
                tier.name,
                tier.min_points,
                tier.discount_percentage,
                serde_json::to_string(&tier.benefits)?,
                tier.id
            ],
        )?;
        Ok(tier)
    }

    /// Delete a tier
    pub fn delete_tier(&self, tier_id: &str) -> Result<bool> {
        let changed = self.get_connection()?.execute(
            &format!("DELETE FROM {} WHERE id = ?", loyalty_tiers::TABLE),
            params![tier_id],
        )?;
        Ok(changed > 0)
    }

    /// Look up a tier
    pub fn get_tier(&self, tier_id: &str) -> Result<Option<LoyaltyTier>> {
        let conn = self.get_connection()?;
        match load_tier(&conn, tier_id) {
            Ok(tier) => Ok(Some(tier)),
            Err(SalonError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Tiers of a program, lowest threshold first
    pub fn get_tiers(&self, program_id: &str) -> Result<Vec<LoyaltyTier>> {
        let conn = self.get_connection()?;
        load_tiers(&conn, program_id)
    }

    /// Member and points totals across the programs of a salon
    pub fn get_loyalty_statistics(&self, salon_id: &str) -> Result<LoyaltyStatistics> {
        let conn = self.get_connection()?;
        let total_members: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} cl JOIN {} p ON p.id = cl.program_id WHERE p.salon_id = ?",
                customer_loyalty::TABLE,
                loyalty_programs::TABLE
            ),
            params![salon_id],
            |row| row.get(0),
        )?;
        let active_programs: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE salon_id = ? AND is_active = 1",
                loyalty_programs::TABLE
            ),
            params![salon_id],
            |row| row.get(0),
        )?;

        let points_of = |kind: TransactionType| -> Result<i64> {
            let total: i64 = conn.query_row(
                &format!(
                    "SELECT COALESCE(SUM(t.points_amount), 0) FROM {} t \
                     JOIN {} cl ON cl.id = t.customer_loyalty_id \
                     JOIN {} p ON p.id = cl.program_id \
                     WHERE p.salon_id = ? AND t.transaction_type = ?",
                    loyalty_transactions::TABLE,
                    customer_loyalty::TABLE,
                    loyalty_programs::TABLE
                ),
                params![salon_id, kind],
                |row| row.get(0),
            )?;
            Ok(total)
        };

        Ok(LoyaltyStatistics {
            total_members,
            total_points_earned: points_of(TransactionType::Earned)?,
            total_points_redeemed: points_of(TransactionType::Redeemed)?,
            active_programs,
        })
    }
}
