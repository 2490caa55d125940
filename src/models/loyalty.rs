use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::text_enum;

/// Salon loyalty program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoyaltyProgram {
    /// Primary key
    pub id: String,
    /// Owning salon
    pub salon_id: String,
    /// Display name
    pub name: String,
    /// Description shown to customers
    pub description: Option<String>,
    /// Points earned per currency unit spent
    pub points_per_dollar: f64,
    /// Flat points per completed visit
    pub points_per_visit: i64,
    /// Only active programs earn points
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLoyaltyProgram {
    /// Owning salon
    pub salon_id: String,
    /// Display name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Points per currency unit
    pub points_per_dollar: f64,
    /// Points per visit
    #[serde(default)]
    pub points_per_visit: i64,
    /// Active flag
    #[serde(default = "default_true")]
    pub is_active: bool,
}

const fn default_true() -> bool {
    true
}

/// Partial program update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoyaltyProgramUpdate {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New earn rate
    pub points_per_dollar: Option<f64>,
    /// New visit bonus
    pub points_per_visit: Option<i64>,
    /// New active flag
    pub is_active: Option<bool>,
}

/// A customer's membership in a program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerLoyalty {
    /// Primary key
    pub id: String,
    /// Customer profile id
    pub customer_id: String,
    /// Program
    pub program_id: String,
    /// Spendable points
    pub points_balance: i64,
    /// Every point ever earned
    pub lifetime_points: i64,
    /// Visits that earned points
    pub visits_count: i64,
    /// Current tier name
    pub tier_level: Option<String>,
    /// When the current tier was reached
    pub tier_achieved_at: Option<DateTime<Utc>>,
    /// Enrollment timestamp
    pub enrolled_at: DateTime<Utc>,
    /// Last ledger activity
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Kind of ledger movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Points added by a purchase or visit
    Earned,
    /// Points spent
    Redeemed,
    /// Points that lapsed
    Expired,
    /// Manual correction, signed
    Adjusted,
}

text_enum!(TransactionType {
    Earned => "earned",
    Redeemed => "redeemed",
    Expired => "expired",
    Adjusted => "adjusted",
});

/// Immutable ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyTransaction {
    /// Primary key
    pub id: String,
    /// Membership the points belong to
    pub customer_loyalty_id: String,
    /// Appointment that triggered the movement
    pub appointment_id: Option<String>,
    /// Movement kind
    pub transaction_type: TransactionType,
    /// Points moved; signed for adjustments
    pub points_amount: i64,
    /// Balance snapshot after this row
    pub balance_after: i64,
    /// Human readable reason
    pub description: String,
    /// External reference id
    pub reference_id: Option<String>,
    /// External reference kind
    pub reference_type: Option<String>,
    /// Who recorded it
    pub created_by: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Data for recording a ledger movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLoyaltyTransaction {
    /// Membership
    pub customer_loyalty_id: String,
    /// Triggering appointment
    pub appointment_id: Option<String>,
    /// Movement kind
    pub transaction_type: TransactionType,
    /// Points moved
    pub points_amount: i64,
    /// Reason
    pub description: String,
    /// External reference id
    pub reference_id: Option<String>,
    /// External reference kind
    pub reference_type: Option<String>,
}

/// Program tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoyaltyTier {
    /// Primary key
    pub id: String,
    /// Program
    pub program_id: String,
    /// Display name
    pub name: String,
    /// Lifetime points needed
    pub min_points: i64,
    /// Discount granted
    pub discount_percentage: f64,
    /// Perks
    pub benefits: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Data for creating a tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLoyaltyTier {
    /// Display name
    pub name: String,
    /// Lifetime points needed
    pub min_points: i64,
    /// Discount granted
    #[serde(default)]
    pub discount_percentage: f64,
    /// Perks
    #[serde(default)]
    pub benefits: Vec<String>,
}

/// Partial tier update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoyaltyTierUpdate {
    /// New name
    pub name: Option<String>,
    /// New threshold
    pub min_points: Option<i64>,
    /// New discount
    pub discount_percentage: Option<f64>,
    /// New perks
    pub benefits: Option<Vec<String>>,
}

/// Salon-wide loyalty numbers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyStatistics {
    /// Enrolled customers
    pub total_members: i64,
    /// Points earned across all members
    pub total_points_earned: i64,
    /// Points redeemed across all members
    pub total_points_redeemed: i64,
    /// Active programs
    pub active_programs: i64,
}
