use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::{rejected, Caller};
use crate::actions::{ActionResponse, Actions};
use crate::error::SalonError;
use crate::models::{
    CustomerLoyalty, LoyaltyProgram, LoyaltyProgramUpdate, LoyaltyStatistics, LoyaltyTier,
    LoyaltyTierUpdate, LoyaltyTransaction, NewLoyaltyProgram, NewLoyaltyTier,
    NewLoyaltyTransaction,
};

pub(super) fn routes() -> Router<Actions> {
    Router::new()
        .route("/api/loyalty/programs", post(create_program))
        .route(
            "/api/loyalty/programs/:id",
            patch(update_program).delete(delete_program),
        )
        .route("/api/loyalty/programs/:id/members", get(program_members))
        .route("/api/loyalty/programs/:id/enroll", post(enroll))
        .route("/api/loyalty/programs/:id/unenroll", post(unenroll))
        .route(
            "/api/loyalty/programs/:id/customers/:customer_id",
            get(customer_loyalty),
        )
        .route(
            "/api/loyalty/programs/:id/tiers",
            get(tiers).post(create_tier),
        )
        .route(
            "/api/loyalty/tiers/:id",
            patch(update_tier).delete(delete_tier),
        )
        .route("/api/loyalty/memberships/:id/earn", post(earn))
        .route("/api/loyalty/memberships/:id/redeem", post(redeem))
        .route("/api/loyalty/memberships/:id/adjust", post(adjust))
        .route("/api/loyalty/memberships/:id/transactions", get(transactions))
        .route("/api/loyalty/transactions", post(add_transaction))
        .route("/api/bookings/:id/award-points", post(award_points))
        .route("/api/salons/:salon_id/loyalty/program", get(salon_program))
        .route("/api/salons/:salon_id/loyalty/points", get(points_for_purchase))
        .route("/api/salons/:salon_id/loyalty/statistics", get(statistics))
}

#[derive(Debug, Default, Deserialize)]
struct EnrollBody {
    customer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EarnBody {
    points: i64,
    description: String,
    appointment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RedeemBody {
    points: i64,
    description: String,
}

#[derive(Debug, Deserialize)]
struct AdjustBody {
    points: i64,
    reason: String,
}

#[derive(Debug, Default, Deserialize)]
struct LimitQuery {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AmountQuery {
    amount: f64,
}

async fn create_program(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Json(program): Json<NewLoyaltyProgram>,
) -> ActionResponse<LoyaltyProgram> {
    actions.create_program(&ctx, program).await
}

async fn update_program(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(update): Json<LoyaltyProgramUpdate>,
) -> ActionResponse<LoyaltyProgram> {
    actions.update_program(&ctx, &id, update).await
}

async fn delete_program(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> ActionResponse<bool> {
    actions.delete_program(&ctx, &id).await
}

async fn salon_program(
    State(actions): State<Actions>,
    Path(salon_id): Path<String>,
) -> ActionResponse<Option<LoyaltyProgram>> {
    actions.get_program(&salon_id).await
}

async fn program_members(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> ActionResponse<Vec<CustomerLoyalty>> {
    actions.get_program_members(&ctx, &id).await
}

async fn enroll(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    body: Option<Json<EnrollBody>>,
) -> ActionResponse<CustomerLoyalty> {
    let customer_id = body
        .and_then(|Json(b)| b.customer_id)
        .unwrap_or_else(|| ctx.user_id.clone());
    actions.enroll_customer(&ctx, &customer_id, &id).await
}

async fn unenroll(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    body: Option<Json<EnrollBody>>,
) -> ActionResponse<bool> {
    let customer_id = body
        .and_then(|Json(b)| b.customer_id)
        .unwrap_or_else(|| ctx.user_id.clone());
    actions.unenroll_customer(&ctx, &customer_id, &id).await
}

async fn customer_loyalty(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path((id, customer_id)): Path<(String, String)>,
) -> ActionResponse<Option<CustomerLoyalty>> {
    actions.get_customer_loyalty(&ctx, &customer_id, &id).await
}

async fn tiers(
    State(actions): State<Actions>,
    Path(id): Path<String>,
) -> ActionResponse<Vec<LoyaltyTier>> {
    actions.get_tiers(&id).await
}

async fn create_tier(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(tier): Json<NewLoyaltyTier>,
) -> ActionResponse<LoyaltyTier> {
    actions.create_tier(&ctx, &id, tier).await
}

async fn update_tier(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(update): Json<LoyaltyTierUpdate>,
) -> ActionResponse<LoyaltyTier> {
    actions.update_tier(&ctx, &id, update).await
}

async fn delete_tier(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> ActionResponse<bool> {
    actions.delete_tier(&ctx, &id).await
}

async fn earn(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(body): Json<EarnBody>,
) -> ActionResponse<LoyaltyTransaction> {
    actions
        .earn_points(&ctx, &id, body.points, &body.description, body.appointment_id)
        .await
}

async fn redeem(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(body): Json<RedeemBody>,
) -> ActionResponse<LoyaltyTransaction> {
    actions
        .redeem_points(&ctx, &id, body.points, &body.description)
        .await
}

async fn adjust(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(body): Json<AdjustBody>,
) -> ActionResponse<LoyaltyTransaction> {
    actions
        .adjust_points(&ctx, &id, body.points, &body.reason)
        .await
}

async fn transactions(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ActionResponse<Vec<LoyaltyTransaction>> {
    actions
        .get_customer_transactions(&ctx, &id, query.limit)
        .await
}

async fn add_transaction(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Json(movement): Json<NewLoyaltyTransaction>,
) -> ActionResponse<LoyaltyTransaction> {
    actions.add_transaction(&ctx, movement).await
}

async fn award_points(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> ActionResponse<Option<LoyaltyTransaction>> {
    actions.award_points_for_appointment(&ctx, &id).await
}

async fn points_for_purchase(
    State(actions): State<Actions>,
    Path(salon_id): Path<String>,
    Query(query): Query<AmountQuery>,
) -> Result<ActionResponse<i64>, Response> {
    if !query.amount.is_finite() {
        return Err(rejected(&SalonError::invalid("amount", "Amount must be a number")));
    }
    Ok(actions
        .calculate_points_for_purchase(&salon_id, query.amount)
        .await)
}

async fn statistics(
    State(actions): State<Actions>,
    Caller(ctx): Caller,
    Path(salon_id): Path<String>,
) -> ActionResponse<LoyaltyStatistics> {
    actions.get_statistics(&ctx, &salon_id).await
}
