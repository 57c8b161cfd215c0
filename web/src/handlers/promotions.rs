//! Promotion validation and application endpoints.

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use courtbook_core::promotion::{PromotionOutcome, PromotionRejection};
use courtbook_core::types::{Money, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to validate a code against an amount
#[derive(Debug, Deserialize)]
pub struct ValidatePromotionRequest {
    /// The code to validate
    pub code: String,
    /// Transaction amount in cents
    pub amount: Money,
    /// User the code would apply to (enables per-user checks)
    pub user_id: Option<UserId>,
}

/// Request to apply a code for a user
#[derive(Debug, Deserialize)]
pub struct ApplyPromotionRequest {
    /// The code to apply
    pub code: String,
    /// Transaction amount in cents
    pub amount: Money,
    /// Benefiting user
    pub user_id: UserId,
}

/// Validation outcome returned to clients
#[derive(Debug, Serialize)]
pub struct ValidatePromotionResponse {
    /// Whether the code applies
    pub valid: bool,
    /// Rejection reason when it does not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<PromotionRejection>,
    /// The validated promotion id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_id: Option<Uuid>,
    /// Reward kind tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_kind: Option<&'static str>,
    /// Amount before the promotion, cents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_amount: Option<Money>,
    /// Amount after any discount, cents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_amount: Option<Money>,
    /// Discount taken, cents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings: Option<Money>,
    /// Wallet credits granted, cents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits_awarded: Option<Money>,
}

/// Application receipt returned to clients
#[derive(Debug, Serialize)]
pub struct ApplyPromotionResponse {
    /// The applied promotion
    pub promotion_id: Uuid,
    /// The recorded application
    pub application_id: Uuid,
    /// Amount after any discount, cents
    pub final_amount: Money,
    /// Discount taken, cents
    pub savings: Money,
    /// Wallet credits granted, cents
    pub credits_awarded: Money,
    /// When the grant happened
    pub applied_at: DateTime<Utc>,
}

/// `POST /api/promotions/validate`
pub async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidatePromotionRequest>,
) -> Result<Json<ValidatePromotionResponse>, AppError> {
    let outcome = state
        .promotions
        .validate(&request.code, request.amount, request.user_id)
        .await?;

    let response = match outcome {
        PromotionOutcome::Approved(quote) => ValidatePromotionResponse {
            valid: true,
            reason: None,
            promotion_id: Some(*quote.promotion_id.as_uuid()),
            reward_kind: Some(quote.reward_kind),
            original_amount: Some(quote.original_amount),
            final_amount: Some(quote.final_amount),
            savings: Some(quote.savings),
            credits_awarded: Some(quote.credits_awarded),
        },
        PromotionOutcome::Rejected(reason) => ValidatePromotionResponse {
            valid: false,
            reason: Some(reason),
            promotion_id: None,
            reward_kind: None,
            original_amount: None,
            final_amount: None,
            savings: None,
            credits_awarded: None,
        },
    };
    Ok(Json(response))
}

/// `POST /api/promotions/apply`
pub async fn apply(
    State(state): State<AppState>,
    Json(request): Json<ApplyPromotionRequest>,
) -> Result<Json<ApplyPromotionResponse>, AppError> {
    let applied = state
        .promotions
        .apply(&request.code, request.amount, request.user_id)
        .await?;

    Ok(Json(ApplyPromotionResponse {
        promotion_id: *applied.quote.promotion_id.as_uuid(),
        application_id: applied.application.id,
        final_amount: applied.quote.final_amount,
        savings: applied.quote.savings,
        credits_awarded: applied.quote.credits_awarded,
        applied_at: applied.application.applied_at,
    }))
}
