//! Wallet endpoints: top-up and balance/history reads.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use courtbook_core::clock::Clock;
use courtbook_core::ledger::SourceType;
use courtbook_core::services::PaymentConfirmed;
use courtbook_core::types::{CurrencyCode, Money, PaymentMethod, UserId};
use courtbook_core::wallet::{WalletDirection, WalletReason};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to top up a wallet
#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    /// Credited user
    pub user_id: UserId,
    /// Credits to add, cents
    pub amount: Money,
    /// How the money was collected
    pub method: PaymentMethod,
    /// Reference distinguishing this top-up (gateway reference or receipt
    /// number); retries with the same reference collapse into one credit
    pub reference: String,
}

/// Receipt returned after a top-up
#[derive(Debug, Serialize)]
pub struct TopUpResponse {
    /// Credited user
    pub user_id: Uuid,
    /// Credits added, cents
    pub amount: Money,
    /// True when this call recorded the top-up
    pub recorded: bool,
    /// Balance after the top-up, cents
    pub balance: Money,
}

/// One wallet movement as returned to clients
#[derive(Debug, Serialize)]
pub struct WalletEntryResponse {
    /// Movement direction
    pub direction: WalletDirection,
    /// Why the credits moved
    pub reason: WalletReason,
    /// Credits moved, cents
    pub credits: Money,
    /// Running balance after this movement, cents
    pub balance_after: Money,
    /// When the row was inserted
    pub created_at: DateTime<Utc>,
}

/// Wallet state returned to clients
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    /// Wallet owner
    pub user_id: Uuid,
    /// Cached balance, cents
    pub balance: Money,
    /// Movements, oldest first
    pub entries: Vec<WalletEntryResponse>,
}

/// `POST /api/wallet/topup`
pub async fn top_up(
    State(state): State<AppState>,
    Json(request): Json<TopUpRequest>,
) -> Result<(StatusCode, Json<TopUpResponse>), AppError> {
    if request.reference.trim().is_empty() {
        return Err(AppError::validation("a top-up reference is required"));
    }
    if request.amount.is_zero() {
        return Err(AppError::validation("top-up amount must be positive"));
    }

    let recorded = state
        .payments
        .payment_confirmed(PaymentConfirmed {
            source_type: SourceType::Topup,
            source_id: *request.user_id.as_uuid(),
            amount: request.amount,
            currency: CurrencyCode::Eur,
            method: request.method,
            gateway_reference: Some(request.reference),
            paid_at: state.clock.now(),
        })
        .await?;

    let balance = state.wallet.balance(request.user_id).await?;
    let status = if recorded.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(TopUpResponse {
            user_id: *request.user_id.as_uuid(),
            amount: recorded.entry.amount,
            recorded: recorded.created,
            balance,
        }),
    ))
}

/// `GET /api/wallet/:user_id`
pub async fn get(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<WalletResponse>, AppError> {
    let user = UserId::from_uuid(user_id);
    let balance = state.wallet.balance(user).await?;
    let entries = state.wallet.entries(user).await?;

    Ok(Json(WalletResponse {
        user_id,
        balance,
        entries: entries
            .into_iter()
            .map(|entry| WalletEntryResponse {
                direction: entry.direction,
                reason: entry.reason,
                credits: entry.credits,
                balance_after: entry.balance_after,
                created_at: entry.created_at,
            })
            .collect(),
    }))
}
