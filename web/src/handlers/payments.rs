//! Normalized payment callback endpoints.
//!
//! The gateway adapter has already verified its own signing scheme; these
//! endpoints receive the normalized payload and hand it to the payment
//! recorder. Delivery is at-least-once: a retried confirmation for an
//! already-paid source answers 409 `INVALID_STATE`, and reconciliation
//! keys make double-posting impossible either way.

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use courtbook_core::clock::Clock;
use courtbook_core::ledger::SourceType;
use courtbook_core::services::{PaymentConfirmed, PaymentRefunded};
use courtbook_core::types::{CurrencyCode, Money, PaymentMethod};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized gateway success callback
#[derive(Debug, Deserialize)]
pub struct PaymentConfirmedRequest {
    /// What the payment was for
    pub source_type: SourceType,
    /// Identifier of the source record
    pub source_id: Uuid,
    /// Confirmed amount in cents
    pub amount: Money,
    /// Currency of the amount
    #[serde(default)]
    pub currency: CurrencyCode,
    /// Collection method
    pub method: PaymentMethod,
    /// Gateway transaction reference
    pub gateway_reference: Option<String>,
    /// When the money moved (defaults to now)
    pub paid_at: Option<DateTime<Utc>>,
}

/// Normalized gateway refund callback
#[derive(Debug, Deserialize)]
pub struct PaymentRefundedRequest {
    /// What the refund reverses
    pub source_type: SourceType,
    /// Identifier of the source record
    pub source_id: Uuid,
    /// Refunded amount in cents
    pub amount: Money,
    /// Gateway refund reference
    pub refund_reference: Option<String>,
}

/// Receipt returned for either callback
#[derive(Debug, Serialize)]
pub struct PaymentReceiptResponse {
    /// What the payment was for
    pub source_type: SourceType,
    /// Identifier of the source record
    pub source_id: Uuid,
    /// Ledger entry id
    pub ledger_entry_id: Uuid,
    /// Recorded amount in cents
    pub amount: Money,
    /// True when this call inserted the ledger row
    pub recorded: bool,
}

/// `POST /api/payments/confirmed`
pub async fn confirmed(
    State(state): State<AppState>,
    Json(request): Json<PaymentConfirmedRequest>,
) -> Result<(StatusCode, Json<PaymentReceiptResponse>), AppError> {
    let recorded = state
        .payments
        .payment_confirmed(PaymentConfirmed {
            source_type: request.source_type,
            source_id: request.source_id,
            amount: request.amount,
            currency: request.currency,
            method: request.method,
            gateway_reference: request.gateway_reference,
            paid_at: request.paid_at.unwrap_or_else(|| state.clock.now()),
        })
        .await?;

    let status = if recorded.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(PaymentReceiptResponse {
            source_type: recorded.source_type,
            source_id: recorded.source_id,
            ledger_entry_id: *recorded.entry.id.as_uuid(),
            amount: recorded.entry.amount,
            recorded: recorded.created,
        }),
    ))
}

/// `POST /api/payments/refunded`
pub async fn refunded(
    State(state): State<AppState>,
    Json(request): Json<PaymentRefundedRequest>,
) -> Result<(StatusCode, Json<PaymentReceiptResponse>), AppError> {
    let recorded = state
        .payments
        .payment_refunded(PaymentRefunded {
            source_type: request.source_type,
            source_id: request.source_id,
            amount: request.amount,
            refund_reference: request.refund_reference,
        })
        .await?;

    let status = if recorded.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(PaymentReceiptResponse {
            source_type: recorded.source_type,
            source_id: recorded.source_id,
            ledger_entry_id: *recorded.entry.id.as_uuid(),
            amount: recorded.entry.amount,
            recorded: recorded.created,
        }),
    ))
}
