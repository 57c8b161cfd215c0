//! Payment recorder: turns normalized gateway callbacks into ledger entries.
//!
//! The gateway adapter (out of scope) verifies its own request framing and
//! hands this service a normalized "payment confirmed" or "payment
//! refunded" signal. Callbacks are at-least-once; every path here is
//! idempotent through the ledger's unique keys, so a retried webhook
//! collapses into the already-stored row.

use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::ledger::{
    Direction, IdempotencyKey, LedgerEntry, LedgerMetadata, NewLedgerEntry, SettlementStatus,
    SourceType,
};
use crate::outbox::OutboxPayload;
use crate::services::lifecycle::{ConfirmedPayment, RefundRequest, ReservationLifecycle};
use crate::store::{Ledger, OrderStore, WalletStore};
use crate::types::{CurrencyCode, Money, OrderId, PaymentMethod, ReservationId, UserId};
use crate::wallet::{NewWalletEntry, WalletDirection, WalletReason};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// A normalized success callback from the gateway adapter (or a staff action)
#[derive(Clone, Debug)]
pub struct PaymentConfirmed {
    /// What the payment was for
    pub source_type: SourceType,
    /// Identifier of the source record
    pub source_id: Uuid,
    /// Confirmed amount
    pub amount: Money,
    /// Currency of the amount
    pub currency: CurrencyCode,
    /// Collection method
    pub method: PaymentMethod,
    /// Gateway transaction reference, when one exists
    pub gateway_reference: Option<String>,
    /// When the money moved
    pub paid_at: DateTime<Utc>,
}

/// A normalized refund callback from the gateway adapter
#[derive(Clone, Debug)]
pub struct PaymentRefunded {
    /// What the refund reverses
    pub source_type: SourceType,
    /// Identifier of the source record
    pub source_id: Uuid,
    /// Refunded amount
    pub amount: Money,
    /// Gateway refund reference, when one exists
    pub refund_reference: Option<String>,
}

/// What a callback ended up recording
#[derive(Clone, Debug)]
pub struct RecordedPayment {
    /// What the payment was for
    pub source_type: SourceType,
    /// Identifier of the source record
    pub source_id: Uuid,
    /// The ledger entry (freshly inserted or pre-existing)
    pub entry: LedgerEntry,
    /// True when this callback inserted the row
    pub created: bool,
}

/// Dispatches normalized payment callbacks to the owning component
pub struct PaymentRecorder {
    lifecycle: Arc<ReservationLifecycle>,
    orders: Arc<dyn OrderStore>,
    wallet: Arc<dyn WalletStore>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
}

impl PaymentRecorder {
    /// Creates the recorder
    #[must_use]
    pub fn new(
        lifecycle: Arc<ReservationLifecycle>,
        orders: Arc<dyn OrderStore>,
        wallet: Arc<dyn WalletStore>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lifecycle,
            orders,
            wallet,
            ledger,
            clock,
        }
    }

    /// Records a confirmed payment against its source record.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the source record cannot accept a payment,
    /// `Validation` for malformed callbacks, `NotFound` for unknown
    /// sources.
    pub async fn payment_confirmed(&self, callback: PaymentConfirmed) -> Result<RecordedPayment> {
        match callback.source_type {
            SourceType::Reservation => {
                let id = ReservationId::from_uuid(callback.source_id);
                let receipt = self
                    .lifecycle
                    .confirm_payment(
                        id,
                        ConfirmedPayment {
                            amount: callback.amount,
                            currency: callback.currency,
                            method: callback.method,
                            gateway_reference: callback.gateway_reference,
                            paid_at: callback.paid_at,
                        },
                    )
                    .await?;
                Ok(RecordedPayment {
                    source_type: SourceType::Reservation,
                    source_id: callback.source_id,
                    entry: receipt.entry,
                    created: receipt.entry_created,
                })
            }

            SourceType::Order => {
                let id = OrderId::from_uuid(callback.source_id);
                let order = self.orders.order(id).await?;
                order.ensure_payable()?;

                let entry = NewLedgerEntry {
                    source_type: SourceType::Order,
                    source_id: callback.source_id,
                    direction: Direction::Credit,
                    amount: callback.amount,
                    currency: callback.currency,
                    method: callback.method,
                    status: SettlementStatus::Paid,
                    paid_at: callback.paid_at,
                    gateway_reference: callback.gateway_reference.clone(),
                    idempotency_key: IdempotencyKey::order(id),
                    metadata: callback
                        .gateway_reference
                        .map(|reference| LedgerMetadata::Gateway { reference }),
                };
                let event = OutboxPayload::PaymentRecorded {
                    source_type: SourceType::Order,
                    source_id: callback.source_id,
                    amount: entry.amount,
                    method: entry.method,
                };
                let (_, recorded) = self
                    .orders
                    .settle(id, callback.paid_at, entry, event)
                    .await?;
                Ok(RecordedPayment {
                    source_type: SourceType::Order,
                    source_id: callback.source_id,
                    entry: recorded.entry,
                    created: recorded.created,
                })
            }

            SourceType::Topup => {
                // For a top-up the source id is the credited user; the
                // gateway reference is the only thing that distinguishes
                // two deliberate top-ups of the same amount, so it is
                // required for deduplication.
                let Some(reference) = callback.gateway_reference.clone() else {
                    return Err(CoreError::Validation(
                        "top-up confirmation requires a gateway reference".to_string(),
                    ));
                };
                let user = UserId::from_uuid(callback.source_id);
                let key = IdempotencyKey::topup(user, &reference);

                let wallet_entry = NewWalletEntry {
                    user_id: user,
                    direction: WalletDirection::Credit,
                    reason: WalletReason::Topup,
                    credits: callback.amount,
                    idempotency_key: key.clone(),
                };
                let ledger_entry = NewLedgerEntry {
                    source_type: SourceType::Topup,
                    source_id: callback.source_id,
                    direction: Direction::Credit,
                    amount: callback.amount,
                    currency: callback.currency,
                    method: callback.method,
                    status: SettlementStatus::Paid,
                    paid_at: callback.paid_at,
                    gateway_reference: Some(reference),
                    idempotency_key: key,
                    metadata: None,
                };
                let (_, recorded) = self
                    .wallet
                    .top_up(wallet_entry, ledger_entry, callback.paid_at)
                    .await?;
                Ok(RecordedPayment {
                    source_type: SourceType::Topup,
                    source_id: callback.source_id,
                    entry: recorded.entry,
                    created: recorded.created,
                })
            }

            SourceType::Membership => {
                let entry = NewLedgerEntry {
                    source_type: SourceType::Membership,
                    source_id: callback.source_id,
                    direction: Direction::Credit,
                    amount: callback.amount,
                    currency: callback.currency,
                    method: callback.method,
                    status: SettlementStatus::Paid,
                    paid_at: callback.paid_at,
                    gateway_reference: callback.gateway_reference.clone(),
                    idempotency_key: IdempotencyKey::membership(callback.source_id),
                    metadata: callback
                        .gateway_reference
                        .map(|reference| LedgerMetadata::Gateway { reference }),
                };
                let event = OutboxPayload::PaymentRecorded {
                    source_type: SourceType::Membership,
                    source_id: callback.source_id,
                    amount: entry.amount,
                    method: entry.method,
                };
                let recorded = self.ledger.record_with_event(entry, event).await?;
                Ok(RecordedPayment {
                    source_type: SourceType::Membership,
                    source_id: callback.source_id,
                    entry: recorded.entry,
                    created: recorded.created,
                })
            }
        }
    }

    /// Records a refund against its source record.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the source record is not refundable,
    /// `Validation` for source types that do not support refunds.
    pub async fn payment_refunded(&self, callback: PaymentRefunded) -> Result<RecordedPayment> {
        match callback.source_type {
            SourceType::Reservation => {
                let id = ReservationId::from_uuid(callback.source_id);
                let receipt = self
                    .lifecycle
                    .refund(
                        id,
                        RefundRequest {
                            amount: Some(callback.amount),
                            refund_reference: callback.refund_reference,
                        },
                    )
                    .await?;
                Ok(RecordedPayment {
                    source_type: SourceType::Reservation,
                    source_id: callback.source_id,
                    entry: receipt.entry,
                    created: receipt.entry_created,
                })
            }

            SourceType::Order => {
                let id = OrderId::from_uuid(callback.source_id);
                let order = self.orders.order(id).await?;
                order.ensure_refundable()?;
                if callback.amount > order.total {
                    return Err(CoreError::Validation(format!(
                        "refund {} exceeds order total {}",
                        callback.amount, order.total
                    )));
                }

                let now = self.clock.now();
                let entry = NewLedgerEntry {
                    source_type: SourceType::Order,
                    source_id: callback.source_id,
                    direction: Direction::Debit,
                    amount: callback.amount,
                    currency: CurrencyCode::Eur,
                    method: order.method,
                    status: SettlementStatus::Refunded,
                    paid_at: now,
                    gateway_reference: callback.refund_reference.clone(),
                    idempotency_key: IdempotencyKey::order_refund(
                        id,
                        callback.refund_reference.as_deref(),
                    ),
                    metadata: None,
                };
                let event = OutboxPayload::OrderRefunded {
                    order_id: id,
                    user_id: order.user_id,
                    amount: callback.amount,
                    refund_reference: callback.refund_reference,
                };
                let (_, recorded) = self.orders.refund(id, now, entry, event).await?;
                Ok(RecordedPayment {
                    source_type: SourceType::Order,
                    source_id: callback.source_id,
                    entry: recorded.entry,
                    created: recorded.created,
                })
            }

            SourceType::Topup | SourceType::Membership => Err(CoreError::Validation(format!(
                "refunds are not supported for {} sources",
                callback.source_type
            ))),
        }
    }
}
