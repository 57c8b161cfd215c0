//! Reservation lifecycle manager.
//!
//! Drives a booking from creation to a terminal state: creation with the
//! court conflict rule, payment confirmation and refunds (which move money
//! through the ledger), staff check-in/out, price overrides and the
//! periodic timeout sweep that reclaims abandoned unpaid holds.

use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::ledger::{
    Direction, IdempotencyKey, LedgerMetadata, NewLedgerEntry, SettlementStatus, SourceType,
};
use crate::outbox::OutboxPayload;
use crate::reservation::{NewReservation, Reservation, ReservationStatus};
use crate::store::{BookingStore, ReservationSettlement, SettlementReceipt};
use crate::types::{CurrencyCode, Money, PaymentMethod, ReservationId};
use crate::wallet::{NewWalletEntry, WalletDirection, WalletReason};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Tuning knobs for the lifecycle manager
#[derive(Clone, Copy, Debug)]
pub struct LifecycleConfig {
    /// Minutes an unpaid reservation may sit before the sweep reclaims it
    pub timeout_minutes: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { timeout_minutes: 15 }
    }
}

/// A normalized payment confirmation for a reservation
#[derive(Clone, Debug)]
pub struct ConfirmedPayment {
    /// Amount the gateway (or staff) confirmed
    pub amount: Money,
    /// Currency of the amount
    pub currency: CurrencyCode,
    /// How the money was collected
    pub method: PaymentMethod,
    /// Gateway transaction reference, when one exists
    pub gateway_reference: Option<String>,
    /// When the money moved
    pub paid_at: DateTime<Utc>,
}

/// A refund request for a reservation
#[derive(Clone, Debug)]
pub struct RefundRequest {
    /// Amount to return; `None` refunds the full price
    pub amount: Option<Money>,
    /// Gateway refund reference, when one exists
    pub refund_reference: Option<String>,
}

/// Result of one timeout sweep run
#[derive(Clone, Debug, Serialize)]
pub struct SweepSummary {
    /// Reservations cancelled by this run
    pub cleaned: u64,
    /// Stale PENDING reservations considered
    pub total: u64,
    /// Rows that failed and were skipped (the next run retries them)
    pub failed: u64,
    /// Timeout in force, minutes
    pub timeout_minutes: i64,
    /// When the sweep ran
    pub timestamp: DateTime<Utc>,
}

/// The reservation lifecycle state machine and its money-moving operations
pub struct ReservationLifecycle {
    bookings: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl ReservationLifecycle {
    /// Creates the lifecycle manager
    #[must_use]
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            bookings,
            clock,
            config,
        }
    }

    /// Creates a PENDING reservation.
    ///
    /// The store re-checks the court conflict rule atomically at insert; a
    /// lost race surfaces as `Conflict` exactly like a straightforward
    /// double booking.
    ///
    /// # Errors
    ///
    /// `Validation` on a bad slot, `Conflict` on an overlapping
    /// incompatible booking, `NotFound` for an unknown court.
    pub async fn create(&self, request: NewReservation) -> Result<Reservation> {
        let slot = request.slot()?;
        let now = self.clock.now();

        let reservation = Reservation {
            id: ReservationId::new(),
            user_id: request.user_id,
            court_id: request.court_id,
            activity: request.activity,
            slot,
            price: request.price,
            method: request.method,
            status: ReservationStatus::Pending,
            expires_at: now + Duration::minutes(self.config.timeout_minutes),
            paid_at: None,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        self.bookings.insert_reservation(&reservation).await?;
        tracing::info!(
            reservation_id = %reservation.id,
            court_id = %reservation.court_id,
            price = reservation.price.cents(),
            "reservation created"
        );
        Ok(reservation)
    }

    /// Records a confirmed payment: PENDING → PAID, ledger CREDIT keyed
    /// `RESERVATION:<id>` and a `PAYMENT_RECORDED` outbox event, one
    /// transaction. Paying with store credit debits the wallet in the same
    /// transaction.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the reservation is PENDING;
    /// `InsufficientCredits` when paying with credits the user lacks.
    pub async fn confirm_payment(
        &self,
        id: ReservationId,
        payment: ConfirmedPayment,
    ) -> Result<SettlementReceipt> {
        let reservation = self.bookings.reservation(id).await?;
        reservation.ensure_transition(ReservationStatus::Paid, "confirm payment")?;

        if payment.amount != reservation.price {
            tracing::warn!(
                reservation_id = %id,
                confirmed = payment.amount.cents(),
                price = reservation.price.cents(),
                "confirmed amount differs from reservation price; recording confirmed amount"
            );
        }

        let entry = NewLedgerEntry {
            source_type: SourceType::Reservation,
            source_id: *id.as_uuid(),
            direction: Direction::Credit,
            amount: payment.amount,
            currency: payment.currency,
            method: payment.method,
            status: SettlementStatus::Paid,
            paid_at: payment.paid_at,
            gateway_reference: payment.gateway_reference.clone(),
            idempotency_key: IdempotencyKey::reservation(id),
            metadata: payment
                .gateway_reference
                .map(|reference| LedgerMetadata::Gateway { reference }),
        };

        let wallet = (payment.method == PaymentMethod::Credits).then(|| NewWalletEntry {
            user_id: reservation.user_id,
            direction: WalletDirection::Debit,
            reason: WalletReason::Spend,
            credits: payment.amount,
            idempotency_key: IdempotencyKey::reservation_spend(id),
        });

        let settlement = ReservationSettlement {
            allowed_from: vec![ReservationStatus::Pending],
            to: ReservationStatus::Paid,
            paid_at: payment.paid_at,
            event: OutboxPayload::PaymentRecorded {
                source_type: SourceType::Reservation,
                source_id: *id.as_uuid(),
                amount: entry.amount,
                method: entry.method,
            },
            note: Some(format!("payment recorded via {}", entry.method)),
            entry,
            wallet,
        };

        let receipt = self.bookings.settle(id, settlement).await?;
        tracing::info!(
            reservation_id = %id,
            amount = receipt.entry.amount.cents(),
            entry_created = receipt.entry_created,
            "payment recorded"
        );
        Ok(receipt)
    }

    /// Refunds a paid reservation: PAID/IN_PROGRESS → CANCELLED, ledger
    /// DEBIT keyed `RESERVATION:<id>:REFUND[:<ref>]` and a
    /// `RESERVATION_REFUNDED` outbox event, one transaction. Credits
    /// payments are returned to the wallet in the same transaction.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless PAID or IN_PROGRESS; `Validation` when the
    /// amount exceeds the reservation price.
    pub async fn refund(
        &self,
        id: ReservationId,
        request: RefundRequest,
    ) -> Result<SettlementReceipt> {
        let reservation = self.bookings.reservation(id).await?;
        reservation.ensure_transition(ReservationStatus::Cancelled, "refund")?;

        let amount = request.amount.unwrap_or(reservation.price);
        if amount > reservation.price {
            return Err(CoreError::Validation(format!(
                "refund {amount} exceeds reservation price {}",
                reservation.price
            )));
        }

        let now = self.clock.now();
        let reference = request.refund_reference.as_deref();

        let entry = NewLedgerEntry {
            source_type: SourceType::Reservation,
            source_id: *id.as_uuid(),
            direction: Direction::Debit,
            amount,
            currency: CurrencyCode::Eur,
            method: reservation.method,
            status: SettlementStatus::Refunded,
            paid_at: now,
            gateway_reference: request.refund_reference.clone(),
            idempotency_key: IdempotencyKey::reservation_refund(id, reference),
            metadata: None,
        };

        let wallet = (reservation.method == PaymentMethod::Credits).then(|| NewWalletEntry {
            user_id: reservation.user_id,
            direction: WalletDirection::Credit,
            reason: WalletReason::Refund,
            credits: amount,
            idempotency_key: IdempotencyKey::reservation_refund_credits(id, reference),
        });

        let settlement = ReservationSettlement {
            allowed_from: vec![ReservationStatus::Paid, ReservationStatus::InProgress],
            to: ReservationStatus::Cancelled,
            paid_at: now,
            event: OutboxPayload::ReservationRefunded {
                reservation_id: id,
                user_id: reservation.user_id,
                amount,
                refund_reference: request.refund_reference.clone(),
            },
            note: Some(format!("refunded {amount}")),
            entry,
            wallet,
        };

        let receipt = self.bookings.settle(id, settlement).await?;
        tracing::info!(
            reservation_id = %id,
            amount = receipt.entry.amount.cents(),
            "reservation refunded"
        );
        Ok(receipt)
    }

    /// Cancels an unpaid reservation. No money moves.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless PENDING.
    pub async fn cancel_unpaid(&self, id: ReservationId) -> Result<Reservation> {
        let reservation = self.bookings.reservation(id).await?;
        if reservation.status != ReservationStatus::Pending {
            return Err(CoreError::invalid_state(
                format!("reservation {id}"),
                reservation.status.as_str(),
                "cancel without refund",
            ));
        }
        self.bookings
            .transition(
                id,
                ReservationStatus::Pending,
                ReservationStatus::Cancelled,
                self.clock.now(),
                Some("cancelled before payment".to_string()),
                None,
            )
            .await
    }

    /// Staff check-in: PAID → IN_PROGRESS.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless PAID.
    pub async fn check_in(&self, id: ReservationId) -> Result<Reservation> {
        let reservation = self.bookings.reservation(id).await?;
        reservation.ensure_transition(ReservationStatus::InProgress, "check in")?;
        self.bookings
            .transition(
                id,
                ReservationStatus::Paid,
                ReservationStatus::InProgress,
                self.clock.now(),
                None,
                None,
            )
            .await
    }

    /// Staff check-out: IN_PROGRESS → COMPLETED.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless IN_PROGRESS.
    pub async fn complete(&self, id: ReservationId) -> Result<Reservation> {
        let reservation = self.bookings.reservation(id).await?;
        reservation.ensure_transition(ReservationStatus::Completed, "complete")?;
        self.bookings
            .transition(
                id,
                ReservationStatus::InProgress,
                ReservationStatus::Completed,
                self.clock.now(),
                None,
                None,
            )
            .await
    }

    /// Marks a paid reservation as a no-show: PAID → NO_SHOW.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless PAID.
    pub async fn mark_no_show(&self, id: ReservationId) -> Result<Reservation> {
        let reservation = self.bookings.reservation(id).await?;
        reservation.ensure_transition(ReservationStatus::NoShow, "mark no-show")?;
        self.bookings
            .transition(
                id,
                ReservationStatus::Paid,
                ReservationStatus::NoShow,
                self.clock.now(),
                Some("marked no-show".to_string()),
                None,
            )
            .await
    }

    /// Staff price override on an unpaid reservation, recorded as a
    /// `PRICE_OVERRIDE` outbox event in the same transaction.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless PENDING.
    pub async fn override_price(
        &self,
        id: ReservationId,
        new_price: Money,
        note: String,
    ) -> Result<Reservation> {
        let reservation = self.bookings.reservation(id).await?;
        if reservation.status != ReservationStatus::Pending {
            return Err(CoreError::invalid_state(
                format!("reservation {id}"),
                reservation.status.as_str(),
                "override price",
            ));
        }

        let event = OutboxPayload::PriceOverride {
            reservation_id: id,
            court_id: reservation.court_id,
            old_price: reservation.price,
            new_price,
            note: note.clone(),
        };
        self.bookings
            .override_price(id, new_price, self.clock.now(), note, event)
            .await
    }

    /// The timeout sweep: reclassifies stale PENDING reservations as
    /// CANCELLED, one transaction per row. A failure on one row is logged
    /// and skipped; the next scheduled run re-evaluates whatever is still
    /// PENDING, which makes the sweep self-healing and safe to overlap
    /// with itself.
    ///
    /// # Errors
    ///
    /// `Storage` only when the candidate query itself fails; per-row
    /// failures are absorbed into the summary.
    pub async fn expire_stale(&self) -> Result<SweepSummary> {
        let now = self.clock.now();
        let cutoff = now - Duration::minutes(self.config.timeout_minutes);
        let stale = self.bookings.stale_pending(cutoff).await?;

        let total = stale.len() as u64;
        let mut cleaned = 0u64;
        let mut failed = 0u64;

        for reservation in stale {
            let elapsed = (now - reservation.created_at).num_minutes();
            let note = format!("auto-cancelled after {elapsed} minutes unpaid");
            let event = OutboxPayload::ReservationAutoCancelled {
                reservation_id: reservation.id,
                user_id: reservation.user_id,
                elapsed_minutes: elapsed,
            };

            match self
                .bookings
                .auto_cancel(reservation.id, now, note, event)
                .await
            {
                Ok(true) => cleaned += 1,
                // Another writer (a paying user, an overlapping sweep) got
                // there first; nothing to do.
                Ok(false) => {}
                Err(error) => {
                    failed += 1;
                    tracing::error!(
                        reservation_id = %reservation.id,
                        %error,
                        "timeout sweep failed on reservation, skipping"
                    );
                }
            }
        }

        metrics::counter!("reservations_auto_cancelled").increment(cleaned);
        tracing::info!(cleaned, total, failed, "timeout sweep finished");

        Ok(SweepSummary {
            cleaned,
            total,
            failed,
            timeout_minutes: self.config.timeout_minutes,
            timestamp: now,
        })
    }
}
