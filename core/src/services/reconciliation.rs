//! Reconciliation job: re-derives expected ledger entries from the
//! authoritative tables and backfills whatever is missing.
//!
//! This is the defense against a lost webhook, a process that crashed
//! between confirmation and commit, or a race between the timeout sweep and
//! a late gateway confirmation. Backfilled rows carry `RECON:` idempotency
//! keys, so re-running over the same window never double-posts; the job
//! makes partial progress per row and is safe to trigger at any time.

use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::ledger::{
    Direction, IdempotencyKey, LedgerMetadata, NewLedgerEntry, SettlementStatus, SourceType,
};
use crate::outbox::{EventKind, OutboxPayload};
use crate::store::{BookingStore, Ledger, OrderStore, OutboxStore};
use crate::types::{CurrencyCode, Money, PaymentMethod};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Window configuration for the job
#[derive(Clone, Copy, Debug)]
pub struct ReconciliationConfig {
    /// Look-back window when the trigger does not pass one, days
    pub default_days: u32,
    /// Hard cap on the look-back window, days
    pub max_days: u32,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            default_days: 2,
            max_days: 30,
        }
    }
}

/// Per-category tally
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct CategoryTally {
    /// Entries backfilled by this run
    pub created: u64,
    /// Source rows whose entry was already posted
    pub skipped: u64,
    /// Source rows that failed and were left for the next run
    pub failed: u64,
    /// Source rows considered
    pub total: u64,
}

/// Summary returned by one reconciliation run
#[derive(Clone, Debug, Serialize)]
pub struct ReconciliationSummary {
    /// Reservations marked paid
    pub reservations: CategoryTally,
    /// Orders marked paid
    pub orders: CategoryTally,
    /// Refund events from the outbox
    pub refunds: CategoryTally,
    /// Look-back window used, days
    pub days: u32,
    /// When the run happened
    pub timestamp: DateTime<Utc>,
}

impl ReconciliationSummary {
    /// Total entries backfilled across categories
    #[must_use]
    pub const fn created(&self) -> u64 {
        self.reservations.created + self.orders.created + self.refunds.created
    }
}

/// The periodic, idempotent reconciliation sweep
pub struct Reconciliation {
    bookings: Arc<dyn BookingStore>,
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn Ledger>,
    outbox: Arc<dyn OutboxStore>,
    clock: Arc<dyn Clock>,
    config: ReconciliationConfig,
}

impl Reconciliation {
    /// Creates the job
    #[must_use]
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn Ledger>,
        outbox: Arc<dyn OutboxStore>,
        clock: Arc<dyn Clock>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            bookings,
            orders,
            ledger,
            outbox,
            clock,
            config,
        }
    }

    /// Runs one sweep over the look-back window.
    ///
    /// # Errors
    ///
    /// `Storage` only when a category's source query fails outright;
    /// per-row failures are absorbed into the summary.
    pub async fn run(&self, days: Option<u32>) -> Result<ReconciliationSummary> {
        let days = days
            .unwrap_or(self.config.default_days)
            .clamp(1, self.config.max_days);
        let now = self.clock.now();
        let from = now - Duration::days(i64::from(days));

        let reservations = self.reconcile_reservations(from, now).await?;
        let orders = self.reconcile_orders(from, now).await?;
        let refunds = self.reconcile_refunds(from, now).await?;

        let summary = ReconciliationSummary {
            reservations,
            orders,
            refunds,
            days,
            timestamp: now,
        };
        metrics::counter!("reconciliation_entries_created").increment(summary.created());
        tracing::info!(
            days,
            reservations_created = reservations.created,
            orders_created = orders.created,
            refunds_created = refunds.created,
            "reconciliation finished"
        );
        Ok(summary)
    }

    async fn reconcile_reservations(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CategoryTally> {
        let paid = self.bookings.paid_between(from, to).await?;
        let mut tally = CategoryTally {
            total: paid.len() as u64,
            ..CategoryTally::default()
        };

        for reservation in paid {
            let source_id = *reservation.id.as_uuid();
            let result = self
                .backfill(
                    SourceType::Reservation,
                    source_id,
                    Direction::Credit,
                    "RESERVATION",
                    None,
                    reservation.price,
                    reservation.method,
                    SettlementStatus::Paid,
                    reservation.paid_at.unwrap_or(reservation.updated_at),
                    to,
                )
                .await;
            Self::tally_row(&mut tally, result, "reservation", source_id);
        }
        Ok(tally)
    }

    async fn reconcile_orders(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CategoryTally> {
        let paid = self.orders.paid_between(from, to).await?;
        let mut tally = CategoryTally {
            total: paid.len() as u64,
            ..CategoryTally::default()
        };

        for order in paid {
            let source_id = *order.id.as_uuid();
            let result = self
                .backfill(
                    SourceType::Order,
                    source_id,
                    Direction::Credit,
                    "ORDER",
                    None,
                    order.total,
                    order.method,
                    SettlementStatus::Paid,
                    order.paid_at.unwrap_or(order.updated_at),
                    to,
                )
                .await;
            Self::tally_row(&mut tally, result, "order", source_id);
        }
        Ok(tally)
    }

    async fn reconcile_refunds(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CategoryTally> {
        let mut events = self
            .outbox
            .of_kind_between(EventKind::ReservationRefunded, from, to)
            .await?;
        events.extend(
            self.outbox
                .of_kind_between(EventKind::OrderRefunded, from, to)
                .await?,
        );

        let mut tally = CategoryTally {
            total: events.len() as u64,
            ..CategoryTally::default()
        };

        for event in events {
            let (source_type, source_id, amount, reference) = match &event.payload {
                OutboxPayload::ReservationRefunded {
                    reservation_id,
                    amount,
                    refund_reference,
                    ..
                } => (
                    SourceType::Reservation,
                    *reservation_id.as_uuid(),
                    *amount,
                    refund_reference.clone(),
                ),
                OutboxPayload::OrderRefunded {
                    order_id,
                    amount,
                    refund_reference,
                    ..
                } => (
                    SourceType::Order,
                    *order_id.as_uuid(),
                    *amount,
                    refund_reference.clone(),
                ),
                // of_kind_between only returns refund kinds.
                _ => continue,
            };

            let result = match self.refund_method(source_type, source_id).await {
                Ok(method) => {
                    self.backfill(
                        source_type,
                        source_id,
                        Direction::Debit,
                        "REFUND",
                        reference.as_deref(),
                        amount,
                        method,
                        SettlementStatus::Refunded,
                        event.created_at,
                        to,
                    )
                    .await
                }
                Err(error) => Err(error),
            };
            Self::tally_row(&mut tally, result, "refund", source_id);
        }
        Ok(tally)
    }

    /// Collection method of the original payment a refund reverses.
    async fn refund_method(
        &self,
        source_type: SourceType,
        source_id: Uuid,
    ) -> Result<PaymentMethod> {
        if let Some(credit) = self
            .ledger
            .find_by_source(source_type, source_id, Direction::Credit)
            .await?
        {
            return Ok(credit.method);
        }
        match source_type {
            SourceType::Reservation => Ok(self
                .bookings
                .reservation(source_id.into())
                .await?
                .method),
            SourceType::Order => Ok(self.orders.order(source_id.into()).await?.method),
            SourceType::Topup | SourceType::Membership => Err(CoreError::Validation(format!(
                "refund events are not produced for {source_type} sources"
            ))),
        }
    }

    /// Checks for an existing posting and inserts the backfill entry when
    /// it is missing. Returns whether a row was created.
    #[allow(clippy::too_many_arguments)]
    async fn backfill(
        &self,
        source_type: SourceType,
        source_id: Uuid,
        direction: Direction,
        kind: &str,
        reference: Option<&str>,
        amount: Money,
        method: PaymentMethod,
        status: SettlementStatus,
        paid_at: DateTime<Utc>,
        run_at: DateTime<Utc>,
    ) -> Result<bool> {
        if self
            .ledger
            .find_by_source(source_type, source_id, direction)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let entry = NewLedgerEntry {
            source_type,
            source_id,
            direction,
            amount,
            currency: CurrencyCode::Eur,
            method,
            status,
            paid_at,
            gateway_reference: reference.map(str::to_string),
            idempotency_key: IdempotencyKey::reconciliation(kind, source_id, reference),
            metadata: Some(LedgerMetadata::Reconciled {
                category: kind.to_string(),
                run_at,
            }),
        };

        // `record` is idempotent, so racing a concurrent run (or a very
        // late webhook) degrades to created = false.
        let recorded = self.ledger.record(entry).await?;
        if recorded.created {
            tracing::warn!(
                %source_type,
                %source_id,
                %direction,
                amount = amount.cents(),
                "reconciliation backfilled a missing ledger entry"
            );
        }
        Ok(recorded.created)
    }

    fn tally_row(tally: &mut CategoryTally, result: Result<bool>, category: &str, id: Uuid) {
        match result {
            Ok(true) => tally.created += 1,
            Ok(false) => tally.skipped += 1,
            Err(error) => {
                tally.failed += 1;
                tracing::error!(category, source_id = %id, %error, "reconciliation row failed, skipping");
            }
        }
    }
}
