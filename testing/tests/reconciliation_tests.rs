//! Reconciliation behavior: backfilling lost postings, convergence on
//! re-run, and the window clamp.

#![allow(clippy::unwrap_used)]

mod common;

use chrono::Duration;
use common::Harness;
use courtbook_core::clock::Clock;
use courtbook_core::ledger::{Direction, SourceType};
use courtbook_core::order::{Order, OrderStatus};
use courtbook_core::outbox::OutboxPayload;
use courtbook_core::reservation::{Reservation, ReservationStatus};
use courtbook_core::services::{ConfirmedPayment, PaymentConfirmed};
use courtbook_core::store::{BookingStore, Ledger, OrderStore, OutboxStore};
use courtbook_core::types::{
    Activity, Court, CurrencyCode, Money, PaymentMethod, ReservationId, TimeSlot, UserId,
};

/// A reservation that was marked paid without its ledger posting: the
/// state a lost webhook or a crash between steps would leave behind if the
/// write path were not transactional, and exactly what reconciliation is
/// there to repair.
async fn seed_unposted_paid_reservation(harness: &Harness, court: &Court) -> Reservation {
    let now = harness.clock.now();
    let start = now + Duration::hours(2);
    let reservation = Reservation {
        id: ReservationId::new(),
        user_id: UserId::new(),
        court_id: court.id,
        activity: Activity::Padel,
        slot: TimeSlot::new(start, start + Duration::hours(1)).unwrap(),
        price: Money::from_euros(18),
        method: PaymentMethod::Card,
        status: ReservationStatus::Paid,
        expires_at: now + Duration::minutes(15),
        paid_at: Some(now - Duration::hours(3)),
        notes: Vec::new(),
        created_at: now - Duration::hours(4),
        updated_at: now - Duration::hours(3),
    };
    harness.store.insert_reservation(&reservation).await.unwrap();
    reservation
}

#[tokio::test]
async fn backfills_a_missing_reservation_credit_and_converges() {
    let harness = Harness::new();
    let court = harness.seed_court().await;
    let reservation = seed_unposted_paid_reservation(&harness, &court).await;

    let first = harness.reconciliation.run(None).await.unwrap();
    assert_eq!(first.reservations.created, 1);
    assert_eq!(first.reservations.total, 1);

    let entry = harness
        .store
        .find_by_source(SourceType::Reservation, *reservation.id.as_uuid(), Direction::Credit)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.amount, Money::from_euros(18));
    assert!(entry.idempotency_key.as_str().starts_with("RECON:RESERVATION:"));

    // Second run over the same window: nothing new, by construction.
    let second = harness.reconciliation.run(None).await.unwrap();
    assert_eq!(second.reservations.created, 0);
    assert_eq!(second.reservations.skipped, 1);
    assert_eq!(harness.store.ledger_len(), 1);
}

#[tokio::test]
async fn skips_reservations_that_posted_normally() {
    let harness = Harness::new();
    let court = harness.seed_court().await;
    let reservation = harness
        .lifecycle
        .create(harness.booking(&court, UserId::new(), Activity::Padel, 2, Money::from_euros(20)))
        .await
        .unwrap();
    harness
        .lifecycle
        .confirm_payment(
            reservation.id,
            ConfirmedPayment {
                amount: Money::from_euros(20),
                currency: CurrencyCode::Eur,
                method: PaymentMethod::Card,
                gateway_reference: None,
                paid_at: harness.clock.now(),
            },
        )
        .await
        .unwrap();

    let summary = harness.reconciliation.run(None).await.unwrap();
    assert_eq!(summary.reservations.created, 0);
    assert_eq!(summary.reservations.skipped, 1);
    // One paid reservation, one ledger row: exactly-once.
    assert_eq!(harness.store.ledger_len(), 1);
}

#[tokio::test]
async fn backfills_paid_orders() {
    let harness = Harness::new();
    let user = UserId::new();
    let now = harness.clock.now();

    // One order settled through the callback path (already posted).
    let settled = harness.seed_order(user, Money::from_euros(35)).await;
    harness
        .payments
        .payment_confirmed(PaymentConfirmed {
            source_type: SourceType::Order,
            source_id: *settled.id.as_uuid(),
            amount: settled.total,
            currency: CurrencyCode::Eur,
            method: PaymentMethod::Card,
            gateway_reference: Some("gw_o1".to_string()),
            paid_at: now,
        })
        .await
        .unwrap();

    // One order marked paid out of band, with no ledger posting.
    let lost = Order {
        id: courtbook_core::types::OrderId::new(),
        user_id: user,
        total: Money::from_euros(12),
        method: PaymentMethod::Cash,
        status: OrderStatus::Paid,
        paid_at: Some(now - Duration::hours(1)),
        created_at: now - Duration::hours(2),
        updated_at: now - Duration::hours(1),
    };
    harness.store.insert_order(&lost).await.unwrap();

    let summary = harness.reconciliation.run(None).await.unwrap();
    assert_eq!(summary.orders.created, 1);
    assert_eq!(summary.orders.skipped, 1);

    let entry = harness
        .store
        .find_by_source(SourceType::Order, *lost.id.as_uuid(), Direction::Credit)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.amount, Money::from_euros(12));
    assert_eq!(entry.method, PaymentMethod::Cash);

    let again = harness.reconciliation.run(None).await.unwrap();
    assert_eq!(again.orders.created, 0);
    assert_eq!(again.orders.skipped, 2);
}

#[tokio::test]
async fn backfills_a_refund_recorded_only_in_the_outbox() {
    let harness = Harness::new();
    let court = harness.seed_court().await;
    let reservation = seed_unposted_paid_reservation(&harness, &court).await;

    // The credit exists (reconciled or posted), but the refund only made it
    // into the outbox.
    harness.reconciliation.run(None).await.unwrap();
    harness
        .store
        .append(
            OutboxPayload::ReservationRefunded {
                reservation_id: reservation.id,
                user_id: reservation.user_id,
                amount: Money::from_euros(18),
                refund_reference: Some("rf_lost".to_string()),
            },
            harness.clock.now(),
        )
        .await
        .unwrap();

    let summary = harness.reconciliation.run(None).await.unwrap();
    assert_eq!(summary.refunds.created, 1);

    let debit = harness
        .store
        .find_by_source(SourceType::Reservation, *reservation.id.as_uuid(), Direction::Debit)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(debit.amount, Money::from_euros(18));
    assert_eq!(debit.method, PaymentMethod::Card);
    assert!(debit.idempotency_key.as_str().starts_with("RECON:REFUND:"));

    // Converges.
    let again = harness.reconciliation.run(None).await.unwrap();
    assert_eq!(again.refunds.created, 0);
    assert_eq!(again.refunds.skipped, 2);
}

#[tokio::test]
async fn window_is_clamped_and_old_rows_ignored() {
    let harness = Harness::new();
    let court = harness.seed_court().await;

    // Paid 40 days ago: outside even the maximum window.
    let now = harness.clock.now();
    let start = now + Duration::hours(2);
    let stale = Reservation {
        id: ReservationId::new(),
        user_id: UserId::new(),
        court_id: court.id,
        activity: Activity::Padel,
        slot: TimeSlot::new(start, start + Duration::hours(1)).unwrap(),
        price: Money::from_euros(18),
        method: PaymentMethod::Card,
        status: ReservationStatus::Completed,
        expires_at: now,
        paid_at: Some(now - Duration::days(40)),
        notes: Vec::new(),
        created_at: now - Duration::days(40),
        updated_at: now - Duration::days(40),
    };
    harness.store.insert_reservation(&stale).await.unwrap();

    // `days` is clamped to the 30-day cap, so the row stays out of reach.
    let summary = harness.reconciliation.run(Some(400)).await.unwrap();
    assert_eq!(summary.days, 30);
    assert_eq!(summary.reservations.total, 0);
    assert_eq!(summary.created(), 0);
}
