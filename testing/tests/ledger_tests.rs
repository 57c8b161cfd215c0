//! Ledger store behavior: idempotent posting, source validation, queries.

#![allow(clippy::unwrap_used)]

mod common;

use common::Harness;
use courtbook_core::clock::Clock;
use courtbook_core::error::CoreError;
use courtbook_core::ledger::{
    Direction, IdempotencyKey, LedgerFilter, NewLedgerEntry, SettlementStatus, SourceType,
};
use courtbook_core::store::Ledger;
use courtbook_core::types::{CurrencyCode, Money, PaymentMethod, UserId};
use uuid::Uuid;

fn topup_entry(harness: &Harness, user: UserId, reference: &str, cents: u64) -> NewLedgerEntry {
    NewLedgerEntry {
        source_type: SourceType::Topup,
        source_id: *user.as_uuid(),
        direction: Direction::Credit,
        amount: Money::from_cents(cents),
        currency: CurrencyCode::Eur,
        method: PaymentMethod::Card,
        status: SettlementStatus::Paid,
        paid_at: harness.clock.now(),
        gateway_reference: Some(reference.to_string()),
        idempotency_key: IdempotencyKey::topup(user, reference),
        metadata: None,
    }
}

#[tokio::test]
async fn recording_twice_with_the_same_key_stores_one_row() {
    let harness = Harness::new();
    let user = UserId::new();
    let entry = topup_entry(&harness, user, "t-1", 1500);

    let first = harness.store.record(entry.clone()).await.unwrap();
    assert!(first.created);

    let second = harness.store.record(entry).await.unwrap();
    assert!(!second.created);
    assert_eq!(first.entry.id, second.entry.id);
    assert_eq!(first.entry.amount, second.entry.amount);
    assert_eq!(harness.store.ledger_len(), 1);
}

#[tokio::test]
async fn reservation_entries_must_reference_an_existing_reservation() {
    let harness = Harness::new();

    let entry = NewLedgerEntry {
        source_type: SourceType::Reservation,
        source_id: Uuid::new_v4(),
        direction: Direction::Credit,
        amount: Money::from_euros(20),
        currency: CurrencyCode::Eur,
        method: PaymentMethod::Card,
        status: SettlementStatus::Paid,
        paid_at: harness.clock.now(),
        gateway_reference: None,
        idempotency_key: IdempotencyKey::raw("RESERVATION:ghost".to_string()),
        metadata: None,
    };
    let err = harness.store.record(entry).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(harness.store.ledger_len(), 0);
}

#[tokio::test]
async fn query_filters_and_paginates() {
    let harness = Harness::new();
    let user = UserId::new();

    for i in 0..5u64 {
        harness
            .store
            .record(topup_entry(&harness, user, &format!("t-{i}"), 100 + i))
            .await
            .unwrap();
    }

    let page = harness
        .store
        .query(&LedgerFilter {
            source_type: Some(SourceType::Topup),
            limit: 2,
            page: 1,
            ..LedgerFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.items.len(), 2);

    let page3 = harness
        .store
        .query(&LedgerFilter {
            source_type: Some(SourceType::Topup),
            limit: 2,
            page: 3,
            ..LedgerFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(page3.items.len(), 1);

    let none = harness
        .store
        .query(&LedgerFilter {
            source_type: Some(SourceType::Order),
            ..LedgerFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(none.total, 0);

    let debits = harness
        .store
        .query(&LedgerFilter {
            direction: Some(Direction::Debit),
            ..LedgerFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(debits.total, 0);
}
