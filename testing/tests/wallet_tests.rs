//! Wallet projector behavior, including the balance-consistency property:
//! the sum of a user's wallet movements always equals the cached balance.

#![allow(clippy::unwrap_used)]

mod common;

use common::Harness;
use courtbook_core::clock::Clock;
use courtbook_core::error::CoreError;
use courtbook_core::ledger::{
    Direction, IdempotencyKey, NewLedgerEntry, SettlementStatus, SourceType,
};
use courtbook_core::store::WalletStore;
use courtbook_core::types::{CurrencyCode, Money, PaymentMethod, UserId};
use courtbook_core::wallet::{NewWalletEntry, WalletDirection, WalletReason};
use proptest::prelude::*;

fn wallet_credit(user: UserId, key: &str, cents: u64) -> NewWalletEntry {
    NewWalletEntry {
        user_id: user,
        direction: WalletDirection::Credit,
        reason: WalletReason::Topup,
        credits: Money::from_cents(cents),
        idempotency_key: IdempotencyKey::raw(key.to_string()),
    }
}

fn wallet_debit(user: UserId, key: &str, cents: u64) -> NewWalletEntry {
    NewWalletEntry {
        user_id: user,
        direction: WalletDirection::Debit,
        reason: WalletReason::Spend,
        credits: Money::from_cents(cents),
        idempotency_key: IdempotencyKey::raw(key.to_string()),
    }
}

#[tokio::test]
async fn replaying_a_movement_does_not_move_credits_twice() {
    let harness = Harness::new();
    let user = UserId::new();
    let now = harness.clock.now();

    let entry = wallet_credit(user, "credit-1", 1000);
    let first = harness.store.apply(entry.clone(), now).await.unwrap();
    let replay = harness.store.apply(entry, now).await.unwrap();

    assert_eq!(first.id, replay.id);
    assert_eq!(harness.store.balance(user).await.unwrap(), Money::from_cents(1000));
    assert_eq!(harness.store.entries(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn top_up_writes_wallet_ledger_and_outbox_together() {
    let harness = Harness::new();
    let user = UserId::new();
    let now = harness.clock.now();

    let ledger = NewLedgerEntry {
        source_type: SourceType::Topup,
        source_id: *user.as_uuid(),
        direction: Direction::Credit,
        amount: Money::from_euros(25),
        currency: CurrencyCode::Eur,
        method: PaymentMethod::Card,
        status: SettlementStatus::Paid,
        paid_at: now,
        gateway_reference: Some("gw_topup_1".to_string()),
        idempotency_key: IdempotencyKey::topup(user, "gw_topup_1"),
        metadata: None,
    };
    let entry = wallet_credit(user, IdempotencyKey::topup(user, "gw_topup_1").as_str(), 2500);

    let (wallet, recorded) = harness
        .store
        .top_up(entry.clone(), ledger.clone(), now)
        .await
        .unwrap();
    assert!(recorded.created);
    assert_eq!(wallet.balance_after, Money::from_euros(25));
    assert_eq!(harness.store.ledger_len(), 1);
    assert_eq!(harness.store.outbox_len(), 1);

    // A retried callback replays cleanly.
    let (wallet, recorded) = harness.store.top_up(entry, ledger, now).await.unwrap();
    assert!(!recorded.created);
    assert_eq!(wallet.balance_after, Money::from_euros(25));
    assert_eq!(harness.store.ledger_len(), 1);
    assert_eq!(harness.store.outbox_len(), 1);
    assert_eq!(harness.store.balance(user).await.unwrap(), Money::from_euros(25));
}

#[tokio::test]
async fn overdraw_is_rejected_and_balance_untouched() {
    let harness = Harness::new();
    let user = UserId::new();
    let now = harness.clock.now();

    harness
        .store
        .apply(wallet_credit(user, "credit-1", 500), now)
        .await
        .unwrap();
    let err = harness
        .store
        .apply(wallet_debit(user, "debit-1", 700), now)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InsufficientCredits { .. }));
    assert_eq!(harness.store.balance(user).await.unwrap(), Money::from_cents(500));
    assert_eq!(harness.store.entries(user).await.unwrap().len(), 1);
}

/// One step of the property: credit or debit some cents.
#[derive(Clone, Debug)]
enum Movement {
    Credit(u64),
    Debit(u64),
}

fn movement_strategy() -> impl Strategy<Value = Movement> {
    prop_oneof![
        (1u64..5000).prop_map(Movement::Credit),
        (1u64..5000).prop_map(Movement::Debit),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After any sequence of movements (including rejected overdraws and
    /// replayed keys), the cached balance equals the sum over wallet rows
    /// and every `balance_after` is consistent with its predecessor.
    #[test]
    fn balance_always_equals_the_sum_of_entries(movements in prop::collection::vec(movement_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let harness = Harness::new();
            let user = UserId::new();
            let now = harness.clock.now();

            for (i, movement) in movements.iter().enumerate() {
                let result = match movement {
                    Movement::Credit(cents) => {
                        harness
                            .store
                            .apply(wallet_credit(user, &format!("m-{i}"), *cents), now)
                            .await
                    }
                    Movement::Debit(cents) => {
                        harness
                            .store
                            .apply(wallet_debit(user, &format!("m-{i}"), *cents), now)
                            .await
                    }
                };
                // Overdraws are rejected; everything else must apply.
                if let Err(error) = result {
                    prop_assert!(
                        matches!(error, CoreError::InsufficientCredits { .. }),
                        "expected InsufficientCredits error"
                    );
                }

                // Replay one earlier movement; it must be a no-op.
                if i % 5 == 4 {
                    let _ = harness
                        .store
                        .apply(wallet_credit(user, "m-0", 1), now)
                        .await;
                }

                let balance = harness.store.balance(user).await.unwrap();
                prop_assert_eq!(balance, harness.store.wallet_sum(user));
            }

            let entries = harness.store.entries(user).await.unwrap();
            let mut running = Money::ZERO;
            for entry in entries {
                running = match entry.direction {
                    WalletDirection::Credit => running.checked_add(entry.credits).unwrap(),
                    WalletDirection::Debit => running.checked_sub(entry.credits).unwrap(),
                };
                prop_assert_eq!(entry.balance_after, running);
            }
            Ok(())
        })?;
    }
}
