//! Promotion engine behavior: quotes, single use, usage budgets, and the
//! discounted-reservation scenario end to end.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::Harness;
use courtbook_core::clock::Clock;
use courtbook_core::error::CoreError;
use courtbook_core::ledger::{Direction, SourceType};
use courtbook_core::promotion::{PromotionOutcome, PromotionRejection, PromotionReward};
use courtbook_core::services::ConfirmedPayment;
use courtbook_core::store::{Ledger, PromotionStore, WalletStore};
use courtbook_core::types::{Activity, CurrencyCode, Money, PaymentMethod, UserId};

#[tokio::test]
async fn unknown_code_is_rejected_not_an_error() {
    let harness = Harness::new();
    let outcome = harness
        .promotions
        .validate("NOPE", Money::from_euros(10), None)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PromotionOutcome::Rejected(PromotionRejection::CodeNotFound)
    );
}

#[tokio::test]
async fn discounted_reservation_posts_the_final_amount() {
    let harness = Harness::new();
    let court = harness.seed_court().await;
    let user = UserId::new();
    harness
        .seed_promotion(
            "DESCUENTA1",
            PromotionReward::DiscountFixed {
                value: Money::from_euros(1),
            },
            100,
            false,
        )
        .await;

    // €2.00 booking, code DESCUENTA1 (fixed €1.00 off) → final €1.00.
    let outcome = harness
        .promotions
        .validate("DESCUENTA1", Money::from_euros(2), Some(user))
        .await
        .unwrap();
    let quote = match outcome {
        PromotionOutcome::Approved(quote) => quote,
        PromotionOutcome::Rejected(reason) => panic!("rejected: {reason}"),
    };
    assert_eq!(quote.final_amount, Money::from_euros(1));
    assert_eq!(quote.savings, Money::from_euros(1));

    let reservation = harness
        .lifecycle
        .create(harness.booking(&court, user, Activity::Padel, 2, Money::from_euros(2)))
        .await
        .unwrap();
    harness
        .promotions
        .apply("DESCUENTA1", Money::from_euros(2), user)
        .await
        .unwrap();
    harness
        .lifecycle
        .override_price(reservation.id, quote.final_amount, "code DESCUENTA1".to_string())
        .await
        .unwrap();
    harness
        .lifecycle
        .confirm_payment(
            reservation.id,
            ConfirmedPayment {
                amount: quote.final_amount,
                currency: CurrencyCode::Eur,
                method: PaymentMethod::Card,
                gateway_reference: Some("gw_1".to_string()),
                paid_at: harness.clock.now(),
            },
        )
        .await
        .unwrap();

    // The ledger CREDIT records €1.00, not €2.00.
    let entry = harness
        .store
        .find_by_source(SourceType::Reservation, *reservation.id.as_uuid(), Direction::Credit)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.amount, Money::from_cents(100));
}

#[tokio::test]
async fn signup_bonus_is_granted_exactly_once() {
    let harness = Harness::new();
    let user = UserId::new();
    let promotion = harness
        .seed_promotion(
            "WELCOME10",
            PromotionReward::FixedCredits {
                credits: Money::from_euros(10),
            },
            1000,
            false,
        )
        .await;

    let applied = harness
        .promotions
        .apply("WELCOME10", Money::ZERO, user)
        .await
        .unwrap();
    assert_eq!(applied.quote.credits_awarded, Money::from_euros(10));
    assert_eq!(harness.store.balance(user).await.unwrap(), Money::from_euros(10));

    // A retried signup cannot grant the bonus twice.
    let err = harness
        .promotions
        .apply("WELCOME10", Money::ZERO, user)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert_eq!(harness.store.balance(user).await.unwrap(), Money::from_euros(10));
    assert_eq!(
        harness
            .store
            .application_count(promotion.id, user)
            .await
            .unwrap(),
        1
    );

    let stored = harness
        .store
        .promotion_by_code("WELCOME10")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.usage_count, 1);

    // Validation now reports the per-user rejection.
    let outcome = harness
        .promotions
        .validate("WELCOME10", Money::ZERO, Some(user))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PromotionOutcome::Rejected(PromotionRejection::AlreadyApplied)
    );
}

#[tokio::test]
async fn usage_budget_is_shared_across_users() {
    let harness = Harness::new();
    harness
        .seed_promotion(
            "ONESHOT",
            PromotionReward::DiscountPercent {
                percent: 50,
                max_reward: Some(Money::from_euros(5)),
            },
            1,
            false,
        )
        .await;

    harness
        .promotions
        .apply("ONESHOT", Money::from_euros(30), UserId::new())
        .await
        .unwrap();

    let err = harness
        .promotions
        .apply("ONESHOT", Money::from_euros(30), UserId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    let outcome = harness
        .promotions
        .validate("ONESHOT", Money::from_euros(30), None)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PromotionOutcome::Rejected(PromotionRejection::UsageExhausted)
    );
}

#[tokio::test]
async fn percent_discount_is_capped_by_max_reward() {
    let harness = Harness::new();
    harness
        .seed_promotion(
            "HALF",
            PromotionReward::DiscountPercent {
                percent: 50,
                max_reward: Some(Money::from_euros(5)),
            },
            100,
            true,
        )
        .await;

    let outcome = harness
        .promotions
        .validate("HALF", Money::from_euros(30), None)
        .await
        .unwrap();
    match outcome {
        PromotionOutcome::Approved(quote) => {
            assert_eq!(quote.savings, Money::from_euros(5));
            assert_eq!(quote.final_amount, Money::from_euros(25));
        }
        PromotionOutcome::Rejected(reason) => panic!("rejected: {reason}"),
    }
}
