//! Outbox consumer contract: events are visible at least once and
//! acknowledgements are idempotent.

#![allow(clippy::unwrap_used)]

mod common;

use common::Harness;
use courtbook_core::clock::Clock;
use courtbook_core::outbox::OutboxPayload;
use courtbook_core::store::OutboxStore;
use courtbook_core::types::{Money, UserId};

#[tokio::test]
async fn consumers_poll_and_acknowledge() {
    let harness = Harness::new();
    let now = harness.clock.now();

    for i in 0..3u64 {
        harness
            .store
            .append(
                OutboxPayload::WalletToppedUp {
                    user_id: UserId::new(),
                    credits: Money::from_cents(100 * (i + 1)),
                    balance_after: Money::from_cents(100 * (i + 1)),
                },
                now,
            )
            .await
            .unwrap();
    }

    let batch = harness.store.unprocessed(2).await.unwrap();
    assert_eq!(batch.len(), 2);
    assert!(batch.iter().all(|event| !event.processed));

    let ids: Vec<_> = batch.iter().map(|event| event.id).collect();
    let acknowledged = harness.store.mark_processed(&ids, now).await.unwrap();
    assert_eq!(acknowledged, 2);

    // Re-acknowledging is a no-op.
    let acknowledged = harness.store.mark_processed(&ids, now).await.unwrap();
    assert_eq!(acknowledged, 0);

    let remaining = harness.store.unprocessed(10).await.unwrap();
    assert_eq!(remaining.len(), 1);
}
