//! Shared fixtures for the service-level integration tests.

#![allow(dead_code)] // Each integration test binary uses a subset.
#![allow(clippy::unwrap_used)]

use chrono::Duration;
use courtbook_core::clock::Clock;
use courtbook_core::order::{Order, OrderStatus};
use courtbook_core::promotion::{
    Promotion, PromotionConditions, PromotionReward, PromotionStatus,
};
use courtbook_core::reservation::NewReservation;
use courtbook_core::services::{
    LifecycleConfig, PaymentRecorder, PromotionEngine, Reconciliation, ReconciliationConfig,
    ReservationLifecycle,
};
use courtbook_core::types::{
    Activity, Court, CourtId, Money, OrderId, PaymentMethod, PromotionId, UserId,
};
use courtbook_testing::{FixedClock, MemoryStore};
use std::sync::Arc;

/// A store, a pinned clock and the services wired over them.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub lifecycle: Arc<ReservationLifecycle>,
    pub payments: PaymentRecorder,
    pub promotions: PromotionEngine,
    pub reconciliation: Reconciliation,
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryStore::shared();
        let clock = Arc::new(FixedClock::default_instant());

        let lifecycle = Arc::new(ReservationLifecycle::new(
            store.clone(),
            clock.clone(),
            LifecycleConfig::default(),
        ));
        let payments = PaymentRecorder::new(
            lifecycle.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            clock.clone(),
        );
        let promotions = PromotionEngine::new(store.clone(), clock.clone());
        let reconciliation = Reconciliation::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            clock.clone(),
            ReconciliationConfig::default(),
        );

        Self {
            store,
            clock,
            lifecycle,
            payments,
            promotions,
            reconciliation,
        }
    }

    /// Seeds a padel court that also allows pickleball and badminton to
    /// share it.
    pub async fn seed_court(&self) -> Court {
        let court = Court {
            id: CourtId::new(),
            name: "Center Court".to_string(),
            primary_activity: Activity::Padel,
            compatible_secondary: vec![Activity::Pickleball, Activity::Badminton],
        };
        courtbook_core::store::BookingStore::insert_court(self.store.as_ref(), &court)
            .await
            .unwrap();
        court
    }

    /// A one-hour booking request starting `offset_hours` from now.
    pub fn booking(
        &self,
        court: &Court,
        user: UserId,
        activity: Activity,
        offset_hours: i64,
        price: Money,
    ) -> NewReservation {
        let start = self.clock.now() + Duration::hours(offset_hours);
        NewReservation {
            user_id: user,
            court_id: court.id,
            activity,
            start,
            end: start + Duration::hours(1),
            price,
            method: PaymentMethod::Card,
        }
    }

    /// Seeds a PENDING storefront order.
    pub async fn seed_order(&self, user: UserId, total: Money) -> Order {
        let now = self.clock.now();
        let order = Order {
            id: OrderId::new(),
            user_id: user,
            total,
            method: PaymentMethod::Card,
            status: OrderStatus::Pending,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        courtbook_core::store::OrderStore::insert_order(self.store.as_ref(), &order)
            .await
            .unwrap();
        order
    }

    /// Seeds an active promotion valid for a week around the pinned clock.
    pub async fn seed_promotion(
        &self,
        code: &str,
        reward: PromotionReward,
        usage_limit: u32,
        stackable: bool,
    ) -> Promotion {
        let now = self.clock.now();
        let promotion = Promotion {
            id: PromotionId::new(),
            code: code.to_string(),
            status: PromotionStatus::Active,
            reward,
            valid_from: now - Duration::days(1),
            valid_to: now + Duration::days(7),
            usage_limit,
            usage_count: 0,
            stackable,
            conditions: PromotionConditions::default(),
        };
        courtbook_core::store::PromotionStore::insert_promotion(self.store.as_ref(), &promotion)
            .await
            .unwrap();
        promotion
    }
}
