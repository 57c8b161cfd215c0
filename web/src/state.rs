//! Shared application state for handlers.
//!
//! The services are constructed once at process start from a single store
//! implementation (PostgreSQL in production, the in-memory fake in tests)
//! and passed to handlers through Axum state.

use crate::config::Config;
use courtbook_core::clock::Clock;
use courtbook_core::services::{
    LifecycleConfig, PaymentRecorder, PromotionEngine, Reconciliation, ReconciliationConfig,
    ReservationLifecycle,
};
use courtbook_core::store::{
    BookingStore, Ledger, OrderStore, OutboxStore, PromotionStore, WalletStore,
};
use std::sync::Arc;

/// Application state shared with every handler
#[derive(Clone)]
pub struct AppState {
    /// Reservation lifecycle manager
    pub lifecycle: Arc<ReservationLifecycle>,
    /// Payment callback dispatcher
    pub payments: Arc<PaymentRecorder>,
    /// Promotion engine
    pub promotions: Arc<PromotionEngine>,
    /// Reconciliation job
    pub reconciliation: Arc<Reconciliation>,
    /// Booking store (reads + seeding)
    pub bookings: Arc<dyn BookingStore>,
    /// Ledger store (reporting queries)
    pub ledger: Arc<dyn Ledger>,
    /// Wallet store (balance reads)
    pub wallet: Arc<dyn WalletStore>,
    /// Outbox store (consumer contract)
    pub outbox: Arc<dyn OutboxStore>,
    /// Promotion store (admin seeding)
    pub promotion_store: Arc<dyn PromotionStore>,
    /// Clock shared by the services
    pub clock: Arc<dyn Clock>,
    /// Loaded configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the services from one store implementing every store trait.
    pub fn from_store<S>(store: Arc<S>, clock: Arc<dyn Clock>, config: Config) -> Self
    where
        S: BookingStore
            + OrderStore
            + Ledger
            + WalletStore
            + OutboxStore
            + PromotionStore
            + 'static,
    {
        let bookings: Arc<dyn BookingStore> = store.clone();
        let orders: Arc<dyn OrderStore> = store.clone();
        let ledger: Arc<dyn Ledger> = store.clone();
        let wallet: Arc<dyn WalletStore> = store.clone();
        let outbox: Arc<dyn OutboxStore> = store.clone();
        let promotion_store: Arc<dyn PromotionStore> = store;

        let lifecycle = Arc::new(ReservationLifecycle::new(
            bookings.clone(),
            clock.clone(),
            LifecycleConfig {
                timeout_minutes: config.jobs.reservation_timeout_minutes,
            },
        ));
        let payments = Arc::new(PaymentRecorder::new(
            lifecycle.clone(),
            orders.clone(),
            wallet.clone(),
            ledger.clone(),
            clock.clone(),
        ));
        let promotions = Arc::new(PromotionEngine::new(promotion_store.clone(), clock.clone()));
        let reconciliation = Arc::new(Reconciliation::new(
            bookings.clone(),
            orders,
            ledger.clone(),
            outbox.clone(),
            clock.clone(),
            ReconciliationConfig {
                default_days: config.jobs.reconciliation_days,
                max_days: config.jobs.reconciliation_max_days,
            },
        ));

        Self {
            lifecycle,
            payments,
            promotions,
            reconciliation,
            bookings,
            ledger,
            wallet,
            outbox,
            promotion_store,
            clock,
            config: Arc::new(config),
        }
    }
}
