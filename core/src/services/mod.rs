//! The financial services: lifecycle, payments, promotions, reconciliation.
//!
//! Services hold their dependencies as `Arc<dyn …>` store traits so the
//! same logic runs against PostgreSQL in production and the in-memory
//! fakes in tests.

pub mod lifecycle;
pub mod payments;
pub mod promotions;
pub mod reconciliation;

pub use lifecycle::{
    ConfirmedPayment, LifecycleConfig, RefundRequest, ReservationLifecycle, SweepSummary,
};
pub use payments::{PaymentConfirmed, PaymentRecorder, PaymentRefunded, RecordedPayment};
pub use promotions::{AppliedPromotion, PromotionEngine};
pub use reconciliation::{
    CategoryTally, Reconciliation, ReconciliationConfig, ReconciliationSummary,
};
