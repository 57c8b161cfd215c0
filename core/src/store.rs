//! Store traits: the injection seams between the services and persistence.
//!
//! Each trait names the atomic operations one component needs. Multi-step
//! financial updates (status change + ledger entry + wallet movement +
//! outbox event) are single trait methods so that every implementation
//! executes them in one local ACID transaction; a crash between steps can
//! never be observed. The Ledger and Wallet stores are the only components
//! that mutate money-related state: everything else composes them through
//! these operations.

use crate::error::Result;
use crate::ledger::{Direction, LedgerEntry, LedgerFilter, NewLedgerEntry, Page, Recorded, SourceType};
use crate::order::Order;
use crate::outbox::{EventKind, OutboxEvent, OutboxPayload};
use crate::promotion::{NewPromotionApplication, Promotion, PromotionApplication};
use crate::reservation::{Reservation, ReservationStatus};
use crate::types::{Court, CourtId, Money, OrderId, OutboxEventId, ReservationId, UserId};
use crate::wallet::{NewWalletEntry, WalletEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// Bookings
// ============================================================================

/// A settlement to apply to a reservation in one transaction.
///
/// Carries everything the store needs: the conditional status change, the
/// ledger entry, an optional wallet movement (paying with store credit, or
/// returning credit on refund) and the outbox event.
#[derive(Clone, Debug)]
pub struct ReservationSettlement {
    /// Statuses the reservation may currently be in
    pub allowed_from: Vec<ReservationStatus>,
    /// Status to move to
    pub to: ReservationStatus,
    /// When the money moved (also recorded as `paid_at` on payment)
    pub paid_at: DateTime<Utc>,
    /// Ledger entry to record (idempotent on its key)
    pub entry: NewLedgerEntry,
    /// Wallet movement to apply in the same transaction, when credits are involved
    pub wallet: Option<NewWalletEntry>,
    /// Outbox event describing the change
    pub event: OutboxPayload,
    /// Note to append to the reservation
    pub note: Option<String>,
}

/// Receipt returned by a settlement
#[derive(Clone, Debug)]
pub struct SettlementReceipt {
    /// The reservation after the transition
    pub reservation: Reservation,
    /// The ledger entry (freshly inserted or pre-existing)
    pub entry: LedgerEntry,
    /// True when this call inserted the ledger row
    pub entry_created: bool,
}

/// Persistence seam for courts and reservations
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Loads a court.
    ///
    /// # Errors
    ///
    /// `NotFound` when the court does not exist; `Storage` on infrastructure failure.
    async fn court(&self, id: CourtId) -> Result<Court>;

    /// Inserts a court (admin/seed path).
    ///
    /// # Errors
    ///
    /// `Conflict` on duplicate id; `Storage` on infrastructure failure.
    async fn insert_court(&self, court: &Court) -> Result<()>;

    /// Loads a reservation.
    ///
    /// # Errors
    ///
    /// `NotFound` when it does not exist; `Storage` on infrastructure failure.
    async fn reservation(&self, id: ReservationId) -> Result<Reservation>;

    /// Inserts a reservation after re-checking the court conflict rule
    /// against concurrent bookings, atomically.
    ///
    /// # Errors
    ///
    /// `Conflict` when an overlapping incompatible booking exists;
    /// `NotFound` when the court does not exist; `Storage` otherwise.
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()>;

    /// Conditionally transitions a reservation, appending a note and an
    /// outbox event in the same transaction. The update matches only when
    /// the current status equals `from`.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the row is no longer in `from`; `NotFound`;
    /// `Storage` otherwise.
    async fn transition(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
        at: DateTime<Utc>,
        note: Option<String>,
        event: Option<OutboxPayload>,
    ) -> Result<Reservation>;

    /// Applies a [`ReservationSettlement`] in one transaction.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the row is not in an allowed source status;
    /// `InsufficientCredits` when a wallet debit would overdraw;
    /// `NotFound`; `Storage` otherwise.
    async fn settle(
        &self,
        id: ReservationId,
        settlement: ReservationSettlement,
    ) -> Result<SettlementReceipt>;

    /// Overrides the price of a PENDING reservation, appending the note and
    /// outbox event in the same transaction.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless PENDING; `NotFound`; `Storage` otherwise.
    async fn override_price(
        &self,
        id: ReservationId,
        new_price: Money,
        at: DateTime<Utc>,
        note: String,
        event: OutboxPayload,
    ) -> Result<Reservation>;

    /// PENDING reservations created before `cutoff`.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reservation>>;

    /// Auto-cancels one stale PENDING reservation: status update, note and
    /// outbox event in one transaction. Returns `false` when another writer
    /// moved the row first (the conditional update matched zero rows).
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn auto_cancel(
        &self,
        id: ReservationId,
        at: DateTime<Utc>,
        note: String,
        event: OutboxPayload,
    ) -> Result<bool>;

    /// Reservations whose payment was recorded inside `[from, to)`,
    /// regardless of later transitions (source rows for reconciliation).
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn paid_between(&self, from: DateTime<Utc>, to: DateTime<Utc>)
        -> Result<Vec<Reservation>>;
}

// ============================================================================
// Orders
// ============================================================================

/// Persistence seam for storefront orders
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Loads an order.
    ///
    /// # Errors
    ///
    /// `NotFound` when it does not exist; `Storage` on infrastructure failure.
    async fn order(&self, id: OrderId) -> Result<Order>;

    /// Inserts an order (storefront/seed path).
    ///
    /// # Errors
    ///
    /// `Conflict` on duplicate id; `Storage` on infrastructure failure.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Marks an order PAID and records the ledger entry and outbox event in
    /// one transaction.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless PENDING; `NotFound`; `Storage` otherwise.
    async fn settle(
        &self,
        id: OrderId,
        paid_at: DateTime<Utc>,
        entry: NewLedgerEntry,
        event: OutboxPayload,
    ) -> Result<(Order, Recorded)>;

    /// Marks an order REFUNDED and records the ledger entry and outbox
    /// event in one transaction.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless PAID; `NotFound`; `Storage` otherwise.
    async fn refund(
        &self,
        id: OrderId,
        at: DateTime<Utc>,
        entry: NewLedgerEntry,
        event: OutboxPayload,
    ) -> Result<(Order, Recorded)>;

    /// Orders whose payment was recorded inside `[from, to)`.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn paid_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Order>>;
}

// ============================================================================
// Ledger
// ============================================================================

/// The append-only ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Records a ledger entry; an idempotent upsert. When an entry with the
    /// same idempotency key already exists the call is a no-op returning
    /// the existing entry with `created = false`.
    ///
    /// # Errors
    ///
    /// `Validation` when the entry references a missing source record;
    /// `Storage` on infrastructure failure.
    async fn record(&self, entry: NewLedgerEntry) -> Result<Recorded>;

    /// Records a ledger entry and, only when the row is freshly inserted,
    /// appends an outbox event in the same transaction.
    ///
    /// # Errors
    ///
    /// As [`Ledger::record`].
    async fn record_with_event(
        &self,
        entry: NewLedgerEntry,
        event: OutboxPayload,
    ) -> Result<Recorded>;

    /// Looks up the entry for one logical economic event.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn find_by_source(
        &self,
        source_type: SourceType,
        source_id: Uuid,
        direction: Direction,
    ) -> Result<Option<LedgerEntry>>;

    /// Filtered, paginated query for reporting and reconciliation.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn query(&self, filter: &LedgerFilter) -> Result<Page<LedgerEntry>>;
}

// ============================================================================
// Wallet
// ============================================================================

/// The wallet balance projector.
///
/// Every movement inserts a wallet ledger row with its running
/// `balance_after` and updates the user's cached balance to the same value,
/// in one transaction. Any code path changing a balance without going
/// through this seam is a design violation.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// The user's cached balance.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown users; `Storage` on infrastructure failure.
    async fn balance(&self, user: UserId) -> Result<Money>;

    /// All wallet movements for a user, oldest first.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn entries(&self, user: UserId) -> Result<Vec<WalletEntry>>;

    /// Applies one wallet movement; idempotent on the entry key (a replay
    /// returns the stored row without moving credits again).
    ///
    /// # Errors
    ///
    /// `InsufficientCredits` on overdraw; `Storage` otherwise.
    async fn apply(&self, entry: NewWalletEntry, at: DateTime<Utc>) -> Result<WalletEntry>;

    /// Tops a wallet up: wallet credit, ledger entry and outbox event in
    /// one transaction. Idempotent on the entry keys; a replay returns the
    /// stored rows with `created = false` on the ledger side.
    ///
    /// # Errors
    ///
    /// `Validation` on overflow; `Storage` otherwise.
    async fn top_up(
        &self,
        entry: NewWalletEntry,
        ledger: NewLedgerEntry,
        at: DateTime<Utc>,
    ) -> Result<(WalletEntry, Recorded)>;
}

// ============================================================================
// Outbox
// ============================================================================

/// The transactional outbox log
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Appends a standalone event (state changes append theirs through the
    /// composite store operations instead).
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn append(&self, payload: OutboxPayload, at: DateTime<Utc>) -> Result<OutboxEvent>;

    /// Oldest unprocessed events, up to `limit`.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn unprocessed(&self, limit: u32) -> Result<Vec<OutboxEvent>>;

    /// Marks events processed; returns how many rows changed.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn mark_processed(&self, ids: &[OutboxEventId], at: DateTime<Utc>) -> Result<u64>;

    /// Events of one kind created inside `[from, to)`, processed or not
    /// (reconciliation reads refund events through this).
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn of_kind_between(
        &self,
        kind: EventKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>>;
}

// ============================================================================
// Promotions
// ============================================================================

/// Persistence seam for promotions and their applications
#[async_trait]
pub trait PromotionStore: Send + Sync {
    /// Looks up a promotion by code.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn promotion_by_code(&self, code: &str) -> Result<Option<Promotion>>;

    /// Inserts a promotion (admin/seed path).
    ///
    /// # Errors
    ///
    /// `Conflict` on duplicate code; `Storage` on infrastructure failure.
    async fn insert_promotion(&self, promotion: &Promotion) -> Result<()>;

    /// How many times a user has applied a promotion.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn application_count(&self, promotion: crate::types::PromotionId, user: UserId)
        -> Result<u64>;

    /// Applies a promotion: inserts the application, increments the usage
    /// counter guarded by the limit, applies the wallet credit (credit-bonus
    /// types) and appends the outbox event: one transaction.
    ///
    /// # Errors
    ///
    /// `Conflict` when a non-stackable promotion was already applied to the
    /// user or the usage budget is spent; `Storage` otherwise.
    async fn apply(
        &self,
        application: NewPromotionApplication,
        wallet: Option<NewWalletEntry>,
        event: OutboxPayload,
    ) -> Result<PromotionApplication>;
}
