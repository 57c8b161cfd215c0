//! In-memory implementation of every Courtbook store trait.
//!
//! One `Mutex<Inner>` guards all tables, so every trait operation is
//! trivially atomic: the same all-or-nothing contract the PostgreSQL
//! implementations provide with transactions. Composite operations stage
//! their checks before mutating anything, so a failing step (an overdrawn
//! wallet, an illegal transition) leaves no partial state behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courtbook_core::error::{CoreError, Result};
use courtbook_core::ledger::{
    Direction, LedgerEntry, LedgerFilter, NewLedgerEntry, Page, Recorded, SourceType,
};
use courtbook_core::order::{Order, OrderStatus};
use courtbook_core::outbox::{EventKind, OutboxEvent, OutboxPayload};
use courtbook_core::promotion::{NewPromotionApplication, Promotion, PromotionApplication};
use courtbook_core::reservation::{Reservation, ReservationStatus};
use courtbook_core::store::{
    BookingStore, Ledger, OrderStore, OutboxStore, PromotionStore, ReservationSettlement,
    SettlementReceipt, WalletStore,
};
use courtbook_core::types::{
    Court, CourtId, LedgerEntryId, Money, OrderId, OutboxEventId, PromotionId, ReservationId,
    UserId, WalletEntryId,
};
use courtbook_core::wallet::{NewWalletEntry, WalletEntry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    courts: HashMap<CourtId, Court>,
    reservations: HashMap<ReservationId, Reservation>,
    orders: HashMap<OrderId, Order>,
    ledger: Vec<LedgerEntry>,
    wallet: Vec<WalletEntry>,
    balances: HashMap<UserId, Money>,
    outbox: Vec<OutboxEvent>,
    promotions: HashMap<PromotionId, Promotion>,
    applications: Vec<PromotionApplication>,
}

/// In-memory store implementing every Courtbook store trait
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store behind an `Arc`, ready to be cloned into the
    /// services
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sum of a user's wallet movements (credits minus debits), for
    /// asserting the balance-consistency invariant in tests.
    #[must_use]
    pub fn wallet_sum(&self, user: UserId) -> Money {
        let inner = self.lock();
        let mut balance = Money::ZERO;
        for entry in inner.wallet.iter().filter(|e| e.user_id == user) {
            balance = match entry.direction {
                courtbook_core::wallet::WalletDirection::Credit => {
                    balance.checked_add(entry.credits).unwrap_or(balance)
                }
                courtbook_core::wallet::WalletDirection::Debit => {
                    balance.saturating_sub(entry.credits)
                }
            };
        }
        balance
    }

    /// Number of ledger rows currently stored
    #[must_use]
    pub fn ledger_len(&self) -> usize {
        self.lock().ledger.len()
    }

    /// Number of outbox rows currently stored
    #[must_use]
    pub fn outbox_len(&self) -> usize {
        self.lock().outbox.len()
    }
}

// ============================================================================
// Locked helpers (the "transaction body" shared by composite operations)
// ============================================================================

fn record_ledger(inner: &mut Inner, entry: NewLedgerEntry, now: DateTime<Utc>) -> Result<Recorded> {
    if let Some(existing) = inner
        .ledger
        .iter()
        .find(|row| row.idempotency_key == entry.idempotency_key)
    {
        return Ok(Recorded {
            entry: existing.clone(),
            created: false,
        });
    }

    let source_exists = match entry.source_type {
        SourceType::Reservation => inner
            .reservations
            .contains_key(&ReservationId::from_uuid(entry.source_id)),
        SourceType::Order => inner.orders.contains_key(&OrderId::from_uuid(entry.source_id)),
        SourceType::Topup | SourceType::Membership => true,
    };
    if !source_exists {
        return Err(CoreError::Validation(format!(
            "ledger entry references missing {} {}",
            entry.source_type, entry.source_id
        )));
    }

    let row = LedgerEntry {
        id: LedgerEntryId::new(),
        source_type: entry.source_type,
        source_id: entry.source_id,
        direction: entry.direction,
        amount: entry.amount,
        currency: entry.currency,
        method: entry.method,
        status: entry.status,
        paid_at: entry.paid_at,
        gateway_reference: entry.gateway_reference,
        idempotency_key: entry.idempotency_key,
        metadata: entry.metadata,
        created_at: now,
    };
    inner.ledger.push(row.clone());
    Ok(Recorded {
        entry: row,
        created: true,
    })
}

fn apply_wallet(inner: &mut Inner, entry: NewWalletEntry, now: DateTime<Utc>) -> Result<WalletEntry> {
    if let Some(existing) = inner
        .wallet
        .iter()
        .find(|row| row.idempotency_key == entry.idempotency_key)
    {
        return Ok(existing.clone());
    }

    let balance = inner
        .balances
        .get(&entry.user_id)
        .copied()
        .unwrap_or(Money::ZERO);
    let balance_after = entry.balance_after(balance)?;

    let row = WalletEntry {
        id: WalletEntryId::new(),
        user_id: entry.user_id,
        direction: entry.direction,
        reason: entry.reason,
        credits: entry.credits,
        balance_after,
        idempotency_key: entry.idempotency_key,
        created_at: now,
    };
    inner.wallet.push(row.clone());
    inner.balances.insert(row.user_id, balance_after);
    Ok(row)
}

/// Pre-flight for [`apply_wallet`]: verifies it will succeed without
/// mutating, so composite operations can stage checks first.
fn check_wallet(inner: &Inner, entry: &NewWalletEntry) -> Result<()> {
    if inner
        .wallet
        .iter()
        .any(|row| row.idempotency_key == entry.idempotency_key)
    {
        return Ok(());
    }
    let balance = inner
        .balances
        .get(&entry.user_id)
        .copied()
        .unwrap_or(Money::ZERO);
    entry.balance_after(balance).map(|_| ())
}

fn append_event(inner: &mut Inner, payload: OutboxPayload, at: DateTime<Utc>) -> OutboxEvent {
    let event = OutboxEvent {
        id: OutboxEventId::new(),
        payload,
        created_at: at,
        processed: false,
        processed_at: None,
    };
    inner.outbox.push(event.clone());
    event
}

// ============================================================================
// BookingStore
// ============================================================================

#[async_trait]
impl BookingStore for MemoryStore {
    async fn court(&self, id: CourtId) -> Result<Court> {
        self.lock()
            .courts
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("court", id))
    }

    async fn insert_court(&self, court: &Court) -> Result<()> {
        let mut inner = self.lock();
        if inner.courts.contains_key(&court.id) {
            return Err(CoreError::Conflict(format!("court {} already exists", court.id)));
        }
        inner.courts.insert(court.id, court.clone());
        Ok(())
    }

    async fn reservation(&self, id: ReservationId) -> Result<Reservation> {
        self.lock()
            .reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("reservation", id))
    }

    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        let mut inner = self.lock();
        let court = inner
            .courts
            .get(&reservation.court_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("court", reservation.court_id))?;

        let blocking = inner.reservations.values().find(|existing| {
            existing.court_id == reservation.court_id
                && !existing.status.is_terminal()
                && existing.slot.overlaps(&reservation.slot)
                && court.conflicts(reservation.activity, existing.activity)
        });
        if let Some(existing) = blocking {
            return Err(CoreError::Conflict(format!(
                "court {} is booked for {} in that slot",
                court.name, existing.activity
            )));
        }

        inner
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn transition(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
        at: DateTime<Utc>,
        note: Option<String>,
        event: Option<OutboxPayload>,
    ) -> Result<Reservation> {
        let mut inner = self.lock();
        let current = inner
            .reservations
            .get(&id)
            .ok_or_else(|| CoreError::not_found("reservation", id))?
            .status;
        if current != from {
            return Err(CoreError::invalid_state(
                format!("reservation {id}"),
                current.as_str(),
                format!("transition to {to}"),
            ));
        }

        if let Some(payload) = event {
            append_event(&mut inner, payload, at);
        }
        let reservation = inner
            .reservations
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("reservation", id))?;
        reservation.status = to;
        reservation.updated_at = at;
        if let Some(note) = note {
            reservation.notes.push(note);
        }
        Ok(reservation.clone())
    }

    async fn settle(
        &self,
        id: ReservationId,
        settlement: ReservationSettlement,
    ) -> Result<SettlementReceipt> {
        let mut inner = self.lock();
        let current = inner
            .reservations
            .get(&id)
            .ok_or_else(|| CoreError::not_found("reservation", id))?
            .status;
        if !settlement.allowed_from.contains(&current) {
            return Err(CoreError::invalid_state(
                format!("reservation {id}"),
                current.as_str(),
                format!("settle to {}", settlement.to),
            ));
        }

        // Stage: a failing wallet movement must roll the whole step back.
        if let Some(wallet) = &settlement.wallet {
            check_wallet(&inner, wallet)?;
        }

        let recorded = record_ledger(&mut inner, settlement.entry, settlement.paid_at)?;
        if let Some(wallet) = settlement.wallet {
            apply_wallet(&mut inner, wallet, settlement.paid_at)?;
        }
        append_event(&mut inner, settlement.event, settlement.paid_at);

        let reservation = inner
            .reservations
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("reservation", id))?;
        reservation.status = settlement.to;
        reservation.updated_at = settlement.paid_at;
        if settlement.to == ReservationStatus::Paid {
            reservation.paid_at = Some(settlement.paid_at);
        }
        if let Some(note) = settlement.note {
            reservation.notes.push(note);
        }

        Ok(SettlementReceipt {
            reservation: reservation.clone(),
            entry: recorded.entry,
            entry_created: recorded.created,
        })
    }

    async fn override_price(
        &self,
        id: ReservationId,
        new_price: Money,
        at: DateTime<Utc>,
        note: String,
        event: OutboxPayload,
    ) -> Result<Reservation> {
        let mut inner = self.lock();
        let current = inner
            .reservations
            .get(&id)
            .ok_or_else(|| CoreError::not_found("reservation", id))?
            .status;
        if current != ReservationStatus::Pending {
            return Err(CoreError::invalid_state(
                format!("reservation {id}"),
                current.as_str(),
                "override price",
            ));
        }

        append_event(&mut inner, event, at);
        let reservation = inner
            .reservations
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("reservation", id))?;
        reservation.price = new_price;
        reservation.updated_at = at;
        reservation.notes.push(note);
        Ok(reservation.clone())
    }

    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let inner = self.lock();
        Ok(inner
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Pending && r.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn auto_cancel(
        &self,
        id: ReservationId,
        at: DateTime<Utc>,
        note: String,
        event: OutboxPayload,
    ) -> Result<bool> {
        let mut inner = self.lock();
        let Some(current) = inner.reservations.get(&id).map(|r| r.status) else {
            return Ok(false);
        };
        if current != ReservationStatus::Pending {
            return Ok(false);
        }

        append_event(&mut inner, event, at);
        if let Some(reservation) = inner.reservations.get_mut(&id) {
            reservation.status = ReservationStatus::Cancelled;
            reservation.updated_at = at;
            reservation.notes.push(note);
        }
        Ok(true)
    }

    async fn paid_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let inner = self.lock();
        Ok(inner
            .reservations
            .values()
            .filter(|r| r.paid_at.is_some_and(|paid| paid >= from && paid < to))
            .cloned()
            .collect())
    }
}

// ============================================================================
// OrderStore
// ============================================================================

#[async_trait]
impl OrderStore for MemoryStore {
    async fn order(&self, id: OrderId) -> Result<Order> {
        self.lock()
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("order", id))
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut inner = self.lock();
        if inner.orders.contains_key(&order.id) {
            return Err(CoreError::Conflict(format!("order {} already exists", order.id)));
        }
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn settle(
        &self,
        id: OrderId,
        paid_at: DateTime<Utc>,
        entry: NewLedgerEntry,
        event: OutboxPayload,
    ) -> Result<(Order, Recorded)> {
        let mut inner = self.lock();
        let current = inner
            .orders
            .get(&id)
            .ok_or_else(|| CoreError::not_found("order", id))?
            .status;
        if current != OrderStatus::Pending {
            return Err(CoreError::invalid_state(
                format!("order {id}"),
                current.as_str(),
                "confirm payment",
            ));
        }

        let recorded = record_ledger(&mut inner, entry, paid_at)?;
        append_event(&mut inner, event, paid_at);
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("order", id))?;
        order.status = OrderStatus::Paid;
        order.paid_at = Some(paid_at);
        order.updated_at = paid_at;
        Ok((order.clone(), recorded))
    }

    async fn refund(
        &self,
        id: OrderId,
        at: DateTime<Utc>,
        entry: NewLedgerEntry,
        event: OutboxPayload,
    ) -> Result<(Order, Recorded)> {
        let mut inner = self.lock();
        let current = inner
            .orders
            .get(&id)
            .ok_or_else(|| CoreError::not_found("order", id))?
            .status;
        if current != OrderStatus::Paid {
            return Err(CoreError::invalid_state(
                format!("order {id}"),
                current.as_str(),
                "refund",
            ));
        }

        let recorded = record_ledger(&mut inner, entry, at)?;
        append_event(&mut inner, event, at);
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("order", id))?;
        order.status = OrderStatus::Refunded;
        order.updated_at = at;
        Ok((order.clone(), recorded))
    }

    async fn paid_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Order>> {
        let inner = self.lock();
        Ok(inner
            .orders
            .values()
            .filter(|o| o.paid_at.is_some_and(|paid| paid >= from && paid < to))
            .cloned()
            .collect())
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[async_trait]
impl Ledger for MemoryStore {
    async fn record(&self, entry: NewLedgerEntry) -> Result<Recorded> {
        let mut inner = self.lock();
        let now = entry.paid_at;
        record_ledger(&mut inner, entry, now)
    }

    async fn record_with_event(
        &self,
        entry: NewLedgerEntry,
        event: OutboxPayload,
    ) -> Result<Recorded> {
        let mut inner = self.lock();
        let now = entry.paid_at;
        let recorded = record_ledger(&mut inner, entry, now)?;
        if recorded.created {
            append_event(&mut inner, event, now);
        }
        Ok(recorded)
    }

    async fn find_by_source(
        &self,
        source_type: SourceType,
        source_id: Uuid,
        direction: Direction,
    ) -> Result<Option<LedgerEntry>> {
        let inner = self.lock();
        Ok(inner
            .ledger
            .iter()
            .find(|row| {
                row.source_type == source_type
                    && row.source_id == source_id
                    && row.direction == direction
            })
            .cloned())
    }

    async fn query(&self, filter: &LedgerFilter) -> Result<Page<LedgerEntry>> {
        let inner = self.lock();
        let mut matched: Vec<LedgerEntry> = inner
            .ledger
            .iter()
            .filter(|row| filter.matches(row))
            .filter(|row| match filter.court_id {
                None => true,
                Some(court_id) => {
                    row.source_type == SourceType::Reservation
                        && inner
                            .reservations
                            .get(&ReservationId::from_uuid(row.source_id))
                            .is_some_and(|r| r.court_id == court_id)
                }
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX))
            .take(filter.limit() as usize)
            .collect();
        Ok(Page {
            items,
            total,
            page: filter.page(),
            limit: filter.limit(),
        })
    }
}

// ============================================================================
// WalletStore
// ============================================================================

#[async_trait]
impl WalletStore for MemoryStore {
    async fn balance(&self, user: UserId) -> Result<Money> {
        let inner = self.lock();
        Ok(inner.balances.get(&user).copied().unwrap_or(Money::ZERO))
    }

    async fn entries(&self, user: UserId) -> Result<Vec<WalletEntry>> {
        let inner = self.lock();
        Ok(inner
            .wallet
            .iter()
            .filter(|row| row.user_id == user)
            .cloned()
            .collect())
    }

    async fn apply(&self, entry: NewWalletEntry, at: DateTime<Utc>) -> Result<WalletEntry> {
        let mut inner = self.lock();
        apply_wallet(&mut inner, entry, at)
    }

    async fn top_up(
        &self,
        entry: NewWalletEntry,
        ledger: NewLedgerEntry,
        at: DateTime<Utc>,
    ) -> Result<(WalletEntry, Recorded)> {
        let mut inner = self.lock();
        check_wallet(&inner, &entry)?;
        let recorded = record_ledger(&mut inner, ledger, at)?;
        let wallet = apply_wallet(&mut inner, entry, at)?;
        if recorded.created {
            append_event(
                &mut inner,
                OutboxPayload::WalletToppedUp {
                    user_id: wallet.user_id,
                    credits: wallet.credits,
                    balance_after: wallet.balance_after,
                },
                at,
            );
        }
        Ok((wallet, recorded))
    }
}

// ============================================================================
// OutboxStore
// ============================================================================

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn append(&self, payload: OutboxPayload, at: DateTime<Utc>) -> Result<OutboxEvent> {
        let mut inner = self.lock();
        Ok(append_event(&mut inner, payload, at))
    }

    async fn unprocessed(&self, limit: u32) -> Result<Vec<OutboxEvent>> {
        let inner = self.lock();
        Ok(inner
            .outbox
            .iter()
            .filter(|event| !event.processed)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, ids: &[OutboxEventId], at: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.lock();
        let mut changed = 0u64;
        for event in &mut inner.outbox {
            if ids.contains(&event.id) && !event.processed {
                event.processed = true;
                event.processed_at = Some(at);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn of_kind_between(
        &self,
        kind: EventKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>> {
        let inner = self.lock();
        Ok(inner
            .outbox
            .iter()
            .filter(|event| {
                event.payload.kind() == kind && event.created_at >= from && event.created_at < to
            })
            .cloned()
            .collect())
    }
}

// ============================================================================
// PromotionStore
// ============================================================================

#[async_trait]
impl PromotionStore for MemoryStore {
    async fn promotion_by_code(&self, code: &str) -> Result<Option<Promotion>> {
        let inner = self.lock();
        Ok(inner
            .promotions
            .values()
            .find(|promotion| promotion.code == code)
            .cloned())
    }

    async fn insert_promotion(&self, promotion: &Promotion) -> Result<()> {
        let mut inner = self.lock();
        if inner
            .promotions
            .values()
            .any(|existing| existing.code == promotion.code)
        {
            return Err(CoreError::Conflict(format!(
                "promotion code {} already exists",
                promotion.code
            )));
        }
        inner.promotions.insert(promotion.id, promotion.clone());
        Ok(())
    }

    async fn application_count(&self, promotion: PromotionId, user: UserId) -> Result<u64> {
        let inner = self.lock();
        Ok(inner
            .applications
            .iter()
            .filter(|a| a.promotion_id == promotion && a.user_id == user)
            .count() as u64)
    }

    async fn apply(
        &self,
        application: NewPromotionApplication,
        wallet: Option<NewWalletEntry>,
        event: OutboxPayload,
    ) -> Result<PromotionApplication> {
        let mut inner = self.lock();
        let promotion = inner
            .promotions
            .get(&application.promotion_id)
            .ok_or_else(|| CoreError::not_found("promotion", application.promotion_id))?
            .clone();

        if promotion.usage_count >= promotion.usage_limit {
            return Err(CoreError::Conflict("promotion usage limit reached".to_string()));
        }
        if !promotion.stackable
            && inner.applications.iter().any(|a| {
                a.promotion_id == application.promotion_id && a.user_id == application.user_id
            })
        {
            return Err(CoreError::Conflict(
                "promotion already applied to this account".to_string(),
            ));
        }
        if let Some(wallet) = &wallet {
            check_wallet(&inner, wallet)?;
        }

        let at = application.applied_at;
        let row = PromotionApplication {
            id: Uuid::new_v4(),
            promotion_id: application.promotion_id,
            user_id: application.user_id,
            credits_awarded: application.credits_awarded,
            applied_at: at,
        };
        inner.applications.push(row.clone());
        if let Some(promotion) = inner.promotions.get_mut(&application.promotion_id) {
            promotion.usage_count += 1;
        }
        if let Some(wallet) = wallet {
            apply_wallet(&mut inner, wallet, at)?;
        }
        append_event(&mut inner, event, at);
        Ok(row)
    }
}
