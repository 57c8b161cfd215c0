//! The append-only ledger model.
//!
//! A [`LedgerEntry`] records one financial movement. Rows are never updated
//! or deleted; corrections are new offsetting entries. The globally unique
//! [`IdempotencyKey`] is what makes every insert safe to retry, and the
//! logical `(source_type, source_id, direction)` triple is what
//! reconciliation uses to detect "already posted".

use crate::types::{CourtId, CurrencyCode, LedgerEntryId, Money, PaymentMethod, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Classification
// ============================================================================

/// The kind of source record a ledger entry is posted against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// A court reservation
    Reservation,
    /// A storefront order
    Order,
    /// A wallet top-up
    Topup,
    /// A membership purchase
    Membership,
}

impl SourceType {
    /// Stable string form used in storage and idempotency keys
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reservation => "RESERVATION",
            Self::Order => "ORDER",
            Self::Topup => "TOPUP",
            Self::Membership => "MEMBERSHIP",
        }
    }

    /// Parses the stable string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RESERVATION" => Some(Self::Reservation),
            "ORDER" => Some(Self::Order),
            "TOPUP" => Some(Self::Topup),
            "MEMBERSHIP" => Some(Self::Membership),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a movement: money in or money out
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Money in
    Credit,
    /// Money out
    Debit,
}

impl Direction {
    /// Stable string form used in storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "CREDIT",
            Self::Debit => "DEBIT",
        }
    }

    /// Parses the stable string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREDIT" => Some(Self::Credit),
            "DEBIT" => Some(Self::Debit),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement status carried on a ledger entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    /// Settled
    Paid,
    /// Reversed by a refund
    Refunded,
    /// Expected but not yet settled
    Pending,
}

impl SettlementStatus {
    /// Stable string form used in storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "PAID",
            Self::Refunded => "REFUNDED",
            Self::Pending => "PENDING",
        }
    }

    /// Parses the stable string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PAID" => Some(Self::Paid),
            "REFUNDED" => Some(Self::Refunded),
            "PENDING" => Some(Self::Pending),
            _ => None,
        }
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Idempotency keys
// ============================================================================

/// A string uniquely identifying one logical financial event.
///
/// Repeated attempts to record the same event collapse into a single stored
/// row through the ledger's unique constraint on this key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Payment for a reservation: `RESERVATION:<id>`
    #[must_use]
    pub fn reservation(id: crate::types::ReservationId) -> Self {
        Self(format!("RESERVATION:{id}"))
    }

    /// Refund of a reservation: `RESERVATION:<id>:REFUND[:<ref>]`
    #[must_use]
    pub fn reservation_refund(id: crate::types::ReservationId, reference: Option<&str>) -> Self {
        match reference {
            Some(reference) => Self(format!("RESERVATION:{id}:REFUND:{reference}")),
            None => Self(format!("RESERVATION:{id}:REFUND")),
        }
    }

    /// Payment for an order: `ORDER:<id>`
    #[must_use]
    pub fn order(id: crate::types::OrderId) -> Self {
        Self(format!("ORDER:{id}"))
    }

    /// Refund of an order: `ORDER:<id>:REFUND[:<ref>]`
    #[must_use]
    pub fn order_refund(id: crate::types::OrderId, reference: Option<&str>) -> Self {
        match reference {
            Some(reference) => Self(format!("ORDER:{id}:REFUND:{reference}")),
            None => Self(format!("ORDER:{id}:REFUND")),
        }
    }

    /// Wallet top-up: `TOPUP:<user>:<reference>`
    #[must_use]
    pub fn topup(user: UserId, reference: &str) -> Self {
        Self(format!("TOPUP:{user}:{reference}"))
    }

    /// Wallet debit paying for a reservation with credits:
    /// `RESERVATION:<id>:SPEND`
    #[must_use]
    pub fn reservation_spend(id: crate::types::ReservationId) -> Self {
        Self(format!("RESERVATION:{id}:SPEND"))
    }

    /// Wallet credit returned by a reservation refund:
    /// `RESERVATION:<id>:REFUND_CREDITS[:<ref>]`
    #[must_use]
    pub fn reservation_refund_credits(
        id: crate::types::ReservationId,
        reference: Option<&str>,
    ) -> Self {
        match reference {
            Some(reference) => Self(format!("RESERVATION:{id}:REFUND_CREDITS:{reference}")),
            None => Self(format!("RESERVATION:{id}:REFUND_CREDITS")),
        }
    }

    /// Membership purchase: `MEMBERSHIP:<id>`
    #[must_use]
    pub fn membership(id: Uuid) -> Self {
        Self(format!("MEMBERSHIP:{id}"))
    }

    /// Promotion grant: `<PROMO_TYPE>:<user>:<promotion>`
    #[must_use]
    pub fn promotion(kind: &str, user: UserId, promotion: crate::types::PromotionId) -> Self {
        Self(format!("{kind}:{user}:{promotion}"))
    }

    /// Backfill by the reconciliation job: `RECON:<KIND>:<source>[:<ref>]`
    #[must_use]
    pub fn reconciliation(kind: &str, source_id: Uuid, reference: Option<&str>) -> Self {
        match reference {
            Some(reference) => Self(format!("RECON:{kind}:{source_id}:{reference}")),
            None => Self(format!("RECON:{kind}:{source_id}")),
        }
    }

    /// Wraps a raw key (boundary input)
    #[must_use]
    pub const fn raw(key: String) -> Self {
        Self(key)
    }

    /// Returns the key string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Structured annotation attached to a ledger entry.
///
/// A closed union keyed by origin; `Note` is the fallback for truly ad-hoc
/// annotations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerMetadata {
    /// Posted by the payment-confirmation path
    Gateway {
        /// Gateway transaction reference
        reference: String,
    },
    /// Posted against a discounted amount
    Discounted {
        /// Promotion code applied
        code: String,
        /// Price before the discount
        original: Money,
    },
    /// Backfilled by the reconciliation job
    Reconciled {
        /// Reconciliation category (RESERVATION, ORDER, REFUND)
        category: String,
        /// When the backfill ran
        run_at: DateTime<Utc>,
    },
    /// Manual staff action
    Staff {
        /// Free-text justification
        note: String,
    },
    /// Ad-hoc annotation
    Note(String),
}

// ============================================================================
// Entries
// ============================================================================

/// An immutable record of one financial movement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry identifier
    pub id: LedgerEntryId,
    /// Kind of source record
    pub source_type: SourceType,
    /// Identifier of the source record
    pub source_id: Uuid,
    /// Money in or out
    pub direction: Direction,
    /// Amount, non-negative, tax-inclusive
    pub amount: Money,
    /// Currency of the amount
    pub currency: CurrencyCode,
    /// Collection method
    pub method: PaymentMethod,
    /// Settlement status
    pub status: SettlementStatus,
    /// When the money moved
    pub paid_at: DateTime<Utc>,
    /// Gateway reference, when the gateway reported one
    pub gateway_reference: Option<String>,
    /// Unique key collapsing retries of the same logical event
    pub idempotency_key: IdempotencyKey,
    /// Structured annotation
    pub metadata: Option<LedgerMetadata>,
    /// When the row was inserted
    pub created_at: DateTime<Utc>,
}

/// A ledger entry ready to be recorded
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    /// Kind of source record
    pub source_type: SourceType,
    /// Identifier of the source record
    pub source_id: Uuid,
    /// Money in or out
    pub direction: Direction,
    /// Amount, non-negative, tax-inclusive
    pub amount: Money,
    /// Currency of the amount
    pub currency: CurrencyCode,
    /// Collection method
    pub method: PaymentMethod,
    /// Settlement status
    pub status: SettlementStatus,
    /// When the money moved
    pub paid_at: DateTime<Utc>,
    /// Gateway reference, when the gateway reported one
    pub gateway_reference: Option<String>,
    /// Unique key collapsing retries of the same logical event
    pub idempotency_key: IdempotencyKey,
    /// Structured annotation
    pub metadata: Option<LedgerMetadata>,
}

/// Outcome of [`crate::store::Ledger::record`]
#[derive(Clone, Debug)]
pub struct Recorded {
    /// The stored entry (freshly inserted or pre-existing)
    pub entry: LedgerEntry,
    /// True when this call inserted the row
    pub created: bool,
}

// ============================================================================
// Queries
// ============================================================================

/// Filters for the reporting/reconciliation query surface
#[derive(Clone, Debug, Default)]
pub struct LedgerFilter {
    /// Restrict to a source type
    pub source_type: Option<SourceType>,
    /// Restrict to a direction
    pub direction: Option<Direction>,
    /// Restrict to a collection method
    pub method: Option<PaymentMethod>,
    /// Restrict to a settlement status
    pub status: Option<SettlementStatus>,
    /// Restrict to entries whose reservation sits on this court
    pub court_id: Option<CourtId>,
    /// Lower bound on `paid_at` (inclusive)
    pub date_from: Option<DateTime<Utc>>,
    /// Upper bound on `paid_at` (exclusive)
    pub date_to: Option<DateTime<Utc>>,
    /// 1-based page number
    pub page: u32,
    /// Page size (capped by implementations)
    pub limit: u32,
}

impl LedgerFilter {
    /// Maximum rows a single page may return
    pub const MAX_LIMIT: u32 = 500;

    /// Normalized page number (minimum 1)
    #[must_use]
    pub const fn page(&self) -> u32 {
        if self.page == 0 { 1 } else { self.page }
    }

    /// Normalized page size (1..=[`Self::MAX_LIMIT`], default 50)
    #[must_use]
    pub const fn limit(&self) -> u32 {
        if self.limit == 0 {
            50
        } else if self.limit > Self::MAX_LIMIT {
            Self::MAX_LIMIT
        } else {
            self.limit
        }
    }

    /// Row offset for the normalized page
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page() as u64 - 1) * self.limit() as u64
    }

    /// Whether an entry matches every set filter (used by in-memory stores)
    #[must_use]
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.source_type.is_none_or(|s| entry.source_type == s)
            && self.direction.is_none_or(|d| entry.direction == d)
            && self.method.is_none_or(|m| entry.method == m)
            && self.status.is_none_or(|s| entry.status == s)
            && self.date_from.is_none_or(|from| entry.paid_at >= from)
            && self.date_to.is_none_or(|to| entry.paid_at < to)
    }
}

/// One page of query results
#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    /// Rows on this page
    pub items: Vec<T>,
    /// Total rows matching the filter
    pub total: u64,
    /// 1-based page number
    pub page: u32,
    /// Page size used
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReservationId;

    #[test]
    fn keys_are_deterministic_per_logical_event() {
        let id = ReservationId::new();
        assert_eq!(
            IdempotencyKey::reservation(id),
            IdempotencyKey::reservation(id)
        );
        assert_ne!(
            IdempotencyKey::reservation(id),
            IdempotencyKey::reservation_refund(id, None)
        );
        assert_eq!(
            IdempotencyKey::reservation_refund(id, Some("rf_1")).as_str(),
            format!("RESERVATION:{id}:REFUND:rf_1")
        );
    }

    #[test]
    fn filter_normalizes_pagination() {
        let filter = LedgerFilter::default();
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.limit(), 50);
        assert_eq!(filter.offset(), 0);

        let filter = LedgerFilter {
            page: 3,
            limit: 10_000,
            ..LedgerFilter::default()
        };
        assert_eq!(filter.limit(), LedgerFilter::MAX_LIMIT);
        assert_eq!(filter.offset(), 2 * u64::from(LedgerFilter::MAX_LIMIT));
    }
}
