//! Transactional outbox event log.
//!
//! Events are appended in the same transaction as the state change they
//! describe, so downstream consumers (notifications, audit) can replay them
//! reliably even when they were down at the time. Consumers poll unprocessed
//! rows and mark them processed; delivery is at-least-once.

use crate::types::{
    CourtId, Money, OrderId, OutboxEventId, PaymentMethod, PromotionId, ReservationId, UserId,
};
use crate::ledger::SourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag identifying the kind of an outbox event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A stale unpaid reservation was reclaimed by the timeout sweep
    ReservationAutoCancelled,
    /// A payment was recorded in the ledger
    PaymentRecorded,
    /// A reservation was refunded
    ReservationRefunded,
    /// An order was refunded
    OrderRefunded,
    /// Staff overrode a reservation price
    PriceOverride,
    /// A wallet was topped up
    WalletToppedUp,
    /// A promotion was applied to a user
    PromotionApplied,
}

impl EventKind {
    /// Stable string form used in storage and filters
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReservationAutoCancelled => "RESERVATION_AUTO_CANCELLED",
            Self::PaymentRecorded => "PAYMENT_RECORDED",
            Self::ReservationRefunded => "RESERVATION_REFUNDED",
            Self::OrderRefunded => "ORDER_REFUNDED",
            Self::PriceOverride => "PRICE_OVERRIDE",
            Self::WalletToppedUp => "WALLET_TOPPED_UP",
            Self::PromotionApplied => "PROMOTION_APPLIED",
        }
    }

    /// Parses the stable string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RESERVATION_AUTO_CANCELLED" => Some(Self::ReservationAutoCancelled),
            "PAYMENT_RECORDED" => Some(Self::PaymentRecorded),
            "RESERVATION_REFUNDED" => Some(Self::ReservationRefunded),
            "ORDER_REFUNDED" => Some(Self::OrderRefunded),
            "PRICE_OVERRIDE" => Some(Self::PriceOverride),
            "WALLET_TOPPED_UP" => Some(Self::WalletToppedUp),
            "PROMOTION_APPLIED" => Some(Self::PromotionApplied),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured payload of an outbox event.
///
/// One closed variant per [`EventKind`]; the payload shape of each event is
/// checked at compile time rather than carried as an untyped map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxPayload {
    /// A stale unpaid reservation was reclaimed by the timeout sweep
    ReservationAutoCancelled {
        /// The reclaimed reservation
        reservation_id: ReservationId,
        /// Booking user, for the notification consumer
        user_id: UserId,
        /// Minutes the reservation sat unpaid
        elapsed_minutes: i64,
    },
    /// A payment was recorded in the ledger
    PaymentRecorded {
        /// Kind of source record the money was posted against
        source_type: SourceType,
        /// Identifier of the source record
        source_id: uuid::Uuid,
        /// Amount recorded
        amount: Money,
        /// Collection method
        method: PaymentMethod,
    },
    /// A reservation was refunded
    ReservationRefunded {
        /// The refunded reservation
        reservation_id: ReservationId,
        /// Booking user
        user_id: UserId,
        /// Amount returned
        amount: Money,
        /// Gateway refund reference, when present
        refund_reference: Option<String>,
    },
    /// An order was refunded
    OrderRefunded {
        /// The refunded order
        order_id: OrderId,
        /// Ordering user
        user_id: UserId,
        /// Amount returned
        amount: Money,
        /// Gateway refund reference, when present
        refund_reference: Option<String>,
    },
    /// Staff overrode a reservation price
    PriceOverride {
        /// The repriced reservation
        reservation_id: ReservationId,
        /// Court, for audit context
        court_id: CourtId,
        /// Price before the override
        old_price: Money,
        /// Price after the override
        new_price: Money,
        /// Staff justification
        note: String,
    },
    /// A wallet was topped up
    WalletToppedUp {
        /// Credited user
        user_id: UserId,
        /// Credits added
        credits: Money,
        /// Balance after the top-up
        balance_after: Money,
    },
    /// A promotion was applied to a user
    PromotionApplied {
        /// The promotion
        promotion_id: PromotionId,
        /// Promotion code, for the notification consumer
        code: String,
        /// Benefiting user
        user_id: UserId,
        /// Wallet credits granted, zero for pure discounts
        credits_awarded: Money,
    },
}

impl OutboxPayload {
    /// The tag under which this payload is stored
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ReservationAutoCancelled { .. } => EventKind::ReservationAutoCancelled,
            Self::PaymentRecorded { .. } => EventKind::PaymentRecorded,
            Self::ReservationRefunded { .. } => EventKind::ReservationRefunded,
            Self::OrderRefunded { .. } => EventKind::OrderRefunded,
            Self::PriceOverride { .. } => EventKind::PriceOverride,
            Self::WalletToppedUp { .. } => EventKind::WalletToppedUp,
            Self::PromotionApplied { .. } => EventKind::PromotionApplied,
        }
    }
}

/// One appended outbox row
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Unique event identifier
    pub id: OutboxEventId,
    /// Structured payload (its tag is the event type)
    pub payload: OutboxPayload,
    /// When the row was appended
    pub created_at: DateTime<Utc>,
    /// Whether an at-least-once consumer has acknowledged the row
    pub processed: bool,
    /// When it was acknowledged
    pub processed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_event_tag() {
        let payload = OutboxPayload::WalletToppedUp {
            user_id: UserId::new(),
            credits: Money::from_euros(10),
            balance_after: Money::from_euros(25),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["event"], "WALLET_TOPPED_UP");
        assert_eq!(json["credits"], 1000);

        let back: OutboxPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn payload_kind_matches_tag() {
        let payload = OutboxPayload::ReservationAutoCancelled {
            reservation_id: ReservationId::new(),
            user_id: UserId::new(),
            elapsed_minutes: 17,
        };
        assert_eq!(payload.kind(), EventKind::ReservationAutoCancelled);
        assert_eq!(
            EventKind::parse(payload.kind().as_str()),
            Some(EventKind::ReservationAutoCancelled)
        );
    }
}
