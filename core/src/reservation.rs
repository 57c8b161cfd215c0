//! Reservation entity and its lifecycle state machine.
//!
//! Transitions follow `PENDING → {PAID, CANCELLED}`,
//! `PAID → {IN_PROGRESS, CANCELLED, NO_SHOW}`, `IN_PROGRESS → {COMPLETED}`.
//! `CANCELLED`, `COMPLETED` and `NO_SHOW` are terminal: the record becomes
//! immutable except for append-only notes.

use crate::error::CoreError;
use crate::types::{Activity, CourtId, Money, PaymentMethod, ReservationId, TimeSlot, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a reservation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Created, awaiting payment; expires after the configured timeout
    Pending,
    /// Payment recorded
    Paid,
    /// Player checked in, slot in use
    InProgress,
    /// Slot used and closed out
    Completed,
    /// Cancelled before use (with or without refund)
    Cancelled,
    /// Paid but the player never showed up
    NoShow,
}

impl ReservationStatus {
    /// Stable string form used in storage and query parameters
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::NoShow => "NO_SHOW",
        }
    }

    /// Parses the stable string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "PAID" => Some(Self::Paid),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            "NO_SHOW" => Some(Self::NoShow),
            _ => None,
        }
    }

    /// Whether the status admits no further transitions
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::NoShow)
    }

    /// Whether `self → to` is a legal transition.
    ///
    /// The match is exhaustive on the source state so that adding a status
    /// forces this table to be revisited.
    #[must_use]
    pub const fn allows(&self, to: Self) -> bool {
        match self {
            Self::Pending => matches!(to, Self::Paid | Self::Cancelled),
            Self::Paid => matches!(to, Self::InProgress | Self::Cancelled | Self::NoShow),
            Self::InProgress => matches!(to, Self::Completed | Self::Cancelled),
            Self::Cancelled | Self::Completed | Self::NoShow => false,
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A court booking
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation identifier
    pub id: ReservationId,
    /// Booking user
    pub user_id: UserId,
    /// Booked court
    pub court_id: CourtId,
    /// Activity played
    pub activity: Activity,
    /// Booked time slot
    pub slot: TimeSlot,
    /// Price, tax-inclusive
    pub price: Money,
    /// Payment method (declared at creation, confirmed at settlement)
    pub method: PaymentMethod,
    /// Lifecycle status
    pub status: ReservationStatus,
    /// When an unpaid reservation is reclaimed by the timeout sweep
    pub expires_at: DateTime<Utc>,
    /// When payment was recorded, if it was
    pub paid_at: Option<DateTime<Utc>>,
    /// Append-only free-text notes
    pub notes: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Validates `self.status → to`, naming the operation in the error.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] when the transition is not in the
    /// state machine.
    pub fn ensure_transition(&self, to: ReservationStatus, operation: &str) -> Result<(), CoreError> {
        if self.status.allows(to) {
            Ok(())
        } else {
            Err(CoreError::invalid_state(
                format!("reservation {}", self.id),
                self.status.as_str(),
                operation,
            ))
        }
    }
}

/// Request to create a reservation
#[derive(Clone, Debug, Deserialize)]
pub struct NewReservation {
    /// Booking user
    pub user_id: UserId,
    /// Court to book
    pub court_id: CourtId,
    /// Activity to play
    pub activity: Activity,
    /// Slot start
    pub start: DateTime<Utc>,
    /// Slot end
    pub end: DateTime<Utc>,
    /// Tax-inclusive price
    pub price: Money,
    /// Declared payment method
    pub method: PaymentMethod,
}

impl NewReservation {
    /// Validates shape and range, producing the slot.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] when `end <= start`.
    pub fn slot(&self) -> Result<TimeSlot, CoreError> {
        TimeSlot::new(self.start, self.end)
            .ok_or_else(|| CoreError::Validation("end time must be after start time".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_be_paid_or_cancelled() {
        assert!(ReservationStatus::Pending.allows(ReservationStatus::Paid));
        assert!(ReservationStatus::Pending.allows(ReservationStatus::Cancelled));
        assert!(!ReservationStatus::Pending.allows(ReservationStatus::Completed));
        assert!(!ReservationStatus::Pending.allows(ReservationStatus::InProgress));
    }

    #[test]
    fn terminal_states_allow_nothing() {
        for terminal in [
            ReservationStatus::Cancelled,
            ReservationStatus::Completed,
            ReservationStatus::NoShow,
        ] {
            assert!(terminal.is_terminal());
            for to in [
                ReservationStatus::Pending,
                ReservationStatus::Paid,
                ReservationStatus::InProgress,
                ReservationStatus::Completed,
                ReservationStatus::Cancelled,
                ReservationStatus::NoShow,
            ] {
                assert!(!terminal.allows(to), "{terminal} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn completed_cannot_go_back_to_paid() {
        assert!(!ReservationStatus::Completed.allows(ReservationStatus::Paid));
    }

    #[test]
    fn paid_flow_reaches_completed() {
        assert!(ReservationStatus::Paid.allows(ReservationStatus::InProgress));
        assert!(ReservationStatus::InProgress.allows(ReservationStatus::Completed));
        assert!(ReservationStatus::Paid.allows(ReservationStatus::NoShow));
    }
}
