//! Wallet ledger entries and the balance projection model.
//!
//! Every store-credit movement is a [`WalletEntry`] whose `balance_after`
//! is the user's running balance strictly after applying it. The user's
//! cached `credits_balance` field is updated in the same transaction; the
//! sum of all of a user's entries must equal the cache at all times.

use crate::ledger::IdempotencyKey;
use crate::types::{Money, UserId, WalletEntryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a wallet movement
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletDirection {
    /// Credits added
    Credit,
    /// Credits spent or clawed back
    Debit,
}

impl WalletDirection {
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

impl fmt::Display for WalletDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why credits moved
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletReason {
    /// User bought credits
    Topup,
    /// Credits spent on a booking or order
    Spend,
    /// Credits returned by a refund
    Refund,
    /// Promotional bonus
    Promo,
}

impl WalletReason {
    /// Stable string form used in storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Topup => "TOPUP",
            Self::Spend => "SPEND",
            Self::Refund => "REFUND",
            Self::Promo => "PROMO",
        }
    }

    /// Parses the stable string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "TOPUP" => Some(Self::Topup),
            "SPEND" => Some(Self::Spend),
            "REFUND" => Some(Self::Refund),
            "PROMO" => Some(Self::Promo),
            _ => None,
        }
    }
}

impl fmt::Display for WalletReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored wallet movement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletEntry {
    /// Unique entry identifier
    pub id: WalletEntryId,
    /// Wallet owner
    pub user_id: UserId,
    /// Movement direction
    pub direction: WalletDirection,
    /// Why the credits moved
    pub reason: WalletReason,
    /// Credits moved, non-negative
    pub credits: Money,
    /// Running balance strictly after this entry
    pub balance_after: Money,
    /// Unique key collapsing retries of the same logical movement
    pub idempotency_key: IdempotencyKey,
    /// When the row was inserted
    pub created_at: DateTime<Utc>,
}

/// A wallet movement ready to be applied
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewWalletEntry {
    /// Wallet owner
    pub user_id: UserId,
    /// Movement direction
    pub direction: WalletDirection,
    /// Why the credits moved
    pub reason: WalletReason,
    /// Credits to move, non-negative
    pub credits: Money,
    /// Unique key collapsing retries of the same logical movement
    pub idempotency_key: IdempotencyKey,
}

impl NewWalletEntry {
    /// Computes the balance after applying this entry to `balance`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::CoreError::InsufficientCredits`] when a debit
    /// would overdraw, and [`crate::error::CoreError::Validation`] on credit
    /// overflow.
    pub fn balance_after(&self, balance: Money) -> crate::error::Result<Money> {
        match self.direction {
            WalletDirection::Credit => balance.checked_add(self.credits).ok_or_else(|| {
                crate::error::CoreError::Validation("wallet balance overflow".to_string())
            }),
            WalletDirection::Debit => balance.checked_sub(self.credits).ok_or(
                crate::error::CoreError::InsufficientCredits {
                    balance,
                    requested: self.credits,
                },
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry(direction: WalletDirection, credits: Money) -> NewWalletEntry {
        let user = UserId::new();
        NewWalletEntry {
            user_id: user,
            direction,
            reason: WalletReason::Topup,
            credits,
            idempotency_key: IdempotencyKey::topup(user, "t-1"),
        }
    }

    #[test]
    fn credit_raises_balance() {
        let after = entry(WalletDirection::Credit, Money::from_euros(10))
            .balance_after(Money::from_euros(5))
            .unwrap();
        assert_eq!(after, Money::from_euros(15));
    }

    #[test]
    fn debit_cannot_overdraw() {
        let result = entry(WalletDirection::Debit, Money::from_euros(10))
            .balance_after(Money::from_euros(5));
        assert!(matches!(
            result,
            Err(crate::error::CoreError::InsufficientCredits { .. })
        ));
    }
}
