//! Minimal storefront order model.
//!
//! Orders share the payment-confirmation and reconciliation paths with
//! reservations; the storefront itself (catalog, cart, stock) is outside
//! this core.

use crate::error::CoreError;
use crate::types::{Money, OrderId, PaymentMethod, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, awaiting payment
    Pending,
    /// Payment recorded
    Paid,
    /// Reversed by a refund
    Refunded,
}

impl OrderStatus {
    /// Stable string form used in storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Parses the stable string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "PAID" => Some(Self::Paid),
            "REFUNDED" => Some(Self::Refunded),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A storefront order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier
    pub id: OrderId,
    /// Ordering user
    pub user_id: UserId,
    /// Total, tax-inclusive
    pub total: Money,
    /// Declared payment method
    pub method: PaymentMethod,
    /// Lifecycle status
    pub status: OrderStatus,
    /// When payment was recorded, if it was
    pub paid_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Validates that the order can accept a payment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] unless the order is `PENDING`.
    pub fn ensure_payable(&self) -> Result<(), CoreError> {
        if self.status == OrderStatus::Pending {
            Ok(())
        } else {
            Err(CoreError::invalid_state(
                format!("order {}", self.id),
                self.status.as_str(),
                "confirm payment",
            ))
        }
    }

    /// Validates that the order can be refunded.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] unless the order is `PAID`.
    pub fn ensure_refundable(&self) -> Result<(), CoreError> {
        if self.status == OrderStatus::Paid {
            Ok(())
        } else {
            Err(CoreError::invalid_state(
                format!("order {}", self.id),
                self.status.as_str(),
                "refund",
            ))
        }
    }
}
