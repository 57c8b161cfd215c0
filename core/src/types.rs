//! Shared value objects for the Courtbook domain.
//!
//! Newtype identifiers, the cents-based `Money` value object, payment
//! methods and the court/activity model used by the booking conflict rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner `Uuid`
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a user
    UserId
);
uuid_id!(
    /// Unique identifier for a reservation
    ReservationId
);
uuid_id!(
    /// Unique identifier for a court
    CourtId
);
uuid_id!(
    /// Unique identifier for a storefront order
    OrderId
);
uuid_id!(
    /// Unique identifier for a promotion
    PromotionId
);
uuid_id!(
    /// Unique identifier for a ledger entry
    LedgerEntryId
);
uuid_id!(
    /// Unique identifier for an outbox event
    OutboxEventId
);
uuid_id!(
    /// Unique identifier for a wallet ledger entry
    WalletEntryId
);

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in euro cents to avoid floating-point arithmetic errors.
///
/// Amounts are non-negative by construction; direction is carried separately
/// by ledger entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// The zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole euros with overflow checking
    #[must_use]
    pub const fn checked_from_euros(euros: u64) -> Option<Self> {
        match euros.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Creates a `Money` value from whole euros
    ///
    /// # Panics
    ///
    /// Panics if the conversion would overflow (`euros * 100 > u64::MAX`).
    /// Use [`Money::checked_from_euros`] for non-panicking conversion.
    #[must_use]
    #[allow(clippy::panic)]
    pub const fn from_euros(euros: u64) -> Self {
        match Self::checked_from_euros(euros) {
            Some(money) => money,
            None => panic!("Money::from_euros overflow"),
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Subtracts `other` (returns `None` if the result would be negative)
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self(self.0 - other.0))
        } else {
            None
        }
    }

    /// Subtracts `other`, clamping at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Computes `percent`% of the amount, rounded down to the cent
    #[must_use]
    pub const fn percent(self, percent: u32) -> Option<Self> {
        match self.0.checked_mul(percent as u64) {
            Some(product) => Some(Self(product / 100)),
            None => None,
        }
    }

    /// Tax portion included in a tax-inclusive amount at a flat rate.
    ///
    /// `included = total − total / (1 + rate)`, computed in cents with the
    /// net part rounded to nearest. Prices in Courtbook are stored
    /// tax-inclusive; this is only used for reporting breakdowns.
    #[must_use]
    pub const fn included_tax(self, rate_percent: u32) -> Self {
        let divisor = 100 + rate_percent as u64;
        let net = (self.0 * 100 + divisor / 2) / divisor;
        Self(self.0 - net)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "€{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// ISO 4217 currency code carried on ledger rows.
///
/// Courtbook is single-currency; the code keeps rows self-describing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrencyCode {
    /// Euro
    #[default]
    #[serde(rename = "EUR")]
    Eur,
}

impl CurrencyCode {
    /// Returns the ISO code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eur => "EUR",
        }
    }

    /// Parses an ISO code
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "EUR" => Some(Self::Eur),
            _ => None,
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payment Methods
// ============================================================================

/// How a payment was (or will be) collected
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Card gateway payment
    Card,
    /// Cash at the counter
    Cash,
    /// Bank transfer
    Transfer,
    /// Paid on site (method decided at the desk)
    Onsite,
    /// Store credit from the user wallet
    Credits,
    /// Bizum mobile payment
    Bizum,
    /// Courtesy booking, no money collected
    Courtesy,
}

impl PaymentMethod {
    /// Stable string form used in storage and query parameters
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "CARD",
            Self::Cash => "CASH",
            Self::Transfer => "TRANSFER",
            Self::Onsite => "ONSITE",
            Self::Credits => "CREDITS",
            Self::Bizum => "BIZUM",
            Self::Courtesy => "COURTESY",
        }
    }

    /// Parses the stable string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CARD" => Some(Self::Card),
            "CASH" => Some(Self::Cash),
            "TRANSFER" => Some(Self::Transfer),
            "ONSITE" => Some(Self::Onsite),
            "CREDITS" => Some(Self::Credits),
            "BIZUM" => Some(Self::Bizum),
            "COURTESY" => Some(Self::Courtesy),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Courts and Activities
// ============================================================================

/// Activity a court can host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Activity {
    /// Padel
    Padel,
    /// Tennis
    Tennis,
    /// Pickleball
    Pickleball,
    /// Badminton
    Badminton,
}

impl Activity {
    /// Stable string form used in storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Padel => "PADEL",
            Self::Tennis => "TENNIS",
            Self::Pickleball => "PICKLEBALL",
            Self::Badminton => "BADMINTON",
        }
    }

    /// Parses the stable string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PADEL" => Some(Self::Padel),
            "TENNIS" => Some(Self::Tennis),
            "PICKLEBALL" => Some(Self::Pickleball),
            "BADMINTON" => Some(Self::Badminton),
            _ => None,
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bookable court.
///
/// A court has one primary activity and an optional set of secondary
/// activities that may share the court concurrently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Court {
    /// Unique court identifier
    pub id: CourtId,
    /// Display name (e.g. "Center Court 1")
    pub name: String,
    /// The court's primary activity
    pub primary_activity: Activity,
    /// Secondary activities allowed to share the court with each other
    pub compatible_secondary: Vec<Activity>,
}

impl Court {
    /// Decides whether two overlapping bookings conflict on this court.
    ///
    /// Two activities may share the court only when both are members of the
    /// compatible-secondary set; the primary activity always conflicts with
    /// everything (itself included).
    #[must_use]
    pub fn conflicts(&self, new: Activity, existing: Activity) -> bool {
        let both_secondary = self.compatible_secondary.contains(&new)
            && self.compatible_secondary.contains(&existing);
        !both_secondary
    }
}

/// Half-open time slot `[start, end)` used for overlap checks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// Slot start (inclusive)
    pub start: DateTime<Utc>,
    /// Slot end (exclusive)
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    /// Creates a slot, rejecting empty or inverted ranges
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }

    /// Checks whether two slots overlap
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn money_display_and_percent() {
        let amount = Money::from_cents(1250);
        assert_eq!(amount.to_string(), "€12.50");
        assert_eq!(amount.percent(10), Some(Money::from_cents(125)));
        assert_eq!(Money::from_euros(2).checked_sub(Money::from_euros(3)), None);
    }

    #[test]
    fn included_tax_is_total_minus_net() {
        // €121.00 tax-inclusive at 21% → €21.00 tax
        let total = Money::from_cents(12_100);
        assert_eq!(total.included_tax(21), Money::from_cents(2_100));
        assert_eq!(Money::ZERO.included_tax(21), Money::ZERO);
    }

    #[test]
    fn primary_activity_always_conflicts() {
        let court = Court {
            id: CourtId::new(),
            name: "Court 1".to_string(),
            primary_activity: Activity::Padel,
            compatible_secondary: vec![Activity::Pickleball, Activity::Badminton],
        };

        assert!(court.conflicts(Activity::Padel, Activity::Padel));
        assert!(court.conflicts(Activity::Padel, Activity::Pickleball));
        assert!(court.conflicts(Activity::Tennis, Activity::Pickleball));
        assert!(!court.conflicts(Activity::Pickleball, Activity::Badminton));
        assert!(!court.conflicts(Activity::Badminton, Activity::Badminton));
    }

    #[test]
    fn slot_overlap_is_half_open() {
        let at = |h| Utc.with_ymd_and_hms(2026, 8, 6, h, 0, 0).unwrap();
        let morning = TimeSlot::new(at(9), at(10)).unwrap();
        let adjacent = TimeSlot::new(at(10), at(11)).unwrap();
        let inside = TimeSlot::new(at(9), at(11)).unwrap();

        assert!(!morning.overlaps(&adjacent));
        assert!(morning.overlaps(&inside));
        assert!(TimeSlot::new(at(10), at(10)).is_none());
    }

    #[test]
    fn method_round_trips_through_storage_form() {
        for method in [
            PaymentMethod::Card,
            PaymentMethod::Cash,
            PaymentMethod::Transfer,
            PaymentMethod::Onsite,
            PaymentMethod::Credits,
            PaymentMethod::Bizum,
            PaymentMethod::Courtesy,
        ] {
            assert_eq!(PaymentMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(PaymentMethod::parse("GOLD"), None);
    }
}
