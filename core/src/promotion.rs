//! Promotions: validation rules and reward math.
//!
//! A promotion is looked up by code, gated on status, validity window,
//! usage budget and time-of-day/day-of-week conditions, and then quoted
//! against a monetary amount. Application (the non-replayable grant) is an
//! atomic store operation; this module holds the pure rules.

use crate::types::{Money, PromotionId, UserId};
use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Promotion entity
// ============================================================================

/// Whether a promotion is currently offered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionStatus {
    /// Offered
    Active,
    /// Switched off by staff
    Inactive,
}

impl PromotionStatus {
    /// Stable string form used in storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }

    /// Parses the stable string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(Self::Active),
            "INACTIVE" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// What a promotion grants
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionReward {
    /// Fixed discount off the transaction amount
    DiscountFixed {
        /// Discount value (capped at the transaction amount)
        value: Money,
    },
    /// Percentage discount off the transaction amount
    DiscountPercent {
        /// Percent (0..=100)
        percent: u32,
        /// Optional cap on the computed discount
        max_reward: Option<Money>,
    },
    /// Flat wallet credit unrelated to the transaction amount
    FixedCredits {
        /// Credits granted
        credits: Money,
    },
}

impl PromotionReward {
    /// Storage tag, also the first segment of the grant's idempotency key
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DiscountFixed { .. } => "DISCOUNT_FIXED",
            Self::DiscountPercent { .. } => "DISCOUNT_PERCENT",
            Self::FixedCredits { .. } => "FIXED_CREDITS",
        }
    }
}

/// Time-of-day / day-of-week gates on a promotion
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PromotionConditions {
    /// Days of week the promotion applies on (empty = every day)
    pub allowed_days: Vec<Weekday>,
    /// Earliest applicable time of day (inclusive)
    pub from_time: Option<NaiveTime>,
    /// Latest applicable time of day (exclusive)
    pub until_time: Option<NaiveTime>,
}

impl PromotionConditions {
    /// Whether `now` satisfies the gates
    #[must_use]
    pub fn allows(&self, now: DateTime<Utc>) -> bool {
        if !self.allowed_days.is_empty() && !self.allowed_days.contains(&now.weekday()) {
            return false;
        }
        let time = NaiveTime::from_hms_opt(now.hour(), now.minute(), now.second())
            .unwrap_or(NaiveTime::MIN);
        if self.from_time.is_some_and(|from| time < from) {
            return false;
        }
        if self.until_time.is_some_and(|until| time >= until) {
            return false;
        }
        true
    }
}

/// A promotional code and its rules
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    /// Unique promotion identifier
    pub id: PromotionId,
    /// Code users type in
    pub code: String,
    /// Offered or switched off
    pub status: PromotionStatus,
    /// What it grants
    pub reward: PromotionReward,
    /// Validity window start (inclusive)
    pub valid_from: DateTime<Utc>,
    /// Validity window end (inclusive)
    pub valid_to: DateTime<Utc>,
    /// Total number of applications allowed
    pub usage_limit: u32,
    /// Applications so far
    pub usage_count: u32,
    /// Whether one user may apply it more than once
    pub stackable: bool,
    /// Time gates
    pub conditions: PromotionConditions,
}

// ============================================================================
// Validation
// ============================================================================

/// Why a promotion did not apply
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionRejection {
    /// No active promotion carries the code
    CodeNotFound,
    /// The promotion is switched off
    Inactive,
    /// `now` is before the validity window
    NotYetActive,
    /// `now` is past the validity window
    Expired,
    /// The usage budget is spent
    UsageExhausted,
    /// Outside the allowed time-of-day/day-of-week window
    OutsideAllowedWindow,
    /// A non-stackable promotion was already applied to this user
    AlreadyApplied,
}

impl fmt::Display for PromotionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::CodeNotFound => "promotion code not found",
            Self::Inactive => "promotion is inactive",
            Self::NotYetActive => "promotion is not active yet",
            Self::Expired => "promotion has expired",
            Self::UsageExhausted => "promotion usage limit reached",
            Self::OutsideAllowedWindow => "promotion not valid at this time",
            Self::AlreadyApplied => "promotion already applied to this account",
        };
        f.write_str(text)
    }
}

/// A successfully validated promotion, priced against an amount
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PromotionQuote {
    /// The validated promotion
    pub promotion_id: PromotionId,
    /// Its code
    pub code: String,
    /// Reward kind tag
    pub reward_kind: &'static str,
    /// Amount before the promotion
    pub original_amount: Money,
    /// Amount after any discount
    pub final_amount: Money,
    /// Discount taken off the amount
    pub savings: Money,
    /// Wallet credits granted (credit-bonus types only)
    pub credits_awarded: Money,
}

/// Outcome of validating a code
#[derive(Clone, Debug, PartialEq)]
pub enum PromotionOutcome {
    /// The code applies; here is the quote
    Approved(PromotionQuote),
    /// The code does not apply, with the reason
    Rejected(PromotionRejection),
}

impl Promotion {
    /// Validates the promotion against `amount` at `now` and computes the
    /// reward. Does not check per-user constraints; the caller supplies
    /// `already_applied` from the application records.
    #[must_use]
    pub fn quote(
        &self,
        amount: Money,
        now: DateTime<Utc>,
        already_applied: bool,
    ) -> Result<PromotionQuote, PromotionRejection> {
        if self.status != PromotionStatus::Active {
            return Err(PromotionRejection::Inactive);
        }
        if now < self.valid_from {
            return Err(PromotionRejection::NotYetActive);
        }
        if now > self.valid_to {
            return Err(PromotionRejection::Expired);
        }
        if self.usage_count >= self.usage_limit {
            return Err(PromotionRejection::UsageExhausted);
        }
        if !self.conditions.allows(now) {
            return Err(PromotionRejection::OutsideAllowedWindow);
        }
        if already_applied && !self.stackable {
            return Err(PromotionRejection::AlreadyApplied);
        }

        let (savings, credits_awarded) = match &self.reward {
            PromotionReward::DiscountFixed { value } => ((*value).min(amount), Money::ZERO),
            PromotionReward::DiscountPercent { percent, max_reward } => {
                let raw = amount.percent(*percent).unwrap_or(amount);
                let capped = match max_reward {
                    Some(cap) => raw.min(*cap),
                    None => raw,
                };
                (capped.min(amount), Money::ZERO)
            }
            PromotionReward::FixedCredits { credits } => (Money::ZERO, *credits),
        };

        Ok(PromotionQuote {
            promotion_id: self.id,
            code: self.code.clone(),
            reward_kind: self.reward.kind(),
            original_amount: amount,
            final_amount: amount.saturating_sub(savings),
            savings,
            credits_awarded,
        })
    }
}

// ============================================================================
// Applications
// ============================================================================

/// A recorded, non-replayable grant of a promotion to a user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromotionApplication {
    /// Unique application identifier
    pub id: Uuid,
    /// The applied promotion
    pub promotion_id: PromotionId,
    /// Benefiting user
    pub user_id: UserId,
    /// Wallet credits granted, zero for pure discounts
    pub credits_awarded: Money,
    /// When the grant happened
    pub applied_at: DateTime<Utc>,
}

/// An application ready to be recorded
#[derive(Clone, Debug)]
pub struct NewPromotionApplication {
    /// The promotion being applied
    pub promotion_id: PromotionId,
    /// Benefiting user
    pub user_id: UserId,
    /// Wallet credits granted, zero for pure discounts
    pub credits_awarded: Money,
    /// When the grant happens
    pub applied_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn active_promotion(reward: PromotionReward) -> Promotion {
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();
        Promotion {
            id: PromotionId::new(),
            code: "DESCUENTA1".to_string(),
            status: PromotionStatus::Active,
            reward,
            valid_from: now - Duration::days(1),
            valid_to: now + Duration::days(1),
            usage_limit: 100,
            usage_count: 0,
            stackable: false,
            conditions: PromotionConditions::default(),
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn fixed_discount_caps_at_amount() {
        let promotion = active_promotion(PromotionReward::DiscountFixed {
            value: Money::from_euros(1),
        });

        // The €2.00 reservation with a fixed €1.00 discount: final €1.00.
        let quote = promotion.quote(Money::from_euros(2), noon(), false).unwrap();
        assert_eq!(quote.final_amount, Money::from_euros(1));
        assert_eq!(quote.savings, Money::from_euros(1));

        // A €0.50 amount cannot go negative.
        let quote = promotion
            .quote(Money::from_cents(50), noon(), false)
            .unwrap();
        assert_eq!(quote.final_amount, Money::ZERO);
        assert_eq!(quote.savings, Money::from_cents(50));
    }

    #[test]
    fn percent_discount_honors_max_reward() {
        let promotion = active_promotion(PromotionReward::DiscountPercent {
            percent: 50,
            max_reward: Some(Money::from_euros(5)),
        });

        let quote = promotion
            .quote(Money::from_euros(30), noon(), false)
            .unwrap();
        assert_eq!(quote.savings, Money::from_euros(5));
        assert_eq!(quote.final_amount, Money::from_euros(25));
    }

    #[test]
    fn fixed_credits_leave_amount_untouched() {
        let promotion = active_promotion(PromotionReward::FixedCredits {
            credits: Money::from_euros(10),
        });

        let quote = promotion.quote(Money::from_euros(2), noon(), false).unwrap();
        assert_eq!(quote.final_amount, Money::from_euros(2));
        assert_eq!(quote.credits_awarded, Money::from_euros(10));
    }

    #[test]
    fn rejects_outside_validity_window() {
        let mut promotion = active_promotion(PromotionReward::DiscountFixed {
            value: Money::from_euros(1),
        });
        promotion.valid_from = noon() + Duration::days(2);
        promotion.valid_to = noon() + Duration::days(3);
        assert_eq!(
            promotion.quote(Money::from_euros(2), noon(), false),
            Err(PromotionRejection::NotYetActive)
        );

        promotion.valid_from = noon() - Duration::days(3);
        promotion.valid_to = noon() - Duration::days(2);
        assert_eq!(
            promotion.quote(Money::from_euros(2), noon(), false),
            Err(PromotionRejection::Expired)
        );
    }

    #[test]
    fn rejects_exhausted_and_repeat_use() {
        let mut promotion = active_promotion(PromotionReward::DiscountFixed {
            value: Money::from_euros(1),
        });
        assert_eq!(
            promotion.quote(Money::from_euros(2), noon(), true),
            Err(PromotionRejection::AlreadyApplied)
        );

        promotion.usage_count = promotion.usage_limit;
        assert_eq!(
            promotion.quote(Money::from_euros(2), noon(), false),
            Err(PromotionRejection::UsageExhausted)
        );
    }

    #[test]
    fn time_conditions_gate_application() {
        let mut promotion = active_promotion(PromotionReward::DiscountFixed {
            value: Money::from_euros(1),
        });
        promotion.conditions = PromotionConditions {
            allowed_days: vec![Weekday::Sat, Weekday::Sun],
            from_time: None,
            until_time: None,
        };

        // 2026-08-06 is a Thursday.
        assert_eq!(
            promotion.quote(Money::from_euros(2), noon(), false),
            Err(PromotionRejection::OutsideAllowedWindow)
        );

        promotion.conditions = PromotionConditions {
            allowed_days: vec![],
            from_time: NaiveTime::from_hms_opt(18, 0, 0),
            until_time: NaiveTime::from_hms_opt(22, 0, 0),
        };
        assert_eq!(
            promotion.quote(Money::from_euros(2), noon(), false),
            Err(PromotionRejection::OutsideAllowedWindow)
        );
    }
}
