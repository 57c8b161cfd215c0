//! Promotion engine: validation and atomic application of promo codes.

use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::ledger::IdempotencyKey;
use crate::outbox::OutboxPayload;
use crate::promotion::{
    NewPromotionApplication, Promotion, PromotionApplication, PromotionOutcome, PromotionQuote,
    PromotionRejection,
};
use crate::store::PromotionStore;
use crate::types::{Money, UserId};
use crate::wallet::{NewWalletEntry, WalletDirection, WalletReason};
use std::sync::Arc;

/// A successfully applied promotion
#[derive(Clone, Debug)]
pub struct AppliedPromotion {
    /// The quote that was honored
    pub quote: PromotionQuote,
    /// The recorded, non-replayable application
    pub application: PromotionApplication,
}

/// Validates and applies promotional codes
pub struct PromotionEngine {
    promotions: Arc<dyn PromotionStore>,
    clock: Arc<dyn Clock>,
}

impl PromotionEngine {
    /// Creates the engine
    #[must_use]
    pub fn new(promotions: Arc<dyn PromotionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { promotions, clock }
    }

    /// Validates `code` against `amount`, checking the per-user constraint
    /// when a user is given.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure. An inapplicable code is not an
    /// error; it is a [`PromotionOutcome::Rejected`] with the reason.
    pub async fn validate(
        &self,
        code: &str,
        amount: Money,
        user: Option<UserId>,
    ) -> Result<PromotionOutcome> {
        let Some(promotion) = self.promotions.promotion_by_code(code).await? else {
            return Ok(PromotionOutcome::Rejected(PromotionRejection::CodeNotFound));
        };

        let already_applied = match user {
            Some(user) => {
                self.promotions
                    .application_count(promotion.id, user)
                    .await?
                    > 0
            }
            None => false,
        };

        let outcome = match promotion.quote(amount, self.clock.now(), already_applied) {
            Ok(quote) => PromotionOutcome::Approved(quote),
            Err(reason) => PromotionOutcome::Rejected(reason),
        };
        Ok(outcome)
    }

    /// Applies `code` for `user`: one transaction inserting the
    /// application, bumping the usage counter and granting any wallet
    /// credit under the `<PROMO_TYPE>:<user>:<promotion>` key, so a retried
    /// signup or apply call cannot grant the bonus twice.
    ///
    /// # Errors
    ///
    /// `Conflict` when the code is exhausted or already applied to the
    /// user, `Validation` for other rejection reasons, `Storage` on
    /// infrastructure failure.
    pub async fn apply(
        &self,
        code: &str,
        amount: Money,
        user: UserId,
    ) -> Result<AppliedPromotion> {
        let Some(promotion) = self.promotions.promotion_by_code(code).await? else {
            return Err(CoreError::Validation(
                PromotionRejection::CodeNotFound.to_string(),
            ));
        };

        let already_applied = self
            .promotions
            .application_count(promotion.id, user)
            .await?
            > 0;

        let quote = promotion
            .quote(amount, self.clock.now(), already_applied)
            .map_err(Self::rejection_error)?;

        let application = self.apply_quote(&promotion, &quote, user).await?;
        tracing::info!(
            promotion_id = %promotion.id,
            code = %promotion.code,
            user_id = %user,
            savings = quote.savings.cents(),
            credits = quote.credits_awarded.cents(),
            "promotion applied"
        );
        Ok(AppliedPromotion { quote, application })
    }

    async fn apply_quote(
        &self,
        promotion: &Promotion,
        quote: &PromotionQuote,
        user: UserId,
    ) -> Result<PromotionApplication> {
        let now = self.clock.now();
        let application = NewPromotionApplication {
            promotion_id: promotion.id,
            user_id: user,
            credits_awarded: quote.credits_awarded,
            applied_at: now,
        };

        let wallet = (!quote.credits_awarded.is_zero()).then(|| NewWalletEntry {
            user_id: user,
            direction: WalletDirection::Credit,
            reason: WalletReason::Promo,
            credits: quote.credits_awarded,
            idempotency_key: IdempotencyKey::promotion(
                promotion.reward.kind(),
                user,
                promotion.id,
            ),
        });

        let event = OutboxPayload::PromotionApplied {
            promotion_id: promotion.id,
            code: promotion.code.clone(),
            user_id: user,
            credits_awarded: quote.credits_awarded,
        };

        self.promotions.apply(application, wallet, event).await
    }

    fn rejection_error(reason: PromotionRejection) -> CoreError {
        match reason {
            PromotionRejection::UsageExhausted | PromotionRejection::AlreadyApplied => {
                CoreError::Conflict(reason.to_string())
            }
            _ => CoreError::Validation(reason.to_string()),
        }
    }
}
