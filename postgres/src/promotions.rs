//! Promotions: code lookup and the atomic application transaction.
//!
//! `apply` locks the promotion row, so per-promotion usage accounting is
//! serialized on the entity's natural identity.

use crate::{from_cents, parse_stored, storage, to_cents, PgStore};
use async_trait::async_trait;
use courtbook_core::error::{CoreError, Result};
use courtbook_core::outbox::OutboxPayload;
use courtbook_core::promotion::{
    NewPromotionApplication, Promotion, PromotionApplication, PromotionConditions,
    PromotionReward, PromotionStatus,
};
use courtbook_core::store::PromotionStore;
use courtbook_core::types::{PromotionId, UserId};
use courtbook_core::wallet::NewWalletEntry;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

fn promotion_from_row(row: &PgRow) -> Result<Promotion> {
    let status: String = row.try_get("status").map_err(|e| storage("promotion row", e))?;
    let reward: serde_json::Value =
        row.try_get("reward").map_err(|e| storage("promotion row", e))?;
    let reward: PromotionReward = serde_json::from_value(reward)
        .map_err(|e| CoreError::Storage(format!("bad promotion reward: {e}")))?;
    let conditions: serde_json::Value = row
        .try_get("conditions")
        .map_err(|e| storage("promotion row", e))?;
    let conditions: PromotionConditions = serde_json::from_value(conditions)
        .map_err(|e| CoreError::Storage(format!("bad promotion conditions: {e}")))?;
    let usage_limit: i32 = row
        .try_get("usage_limit")
        .map_err(|e| storage("promotion row", e))?;
    let usage_count: i32 = row
        .try_get("usage_count")
        .map_err(|e| storage("promotion row", e))?;

    Ok(Promotion {
        id: PromotionId::from_uuid(row.try_get("id").map_err(|e| storage("promotion row", e))?),
        code: row.try_get("code").map_err(|e| storage("promotion row", e))?,
        status: parse_stored(&status, PromotionStatus::parse, "promotion status")?,
        reward,
        valid_from: row.try_get("valid_from").map_err(|e| storage("promotion row", e))?,
        valid_to: row.try_get("valid_to").map_err(|e| storage("promotion row", e))?,
        usage_limit: u32::try_from(usage_limit).unwrap_or(0),
        usage_count: u32::try_from(usage_count).unwrap_or(0),
        stackable: row.try_get("stackable").map_err(|e| storage("promotion row", e))?,
        conditions,
    })
}

#[async_trait]
impl PromotionStore for PgStore {
    async fn promotion_by_code(&self, code: &str) -> Result<Option<Promotion>> {
        let row = sqlx::query("SELECT * FROM promotions WHERE code = $1")
            .bind(code)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| storage("promotion fetch", e))?;
        row.as_ref().map(promotion_from_row).transpose()
    }

    async fn insert_promotion(&self, promotion: &Promotion) -> Result<()> {
        let reward = serde_json::to_value(&promotion.reward)
            .map_err(|e| CoreError::Storage(format!("promotion reward encoding: {e}")))?;
        let conditions = serde_json::to_value(&promotion.conditions)
            .map_err(|e| CoreError::Storage(format!("promotion conditions encoding: {e}")))?;

        sqlx::query(
            "INSERT INTO promotions
                 (id, code, status, reward, valid_from, valid_to, usage_limit, usage_count,
                  stackable, conditions)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(*promotion.id.as_uuid())
        .bind(&promotion.code)
        .bind(promotion.status.as_str())
        .bind(&reward)
        .bind(promotion.valid_from)
        .bind(promotion.valid_to)
        .bind(i32::try_from(promotion.usage_limit).unwrap_or(i32::MAX))
        .bind(i32::try_from(promotion.usage_count).unwrap_or(i32::MAX))
        .bind(promotion.stackable)
        .bind(&conditions)
        .execute(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::Conflict(format!("promotion code {} already exists", promotion.code))
            }
            _ => storage("promotion insert", e),
        })?;
        Ok(())
    }

    async fn application_count(&self, promotion: PromotionId, user: UserId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM promotion_applications WHERE promotion_id = $1 AND user_id = $2",
        )
        .bind(*promotion.as_uuid())
        .bind(*user.as_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(|e| storage("application count", e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn apply(
        &self,
        application: NewPromotionApplication,
        wallet: Option<NewWalletEntry>,
        event: OutboxPayload,
    ) -> Result<PromotionApplication> {
        let mut tx = self.pool().begin().await.map_err(|e| storage("begin", e))?;

        // Lock the promotion row: usage accounting and the per-user check
        // below are serialized per promotion.
        let row = sqlx::query("SELECT * FROM promotions WHERE id = $1 FOR UPDATE")
            .bind(*application.promotion_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| storage("promotion lock", e))?
            .ok_or_else(|| CoreError::not_found("promotion", application.promotion_id))?;
        let promotion = promotion_from_row(&row)?;

        if promotion.usage_count >= promotion.usage_limit {
            return Err(CoreError::Conflict("promotion usage limit reached".to_string()));
        }
        if !promotion.stackable {
            let existing: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM promotion_applications
                 WHERE promotion_id = $1 AND user_id = $2",
            )
            .bind(*application.promotion_id.as_uuid())
            .bind(*application.user_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| storage("application check", e))?;
            if existing > 0 {
                return Err(CoreError::Conflict(
                    "promotion already applied to this account".to_string(),
                ));
            }
        }

        let recorded = PromotionApplication {
            id: Uuid::new_v4(),
            promotion_id: application.promotion_id,
            user_id: application.user_id,
            credits_awarded: application.credits_awarded,
            applied_at: application.applied_at,
        };
        sqlx::query(
            "INSERT INTO promotion_applications
                 (id, promotion_id, user_id, credits_awarded_cents, applied_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(recorded.id)
        .bind(*recorded.promotion_id.as_uuid())
        .bind(*recorded.user_id.as_uuid())
        .bind(to_cents(recorded.credits_awarded)?)
        .bind(recorded.applied_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| storage("application insert", e))?;

        sqlx::query("UPDATE promotions SET usage_count = usage_count + 1 WHERE id = $1")
            .bind(*application.promotion_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| storage("usage increment", e))?;

        if let Some(wallet) = wallet {
            crate::wallet::apply_entry(&mut *tx, wallet, application.applied_at).await?;
        }
        crate::outbox::insert_event(&mut *tx, &event, application.applied_at).await?;

        tx.commit().await.map_err(|e| storage("commit", e))?;
        Ok(recorded)
    }
}
