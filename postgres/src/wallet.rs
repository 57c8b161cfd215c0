//! The wallet projector: wallet ledger rows plus the cached balance on the
//! user row, always written together.

use crate::{from_cents, parse_stored, storage, to_cents, PgStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courtbook_core::error::{CoreError, Result};
use courtbook_core::ledger::{IdempotencyKey, NewLedgerEntry, Recorded};
use courtbook_core::outbox::OutboxPayload;
use courtbook_core::store::WalletStore;
use courtbook_core::types::{Money, UserId, WalletEntryId};
use courtbook_core::wallet::{NewWalletEntry, WalletDirection, WalletEntry, WalletReason};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;

pub(crate) fn wallet_entry_from_row(row: &PgRow) -> Result<WalletEntry> {
    let direction: String = row.try_get("direction").map_err(|e| storage("wallet row", e))?;
    let reason: String = row.try_get("reason").map_err(|e| storage("wallet row", e))?;
    let credits: i64 = row.try_get("credits_cents").map_err(|e| storage("wallet row", e))?;
    let balance_after: i64 = row
        .try_get("balance_after_cents")
        .map_err(|e| storage("wallet row", e))?;

    Ok(WalletEntry {
        id: WalletEntryId::from_uuid(row.try_get("id").map_err(|e| storage("wallet row", e))?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(|e| storage("wallet row", e))?),
        direction: parse_stored(&direction, WalletDirection::parse, "wallet direction")?,
        reason: parse_stored(&reason, WalletReason::parse, "wallet reason")?,
        credits: from_cents(credits)?,
        balance_after: from_cents(balance_after)?,
        idempotency_key: IdempotencyKey::raw(
            row.try_get("idempotency_key")
                .map_err(|e| storage("wallet row", e))?,
        ),
        created_at: row.try_get("created_at").map_err(|e| storage("wallet row", e))?,
    })
}

/// Applies one wallet movement inside an open transaction: ensures the user
/// row exists, locks it, computes the running balance, inserts the wallet
/// row and updates the cache. Idempotent on the entry key.
pub(crate) async fn apply_entry(
    conn: &mut PgConnection,
    entry: NewWalletEntry,
    at: DateTime<Utc>,
) -> Result<WalletEntry> {
    if let Some(row) = sqlx::query("SELECT * FROM wallet_ledger WHERE idempotency_key = $1")
        .bind(entry.idempotency_key.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| storage("wallet replay check", e))?
    {
        return wallet_entry_from_row(&row);
    }

    sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
        .bind(*entry.user_id.as_uuid())
        .execute(&mut *conn)
        .await
        .map_err(|e| storage("wallet user upsert", e))?;

    // The row lock serializes concurrent movements per user; the balance
    // read below is therefore consistent with the update.
    let balance: i64 =
        sqlx::query_scalar("SELECT credits_balance_cents FROM users WHERE id = $1 FOR UPDATE")
            .bind(*entry.user_id.as_uuid())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| storage("wallet balance lock", e))?;

    let balance_after = entry.balance_after(from_cents(balance)?)?;
    let row = WalletEntry {
        id: WalletEntryId::new(),
        user_id: entry.user_id,
        direction: entry.direction,
        reason: entry.reason,
        credits: entry.credits,
        balance_after,
        idempotency_key: entry.idempotency_key,
        created_at: at,
    };

    sqlx::query(
        "INSERT INTO wallet_ledger
             (id, user_id, direction, reason, credits_cents, balance_after_cents,
              idempotency_key, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(*row.id.as_uuid())
    .bind(*row.user_id.as_uuid())
    .bind(row.direction.as_str())
    .bind(row.reason.as_str())
    .bind(to_cents(row.credits)?)
    .bind(to_cents(row.balance_after)?)
    .bind(row.idempotency_key.as_str())
    .bind(at)
    .execute(&mut *conn)
    .await
    .map_err(|e| storage("wallet insert", e))?;

    sqlx::query("UPDATE users SET credits_balance_cents = $2 WHERE id = $1")
        .bind(*row.user_id.as_uuid())
        .bind(to_cents(row.balance_after)?)
        .execute(&mut *conn)
        .await
        .map_err(|e| storage("wallet balance update", e))?;

    Ok(row)
}

#[async_trait]
impl WalletStore for PgStore {
    async fn balance(&self, user: UserId) -> Result<Money> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT credits_balance_cents FROM users WHERE id = $1")
                .bind(*user.as_uuid())
                .fetch_optional(self.pool())
                .await
                .map_err(|e| storage("wallet balance", e))?;
        balance.map_or(Ok(Money::ZERO), from_cents)
    }

    async fn entries(&self, user: UserId) -> Result<Vec<WalletEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM wallet_ledger WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(*user.as_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(|e| storage("wallet entries", e))?;

        rows.iter().map(wallet_entry_from_row).collect()
    }

    async fn apply(&self, entry: NewWalletEntry, at: DateTime<Utc>) -> Result<WalletEntry> {
        let mut tx = self.pool().begin().await.map_err(|e| storage("begin", e))?;
        let row = apply_entry(&mut *tx, entry, at).await?;
        tx.commit().await.map_err(|e| storage("commit", e))?;
        Ok(row)
    }

    async fn top_up(
        &self,
        entry: NewWalletEntry,
        ledger: NewLedgerEntry,
        at: DateTime<Utc>,
    ) -> Result<(WalletEntry, Recorded)> {
        if entry.direction != WalletDirection::Credit {
            return Err(CoreError::Validation(
                "top-up must be a wallet credit".to_string(),
            ));
        }

        let mut tx = self.pool().begin().await.map_err(|e| storage("begin", e))?;
        let recorded = crate::ledger::insert_entry(&mut *tx, ledger, at).await?;
        let wallet = apply_entry(&mut *tx, entry, at).await?;
        if recorded.created {
            crate::outbox::insert_event(
                &mut *tx,
                &OutboxPayload::WalletToppedUp {
                    user_id: wallet.user_id,
                    credits: wallet.credits,
                    balance_after: wallet.balance_after,
                },
                at,
            )
            .await?;
        }
        tx.commit().await.map_err(|e| storage("commit", e))?;
        Ok((wallet, recorded))
    }
}
