//! Storefront orders: settlement and refunds share the ledger/outbox
//! transaction helpers with the booking side.

use crate::{from_cents, parse_stored, storage, to_cents, PgStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courtbook_core::error::{CoreError, Result};
use courtbook_core::ledger::{NewLedgerEntry, Recorded};
use courtbook_core::order::{Order, OrderStatus};
use courtbook_core::outbox::OutboxPayload;
use courtbook_core::store::OrderStore;
use courtbook_core::types::{OrderId, PaymentMethod, UserId};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;

fn order_from_row(row: &PgRow) -> Result<Order> {
    let method: String = row.try_get("method").map_err(|e| storage("order row", e))?;
    let status: String = row.try_get("status").map_err(|e| storage("order row", e))?;
    let total: i64 = row.try_get("total_cents").map_err(|e| storage("order row", e))?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id").map_err(|e| storage("order row", e))?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(|e| storage("order row", e))?),
        total: from_cents(total)?,
        method: parse_stored(&method, PaymentMethod::parse, "payment method")?,
        status: parse_stored(&status, OrderStatus::parse, "order status")?,
        paid_at: row.try_get("paid_at").map_err(|e| storage("order row", e))?,
        created_at: row.try_get("created_at").map_err(|e| storage("order row", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| storage("order row", e))?,
    })
}

async fn fetch_order(conn: &mut PgConnection, id: OrderId, for_update: bool) -> Result<Order> {
    let sql = if for_update {
        "SELECT * FROM orders WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM orders WHERE id = $1"
    };
    let row = sqlx::query(sql)
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| storage("order fetch", e))?
        .ok_or_else(|| CoreError::not_found("order", id))?;
    order_from_row(&row)
}

#[async_trait]
impl OrderStore for PgStore {
    async fn order(&self, id: OrderId) -> Result<Order> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| storage("order fetch", e))?
            .ok_or_else(|| CoreError::not_found("order", id))?;
        order_from_row(&row)
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, total_cents, method, status, paid_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(*order.id.as_uuid())
        .bind(*order.user_id.as_uuid())
        .bind(to_cents(order.total)?)
        .bind(order.method.as_str())
        .bind(order.status.as_str())
        .bind(order.paid_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::Conflict(format!("order {} already exists", order.id))
            }
            _ => storage("order insert", e),
        })?;
        Ok(())
    }

    async fn settle(
        &self,
        id: OrderId,
        paid_at: DateTime<Utc>,
        entry: NewLedgerEntry,
        event: OutboxPayload,
    ) -> Result<(Order, Recorded)> {
        let mut tx = self.pool().begin().await.map_err(|e| storage("begin", e))?;

        let current = fetch_order(&mut *tx, id, true).await?;
        if current.status != OrderStatus::Pending {
            return Err(CoreError::invalid_state(
                format!("order {id}"),
                current.status.as_str(),
                "confirm payment",
            ));
        }

        let recorded = crate::ledger::insert_entry(&mut *tx, entry, paid_at).await?;
        crate::outbox::insert_event(&mut *tx, &event, paid_at).await?;

        let row = sqlx::query(
            "UPDATE orders SET status = 'PAID', paid_at = $2, updated_at = $2 WHERE id = $1 RETURNING *",
        )
        .bind(*id.as_uuid())
        .bind(paid_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage("order settle", e))?;

        let order = order_from_row(&row)?;
        tx.commit().await.map_err(|e| storage("commit", e))?;
        Ok((order, recorded))
    }

    async fn refund(
        &self,
        id: OrderId,
        at: DateTime<Utc>,
        entry: NewLedgerEntry,
        event: OutboxPayload,
    ) -> Result<(Order, Recorded)> {
        let mut tx = self.pool().begin().await.map_err(|e| storage("begin", e))?;

        let current = fetch_order(&mut *tx, id, true).await?;
        if current.status != OrderStatus::Paid {
            return Err(CoreError::invalid_state(
                format!("order {id}"),
                current.status.as_str(),
                "refund",
            ));
        }

        let recorded = crate::ledger::insert_entry(&mut *tx, entry, at).await?;
        crate::outbox::insert_event(&mut *tx, &event, at).await?;

        let row = sqlx::query(
            "UPDATE orders SET status = 'REFUNDED', updated_at = $2 WHERE id = $1 RETURNING *",
        )
        .bind(*id.as_uuid())
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage("order refund", e))?;

        let order = order_from_row(&row)?;
        tx.commit().await.map_err(|e| storage("commit", e))?;
        Ok((order, recorded))
    }

    async fn paid_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT * FROM orders
             WHERE paid_at IS NOT NULL AND paid_at >= $1 AND paid_at < $2
             ORDER BY paid_at",
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.pool())
        .await
        .map_err(|e| storage("paid orders query", e))?;

        rows.iter().map(order_from_row).collect()
    }
}
