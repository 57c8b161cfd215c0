//! The outbox table. Appends happen inside the caller's transaction so the
//! event is durable exactly when its causing state change is.

use crate::{storage, PgStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courtbook_core::error::{CoreError, Result};
use courtbook_core::outbox::{EventKind, OutboxEvent, OutboxPayload};
use courtbook_core::store::OutboxStore;
use courtbook_core::types::OutboxEventId;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;

pub(crate) fn event_from_row(row: &PgRow) -> Result<OutboxEvent> {
    let payload: serde_json::Value =
        row.try_get("event_data").map_err(|e| storage("outbox row", e))?;
    let payload: OutboxPayload = serde_json::from_value(payload)
        .map_err(|e| CoreError::Storage(format!("bad outbox payload: {e}")))?;

    Ok(OutboxEvent {
        id: OutboxEventId::from_uuid(row.try_get("id").map_err(|e| storage("outbox row", e))?),
        payload,
        created_at: row.try_get("created_at").map_err(|e| storage("outbox row", e))?,
        processed: row.try_get("processed").map_err(|e| storage("outbox row", e))?,
        processed_at: row
            .try_get("processed_at")
            .map_err(|e| storage("outbox row", e))?,
    })
}

/// Appends an outbox row inside an open transaction.
pub(crate) async fn insert_event(
    conn: &mut PgConnection,
    payload: &OutboxPayload,
    at: DateTime<Utc>,
) -> Result<OutboxEvent> {
    let data = serde_json::to_value(payload)
        .map_err(|e| CoreError::Storage(format!("outbox payload encoding: {e}")))?;
    let id = OutboxEventId::new();

    sqlx::query(
        "INSERT INTO outbox_events (id, event_type, event_data, created_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(*id.as_uuid())
    .bind(payload.kind().as_str())
    .bind(&data)
    .bind(at)
    .execute(conn)
    .await
    .map_err(|e| storage("outbox insert", e))?;

    Ok(OutboxEvent {
        id,
        payload: payload.clone(),
        created_at: at,
        processed: false,
        processed_at: None,
    })
}

#[async_trait]
impl OutboxStore for PgStore {
    async fn append(&self, payload: OutboxPayload, at: DateTime<Utc>) -> Result<OutboxEvent> {
        let mut tx = self.pool().begin().await.map_err(|e| storage("begin", e))?;
        let event = insert_event(&mut *tx, &payload, at).await?;
        tx.commit().await.map_err(|e| storage("commit", e))?;
        Ok(event)
    }

    async fn unprocessed(&self, limit: u32) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM outbox_events WHERE NOT processed ORDER BY created_at LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(|e| storage("outbox unprocessed", e))?;

        rows.iter().map(event_from_row).collect()
    }

    async fn mark_processed(&self, ids: &[OutboxEventId], at: DateTime<Utc>) -> Result<u64> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let result = sqlx::query(
            "UPDATE outbox_events
             SET processed = TRUE, processed_at = $2
             WHERE id = ANY($1) AND NOT processed",
        )
        .bind(&uuids)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(|e| storage("outbox mark processed", e))?;
        Ok(result.rows_affected())
    }

    async fn of_kind_between(
        &self,
        kind: EventKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM outbox_events
             WHERE event_type = $1 AND created_at >= $2 AND created_at < $3
             ORDER BY created_at",
        )
        .bind(kind.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(self.pool())
        .await
        .map_err(|e| storage("outbox by kind", e))?;

        rows.iter().map(event_from_row).collect()
    }
}
