//! The ledger table: idempotent inserts and the reporting query surface.
//!
//! There is deliberately no UPDATE or DELETE against `ledger_transactions`
//! anywhere in this crate; corrections are new offsetting entries.

use crate::{from_cents, parse_stored, storage, to_cents, PgStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courtbook_core::error::{CoreError, Result};
use courtbook_core::ledger::{
    Direction, IdempotencyKey, LedgerEntry, LedgerFilter, LedgerMetadata, NewLedgerEntry, Page,
    Recorded, SettlementStatus, SourceType,
};
use courtbook_core::outbox::OutboxPayload;
use courtbook_core::store::Ledger;
use courtbook_core::types::{CurrencyCode, LedgerEntryId, PaymentMethod};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

pub(crate) fn entry_from_row(row: &PgRow) -> Result<LedgerEntry> {
    let source_type: String = row.try_get("source_type").map_err(|e| storage("ledger row", e))?;
    let direction: String = row.try_get("direction").map_err(|e| storage("ledger row", e))?;
    let currency: String = row.try_get("currency").map_err(|e| storage("ledger row", e))?;
    let method: String = row.try_get("method").map_err(|e| storage("ledger row", e))?;
    let status: String = row.try_get("status").map_err(|e| storage("ledger row", e))?;
    let amount: i64 = row.try_get("amount_cents").map_err(|e| storage("ledger row", e))?;
    let metadata: Option<serde_json::Value> =
        row.try_get("metadata").map_err(|e| storage("ledger row", e))?;
    let metadata = metadata
        .map(serde_json::from_value::<LedgerMetadata>)
        .transpose()
        .map_err(|e| CoreError::Storage(format!("bad ledger metadata: {e}")))?;

    Ok(LedgerEntry {
        id: LedgerEntryId::from_uuid(row.try_get("id").map_err(|e| storage("ledger row", e))?),
        source_type: parse_stored(&source_type, SourceType::parse, "source type")?,
        source_id: row.try_get("source_id").map_err(|e| storage("ledger row", e))?,
        direction: parse_stored(&direction, Direction::parse, "direction")?,
        amount: from_cents(amount)?,
        currency: parse_stored(&currency, CurrencyCode::parse, "currency")?,
        method: parse_stored(&method, PaymentMethod::parse, "payment method")?,
        status: parse_stored(&status, SettlementStatus::parse, "settlement status")?,
        paid_at: row.try_get("paid_at").map_err(|e| storage("ledger row", e))?,
        gateway_reference: row
            .try_get("gateway_reference")
            .map_err(|e| storage("ledger row", e))?,
        idempotency_key: IdempotencyKey::raw(
            row.try_get("idempotency_key")
                .map_err(|e| storage("ledger row", e))?,
        ),
        metadata,
        created_at: row.try_get("created_at").map_err(|e| storage("ledger row", e))?,
    })
}

/// Inserts a ledger entry inside an open transaction; the idempotent-upsert
/// primitive shared by every composite financial operation.
pub(crate) async fn insert_entry(
    conn: &mut PgConnection,
    entry: NewLedgerEntry,
    now: DateTime<Utc>,
) -> Result<Recorded> {
    // Write-time consistency: a reservation/order entry must reference an
    // existing source row.
    let reference_table = match entry.source_type {
        SourceType::Reservation => Some("reservations"),
        SourceType::Order => Some("orders"),
        SourceType::Topup | SourceType::Membership => None,
    };
    if let Some(table) = reference_table {
        let exists: bool =
            sqlx::query_scalar(&format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)"))
                .bind(entry.source_id)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| storage("ledger source check", e))?;
        if !exists {
            return Err(CoreError::Validation(format!(
                "ledger entry references missing {} {}",
                entry.source_type, entry.source_id
            )));
        }
    }

    let metadata = entry
        .metadata
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| CoreError::Storage(format!("ledger metadata encoding: {e}")))?;

    let inserted = sqlx::query(
        "INSERT INTO ledger_transactions
             (id, source_type, source_id, direction, amount_cents, currency, method,
              status, paid_at, gateway_reference, idempotency_key, metadata, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         ON CONFLICT (idempotency_key) DO NOTHING",
    )
    .bind(*LedgerEntryId::new().as_uuid())
    .bind(entry.source_type.as_str())
    .bind(entry.source_id)
    .bind(entry.direction.as_str())
    .bind(to_cents(entry.amount)?)
    .bind(entry.currency.as_str())
    .bind(entry.method.as_str())
    .bind(entry.status.as_str())
    .bind(entry.paid_at)
    .bind(entry.gateway_reference.as_deref())
    .bind(entry.idempotency_key.as_str())
    .bind(metadata)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| storage("ledger insert", e))?;

    let created = inserted.rows_affected() == 1;
    let row = sqlx::query("SELECT * FROM ledger_transactions WHERE idempotency_key = $1")
        .bind(entry.idempotency_key.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| storage("ledger fetch after insert", e))?;

    Ok(Recorded {
        entry: entry_from_row(&row)?,
        created,
    })
}

fn apply_filters(builder: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &LedgerFilter) {
    if let Some(source_type) = filter.source_type {
        builder.push(" AND source_type = ").push_bind(source_type.as_str());
    }
    if let Some(direction) = filter.direction {
        builder.push(" AND direction = ").push_bind(direction.as_str());
    }
    if let Some(method) = filter.method {
        builder.push(" AND method = ").push_bind(method.as_str());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(from) = filter.date_from {
        builder.push(" AND paid_at >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        builder.push(" AND paid_at < ").push_bind(to);
    }
    if let Some(court_id) = filter.court_id {
        builder
            .push(" AND source_type = 'RESERVATION' AND source_id IN (SELECT id FROM reservations WHERE court_id = ")
            .push_bind(*court_id.as_uuid())
            .push(")");
    }
}

#[async_trait]
impl Ledger for PgStore {
    async fn record(&self, entry: NewLedgerEntry) -> Result<Recorded> {
        let mut tx = self.pool().begin().await.map_err(|e| storage("begin", e))?;
        let now = Utc::now();
        let recorded = insert_entry(&mut *tx, entry, now).await?;
        tx.commit().await.map_err(|e| storage("commit", e))?;
        Ok(recorded)
    }

    async fn record_with_event(
        &self,
        entry: NewLedgerEntry,
        event: OutboxPayload,
    ) -> Result<Recorded> {
        let mut tx = self.pool().begin().await.map_err(|e| storage("begin", e))?;
        let now = Utc::now();
        let recorded = insert_entry(&mut *tx, entry, now).await?;
        if recorded.created {
            crate::outbox::insert_event(&mut *tx, &event, now).await?;
        }
        tx.commit().await.map_err(|e| storage("commit", e))?;
        Ok(recorded)
    }

    async fn find_by_source(
        &self,
        source_type: SourceType,
        source_id: Uuid,
        direction: Direction,
    ) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query(
            "SELECT * FROM ledger_transactions
             WHERE source_type = $1 AND source_id = $2 AND direction = $3
             ORDER BY created_at
             LIMIT 1",
        )
        .bind(source_type.as_str())
        .bind(source_id)
        .bind(direction.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| storage("ledger lookup", e))?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn query(&self, filter: &LedgerFilter) -> Result<Page<LedgerEntry>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM ledger_transactions WHERE TRUE");
        apply_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(|e| storage("ledger count", e))?;

        let mut select = QueryBuilder::new("SELECT * FROM ledger_transactions WHERE TRUE");
        apply_filters(&mut select, filter);
        select
            .push(" ORDER BY paid_at DESC LIMIT ")
            .push_bind(i64::from(filter.limit()))
            .push(" OFFSET ")
            .push_bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX));
        let rows = select
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(|e| storage("ledger query", e))?;

        let items = rows
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or(0),
            page: filter.page(),
            limit: filter.limit(),
        })
    }
}
