//! Courts and reservations: the booking conflict rule and every lifecycle
//! transition, each inside one transaction.

use crate::{from_cents, parse_stored, storage, to_cents, PgStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courtbook_core::error::{CoreError, Result};
use courtbook_core::outbox::OutboxPayload;
use courtbook_core::reservation::{Reservation, ReservationStatus};
use courtbook_core::store::{BookingStore, ReservationSettlement, SettlementReceipt};
use courtbook_core::types::{
    Activity, Court, CourtId, Money, PaymentMethod, ReservationId, TimeSlot, UserId,
};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;

fn court_from_row(row: &PgRow) -> Result<Court> {
    let primary: String = row
        .try_get("primary_activity")
        .map_err(|e| storage("court row", e))?;
    let secondary: Vec<String> = row
        .try_get("compatible_secondary")
        .map_err(|e| storage("court row", e))?;
    let compatible_secondary = secondary
        .iter()
        .map(|value| parse_stored(value, Activity::parse, "activity"))
        .collect::<Result<Vec<_>>>()?;

    Ok(Court {
        id: CourtId::from_uuid(row.try_get("id").map_err(|e| storage("court row", e))?),
        name: row.try_get("name").map_err(|e| storage("court row", e))?,
        primary_activity: parse_stored(&primary, Activity::parse, "activity")?,
        compatible_secondary,
    })
}

fn reservation_from_row(row: &PgRow) -> Result<Reservation> {
    let activity: String = row.try_get("activity").map_err(|e| storage("reservation row", e))?;
    let method: String = row.try_get("method").map_err(|e| storage("reservation row", e))?;
    let status: String = row.try_get("status").map_err(|e| storage("reservation row", e))?;
    let price: i64 = row
        .try_get("price_cents")
        .map_err(|e| storage("reservation row", e))?;
    let start: DateTime<Utc> = row
        .try_get("start_time")
        .map_err(|e| storage("reservation row", e))?;
    let end: DateTime<Utc> = row
        .try_get("end_time")
        .map_err(|e| storage("reservation row", e))?;
    let slot = TimeSlot::new(start, end)
        .ok_or_else(|| CoreError::Storage("inverted slot in storage".to_string()))?;

    Ok(Reservation {
        id: ReservationId::from_uuid(row.try_get("id").map_err(|e| storage("reservation row", e))?),
        user_id: UserId::from_uuid(
            row.try_get("user_id").map_err(|e| storage("reservation row", e))?,
        ),
        court_id: CourtId::from_uuid(
            row.try_get("court_id").map_err(|e| storage("reservation row", e))?,
        ),
        activity: parse_stored(&activity, Activity::parse, "activity")?,
        slot,
        price: from_cents(price)?,
        method: parse_stored(&method, PaymentMethod::parse, "payment method")?,
        status: parse_stored(&status, ReservationStatus::parse, "reservation status")?,
        expires_at: row
            .try_get("expires_at")
            .map_err(|e| storage("reservation row", e))?,
        paid_at: row.try_get("paid_at").map_err(|e| storage("reservation row", e))?,
        notes: row.try_get("notes").map_err(|e| storage("reservation row", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| storage("reservation row", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| storage("reservation row", e))?,
    })
}

/// Serializes booking attempts per court for the duration of the
/// transaction, so two concurrent inserts cannot both pass the conflict
/// check.
async fn lock_court(conn: &mut PgConnection, court: CourtId) -> Result<()> {
    let key = i64::from_le_bytes(court.as_uuid().as_bytes()[..8].try_into().unwrap_or_default());
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(key)
        .execute(conn)
        .await
        .map_err(|e| storage("court lock", e))?;
    Ok(())
}

async fn fetch_reservation(
    conn: &mut PgConnection,
    id: ReservationId,
    for_update: bool,
) -> Result<Reservation> {
    let sql = if for_update {
        "SELECT * FROM reservations WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM reservations WHERE id = $1"
    };
    let row = sqlx::query(sql)
        .bind(*id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| storage("reservation fetch", e))?
        .ok_or_else(|| CoreError::not_found("reservation", id))?;
    reservation_from_row(&row)
}

#[async_trait]
impl BookingStore for PgStore {
    async fn court(&self, id: CourtId) -> Result<Court> {
        let row = sqlx::query("SELECT * FROM courts WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| storage("court fetch", e))?
            .ok_or_else(|| CoreError::not_found("court", id))?;
        court_from_row(&row)
    }

    async fn insert_court(&self, court: &Court) -> Result<()> {
        let secondary: Vec<&str> = court
            .compatible_secondary
            .iter()
            .map(Activity::as_str)
            .collect();
        sqlx::query(
            "INSERT INTO courts (id, name, primary_activity, compatible_secondary)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(*court.id.as_uuid())
        .bind(&court.name)
        .bind(court.primary_activity.as_str())
        .bind(&secondary)
        .execute(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::Conflict(format!("court {} already exists", court.id))
            }
            _ => storage("court insert", e),
        })?;
        Ok(())
    }

    async fn reservation(&self, id: ReservationId) -> Result<Reservation> {
        let row = sqlx::query("SELECT * FROM reservations WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| storage("reservation fetch", e))?
            .ok_or_else(|| CoreError::not_found("reservation", id))?;
        reservation_from_row(&row)
    }

    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(|e| storage("begin", e))?;
        lock_court(&mut *tx, reservation.court_id).await?;

        let court_row = sqlx::query("SELECT * FROM courts WHERE id = $1")
            .bind(*reservation.court_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| storage("court fetch", e))?
            .ok_or_else(|| CoreError::not_found("court", reservation.court_id))?;
        let court = court_from_row(&court_row)?;

        let overlapping = sqlx::query(
            "SELECT * FROM reservations
             WHERE court_id = $1
               AND status IN ('PENDING', 'PAID', 'IN_PROGRESS')
               AND start_time < $3 AND end_time > $2",
        )
        .bind(*reservation.court_id.as_uuid())
        .bind(reservation.slot.start)
        .bind(reservation.slot.end)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| storage("overlap query", e))?;

        for row in &overlapping {
            let existing = reservation_from_row(row)?;
            if court.conflicts(reservation.activity, existing.activity) {
                return Err(CoreError::Conflict(format!(
                    "court {} is booked for {} in that slot",
                    court.name, existing.activity
                )));
            }
        }

        sqlx::query(
            "INSERT INTO reservations
                 (id, user_id, court_id, activity, start_time, end_time, price_cents,
                  method, status, expires_at, paid_at, notes, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(*reservation.id.as_uuid())
        .bind(*reservation.user_id.as_uuid())
        .bind(*reservation.court_id.as_uuid())
        .bind(reservation.activity.as_str())
        .bind(reservation.slot.start)
        .bind(reservation.slot.end)
        .bind(to_cents(reservation.price)?)
        .bind(reservation.method.as_str())
        .bind(reservation.status.as_str())
        .bind(reservation.expires_at)
        .bind(reservation.paid_at)
        .bind(&reservation.notes)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| storage("reservation insert", e))?;

        tx.commit().await.map_err(|e| storage("commit", e))?;
        Ok(())
    }

    async fn transition(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
        at: DateTime<Utc>,
        note: Option<String>,
        event: Option<OutboxPayload>,
    ) -> Result<Reservation> {
        let mut tx = self.pool().begin().await.map_err(|e| storage("begin", e))?;

        let row = sqlx::query(
            "UPDATE reservations
             SET status = $3,
                 updated_at = $4,
                 notes = CASE WHEN $5::text IS NULL THEN notes ELSE array_append(notes, $5) END
             WHERE id = $1 AND status = $2
             RETURNING *",
        )
        .bind(*id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .bind(note.as_deref())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage("reservation transition", e))?;

        let Some(row) = row else {
            // Distinguish a missing row from a lost race on the status.
            let current = fetch_reservation(&mut *tx, id, false).await?;
            return Err(CoreError::invalid_state(
                format!("reservation {id}"),
                current.status.as_str(),
                format!("transition to {to}"),
            ));
        };

        if let Some(payload) = event {
            crate::outbox::insert_event(&mut *tx, &payload, at).await?;
        }
        tx.commit().await.map_err(|e| storage("commit", e))?;
        reservation_from_row(&row)
    }

    async fn settle(
        &self,
        id: ReservationId,
        settlement: ReservationSettlement,
    ) -> Result<SettlementReceipt> {
        let mut tx = self.pool().begin().await.map_err(|e| storage("begin", e))?;

        let current = fetch_reservation(&mut *tx, id, true).await?;
        if !settlement.allowed_from.contains(&current.status) {
            return Err(CoreError::invalid_state(
                format!("reservation {id}"),
                current.status.as_str(),
                format!("settle to {}", settlement.to),
            ));
        }

        let recorded =
            crate::ledger::insert_entry(&mut *tx, settlement.entry, settlement.paid_at).await?;
        if let Some(wallet) = settlement.wallet {
            crate::wallet::apply_entry(&mut *tx, wallet, settlement.paid_at).await?;
        }
        crate::outbox::insert_event(&mut *tx, &settlement.event, settlement.paid_at).await?;

        let paid_at = (settlement.to == ReservationStatus::Paid).then_some(settlement.paid_at);
        let row = sqlx::query(
            "UPDATE reservations
             SET status = $2,
                 updated_at = $3,
                 paid_at = COALESCE($4, paid_at),
                 notes = CASE WHEN $5::text IS NULL THEN notes ELSE array_append(notes, $5) END
             WHERE id = $1
             RETURNING *",
        )
        .bind(*id.as_uuid())
        .bind(settlement.to.as_str())
        .bind(settlement.paid_at)
        .bind(paid_at)
        .bind(settlement.note.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| storage("reservation settle", e))?;

        let reservation = reservation_from_row(&row)?;
        tx.commit().await.map_err(|e| storage("commit", e))?;

        Ok(SettlementReceipt {
            reservation,
            entry: recorded.entry,
            entry_created: recorded.created,
        })
    }

    async fn override_price(
        &self,
        id: ReservationId,
        new_price: Money,
        at: DateTime<Utc>,
        note: String,
        event: OutboxPayload,
    ) -> Result<Reservation> {
        let mut tx = self.pool().begin().await.map_err(|e| storage("begin", e))?;

        let row = sqlx::query(
            "UPDATE reservations
             SET price_cents = $2, updated_at = $3, notes = array_append(notes, $4)
             WHERE id = $1 AND status = 'PENDING'
             RETURNING *",
        )
        .bind(*id.as_uuid())
        .bind(to_cents(new_price)?)
        .bind(at)
        .bind(&note)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage("price override", e))?;

        let Some(row) = row else {
            let current = fetch_reservation(&mut *tx, id, false).await?;
            return Err(CoreError::invalid_state(
                format!("reservation {id}"),
                current.status.as_str(),
                "override price",
            ));
        };

        crate::outbox::insert_event(&mut *tx, &event, at).await?;
        tx.commit().await.map_err(|e| storage("commit", e))?;
        reservation_from_row(&row)
    }

    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            "SELECT * FROM reservations
             WHERE status = 'PENDING' AND created_at < $1
             ORDER BY created_at",
        )
        .bind(cutoff)
        .fetch_all(self.pool())
        .await
        .map_err(|e| storage("stale pending query", e))?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn auto_cancel(
        &self,
        id: ReservationId,
        at: DateTime<Utc>,
        note: String,
        event: OutboxPayload,
    ) -> Result<bool> {
        let mut tx = self.pool().begin().await.map_err(|e| storage("begin", e))?;

        // Conditional update: an overlapping sweep (or a paying user)
        // racing on the same row simply matches zero rows here.
        let updated = sqlx::query(
            "UPDATE reservations
             SET status = 'CANCELLED', updated_at = $2, notes = array_append(notes, $3)
             WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(*id.as_uuid())
        .bind(at)
        .bind(&note)
        .execute(&mut *tx)
        .await
        .map_err(|e| storage("auto cancel", e))?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        crate::outbox::insert_event(&mut *tx, &event, at).await?;
        tx.commit().await.map_err(|e| storage("commit", e))?;
        Ok(true)
    }

    async fn paid_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            "SELECT * FROM reservations
             WHERE paid_at IS NOT NULL AND paid_at >= $1 AND paid_at < $2
             ORDER BY paid_at",
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.pool())
        .await
        .map_err(|e| storage("paid reservations query", e))?;

        rows.iter().map(reservation_from_row).collect()
    }
}
