//! Reservation endpoints: creation and lifecycle transitions.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use courtbook_core::reservation::{NewReservation, Reservation, ReservationStatus};
use courtbook_core::types::{Activity, CourtId, Money, PaymentMethod, ReservationId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to create a reservation
#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    /// Booking user
    pub user_id: UserId,
    /// Court to book
    pub court_id: CourtId,
    /// Activity to play
    pub activity: Activity,
    /// Slot start
    pub start: DateTime<Utc>,
    /// Slot end
    pub end: DateTime<Utc>,
    /// Tax-inclusive price in cents
    pub price: Money,
    /// Declared payment method
    pub method: PaymentMethod,
}

/// Request to override the price of an unpaid reservation
#[derive(Debug, Deserialize)]
pub struct PriceOverrideRequest {
    /// New tax-inclusive price in cents
    pub new_price: Money,
    /// Staff justification
    pub note: String,
}

/// A reservation as returned to clients
#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    /// Reservation id
    pub id: Uuid,
    /// Booking user
    pub user_id: Uuid,
    /// Booked court
    pub court_id: Uuid,
    /// Activity played
    pub activity: Activity,
    /// Slot start
    pub start: DateTime<Utc>,
    /// Slot end
    pub end: DateTime<Utc>,
    /// Tax-inclusive price in cents
    pub price: Money,
    /// Payment method
    pub method: PaymentMethod,
    /// Lifecycle status
    pub status: ReservationStatus,
    /// When the unpaid hold expires
    pub expires_at: DateTime<Utc>,
    /// When payment was recorded
    pub paid_at: Option<DateTime<Utc>>,
    /// Append-only notes
    pub notes: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationResponse {
    fn from(reservation: Reservation) -> Self {
        Self {
            id: *reservation.id.as_uuid(),
            user_id: *reservation.user_id.as_uuid(),
            court_id: *reservation.court_id.as_uuid(),
            activity: reservation.activity,
            start: reservation.slot.start,
            end: reservation.slot.end,
            price: reservation.price,
            method: reservation.method,
            status: reservation.status,
            expires_at: reservation.expires_at,
            paid_at: reservation.paid_at,
            notes: reservation.notes,
            created_at: reservation.created_at,
        }
    }
}

/// `POST /api/reservations`: create a PENDING reservation.
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), AppError> {
    let reservation = state
        .lifecycle
        .create(NewReservation {
            user_id: request.user_id,
            court_id: request.court_id,
            activity: request.activity,
            start: request.start,
            end: request.end,
            price: request.price,
            method: request.method,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(reservation.into())))
}

/// `GET /api/reservations/:id`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state
        .bookings
        .reservation(ReservationId::from_uuid(id))
        .await?;
    Ok(Json(reservation.into()))
}

/// `POST /api/reservations/:id/cancel`: cancel an unpaid reservation.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state
        .lifecycle
        .cancel_unpaid(ReservationId::from_uuid(id))
        .await?;
    Ok(Json(reservation.into()))
}

/// `POST /api/reservations/:id/check-in`
pub async fn check_in(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state
        .lifecycle
        .check_in(ReservationId::from_uuid(id))
        .await?;
    Ok(Json(reservation.into()))
}

/// `POST /api/reservations/:id/complete`
pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state
        .lifecycle
        .complete(ReservationId::from_uuid(id))
        .await?;
    Ok(Json(reservation.into()))
}

/// `POST /api/reservations/:id/no-show`
pub async fn no_show(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state
        .lifecycle
        .mark_no_show(ReservationId::from_uuid(id))
        .await?;
    Ok(Json(reservation.into()))
}

/// `POST /api/reservations/:id/price`: staff price override.
pub async fn override_price(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PriceOverrideRequest>,
) -> Result<Json<ReservationResponse>, AppError> {
    if request.note.trim().is_empty() {
        return Err(AppError::validation("a justification note is required"));
    }
    let reservation = state
        .lifecycle
        .override_price(ReservationId::from_uuid(id), request.new_price, request.note)
        .await?;
    Ok(Json(reservation.into()))
}
