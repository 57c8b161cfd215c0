//! Outbox consumer contract: poll unprocessed events, acknowledge them.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use courtbook_core::clock::Clock;
use courtbook_core::outbox::OutboxPayload;
use courtbook_core::types::OutboxEventId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query parameters for polling
#[derive(Debug, Deserialize)]
pub struct PollParams {
    /// Maximum events to return (default 100, cap 1000)
    pub limit: Option<u32>,
}

/// Acknowledgement request
#[derive(Debug, Deserialize)]
pub struct AckRequest {
    /// Event ids to mark processed
    pub ids: Vec<Uuid>,
}

/// One outbox event as delivered to consumers
#[derive(Debug, Serialize)]
pub struct OutboxEventResponse {
    /// Event id (used to acknowledge)
    pub id: Uuid,
    /// Event type tag
    pub event_type: String,
    /// Structured payload
    pub payload: OutboxPayload,
    /// When the event was appended
    pub created_at: DateTime<Utc>,
}

/// Poll response
#[derive(Debug, Serialize)]
pub struct PollResponse {
    /// Unprocessed events, oldest first
    pub events: Vec<OutboxEventResponse>,
}

/// Acknowledgement response
#[derive(Debug, Serialize)]
pub struct AckResponse {
    /// How many events were newly marked processed
    pub acknowledged: u64,
}

/// `GET /api/outbox`: unprocessed events, oldest first.
pub async fn poll(
    State(state): State<AppState>,
    Query(params): Query<PollParams>,
) -> Result<Json<PollResponse>, AppError> {
    let limit = params.limit.unwrap_or(100).min(1000);
    let events = state.outbox.unprocessed(limit).await?;

    Ok(Json(PollResponse {
        events: events
            .into_iter()
            .map(|event| OutboxEventResponse {
                id: *event.id.as_uuid(),
                event_type: event.payload.kind().as_str().to_string(),
                payload: event.payload,
                created_at: event.created_at,
            })
            .collect(),
    }))
}

/// `POST /api/outbox/ack`: mark events processed.
pub async fn ack(
    State(state): State<AppState>,
    Json(request): Json<AckRequest>,
) -> Result<Json<AckResponse>, AppError> {
    let ids: Vec<OutboxEventId> = request
        .ids
        .into_iter()
        .map(OutboxEventId::from_uuid)
        .collect();
    let acknowledged = state.outbox.mark_processed(&ids, state.clock.now()).await?;
    Ok(Json(AckResponse { acknowledged }))
}
