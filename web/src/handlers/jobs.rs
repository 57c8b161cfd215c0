//! Scheduled-job trigger endpoints.
//!
//! Unauthenticated schedulers pass the shared `secret` query parameter
//! (compared in constant time); operators may instead send the admin
//! bearer token. Both jobs are idempotent and report partial progress in
//! their summary rather than failing the whole run.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use courtbook_core::services::{ReconciliationSummary, SweepSummary};
use serde::Deserialize;

/// Query parameters accepted by both job triggers
#[derive(Debug, Deserialize)]
pub struct JobParams {
    /// Shared secret for unauthenticated scheduler invocation
    pub secret: Option<String>,
    /// Reconciliation look-back window in days (clamped to the configured cap)
    pub days: Option<u32>,
}

/// Constant-time string comparison for the shared secret.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().min(b.len()) {
        diff |= usize::from(a[i] ^ b[i]);
    }
    diff == 0
}

fn authorize(state: &AppState, params: &JobParams, headers: &HeaderMap) -> Result<(), AppError> {
    let jobs = &state.config.jobs;

    if let (Some(provided), Some(expected)) = (&params.secret, &jobs.secret) {
        if constant_time_eq(provided, expected) {
            return Ok(());
        }
    }

    if let Some(admin_token) = &jobs.admin_token {
        let bearer = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        if bearer.is_some_and(|token| constant_time_eq(token, admin_token)) {
            return Ok(());
        }
    }

    Err(AppError::unauthorized("job trigger requires the shared secret or an admin token"))
}

/// `GET /api/jobs/expire-reservations`: run the timeout sweep.
pub async fn expire_reservations(
    State(state): State<AppState>,
    Query(params): Query<JobParams>,
    headers: HeaderMap,
) -> Result<Json<SweepSummary>, AppError> {
    authorize(&state, &params, &headers)?;
    let summary = state.lifecycle.expire_stale().await?;
    Ok(Json(summary))
}

/// `GET /api/jobs/reconcile`: run the reconciliation sweep.
pub async fn reconcile(
    State(state): State<AppState>,
    Query(params): Query<JobParams>,
    headers: HeaderMap,
) -> Result<Json<ReconciliationSummary>, AppError> {
    authorize(&state, &params, &headers)?;
    let summary = state.reconciliation.run(params.days).await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_compares_content() {
        assert!(constant_time_eq("sweep-secret", "sweep-secret"));
        assert!(!constant_time_eq("sweep-secret", "sweep-secret2"));
        assert!(!constant_time_eq("", "x"));
        assert!(constant_time_eq("", ""));
    }
}
